use std::time::Duration;

use rollcall_core::{Embedding, ExtractError, FaceEmbedder};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("embedding extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<EngineError> for rollcall_core::Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Extract(e) => e.into(),
            EngineError::Timeout(after) => rollcall_core::Error::DetectionTimeout(after),
            other => rollcall_core::Error::Extraction(other.to_string()),
        }
    }
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    /// Exactly one face expected.
    Single {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Embedding, ExtractError>>,
    },
    /// Every face in a group photo.
    Group {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<Embedding>, ExtractError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Extract the single face in `image`.
    pub async fn embed(&self, image: Vec<u8>) -> Result<Embedding, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::Single { image, reply }, rx).await
    }

    /// Extract every face in `image`, in detection order.
    pub async fn embed_all(&self, image: Vec<u8>) -> Result<Vec<Embedding>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::Group { image, reply }, rx).await
    }

    /// Queueing and extraction together are bounded by the timeout. A request
    /// that times out is still processed by the engine; its reply is dropped.
    async fn request<T>(
        &self,
        req: EngineRequest,
        rx: oneshot::Receiver<Result<T, ExtractError>>,
    ) -> Result<T, EngineError> {
        let exchange = async {
            self.tx
                .send(req)
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            rx.await.map_err(|_| EngineError::ChannelClosed)
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(reply) => Ok(reply??),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "embedding extraction timed out");
                Err(EngineError::Timeout(self.timeout))
            }
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The embedder may hold model sessions that are neither `Sync` nor cheap to
/// share; the thread owns it and serves requests one at a time.
pub fn spawn_engine<E: FaceEmbedder>(
    mut embedder: E,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Single { image, reply } => {
                        let result = embedder.embed(&image);
                        if let Err(err) = &result {
                            tracing::debug!(error = %err, "single-face extraction failed");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::Group { image, reply } => {
                        let result = embedder.embed_all(&image);
                        if let Ok(faces) = &result {
                            tracing::debug!(faces = faces.len(), "group extraction done");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, timeout })
}
