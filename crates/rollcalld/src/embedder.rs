use rollcall_core::{Embedding, ExtractError, FaceEmbedder};
use serde::Deserialize;

/// Embedder for an upstream camera pipeline that already ran detection and
/// recognition: the "image" is a JSON document listing one vector per face.
///
/// Accepted shapes:
/// - `[[0.1, ...], [0.3, ...]]`
/// - `{"faces": [[0.1, ...]], "model_version": "w600k_r50"}`
/// - `{"faces": [{"values": [0.1, ...], "model_version": "w600k_r50"}]}`
#[derive(Debug, Default)]
pub struct PrecomputedEmbedder;

#[derive(Deserialize)]
#[serde(untagged)]
enum Face {
    Bare(Vec<f32>),
    Full(Embedding),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Bare(Vec<Face>),
    Document {
        faces: Vec<Face>,
        #[serde(default)]
        model_version: Option<String>,
    },
}

impl FaceEmbedder for PrecomputedEmbedder {
    fn embed_all(&mut self, image: &[u8]) -> Result<Vec<Embedding>, ExtractError> {
        let payload: Payload = serde_json::from_slice(image)
            .map_err(|e| ExtractError::Failed(format!("malformed detection payload: {e}")))?;

        let (faces, model_version) = match payload {
            Payload::Bare(faces) => (faces, None),
            Payload::Document {
                faces,
                model_version,
            } => (faces, model_version),
        };

        Ok(faces
            .into_iter()
            .map(|face| match face {
                Face::Bare(values) => Embedding {
                    values,
                    model_version: model_version.clone(),
                },
                Face::Full(embedding) => embedding,
            })
            .collect())
    }
}
