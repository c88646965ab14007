//! Error type for `rollcall-store`.

use rollcall_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("uuid parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    /// A stored discriminant no longer parses.
    #[error("decode error: {0}")]
    Decode(#[from] rollcall_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        StoreError::backend(err)
    }
}
