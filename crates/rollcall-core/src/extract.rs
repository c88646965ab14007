//! Face embedding extraction seam.
//!
//! Detection and recognition models live outside this crate; the daemon
//! plugs an implementation in behind [`FaceEmbedder`].

use thiserror::Error;

use crate::error::Error;
use crate::types::Embedding;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face found in image")]
    NoFaceFound,
    #[error("expected exactly one face, found {0}")]
    MultipleFacesFound(usize),
    #[error("extraction failed: {0}")]
    Failed(String),
}

impl From<ExtractError> for Error {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NoFaceFound => Error::NoFaceFound,
            ExtractError::MultipleFacesFound(n) => Error::MultipleFacesFound(n),
            ExtractError::Failed(msg) => Error::Extraction(msg),
        }
    }
}

/// Turns one image into face embeddings.
///
/// Implementations may hold model sessions that need `&mut self`, so the
/// daemon drives them from a single dedicated thread.
pub trait FaceEmbedder: Send + 'static {
    /// Every face in the image, in detection order. An empty image yields an
    /// empty vector, not an error.
    fn embed_all(&mut self, image: &[u8]) -> Result<Vec<Embedding>, ExtractError>;

    /// The single face in the image.
    fn embed(&mut self, image: &[u8]) -> Result<Embedding, ExtractError> {
        let mut faces = self.embed_all(image)?;
        match faces.len() {
            0 => Err(ExtractError::NoFaceFound),
            1 => Ok(faces.remove(0)),
            n => Err(ExtractError::MultipleFacesFound(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Embedding>);

    impl FaceEmbedder for Fixed {
        fn embed_all(&mut self, _image: &[u8]) -> Result<Vec<Embedding>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_embed_requires_exactly_one_face() {
        let face = Embedding::new(vec![1.0, 0.0]);

        assert!(matches!(Fixed(vec![]).embed(b""), Err(ExtractError::NoFaceFound)));
        assert_eq!(Fixed(vec![face.clone()]).embed(b"").unwrap(), face);
        assert!(matches!(
            Fixed(vec![face.clone(), face]).embed(b""),
            Err(ExtractError::MultipleFacesFound(2))
        ));
    }

    #[test]
    fn test_extract_errors_map_to_core_errors() {
        assert!(matches!(Error::from(ExtractError::NoFaceFound), Error::NoFaceFound));
        assert!(matches!(
            Error::from(ExtractError::MultipleFacesFound(3)),
            Error::MultipleFacesFound(3)
        ));
        assert_eq!(Error::from(ExtractError::Failed("bad".into())).code(), "extraction_failed");
    }
}
