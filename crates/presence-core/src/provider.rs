//! Face detection and embedding seam.
//!
//! The embedding model runs outside this crate. Implementations turn an
//! encoded image (JPEG/PNG bytes) into face boxes and, for one box, an
//! embedding vector. Distances and matching are computed locally by
//! [`crate::matcher`].

use crate::types::{BoundingBox, Embedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Detects faces and extracts embeddings from encoded images.
pub trait EmbeddingProvider {
    /// Return the bounding boxes of every face found in `image`.
    fn detect(&mut self, image: &[u8]) -> Result<Vec<BoundingBox>, ProviderError>;

    /// Extract the embedding of the face inside `face`.
    fn encode(&mut self, image: &[u8], face: &BoundingBox) -> Result<Embedding, ProviderError>;
}
