//! HTTP client for the external face embedding service.
//!
//! `POST {base}/detect` with the raw image returns `{"faces": [...]}`;
//! `POST {base}/encode?x=&y=&width=&height=` with the raw image returns
//! `{"embedding": [...]}`.

use presence_core::{BoundingBox, Embedding, EmbeddingProvider, ProviderError};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct DetectResponse {
    faces: Vec<BoundingBox>,
}

#[derive(Debug, Deserialize)]
struct EncodeResponse {
    embedding: Vec<f32>,
}

/// Blocking client; must be created and used off the async runtime.
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        tracing::info!(base_url, timeout_secs = timeout.as_secs(), "embedding provider client ready");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn post_image(
        &self,
        path: &str,
        image: &[u8],
        query: &[(&str, f32)],
    ) -> Result<Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .query(query)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }
        Ok(response)
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn detect(&mut self, image: &[u8]) -> Result<Vec<BoundingBox>, ProviderError> {
        let body: DetectResponse = self
            .post_image("detect", image, &[])?
            .json()
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        tracing::debug!(faces = body.faces.len(), "provider detect");
        Ok(body.faces)
    }

    fn encode(&mut self, image: &[u8], face: &BoundingBox) -> Result<Embedding, ProviderError> {
        let query = [
            ("x", face.x),
            ("y", face.y),
            ("width", face.width),
            ("height", face.height),
        ];
        let body: EncodeResponse = self
            .post_image("encode", image, &query)?
            .json()
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(Embedding::new(body.embedding))
    }
}

fn network_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unavailable(format!("timed out: {err}"))
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let p = HttpEmbeddingProvider::new("http://faces.local:8400/", Duration::from_secs(1)).unwrap();
        assert_eq!(p.endpoint("detect"), "http://faces.local:8400/detect");
    }

    #[test]
    fn test_detect_response_shape() {
        let body: DetectResponse = serde_json::from_str(
            r#"{"faces":[{"x":1.0,"y":2.0,"width":30.0,"height":40.0,"confidence":0.9},
                         {"x":5,"y":6,"width":7,"height":8}]}"#,
        )
        .unwrap();
        assert_eq!(body.faces.len(), 2);
        assert_eq!(body.faces[1].confidence, 0.0);
    }

    #[test]
    fn test_encode_response_shape() {
        let body: EncodeResponse = serde_json::from_str(r#"{"embedding":[0.1,-0.2,0.3]}"#).unwrap();
        assert_eq!(body.embedding.len(), 3);
    }

    #[test]
    fn test_truncate_long_body() {
        let long = "é".repeat(300);
        let t = truncate(&long);
        assert!(t.ends_with('…'));
        assert!(t.len() <= MAX_ERROR_BODY + '…'.len_utf8());
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn test_unreachable_provider_is_unavailable() {
        // Nothing listens on port 1 in test environments.
        let mut p = HttpEmbeddingProvider::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = p.detect(b"img").unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)), "got {err}");
    }
}
