use reqwest::Client;
use serde::Deserialize;

use crate::error::ServiceError;

/// Gateway to an OpenAI-compatible text-embedding endpoint. The service is
/// a black box: text in, fixed-width vector out. Vectors are stored
/// half-precision downstream, so upstream precision is not load-bearing.
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String, dim: usize) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            dim,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ServiceError::UpstreamUnavailable(format!(
                "embedding request failed: {status}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;

        extract_vector(parsed, self.dim)
    }
}

/// Pull the first vector out of the response and enforce the deployment's
/// fixed width. A mismatched width is an upstream contract violation, not
/// caller error.
fn extract_vector(response: EmbeddingResponse, dim: usize) -> Result<Vec<f32>, ServiceError> {
    let vector = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| {
            ServiceError::UpstreamUnavailable("embedding response contained no vectors".into())
        })?;

    if vector.len() != dim {
        return Err(ServiceError::UpstreamUnavailable(format!(
            "embedding width {} does not match expected {}",
            vector.len(),
            dim
        )));
    }

    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_vector_ok() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"embedding": [0.1, 0.2, 0.3]}]}"#).unwrap();
        let vector = extract_vector(response, 3).unwrap();
        assert_eq!(vector.len(), 3);
    }

    #[test]
    fn test_extract_vector_empty_data() {
        let response: EmbeddingResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(matches!(
            extract_vector(response, 3),
            Err(ServiceError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn test_extract_vector_width_mismatch() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"embedding": [0.1, 0.2]}]}"#).unwrap();
        assert!(matches!(
            extract_vector(response, 768),
            Err(ServiceError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_input_rejected_before_network() {
        let client = EmbeddingClient::new(
            "http://localhost:0".into(),
            None,
            "text-embedding-004".into(),
            768,
        );
        assert!(matches!(
            client.embed("   ").await,
            Err(ServiceError::EmptyInput)
        ));
    }
}
