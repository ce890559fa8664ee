use reqwest::Client;
use serde::Deserialize;

use crate::error::ServiceError;

const CAPTION_PROMPT: &str = "Provide a concise yet comprehensive description of the \
clothing item in the image. Include the garment type, color, material, sleeve length, \
neckline, style, fit, suitable occasions, seasonality, any patterns or prints, and \
unique design details. Answer in English with a single sentence.";

/// Gateway to a vision-capable chat endpoint that describes one garment
/// image. Used only by the offline description worker; the online path
/// never captions.
pub struct CaptionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    choices: Vec<CaptionChoice>,
}

#[derive(Debug, Deserialize)]
struct CaptionChoice {
    message: CaptionMessage,
}

#[derive(Debug, Deserialize)]
struct CaptionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CaptionClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    pub async fn describe(&self, image_url: &str) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": CAPTION_PROMPT},
                    {"type": "image_url", "image_url": {"url": image_url}}
                ]
            }],
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
                "caption request failed: {status}"
            )));
        }

        let parsed: CaptionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ServiceError::UpstreamUnavailable("caption response carried no content".into())
            })?;

        Ok(normalize_description(&content))
    }
}

/// Descriptions are stored in a single text column; strip newlines and
/// quote characters before the write-back.
pub(crate) fn normalize_description(raw: &str) -> String {
    raw.replace('\n', " ")
        .replace(['"', '\''], "")
        .trim()
        .to_string()
}
