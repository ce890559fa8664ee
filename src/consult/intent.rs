use reqwest::Client;
use serde::Deserialize;

use crate::error::ServiceError;
use crate::models::PartQuery;

pub const DEFAULT_GREETING: &str = "Hi there, how can I help you today?";

/// Gateway to an OpenAI-compatible chat endpoint that turns a free-text
/// customer prompt into a structured clothing-part analysis. The model is
/// forced to call `prompt_handler`, whose schema restricts `part` to the
/// four known values; anything that does not decode as that schema is an
/// `IntentParse` failure with no partial fallback.
pub struct IntentClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

/// Schema-validated analysis. A missing greeting is tolerated (defaulted),
/// the parts list is load-bearing and is not.
#[derive(Debug, Clone)]
pub struct IntentAnalysis {
    pub greeting: String,
    pub parts: Vec<PartQuery>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct HandlerArguments {
    #[serde(default)]
    polite_reply: Option<String>,
    analysis: Vec<PartQuery>,
}

impl IntentClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    pub async fn analyze(&self, prompt: &str) -> Result<IntentAnalysis, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": format!(
                    "Analyze what type of clothing the customer wants (tops, pants, \
                     outerwear, dress_skirt, or several of them) from the question \
                     below, using the prompt_handler function. For each part, give a \
                     concise feature summary suitable for similar-item retrieval.\n{prompt}"
                ),
            }],
            "functions": [handler_schema()],
            "function_call": {"name": "prompt_handler"},
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
                "intent request failed: {status}"
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::IntentParse(e.to_string()))?;

        let arguments = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.function_call)
            .map(|call| call.arguments)
            .ok_or_else(|| {
                ServiceError::IntentParse("response carried no function call".into())
            })?;

        parse_arguments(&arguments)
    }

    pub async fn health_check(&self) -> Result<bool, ServiceError> {
        let url = format!("{}/models", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

/// Decode the function-call arguments string. Fails closed on any shape
/// mismatch; only the greeting may be defaulted.
pub(crate) fn parse_arguments(arguments: &str) -> Result<IntentAnalysis, ServiceError> {
    let parsed: HandlerArguments =
        serde_json::from_str(arguments).map_err(|e| ServiceError::IntentParse(e.to_string()))?;

    Ok(IntentAnalysis {
        greeting: parsed
            .polite_reply
            .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
        parts: parsed.analysis,
    })
}

fn handler_schema() -> serde_json::Value {
    serde_json::json!({
        "name": "prompt_handler",
        "description": (
            "Context: a dedicated fashion consulting system. \
             Greet the user first (mandatory, whatever the input is), then \
             identify the clothing parts the customer wants and give a concise \
             feature summary per part covering color, material, sleeve length, \
             neckline, style, fit, occasion, seasonality, patterns and unique \
             design details."
        ),
        "parameters": {
            "type": "object",
            "properties": {
                "polite_reply": {
                    "type": "string",
                    "description": "Consulting-chatbot greeting to the user."
                },
                "analysis": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "part": {
                                "type": "string",
                                "enum": ["tops", "pants", "outerwear", "dress_skirt"],
                                "description": "Identifier of a desired clothing part."
                            },
                            "summary": {
                                "type": "string",
                                "description": "Concise feature description of the clothing part."
                            }
                        }
                    },
                    "description": "One entry per clothing part the customer wants."
                }
            },
            "required": ["polite_reply", "analysis"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClothingPart;

    #[test]
    fn test_parse_full_arguments() {
        let arguments = r#"{
            "polite_reply": "Hello! Let's see what you're looking for.",
            "analysis": [
                {"part": "tops", "summary": "black sweater"},
                {"part": "pants", "summary": "wind-prevention pants"}
            ]
        }"#;
        let analysis = parse_arguments(arguments).unwrap();
        assert_eq!(analysis.greeting, "Hello! Let's see what you're looking for.");
        assert_eq!(analysis.parts.len(), 2);
        assert_eq!(analysis.parts[0].part, ClothingPart::Tops);
        assert_eq!(analysis.parts[1].summary, "wind-prevention pants");
    }

    #[test]
    fn test_missing_greeting_gets_default() {
        let arguments = r#"{"analysis": [{"part": "outerwear", "summary": "blue jacket"}]}"#;
        let analysis = parse_arguments(arguments).unwrap();
        assert_eq!(analysis.greeting, DEFAULT_GREETING);
        assert_eq!(analysis.parts.len(), 1);
    }

    #[test]
    fn test_missing_analysis_fails_closed() {
        let arguments = r#"{"polite_reply": "Hi!"}"#;
        assert!(matches!(
            parse_arguments(arguments),
            Err(ServiceError::IntentParse(_))
        ));
    }

    #[test]
    fn test_unknown_part_fails_closed() {
        let arguments = r#"{"analysis": [{"part": "shoes", "summary": "red sneakers"}]}"#;
        assert!(matches!(
            parse_arguments(arguments),
            Err(ServiceError::IntentParse(_))
        ));
    }

    #[test]
    fn test_non_json_fails_closed() {
        assert!(matches!(
            parse_arguments("I want a sweater"),
            Err(ServiceError::IntentParse(_))
        ));
    }

    #[test]
    fn test_empty_analysis_is_valid() {
        let analysis = parse_arguments(r#"{"polite_reply": "Hi!", "analysis": []}"#).unwrap();
        assert!(analysis.parts.is_empty());
    }
}
