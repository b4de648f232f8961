use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GeminiConfig;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("response blocked: {0}")]
    Blocked(String),
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GenerateContentResponse {
    /// Pulls `candidates[0].content.parts[0].text`, naming whatever is missing.
    fn into_answer(self) -> Result<String, ClientError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(ClientError::Blocked(reason));
            }
            return Err(ClientError::MalformedResponse("no candidates in response".into()));
        };

        let Some(content) = candidate.content else {
            return Err(match candidate.finish_reason {
                Some(reason) => ClientError::Blocked(reason),
                None => ClientError::MalformedResponse("candidate has no content".into()),
            });
        };

        content
            .parts
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::MalformedResponse("candidate content has no parts".into()))?
            .text
            .ok_or_else(|| ClientError::MalformedResponse("first part carries no text".into()))
    }
}

/// Client for a `generateContent` style endpoint. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn with_config(config: &GeminiConfig) -> Self {
        GeminiClient {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends the prompt verbatim and returns the first candidate's text.
    pub async fn generate(&self, prompt: &str) -> Result<String, ClientError> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-goog-api-key", key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => parsed.error.message,
                Err(_) if body.trim().is_empty() => "empty body".to_string(),
                Err(_) => body.trim().chars().take(200).collect(),
            };
            return Err(ClientError::Status { status, message });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;

        parsed.into_answer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::with_config(&GeminiConfig {
            endpoint: format!("{}/v1beta/models/test:generateContent", server.uri()),
            api_key: api_key.map(str::to_string),
        })
    }

    fn answer_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ], "role": "model" }, "finishReason": "STOP" }
            ]
        })
    }

    #[tokio::test]
    async fn test_generate_sends_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test:generateContent"))
            .and(header("x-goog-api-key", "k-123"))
            .and(body_json(json!({ "contents": [ { "parts": [ { "text": "2+2?" } ] } ] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer_body("4")))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client_for(&server, Some("k-123")).generate("2+2?").await.unwrap();
        assert_eq!(answer, "4");
    }

    #[tokio::test]
    async fn test_missing_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [ { "content": { "parts": [ {} ] } } ]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate("hi").await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate("hi").await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate("hi").await.unwrap_err();
        match err {
            ClientError::Blocked(reason) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_uses_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, None).generate("hi").await.unwrap_err();
        match err {
            ClientError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = GeminiClient::with_config(&GeminiConfig {
            endpoint: "http://127.0.0.1:9/generate".to_string(),
            api_key: None,
        });
        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)), "got {err:?}");
    }
}
