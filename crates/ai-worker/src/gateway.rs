//! Reasoning gateway backed by the Gemini `generateContent` REST API.

use crate::config::ReasoningSettings;
use crate::publisher::EventPublisher;
use ai_worker_core::{Result, WorkerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Returned when the service answers without any candidate content
pub const NO_RESPONSE: &str = "No response from Gemini";

/// One synchronous question/answer exchange with the reasoning service
#[async_trait]
pub trait ReasoningGateway: Send + Sync {
    async fn query(&self, text: &str, credential: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
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
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Value>,
}

impl GenerateRequest {
    fn from_text(text: &str) -> Self {
        GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: text.to_string(),
                }],
            }],
        }
    }
}

impl GenerateResponse {
    /// First fragment of the first candidate, as text
    fn first_text(self) -> Option<String> {
        let part = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?;

        Some(match part {
            Value::Object(ref fields) => match fields.get("text") {
                Some(Value::String(text)) => text.clone(),
                _ => part.to_string(),
            },
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}

pub struct GeminiGateway {
    api_base: String,
    model: String,
    timeout: Duration,
    publisher: Arc<EventPublisher>,
}

impl GeminiGateway {
    pub fn new(settings: &ReasoningSettings, publisher: Arc<EventPublisher>) -> Self {
        GeminiGateway {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout: settings.timeout(),
            publisher,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl ReasoningGateway for GeminiGateway {
    async fn query(&self, text: &str, credential: &str) -> Result<String> {
        self.publisher.publish_log(format!(
            "Worker {} querying Gemini AI",
            self.publisher.identity()
        ));

        // One client per call; it is dropped on every return path.
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| WorkerError::Reasoning(format!("Failed to build HTTP client: {e}")))?;

        // Errors are stripped of the URL: it carries the credential.
        let response = client
            .post(self.endpoint())
            .query(&[("key", credential)])
            .json(&GenerateRequest::from_text(text))
            .send()
            .await
            .map_err(|e| {
                WorkerError::Reasoning(format!("Gemini HTTP request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Reasoning(format!(
                "Gemini API error (HTTP {status}): {body}"
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            WorkerError::Reasoning(format!("Failed to parse Gemini response: {}", e.without_url()))
        })?;

        Ok(body.first_text().unwrap_or_else(|| NO_RESPONSE.to_string()))
    }
}
