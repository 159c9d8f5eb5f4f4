//! OpenAI chat completions as a [`QuestionGenerator`].
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::QuestConfig;
use crate::error::{QuestError, Result};
use crate::generation::{GeneratedQuestionSet, GenerationRequest, QuestionGenerator, parse_question_set, render_prompt};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const SYSTEM_PROMPT: &str = "You write certification exam practice questions and answer only with JSON.";

/// Generates questions with a single JSON-mode chat completion per quiz.
pub struct OpenAIQuestionGenerator {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIQuestionGenerator {
    /// Create a generator with the model settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Config`] if `api_key` is empty.
    pub fn new(api_key: impl Into<String>, config: &QuestConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(QuestError::Config("OpenAI API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: OPENAI_API_BASE.into(),
            model: config.generation_model.clone(),
            temperature: config.generation_temperature,
            max_tokens: config.generation_max_tokens,
        })
    }

    /// Create a generator using the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Config`] if the variable is unset or empty.
    pub fn from_env(config: &QuestConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| QuestError::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Self::new(api_key, config)
    }

    /// Point the generator at an OpenAI-compatible API.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl QuestionGenerator for OpenAIQuestionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedQuestionSet> {
        let prompt = render_prompt(request);
        debug!(model = %self.model, prompt_len = prompt.len(), "requesting question set");

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &prompt },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.model, error = %e, "request failed");
                QuestError::Generation(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(model = %self.model, %status, "API error");
            return Err(QuestError::Generation(format!("API returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| QuestError::Generation(format!("failed to parse response: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| QuestError::GenerationSchema("response has no message content".into()))?;

        let set = parse_question_set(&content)?;
        info!(model = %self.model, questions = set.questions.len(), "received question set");
        Ok(set)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
