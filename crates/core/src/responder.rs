use crate::config::{resolve_credential, ResponderProvider, ResponderSettings};
use crate::embeddings::endpoint_url;
use crate::error::ProviderError;
use crate::models::{PromptFields, ResponderReply};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const NOT_AVAILABLE_ANSWER: &str =
    "The information to answer this query is not available in the provided results.";

pub const SYSTEM_PROMPT: &str = "\
You answer user queries using only the search results you are given.
- Extract the information that directly addresses the query and answer concisely.
- Cite every fact immediately after it as [Source: filename (page X)], using the
  citation information provided. Omit the page when none is given.
- Cite several sources when an answer combines documents.
- Do not add outside knowledge or assumptions.
If the results cannot answer the query, reply exactly:
\"The information to answer this query is not available in the provided results.\"";

/// Synthesizes a final answer from a query, retrieved chunks and citations.
#[async_trait]
pub trait Responder: Send + Sync {
    fn name(&self) -> &str;

    async fn respond(&self, fields: &PromptFields) -> Result<ResponderReply, ProviderError>;
}

pub fn render_user_prompt(fields: &PromptFields) -> String {
    let results = if fields.retrieved_results.is_empty() {
        "(no results)".to_string()
    } else {
        fields
            .retrieved_results
            .iter()
            .enumerate()
            .map(|(index, text)| format!("[{}] {}", index + 1, text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "User Query: {}\n\nSearch Results:\n{}\n\nCitation Information:\n{}\n\nYour Answer:",
        fields.query, results, fields.citation_text
    )
}

/// Offline responder: quotes the closest chunk with its citation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveResponder;

#[async_trait]
impl Responder for ExtractiveResponder {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn respond(&self, fields: &PromptFields) -> Result<ResponderReply, ProviderError> {
        let Some(best) = fields
            .retrieved_results
            .iter()
            .map(|text| text.trim())
            .find(|text| !text.is_empty())
        else {
            return Ok(ResponderReply {
                content: NOT_AVAILABLE_ANSWER.to_string(),
            });
        };

        let content = match fields.citation_text.lines().next().filter(|line| !line.is_empty()) {
            Some(source) => format!("{best} [Source: {source}]"),
            None => best.to_string(),
        };
        Ok(ResponderReply { content })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenAI, Grok).
#[derive(Debug, Clone)]
pub struct ChatCompletionResponder {
    client: Client,
    backend: String,
    endpoint: Url,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionResponder {
    pub fn new(
        backend: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::new(),
            backend: backend.into(),
            endpoint: endpoint_url(base_url, "chat/completions")?,
            model: model.into(),
            api_key: api_key.into(),
            temperature: 0.5,
            max_tokens: 1_000,
        })
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl Responder for ChatCompletionResponder {
    fn name(&self) -> &str {
        &self.backend
    }

    async fn respond(&self, fields: &PromptFields) -> Result<ResponderReply, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: render_user_prompt(fields),
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ProviderError::BackendResponse {
                backend: self.backend.clone(),
                status: status.as_u16(),
                details,
            });
        }

        let payload: ChatResponse = response.json().await?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse {
                backend: self.backend.clone(),
                details: "response has no choices".to_string(),
            })?;

        Ok(ResponderReply { content })
    }
}

/// The configured language responder, selected once at startup.
#[derive(Debug, Clone)]
pub enum ResponderBackend {
    Extractive(ExtractiveResponder),
    ChatCompletion(ChatCompletionResponder),
}

impl ResponderBackend {
    pub fn from_settings(settings: &ResponderSettings) -> Result<Self, ProviderError> {
        let provider = settings.provider;
        let Some(env_var) = provider.credential_env() else {
            return Ok(Self::Extractive(ExtractiveResponder));
        };

        let api_key = resolve_credential(settings.api_key.as_deref(), env_var).ok_or_else(|| {
            ProviderError::MissingCredential(format!(
                "set responder.api_key or {env_var} for the {} responder",
                provider_label(provider)
            ))
        })?;
        let base_url = settings
            .base_url
            .as_deref()
            .unwrap_or(provider.default_base_url());
        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());

        Ok(Self::ChatCompletion(
            ChatCompletionResponder::new(provider_label(provider), base_url, model, api_key)?
                .with_sampling(settings.temperature, settings.max_tokens),
        ))
    }
}

fn provider_label(provider: ResponderProvider) -> &'static str {
    match provider {
        ResponderProvider::Extractive => "extractive",
        ResponderProvider::OpenAi => "openai",
        ResponderProvider::Grok => "grok",
    }
}

#[async_trait]
impl Responder for ResponderBackend {
    fn name(&self) -> &str {
        match self {
            Self::Extractive(responder) => responder.name(),
            Self::ChatCompletion(responder) => responder.name(),
        }
    }

    async fn respond(&self, fields: &PromptFields) -> Result<ResponderReply, ProviderError> {
        match self {
            Self::Extractive(responder) => responder.respond(fields).await,
            Self::ChatCompletion(responder) => responder.respond(fields).await,
        }
    }
}
