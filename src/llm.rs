//! Language-model capability: classification, summarization and free-form
//! completion.
//!
//! The pipeline never talks to a model directly; it receives a
//! `&dyn LanguageModel` so tests can substitute a scripted fake. Prompt
//! wording lives in the default `classify` / `summarize` methods, which an
//! implementation only has to back with [`LanguageModel::complete`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::openai;

/// One chat-style request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
            max_tokens: None,
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Pick one of `labels` for `text`. The raw reply is returned; mapping
    /// it onto the closed set is the caller's policy.
    async fn classify(&self, text: &str, labels: &[String]) -> Result<String> {
        let request = CompletionRequest::user(format!(
            "Categorize into one of: {}.\n\nText: {}",
            labels.join(", "),
            text
        ))
        .with_system(
            "You analyze legal texts and decide which area of regulation they \
             belong to, based on their content. Reply with the category name only.",
        )
        .max_tokens(50);
        Ok(self.complete(request).await?.trim().to_string())
    }

    /// Abstractive summary of roughly `target_tokens` tokens.
    async fn summarize(&self, text: &str, target_tokens: usize) -> Result<String> {
        let request = CompletionRequest::user(format!("Text:\n{}\n\nSummary:", text))
            .with_system(format!(
                "Summarize the following regulation. Begin with its title, then \
                 state its objectives, scope and essential legal points in clear, \
                 structured sentences without introductory phrases. The summary \
                 must be about {} tokens long.",
                target_tokens
            ))
            .max_tokens(target_tokens as u32);
        Ok(self.complete(request).await?.trim().to_string())
    }
}

// ============ Disabled ============

/// Used when `llm.provider = "disabled"`. Every call fails.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        bail!("Language model provider is disabled (set [llm] provider = \"openai\")")
    }
}

// ============ OpenAI ============

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiChat {
    model: String,
    base_url: String,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = openai::api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            max_retries: config.max_retries,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = chat_body(&self.model, &request);
        let json = openai::post_json(
            &self.client,
            &self.base_url,
            "chat/completions",
            &self.api_key,
            &body,
            self.max_retries,
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn chat_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(serde_json::json!({"role": "system", "content": system}));
    }
    messages.push(serde_json::json!({"role": "user", "content": request.user}));

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
    });
    if let Some(max) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max);
    }
    body
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid chat response: missing choices[0].message.content"))
}

/// Create the [`LanguageModel`] named by `llm.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<CompletionRequest>>,
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn classify_lists_labels_and_trims_reply() {
        let model = Recorder {
            seen: Mutex::new(Vec::new()),
            reply: "  Energy \n".to_string(),
        };
        let labels = vec!["Energy".to_string(), "Transport".to_string()];
        let label = model.classify("about power grids", &labels).await.unwrap();
        assert_eq!(label, "Energy");

        let seen = model.seen.lock().unwrap();
        assert!(seen[0].user.contains("Energy, Transport"));
        assert_eq!(seen[0].temperature, 0.0);
        assert_eq!(seen[0].max_tokens, Some(50));
    }

    #[tokio::test]
    async fn summarize_caps_tokens() {
        let model = Recorder {
            seen: Mutex::new(Vec::new()),
            reply: "Summary.".to_string(),
        };
        model.summarize("long text", 600).await.unwrap();
        assert_eq!(model.seen.lock().unwrap()[0].max_tokens, Some(600));
    }

    #[test]
    fn chat_body_includes_optional_fields() {
        let req = CompletionRequest::user("q").with_system("s").max_tokens(15);
        let body = chat_body("m", &req);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["max_tokens"], 15);

        let body = chat_body("m", &CompletionRequest::user("q"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn parses_chat_content() {
        let json = serde_json::json!({"choices": [{"message": {"content": " hi "}}]});
        assert_eq!(parse_chat_response(&json).unwrap(), "hi");
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn disabled_model_errors() {
        let model = create_model(&LlmConfig::default()).unwrap();
        assert!(model.complete(CompletionRequest::user("x")).await.is_err());
    }
}
