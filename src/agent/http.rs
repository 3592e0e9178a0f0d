//! Native API agents.
//!
//! `HttpAgent` talks to the Anthropic Messages API directly with `reqwest`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{
    enhancement_prompt, evaluation_prompt, format_prompt, parse_questions, parse_score, Agent,
    AgentIdentity, AgentReply, Context, Response,
};
use crate::log::elapsed_ms;
use crate::util::truncate_chars;
use crate::{qlog_debug, Error, Result};

pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const EVAL_MAX_TOKENS: u32 = 100;
const ENHANCE_MAX_TOKENS: u32 = 500;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct HttpAgent {
    identity: AgentIdentity,
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl HttpAgent {
    pub fn new(
        name: impl Into<String>,
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Self::with_base_url(name, api_key, model, DEFAULT_ANTHROPIC_URL, timeout)
    }

    pub fn with_base_url(
        name: impl Into<String>,
        api_key: &str,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| Error::Validation("invalid API key format".to_string()))?;
        headers.insert("x-api-key", key);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            identity: AgentIdentity::new(name, "http"),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<AgentReply> {
        let start = Instant::now();
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(self.messages_url())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::AgentFailed {
                agent: self.identity.name.clone(),
                message: format!("HTTP {}: {}", status.as_u16(), truncate_chars(&text, 200)),
            });
        }

        let parsed: MessagesResponse = resp.json().await?;
        let content = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        let tokens_used = parsed.usage.map(|u| u.input_tokens + u.output_tokens);

        qlog_debug!(
            "HttpAgent[{}] model={} completed in {}ms tokens={:?}",
            self.identity.name,
            self.model,
            elapsed_ms(start),
            tokens_used
        );

        Ok(AgentReply {
            content,
            tokens_used,
        })
    }
}

#[async_trait]
impl Agent for HttpAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn respond(&self, prompt: &str, context: Option<&Context>) -> Result<AgentReply> {
        self.complete(&format_prompt(prompt, context), self.max_tokens)
            .await
    }

    async fn evaluate(
        &self,
        prompt: &str,
        candidate: &Response,
        others: &[Response],
    ) -> Result<f64> {
        let reply = self
            .complete(&evaluation_prompt(prompt, candidate, others), EVAL_MAX_TOKENS)
            .await?;
        parse_score(&reply.content)
    }

    async fn enhance(&self, prompt: &str, max_questions: usize) -> Result<Vec<String>> {
        let reply = self
            .complete(&enhancement_prompt(prompt, max_questions), ENHANCE_MAX_TOKENS)
            .await?;
        let questions = parse_questions(&reply.content, max_questions);
        if questions.is_empty() {
            return Err(Error::AgentFailed {
                agent: self.identity.name.clone(),
                message: "no questions in output".to_string(),
            });
        }
        Ok(questions)
    }
}
