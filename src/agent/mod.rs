//! Agent capability boundary.
//!
//! An agent is anything that can answer a prompt, score a peer's answer and
//! propose clarifying questions. Two families implement the same [`Agent`]
//! trait: subprocess-backed CLI tools ([`CliAgent`]) and native API clients
//! ([`HttpAgent`]). The engines only ever see `Arc<dyn Agent>`.

mod cli;
mod detect;
mod http;

pub use cli::{CliAgent, PROMPT_PLACEHOLDER};
pub use detect::{detect_cli_agents, CliPreset, DEFAULT_PRESETS};
pub use http::{HttpAgent, DEFAULT_ANTHROPIC_URL, DEFAULT_MAX_TOKENS};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::util::truncate_chars;
use crate::{Error, Result};

/// Key-value context passed alongside a prompt (project type, file list, ...).
pub type Context = BTreeMap<String, String>;

/// Shared handle to any agent implementation.
pub type SharedAgent = Arc<dyn Agent>;

/// Questions used when an agent cannot produce its own.
pub const FALLBACK_QUESTIONS: [&str; 3] = [
    "What programming language are you using?",
    "Are there any specific constraints or requirements?",
    "What is the expected output or behavior?",
];

const EVAL_CANDIDATE_CHARS: usize = 1000;
const EVAL_PEER_CHARS: usize = 200;
const EVAL_MAX_PEERS: usize = 2;

static FENCED_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\w*\n(.*?)```").expect("valid fenced code regex"));

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

/// Identifies who wrote a response or cast a score. Unique by name per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentIdentity {
    pub name: String,
    pub kind: String,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// Agent names compare case-insensitively everywhere.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Raw output of a successful `respond` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    pub content: String,
    pub tokens_used: Option<u64>,
}

impl AgentReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_used: None,
        }
    }
}

/// One agent's answer to a query. Failed dispatches still produce a response.
#[derive(Debug, Clone)]
pub struct Response {
    pub author: AgentIdentity,
    pub content: String,
    pub extracted_code: Option<String>,
    pub explanation: Option<String>,
    pub latency: Duration,
    pub tokens_used: Option<u64>,
    pub failed: bool,
    pub failure_reason: Option<String>,
}

impl Response {
    pub fn success(author: AgentIdentity, reply: AgentReply, latency: Duration) -> Self {
        let (extracted_code, explanation) = split_reply(&reply.content);
        Self {
            author,
            content: reply.content,
            extracted_code,
            explanation,
            latency,
            tokens_used: reply.tokens_used,
            failed: false,
            failure_reason: None,
        }
    }

    /// The content carries the error text so peers can still score it.
    pub fn failure(author: AgentIdentity, reason: impl Into<String>, latency: Duration) -> Self {
        let reason = reason.into();
        Self {
            author,
            content: format!("Error: {}", reason),
            extracted_code: None,
            explanation: None,
            latency,
            tokens_used: None,
            failed: true,
            failure_reason: Some(reason),
        }
    }

    pub fn latency_ms(&self) -> u128 {
        self.latency.as_millis()
    }
}

/// The capability every agent backend provides.
///
/// Each call may fail independently; callers decide how to absorb failures.
#[async_trait]
pub trait Agent: Send + Sync {
    fn identity(&self) -> &AgentIdentity;

    async fn respond(&self, prompt: &str, context: Option<&Context>) -> Result<AgentReply>;

    /// Score `candidate` from 0 to 100.
    async fn evaluate(&self, prompt: &str, candidate: &Response, others: &[Response])
        -> Result<f64>;

    async fn enhance(&self, prompt: &str, max_questions: usize) -> Result<Vec<String>>;

    fn name(&self) -> &str {
        &self.identity().name
    }
}

/// Prefix the prompt with a `Context:` section when context is present.
pub fn format_prompt(prompt: &str, context: Option<&Context>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => {
            let lines = ctx
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Context:\n{}\n\nRequest:\n{}", lines, prompt)
        }
        _ => prompt.to_string(),
    }
}

pub fn evaluation_prompt(prompt: &str, candidate: &Response, others: &[Response]) -> String {
    let peers = others
        .iter()
        .take(EVAL_MAX_PEERS)
        .map(|r| format!("- {}...", truncate_chars(&r.content, EVAL_PEER_CHARS)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Rate this solution from 0-100:\n\n\
         Problem: {}\n\n\
         Solution (from {}):\n{}\n\n\
         Other solutions for reference:\n{}\n\n\
         Score on correctness (40), code quality (20), efficiency (20) and best practices (20).\n\
         Respond with only a number from 0-100.",
        prompt,
        candidate.author.name,
        truncate_chars(&candidate.content, EVAL_CANDIDATE_CHARS),
        peers
    )
}

pub fn enhancement_prompt(prompt: &str, max_questions: usize) -> String {
    format!(
        "Generate {n} clarifying questions for this coding request:\n\n\
         {prompt}\n\n\
         Questions should clarify:\n\
         - Programming language/framework\n\
         - Specific requirements\n\
         - Constraints\n\
         - Expected behavior\n\n\
         Output {n} questions, each on a new line, starting with \"Q:\".",
        n = max_questions,
        prompt = prompt
    )
}

/// First decimal number in the text. Range checking is the caller's job.
pub fn parse_score(output: &str) -> Result<f64> {
    NUMBER_RE
        .find(output)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| Error::ScoreParse(truncate_chars(output.trim(), 80).to_string()))
}

/// Pull question lines out of free text.
pub fn parse_questions(output: &str, max_questions: usize) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && (line.ends_with('?')
                    || line.starts_with("Q:")
                    || line.starts_with("Question")
                    || line.starts_with('-'))
        })
        .map(clean_question)
        .filter(|q| !q.is_empty())
        .take(max_questions)
        .collect()
}

fn clean_question(line: &str) -> String {
    let mut q = line;
    for prefix in ["Q:", "Question:", "Question", "-"] {
        if let Some(rest) = q.strip_prefix(prefix) {
            q = rest;
            break;
        }
    }
    // Drop list numbering such as "1." or "2)".
    let q = q.trim_start();
    let q = match q.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) if idx > 0 && q[idx..].starts_with(['.', ')']) => &q[idx + 1..],
        _ => q,
    };
    q.trim().to_string()
}

pub fn fallback_questions(max_questions: usize) -> Vec<String> {
    FALLBACK_QUESTIONS
        .iter()
        .take(max_questions)
        .map(|q| q.to_string())
        .collect()
}

/// Split a reply into (first fenced code block, text before the first fence).
pub fn split_reply(content: &str) -> (Option<String>, Option<String>) {
    let code = FENCED_CODE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let explanation = match content.find("```") {
        Some(idx) => content[..idx].trim(),
        None => content.trim(),
    };
    let explanation = (!explanation.is_empty()).then(|| explanation.to_string());

    (code, explanation)
}
