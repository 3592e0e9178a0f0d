//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted agents with configurable replies, delays, failures and scores
//! - Temporary working trees with a separate backup root

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use quorum::agent::{Agent, AgentIdentity, AgentReply, Context, Response, SharedAgent};
use quorum::workspace::Workspace;
use quorum::{Error, Result};

/// An in-process agent whose behaviour is fixed at construction.
pub struct ScriptedAgent {
    identity: AgentIdentity,
    reply: String,
    delay: Duration,
    fail_with: Option<String>,
    /// Score given to every candidate unless `score_by_author` matches.
    score: f64,
    score_by_author: Vec<(String, f64)>,
    questions: Vec<String>,
    pub respond_calls: AtomicUsize,
    pub evaluate_calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(name: &str, reply: &str) -> Self {
        Self {
            identity: AgentIdentity::new(name, "scripted"),
            reply: reply.to_string(),
            delay: Duration::ZERO,
            fail_with: None,
            score: 70.0,
            score_by_author: Vec::new(),
            questions: Vec::new(),
            respond_calls: AtomicUsize::new(0),
            evaluate_calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering `respond`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `respond` fail with this message.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Give a specific author a specific score.
    pub fn scoring(mut self, author: &str, score: f64) -> Self {
        self.score_by_author.push((author.to_string(), score));
        self
    }

    pub fn with_questions(mut self, questions: &[&str]) -> Self {
        self.questions = questions.iter().map(|q| q.to_string()).collect();
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn respond(&self, _prompt: &str, _context: Option<&Context>) -> Result<AgentReply> {
        self.respond_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.fail_with {
            Some(message) => Err(Error::AgentFailed {
                agent: self.identity.name.clone(),
                message: message.clone(),
            }),
            None => Ok(AgentReply {
                content: self.reply.clone(),
                tokens_used: Some(self.reply.len() as u64),
            }),
        }
    }

    async fn evaluate(&self, _prompt: &str, candidate: &Response, _others: &[Response]) -> Result<f64> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        if candidate.failed {
            return Ok(5.0);
        }
        Ok(self
            .score_by_author
            .iter()
            .find(|(author, _)| *author == candidate.author.name)
            .map_or(self.score, |(_, score)| *score))
    }

    async fn enhance(&self, _prompt: &str, max_questions: usize) -> Result<Vec<String>> {
        Ok(self.questions.iter().take(max_questions).cloned().collect())
    }
}

/// Erase concrete agent types into a roster.
pub fn roster(agents: &[Arc<ScriptedAgent>]) -> Vec<SharedAgent> {
    agents
        .iter()
        .map(|a| Arc::clone(a) as SharedAgent)
        .collect()
}

/// A temporary working tree with backups kept outside it.
pub struct TestTree {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub backup_root: PathBuf,
}

impl TestTree {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("project");
        let backup_root = temp_dir.path().join("backups");
        std::fs::create_dir_all(&root).expect("Failed to create working tree");
        Self {
            temp_dir,
            root,
            backup_root,
        }
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.root, &self.backup_root)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    pub fn read(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(rel)).ok()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn exists(&self, rel: &str) -> bool {
        Path::new(&self.root).join(rel).exists()
    }
}

/// A reply in the shape real agents produce: prose, then a marked code block.
pub fn solution(path: &str, language: &str, code: &str) -> String {
    format!(
        "Here is the implementation.\n\nFile: {}\n```{}\n{}\n```\n\nThis handles the edge cases.",
        path, language, code
    )
}
