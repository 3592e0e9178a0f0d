//! Subprocess-backed agents.
//!
//! `CliAgent` drives any AI command-line tool non-interactively: the prompt is
//! substituted into an argument template or piped through stdin, stdout is the
//! answer. Each invocation is bounded by the agent's timeout, and the child is
//! killed if the call is dropped (timeout or caller cancellation).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{
    enhancement_prompt, evaluation_prompt, format_prompt, parse_questions, parse_score, Agent,
    AgentIdentity, AgentReply, Context, Response,
};
use crate::log::elapsed_ms;
use crate::{qlog_debug, qlog_trace, Error, Result};

/// Placeholder replaced by the prompt inside argument templates.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Default timeout for a single CLI invocation (2 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct CliAgent {
    identity: AgentIdentity,
    binary: PathBuf,
    args: Vec<String>,
    use_stdin: bool,
    timeout: Duration,
    cwd: Option<PathBuf>,
}

impl CliAgent {
    /// Create an agent that runs `binary` with no arguments.
    pub fn new(name: impl Into<String>, binary: impl Into<PathBuf>) -> Self {
        Self {
            identity: AgentIdentity::new(name, "cli"),
            binary: binary.into(),
            args: Vec::new(),
            use_stdin: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cwd: None,
        }
    }

    /// Argument template; `{prompt}` is replaced by the prompt text.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Pipe the prompt to the child's stdin.
    pub fn with_stdin(mut self, use_stdin: bool) -> Self {
        self.use_stdin = use_stdin;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn uses_stdin(&self) -> bool {
        self.use_stdin
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Substitute the prompt into the argument template.
    pub fn build_args(&self, prompt: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(PROMPT_PLACEHOLDER, prompt))
            .collect()
    }

    /// Run the tool once and return its trimmed stdout.
    async fn run(&self, input: &str) -> Result<String> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.build_args(input))
            .stdin(if self.use_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let exec = async {
            let mut child = cmd.spawn()?;
            // Feed stdin while draining stdout/stderr, otherwise a child that
            // answers before reading all input fills its pipe and both sides stall.
            let stdin = child.stdin.take();
            let feed = async {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(input.as_bytes()).await?;
                    stdin.shutdown().await?;
                }
                Ok::<(), std::io::Error>(())
            };
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            match fed {
                // The child may exit without consuming all of its input.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(output),
            }
        };

        let output = tokio::time::timeout(self.timeout, exec)
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        qlog_debug!(
            "CliAgent[{}] exited status={:?} in {}ms stdout_len={} stderr_len={}",
            self.identity.name,
            output.status.code(),
            elapsed_ms(start),
            stdout.len(),
            stderr.len()
        );
        qlog_trace!("CliAgent[{}] stdout:\n{}", self.identity.name, stdout);

        if !output.status.success() && stdout.is_empty() {
            let message = if stderr.is_empty() {
                format!(
                    "command failed with exit code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr
            };
            return Err(Error::AgentFailed {
                agent: self.identity.name.clone(),
                message,
            });
        }

        Ok(stdout)
    }
}

#[async_trait]
impl Agent for CliAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    async fn respond(&self, prompt: &str, context: Option<&Context>) -> Result<AgentReply> {
        let content = self.run(&format_prompt(prompt, context)).await?;
        Ok(AgentReply::text(content))
    }

    async fn evaluate(
        &self,
        prompt: &str,
        candidate: &Response,
        others: &[Response],
    ) -> Result<f64> {
        let output = self
            .run(&evaluation_prompt(prompt, candidate, others))
            .await?;
        parse_score(&output)
    }

    async fn enhance(&self, prompt: &str, max_questions: usize) -> Result<Vec<String>> {
        let output = self.run(&enhancement_prompt(prompt, max_questions)).await?;
        let questions = parse_questions(&output, max_questions);
        if questions.is_empty() {
            return Err(Error::AgentFailed {
                agent: self.identity.name.clone(),
                message: "no questions in output".to_string(),
            });
        }
        Ok(questions)
    }
}
