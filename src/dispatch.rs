//! Parallel dispatch of one prompt to every agent.
//!
//! Each agent runs in its own tokio task under its own timeout. Whatever
//! happens inside a task (error, timeout, panic) is turned into a failed
//! [`Response`] at that task's boundary, so the output always has exactly one
//! response per agent, in roster order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::agent::{Context, Response, SharedAgent};
use crate::log::elapsed_ms;
use crate::{qlog, qlog_debug, qlog_error, qlog_warn, Error, Result};

/// Default per-agent response timeout (2 minutes).
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Dispatcher {
    agents: Vec<SharedAgent>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(agents: Vec<SharedAgent>) -> Self {
        Self {
            agents,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn agents(&self) -> &[SharedAgent] {
        &self.agents
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn add_agent(&mut self, agent: SharedAgent) {
        self.agents.push(agent);
    }

    /// Remove the first agent with this name. Returns whether one was removed.
    pub fn remove_agent(&mut self, name: &str) -> bool {
        match self.agents.iter().position(|a| a.identity().matches(name)) {
            Some(idx) => {
                self.agents.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Send the prompt to every agent concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAgents`] before anything is launched if the roster is empty.
    pub async fn dispatch_all(
        &self,
        prompt: &str,
        context: Option<&Context>,
    ) -> Result<Vec<Response>> {
        if self.agents.is_empty() {
            qlog_error!("dispatch_all: no agents available");
            return Err(Error::NoAgents);
        }
        Ok(self.dispatch(prompt, context, &self.agents).await)
    }

    /// Send the prompt only to agents whose names match (case-insensitively).
    pub async fn dispatch_to_subset<S: AsRef<str>>(
        &self,
        prompt: &str,
        context: Option<&Context>,
        names: &[S],
    ) -> Result<Vec<Response>> {
        if self.agents.is_empty() {
            qlog_error!("dispatch_to_subset: no agents available");
            return Err(Error::NoAgents);
        }

        let selected: Vec<SharedAgent> = self
            .agents
            .iter()
            .filter(|a| names.iter().any(|n| a.identity().matches(n.as_ref())))
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(Error::NoMatchingAgents {
                requested: names.iter().map(|n| n.as_ref().to_string()).collect(),
                available: self.agent_names().join(", "),
            });
        }
        Ok(self.dispatch(prompt, context, &selected).await)
    }

    async fn dispatch(
        &self,
        prompt: &str,
        context: Option<&Context>,
        agents: &[SharedAgent],
    ) -> Vec<Response> {
        let start = Instant::now();
        qlog!(
            "Dispatching to {} agent(s), timeout={:?}",
            agents.len(),
            self.timeout
        );

        let prompt: Arc<str> = Arc::from(prompt);
        let context = context.cloned().map(Arc::new);

        let handles: Vec<_> = agents
            .iter()
            .map(|agent| {
                let agent = Arc::clone(agent);
                let prompt = Arc::clone(&prompt);
                let context = context.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    respond_isolated(agent, &prompt, context.as_deref(), timeout).await
                })
            })
            .collect();

        // join_all keeps input order, so slot i always belongs to agents[i].
        let responses: Vec<Response> = join_all(handles)
            .await
            .into_iter()
            .zip(agents)
            .map(|(joined, agent)| match joined {
                Ok(response) => response,
                Err(e) => {
                    qlog_warn!("Agent {} task aborted: {}", agent.name(), e);
                    Response::failure(
                        agent.identity().clone(),
                        format!("task aborted: {}", e),
                        Duration::ZERO,
                    )
                }
            })
            .collect();

        let failed = responses.iter().filter(|r| r.failed).count();
        qlog!(
            "Dispatch finished in {}ms: {} ok, {} failed",
            elapsed_ms(start),
            responses.len() - failed,
            failed
        );
        responses
    }
}

async fn respond_isolated(
    agent: SharedAgent,
    prompt: &str,
    context: Option<&Context>,
    timeout: Duration,
) -> Response {
    let start = Instant::now();
    let identity = agent.identity().clone();
    qlog_debug!("Agent {} started", identity.name);

    match tokio::time::timeout(timeout, agent.respond(prompt, context)).await {
        Ok(Ok(reply)) => {
            qlog_debug!(
                "Agent {} responded in {}ms ({} chars)",
                identity.name,
                elapsed_ms(start),
                reply.content.len()
            );
            Response::success(identity, reply, start.elapsed())
        }
        Ok(Err(e)) => {
            qlog_warn!("Agent {} failed: {}", identity.name, e);
            Response::failure(identity, e.reason(), start.elapsed())
        }
        Err(_) => {
            qlog_warn!("Agent {} timed out after {:?}", identity.name, timeout);
            Response::failure(identity, "timeout", start.elapsed())
        }
    }
}
