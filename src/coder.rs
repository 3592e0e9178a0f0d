//! Query orchestration: enhance, dispatch, cross-evaluate.

use std::time::{Duration, Instant};

use crate::agent::{fallback_questions, Context, Response, SharedAgent};
use crate::dispatch::Dispatcher;
use crate::evaluate::{best_solution, CrossEvaluator, EvaluationResult, DEFAULT_EVAL_TIMEOUT};
use crate::log::elapsed_ms;
use crate::{qlog, qlog_warn, Error, Result};

pub const DEFAULT_MAX_QUESTIONS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub context: Option<Context>,
    pub skip_enhancement: bool,
    /// Answers to the clarifying questions, matched by position.
    pub answers: Vec<String>,
    /// Restrict dispatch to these agent names.
    pub agents: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub original_prompt: String,
    pub enhanced_prompt: String,
    pub questions: Vec<String>,
    pub responses: Vec<Response>,
    /// Sorted by rank.
    pub results: Vec<EvaluationResult>,
    pub elapsed: Duration,
}

impl QueryResult {
    pub fn best(&self) -> Result<&EvaluationResult> {
        best_solution(&self.results)
    }

    pub fn by_rank(&self, rank: usize) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.rank == rank)
    }

    pub fn failed_count(&self) -> usize {
        self.responses.iter().filter(|r| r.failed).count()
    }
}

pub struct Coder {
    dispatcher: Dispatcher,
    eval_timeout: Duration,
    max_questions: usize,
}

impl Coder {
    pub fn new(agents: Vec<SharedAgent>) -> Self {
        Self::from_dispatcher(Dispatcher::new(agents))
    }

    pub fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            eval_timeout: DEFAULT_EVAL_TIMEOUT,
            max_questions: DEFAULT_MAX_QUESTIONS,
        }
    }

    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = timeout;
        self
    }

    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.dispatcher.agent_names()
    }

    /// Run one query end to end.
    ///
    /// # Errors
    ///
    /// [`Error::NoAgents`] before anything runs when the roster is empty, and
    /// [`Error::NoMatchingAgents`] when `options.agents` selects nobody.
    /// Individual agent failures never fail the query.
    pub async fn query(&self, prompt: &str, options: QueryOptions) -> Result<QueryResult> {
        if self.dispatcher.agents().is_empty() {
            return Err(Error::NoAgents);
        }
        let start = Instant::now();

        let (questions, enhanced_prompt) = if options.skip_enhancement || self.max_questions == 0 {
            (Vec::new(), prompt.to_string())
        } else {
            let questions = self.clarifying_questions(prompt).await;
            let enhanced = enhance_prompt(prompt, &questions, &options.answers);
            (questions, enhanced)
        };

        let context = options.context.as_ref();
        let responses = match &options.agents {
            Some(names) => {
                self.dispatcher
                    .dispatch_to_subset(&enhanced_prompt, context, names.as_slice())
                    .await?
            }
            None => self.dispatcher.dispatch_all(&enhanced_prompt, context).await?,
        };

        let evaluator = CrossEvaluator::new(self.dispatcher.agents().to_vec())
            .with_timeout(self.eval_timeout);
        let results = evaluator
            .evaluate_responses(&enhanced_prompt, &responses)
            .await;

        qlog!(
            "Query finished in {}ms: {} response(s), {} failed",
            elapsed_ms(start),
            responses.len(),
            responses.iter().filter(|r| r.failed).count()
        );

        Ok(QueryResult {
            original_prompt: prompt.to_string(),
            enhanced_prompt,
            questions,
            responses,
            results,
            elapsed: start.elapsed(),
        })
    }

    /// Ask the first agent for clarifying questions, falling back to the fixed set.
    pub async fn clarifying_questions(&self, prompt: &str) -> Vec<String> {
        let Some(agent) = self.dispatcher.agents().first() else {
            return fallback_questions(self.max_questions);
        };

        let outcome = tokio::time::timeout(
            self.dispatcher.timeout(),
            agent.enhance(prompt, self.max_questions),
        )
        .await;

        match outcome {
            Ok(Ok(mut questions)) if !questions.is_empty() => {
                questions.truncate(self.max_questions);
                questions
            }
            Ok(Ok(_)) => {
                qlog_warn!("{} returned no questions, using fallback", agent.name());
                fallback_questions(self.max_questions)
            }
            Ok(Err(e)) => {
                qlog_warn!("{} enhancement failed: {}, using fallback", agent.name(), e);
                fallback_questions(self.max_questions)
            }
            Err(_) => {
                qlog_warn!("{} enhancement timed out, using fallback", agent.name());
                fallback_questions(self.max_questions)
            }
        }
    }
}

/// Append a numbered clarifications section to the prompt.
pub fn enhance_prompt(prompt: &str, questions: &[String], answers: &[String]) -> String {
    if questions.is_empty() {
        return prompt.to_string();
    }

    let mut out = format!("{}\n\nClarifications:\n", prompt);
    for (i, question) in questions.iter().enumerate() {
        let answer = answers
            .get(i)
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .unwrap_or("(not specified)");
        out.push_str(&format!("{}. Q: {}\n   A: {}\n", i + 1, question, answer));
    }
    out
}
