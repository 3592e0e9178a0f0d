//! Cross-evaluation and ranking.
//!
//! Every agent in the roster scores every response it did not write. Cells
//! that fail, time out or come back outside 0..=100 are replaced with
//! [`NEUTRAL_SCORE`], so the matrix is always complete and the ranking is
//! always total.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::agent::{Response, SharedAgent};
use crate::log::elapsed_ms;
use crate::{qlog, qlog_debug, qlog_warn, Error, Result};

/// Substituted for any evaluation cell that could not produce a valid score.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Average given to the only response of a query (no peers to compare with).
pub const SINGLE_RESPONSE_SCORE: f64 = 85.0;

/// Average given to a response that received no scores at all.
pub const NO_SCORES_DEFAULT: f64 = 75.0;

/// Default bound on a single `evaluate` call.
pub const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// `matrix[candidate_index][evaluator_name] = score`.
pub type ScoreMatrix = Vec<BTreeMap<String, f64>>;

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub response: Response,
    pub scores: BTreeMap<String, f64>,
    pub average_score: f64,
    /// 1-based, 1 is best. Only meaningful once the whole list is ranked.
    pub rank: usize,
}

pub struct CrossEvaluator {
    roster: Vec<SharedAgent>,
    timeout: Duration,
}

impl CrossEvaluator {
    pub fn new(roster: Vec<SharedAgent>) -> Self {
        Self {
            roster,
            timeout: DEFAULT_EVAL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn roster(&self) -> &[SharedAgent] {
        &self.roster
    }

    /// Score, average and rank `responses`.
    ///
    /// Always returns one result per response. Ranks are exactly `1..=N`,
    /// ordered by descending average; ties keep input order.
    pub async fn evaluate_responses(
        &self,
        prompt: &str,
        responses: &[Response],
    ) -> Vec<EvaluationResult> {
        match responses {
            [] => Vec::new(),
            [only] => {
                qlog_debug!(
                    "Single response from {}, assigning {}",
                    only.author.name,
                    SINGLE_RESPONSE_SCORE
                );
                vec![EvaluationResult {
                    response: only.clone(),
                    scores: BTreeMap::new(),
                    average_score: SINGLE_RESPONSE_SCORE,
                    rank: 1,
                }]
            }
            _ => {
                let matrix = self.score_matrix(prompt, responses).await;
                rank_results(responses, matrix)
            }
        }
    }

    /// Run every (candidate, evaluator) pair concurrently and collect the cells.
    pub async fn score_matrix(&self, prompt: &str, responses: &[Response]) -> ScoreMatrix {
        let start = Instant::now();
        let prompt: Arc<str> = Arc::from(prompt);

        let mut cells: Vec<(usize, String)> = Vec::new();
        let mut handles = Vec::new();

        for (idx, candidate) in responses.iter().enumerate() {
            let candidate = Arc::new(candidate.clone());
            let others: Arc<Vec<Response>> = Arc::new(
                responses
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != idx)
                    .map(|(_, r)| r.clone())
                    .collect(),
            );

            for evaluator in &self.roster {
                // An agent never scores its own output.
                if evaluator.identity().matches(&candidate.author.name) {
                    continue;
                }
                cells.push((idx, evaluator.name().to_string()));

                let evaluator = Arc::clone(evaluator);
                let candidate = Arc::clone(&candidate);
                let others = Arc::clone(&others);
                let prompt = Arc::clone(&prompt);
                let timeout = self.timeout;
                handles.push(tokio::spawn(async move {
                    tokio::time::timeout(timeout, evaluator.evaluate(&prompt, &candidate, &others))
                        .await
                }));
            }
        }

        qlog!(
            "Cross-evaluating {} response(s) with {} cell(s)",
            responses.len(),
            cells.len()
        );

        let outcomes = join_all(handles).await;
        let mut matrix: ScoreMatrix = vec![BTreeMap::new(); responses.len()];
        let mut substituted = 0usize;

        for ((idx, evaluator), outcome) in cells.into_iter().zip(outcomes) {
            let author = &responses[idx].author.name;
            let score = match outcome {
                Ok(Ok(Ok(score))) if is_valid_score(score) => score,
                Ok(Ok(Ok(score))) => {
                    qlog_warn!(
                        "{} scored {} out of range ({}), using neutral",
                        evaluator,
                        author,
                        score
                    );
                    substituted += 1;
                    NEUTRAL_SCORE
                }
                Ok(Ok(Err(e))) => {
                    qlog_warn!("{} failed to score {}: {}", evaluator, author, e);
                    substituted += 1;
                    NEUTRAL_SCORE
                }
                Ok(Err(_)) => {
                    qlog_warn!("{} timed out scoring {}", evaluator, author);
                    substituted += 1;
                    NEUTRAL_SCORE
                }
                Err(e) => {
                    qlog_warn!("{} evaluation task aborted: {}", evaluator, e);
                    substituted += 1;
                    NEUTRAL_SCORE
                }
            };
            matrix[idx].insert(evaluator, score);
        }

        qlog!(
            "Cross-evaluation finished in {}ms ({} neutral substitution(s))",
            elapsed_ms(start),
            substituted
        );
        matrix
    }
}

fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=100.0).contains(&score)
}

/// Mean of the received scores, or [`NO_SCORES_DEFAULT`] when there are none.
pub fn average(scores: &BTreeMap<String, f64>) -> f64 {
    if scores.is_empty() {
        return NO_SCORES_DEFAULT;
    }
    scores.values().sum::<f64>() / scores.len() as f64
}

/// Pair responses with their matrix rows, then sort and assign ranks.
pub fn rank_results(responses: &[Response], matrix: ScoreMatrix) -> Vec<EvaluationResult> {
    let mut results: Vec<EvaluationResult> = responses
        .iter()
        .cloned()
        .zip(matrix.into_iter().chain(std::iter::repeat_with(BTreeMap::new)))
        .map(|(response, scores)| EvaluationResult {
            average_score: average(&scores),
            response,
            scores,
            rank: 0,
        })
        .collect();

    // sort_by is stable, so equal averages keep their input order.
    results.sort_by(|a, b| b.average_score.total_cmp(&a.average_score));
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    results
}

/// The rank-1 result.
pub fn best_solution(results: &[EvaluationResult]) -> Result<&EvaluationResult> {
    results
        .iter()
        .min_by_key(|r| r.rank)
        .ok_or(Error::NoResults)
}
