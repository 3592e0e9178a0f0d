//! Parallel dispatch correctness tests.
//!
//! These tests verify that one slow or broken agent never holds back or
//! sinks the others, and that results stay aligned with the roster.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use quorum::dispatch::Dispatcher;
use quorum::evaluate::{best_solution, CrossEvaluator, NEUTRAL_SCORE};
use quorum::Error;

use crate::fixtures::{roster, ScriptedAgent};

/// Test: one agent times out
/// Given 3 agents where one sleeps past the dispatch timeout
/// When dispatching and cross-evaluating
/// Then 3 responses come back (1 failed with "timeout") and 3 results are ranked
#[tokio::test]
async fn test_timeout_degrades_to_partial_results() {
    let fast = ScriptedAgent::new("fast", "def f(): return 1").shared();
    let steady = ScriptedAgent::new("steady", "def f(): return 2").shared();
    let slow = ScriptedAgent::new("slow", "never seen")
        .with_delay(Duration::from_secs(5))
        .shared();
    let agents = roster(&[fast, steady, slow]);

    let dispatcher = Dispatcher::new(agents.clone()).with_timeout(Duration::from_millis(200));
    let responses = dispatcher.dispatch_all("write f", None).await.unwrap();

    assert_eq!(responses.len(), 3);
    assert_eq!(
        responses.iter().map(|r| r.author.name.as_str()).collect::<Vec<_>>(),
        vec!["fast", "steady", "slow"],
        "responses must stay in roster order"
    );
    assert!(!responses[0].failed);
    assert!(!responses[1].failed);
    assert!(responses[2].failed);
    assert_eq!(responses[2].failure_reason.as_deref(), Some("timeout"));

    let results = CrossEvaluator::new(agents)
        .evaluate_responses("write f", &responses)
        .await;
    assert_eq!(results.len(), 3);

    let mut ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2, 3]);

    let last = results.iter().find(|r| r.rank == 3).unwrap();
    assert_eq!(last.response.author.name, "slow", "failed response ranks last");
    assert!(best_solution(&results).unwrap().average_score > last.average_score);
}

/// Test: fan-out is concurrent
/// Given 4 agents that each take 300ms
/// When dispatching
/// Then the whole batch takes about as long as one agent
#[tokio::test]
async fn test_dispatch_runs_agents_concurrently() {
    let agents: Vec<_> = (0..4)
        .map(|i| {
            ScriptedAgent::new(&format!("agent{}", i), "ok")
                .with_delay(Duration::from_millis(300))
                .shared()
        })
        .collect();

    let start = Instant::now();
    let responses = Dispatcher::new(roster(&agents))
        .dispatch_all("p", None)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(responses.len(), 4);
    assert!(responses.iter().all(|r| !r.failed));
    assert!(
        elapsed < Duration::from_millis(1000),
        "4 x 300ms agents took {:?}; dispatch is not concurrent",
        elapsed
    );
    for agent in &agents {
        assert_eq!(agent.respond_calls.load(Ordering::SeqCst), 1);
    }
}

/// Test: every agent fails
/// Given 2 agents that both error
/// When dispatching and evaluating
/// Then the query still yields 2 ranked failed results
#[tokio::test]
async fn test_all_agents_failing_still_ranks() {
    let a = ScriptedAgent::new("a", "").failing("rate limited").shared();
    let b = ScriptedAgent::new("b", "").failing("exit code 1").shared();
    let agents = roster(&[a, b]);

    let responses = Dispatcher::new(agents.clone())
        .dispatch_all("p", None)
        .await
        .unwrap();
    assert!(responses.iter().all(|r| r.failed));
    assert_eq!(responses[0].failure_reason.as_deref(), Some("rate limited"));
    assert_eq!(responses[1].failure_reason.as_deref(), Some("exit code 1"));

    let results = CrossEvaluator::new(agents)
        .evaluate_responses("p", &responses)
        .await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[1].rank, 2);
}

/// Test: a hanging evaluator
/// Given an evaluator that never answers within the evaluation timeout
/// When cross-evaluating
/// Then its cells fall back to the neutral score
#[tokio::test]
async fn test_hanging_evaluator_gets_neutral_cells() {
    use async_trait::async_trait;
    use quorum::agent::{Agent, AgentIdentity, AgentReply, Context, Response, SharedAgent};
    use std::sync::Arc;

    struct Hanging(AgentIdentity);

    #[async_trait]
    impl Agent for Hanging {
        fn identity(&self) -> &AgentIdentity {
            &self.0
        }
        async fn respond(&self, _: &str, _: Option<&Context>) -> quorum::Result<AgentReply> {
            Ok(AgentReply::text("hanging answer"))
        }
        async fn evaluate(&self, _: &str, _: &Response, _: &[Response]) -> quorum::Result<f64> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(100.0)
        }
        async fn enhance(&self, _: &str, _: usize) -> quorum::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    let scorer = ScriptedAgent::new("scorer", "answer").with_score(90.0).shared();
    let mut agents = roster(&[scorer]);
    agents.push(Arc::new(Hanging(AgentIdentity::new("hanging", "stub"))) as SharedAgent);

    let responses = Dispatcher::new(agents.clone())
        .dispatch_all("p", None)
        .await
        .unwrap();
    let results = CrossEvaluator::new(agents)
        .with_timeout(Duration::from_millis(100))
        .evaluate_responses("p", &responses)
        .await;

    let scorer_result = results
        .iter()
        .find(|r| r.response.author.name == "scorer")
        .unwrap();
    assert_eq!(scorer_result.scores["hanging"], NEUTRAL_SCORE);
    assert_eq!(scorer_result.rank, 2);
    assert_eq!(results[0].response.author.name, "hanging");
    assert_eq!(results[0].average_score, 90.0);
}

/// Test: subset selection with no match
#[tokio::test]
async fn test_subset_without_match_lists_available() {
    let agents = roster(&[
        ScriptedAgent::new("claude", "x").shared(),
        ScriptedAgent::new("gemini", "y").shared(),
    ]);
    let err = Dispatcher::new(agents)
        .dispatch_to_subset("p", None, &["codex"])
        .await
        .unwrap_err();

    match err {
        Error::NoMatchingAgents { available, .. } => assert_eq!(available, "claude, gemini"),
        other => panic!("expected NoMatchingAgents, got {:?}", other),
    }
}
