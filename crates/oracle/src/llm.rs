//! `LlmOracle` — a [`ReasoningOracle`] backed by a chat-completions provider.

use crate::parse;
use crate::prompts;
use async_trait::async_trait;
use navpilot_core::{
    Action, CodeActionResult, CodeRunner, DomainEvent, EventBus, FeedbackResult, Goal,
    GoalCheckResult, Message, OracleError, OracleReply, Provider, ProviderRequest,
    ReasoningOracle, ResponseFormat, StartLocation, SurfaceSnapshot,
};
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// How much of a snapshot is sent with each request, and whether candidate
/// snippets are ranked before running.
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub max_snapshot_chars: usize,
    pub max_elements: usize,
    pub rank_candidates: bool,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            max_snapshot_chars: 6000,
            max_elements: 80,
            rank_candidates: true,
        }
    }
}

/// The reasoning oracle used in production runs.
pub struct LlmOracle {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    seed: Option<u64>,
    max_tokens: Option<u32>,
    settings: OracleSettings,
    event_bus: Option<Arc<EventBus>>,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.4,
            seed: Some(923),
            max_tokens: None,
            settings: OracleSettings::default(),
            event_bus: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_settings(mut self, settings: OracleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Publish token usage of every completion on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn page(&self, snapshot: &SurfaceSnapshot) -> Value {
        prompts::snapshot_payload(
            snapshot,
            self.settings.max_snapshot_chars,
            self.settings.max_elements,
        )
    }

    /// Send one JSON-mode request and return the completion text.
    async fn ask(&self, operation: &str, system: &str, payload: Value) -> Result<String, OracleError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system), Message::user(payload.to_string())],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat::JsonObject,
            seed: self.seed,
        };

        debug!(operation, model = %self.model, "Querying oracle");
        let response = self.provider.complete(request).await?;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::OracleResponse {
                operation: operation.to_string(),
                model: response.model.clone(),
                tokens_used: response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0),
                timestamp: chrono::Utc::now(),
            });
        }

        let content = response.message.content;
        if content.trim().is_empty() {
            return Err(OracleError::EmptyCompletion {
                operation: operation.to_string(),
            });
        }
        Ok(content)
    }

    /// Ask and validate; logs any fault before handing it back.
    async fn query<T>(
        &self,
        operation: &str,
        system: &str,
        payload: Value,
        validate: impl FnOnce(&str) -> OracleReply<T> + Send,
    ) -> OracleReply<T> {
        let reply = match self.ask(operation, system, payload).await {
            Ok(raw) => validate(&raw),
            Err(e) => OracleReply::Unavailable(e),
        };
        if let Some(fault) = reply.fault() {
            warn!(operation, %fault, "Oracle reply unusable");
        }
        reply
    }

    async fn generate_candidates(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        action: &Action,
        previous: Option<(&str, &str)>,
    ) -> OracleReply<Vec<String>> {
        let mut payload = json!({
            "endGoal": goal.as_str(),
            "page": self.page(snapshot),
            "nextAction": prompts::action_payload(action),
            "dialect": prompts::dialect(snapshot.surface),
        });
        if let Some((code, failure)) = previous {
            payload["previousAttempt"] = json!({ "code": code, "error": failure });
        }

        self.query(
            "generate_code",
            prompts::code_prompt(snapshot.surface),
            payload,
            parse::code_set,
        )
        .await
    }

    /// Order candidates by relevance; keeps the given order on any fault.
    async fn rank_candidates(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        action: &Action,
        candidates: Vec<String>,
    ) -> Vec<String> {
        let payload = json!({
            "endGoal": goal.as_str(),
            "currentPageUrl": snapshot.location,
            "nextAction": prompts::action_payload(action),
            "codeSet": candidates,
        });

        let reply = self
            .query("rank_code", prompts::RANK_CODE_CANDIDATES, payload, |raw| {
                parse::ranking(raw, &candidates)
            })
            .await;

        match reply {
            OracleReply::Valid(ranked) => ranked,
            _ => {
                debug!("Keeping generated candidate order");
                candidates
            }
        }
    }
}

#[async_trait]
impl ReasoningOracle for LlmOracle {
    async fn classify_start_location(&self, goal: &Goal) -> OracleReply<StartLocation> {
        self.query(
            "classify_start_location",
            prompts::CLASSIFY_START_LOCATION,
            prompts::goal_payload(goal),
            parse::start_location,
        )
        .await
    }

    async fn predict_next_action(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        history: &[Action],
    ) -> OracleReply<Action> {
        let payload = json!({
            "endGoal": goal.as_str(),
            "page": self.page(snapshot),
            "previousActions": prompts::history_payload(history),
        });
        self.query(
            "predict_next_action",
            prompts::PREDICT_NEXT_ACTION,
            payload,
            |raw| parse::next_action(raw, snapshot),
        )
        .await
    }

    async fn synthesize_and_run_code(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        action: &Action,
        max_retries: u32,
        runner: &dyn CodeRunner,
    ) -> CodeActionResult {
        let mut attempts = 0u32;
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut tried: HashSet<String> = HashSet::new();
        // The last executed snippet and the fault it raised
        let mut last_run: Option<(String, String)> = None;
        let mut last_failure = String::from("no attempt was made");

        while attempts < max_retries {
            if queue.is_empty() {
                let previous = last_run
                    .as_ref()
                    .map(|(code, fault)| (code.as_str(), fault.as_str()));
                let generated = self.generate_candidates(snapshot, goal, action, previous).await;
                match generated {
                    OracleReply::Valid(candidates) => {
                        let fresh: Vec<String> = candidates
                            .into_iter()
                            .filter(|c| !tried.contains(c))
                            .collect();
                        if fresh.is_empty() {
                            attempts += 1;
                            last_failure = "every proposed snippet was already tried".into();
                            warn!(attempt = attempts, "No new code candidates");
                            continue;
                        }
                        let ordered = if fresh.len() > 1 && self.settings.rank_candidates {
                            self.rank_candidates(snapshot, goal, action, fresh).await
                        } else {
                            fresh
                        };
                        queue.extend(ordered);
                    }
                    reply => {
                        attempts += 1;
                        last_failure = reply
                            .fault()
                            .unwrap_or_else(|| "code generation failed".into());
                        continue;
                    }
                }
            }

            let Some(code) = queue.pop_front() else {
                continue;
            };
            attempts += 1;
            tried.insert(code.clone());

            let outcome = runner.run(&code).await;
            if outcome.success {
                debug!(attempt = attempts, "Code action succeeded");
                return CodeActionResult::succeeded(code, outcome.output, attempts);
            }

            let fault = outcome
                .fault
                .unwrap_or_else(|| "execution reported failure".into());
            warn!(attempt = attempts, fault = %fault, "Code action failed");
            last_failure = fault.clone();
            last_run = Some((code, fault));
        }

        CodeActionResult::failed(last_run.map(|(code, _)| code), last_failure, attempts)
    }

    async fn evaluate_action_feedback(
        &self,
        before: &SurfaceSnapshot,
        after: &SurfaceSnapshot,
        action: &Action,
    ) -> OracleReply<FeedbackResult> {
        if before.same_state(after) {
            debug!("Snapshots are identical, skipping feedback request");
            return OracleReply::Valid(FeedbackResult::unchanged());
        }

        let payload = json!({
            "beforePage": self.page(before),
            "afterPage": self.page(after),
            "takenAction": prompts::action_payload(action),
            "observedChanges": before.diff(after).summary(),
        });
        self.query(
            "evaluate_action_feedback",
            prompts::EVALUATE_ACTION_FEEDBACK,
            payload,
            parse::feedback,
        )
        .await
    }

    async fn evaluate_goal_completion(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        new_information: &str,
    ) -> OracleReply<GoalCheckResult> {
        let payload = json!({
            "endGoal": goal.as_str(),
            "page": self.page(snapshot),
            "newInformation": new_information,
        });
        self.query(
            "evaluate_goal_completion",
            prompts::EVALUATE_GOAL_COMPLETION,
            payload,
            parse::goal_check,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingRunner, SequentialMockProvider, make_text_response};
    use navpilot_core::{ActionKind, ExecutionOutcome, ProviderError, SurfaceKind};

    fn snapshot(location: &str) -> SurfaceSnapshot {
        let mut snap = SurfaceSnapshot::new(SurfaceKind::Web, location);
        snap.title = "Search".into();
        snap.available_actions = ActionKind::ALL.to_vec();
        snap
    }

    fn oracle(provider: &Arc<SequentialMockProvider>) -> LlmOracle {
        LlmOracle::new(provider.clone(), "gpt-4o")
    }

    fn click() -> Action {
        Action::new(ActionKind::Click, "Search button", "Run the search")
    }

    #[tokio::test]
    async fn classify_uses_json_mode_and_seed() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"startPage":"https://www.bing.com/shopping"}"#,
        ]));
        let reply = oracle(&provider)
            .classify_start_location(&Goal::new("Find the price of a laptop"))
            .await;
        assert_eq!(reply.ok().unwrap().target, "https://www.bing.com/shopping");

        let request = &provider.requests()[0];
        assert_eq!(request.response_format, ResponseFormat::JsonObject);
        assert_eq!(request.seed, Some(923));
        assert!((request.temperature - 0.4).abs() < f32::EPSILON);
        assert!(request.messages[1].content.contains("Find the price of a laptop"));
    }

    #[tokio::test]
    async fn classify_transport_fault_is_unavailable() {
        let provider = Arc::new(SequentialMockProvider::with_results(vec![Err(
            ProviderError::Network("connection refused".into()),
        )]));
        let reply = oracle(&provider)
            .classify_start_location(&Goal::new("anything"))
            .await;
        assert!(matches!(reply, OracleReply::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_completion_is_unavailable() {
        let provider = Arc::new(SequentialMockProvider::texts(&["   "]));
        let reply = oracle(&provider)
            .evaluate_goal_completion(&snapshot("https://a"), &Goal::new("g"), "")
            .await;
        match reply {
            OracleReply::Unavailable(OracleError::EmptyCompletion { operation }) => {
                assert_eq!(operation, "evaluate_goal_completion");
            }
            other => panic!("expected empty completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prediction_sends_history() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"actionType":"type","actionTarget":"Search box","actionDescription":"Type the product name","actionInput":"surface laptop"}"#,
        ]));
        let mut history = navpilot_core::ActionHistory::new();
        let idx = history.record(click());
        history.settle_failure(idx, "no such element");

        let action = oracle(&provider)
            .predict_next_action(&snapshot("https://a"), &Goal::new("g"), history.as_slice())
            .await
            .ok()
            .unwrap();
        assert_eq!(action.kind, ActionKind::Type);
        assert_eq!(action.input.as_deref(), Some("surface laptop"));
        assert!(!action.is_settled());

        let payload = &provider.requests()[0].messages[1].content;
        assert!(payload.contains("no such element"));
    }

    #[tokio::test]
    async fn code_retry_bound_is_respected() {
        // One generation with four candidates; ranking keeps their order
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"codeSet":["a()","b()","c()","d()"]}"#,
            r#"{"codeSetByRelevance":["a()","b()","c()","d()"]}"#,
        ]));
        let runner = RecordingRunner::always_failing();

        let result = oracle(&provider)
            .synthesize_and_run_code(&snapshot("https://a"), &Goal::new("g"), &click(), 3, &runner)
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(runner.calls(), vec!["a()", "b()", "c()"]);
        assert_eq!(result.code.as_deref(), Some("c()"));
        assert_eq!(result.failure.as_deref(), Some("element not found"));
    }

    #[tokio::test]
    async fn regeneration_receives_last_failure_and_skips_tried_code() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"codeSet":["a()"]}"#,
            r#"{"codeSet":["a()","b()"]}"#,
        ]));
        let runner = RecordingRunner::new(vec![
            ExecutionOutcome::fault("TypeError: null"),
            ExecutionOutcome::ok("clicked"),
        ]);

        let result = oracle(&provider)
            .with_settings(OracleSettings {
                rank_candidates: false,
                ..OracleSettings::default()
            })
            .synthesize_and_run_code(&snapshot("https://a"), &Goal::new("g"), &click(), 3, &runner)
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(runner.calls(), vec!["a()", "b()"]);
        assert_eq!(result.output.as_deref(), Some("clicked"));

        let second = &provider.requests()[1].messages[1].content;
        assert!(second.contains("previousAttempt"));
        assert!(second.contains("TypeError: null"));
    }

    #[tokio::test]
    async fn previous_attempt_keeps_the_execution_fault_of_its_code() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"codeSet":["a()"]}"#,
            "Sorry, no code this time.",
            r#"{"codeSet":["b()"]}"#,
        ]));
        let runner = RecordingRunner::new(vec![
            ExecutionOutcome::fault("TypeError: null"),
            ExecutionOutcome::ok("clicked"),
        ]);

        let result = oracle(&provider)
            .with_settings(OracleSettings {
                rank_candidates: false,
                ..OracleSettings::default()
            })
            .synthesize_and_run_code(&snapshot("https://a"), &Goal::new("g"), &click(), 4, &runner)
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(runner.calls(), vec!["a()", "b()"]);

        let third = &provider.requests()[2].messages[1].content;
        assert!(third.contains("a()"));
        assert!(third.contains("TypeError: null"));
        assert!(!third.contains("no JSON object"));
    }

    #[tokio::test]
    async fn malformed_generation_consumes_an_attempt() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "I cannot write that code.",
            r#"{"codeSet":[]}"#,
            "{",
        ]));
        let runner = RecordingRunner::always_failing();

        let result = oracle(&provider)
            .synthesize_and_run_code(&snapshot("https://a"), &Goal::new("g"), &click(), 3, &runner)
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert!(runner.calls().is_empty());
        assert!(result.code.is_none());
    }

    #[tokio::test]
    async fn ranking_reorders_candidates() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"codeSet":["slow()","best()"]}"#,
            r#"{"codeSetByRelevance":["best()","slow()"]}"#,
        ]));
        let runner = RecordingRunner::new(vec![ExecutionOutcome::ok("")]);

        let result = oracle(&provider)
            .synthesize_and_run_code(&snapshot("https://a"), &Goal::new("g"), &click(), 3, &runner)
            .await;
        assert!(result.success);
        assert_eq!(runner.calls(), vec!["best()"]);
    }

    #[tokio::test]
    async fn bad_ranking_falls_back_to_generated_order() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"codeSet":["first()","second()"]}"#,
            r#"{"codeSetByRelevance":["invented()"]}"#,
        ]));
        let runner = RecordingRunner::new(vec![ExecutionOutcome::ok("")]);

        oracle(&provider)
            .synthesize_and_run_code(&snapshot("https://a"), &Goal::new("g"), &click(), 3, &runner)
            .await;
        assert_eq!(runner.calls(), vec!["first()"]);
    }

    #[tokio::test]
    async fn zero_retries_never_runs_code() {
        let provider = Arc::new(SequentialMockProvider::texts(&[]));
        let runner = RecordingRunner::always_failing();
        let result = oracle(&provider)
            .synthesize_and_run_code(&snapshot("https://a"), &Goal::new("g"), &click(), 0, &runner)
            .await;
        assert!(!result.success);
        assert_eq!(result.attempts, 0);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn identical_snapshots_short_circuit_feedback() {
        // No scripted responses: any provider call would panic
        let provider = Arc::new(SequentialMockProvider::texts(&[]));
        let snap = snapshot("https://a");
        let feedback = oracle(&provider)
            .evaluate_action_feedback(&snap, &snap.clone(), &click())
            .await
            .ok()
            .unwrap();
        assert!(!feedback.action_success);
        assert!(feedback.page_state_changes.is_empty());
        assert!(feedback.new_information.is_empty());
    }

    #[tokio::test]
    async fn feedback_includes_local_diff() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"{"actionSuccess":true,"pageStateChanges":"Results listed","newInformation":"$999"}"#,
        ]));
        let before = snapshot("https://a");
        let after = snapshot("https://a/results");

        let feedback = oracle(&provider)
            .evaluate_action_feedback(&before, &after, &click())
            .await
            .ok()
            .unwrap();
        assert!(feedback.action_success);
        assert_eq!(feedback.new_information, "$999");

        let payload = &provider.requests()[0].messages[1].content;
        assert!(payload.contains("https://a -> https://a/results"));
    }

    #[tokio::test]
    async fn goal_check_malformed_json() {
        let provider = Arc::new(SequentialMockProvider::texts(&[r#"{"endGoalMet": tr"#]));
        let reply = oracle(&provider)
            .evaluate_goal_completion(&snapshot("https://a"), &Goal::new("g"), "")
            .await;
        assert!(matches!(reply, OracleReply::Malformed { .. }));
    }

    #[tokio::test]
    async fn usage_is_published_on_the_bus() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            r#"{"startPage":"https://example.com"}"#,
        )]));

        oracle(&provider)
            .with_event_bus(bus.clone())
            .classify_start_location(&Goal::new("g"))
            .await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::OracleResponse {
                operation,
                tokens_used,
                ..
            } => {
                assert_eq!(operation, "classify_start_location");
                assert_eq!(*tokens_used, 15);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
