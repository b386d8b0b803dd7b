//! Shared test helpers for agent loop tests.

use async_trait::async_trait;
use navpilot_core::{
    Action, ActionKind, CodeActionResult, CodeRunner, ExecutionOutcome, FeedbackResult, Goal,
    GoalCheckResult, OracleReply, ReasoningOracle, StartLocation, Surface, SurfaceError,
    SurfaceKind, SurfaceSnapshot,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A web snapshot whose content is derived from its location, so two pages
/// at different locations never compare equal.
pub fn page(location: &str) -> SurfaceSnapshot {
    let mut snap = SurfaceSnapshot::new(SurfaceKind::Web, location);
    snap.title = location.to_string();
    snap.content = format!("content of {location}");
    snap.available_actions = ActionKind::ALL.to_vec();
    snap
}

fn next<T>(queue: &Mutex<VecDeque<T>>, operation: &str) -> T {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| panic!("ScriptedOracle: no more {operation} replies"))
}

/// An oracle that returns scripted replies, one queue per operation.
///
/// Panics if an operation is called more often than it was scripted.
#[derive(Default)]
pub struct ScriptedOracle {
    starts: Mutex<VecDeque<OracleReply<StartLocation>>>,
    predictions: Mutex<VecDeque<OracleReply<Action>>>,
    code: Mutex<VecDeque<Vec<String>>>,
    feedback: Mutex<VecDeque<OracleReply<FeedbackResult>>>,
    goals: Mutex<VecDeque<OracleReply<GoalCheckResult>>>,

    predicted_from: Mutex<Vec<String>>,
    history_lengths: Mutex<Vec<usize>>,
    code_calls: Mutex<usize>,
    feedback_calls: Mutex<usize>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_at(self, target: &str) -> Self {
        self.start_reply(OracleReply::Valid(StartLocation::new(target)))
    }

    pub fn start_reply(self, reply: OracleReply<StartLocation>) -> Self {
        self.starts.lock().unwrap().push_back(reply);
        self
    }

    pub fn predict(self, reply: OracleReply<Action>) -> Self {
        self.predictions.lock().unwrap().push_back(reply);
        self
    }

    /// Script the snippets one synthesis call tries, in order.
    pub fn code(self, snippets: &[&str]) -> Self {
        self.code
            .lock()
            .unwrap()
            .push_back(snippets.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn feedback(self, reply: OracleReply<FeedbackResult>) -> Self {
        self.feedback.lock().unwrap().push_back(reply);
        self
    }

    pub fn goal(self, reply: OracleReply<GoalCheckResult>) -> Self {
        self.goals.lock().unwrap().push_back(reply);
        self
    }

    /// Location of the snapshot each prediction was made against.
    pub fn predicted_from(&self) -> Vec<String> {
        self.predicted_from.lock().unwrap().clone()
    }

    /// History length passed to each prediction.
    pub fn history_lengths(&self) -> Vec<usize> {
        self.history_lengths.lock().unwrap().clone()
    }

    pub fn code_calls(&self) -> usize {
        *self.code_calls.lock().unwrap()
    }

    pub fn feedback_calls(&self) -> usize {
        *self.feedback_calls.lock().unwrap()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn classify_start_location(&self, _goal: &Goal) -> OracleReply<StartLocation> {
        next(&self.starts, "start location")
    }

    async fn predict_next_action(
        &self,
        snapshot: &SurfaceSnapshot,
        _goal: &Goal,
        history: &[Action],
    ) -> OracleReply<Action> {
        self.predicted_from
            .lock()
            .unwrap()
            .push(snapshot.location.clone());
        self.history_lengths.lock().unwrap().push(history.len());
        next(&self.predictions, "prediction")
    }

    async fn synthesize_and_run_code(
        &self,
        _snapshot: &SurfaceSnapshot,
        _goal: &Goal,
        _action: &Action,
        max_retries: u32,
        runner: &dyn CodeRunner,
    ) -> CodeActionResult {
        *self.code_calls.lock().unwrap() += 1;
        let snippets = next(&self.code, "code");

        let mut last: Option<(String, String)> = None;
        let mut attempts = 0;
        for snippet in snippets.into_iter().take(max_retries as usize) {
            attempts += 1;
            let outcome = runner.run(&snippet).await;
            if outcome.success {
                return CodeActionResult::succeeded(snippet, outcome.output, attempts);
            }
            last = Some((snippet, outcome.fault.unwrap_or_default()));
        }

        match last {
            Some((code, fault)) => CodeActionResult::failed(Some(code), fault, attempts),
            None => CodeActionResult::failed(None, "no code generated", attempts),
        }
    }

    async fn evaluate_action_feedback(
        &self,
        _before: &SurfaceSnapshot,
        _after: &SurfaceSnapshot,
        _action: &Action,
    ) -> OracleReply<FeedbackResult> {
        *self.feedback_calls.lock().unwrap() += 1;
        next(&self.feedback, "feedback")
    }

    async fn evaluate_goal_completion(
        &self,
        _snapshot: &SurfaceSnapshot,
        _goal: &Goal,
        _new_information: &str,
    ) -> OracleReply<GoalCheckResult> {
        next(&self.goals, "goal check")
    }
}

/// A surface that hands out scripted snapshots and execution outcomes.
///
/// Once the snapshot queue is down to its last `Ok` entry that entry is
/// repeated. Executions succeed unless an outcome was scripted.
pub struct FakeSurface {
    snapshots: Mutex<VecDeque<Result<SurfaceSnapshot, SurfaceError>>>,
    last: Mutex<Option<SurfaceSnapshot>>,
    outcomes: Mutex<VecDeque<ExecutionOutcome>>,
    fail_open: bool,
    opened: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    restored: Mutex<Vec<String>>,
}

impl FakeSurface {
    pub fn new(snapshots: Vec<Result<SurfaceSnapshot, SurfaceError>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            last: Mutex::new(None),
            outcomes: Mutex::new(VecDeque::new()),
            fail_open: false,
            opened: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            restored: Mutex::new(Vec::new()),
        }
    }

    pub fn with_outcomes(self, outcomes: Vec<ExecutionOutcome>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes.into();
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Locations passed to `restore`.
    pub fn restored(&self) -> Vec<String> {
        self.restored.lock().unwrap().clone()
    }
}

#[async_trait]
impl Surface for FakeSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Web
    }

    fn action_kinds(&self) -> &[ActionKind] {
        &ActionKind::ALL
    }

    async fn open(&self, location: &StartLocation) -> Result<(), SurfaceError> {
        if self.fail_open {
            return Err(SurfaceError::Navigation {
                target: location.target.clone(),
                reason: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }
        self.opened.lock().unwrap().push(location.target.clone());
        Ok(())
    }

    async fn snapshot(&self) -> Result<SurfaceSnapshot, SurfaceError> {
        let next = self.snapshots.lock().unwrap().pop_front();
        match next {
            Some(Ok(snap)) => {
                *self.last.lock().unwrap() = Some(snap.clone());
                Ok(snap)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| SurfaceError::Snapshot("nothing scripted".into())),
        }
    }

    async fn execute(&self, code: &str) -> ExecutionOutcome {
        self.executed.lock().unwrap().push(code.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ExecutionOutcome::ok(""))
    }

    async fn restore(&self, snapshot: &SurfaceSnapshot) -> Result<bool, SurfaceError> {
        self.restored.lock().unwrap().push(snapshot.location.clone());
        Ok(true)
    }
}
