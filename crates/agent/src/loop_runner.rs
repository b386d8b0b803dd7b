//! The agent loop implementation.

use crate::state::{BacktrackPolicy, LoopPhase, LoopState, PlanReport, RunReport};
use chrono::Utc;
use navpilot_core::{
    Action, ActionOutcome, DomainEvent, EventBus, Goal, OracleReply, ReasoningOracle, RunError,
    StartLocation, Surface, SurfaceRunner, ToolsetPlan,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one iteration.
enum Step {
    Continue(LoopState),
    Done(RunReport),
}

/// Drives a surface toward a goal: predict an action, synthesize and run
/// code for it, verify its effect, check the goal, repeat.
pub struct AgentLoop {
    oracle: Arc<dyn ReasoningOracle>,
    surface: Arc<dyn Surface>,
    event_bus: Arc<EventBus>,

    /// Code synthesis attempts per action
    max_code_retries: u32,

    max_iterations: Option<u32>,
    timeout: Option<Duration>,
    backtrack: BacktrackPolicy,
}

impl AgentLoop {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        surface: Arc<dyn Surface>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            oracle,
            surface,
            event_bus,
            max_code_retries: 3,
            max_iterations: None,
            timeout: None,
            backtrack: BacktrackPolicy::ForwardOnly,
        }
    }

    /// Set the number of code synthesis attempts per action.
    pub fn with_max_code_retries(mut self, retries: u32) -> Self {
        self.max_code_retries = retries;
        self
    }

    /// Abort a run after `max` iterations without reaching the goal.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// Abort a run once `limit` has elapsed, checked between iterations.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn with_backtrack(mut self, policy: BacktrackPolicy) -> Self {
        self.backtrack = policy;
        self
    }

    /// Run until the goal is met.
    ///
    /// Fails only when no start location can be resolved, the surface cannot
    /// be opened or captured, or a configured budget runs out. Every other
    /// failure is recorded on the action that caused it.
    pub async fn run(&self, goal: impl Into<Goal>) -> Result<RunReport, RunError> {
        let goal = goal.into();
        info!(goal = %goal, "Starting run");

        let location = match self.oracle.classify_start_location(&goal).await {
            OracleReply::Valid(location) => location,
            reply => {
                let reason = reply.fault().unwrap_or_default();
                let err = RunError::StartLocation {
                    goal: goal.to_string(),
                    reason,
                };
                return Err(self.abort(&goal, 0, err));
            }
        };

        self.run_from(goal, location).await
    }

    /// Run each step of a plan in order, starting each at its tool.
    pub async fn run_plan(&self, plan: &ToolsetPlan) -> Result<PlanReport, RunError> {
        info!(description = %plan.description, steps = plan.steps.len(), "Starting plan");

        let mut steps = Vec::with_capacity(plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate() {
            debug!(index, tool_id = %step.tool_id, "Running plan step");
            let report = self
                .run_from(
                    Goal::new(step.task_prompt.clone()),
                    StartLocation::new(step.tool_id.clone()),
                )
                .await
                .map_err(|source| RunError::PlanStepFailed {
                    index,
                    tool_id: step.tool_id.clone(),
                    source: Box::new(source),
                })?;
            steps.push(report);
        }

        Ok(PlanReport {
            description: plan.description.clone(),
            steps,
        })
    }

    async fn run_from(&self, goal: Goal, location: StartLocation) -> Result<RunReport, RunError> {
        let started = Instant::now();
        info!(goal = %goal, location = %location.target, "Opening start location");

        if let Err(e) = self.surface.open(&location).await {
            return Err(self.abort(&goal, 0, RunError::SurfaceUnreachable(e)));
        }
        let first = match self.surface.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.abort(&goal, 0, RunError::SurfaceUnreachable(e))),
        };

        self.event_bus.publish(DomainEvent::RunStarted {
            goal: goal.to_string(),
            location: first.location.clone(),
            timestamp: Utc::now(),
        });

        let mut state = LoopState::new(goal, first).enter(LoopPhase::Predict);
        loop {
            if let Some(max) = self.max_iterations {
                if state.iterations >= max {
                    let err = RunError::IterationBudgetExhausted {
                        iterations: state.iterations,
                    };
                    return Err(self.abort(&state.goal, state.iterations, err));
                }
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    let err = RunError::DeadlineExceeded {
                        limit_secs: limit.as_secs(),
                        iterations: state.iterations,
                    };
                    return Err(self.abort(&state.goal, state.iterations, err));
                }
            }

            state = match self.iterate(state).await {
                Step::Continue(next) => next,
                Step::Done(report) => return Ok(report),
            };
        }
    }

    /// One pass through predict, synthesize/execute, verify and goal check.
    async fn iterate(&self, mut state: LoopState) -> Step {
        state.iterations += 1;
        let iteration = state.iterations;

        // Predict
        let prediction = self
            .oracle
            .predict_next_action(&state.current, &state.goal, state.history.as_slice())
            .await;
        let (action, prediction_fault) = match prediction {
            OracleReply::Valid(action) => (action, None),
            reply => {
                let reason = reply.fault().unwrap_or_default();
                (Action::placeholder(reason.clone()), Some(reason))
            }
        };

        self.event_bus.publish(DomainEvent::ActionPredicted {
            iteration,
            kind: action.kind,
            description: action.description.clone(),
            timestamp: Utc::now(),
        });
        let index = state.history.record(action.clone());

        if let Some(reason) = prediction_fault {
            warn!(iteration, %reason, "No usable prediction");
            state.history.settle_failure(index, reason);
            return Step::Continue(state.enter(LoopPhase::Predict));
        }
        info!(iteration, action_kind = %action.kind, target = %action.target, "Predicted action");

        // Synthesize and execute
        let state = state.enter(LoopPhase::SynthesizeExecute);
        let runner = SurfaceRunner(self.surface.as_ref());
        let code = self
            .oracle
            .synthesize_and_run_code(
                &state.current,
                &state.goal,
                &action,
                self.max_code_retries,
                &runner,
            )
            .await;

        self.event_bus.publish(DomainEvent::CodeExecuted {
            iteration,
            success: code.success,
            attempts: code.attempts,
            timestamp: Utc::now(),
        });

        if !code.success {
            let reason = code
                .failure
                .unwrap_or_else(|| "code action failed".into());
            return Step::Continue(self.reject(state, index, reason));
        }

        // Verify
        let state = state.enter(LoopPhase::Verify);
        let after = match self.surface.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: "post-action snapshot".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                let reason = format!("could not capture the result: {e}");
                return Step::Continue(self.reject(state, index, reason));
            }
        };

        let verdict = self
            .oracle
            .evaluate_action_feedback(&state.current, &after, &action)
            .await;
        let feedback = match verdict {
            OracleReply::Valid(feedback) if feedback.action_success => feedback,
            OracleReply::Valid(feedback) => {
                let reason = if feedback.page_state_changes.is_empty() {
                    "action had no visible effect".to_string()
                } else {
                    format!("action did not have the expected effect: {}", feedback.page_state_changes)
                };
                self.publish_feedback(iteration, ActionOutcome::Failure, &feedback.page_state_changes);
                return Step::Continue(self.backtrack_and_reject(state, index, reason).await);
            }
            reply => {
                let reason = reply.fault().unwrap_or_default();
                self.publish_feedback(iteration, ActionOutcome::Failure, "");
                return Step::Continue(self.backtrack_and_reject(state, index, reason).await);
            }
        };

        let mut state = state;
        state.history.settle_success(index);
        self.publish_feedback(iteration, ActionOutcome::Success, &feedback.page_state_changes);
        info!(iteration, changes = %feedback.page_state_changes, "Action had the expected effect");

        // Goal check
        let mut state = state.enter(LoopPhase::GoalCheck);
        let check = self
            .oracle
            .evaluate_goal_completion(&after, &state.goal, &feedback.new_information)
            .await;
        state.current = after;

        let met = matches!(&check, OracleReply::Valid(c) if c.end_goal_met);
        self.event_bus.publish(DomainEvent::GoalChecked {
            iteration,
            met,
            timestamp: Utc::now(),
        });

        match check {
            OracleReply::Valid(result) if result.end_goal_met => {
                let state = state.enter(LoopPhase::Done);
                let relevant_data = result.complete_pairs();
                info!(
                    goal = %state.goal,
                    iterations = state.iterations,
                    data = relevant_data.len(),
                    "Goal met"
                );
                self.event_bus.publish(DomainEvent::RunFinished {
                    goal: state.goal.to_string(),
                    success: true,
                    iterations: state.iterations,
                    timestamp: Utc::now(),
                });
                Step::Done(RunReport {
                    relevant_data,
                    iterations: state.iterations,
                    final_location: state.current.location.clone(),
                    history: state.history.into_vec(),
                })
            }
            OracleReply::Valid(_) => {
                debug!(iteration, "Goal not met yet");
                Step::Continue(state.enter(LoopPhase::Predict))
            }
            reply => {
                warn!(iteration, fault = ?reply.fault(), "Goal check unusable, continuing");
                Step::Continue(state.enter(LoopPhase::Predict))
            }
        }
    }

    /// Settle the action as failed and go back to predicting from the
    /// unchanged current snapshot.
    fn reject(&self, mut state: LoopState, index: usize, reason: String) -> LoopState {
        warn!(iteration = state.iterations, phase = %state.phase, %reason, "Action failed");
        state.history.settle_failure(index, reason);
        state.enter(LoopPhase::Predict)
    }

    async fn backtrack_and_reject(&self, state: LoopState, index: usize, reason: String) -> LoopState {
        if self.backtrack == BacktrackPolicy::RestoreLocation {
            match self.surface.restore(&state.current).await {
                Ok(true) => debug!(location = %state.current.location, "Restored pre-action location"),
                Ok(false) => debug!("Surface cannot restore state"),
                Err(e) => warn!(error = %e, "Restore failed"),
            }
        }
        self.reject(state, index, reason)
    }

    fn publish_feedback(&self, iteration: u32, outcome: ActionOutcome, changes: &str) {
        self.event_bus.publish(DomainEvent::FeedbackEvaluated {
            iteration,
            outcome,
            changes: changes.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Log and publish a fatal error, then hand it back.
    fn abort(&self, goal: &Goal, iterations: u32, err: RunError) -> RunError {
        warn!(goal = %goal, iterations, phase = %LoopPhase::Aborted, error = %err, "Run aborted");
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: "run".into(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
        self.event_bus.publish(DomainEvent::RunFinished {
            goal: goal.to_string(),
            success: false,
            iterations,
            timestamp: Utc::now(),
        });
        err
    }
}
