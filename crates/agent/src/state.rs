//! Loop state threaded through each transition of the agent loop.

use navpilot_core::{Action, ActionHistory, Goal, RelevantDatum, SurfaceSnapshot};
use serde::Serialize;
use tracing::debug;

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Start,
    Predict,
    SynthesizeExecute,
    Verify,
    GoalCheck,
    Done,
    Aborted,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Predict => "predict",
            Self::SynthesizeExecute => "synthesize_execute",
            Self::Verify => "verify",
            Self::GoalCheck => "goal_check",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Everything a run carries from one iteration to the next.
///
/// Owned by the loop and passed by value into each transition, which
/// returns the next state.
#[derive(Debug)]
pub struct LoopState {
    pub goal: Goal,

    /// The snapshot the next prediction is made against
    pub current: SurfaceSnapshot,

    pub history: ActionHistory,
    pub iterations: u32,
    pub phase: LoopPhase,
}

impl LoopState {
    pub fn new(goal: Goal, first: SurfaceSnapshot) -> Self {
        Self {
            goal,
            current: first,
            history: ActionHistory::new(),
            iterations: 0,
            phase: LoopPhase::Start,
        }
    }

    /// Move to `phase`.
    pub fn enter(mut self, phase: LoopPhase) -> Self {
        debug!(iteration = self.iterations, from = %self.phase, to = %phase, "Phase transition");
        self.phase = phase;
        self
    }
}

/// What to do with the live surface after an action is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BacktrackPolicy {
    /// Keep going from wherever the surface is
    #[default]
    ForwardOnly,
    /// Ask the surface to return to the pre-action location
    RestoreLocation,
}

impl std::str::FromStr for BacktrackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward_only" => Ok(Self::ForwardOnly),
            "restore_location" => Ok(Self::RestoreLocation),
            other => Err(format!("unknown backtrack policy '{other}'")),
        }
    }
}

/// The result of a run that reached its goal.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Complete (label, value) pairs from the final goal check
    pub relevant_data: Vec<RelevantDatum>,

    /// Every action taken, in order, with its outcome
    pub history: Vec<Action>,

    pub iterations: u32,

    /// Where the surface ended up
    pub final_location: String,
}

/// Results of each plan step, in order.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub description: String,
    pub steps: Vec<RunReport>,
}

impl PlanReport {
    pub fn relevant_data(&self) -> impl Iterator<Item = &RelevantDatum> {
        self.steps.iter().flat_map(|s| s.relevant_data.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navpilot_core::SurfaceKind;

    #[test]
    fn enter_updates_phase() {
        let state = LoopState::new(
            Goal::new("g"),
            SurfaceSnapshot::new(SurfaceKind::Web, "https://a"),
        );
        assert_eq!(state.phase, LoopPhase::Start);
        let state = state.enter(LoopPhase::Predict);
        assert_eq!(state.phase, LoopPhase::Predict);
        assert!(state.history.is_empty());
    }

    #[test]
    fn backtrack_policy_parsing() {
        assert_eq!(
            "restore_location".parse::<BacktrackPolicy>().unwrap(),
            BacktrackPolicy::RestoreLocation
        );
        assert_eq!(BacktrackPolicy::default(), BacktrackPolicy::ForwardOnly);
        assert!("rewind".parse::<BacktrackPolicy>().is_err());
    }

    #[test]
    fn phase_display() {
        assert_eq!(LoopPhase::SynthesizeExecute.to_string(), "synthesize_execute");
    }
}
