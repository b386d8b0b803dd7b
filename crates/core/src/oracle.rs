//! ReasoningOracle trait — the contract between the agent loop and the
//! external reasoning service.
//!
//! The oracle is stateless from the loop's point of view: every call gets
//! the snapshot, goal, and history it needs as arguments, and none of the
//! operations mutates loop state.

use crate::action::{
    Action, ActionKind, CodeActionResult, FeedbackResult, Goal, GoalCheckResult, StartLocation,
};
use crate::error::OracleError;
use crate::surface::{ExecutionOutcome, Surface, SurfaceSnapshot};
use async_trait::async_trait;

/// A validated oracle response.
///
/// Shape faults and transport faults are explicit variants so callers never
/// see a raw parse error.
#[derive(Debug, Clone)]
pub enum OracleReply<T> {
    /// The response parsed and passed validation.
    Valid(T),

    /// A response arrived but did not have the expected shape.
    Malformed { reason: String, raw: String },

    /// No usable response arrived.
    Unavailable(OracleError),
}

impl<T> OracleReply<T> {
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The valid value, discarding fault details.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Valid(v) => Some(v),
            _ => None,
        }
    }

    /// Why the reply is unusable, or `None` for a valid reply.
    pub fn fault(&self) -> Option<String> {
        match self {
            Self::Valid(_) => None,
            Self::Malformed { reason, .. } => Some(format!("malformed response: {reason}")),
            Self::Unavailable(e) => Some(e.to_string()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OracleReply<U> {
        match self {
            Self::Valid(v) => OracleReply::Valid(f(v)),
            Self::Malformed { reason, raw } => OracleReply::Malformed { reason, raw },
            Self::Unavailable(e) => OracleReply::Unavailable(e),
        }
    }
}

/// The callback the oracle uses to run each synthesized snippet.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> ExecutionOutcome;
}

/// Adapts a [`Surface`] into the [`CodeRunner`] handed to code synthesis.
pub struct SurfaceRunner<'a>(pub &'a dyn Surface);

#[async_trait]
impl CodeRunner for SurfaceRunner<'_> {
    async fn run(&self, code: &str) -> ExecutionOutcome {
        self.0.execute(code).await
    }
}

/// The five operations the agent loop requires from a reasoning service.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Map a goal to the location the surface should start from.
    async fn classify_start_location(&self, goal: &Goal) -> OracleReply<StartLocation>;

    /// Predict the next action given the current state and everything tried so far.
    async fn predict_next_action(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        history: &[Action],
    ) -> OracleReply<Action>;

    /// Synthesize code for `action` and run it through `runner`.
    ///
    /// Makes at most `max_retries` attempts and never invokes `runner` more
    /// than `max_retries` times. Returns the first success or the last failure.
    async fn synthesize_and_run_code(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        action: &Action,
        max_retries: u32,
        runner: &dyn CodeRunner,
    ) -> CodeActionResult;

    /// Judge whether `action` had its expected effect.
    async fn evaluate_action_feedback(
        &self,
        before: &SurfaceSnapshot,
        after: &SurfaceSnapshot,
        action: &Action,
    ) -> OracleReply<FeedbackResult>;

    /// Judge whether the goal is satisfied.
    async fn evaluate_goal_completion(
        &self,
        snapshot: &SurfaceSnapshot,
        goal: &Goal,
        new_information: &str,
    ) -> OracleReply<GoalCheckResult>;
}

/// Whether `kind` may be proposed on a snapshot's surface.
///
/// An empty `available_actions` list means the surface did not restrict kinds.
pub fn kind_available(snapshot: &SurfaceSnapshot, kind: ActionKind) -> bool {
    snapshot.available_actions.is_empty() || snapshot.available_actions.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::surface::SurfaceKind;

    #[test]
    fn reply_fault_descriptions() {
        let valid: OracleReply<u8> = OracleReply::Valid(1);
        assert!(valid.fault().is_none());

        let malformed: OracleReply<u8> = OracleReply::malformed("missing endGoalMet", "{}");
        assert!(malformed.fault().unwrap().contains("missing endGoalMet"));

        let unavailable: OracleReply<u8> =
            OracleReply::Unavailable(ProviderError::Timeout("120s".into()).into());
        assert!(unavailable.fault().unwrap().contains("120s"));
    }

    #[test]
    fn reply_map_preserves_faults() {
        let reply: OracleReply<u8> = OracleReply::malformed("bad", "raw");
        let mapped = reply.map(|v| v as u32 * 2);
        assert!(matches!(mapped, OracleReply::Malformed { .. }));

        let doubled = OracleReply::Valid(21u8).map(|v| v as u32 * 2).ok();
        assert_eq!(doubled, Some(42));
    }

    #[test]
    fn unrestricted_snapshot_allows_every_kind() {
        let mut snap = SurfaceSnapshot::new(SurfaceKind::Desktop, "Word");
        assert!(kind_available(&snap, ActionKind::Navigate));

        snap.available_actions = vec![ActionKind::Click, ActionKind::Type];
        assert!(kind_available(&snap, ActionKind::Click));
        assert!(!kind_available(&snap, ActionKind::Navigate));
    }
}
