//! Goal, action, and stage-result domain types.
//!
//! These are the values that flow through one iteration of the agent loop:
//! the oracle predicts an [`Action`], code synthesis yields a
//! [`CodeActionResult`], verification yields a [`FeedbackResult`], and the
//! goal check yields a [`GoalCheckResult`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The natural-language end state a run is driving toward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Goal(String);

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Goal {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Goal {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the surface should be opened before the first snapshot.
///
/// For a web surface the target is a URL; for a desktop surface it is a
/// tool (application) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLocation {
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl StartLocation {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            rationale: None,
        }
    }
}

/// The closed set of action kinds understood by the loop, the oracle, and
/// every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Submit,
    Navigate,
    Wait,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Click,
        ActionKind::Type,
        ActionKind::Scroll,
        ActionKind::Submit,
        ActionKind::Navigate,
        ActionKind::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Type => "type",
            Self::Scroll => "scroll",
            Self::Submit => "submit",
            Self::Navigate => "navigate",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "click" | "left-click" | "tap" | "double-click" => Ok(Self::Click),
            "type" | "fill" | "input" => Ok(Self::Type),
            "scroll" | "scroll-up" | "scroll-down" => Ok(Self::Scroll),
            "submit" | "enter" | "press-enter" => Ok(Self::Submit),
            "navigate" | "goto" | "open-url" => Ok(Self::Navigate),
            "wait" => Ok(Self::Wait),
            other => Err(format!("unknown action kind '{other}'")),
        }
    }
}

/// Terminal state of an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    #[default]
    Unknown,
    Success,
    Failure,
}

/// One predicted step toward the goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,

    /// Free-text description of the element or region the action targets
    pub target: String,

    pub description: String,

    /// Text to type, scroll direction, or URL, depending on the kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    #[serde(default)]
    outcome: ActionOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind, target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            description: description.into(),
            input: None,
            outcome: ActionOutcome::Unknown,
            failure_reason: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// The action recorded when the oracle produced no usable prediction.
    pub fn placeholder(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ActionKind::Wait,
            "",
            format!("no usable prediction: {reason}"),
        )
    }

    pub fn outcome(&self) -> ActionOutcome {
        self.outcome
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_settled(&self) -> bool {
        self.outcome != ActionOutcome::Unknown
    }

    /// Returns `false` (and leaves the action untouched) if it was already settled.
    fn settle(&mut self, outcome: ActionOutcome, reason: Option<String>) -> bool {
        if self.is_settled() || outcome == ActionOutcome::Unknown {
            return false;
        }
        self.outcome = outcome;
        self.failure_reason = reason;
        true
    }
}

/// The ordered, append-only record of every action a run has taken.
///
/// Actions can be recorded and settled, never removed or reordered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionHistory {
    actions: Vec<Action>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action and return its index.
    pub fn record(&mut self, action: Action) -> usize {
        self.actions.push(action);
        self.actions.len() - 1
    }

    pub fn settle_success(&mut self, index: usize) -> bool {
        self.actions
            .get_mut(index)
            .is_some_and(|a| a.settle(ActionOutcome::Success, None))
    }

    pub fn settle_failure(&mut self, index: usize, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.actions
            .get_mut(index)
            .is_some_and(|a| a.settle(ActionOutcome::Failure, Some(reason)))
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn last(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, outcome: ActionOutcome) -> usize {
        self.actions.iter().filter(|a| a.outcome == outcome).count()
    }

    pub fn into_vec(self) -> Vec<Action> {
        self.actions
    }
}

/// Outcome of synthesizing and running code for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeActionResult {
    pub success: bool,

    /// The last code handed to the executor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Attempts consumed, counting failed generations and executions
    pub attempts: u32,
}

impl CodeActionResult {
    pub fn succeeded(code: impl Into<String>, output: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: true,
            code: Some(code.into()),
            output: Some(output.into()),
            failure: None,
            attempts,
        }
    }

    pub fn failed(code: Option<String>, failure: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            code,
            output: None,
            failure: Some(failure.into()),
            attempts,
        }
    }
}

/// Verdict on whether an executed action had its expected effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResult {
    pub action_success: bool,
    pub page_state_changes: String,
    pub new_information: String,
}

impl FeedbackResult {
    /// The verdict for two indistinguishable snapshots.
    pub fn unchanged() -> Self {
        Self {
            action_success: false,
            page_state_changes: String::new(),
            new_information: String::new(),
        }
    }
}

/// A (label, value) pair as returned by the oracle; either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPair {
    pub label: Option<String>,
    pub value: Option<String>,
}

impl DataPair {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            value: Some(value.into()),
        }
    }

    /// Converts to a [`RelevantDatum`] when both halves are present and non-blank.
    pub fn to_datum(&self) -> Option<RelevantDatum> {
        let label = self.label.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let value = self.value.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(RelevantDatum {
            label: label.to_string(),
            value: value.to_string(),
        })
    }
}

/// A complete (label, value) pair returned to the caller of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantDatum {
    pub label: String,
    pub value: String,
}

/// Verdict on whether the goal is satisfied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalCheckResult {
    pub end_goal_met: bool,
    pub relevant_data: Vec<DataPair>,
}

impl GoalCheckResult {
    pub fn not_met() -> Self {
        Self::default()
    }

    /// Relevant data with incomplete pairs dropped, in the oracle's order.
    pub fn complete_pairs(&self) -> Vec<RelevantDatum> {
        self.relevant_data.iter().filter_map(DataPair::to_datum).collect()
    }
}
