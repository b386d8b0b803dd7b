//! Surface trait — the abstraction over the live thing being automated.
//!
//! A surface is either a web page (driven through WebDriver) or a desktop
//! window tree (driven through a scripting shell). The agent loop only ever
//! sees this capability interface: open a start location, capture a
//! snapshot, execute synthesized code, and optionally restore a prior state.

use crate::action::{ActionKind, StartLocation};
use crate::error::SurfaceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which family of surface produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    Web,
    Desktop,
}

impl std::fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Web => f.write_str("web"),
            Self::Desktop => f.write_str("desktop"),
        }
    }
}

/// One interactive element visible on the surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementInfo {
    /// CSS selector (web) or XPath into the UI tree (desktop)
    pub selector: String,

    /// Tag name or control type ("button", "input", "Edit", ...)
    pub role: String,

    /// Visible text, accessible name, or placeholder
    #[serde(default)]
    pub label: String,
}

/// An immutable, point-in-time view of the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub surface: SurfaceKind,

    /// URL for a page, window handle or title for a desktop window
    pub location: String,

    #[serde(default)]
    pub title: String,

    /// Visible text content, possibly truncated by the capturing surface
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub elements: Vec<ElementInfo>,

    /// Action kinds the capturing surface can carry out
    #[serde(default)]
    pub available_actions: Vec<ActionKind>,

    pub captured_at: DateTime<Utc>,
}

impl SurfaceSnapshot {
    pub fn new(surface: SurfaceKind, location: impl Into<String>) -> Self {
        Self {
            surface,
            location: location.into(),
            title: String::new(),
            content: String::new(),
            elements: Vec::new(),
            available_actions: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    /// Whether two snapshots describe the same surface state.
    ///
    /// Capture time is ignored.
    pub fn same_state(&self, other: &SurfaceSnapshot) -> bool {
        self.surface == other.surface
            && self.location == other.location
            && self.title == other.title
            && self.content == other.content
            && self.elements == other.elements
    }

    /// Describe what changed going from `self` to `after`.
    pub fn diff(&self, after: &SurfaceSnapshot) -> SnapshotDiff {
        let before_elements: HashSet<&ElementInfo> = self.elements.iter().collect();
        let after_elements: HashSet<&ElementInfo> = after.elements.iter().collect();

        let elements_added = after
            .elements
            .iter()
            .filter(|e| !before_elements.contains(e))
            .cloned()
            .collect();
        let elements_removed = self
            .elements
            .iter()
            .filter(|e| !after_elements.contains(e))
            .cloned()
            .collect();

        SnapshotDiff {
            location: (self.location != after.location)
                .then(|| (self.location.clone(), after.location.clone())),
            title: (self.title != after.title).then(|| (self.title.clone(), after.title.clone())),
            content_changed: self.content != after.content,
            content_len_delta: after.content.chars().count() as i64
                - self.content.chars().count() as i64,
            elements_added,
            elements_removed,
        }
    }
}

/// Locally computed difference between two adjacent snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// (before, after) when the location changed
    pub location: Option<(String, String)>,

    /// (before, after) when the title changed
    pub title: Option<(String, String)>,

    pub content_changed: bool,

    /// Change in visible content length, in characters
    pub content_len_delta: i64,

    pub elements_added: Vec<ElementInfo>,
    pub elements_removed: Vec<ElementInfo>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.title.is_none()
            && !self.content_changed
            && self.elements_added.is_empty()
            && self.elements_removed.is_empty()
    }

    /// One line per observed change, for inclusion in oracle requests.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no observable change".into();
        }
        let mut lines = Vec::new();
        if let Some((from, to)) = &self.location {
            lines.push(format!("location: {from} -> {to}"));
        }
        if let Some((from, to)) = &self.title {
            lines.push(format!("title: '{from}' -> '{to}'"));
        }
        if self.content_changed {
            lines.push(format!(
                "content changed ({:+} chars)",
                self.content_len_delta
            ));
        }
        if !self.elements_added.is_empty() {
            lines.push(format!("{} elements appeared", self.elements_added.len()));
        }
        if !self.elements_removed.is_empty() {
            lines.push(format!("{} elements disappeared", self.elements_removed.len()));
        }
        lines.join("\n")
    }
}

/// Result of running synthesized code against the surface.
///
/// Faults are data: an executor never panics or propagates an error for a
/// failing script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,

    #[serde(default)]
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl ExecutionOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            fault: None,
        }
    }

    pub fn fault(fault: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            fault: Some(fault.into()),
        }
    }
}

/// The capability interface every automatable surface implements.
#[async_trait]
pub trait Surface: Send + Sync {
    fn kind(&self) -> SurfaceKind;

    /// The action kinds this surface can carry out.
    fn action_kinds(&self) -> &[ActionKind];

    /// Navigate to (web) or launch and focus (desktop) the start location.
    async fn open(&self, location: &StartLocation) -> Result<(), SurfaceError>;

    /// Capture a fresh snapshot of the current state.
    async fn snapshot(&self) -> Result<SurfaceSnapshot, SurfaceError>;

    /// Run synthesized code. Must return faults as data.
    async fn execute(&self, code: &str) -> ExecutionOutcome;

    /// Try to bring the surface back to the state captured in `snapshot`.
    ///
    /// Returns `Ok(false)` when the surface cannot restore state.
    async fn restore(&self, snapshot: &SurfaceSnapshot) -> Result<bool, SurfaceError> {
        let _ = snapshot;
        Ok(false)
    }
}
