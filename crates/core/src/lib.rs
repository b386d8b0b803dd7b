//! # NavPilot Core
//!
//! Domain types, traits, and error definitions for the NavPilot surface
//! automation agent. The oracle, surface, and agent crates all build on
//! the model defined here.
//!
//! Every collaborator of the agent loop is a trait here:
//! - [`ReasoningOracle`] — predicts actions, synthesizes code, judges effects
//! - [`Surface`] — the live web page or desktop window tree
//! - [`Provider`] — the LLM backend an oracle may be built on
//!
//! The loop depends only on these traits, so it can be exercised in
//! isolation with scripted fakes.

pub mod action;
pub mod error;
pub mod event;
pub mod message;
pub mod oracle;
pub mod plan;
pub mod provider;
pub mod surface;

pub use action::{
    Action, ActionHistory, ActionKind, ActionOutcome, CodeActionResult, DataPair, FeedbackResult,
    Goal, GoalCheckResult, RelevantDatum, StartLocation,
};
pub use error::{Error, OracleError, ProviderError, Result, RunError, SurfaceError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use oracle::{CodeRunner, OracleReply, ReasoningOracle, SurfaceRunner};
pub use plan::{PlanStep, ToolsetPlan};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat, Usage};
pub use surface::{
    ElementInfo, ExecutionOutcome, SnapshotDiff, Surface, SurfaceKind, SurfaceSnapshot,
};
