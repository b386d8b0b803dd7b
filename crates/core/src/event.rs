//! Domain event system — decoupled progress reporting.
//!
//! The agent loop and the oracle publish events as a run progresses. The
//! CLI (or any other observer) subscribes without the loop knowing about it.

use crate::action::{ActionKind, ActionOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Progress of a run, as seen by observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run started at a resolved location
    RunStarted {
        goal: String,
        location: String,
        timestamp: DateTime<Utc>,
    },

    /// The oracle predicted the next action
    ActionPredicted {
        iteration: u32,
        kind: ActionKind,
        description: String,
        timestamp: DateTime<Utc>,
    },

    /// Code synthesis and execution finished for an action
    CodeExecuted {
        iteration: u32,
        success: bool,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// The effect of an action was judged
    FeedbackEvaluated {
        iteration: u32,
        outcome: ActionOutcome,
        changes: String,
        timestamp: DateTime<Utc>,
    },

    /// The goal was checked
    GoalChecked {
        iteration: u32,
        met: bool,
        timestamp: DateTime<Utc>,
    },

    /// A run ended, successfully or not
    RunFinished {
        goal: String,
        success: bool,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// The oracle's provider answered a request
    OracleResponse {
        operation: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A step failed; the run may still continue
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out of [`DomainEvent`]s to any number of subscribers.
///
/// Events are shared as `Arc`s; slow subscribers lag rather than block.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // Err only means nobody is listening
        self.sender.send(Arc::new(event)).ok();
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
