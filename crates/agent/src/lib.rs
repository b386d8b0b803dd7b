//! The agent loop: drives a surface toward a goal.
//!
//! Each iteration follows a **Predict → Execute → Verify → Check** cycle:
//!
//! 1. **Predict** the next action from the current snapshot, the goal and
//!    the full action history
//! 2. **Synthesize** code for the action and run it against the surface,
//!    retrying with the previous fault up to a bounded number of attempts
//! 3. **Verify** the effect by comparing a fresh snapshot with the one the
//!    action was predicted from
//! 4. **Check** whether the goal is met, and return the relevant data if so
//!
//! A failed action is recorded with its reason and the loop predicts again
//! from the pre-action snapshot. The loop only stops early when a
//! configured iteration or time budget runs out.

pub mod loop_runner;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::AgentLoop;
pub use state::{BacktrackPolicy, LoopPhase, LoopState, PlanReport, RunReport};
