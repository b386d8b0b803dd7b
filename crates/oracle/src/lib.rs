//! # NavPilot Oracle
//!
//! [`LlmOracle`] implements the `ReasoningOracle` contract on top of any
//! chat-completions [`navpilot_core::Provider`]. Each operation is one JSON
//! request whose response is extracted, decoded and validated into an
//! `OracleReply`.

pub mod llm;
pub mod parse;
pub mod prompts;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use llm::{LlmOracle, OracleSettings};
