//! Error types for the NavPilot domain, one enum per collaborator.

use thiserror::Error;

/// Any NavPilot failure, for callers that do not care which collaborator raised it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Run aborted: {0}")]
    Run(#[from] RunError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to an LLM backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Faults raised while talking to the reasoning oracle.
///
/// These describe transport-level failures. A response that arrives but
/// has the wrong shape is not an error: it is reported as
/// [`crate::OracleReply::Malformed`].
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("oracle returned an empty completion for {operation}")]
    EmptyCompletion { operation: String },

    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    #[error("Surface unreachable: {0}")]
    Unreachable(String),

    #[error("Navigation to {target} failed: {reason}")]
    Navigation { target: String, reason: String },

    #[error("Failed to launch {target}: {reason}")]
    Launch { target: String, reason: String },

    #[error("Snapshot capture failed: {0}")]
    Snapshot(String),

    #[error("Surface operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Reasons a run terminates without reaching its goal.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not resolve a start location for goal '{goal}': {reason}")]
    StartLocation { goal: String, reason: String },

    #[error("surface unreachable: {0}")]
    SurfaceUnreachable(#[source] SurfaceError),

    #[error("iteration budget exhausted after {iterations} iterations")]
    IterationBudgetExhausted { iterations: u32 },

    #[error("deadline of {limit_secs}s exceeded after {iterations} iterations")]
    DeadlineExceeded { limit_secs: u64, iterations: u32 },

    #[error("plan step {index} ({tool_id}) failed: {source}")]
    PlanStepFailed {
        index: usize,
        tool_id: String,
        #[source]
        source: Box<RunError>,
    },
}
