use thiserror::Error;

/// Error taxonomy for a turn of the agent loop.
///
/// `Cancelled` is the one variant that is never surfaced to the user: it
/// marks a deliberate abort and is swallowed at the loop boundary. Every
/// other variant produces a bounded notification plus a telemetry report.
#[derive(Debug, Error)]
pub enum AgentError {
    /// User-initiated abort; handled silently
    #[error("turn cancelled")]
    Cancelled,

    /// The planner call failed (network/LLM error); no partial plan exists
    #[error("planner failed: {0}")]
    Planner(String),

    /// A single action failed during dispatch
    #[error("action '{name}' failed: {message}")]
    Action { name: String, message: String },

    /// Referenced a thread index that does not exist
    #[error("no thread at index {0}")]
    InvalidThread(usize),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}
