use thiserror::Error;

/// Error taxonomy for one agent request. Nothing here is fatal to the
/// process: tool-level failures are folded into error-flagged results and
/// turn-level failures are returned to the caller with whatever partial
/// output was accumulated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentErrorKind {
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("malformed tool arguments for call {id}: {detail}")]
    MalformedToolArguments { id: String, detail: String },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("cancelled")]
    Cancelled,

    #[error("turn limit exceeded after {0} turns")]
    TurnLimitExceeded(usize),
}
