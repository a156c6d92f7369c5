use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    User,
    Assistant,
    Tool,
}

/// A fully-assembled tool call carried by an assistant message. `args` is the
/// parsed JSON value; raw fragment text never leaves the stream accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// Outcome of one tool execution, keyed back to its request id. Exactly one
/// of `payload` / `error` is set; use the constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// One entry in the conversation log. Immutable once appended; `tool_calls`
/// is only populated for `Assistant` messages and `tool_result` only for
/// `Tool` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolCallResult>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            text: text.into(),
            tool_calls: vec![],
            tool_result: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::User,
            text: text.into(),
            tool_calls: vec![],
            tool_result: None,
        }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            kind: MessageKind::Assistant,
            text: text.into(),
            tool_calls,
            tool_result: None,
        }
    }

    pub fn tool(result: ToolCallResult) -> Self {
        Self {
            kind: MessageKind::Tool,
            text: String::new(),
            tool_calls: vec![],
            tool_result: Some(result),
        }
    }
}
