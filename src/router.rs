use crate::message::{Message, MessageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ToolsNeeded,
    Done,
}

/// Decide whether the loop runs tools or finishes, from the last message
/// alone. An assistant message with an empty tool-call list is `Done`, not an
/// error; any non-assistant last message is also `Done`.
pub fn should_continue(last: Option<&Message>) -> Route {
    match last {
        Some(m) if m.kind == MessageKind::Assistant && !m.tool_calls.is_empty() => {
            Route::ToolsNeeded
        }
        _ => Route::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallRequest;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: "search".into(),
            args: serde_json::json!({}),
        }
    }

    #[test]
    fn test_assistant_with_calls_needs_tools() {
        let msg = Message::assistant("checking", vec![call("a1")]);
        assert_eq!(should_continue(Some(&msg)), Route::ToolsNeeded);
    }

    #[test]
    fn test_assistant_with_empty_calls_is_done() {
        let msg = Message::assistant("all set", vec![]);
        assert_eq!(should_continue(Some(&msg)), Route::Done);
    }

    #[test]
    fn test_non_assistant_is_done() {
        assert_eq!(should_continue(Some(&Message::user("hi"))), Route::Done);
        assert_eq!(should_continue(Some(&Message::system("sys"))), Route::Done);
        let tool = Message::tool(crate::message::ToolCallResult::ok(
            "a1",
            serde_json::json!(1),
        ));
        assert_eq!(should_continue(Some(&tool)), Route::Done);
    }

    #[test]
    fn test_empty_log_is_done() {
        assert_eq!(should_continue(None), Route::Done);
    }
}
