use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::message::{Message, MessageKind, ToolCallRequest, ToolCallResult};

/// Part-based message format used at the external boundary (the shape the
/// HTTP layer exchanges with clients). Internally everything is flattened
/// into `Message`; these types exist only for conversion at the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserPart {
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AssistantPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolPart {
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum WireMessage {
    System { content: String },
    User { content: Vec<UserPart> },
    Assistant { content: Vec<AssistantPart> },
    Tool { content: Vec<ToolPart> },
}

/// Flatten wire messages into the internal log. A tool message carrying
/// several result parts fans out into one internal `Tool` message per part.
pub fn to_messages(wire: &[WireMessage]) -> Vec<Message> {
    let mut out = Vec::with_capacity(wire.len());
    for msg in wire {
        match msg {
            WireMessage::System { content } => out.push(Message::system(content.clone())),
            WireMessage::User { content } => {
                let text = content
                    .iter()
                    .map(|UserPart::Text { text }| text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                out.push(Message::user(text));
            }
            WireMessage::Assistant { content } => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();
                for part in content {
                    match part {
                        AssistantPart::Text { text } => text_parts.push(text.as_str()),
                        AssistantPart::ToolCall {
                            tool_call_id,
                            tool_name,
                            args,
                        } => tool_calls.push(ToolCallRequest {
                            id: tool_call_id.clone(),
                            name: tool_name.clone(),
                            args: args.clone(),
                        }),
                    }
                }
                out.push(Message::assistant(text_parts.join(" "), tool_calls));
            }
            WireMessage::Tool { content } => {
                for ToolPart::ToolResult {
                    tool_call_id,
                    result,
                    is_error,
                    ..
                } in content
                {
                    let res = if is_error.unwrap_or(false) {
                        let detail = match result {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        ToolCallResult::err(tool_call_id.clone(), detail)
                    } else {
                        ToolCallResult::ok(tool_call_id.clone(), result.clone())
                    };
                    out.push(Message::tool(res));
                }
            }
        }
    }
    out
}

/// Render the internal log back into the part-based wire shape. Tool-result
/// parts need a tool name, which the internal result does not carry; it is
/// recovered from the assistant call that issued the id.
pub fn from_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut names: HashMap<&str, &str> = HashMap::new();
    for msg in messages {
        for call in &msg.tool_calls {
            names.insert(call.id.as_str(), call.name.as_str());
        }
    }

    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.kind {
            MessageKind::System => out.push(WireMessage::System {
                content: msg.text.clone(),
            }),
            MessageKind::User => out.push(WireMessage::User {
                content: vec![UserPart::Text {
                    text: msg.text.clone(),
                }],
            }),
            MessageKind::Assistant => {
                let mut content = Vec::new();
                if !msg.text.is_empty() {
                    content.push(AssistantPart::Text {
                        text: msg.text.clone(),
                    });
                }
                for call in &msg.tool_calls {
                    content.push(AssistantPart::ToolCall {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        args: call.args.clone(),
                    });
                }
                out.push(WireMessage::Assistant { content });
            }
            MessageKind::Tool => {
                let Some(res) = &msg.tool_result else {
                    warn!("tool message without result; skipping");
                    continue;
                };
                let tool_name = names
                    .get(res.id.as_str())
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                let (result, is_error) = match (&res.payload, &res.error) {
                    (_, Some(err)) => (Value::String(err.clone()), Some(true)),
                    (Some(payload), None) => (payload.clone(), None),
                    (None, None) => (Value::Null, None),
                };
                out.push(WireMessage::Tool {
                    content: vec![ToolPart::ToolResult {
                        tool_call_id: res.id.clone(),
                        tool_name,
                        result,
                        is_error,
                    }],
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_part_based_json() {
        let raw = json!([
            {"role": "system", "content": "be helpful"},
            {"role": "user", "content": [{"type": "text", "text": "hi"}]},
            {"role": "assistant", "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool-call", "toolCallId": "a1", "toolName": "search", "args": {"q": "cats"}}
            ]},
            {"role": "tool", "content": [
                {"type": "tool-result", "toolCallId": "a1", "toolName": "search", "result": {"hits": 2}}
            ]}
        ]);
        let wire: Vec<WireMessage> = serde_json::from_value(raw).unwrap();
        let messages = to_messages(&wire);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].kind, MessageKind::System);
        assert_eq!(messages[2].tool_calls[0].name, "search");
        let res = messages[3].tool_result.as_ref().unwrap();
        assert_eq!(res.payload, Some(json!({"hits": 2})));
    }

    #[test]
    fn test_error_result_part_maps_to_error_flag() {
        let wire = vec![WireMessage::Tool {
            content: vec![ToolPart::ToolResult {
                tool_call_id: "a1".into(),
                tool_name: "search".into(),
                result: json!("backend unreachable"),
                is_error: Some(true),
            }],
        }];
        let messages = to_messages(&wire);
        let res = messages[0].tool_result.as_ref().unwrap();
        assert!(res.is_err());
        assert_eq!(res.error.as_deref(), Some("backend unreachable"));
    }

    #[test]
    fn test_round_trip_recovers_tool_name() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant(
                "checking",
                vec![ToolCallRequest {
                    id: "a1".into(),
                    name: "search".into(),
                    args: json!({"q": "cats"}),
                }],
            ),
            Message::tool(ToolCallResult::ok("a1", json!({"hits": 2}))),
        ];
        let wire = from_messages(&messages);
        let WireMessage::Tool { content } = &wire[2] else {
            panic!("expected tool message");
        };
        let ToolPart::ToolResult { tool_name, .. } = &content[0];
        assert_eq!(tool_name, "search");

        assert_eq!(to_messages(&wire), messages);
    }

    #[test]
    fn test_multi_part_tool_message_fans_out() {
        let wire = vec![WireMessage::Tool {
            content: vec![
                ToolPart::ToolResult {
                    tool_call_id: "a1".into(),
                    tool_name: "search".into(),
                    result: json!(1),
                    is_error: None,
                },
                ToolPart::ToolResult {
                    tool_call_id: "a2".into(),
                    tool_name: "search".into(),
                    result: json!(2),
                    is_error: None,
                },
            ],
        }];
        assert_eq!(to_messages(&wire).len(), 2);
    }
}
