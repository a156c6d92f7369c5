use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AgentErrorKind;
use crate::message::{ToolCallRequest, ToolCallResult};

/// One increment of a streamed model turn. Events arrive strictly ordered and
/// are never reordered by the accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta {
        text: String,
    },
    ToolCallDelta {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args_fragment: Option<String>,
    },
    /// Out-of-band tool result, used when a collaborator executes tools
    /// eagerly outside the barrier. Unmatched ids are dropped with a
    /// diagnostic.
    ToolResult {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TurnEnd,
}

/// A tool call reconstructed from deltas, with its parsed arguments and the
/// execution result once the dispatch barrier has run. `args_error` records a
/// parse failure at turn end; dispatch still proceeds with the best-effort
/// `args` value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolCallResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_error: Option<String>,
}

/// Final shape of one turn: accumulated text plus reconstructed tool calls.
/// `result` fields are filled by the orchestrator after dispatch, never here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnOutput {
    pub text: String,
    pub tool_calls: Vec<CompletedToolCall>,
}

impl TurnOutput {
    /// The assistant-message view of this turn's calls.
    pub fn requests(&self) -> Vec<ToolCallRequest> {
        self.tool_calls
            .iter()
            .map(|c| ToolCallRequest {
                id: c.id.clone(),
                name: c.name.clone(),
                args: c.args.clone(),
            })
            .collect()
    }

    /// Run-level aggregation: concatenate one more turn's text onto this
    /// output and adopt its calls. The outcome handed to the caller spans the
    /// whole run, not just the final turn.
    pub fn merge(&mut self, turn: TurnOutput) {
        self.text.push_str(&turn.text);
        self.tool_calls.extend(turn.tool_calls);
    }

    /// Fold barrier results back in. Ids are only unique within a turn, so a
    /// result attaches to the most recent unresolved call bearing its id.
    pub fn record_results(&mut self, results: &[ToolCallResult]) {
        for res in results {
            if let Some(call) = self
                .tool_calls
                .iter_mut()
                .rev()
                .find(|c| c.id == res.id && c.result.is_none())
            {
                call.result = Some(res.clone());
            } else if let Some(call) = self.tool_calls.iter_mut().rev().find(|c| c.id == res.id) {
                call.result = Some(res.clone());
            } else {
                warn!(id = %res.id, "dispatch result does not match any reconstructed call");
            }
        }
    }

    /// Build the output view of an already-complete assistant message
    /// (non-streaming invoker path).
    pub fn from_assistant(text: &str, calls: &[ToolCallRequest]) -> Self {
        Self {
            text: text.to_string(),
            tool_calls: calls
                .iter()
                .map(|c| CompletedToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    args: c.args.clone(),
                    result: None,
                    args_error: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PendingCall {
    seen: bool,
    id: Option<String>,
    name: String,
    args_text: String,
    result: Option<ToolCallResult>,
}

/// Reconstructs text and tool calls from an interleaved delta stream.
///
/// Per-turn state only: a text buffer, an index-keyed table of in-progress
/// calls (indices may arrive sparse and interleaved), and a lazy id-to-index
/// alias map. Argument fragments are concatenated raw and parsed once, at
/// turn end. The accumulator never executes anything.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: Vec<PendingCall>,
    index_by_id: HashMap<String, usize>,
    finished: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply one event. Returns the protocol violation when the event had to
    /// be dropped (a result for an unknown id, anything after `TurnEnd`);
    /// violations are logged here and never propagate as errors.
    pub fn push(&mut self, event: StreamEvent) -> Option<AgentErrorKind> {
        if self.finished {
            let violation =
                AgentErrorKind::ProtocolViolation("event after turn end".to_string());
            warn!(%violation, ?event, "dropping event");
            return Some(violation);
        }
        match event {
            StreamEvent::TextDelta { text } => {
                self.text.push_str(&text);
                None
            }
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                args_fragment,
            } => {
                self.push_call_delta(index, id, name, args_fragment);
                None
            }
            StreamEvent::ToolResult { id, payload, error } => {
                self.push_tool_result(id, payload, error)
            }
            StreamEvent::TurnEnd => {
                self.finished = true;
                None
            }
        }
    }

    fn push_call_delta(
        &mut self,
        index: usize,
        id: Option<String>,
        name: Option<String>,
        args_fragment: Option<String>,
    ) {
        if self.calls.len() <= index {
            self.calls.resize_with(index + 1, Default::default);
        }
        let slot = &mut self.calls[index];
        slot.seen = true;

        if let Some(idv) = id {
            match &slot.id {
                None => {
                    // An id may arrive after the first delta for its index;
                    // once bound it is permanent for the call.
                    if let Some(other) = self.index_by_id.get(&idv)
                        && *other != index
                    {
                        warn!(id = %idv, index, bound_to = other, "id already bound to another index; ignoring");
                    } else {
                        self.index_by_id.insert(idv.clone(), index);
                        slot.id = Some(idv);
                    }
                }
                Some(existing) if *existing != idv => {
                    warn!(index, current = %existing, new = %idv, "conflicting id for index; keeping first");
                }
                Some(_) => {}
            }
        }
        if let Some(n) = name
            && !n.is_empty()
        {
            slot.name.push_str(&n);
        }
        if let Some(a) = args_fragment
            && !a.is_empty()
        {
            slot.args_text.push_str(&a);
        }
    }

    fn push_tool_result(
        &mut self,
        id: String,
        payload: Option<Value>,
        error: Option<String>,
    ) -> Option<AgentErrorKind> {
        let Some(&index) = self.index_by_id.get(&id) else {
            let violation =
                AgentErrorKind::ProtocolViolation(format!("tool result for unknown id {id}"));
            warn!(%violation, "dropping out-of-band tool result");
            return Some(violation);
        };
        debug!(id = %id, index, "recording out-of-band tool result");
        self.calls[index].result = Some(ToolCallResult {
            id,
            payload,
            error,
        });
        None
    }

    /// Snapshot the current accumulation, parsing each call's concatenated
    /// argument text. Used both at `TurnEnd` and when a turn aborts mid-way
    /// and the partial output must be surfaced.
    pub fn snapshot(&self) -> TurnOutput {
        let tool_calls = self
            .calls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.seen)
            .map(|(index, c)| {
                let id = c
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{index}"));
                let trimmed = c.args_text.trim();
                let (args, args_error) = if trimmed.is_empty() {
                    (Value::Object(Default::default()), None)
                } else {
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(v) => (v, None),
                        Err(e) => {
                            // Lenient policy: dispatch proceeds with an empty
                            // object rather than aborting the turn.
                            let kind = AgentErrorKind::MalformedToolArguments {
                                id: id.clone(),
                                detail: e.to_string(),
                            };
                            warn!(%kind, "using empty object for arguments");
                            (Value::Object(Default::default()), Some(kind.to_string()))
                        }
                    }
                };
                CompletedToolCall {
                    id,
                    name: c.name.clone(),
                    args,
                    result: c.result.clone(),
                    args_error,
                }
            })
            .collect();
        TurnOutput {
            text: self.text.clone(),
            tool_calls,
        }
    }

    pub fn finish(self) -> TurnOutput {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            index,
            id: id.map(Into::into),
            name: name.map(Into::into),
            args_fragment: args.map(Into::into),
        }
    }

    #[test]
    fn test_text_only_stream_concatenates_in_order() {
        let mut acc = StreamAccumulator::new();
        for part in ["Hel", "lo ", "world"] {
            acc.push(StreamEvent::TextDelta { text: part.into() });
        }
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        assert_eq!(out.text, "Hello world");
        assert!(out.tool_calls.is_empty());
    }

    #[test]
    fn test_args_fragments_concatenate_with_late_id() {
        let mut acc = StreamAccumulator::new();
        acc.push(delta(0, None, Some("search"), Some("{\"q\":")));
        acc.push(delta(0, Some("a1"), None, Some("\"cats\"}")));
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        assert_eq!(out.tool_calls.len(), 1);
        let call = &out.tool_calls[0];
        assert_eq!(call.id, "a1");
        assert_eq!(call.name, "search");
        assert_eq!(call.args, serde_json::json!({"q": "cats"}));
        assert!(call.args_error.is_none());
    }

    #[test]
    fn test_interleaved_indices_stay_independent() {
        let mut acc = StreamAccumulator::new();
        acc.push(delta(0, Some("a"), Some("alpha"), Some("{\"x\":")));
        acc.push(delta(1, Some("b"), Some("beta"), Some("{\"y\":")));
        acc.push(delta(0, None, None, Some("1}")));
        acc.push(delta(1, None, None, Some("2}")));
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.tool_calls[0].args, serde_json::json!({"x": 1}));
        assert_eq!(out.tool_calls[1].args, serde_json::json!({"y": 2}));
    }

    #[test]
    fn test_id_is_permanent_once_bound() {
        let mut acc = StreamAccumulator::new();
        acc.push(delta(0, Some("a1"), Some("alpha"), None));
        acc.push(delta(0, Some("zz"), None, None));
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        assert_eq!(out.tool_calls[0].id, "a1");
    }

    #[test]
    fn test_ambiguous_id_never_merges_indices() {
        let mut acc = StreamAccumulator::new();
        acc.push(delta(0, Some("a1"), Some("alpha"), Some("{}")));
        // Same id claimed by a second index: the alias stays with index 0.
        acc.push(delta(1, Some("a1"), Some("beta"), Some("{}")));
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.tool_calls[0].id, "a1");
        assert_eq!(out.tool_calls[1].id, "call_1");
        assert_eq!(out.tool_calls[1].name, "beta");
    }

    #[test]
    fn test_unmatched_tool_result_is_dropped() {
        let mut acc = StreamAccumulator::new();
        assert!(acc.push(delta(0, Some("a1"), Some("alpha"), Some("{}"))).is_none());
        let dropped = acc.push(StreamEvent::ToolResult {
            id: "ghost".into(),
            payload: Some(serde_json::json!(42)),
            error: None,
        });
        assert!(matches!(
            dropped,
            Some(AgentErrorKind::ProtocolViolation(ref detail)) if detail.contains("ghost")
        ));
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        assert_eq!(out.tool_calls.len(), 1);
        assert!(out.tool_calls[0].result.is_none());
    }

    #[test]
    fn test_matched_tool_result_attaches() {
        let mut acc = StreamAccumulator::new();
        acc.push(delta(0, Some("a1"), Some("alpha"), Some("{}")));
        acc.push(StreamEvent::ToolResult {
            id: "a1".into(),
            payload: Some(serde_json::json!({"hits": 3})),
            error: None,
        });
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        let result = out.tool_calls[0].result.as_ref().unwrap();
        assert_eq!(result.payload, Some(serde_json::json!({"hits": 3})));
    }

    #[test]
    fn test_malformed_args_fall_back_to_empty_object() {
        let mut acc = StreamAccumulator::new();
        acc.push(delta(0, Some("a1"), Some("alpha"), Some("{\"q\": trunc")));
        acc.push(StreamEvent::TurnEnd);
        let out = acc.finish();
        let call = &out.tool_calls[0];
        assert_eq!(call.args, serde_json::json!({}));
        let flagged = call.args_error.as_deref().unwrap();
        assert!(flagged.contains("malformed tool arguments for call a1"));
    }

    #[test]
    fn test_events_after_turn_end_are_dropped() {
        let mut acc = StreamAccumulator::new();
        acc.push(StreamEvent::TextDelta { text: "done".into() });
        acc.push(StreamEvent::TurnEnd);
        let dropped = acc.push(StreamEvent::TextDelta { text: " extra".into() });
        assert!(matches!(dropped, Some(AgentErrorKind::ProtocolViolation(_))));
        assert!(acc.is_finished());
        assert_eq!(acc.finish().text, "done");
    }

    #[test]
    fn test_merge_aggregates_turns() {
        let mut run = TurnOutput::default();
        let mut acc = StreamAccumulator::new();
        acc.push(StreamEvent::TextDelta { text: "Checking. ".into() });
        acc.push(delta(0, Some("a1"), Some("search"), Some("{}")));
        acc.push(StreamEvent::TurnEnd);
        run.merge(acc.finish());

        let mut acc = StreamAccumulator::new();
        acc.push(StreamEvent::TextDelta { text: "Found it.".into() });
        acc.push(StreamEvent::TurnEnd);
        run.merge(acc.finish());

        assert_eq!(run.text, "Checking. Found it.");
        assert_eq!(run.tool_calls.len(), 1);
        assert_eq!(run.tool_calls[0].id, "a1");
    }

    #[test]
    fn test_snapshot_of_unfinished_turn_keeps_partial_args() {
        let mut acc = StreamAccumulator::new();
        acc.push(StreamEvent::TextDelta { text: "partial".into() });
        acc.push(delta(0, Some("a1"), Some("alpha"), Some("{\"q\":")));
        let out = acc.snapshot();
        assert_eq!(out.text, "partial");
        assert_eq!(out.tool_calls.len(), 1);
        assert!(out.tool_calls[0].args_error.is_some());
    }
}
