use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::base::ToolCallFragment;
use super::events::{StreamError, StreamErrorKind, StreamEvent};
use crate::models::tool::ToolCall;

/// Assembles tool call fragments, keyed by their position index, into
/// complete calls.
///
/// Fragments from different indices may interleave freely; fragments of one
/// index are concatenated in arrival order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PendingCall>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment, returning the events it produces: a start the
    /// first time the call's name is known, and a delta carrying the
    /// accumulated argument text whenever arguments arrive.
    pub fn ingest(&mut self, fragment: &ToolCallFragment) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let call = self.calls.entry(fragment.index).or_default();

        if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
            call.id = id.to_string();
        }

        if let Some(name) = fragment.name.as_deref().filter(|name| !name.is_empty()) {
            if call.name.is_none() {
                call.name = Some(name.to_string());
                events.push(StreamEvent::ToolCallStart {
                    index: fragment.index,
                    call_id: call.id.clone(),
                    name: name.to_string(),
                });
            }
        }

        if let Some(arguments) = fragment.arguments.as_deref().filter(|args| !args.is_empty()) {
            call.arguments.push_str(arguments);
            events.push(StreamEvent::ToolCallDelta {
                index: fragment.index,
                call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            });
        }

        events
    }

    /// Resolve every named call, in index order. A call whose arguments do
    /// not parse yields an error event in its place.
    pub fn finish(self) -> Vec<StreamEvent> {
        self.into_results()
            .into_iter()
            .map(|result| match result {
                Ok(call) => StreamEvent::ToolCallComplete(call),
                Err(err) => StreamEvent::Error(err),
            })
            .collect()
    }

    pub fn into_results(self) -> Vec<Result<ToolCall, StreamError>> {
        self.calls
            .into_values()
            .filter_map(|call| {
                let name = call.name?;
                Some(
                    parse_tool_arguments(&call.arguments)
                        .map(|arguments| ToolCall::new(call.id.clone(), name.clone(), arguments))
                        .map_err(|reason| {
                            StreamError::new(
                                StreamErrorKind::ToolArguments,
                                format!(
                                    "Failed to parse arguments for tool call {} ({}): {}",
                                    name, call.id, reason
                                ),
                            )
                        }),
                )
            })
            .collect()
    }
}

/// Parse accumulated argument text. Empty text means no arguments.
pub fn parse_tool_arguments(arguments: &str) -> Result<Value, String> {
    if arguments.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected a JSON object, got {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(events: Vec<StreamEvent>) -> Vec<ToolCall> {
        events
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::ToolCallComplete(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fragments_assemble_across_interleaved_indices() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.ingest(&ToolCallFragment::new(0).with_id("call_a").with_name("first"));
        accumulator.ingest(&ToolCallFragment::new(0).with_arguments("{\"a\":"));
        accumulator.ingest(&ToolCallFragment::new(1).with_id("call_b").with_name("second"));
        accumulator.ingest(&ToolCallFragment::new(1).with_arguments("{\"b\":"));
        accumulator.ingest(&ToolCallFragment::new(1).with_arguments("\"x\"}"));
        accumulator.ingest(&ToolCallFragment::new(0).with_arguments("1}"));

        let calls = completed(accumulator.finish());
        assert_eq!(
            calls,
            vec![
                ToolCall::new("call_a", "first", json!({"a": 1})),
                ToolCall::new("call_b", "second", json!({"b": "x"})),
            ]
        );
    }

    #[test]
    fn test_start_once_and_delta_carries_accumulated_text() {
        let mut accumulator = ToolCallAccumulator::new();
        let events = accumulator.ingest(
            &ToolCallFragment::new(0)
                .with_id("call_1")
                .with_name("search")
                .with_arguments("{\"q\""),
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallStart {
                    index: 0,
                    call_id: "call_1".to_string(),
                    name: "search".to_string(),
                },
                StreamEvent::ToolCallDelta {
                    index: 0,
                    call_id: "call_1".to_string(),
                    name: Some("search".to_string()),
                    arguments: "{\"q\"".to_string(),
                },
            ]
        );

        // A repeated name must not start the call again.
        let events = accumulator.ingest(
            &ToolCallFragment::new(0)
                .with_name("search")
                .with_arguments(":\"rust\"}"),
        );
        assert_eq!(
            events,
            vec![StreamEvent::ToolCallDelta {
                index: 0,
                call_id: "call_1".to_string(),
                name: Some("search".to_string()),
                arguments: "{\"q\":\"rust\"}".to_string(),
            }]
        );
    }

    #[test]
    fn test_id_may_arrive_after_first_fragment() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.ingest(&ToolCallFragment::new(0).with_name("get_time"));
        accumulator.ingest(&ToolCallFragment::new(0).with_id("late_id"));
        let calls = completed(accumulator.finish());
        assert_eq!(calls, vec![ToolCall::new("late_id", "get_time", json!({}))]);
    }

    #[test]
    fn test_unnamed_calls_are_dropped() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.ingest(&ToolCallFragment::new(0).with_id("call_1").with_arguments("{}"));
        assert!(accumulator.finish().is_empty());
    }

    #[test]
    fn test_malformed_arguments_become_error() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.ingest(&ToolCallFragment::new(0).with_id("call_1").with_name("broken"));
        accumulator.ingest(&ToolCallFragment::new(0).with_arguments("{\"a\": "));
        accumulator.ingest(&ToolCallFragment::new(1).with_id("call_2").with_name("fine"));

        let events = accumulator.finish();
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::Error(err) => {
                assert_eq!(err.kind, StreamErrorKind::ToolArguments);
                assert!(err.message.contains("broken"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(
            events[1],
            StreamEvent::ToolCallComplete(ToolCall::new("call_2", "fine", json!({})))
        );
    }

    #[test]
    fn test_parse_tool_arguments() {
        assert_eq!(parse_tool_arguments("").unwrap(), json!({}));
        assert_eq!(parse_tool_arguments("  ").unwrap(), json!({}));
        assert_eq!(parse_tool_arguments("{\"a\":1}").unwrap(), json!({"a": 1}));
        assert!(parse_tool_arguments("[1, 2]").is_err());
        assert!(parse_tool_arguments("{").is_err());
    }
}
