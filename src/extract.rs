//! Best-effort field lookup over heterogeneous payloads.
//!
//! Producers do not agree on where a tool call's identifier, name or
//! arguments live. Each operation here walks a fixed, ordered list of known
//! shapes and returns the first hit:
//!
//! 1. a field of a typed [`ToolCallRecord`]
//! 2. a key of an untyped JSON mapping, same names
//! 3. the nested `function` convention (`function.name`, `function.arguments`)
//! 4. a wrapped `raw_item`, searched with the same rules
//!
//! Nothing in this module fails. A missing or mistyped field is simply not a
//! match, and every operation ends in a documented default.

use crate::event::{Payload, ToolCallRecord};
use serde_json::{Map, Value};

/// Tool name reported when a payload does not carry one
pub const UNKNOWN_TOOL: &str = "unknown_tool";

/// How many `raw_item` wrappers deep a lookup will follow
const MAX_ENVELOPE_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    CallId,
    Name,
    Arguments,
    Output,
}

impl Field {
    fn keys(self) -> &'static [&'static str] {
        match self {
            Field::CallId => &["call_id", "tool_call_id"],
            Field::Name => &["name", "tool_name"],
            Field::Arguments => &["arguments"],
            Field::Output => &["output"],
        }
    }

    /// Key under the nested `function` object, if the field lives there too
    fn function_key(self) -> Option<&'static str> {
        match self {
            Field::Name => Some("name"),
            Field::Arguments => Some("arguments"),
            Field::CallId | Field::Output => None,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Field::CallId | Field::Name => value.as_str().is_some_and(|s| !s.is_empty()),
            Field::Arguments | Field::Output => !value.is_null(),
        }
    }
}

/// Borrowed view of the shapes a payload can take
#[derive(Clone, Copy)]
enum Shape<'a> {
    Record(&'a ToolCallRecord),
    Object(&'a Map<String, Value>),
    Opaque,
}

impl<'a> Shape<'a> {
    fn of_payload(payload: &'a Payload) -> Self {
        match payload {
            Payload::Structured(record) => Shape::Record(record),
            Payload::Mapping(map) => Shape::Object(map),
            Payload::Raw(value) => Shape::of_value(value),
        }
    }

    fn of_value(value: &'a Value) -> Self {
        match value.as_object() {
            Some(map) => Shape::Object(map),
            None => Shape::Opaque,
        }
    }

    fn direct(self, field: Field) -> Option<Value> {
        match self {
            Shape::Record(record) => {
                let value = match field {
                    Field::CallId => record.call_id.clone().map(Value::String),
                    Field::Name => record.name.clone().map(Value::String),
                    Field::Arguments => record.arguments.clone(),
                    Field::Output => record.output.clone(),
                };
                value.filter(|v| field.accepts(v))
            }
            Shape::Object(map) => field
                .keys()
                .iter()
                .filter_map(|key| map.get(*key))
                .find(|v| field.accepts(v))
                .cloned(),
            Shape::Opaque => None,
        }
    }

    fn nested_function(self, field: Field) -> Option<Value> {
        let key = field.function_key()?;
        let value = match self {
            Shape::Record(record) => {
                let function = record.function.as_ref()?;
                match field {
                    Field::Name => function.name.clone().map(Value::String),
                    _ => function.arguments.clone(),
                }
            }
            Shape::Object(map) => map.get("function")?.as_object()?.get(key).cloned(),
            Shape::Opaque => None,
        };
        value.filter(|v| field.accepts(v))
    }

    fn envelope(self) -> Option<Shape<'a>> {
        match self {
            Shape::Record(record) => record.raw_item.as_deref().map(Shape::of_payload),
            Shape::Object(map) => map.get("raw_item").map(Shape::of_value),
            Shape::Opaque => None,
        }
    }

    fn locate(self, field: Field, depth: usize) -> Option<Value> {
        self.direct(field)
            .or_else(|| self.nested_function(field))
            .or_else(|| {
                if depth >= MAX_ENVELOPE_DEPTH {
                    return None;
                }
                self.envelope()?.locate(field, depth + 1)
            })
    }
}

fn locate(payload: &Payload, field: Field) -> Option<Value> {
    Shape::of_payload(payload).locate(field, 0)
}

/// Correlation identifier of a tool call, if the payload carries one.
///
/// Looks at `call_id`, then `tool_call_id`. Empty or non-string values do not
/// count.
pub fn extract_correlation_id(payload: &Payload) -> Option<String> {
    match locate(payload, Field::CallId)? {
        Value::String(id) => Some(id),
        _ => None,
    }
}

/// Tool name, falling back to [`UNKNOWN_TOOL`].
///
/// Looks at `name`, `tool_name`, then `function.name`.
pub fn extract_tool_name(payload: &Payload) -> String {
    match locate(payload, Field::Name) {
        Some(Value::String(name)) => name,
        _ => UNKNOWN_TOOL.to_string(),
    }
}

/// Tool arguments exactly as the producer supplied them.
///
/// Looks at `arguments`, then `function.arguments`. JSON `null` counts as absent.
pub fn extract_arguments(payload: &Payload) -> Option<Value> {
    locate(payload, Field::Arguments)
}

/// Output of a completed tool call
pub fn extract_output(payload: &Payload) -> Option<Value> {
    locate(payload, Field::Output)
}

/// Render a payload as display text.
///
/// Strings are used as-is, `null` renders empty, everything else renders as
/// compact JSON.
pub fn render_payload(payload: &Payload) -> String {
    match payload {
        Payload::Raw(Value::String(text)) => text.clone(),
        Payload::Raw(Value::Null) => String::new(),
        other => other.to_value().to_string(),
    }
}
