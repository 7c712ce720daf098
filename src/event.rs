//! Event model consumed by the trace correlator.
//!
//! One conversational turn produces an ordered sequence of [`TurnEvent`]s. Each
//! event carries a [`Payload`] whose shape is not fixed: typed producers hand
//! over a [`ToolCallRecord`], JSON producers hand over an untyped mapping, and
//! the same logical field may live under different names depending on who
//! produced it. Only the [`extract`](crate::extract) module looks inside a
//! payload.
//!
//! # Examples
//!
//! ```
//! use turntrace::event::{Payload, ToolCallRecord, TurnEvent};
//! use serde_json::json;
//!
//! let request = TurnEvent::requested(
//!     ToolCallRecord::new()
//!         .with_call_id("call_1")
//!         .with_name("run_query")
//!         .with_arguments(json!({"cypher": "MATCH (s:Stop) RETURN s"})),
//! );
//! let completion = TurnEvent::completed(json!({"call_id": "call_1", "output": [{"x": 1}]}));
//!
//! assert!(request.kind().is_some());
//! assert!(matches!(completion, TurnEvent::ToolCallCompleted { payload: Payload::Mapping(_) }));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The event kinds the correlator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ToolCallRequested,
    ToolCallCompleted,
    MessageProduced,
}

impl EventKind {
    /// Resolve a wire tag to a kind.
    ///
    /// Both the plain tags and the item-style tags used by agent run results
    /// are accepted. Anything else is `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "tool_call_requested" | "tool_call_item" => Some(Self::ToolCallRequested),
            "tool_call_completed" | "tool_call_output_item" => Some(Self::ToolCallCompleted),
            "message_produced" | "message_output_item" => Some(Self::MessageProduced),
            _ => None,
        }
    }

    /// Canonical wire tag for this kind
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::ToolCallRequested => "tool_call_requested",
            Self::ToolCallCompleted => "tool_call_completed",
            Self::MessageProduced => "message_produced",
        }
    }
}

/// The `function` sub-object some producers nest name and arguments under
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// A typed tool-call record, as handed over by producers that have one.
///
/// Every field is optional: a request usually fills `call_id`, `name` and
/// `arguments`; a completion usually fills `call_id` and `output`. Some
/// producers wrap the provider's own record in `raw_item`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_item: Option<Box<Payload>>,
}

impl ToolCallRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Nest name and arguments under `function` instead of the top level
    pub fn with_function(mut self, name: impl Into<String>, arguments: Option<Value>) -> Self {
        self.function = Some(FunctionCall {
            name: Some(name.into()),
            arguments,
        });
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_raw_item(mut self, raw_item: impl Into<Payload>) -> Self {
        self.raw_item = Some(Box::new(raw_item.into()));
        self
    }
}

/// Opaque, shape-unstable event payload.
///
/// JSON objects deserialize to [`Payload::Mapping`], every other JSON value to
/// [`Payload::Raw`]. [`Payload::Structured`] is only produced in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Payload {
    Structured(ToolCallRecord),
    Mapping(Map<String, Value>),
    Raw(Value),
}

impl Payload {
    /// An empty payload, used when an event arrives without one
    pub fn empty() -> Self {
        Self::Raw(Value::Null)
    }

    /// Convert the payload into plain JSON
    pub fn to_value(&self) -> Value {
        Value::from(self.clone())
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Mapping(map),
            other => Self::Raw(other),
        }
    }
}

impl From<ToolCallRecord> for Payload {
    fn from(record: ToolCallRecord) -> Self {
        Self::Structured(record)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self::Mapping(map)
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        match payload {
            // A record of options and plain JSON always serializes
            Payload::Structured(record) => serde_json::to_value(record).unwrap_or(Value::Null),
            Payload::Mapping(map) => Value::Object(map),
            Payload::Raw(value) => value,
        }
    }
}

/// Wire envelope: `{"kind": "...", "payload": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// One event of a conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EventEnvelope", into = "EventEnvelope")]
pub enum TurnEvent {
    ToolCallRequested { payload: Payload },
    ToolCallCompleted { payload: Payload },
    MessageProduced { payload: Payload },
    /// Any kind the correlator does not know; it is ignored.
    Unrecognized { kind: String },
}

impl TurnEvent {
    pub fn requested(payload: impl Into<Payload>) -> Self {
        Self::ToolCallRequested {
            payload: payload.into(),
        }
    }

    pub fn completed(payload: impl Into<Payload>) -> Self {
        Self::ToolCallCompleted {
            payload: payload.into(),
        }
    }

    pub fn message(payload: impl Into<Payload>) -> Self {
        Self::MessageProduced {
            payload: payload.into(),
        }
    }

    /// The recognized kind, or `None` for [`TurnEvent::Unrecognized`]
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::ToolCallRequested { .. } => Some(EventKind::ToolCallRequested),
            Self::ToolCallCompleted { .. } => Some(EventKind::ToolCallCompleted),
            Self::MessageProduced { .. } => Some(EventKind::MessageProduced),
            Self::Unrecognized { .. } => None,
        }
    }

    /// The wire tag of this event
    pub fn tag(&self) -> &str {
        match self {
            Self::Unrecognized { kind } => kind.as_str(),
            other => other.kind().map(|k| k.as_tag()).unwrap_or_default(),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::ToolCallRequested { payload }
            | Self::ToolCallCompleted { payload }
            | Self::MessageProduced { payload } => Some(payload),
            Self::Unrecognized { .. } => None,
        }
    }
}

impl From<EventEnvelope> for TurnEvent {
    fn from(envelope: EventEnvelope) -> Self {
        let payload = Payload::from(envelope.payload);
        match EventKind::from_tag(&envelope.kind) {
            Some(EventKind::ToolCallRequested) => Self::ToolCallRequested { payload },
            Some(EventKind::ToolCallCompleted) => Self::ToolCallCompleted { payload },
            Some(EventKind::MessageProduced) => Self::MessageProduced { payload },
            None => Self::Unrecognized {
                kind: envelope.kind,
            },
        }
    }
}

impl From<TurnEvent> for EventEnvelope {
    fn from(event: TurnEvent) -> Self {
        let kind = event.tag().to_string();
        let payload = match event {
            TurnEvent::ToolCallRequested { payload }
            | TurnEvent::ToolCallCompleted { payload }
            | TurnEvent::MessageProduced { payload } => Value::from(payload),
            TurnEvent::Unrecognized { .. } => Value::Null,
        };
        Self { kind, payload }
    }
}
