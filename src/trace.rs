//! Trace entries produced for one turn.
//!
//! A [`Trace`] is the ordered, human-inspectable record of what happened in a
//! turn: which tools were called with which arguments, what they returned, and
//! which messages the model produced in between.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default bound on message entry length, in characters
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 5000;

/// A tool invocation and, once known, its output.
///
/// `tool_name` and `arguments` are fixed when the entry is created. `output`
/// starts empty and is attached at most once. An entry with no name and no
/// arguments is an orphan: an output nobody could match to a request.
///
/// `resolved` is part of the serialized form; an entry closed by a completion
/// without output stays closed when read back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEntry {
    tool_name: Option<String>,
    arguments: Option<Value>,
    output: Option<Value>,
    #[serde(default)]
    resolved: bool,
}

impl ToolCallEntry {
    pub fn new(tool_name: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            arguments,
            output: None,
            resolved: false,
        }
    }

    /// An entry for an output that matched no request
    pub fn orphan() -> Self {
        Self::default()
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn arguments(&self) -> Option<&Value> {
        self.arguments.as_ref()
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn is_orphan(&self) -> bool {
        self.tool_name.is_none() && self.arguments.is_none()
    }

    /// Whether a completion has been attached, even one without output
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Attach the completion's output.
    ///
    /// Returns `false` and leaves the entry untouched if an output was already
    /// attached.
    pub(crate) fn attach_output(&mut self, output: Option<Value>) -> bool {
        if self.resolved {
            return false;
        }
        self.output = output;
        self.resolved = true;
        true
    }
}

/// A message the model produced during the turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    text: String,
}

impl MessageEntry {
    /// Create a message entry, cutting `text` to at most `max_chars` characters
    pub fn new(text: impl Into<String>, max_chars: usize) -> Self {
        let mut text = text.into();
        if let Some((cut, _)) = text.char_indices().nth(max_chars) {
            text.truncate(cut);
        }
        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One entry of a turn trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEntry {
    ToolCall(ToolCallEntry),
    Message(MessageEntry),
}

impl TraceEntry {
    pub fn as_tool_call(&self) -> Option<&ToolCallEntry> {
        match self {
            TraceEntry::ToolCall(entry) => Some(entry),
            TraceEntry::Message(_) => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageEntry> {
        match self {
            TraceEntry::Message(entry) => Some(entry),
            TraceEntry::ToolCall(_) => None,
        }
    }
}

/// Ordered snapshot of a turn's trace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub(crate) fn from_entries(entries: Vec<TraceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceEntry> {
        self.entries.iter()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallEntry> {
        self.entries.iter().filter_map(TraceEntry::as_tool_call)
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageEntry> {
        self.entries.iter().filter_map(TraceEntry::as_message)
    }

    pub fn orphan_count(&self) -> usize {
        self.tool_calls().filter(|entry| entry.is_orphan()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceEntry;
    type IntoIter = std::slice::Iter<'a, TraceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
