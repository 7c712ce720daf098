//! Pairs tool-call requests with their completions for one turn.
//!
//! The correlator consumes a turn's events in arrival order, exactly once, and
//! builds a [`Trace`]. Requests and messages append entries as they arrive.
//! A completion is attached to an open request instead:
//!
//! 1. by correlation identifier, if that identifier is still pending
//! 2. otherwise to the most recent request that arrived without an identifier
//! 3. otherwise it becomes an orphan entry of its own
//!
//! Nothing here fails. A malformed event still ends up in the trace somewhere,
//! and unknown event kinds are skipped.
//!
//! # Examples
//!
//! ```
//! use turntrace::correlator::TraceCorrelator;
//! use turntrace::event::TurnEvent;
//! use serde_json::json;
//!
//! let mut correlator = TraceCorrelator::new();
//! correlator.observe(TurnEvent::requested(json!({"call_id": "a", "name": "get_schema"})));
//! correlator.observe(TurnEvent::completed(json!({"call_id": "a", "output": {"nodes": {}}})));
//!
//! let trace = correlator.finish();
//! let call = trace.tool_calls().next().unwrap();
//! assert_eq!(call.tool_name(), Some("get_schema"));
//! assert_eq!(call.output(), Some(&json!({"nodes": {}})));
//! ```

use crate::event::{Payload, TurnEvent};
use crate::extract::{
    extract_arguments, extract_correlation_id, extract_output, extract_tool_name, render_payload,
};
use crate::trace::{MessageEntry, ToolCallEntry, Trace, TraceEntry, DEFAULT_MAX_MESSAGE_CHARS};
use std::collections::HashMap;
use tracing::{debug, warn};

/// How a completion found the entry its output went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Matched a pending request by correlation identifier
    ById,
    /// Went to the most recent request that had no identifier
    Fallback,
    /// Matched nothing; a new orphan entry was appended
    Orphan,
}

/// Single-turn trace builder.
///
/// `pending` and `fallback_slot` hold positions in `trace`; entries live only
/// in the trace itself.
#[derive(Debug)]
pub struct TraceCorrelator {
    trace: Vec<TraceEntry>,
    pending: HashMap<String, usize>,
    fallback_slot: Option<usize>,
    max_message_chars: usize,
}

impl TraceCorrelator {
    pub fn new() -> Self {
        Self::with_message_limit(DEFAULT_MAX_MESSAGE_CHARS)
    }

    /// Create a correlator that cuts message entries to `max_message_chars`
    pub fn with_message_limit(max_message_chars: usize) -> Self {
        Self {
            trace: Vec::new(),
            pending: HashMap::new(),
            fallback_slot: None,
            max_message_chars,
        }
    }

    /// Feed the next event of the turn
    pub fn observe(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::ToolCallRequested { payload } => self.on_requested(&payload),
            TurnEvent::ToolCallCompleted { payload } => {
                self.on_completed(&payload);
            }
            TurnEvent::MessageProduced { payload } => self.on_message(&payload),
            TurnEvent::Unrecognized { kind } => {
                debug!(kind = %kind, "Ignoring unrecognized turn event");
            }
        }
    }

    fn on_requested(&mut self, payload: &Payload) {
        let call_id = extract_correlation_id(payload);
        let tool_name = extract_tool_name(payload);
        let arguments = extract_arguments(payload);

        let index = self.trace.len();
        debug!(call_id = ?call_id, tool = %tool_name, index, "Tool call requested");
        self.trace.push(TraceEntry::ToolCall(ToolCallEntry::new(tool_name, arguments)));

        match call_id {
            Some(id) => {
                if let Some(previous) = self.pending.insert(id.clone(), index) {
                    warn!(
                        call_id = %id,
                        previous_index = previous,
                        "Duplicate call id requested; earlier entry can no longer be matched by id"
                    );
                }
            }
            None => self.fallback_slot = Some(index),
        }
    }

    fn on_completed(&mut self, payload: &Payload) -> Resolution {
        let call_id = extract_correlation_id(payload);
        let output = extract_output(payload);

        let by_id = call_id.as_ref().and_then(|id| self.pending.remove(id));
        let (index, resolution) = match (by_id, self.fallback_slot.take()) {
            (Some(index), slot) => {
                self.fallback_slot = slot;
                (index, Resolution::ById)
            }
            (None, Some(index)) => {
                if call_id.is_some() {
                    warn!(call_id = ?call_id, index, "Completion id not pending; using fallback entry");
                }
                (index, Resolution::Fallback)
            }
            (None, None) => {
                warn!(call_id = ?call_id, "Tool output matched no request; recording orphan entry");
                self.trace.push(TraceEntry::ToolCall(ToolCallEntry::orphan()));
                (self.trace.len() - 1, Resolution::Orphan)
            }
        };

        if let Some(TraceEntry::ToolCall(entry)) = self.trace.get_mut(index) {
            entry.attach_output(output);
        }
        debug!(call_id = ?call_id, index, resolution = ?resolution, "Tool call completed");
        resolution
    }

    fn on_message(&mut self, payload: &Payload) {
        let text = render_payload(payload);
        self.trace.push(TraceEntry::Message(MessageEntry::new(text, self.max_message_chars)));
    }

    /// Identifiers of requests still waiting for a completion
    pub fn pending_ids(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback_slot.is_some()
    }

    /// Entries recorded so far
    pub fn entries(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// End the turn and hand back the trace
    pub fn finish(self) -> Trace {
        Trace::from_entries(self.trace)
    }
}

impl Default for TraceCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlate a complete, ordered event sequence in one call
pub fn correlate(events: impl IntoIterator<Item = TurnEvent>) -> Trace {
    let mut correlator = TraceCorrelator::new();
    for event in events {
        correlator.observe(event);
    }
    correlator.finish()
}
