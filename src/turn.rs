//! Running one conversational turn through the correlator.
//!
//! The model invocation, the tool transport and the tool server all live
//! behind [`TurnEventSource`]. A source yields the turn's events in arrival
//! order, then optionally the final answer text. [`TurnRunner`] feeds each
//! event to a fresh [`TraceCorrelator`] as it arrives and returns a
//! [`TurnOutcome`].
//!
//! Sources that only hand over a finished run can implement [`TurnExecutor`]
//! instead and be wrapped in a [`BatchSource`].

use crate::config::TraceConfig;
use crate::correlator::TraceCorrelator;
use crate::error::{Result, TurntraceError};
use crate::event::TurnEvent;
use crate::trace::Trace;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::stream::{Stream, StreamExt};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One item produced by an event source
#[derive(Debug, Clone, PartialEq)]
pub enum TurnSignal {
    Event(TurnEvent),
    FinalAnswer(String),
}

pub type TurnStream<'a> = Pin<Box<dyn Stream<Item = Result<TurnSignal>> + Send + 'a>>;

/// Produces the events of one turn, in true arrival order.
///
/// A failure of the underlying model call or transport is reported as an
/// `Err` item; the runner stops there and surfaces it as
/// [`TurntraceError::TurnExecutionFailed`].
pub trait TurnEventSource: Send + Sync {
    fn stream_turn<'a>(&'a self, user_text: &'a str) -> TurnStream<'a>;
}

/// A finished run: every event plus the final answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedRun {
    pub events: Vec<TurnEvent>,
    pub final_answer: String,
}

/// Executes a whole turn before handing anything over
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    async fn execute(&self, user_text: &str) -> Result<CompletedRun>;
}

/// Streams a [`TurnExecutor`]'s finished run as a turn
pub struct BatchSource<E> {
    executor: E,
}

impl<E: TurnExecutor> BatchSource<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

impl<E: TurnExecutor> TurnEventSource for BatchSource<E> {
    fn stream_turn<'a>(&'a self, user_text: &'a str) -> TurnStream<'a> {
        Box::pin(async_stream::stream! {
            let run = match self.executor.execute(user_text).await {
                Ok(run) => run,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for event in run.events {
                yield Ok(TurnSignal::Event(event));
            }
            yield Ok(TurnSignal::FinalAnswer(run.final_answer));
        })
    }
}

/// A recorded turn, replayed verbatim regardless of the user text.
///
/// The JSON-lines form holds one event envelope per line
/// (`{"kind": "...", "payload": ...}`). A `{"kind": "final_answer", "text": "..."}`
/// line sets the final answer. Blank lines are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySource {
    events: Vec<TurnEvent>,
    final_answer: Option<String>,
}

const FINAL_ANSWER_KIND: &str = "final_answer";

impl ReplaySource {
    pub fn new(events: Vec<TurnEvent>, final_answer: Option<String>) -> Self {
        Self {
            events,
            final_answer,
        }
    }

    /// Parse a JSON-lines recording
    pub fn from_jsonl<R: BufRead>(reader: R) -> Result<Self> {
        let mut events = Vec::new();
        let mut final_answer = None;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = index + 1;

            let value: serde_json::Value = serde_json::from_str(line)
                .map_err(|e| TurntraceError::ReplayError(format!("line {}: {}", line_no, e)))?;

            if value.get("kind").and_then(|k| k.as_str()) == Some(FINAL_ANSWER_KIND) {
                let text = value.get("text").and_then(|t| t.as_str()).ok_or_else(|| {
                    TurntraceError::ReplayError(format!(
                        "line {}: final_answer without text",
                        line_no
                    ))
                })?;
                final_answer = Some(text.to_string());
                continue;
            }

            let event: TurnEvent = serde_json::from_value(value)
                .map_err(|e| TurntraceError::ReplayError(format!("line {}: {}", line_no, e)))?;
            events.push(event);
        }

        debug!(events = events.len(), "Loaded replay recording");
        Ok(Self::new(events, final_answer))
    }

    /// Read a JSON-lines recording from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_jsonl(BufReader::new(file))
    }

    pub fn events(&self) -> &[TurnEvent] {
        &self.events
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }
}

impl TurnEventSource for ReplaySource {
    fn stream_turn<'a>(&'a self, _user_text: &'a str) -> TurnStream<'a> {
        Box::pin(async_stream::stream! {
            for event in &self.events {
                yield Ok(TurnSignal::Event(event.clone()));
            }
            if let Some(answer) = &self.final_answer {
                yield Ok(TurnSignal::FinalAnswer(answer.clone()));
            }
        })
    }
}

/// Result of one turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub started_at: DateTime<Local>,
    /// Final answer text as supplied by the source; empty if it never sent one
    pub final_answer: String,
    pub trace: Trace,
    /// Correlation ids whose requests never saw a completion
    pub unresolved: Vec<String>,
}

impl TurnOutcome {
    pub fn printable_summary(&self) -> String {
        let time_str = self.started_at.format("%H:%M:%S%.3f").to_string();
        let tool_calls = self.trace.tool_calls().count();
        let messages = self.trace.messages().count();

        let mut summary = format!(
            "[{}] Turn (turn_id: {})\n   Entries: {} ({} tool call{}, {} message{})",
            time_str,
            self.turn_id,
            self.trace.len(),
            tool_calls,
            if tool_calls != 1 { "s" } else { "" },
            messages,
            if messages != 1 { "s" } else { "" },
        );

        let orphans = self.trace.orphan_count();
        if orphans > 0 {
            summary.push_str(&format!("\n   Orphan outputs: {}", orphans));
        }

        if !self.unresolved.is_empty() {
            summary.push_str(&format!("\n   Unresolved: {}", self.unresolved.join(", ")));
        }

        if !self.final_answer.is_empty() {
            summary.push_str(&format!("\n   Answer: {}", preview(&self.final_answer, 100)));
        }

        summary
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Drives one turn at a time from a source into a correlator.
///
/// Holds no per-turn state, so one runner may serve concurrent turns.
#[derive(Debug, Clone)]
pub struct TurnRunner {
    config: TraceConfig,
}

impl TurnRunner {
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Run a turn to completion.
    ///
    /// If the source ends early, the partial trace is returned. If it reports
    /// an error, the turn fails and no trace is returned.
    pub async fn run(&self, source: &dyn TurnEventSource, user_text: &str) -> Result<TurnOutcome> {
        let turn_id = Uuid::new_v4();
        let started_at = Local::now();
        info!(turn_id = %turn_id, "Turn started");

        let mut correlator = TraceCorrelator::with_message_limit(self.config.max_message_chars);
        let mut final_answer = None;
        let mut stream = source.stream_turn(user_text);

        while let Some(signal) = stream.next().await {
            match signal {
                Ok(TurnSignal::Event(event)) => correlator.observe(event),
                Ok(TurnSignal::FinalAnswer(text)) => final_answer = Some(text),
                Err(e) => {
                    warn!(turn_id = %turn_id, error = %e, "Turn failed");
                    return Err(match e {
                        TurntraceError::TurnExecutionFailed(msg) => {
                            TurntraceError::TurnExecutionFailed(msg)
                        }
                        other => TurntraceError::TurnExecutionFailed(other.to_string()),
                    });
                }
            }
        }

        let mut unresolved: Vec<String> = correlator.pending_ids().map(str::to_string).collect();
        unresolved.sort();
        if !unresolved.is_empty() {
            warn!(turn_id = %turn_id, unresolved = ?unresolved, "Turn ended with unresolved tool calls");
        }

        let trace = correlator.finish();
        info!(turn_id = %turn_id, entries = trace.len(), "Turn finished");

        Ok(TurnOutcome {
            turn_id,
            started_at,
            final_answer: final_answer.unwrap_or_default(),
            trace,
            unresolved,
        })
    }
}

impl Default for TurnRunner {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn runner() -> TurnRunner {
        TurnRunner::new(TraceConfig {
            max_message_chars: 5000,
            show_steps: true,
            show_raw: true,
        })
    }

    const RECORDING: &str = r#"
{"kind":"tool_call_item","payload":{"raw_item":{"call_id":"c1","name":"get_schema","arguments":"{}"}}}
{"kind":"tool_call_output_item","payload":{"raw_item":{"call_id":"c1"},"output":{"nodes":{"Stop":["stop_id"]}}}}

{"kind":"reasoning_item","payload":{"summary":[]}}
{"kind":"message_output_item","payload":"Die langsamste Strecke ist 12|34."}
{"kind":"final_answer","text":"Die langsamste Strecke ist 12|34."}
"#;

    struct FailingExecutor;

    #[async_trait]
    impl TurnExecutor for FailingExecutor {
        async fn execute(&self, _user_text: &str) -> Result<CompletedRun> {
            Err(TurntraceError::TurnExecutionFailed("model unavailable".to_string()))
        }
    }

    struct CountingExecutor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TurnExecutor for CountingExecutor {
        async fn execute(&self, user_text: &str) -> Result<CompletedRun> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompletedRun {
                events: vec![
                    TurnEvent::requested(json!({"name": "run_query", "arguments": {"cypher": user_text}})),
                    TurnEvent::completed(json!({"output": [{"n": 3}]})),
                ],
                final_answer: "3".to_string(),
            })
        }
    }

    /// Yields events with pauses in between, then fails
    struct FlakySource;

    impl TurnEventSource for FlakySource {
        fn stream_turn<'a>(&'a self, _user_text: &'a str) -> TurnStream<'a> {
            Box::pin(async_stream::stream! {
                yield Ok(TurnSignal::Event(TurnEvent::requested(json!({"call_id": "a"}))));
                tokio::time::sleep(Duration::from_millis(5)).await;
                yield Err(TurntraceError::IoError(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            })
        }
    }

    /// Stops after the request, as a cancelled source would
    struct TruncatedSource;

    impl TurnEventSource for TruncatedSource {
        fn stream_turn<'a>(&'a self, _user_text: &'a str) -> TurnStream<'a> {
            Box::pin(async_stream::stream! {
                yield Ok(TurnSignal::Event(TurnEvent::requested(json!({"call_id": "b", "name": "run_query"}))));
                tokio::time::sleep(Duration::from_millis(5)).await;
                yield Ok(TurnSignal::Event(TurnEvent::requested(json!({"call_id": "a", "name": "run_query"}))));
            })
        }
    }

    #[test]
    fn test_replay_from_jsonl() {
        let source = ReplaySource::from_jsonl(Cursor::new(RECORDING)).unwrap();

        assert_eq!(source.events().len(), 4);
        assert_eq!(source.final_answer(), Some("Die langsamste Strecke ist 12|34."));
        assert!(matches!(source.events()[2], TurnEvent::Unrecognized { .. }));
    }

    #[test]
    fn test_replay_rejects_malformed_line() {
        let input = "{\"kind\":\"tool_call_item\",\"payload\":{}}\n{oops\n";
        let result = ReplaySource::from_jsonl(Cursor::new(input));

        match result {
            Err(TurntraceError::ReplayError(msg)) => assert!(msg.starts_with("line 2:")),
            other => panic!("Expected ReplayError, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_rejects_event_without_kind() {
        let result = ReplaySource::from_jsonl(Cursor::new("{\"payload\":{}}\n"));
        assert!(matches!(result, Err(TurntraceError::ReplayError(_))));
    }

    #[test]
    fn test_replay_rejects_final_answer_without_text() {
        let result = ReplaySource::from_jsonl(Cursor::new("{\"kind\":\"final_answer\"}\n"));
        assert!(matches!(result, Err(TurntraceError::ReplayError(_))));
    }

    #[test]
    fn test_replay_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RECORDING.as_bytes()).unwrap();

        let source = ReplaySource::from_path(file.path()).unwrap();
        assert_eq!(source.events().len(), 4);
    }

    #[test]
    fn test_replay_from_missing_path() {
        let result = ReplaySource::from_path("/nonexistent/turn.jsonl");
        assert!(matches!(result, Err(TurntraceError::IoError(_))));
    }

    #[tokio::test]
    async fn test_run_replayed_turn() {
        let source = ReplaySource::from_jsonl(Cursor::new(RECORDING)).unwrap();
        let outcome = runner().run(&source, "langsamstes Segment?").await.unwrap();

        assert_eq!(outcome.final_answer, "Die langsamste Strecke ist 12|34.");
        assert_eq!(outcome.trace.len(), 2);
        assert!(outcome.unresolved.is_empty());

        let call = outcome.trace.tool_calls().next().unwrap();
        assert_eq!(call.tool_name(), Some("get_schema"));
        assert_eq!(call.arguments(), Some(&json!("{}")));
        assert_eq!(call.output(), Some(&json!({"nodes": {"Stop": ["stop_id"]}})));
    }

    #[tokio::test]
    async fn test_run_batch_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = BatchSource::new(CountingExecutor {
            calls: Arc::clone(&calls),
        });

        let outcome = runner().run(&source, "MATCH (r:Route) RETURN count(r)").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.final_answer, "3");
        let call = outcome.trace.tool_calls().next().unwrap();
        assert_eq!(call.arguments(), Some(&json!({"cypher": "MATCH (r:Route) RETURN count(r)"})));
        assert_eq!(call.output(), Some(&json!([{"n": 3}])));
    }

    #[tokio::test]
    async fn test_executor_failure_surfaces_as_turn_failure() {
        let source = BatchSource::new(FailingExecutor);
        let result = runner().run(&source, "hello").await;

        match result {
            Err(TurntraceError::TurnExecutionFailed(msg)) => assert_eq!(msg, "model unavailable"),
            other => panic!("Expected TurnExecutionFailed, got {:?}", other.map(|o| o.trace)),
        }
    }

    #[tokio::test]
    async fn test_stream_error_is_wrapped_as_turn_failure() {
        let result = runner().run(&FlakySource, "hello").await;

        match result {
            Err(TurntraceError::TurnExecutionFailed(msg)) => assert!(msg.contains("connection reset")),
            other => panic!("Expected TurnExecutionFailed, got {:?}", other.map(|o| o.trace)),
        }
    }

    #[tokio::test]
    async fn test_early_end_returns_partial_trace() {
        let outcome = runner().run(&TruncatedSource, "hello").await.unwrap();

        assert_eq!(outcome.final_answer, "");
        assert_eq!(outcome.trace.len(), 2);
        assert_eq!(outcome.unresolved, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_independent() {
        let first = ReplaySource::new(
            vec![TurnEvent::requested(json!({"call_id": "x", "name": "get_schema"}))],
            Some("one".to_string()),
        );
        let second = ReplaySource::new(
            vec![TurnEvent::completed(json!({"call_id": "x", "output": "late"}))],
            Some("two".to_string()),
        );
        let runner = runner();

        let (a, b) = tokio::join!(runner.run(&first, "q1"), runner.run(&second, "q2"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.turn_id, b.turn_id);
        assert_eq!(a.unresolved, vec!["x".to_string()]);
        assert!(b.unresolved.is_empty());
        assert_eq!(b.trace.orphan_count(), 1);
    }

    #[test]
    fn test_run_blocking_with_tokio_test() {
        let source = ReplaySource::new(vec![TurnEvent::message(json!("done"))], None);
        let outcome = tokio_test::block_on(runner().run(&source, "hi")).unwrap();

        assert_eq!(outcome.trace.messages().next().unwrap().text(), "done");
    }

    #[test]
    fn test_printable_summary() {
        let source = ReplaySource::from_jsonl(Cursor::new(RECORDING)).unwrap();
        let outcome = tokio_test::block_on(runner().run(&source, "q")).unwrap();
        let summary = outcome.printable_summary();

        assert!(summary.contains(&outcome.turn_id.to_string()));
        assert!(summary.contains("Entries: 2 (1 tool call, 1 message)"));
        assert!(summary.contains("Answer: Die langsamste Strecke"));
        assert!(!summary.contains("Orphan"));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("Fahrtzeit", 5), "Fahrt...");
    }
}
