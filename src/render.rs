//! Read-only helpers for showing a trace to a person.
//!
//! Tool servers tend to wrap their results: JSON encoded as a string, a
//! `{"type": "text", "text": ...}` content part, or a lone `{"result": ...}`.
//! These helpers peel such wrappers off for display and pull out tabular rows
//! when there are any. The trace itself is never modified.

use crate::config::TraceConfig;
use crate::trace::{ToolCallEntry, Trace};
use crate::turn::preview;
use serde_json::{Map, Value};

/// Keys checked, in order, for a nested list of rows
const ROW_KEYS: [&str; 3] = ["rows", "data", "result"];

/// Longest JSON preview shown for an output that is not tabular
const OUTPUT_PREVIEW_CHARS: usize = 200;

/// Most rows printed per output table
const MAX_TABLE_ROWS: usize = 20;

/// Remove common result wrappers from a tool output.
///
/// Strings that look like JSON objects or arrays are parsed; anything that
/// fails to parse is returned unchanged.
pub fn unwrap_output(value: &Value) -> Value {
    let value = parse_json_text(value);

    if let Some(map) = value.as_object() {
        if map.get("type").and_then(Value::as_str) == Some("text") {
            if let Some(text) = map.get("text") {
                return unwrap_output(text);
            }
        }
        if map.len() == 1 {
            if let Some(inner) = map.get("result") {
                return unwrap_output(inner);
            }
        }
    }

    value
}

fn parse_json_text(value: &Value) -> Value {
    if let Value::String(text) = value {
        let trimmed = text.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str(trimmed) {
                return parsed;
            }
        }
    }
    value.clone()
}

fn as_rows(value: &Value) -> Option<Vec<Map<String, Value>>> {
    let items = value.as_array()?;
    if !items.first()?.is_object() {
        return None;
    }
    Some(items.iter().filter_map(|item| item.as_object().cloned()).collect())
}

/// Tabular rows in a tool output, or an empty list.
///
/// A list whose first element is an object counts as rows; so does such a
/// list under `rows`, `data` or `result`.
pub fn extract_rows(value: &Value) -> Vec<Map<String, Value>> {
    let value = unwrap_output(value);

    if let Some(rows) = as_rows(&value) {
        return rows;
    }

    if let Some(map) = value.as_object() {
        for key in ROW_KEYS {
            if let Some(rows) = map.get(key).and_then(|inner| as_rows(&unwrap_output(inner))) {
                return rows;
            }
        }
    }

    Vec::new()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn tool_label(entry: &ToolCallEntry) -> &str {
    entry.tool_name().unwrap_or("(orphan output)")
}

/// Render rows as a pipe table, columns taken from the first row
pub fn format_rows(rows: &[Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut output = format!(
        "| {} |\n",
        columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" | ")
    );
    for row in rows.iter().take(MAX_TABLE_ROWS) {
        let cells: Vec<String> =
            columns.iter().map(|c| row.get(*c).map(display_value).unwrap_or_default()).collect();
        output.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    if rows.len() > MAX_TABLE_ROWS {
        output.push_str(&format!("({} more rows)\n", rows.len() - MAX_TABLE_ROWS));
    }
    output
}

/// Format a trace as plain text.
///
/// `show_steps` lists each tool call with its arguments; `show_raw` lists
/// each output, as a table when it holds rows.
pub fn format_trace(trace: &Trace, config: &TraceConfig) -> String {
    let mut output = String::new();

    if config.show_steps {
        output.push_str("Tool steps:\n");
        let mut any = false;
        for (i, entry) in trace.tool_calls().enumerate() {
            any = true;
            output.push_str(&format!("{}. Tool call: {}\n", i + 1, tool_label(entry)));
            if let Some(arguments) = entry.arguments() {
                output.push_str(&format!("   Arguments: {}\n", display_value(arguments)));
            }
        }
        if !any {
            output.push_str("No tool calls.\n");
        }
    }

    if config.show_raw {
        output.push_str("Raw tool outputs:\n");
        for entry in trace.tool_calls() {
            output.push_str(&format!("- {}", tool_label(entry)));
            let Some(value) = entry.output() else {
                output.push_str(": (no output)\n");
                continue;
            };

            let rows = extract_rows(value);
            if rows.is_empty() {
                let text = unwrap_output(value).to_string();
                output.push_str(&format!(": {}\n", preview(&text, OUTPUT_PREVIEW_CHARS)));
            } else {
                let plural = if rows.len() != 1 { "s" } else { "" };
                output.push_str(&format!(": {} row{}\n", rows.len(), plural));
                output.push_str(&format_rows(&rows));
            }
        }
    }

    output
}
