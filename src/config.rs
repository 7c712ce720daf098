//! Settings for trace building and display.
//!
//! Values come from the environment, optionally seeded from a `.env` file:
//!
//! | Variable                      | Default |
//! |-------------------------------|---------|
//! | `TURNTRACE_MAX_MESSAGE_CHARS` | 5000    |
//! | `TURNTRACE_SHOW_STEPS`        | true    |
//! | `TURNTRACE_SHOW_RAW`          | true    |

use crate::error::{Result, TurntraceError};
use crate::trace::DEFAULT_MAX_MESSAGE_CHARS;
use std::str::FromStr;

pub const MAX_MESSAGE_CHARS_VAR: &str = "TURNTRACE_MAX_MESSAGE_CHARS";
pub const SHOW_STEPS_VAR: &str = "TURNTRACE_SHOW_STEPS";
pub const SHOW_RAW_VAR: &str = "TURNTRACE_SHOW_RAW";

/// Configuration for a turn trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Bound on the length of message entries, in characters
    pub max_message_chars: usize,
    /// Include the tool step listing when formatting a trace
    pub show_steps: bool,
    /// Include raw tool outputs when formatting a trace
    pub show_raw: bool,
}

impl Default for TraceConfig {
    /// Read the environment, ignoring values that do not parse or are out of range
    fn default() -> Self {
        Self::lenient_lookup(|key| std::env::var(key).ok())
    }
}

impl TraceConfig {
    /// Load `.env` if present, then read the environment strictly.
    ///
    /// Unlike [`TraceConfig::default`], a value that is set but does not parse is
    /// reported as [`TurntraceError::ConfigError`].
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_message_chars = match lookup(MAX_MESSAGE_CHARS_VAR) {
            Some(raw) => parse_value::<usize>(MAX_MESSAGE_CHARS_VAR, &raw)?,
            None => DEFAULT_MAX_MESSAGE_CHARS,
        };
        if max_message_chars == 0 {
            return Err(TurntraceError::ConfigError(format!(
                "{} must be greater than zero",
                MAX_MESSAGE_CHARS_VAR
            )));
        }

        Ok(Self {
            max_message_chars,
            show_steps: lookup_flag(&lookup, SHOW_STEPS_VAR)?.unwrap_or(true),
            show_raw: lookup_flag(&lookup, SHOW_RAW_VAR)?.unwrap_or(true),
        })
    }

    fn lenient_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            max_message_chars: lookup(MAX_MESSAGE_CHARS_VAR)
                .and_then(|v| v.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_MAX_MESSAGE_CHARS),
            show_steps: lookup(SHOW_STEPS_VAR).and_then(|v| parse_flag(&v)).unwrap_or(true),
            show_raw: lookup(SHOW_RAW_VAR).and_then(|v| parse_flag(&v)).unwrap_or(true),
        }
    }

    pub fn with_max_message_chars(mut self, max_message_chars: usize) -> Self {
        self.max_message_chars = max_message_chars;
        self
    }

    pub fn with_show_steps(mut self, show_steps: bool) -> Self {
        self.show_steps = show_steps;
        self
    }

    pub fn with_show_raw(mut self, show_raw: bool) -> Self {
        self.show_raw = show_raw;
        self
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TurntraceError::ConfigError(format!("{} has invalid value '{}'", key, raw)))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn lookup_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_flag(&raw).map(Some).ok_or_else(|| {
            TurntraceError::ConfigError(format!("{} has invalid value '{}'", key, raw))
        }),
        None => Ok(None),
    }
}
