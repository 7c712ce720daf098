pub mod config;
pub mod correlator;
pub mod error;
pub mod event;
pub mod extract;
pub mod render;
pub mod trace;
pub mod turn;

pub use error::{Result, TurntraceError};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::TraceConfig;
    pub use crate::correlator::{correlate, TraceCorrelator};
    pub use crate::error::{Result, TurntraceError};
    pub use crate::event::{Payload, ToolCallRecord, TurnEvent};
    pub use crate::trace::{MessageEntry, ToolCallEntry, Trace, TraceEntry};
    pub use crate::turn::{ReplaySource, TurnEventSource, TurnOutcome, TurnRunner, TurnSignal};
}
