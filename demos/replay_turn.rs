//! Replay a recorded turn and print its trace
//!
//! The recording is a JSON-lines file with one event per line:
//!
//! ```text
//! {"kind":"tool_call_item","payload":{"call_id":"c1","name":"get_schema","arguments":"{}"}}
//! {"kind":"tool_call_output_item","payload":{"call_id":"c1","output":{"nodes":{}}}}
//! {"kind":"message_output_item","payload":"Das Schema hat vier Knotentypen."}
//! {"kind":"final_answer","text":"Das Schema hat vier Knotentypen."}
//! ```
//!
//! # Running the example
//!
//! ```bash
//! RUST_LOG=turntrace=debug cargo run --example replay_turn -- turn.jsonl
//! ```

use anyhow::Context;
use turntrace::prelude::*;
use turntrace::render::format_trace;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).context("usage: replay_turn <recording.jsonl>")?;

    let config = TraceConfig::from_env()?;
    let source = ReplaySource::from_path(&path)
        .with_context(|| format!("failed to load recording {}", path))?;

    let runner = TurnRunner::new(config.clone());
    let outcome = runner.run(&source, "").await?;

    println!("{}", outcome.printable_summary());
    println!();
    println!("Answer: {}", outcome.final_answer);
    println!();
    print!("{}", format_trace(&outcome.trace, &config));
    println!();
    println!("{}", serde_json::to_string_pretty(&outcome.trace)?);

    Ok(())
}
