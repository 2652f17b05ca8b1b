//! Long-lived parse server.
//!
//! Reads framed QASM requests on stdin and answers each with one line on
//! stdout. Diagnostics go to stderr; stdout carries protocol lines only.

use anyhow::{Result, anyhow};
use clap::Parser;
use qasmbench_parsers::{ParserHandler, parser_by_name};
use qasmbench_protocol::{DEFAULT_MAX_FRAME_BYTES, FrameDecoder, Framing, ServerSession, serve};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve OpenQASM 3 parse requests over stdin/stdout
#[derive(Parser, Debug)]
#[command(name = "qasm-parse-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Request framing (nul, length)
    #[arg(long, default_value = "nul")]
    framing: String,

    /// Largest accepted request payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    max_frame_bytes: usize,

    /// Parser binding to serve
    #[arg(long, default_value = "oq3")]
    parser: String,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let framing = Framing::from_name(&args.framing)
        .ok_or_else(|| anyhow!("Unknown framing: {} (expected nul or length)", args.framing))?;
    let handler = ParserHandler::new(parser_by_name(&args.parser)?);
    info!(parser = handler.parser_name(), %framing, "starting parse server");

    let session = ServerSession::new(
        handler,
        FrameDecoder::with_limit(framing, args.max_frame_bytes),
    );
    let summary = serve(tokio::io::stdin(), tokio::io::stdout(), session).await?;
    info!(
        requests = summary.requests,
        successes = summary.successes,
        errors = summary.errors,
        "parse server exiting"
    );
    Ok(())
}
