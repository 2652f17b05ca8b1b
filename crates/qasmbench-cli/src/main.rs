//! qasmbench Command-Line Interface
//!
//! Benchmarks every configured QASM parser over a corpus directory and
//! writes the results to a JSON file.
//!
//! ```text
//! qasmbench                                   # ./qasm, ./qasmbench.yaml, 10 iterations
//! qasmbench --iterations 3 --adapter oq3-in-process --format json
//! ```
//!
//! Exit status: 0 when the run completed (even if samples failed), 1 on an
//! orchestration fault, 2 when an adapter could not be built.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use console::style;

mod bench;

/// Default configuration file, used when present.
const DEFAULT_CONFIG_FILE: &str = "qasmbench.yaml";

/// qasmbench - throughput and latency of OpenQASM 3 parsers
#[derive(Parser, Debug)]
#[command(name = "qasmbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./qasmbench.yaml if it exists)
    #[arg(short, long, env = "QASMBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Corpus directory of .qasm files
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Results file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Measured passes over the corpus per adapter
    #[arg(short = 'n', long)]
    iterations: Option<u32>,

    /// Only run this adapter (repeatable)
    #[arg(short, long = "adapter", value_name = "ID")]
    adapters: Vec<String>,

    /// Summary format on stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Print the configured adapters and exit
    #[arg(long)]
    list_adapters: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

impl Cli {
    /// Explicit `--config`, else the default file if it exists.
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.is_file().then_some(default)
        })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = tokio::select! {
        res = bench::execute(&cli) => res,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };

    match result {
        Ok(bench::Outcome::Completed) => {}
        Ok(bench::Outcome::AdapterFailures(ids)) => {
            eprintln!(
                "{} adapter(s) could not be built or started: {}",
                style("Warning:").yellow().bold(),
                ids.join(", ")
            );
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}
