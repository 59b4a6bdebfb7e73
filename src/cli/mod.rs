mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rustmemorm::driver::memory::BatchReporting;
use rustmemorm::{Capabilities, DialectSet};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "rustmemorm")]
#[command(about = "Inspect dialects and exercise the batch mutation engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the built-in dialects and their batch capabilities
    Dialects {
        #[arg(long)]
        json: bool,
    },
    /// Show which dialect drives a connection URL
    Resolve { url: String },
    /// Run an upsert scenario against the in-memory driver
    Demo {
        /// What the driver reports for each batched row
        #[arg(long, value_enum, default_value_t = Reporting::Exact)]
        reporting: Reporting,
        /// Rows present before the upsert
        #[arg(long, default_value_t = 3)]
        existing: usize,
        /// Rows the upsert has to insert
        #[arg(long, default_value_t = 2)]
        new: usize,
        #[arg(long, default_value_t = 0)]
        max_retries: u32,
        #[arg(long, default_value_t = 1)]
        retry_delay_ms: u64,
        /// Batch executions that affect no rows before the driver recovers
        #[arg(long, default_value_t = 0)]
        stall: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Reporting {
    Exact,
    NoInfo,
    Absent,
}

impl Reporting {
    fn batch_reporting(self) -> BatchReporting {
        match self {
            Self::Exact => BatchReporting::Exact,
            Self::NoInfo => BatchReporting::NoInfo,
            Self::Absent => BatchReporting::Absent,
        }
    }

    /// Dialect whose capabilities match what the driver reports.
    fn dialect(self) -> &'static str {
        match self {
            Self::Exact => "memory",
            Self::NoInfo => "oracle",
            Self::Absent => "maxdb",
        }
    }
}

#[derive(Serialize)]
struct DialectInfo<'a> {
    name: &'a str,
    capabilities: Capabilities,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Dialects { json } => list_dialects(json),
        Command::Resolve { url } => {
            let dialect = DialectSet::builtin()
                .resolve(&url)
                .with_context(|| format!("Cannot resolve '{}'", url))?;
            println!("{} ({})", dialect.name(), dialect.capabilities());
            Ok(())
        }
        Command::Demo {
            reporting,
            existing,
            new,
            max_retries,
            retry_delay_ms,
            stall,
        } => demo::run(demo::Scenario {
            reporting,
            existing,
            new,
            max_retries,
            retry_delay_ms,
            stall,
        }),
    }
}

fn list_dialects(json: bool) -> Result<()> {
    let dialects = DialectSet::builtin();
    if json {
        let infos: Vec<DialectInfo> = dialects
            .iter()
            .map(|d| DialectInfo {
                name: d.name(),
                capabilities: d.capabilities(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("{:<12} {:<6} {:<10}", "dialect", "total", "individual");
    for dialect in dialects.iter() {
        let caps = dialect.capabilities();
        println!(
            "{:<12} {:<6} {:<10}",
            dialect.name(),
            caps.total_count_known,
            caps.individual_counts_known
        );
    }
    Ok(())
}
