use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "flexalloc-cmd")]
#[command(about = "Command-line utility for the FlexAlloc aligned allocator")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactively append integers to a growable buffer and print it
    Repl {
        /// Number of elements the buffer is created with
        #[arg(long, default_value_t = 4)]
        initial_capacity: usize,

        /// Alignment of the buffer storage in bytes (power of two)
        #[arg(long, default_value_t = 16)]
        alignment: usize,
    },

    /// Display the page size and native allocation granularity
    Probe,

    /// Run allocate / deallocate / in-place expansion checks
    Selftest {
        /// Size of the test allocations in bytes
        #[arg(long, default_value_t = 1024)]
        size: usize,

        /// Alignment of the test allocations in bytes
        #[arg(long, default_value_t = 16)]
        alignment: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logging(cli.verbose);

    match cli.command {
        Commands::Repl {
            initial_capacity,
            alignment,
        } => commands::repl::run(initial_capacity, alignment),
        Commands::Probe => commands::probe::run(),
        Commands::Selftest { size, alignment } => commands::selftest::run(size, alignment),
    }
}
