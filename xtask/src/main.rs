// Desktop/tooling crate: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod addr2line;
mod check;
mod flash;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "HardFault dump development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flash the demo firmware to the STM32G474 via probe-rs
    Flash {
        /// Build and flash release version
        #[arg(short, long)]
        release: bool,
    },
    /// Check the firmware, the no_std core and the host crates
    Check,
    /// Run all tests (unit, integration, and doc)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Resolve HF_ADDR lines in a captured log against the firmware ELF
    Addr2line {
        /// Firmware ELF with debug info
        #[arg(long)]
        elf: PathBuf,
        /// Captured RTT/serial log
        #[arg(long)]
        log: PathBuf,
        /// addr2line binary to run
        #[arg(long, default_value = correlate::resolve::DEFAULT_TOOL)]
        tool: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Flash { release } => flash::run(release),
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::Addr2line { elf, log, tool } => addr2line::run(&elf, &log, &tool),
    }
}
