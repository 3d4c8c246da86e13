use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::process::Command;

const CHIP: &str = "STM32G474RETx";
const TARGET: &str = "thumbv7em-none-eabihf";

/// Build the demo, then hand it to `probe-rs run`, which flashes it and
/// streams RTT until interrupted. The demo faults on every boot, so the
/// stream shows the report of the previous run right after each reset.
pub fn run(release: bool) -> Result<()> {
    let elf = elf_path(release);

    println!();
    println!("{}", format!("🔨 Building {elf}...").cyan().bold());

    let mut build = Command::new("cargo");
    build.args(["build", "-p", "firmware", "--target", TARGET, "--features", "hardware"]);
    if release {
        build.arg("--release");
    }
    // Inherit stdio: cargo's own diagnostics are the useful output here.
    let status = build.status().context("Failed to run cargo build")?;
    if !status.success() {
        bail!("Firmware build failed");
    }

    println!();
    println!("{}", "💥 The demo faults 3s after every boot".bold());
    println!(
        "   {}",
        format!("Save the RTT output below to a file, then run 'cargo xtask addr2line --elf {elf} --log <file>'")
            .dimmed()
    );
    println!();

    let status = Command::new("probe-rs")
        .args(["run", "--chip", CHIP, elf])
        .status()
        .context("Failed to run probe-rs. Is probe-rs installed? (cargo install probe-rs-tools)")?;
    if !status.success() {
        bail!("probe-rs exited with {status}; check that the probe is connected and the board powered");
    }

    Ok(())
}

fn elf_path(release: bool) -> &'static str {
    if release {
        "target/thumbv7em-none-eabihf/release/firmware"
    } else {
        "target/thumbv7em-none-eabihf/debug/firmware"
    }
}
