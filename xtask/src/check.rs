use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking firmware builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    // Check 1: Hardware target
    println!("{}", "  Checking hardware target (STM32G474)...".cyan());
    let hw_start = Instant::now();

    let hw_output = Command::new("cargo")
        .args([
            "check",
            "-p",
            "firmware",
            "--target",
            "thumbv7em-none-eabihf",
            "--features",
            "hardware",
        ])
        .output()
        .context("Failed to check hardware build")?;

    if !hw_output.status.success() {
        eprintln!("{}", "  ✗ Hardware check failed".red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&hw_output.stderr));
        anyhow::bail!("Hardware check failed");
    }

    println!(
        "{}",
        format!(
            "  ✓ Hardware check passed in {:.2}s",
            hw_start.elapsed().as_secs_f64()
        )
        .green()
    );
    println!();

    // Check 2: no_std core on the embedded target, with and without defmt
    for features in [None, Some("defmt")] {
        let label = features.map_or_else(|| "no features".to_owned(), |f| format!("--features {f}"));
        println!("{}", format!("  Checking hardfault crate (no_std, {label})...").cyan());
        let core_start = Instant::now();

        let mut cmd = Command::new("cargo");
        cmd.args(["check", "-p", "hardfault", "--target", "thumbv7em-none-eabihf"]);
        if let Some(f) = features {
            cmd.args(["--features", f]);
        }
        let core_output = cmd.output().context("Failed to check hardfault crate")?;

        if !core_output.status.success() {
            eprintln!("{}", "  ✗ hardfault check failed".red().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&core_output.stderr));
            anyhow::bail!("hardfault check failed");
        }

        println!(
            "{}",
            format!(
                "  ✓ hardfault check passed in {:.2}s",
                core_start.elapsed().as_secs_f64()
            )
            .green()
        );
        println!();
    }

    // Check 3: Host crates (firmware logic without `hardware`, correlate, xtask)
    println!("{}", "  Checking host crates...".cyan());
    let host_start = Instant::now();

    let host_output = Command::new("cargo")
        .args(["check", "--workspace", "--all-targets"])
        .output()
        .context("Failed to check host crates")?;

    if !host_output.status.success() {
        eprintln!("{}", "  ✗ Host check failed".red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&host_output.stderr));
        anyhow::bail!("Host check failed");
    }

    println!(
        "{}",
        format!(
            "  ✓ Host check passed in {:.2}s",
            host_start.elapsed().as_secs_f64()
        )
        .green()
    );
    println!();

    // Check 4: Clippy lints
    println!("{}", "  Running clippy lints...".cyan());
    let clippy_start = Instant::now();

    let clippy_output = Command::new("cargo")
        .args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
        .output()
        .context("Failed to run clippy")?;

    if !clippy_output.status.success() {
        eprintln!("{}", "  ⚠ Clippy warnings found".yellow().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&clippy_output.stderr));
        // Don't fail on clippy warnings, just show them
    } else {
        println!(
            "{}",
            format!(
                "  ✓ Clippy passed in {:.2}s",
                clippy_start.elapsed().as_secs_f64()
            )
            .green()
        );
    }
    println!();

    // Check 5: Format check
    println!("{}", "  Checking code formatting...".cyan());

    let fmt_output = Command::new("cargo")
        .args(["fmt", "--all", "--check"])
        .output()
        .context("Failed to run cargo fmt")?;

    if !fmt_output.status.success() {
        eprintln!("{}", "  ⚠ Formatting issues found".yellow().bold());
        eprintln!("     Run 'cargo fmt --all' to fix");
        // Don't fail on format issues
    } else {
        println!("{}", "  ✓ Formatting check passed".green());
    }
    println!();

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
