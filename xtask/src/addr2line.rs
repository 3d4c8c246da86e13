use anyhow::{bail, Context, Result};
use colored::Colorize;
use correlate::{correlate, Addr2Line, Resolution, NO_ADDRESSES};
use std::path::Path;

pub fn run(elf: &Path, log: &Path, tool: &str) -> Result<()> {
    if !elf.is_file() {
        bail!("ELF not found: {}", elf.display());
    }
    let text = read_log(log)?;

    let resolver = Addr2Line::new(elf).with_tool(tool);
    let result = correlate(&text, &resolver);

    if result.is_empty() {
        eprintln!("{}", NO_ADDRESSES.yellow());
        return Ok(());
    }

    println!();
    println!(
        "{}",
        format!(
            "🔎 Found {} unique addresses. Resolving with {}...",
            result.addresses().len(),
            tool
        )
        .cyan()
        .bold()
    );
    println!();

    for (addr, res) in result.addresses() {
        println!("{}", format!("0x{addr:08X}:").bold());
        match res {
            Resolution::Resolved(sym) => {
                println!("   {}", sym.function.green());
                println!("   {}", sym.location.dimmed());
            }
            Resolution::Unresolved(why) => {
                println!("   {}", format!("<unresolved: {why}>").red());
            }
        }
        println!();
    }

    for (pair, pc, lr) in result.resolved_pairs() {
        println!("{} {}", "Fault:".bold(), pair);
        println!("   PC in {}", function_name(pc));
        println!("   called from {}", function_name(lr));
    }
    println!();

    Ok(())
}

/// Log text with invalid UTF-8 replaced; RTT captures often contain binary
/// noise from a reset mid-frame.
fn read_log(path: &Path) -> Result<String> {
    if !path.is_file() {
        bail!("Log not found: {}", path.display());
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn function_name(res: &Resolution) -> &str {
    match res {
        Resolution::Resolved(sym) => &sym.function,
        Resolution::Unresolved(_) => "??",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_with_binary_noise_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtt.log");
        let mut bytes = b"\xff\xfe garbage\n".to_vec();
        bytes.extend_from_slice(b"HF_ADDR PC=0x08001234 LR=0x08000F00\r\n");
        std::fs::write(&path, bytes).unwrap();

        let text = read_log(&path).unwrap();
        assert_eq!(correlate::extract(&text).len(), 1);
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_log(&dir.path().join("absent.log")).unwrap_err();
        assert!(err.to_string().contains("Log not found"));
    }

    #[test]
    fn missing_elf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("rtt.log");
        std::fs::write(&log, "").unwrap();
        let err = run(&dir.path().join("fw.elf"), &log, "addr2line").unwrap_err();
        assert!(err.to_string().contains("ELF not found"));
    }
}
