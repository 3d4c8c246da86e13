//! Address to source-location resolution.
//!
//! The symbol database is the firmware ELF. [`Addr2Line`] shells out to a
//! binutils `addr2line` for it; tests substitute their own
//! [`SymbolResolver`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;

/// Default resolver binary.
pub const DEFAULT_TOOL: &str = "arm-none-eabi-addr2line";

/// A resolved code address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Demangled function name.
    pub function: String,
    /// `file:line`
    pub location: String,
}

/// Outcome for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Found in the symbol database.
    Resolved(Symbol),
    /// Not covered by the database, or the resolver failed. Carries the
    /// reason for display.
    Unresolved(String),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(sym) => write!(f, "{}\n{}", sym.function, sym.location),
            Self::Unresolved(reason) => write!(f, "<unresolved: {reason}>"),
        }
    }
}

/// Resolver failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The resolver program could not be started.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Program name.
        tool: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The resolver ran but reported failure.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        /// Program name.
        tool: String,
        /// Exit status.
        status: ExitStatus,
        /// Trimmed standard error.
        stderr: String,
    },
    /// Output did not have the expected function/location lines.
    #[error("unexpected resolver output: {0:?}")]
    Malformed(String),
}

/// Symbol database lookup.
pub trait SymbolResolver {
    /// Look up one address.
    ///
    /// `Ok(None)` means the database has no entry for it.
    fn lookup(&self, addr: u32) -> Result<Option<Symbol>, ResolveError>;

    /// Look up one address, folding failures into [`Resolution::Unresolved`].
    fn resolve(&self, addr: u32) -> Resolution {
        match self.lookup(addr) {
            Ok(Some(sym)) => Resolution::Resolved(sym),
            Ok(None) => Resolution::Unresolved("no debug info for address".to_owned()),
            Err(e) => Resolution::Unresolved(e.to_string()),
        }
    }
}

/// Resolver backed by `addr2line -f -C -e <elf> <addr>`.
#[derive(Debug, Clone)]
pub struct Addr2Line {
    elf: PathBuf,
    tool: String,
}

impl Addr2Line {
    /// Resolve against `elf` with [`DEFAULT_TOOL`].
    pub fn new(elf: impl Into<PathBuf>) -> Self {
        Self {
            elf: elf.into(),
            tool: DEFAULT_TOOL.to_owned(),
        }
    }

    /// Use a different `addr2line` binary (e.g. `llvm-addr2line`).
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// ELF being queried.
    pub fn elf(&self) -> &Path {
        &self.elf
    }

    /// Resolver binary.
    pub fn tool(&self) -> &str {
        &self.tool
    }
}

impl SymbolResolver for Addr2Line {
    fn lookup(&self, addr: u32) -> Result<Option<Symbol>, ResolveError> {
        let output = Command::new(&self.tool)
            .arg("-f") // function name
            .arg("-C") // demangle
            .arg("-e")
            .arg(&self.elf)
            .arg(format!("0x{addr:08X}"))
            .output()
            .map_err(|source| ResolveError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ResolveError::Failed {
                tool: self.tool.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `addr2line -f` output: a function line, then a `file:line` line.
///
/// binutils prints `??` and `??:0` (or `??:?`) for addresses it has no
/// debug info for; that is `Ok(None)`.
pub fn parse_output(text: &str) -> Result<Option<Symbol>, ResolveError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let (Some(function), Some(location)) = (lines.next(), lines.next()) else {
        return Err(ResolveError::Malformed(text.to_owned()));
    };

    let unknown_location = location.starts_with("??:");
    if function == "??" && unknown_location {
        return Ok(None);
    }
    Ok(Some(Symbol {
        function: function.to_owned(),
        location: location.to_owned(),
    }))
}
