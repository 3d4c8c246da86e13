//! Host-side HardFault correlation
//!
//! Reads the boot log captured from the device (RTT, serial, anything that
//! ends up as text), finds the `HF_ADDR PC=0x........ LR=0x........` lines
//! the report emits, and resolves each distinct address against the
//! firmware ELF.
//!
//! ```text
//! log text ─→ grammar::extract ─→ (PC, LR) pairs, deduplicated
//!                                   ↓
//!                       unique addresses, PC before LR
//!                                   ↓
//!                  SymbolResolver (addr2line) ─→ function + file:line
//! ```
//!
//! Nothing else in the log is interpreted. Output order is order of first
//! appearance, so the faulting PC of the first dump is always printed first.

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod grammar;
pub mod resolve;

use std::fmt;

pub use grammar::{extract, unique_addresses, AddrPair};
pub use resolve::{Addr2Line, Resolution, ResolveError, Symbol, SymbolResolver};

/// Message for a log with no correlation lines.
pub const NO_ADDRESSES: &str = "No HF_ADDR lines found in log.";

/// Result of correlating one log.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pairs: Vec<AddrPair>,
    resolved: Vec<(u32, Resolution)>,
}

impl Correlation {
    /// Distinct `(PC, LR)` pairs, first appearance first.
    pub fn pairs(&self) -> &[AddrPair] {
        &self.pairs
    }

    /// Each distinct address with its resolution, PC before LR.
    pub fn addresses(&self) -> &[(u32, Resolution)] {
        &self.resolved
    }

    /// `true` if the log carried no correlation line.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Resolution for one address seen in the log.
    pub fn lookup(&self, addr: u32) -> Option<&Resolution> {
        self.resolved
            .iter()
            .find(|(a, _)| *a == addr)
            .map(|(_, r)| r)
    }

    /// Pairs with their PC and LR resolutions.
    pub fn resolved_pairs(&self) -> impl Iterator<Item = (AddrPair, &Resolution, &Resolution)> + '_ {
        self.pairs.iter().filter_map(|pair| {
            Some((*pair, self.lookup(pair.pc)?, self.lookup(pair.lr)?))
        })
    }
}

/// Extract every correlation line from `log` and resolve each distinct
/// address once.
///
/// Resolver failures do not abort the run; they show up as
/// [`Resolution::Unresolved`] for that address.
pub fn correlate<R: SymbolResolver + ?Sized>(log: &str, resolver: &R) -> Correlation {
    let pairs = extract(log);
    let resolved = unique_addresses(&pairs)
        .into_iter()
        .map(|addr| (addr, resolver.resolve(addr)))
        .collect();
    Correlation { pairs, resolved }
}

impl fmt::Display for Correlation {
    /// Listing in the form:
    ///
    /// ```text
    /// Found 2 unique addresses. Resolving with addr2line...
    ///
    /// 0x08001234:
    /// firmware::read_unmapped
    /// /src/main.rs:57
    ///
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.resolved.is_empty() {
            return writeln!(f, "{NO_ADDRESSES}");
        }
        writeln!(
            f,
            "Found {} unique addresses. Resolving with addr2line...",
            self.resolved.len()
        )?;
        writeln!(f)?;
        for (addr, res) in &self.resolved {
            writeln!(f, "0x{addr:08X}:")?;
            writeln!(f, "{res}")?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Resolves everything to `fn_<addr>` and counts lookups.
    #[derive(Default)]
    struct Table {
        calls: RefCell<Vec<u32>>,
    }

    impl SymbolResolver for Table {
        fn lookup(&self, addr: u32) -> Result<Option<Symbol>, ResolveError> {
            self.calls.borrow_mut().push(addr);
            if addr == 0 {
                return Ok(None);
            }
            Ok(Some(Symbol {
                function: format!("fn_{addr:x}"),
                location: "src/lib.rs:1".to_owned(),
            }))
        }
    }

    #[test]
    fn each_address_resolved_once() {
        let log = "\
            HF_ADDR PC=0x08000100 LR=0x08000200\n\
            HF_ADDR PC=0x08000200 LR=0x08000100\n\
            HF_ADDR PC=0x08000100 LR=0x08000200\n";
        let table = Table::default();
        let c = correlate(log, &table);
        assert_eq!(c.pairs().len(), 2);
        assert_eq!(*table.calls.borrow(), [0x0800_0100, 0x0800_0200]);
    }

    #[test]
    fn unresolved_address_is_marked() {
        let c = correlate("HF_ADDR PC=0x00000000 LR=0x08000200", &Table::default());
        assert!(matches!(c.lookup(0), Some(Resolution::Unresolved(_))));
        assert!(matches!(c.lookup(0x0800_0200), Some(Resolution::Resolved(_))));
    }

    #[test]
    fn resolved_pairs_follow_log_order() {
        let log = "HF_ADDR PC=0x08000300 LR=0x08000301\nHF_ADDR PC=0x08000100 LR=0x08000101\n";
        let c = correlate(log, &Table::default());
        let pcs: Vec<u32> = c.resolved_pairs().map(|(p, _, _)| p.pc).collect();
        assert_eq!(pcs, [0x0800_0300, 0x0800_0100]);
    }

    #[test]
    fn listing_format() {
        let c = correlate("HF_ADDR PC=0x08001234 LR=0x08000F00", &Table::default());
        let text = c.to_string();
        assert!(text.starts_with("Found 2 unique addresses. Resolving with addr2line...\n\n"));
        assert!(text.contains("0x08001234:\nfn_8001234\nsrc/lib.rs:1\n\n"));
        assert!(text.contains("0x08000F00:\nfn_8000f00\nsrc/lib.rs:1\n\n"));
    }

    #[test]
    fn empty_log() {
        let c = correlate("boot ok\n", &Table::default());
        assert!(c.is_empty());
        assert_eq!(c.to_string().trim_end(), NO_ADDRESSES);
    }
}
