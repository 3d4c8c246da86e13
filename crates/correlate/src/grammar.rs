//! The `HF_ADDR` correlation line.
//!
//! ```text
//! HF_ADDR PC=0x08001234 LR=0x08000F00
//! ```
//!
//! This line is the only fixed contract between the device report and the
//! host. Anything else in the log is ignored: the input is an opaque stream
//! that may interleave other output, carry defmt timestamps in front of the
//! tag, or repeat the same report after several resets.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Pattern for one correlation line. Hex digits are case-insensitive; any
/// whitespace may separate the tokens.
pub const PATTERN: &str = r"HF_ADDR\s+PC=0x([0-9a-fA-F]{8})\s+LR=0x([0-9a-fA-F]{8})";

/// Faulting PC and the LR stacked with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrPair {
    /// Stacked program counter.
    pub pc: u32,
    /// Stacked link register.
    pub lr: u32,
}

impl fmt::Display for AddrPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PC=0x{:08X} LR=0x{:08X}", self.pc, self.lr)
    }
}

#[allow(clippy::expect_used)] // literal pattern, covered by every test below
fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PATTERN).expect("HF_ADDR pattern is valid"))
}

/// Every correlation line in `text`, duplicates included, in order.
pub fn matches(text: &str) -> impl Iterator<Item = AddrPair> + '_ {
    pattern().captures_iter(text).filter_map(|caps| {
        let pc = u32::from_str_radix(caps.get(1)?.as_str(), 16).ok()?;
        let lr = u32::from_str_radix(caps.get(2)?.as_str(), 16).ok()?;
        Some(AddrPair { pc, lr })
    })
}

/// Distinct `(PC, LR)` pairs in order of first appearance.
pub fn extract(text: &str) -> Vec<AddrPair> {
    let mut seen = HashSet::new();
    matches(text).filter(|pair| seen.insert(*pair)).collect()
}

/// Distinct addresses across `pairs`, PC before LR, in order of first
/// appearance. Each is resolved once even if it shows up in several pairs.
pub fn unique_addresses(pairs: &[AddrPair]) -> Vec<u32> {
    let mut seen = HashSet::new();
    pairs
        .iter()
        .flat_map(|p| [p.pc, p.lr])
        .filter(|a| seen.insert(*a))
        .collect()
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        let pairs = extract("HF_ADDR PC=0x08001234 LR=0x08000F00\r\n");
        assert_eq!(pairs, [AddrPair { pc: 0x0800_1234, lr: 0x0800_0F00 }]);
    }

    #[test]
    fn lowercase_hex_and_extra_whitespace() {
        let pairs = extract("HF_ADDR\tPC=0x0800abcd    LR=0x0800ef01");
        assert_eq!(pairs, [AddrPair { pc: 0x0800_ABCD, lr: 0x0800_EF01 }]);
    }

    #[test]
    fn prefix_noise_is_ignored() {
        let log = "0.000123 INFO  HF_ADDR PC=0x08001234 LR=0x08000F00\n";
        assert_eq!(extract(log).len(), 1);
    }

    #[test]
    fn short_hex_is_rejected() {
        assert!(extract("HF_ADDR PC=0x1234 LR=0x08000F00").is_empty());
    }

    #[test]
    fn duplicates_keep_first_order() {
        let log = "\
            HF_ADDR PC=0x00000002 LR=0x00000003\n\
            HF_ADDR PC=0x00000001 LR=0x00000001\n\
            HF_ADDR PC=0x00000002 LR=0x00000003\n";
        let pairs = extract(log);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].pc, 2);
        assert_eq!(pairs[1].pc, 1);
        assert_eq!(matches(log).count(), 3);
    }

    #[test]
    fn same_pc_different_lr_are_distinct_pairs() {
        let log = "HF_ADDR PC=0x08000100 LR=0x08000200\nHF_ADDR PC=0x08000100 LR=0x08000300\n";
        assert_eq!(extract(log).len(), 2);
    }

    #[test]
    fn unique_addresses_flatten_and_dedup() {
        let pairs = [
            AddrPair { pc: 0xA, lr: 0xB },
            AddrPair { pc: 0xB, lr: 0xC },
            AddrPair { pc: 0xA, lr: 0xC },
        ];
        assert_eq!(unique_addresses(&pairs), [0xA, 0xB, 0xC]);
    }

    #[test]
    fn display_matches_wire_format() {
        let pair = AddrPair { pc: 0x0800_1234, lr: 0x0800_0F00 };
        assert_eq!(format!("HF_ADDR {pair}"), "HF_ADDR PC=0x08001234 LR=0x08000F00");
    }
}
