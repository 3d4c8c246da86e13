//! Device report to resolved addresses.
//!
//! A dump is captured and rendered with the embedded crate exactly as a boot
//! would, the text is wrapped in unrelated log noise, and the correlator is
//! run over it.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::arithmetic_side_effects
)]

use std::cell::RefCell;
use std::fmt::Write as _;

use correlate::{correlate, extract, AddrPair, Resolution, ResolveError, Symbol, SymbolResolver};
use hardfault::{
    capture, render, validate, ExcReturn, FaultContext, FaultStatus, SchedulerHooks, SliceStack,
    SliceStore, STORE_CAPACITY,
};
use proptest::prelude::*;

const PC: u32 = 0x0800_1234;
const LR: u32 = 0x0800_0F00;

fn device_report() -> String {
    let mut area = vec![0xFFu8; STORE_CAPACITY];
    let stack = vec![0u8; 256];
    let fault = FaultContext::from_exception(
        ExcReturn::new(0xFFFF_FFF9),
        0x2001_FF00,
        0,
        &[1, 2, 3, 4, 12, LR, PC, 0x0100_0000],
        FaultStatus {
            cfsr: 0x0000_8200,
            hfsr: 0x4000_0000,
            bfar: 0x6000_0000,
            ..FaultStatus::default()
        },
    );
    capture(
        &mut SliceStore::new(&mut area),
        &fault,
        &SchedulerHooks::ABSENT,
        &SliceStack::new(0x2001_FF00, &stack),
    );

    let dump = validate(&area).unwrap();
    let mut text = String::new();
    render(&dump, &mut text).unwrap();
    text
}

/// Fixed symbol table; counts lookups.
struct Elf {
    calls: RefCell<usize>,
}

impl SymbolResolver for Elf {
    fn lookup(&self, addr: u32) -> Result<Option<Symbol>, ResolveError> {
        *self.calls.borrow_mut() += 1;
        let sym = match addr {
            PC => ("firmware::read_unmapped", "crates/firmware/src/main.rs:58"),
            LR => ("firmware::__fault_later_task::{{closure}}", "crates/firmware/src/main.rs:51"),
            _ => return Ok(None),
        };
        Ok(Some(Symbol {
            function: sym.0.to_owned(),
            location: sym.1.to_owned(),
        }))
    }
}

#[test]
fn report_pair_is_extracted_once_from_repeated_log() {
    let report = device_report();
    let mut log = String::new();
    writeln!(log, "0.000001 INFO  boot").unwrap();
    log.push_str(&report);
    writeln!(log, "3.000120 WARN  reading 0x60000000 to trigger a BusFault").unwrap();
    // Same dump printed again, e.g. with the keep policy.
    log.push_str(&report);

    assert_eq!(extract(&log), [AddrPair { pc: PC, lr: LR }]);
}

#[test]
fn report_resolves_pc_and_lr() {
    let elf = Elf { calls: RefCell::new(0) };
    let log = format!("{0}{0}", device_report());
    let c = correlate(&log, &elf);

    assert_eq!(*elf.calls.borrow(), 2);
    let (pair, pc, lr) = c.resolved_pairs().next().unwrap();
    assert_eq!(pair, AddrPair { pc: PC, lr: LR });
    match (pc, lr) {
        (Resolution::Resolved(pc), Resolution::Resolved(lr)) => {
            assert_eq!(pc.function, "firmware::read_unmapped");
            assert!(lr.location.ends_with("main.rs:51"));
        }
        other => panic!("expected both resolved, got {other:?}"),
    }

    let text = c.to_string();
    let pc_at = text.find("0x08001234:").unwrap();
    let lr_at = text.find("0x08000F00:").unwrap();
    assert!(pc_at < lr_at, "PC listed before LR:\n{text}");
}

// Both scripts are written before either runs, so no fork can inherit a
// still-open write handle (ETXTBSY).
#[cfg(unix)]
#[test]
fn addr2line_subprocess() {
    use std::os::unix::fs::PermissionsExt;

    use correlate::Addr2Line;

    let dir = tempfile::tempdir().unwrap();
    let script = |name: &str, body: &str| {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    };
    // Last argument is the address; echo it back as the function name.
    let good = script(
        "fake-addr2line",
        "#!/bin/sh\nfor a; do last=$a; done\necho \"func_$last\"\necho \"src/fake.rs:7\"\n",
    );
    let broken = script(
        "broken-addr2line",
        "#!/bin/sh\necho 'cannot open fw.elf' >&2\nexit 1\n",
    );

    let resolver = Addr2Line::new(dir.path().join("fw.elf")).with_tool(good.to_str().unwrap());
    match resolver.resolve(PC) {
        Resolution::Resolved(sym) => {
            assert_eq!(sym.function, "func_0x08001234");
            assert_eq!(sym.location, "src/fake.rs:7");
        }
        Resolution::Unresolved(why) => panic!("fake tool failed: {why}"),
    }

    let resolver = Addr2Line::new("fw.elf").with_tool(broken.to_str().unwrap());
    match resolver.resolve(PC) {
        Resolution::Unresolved(why) => assert!(why.contains("cannot open fw.elf"), "{why}"),
        Resolution::Resolved(sym) => panic!("unexpected {sym:?}"),
    }
}

proptest! {
    #[test]
    fn any_pair_survives_the_device_grammar(pc in any::<u32>(), lr in any::<u32>(), noise in "[a-z ]{0,20}") {
        let mut line = String::new();
        hardfault::decode::write_correlation_line(&mut line, pc, lr).unwrap();
        let log = format!("{noise}{line}{noise}\n");
        prop_assert_eq!(extract(&log), vec![AddrPair { pc, lr }]);
    }
}
