//! Boot-time decoder.
//!
//! Runs once, early in `main`, after clocks and the report sink are up and
//! before application logic. It validates the store as a single predicate
//! (magic, version, header length, payload bound, checksum), renders a valid
//! record through an injected [`core::fmt::Write`] sink and, per
//! [`ErasePolicy`], erases it so the next unrelated boot stays quiet.
//!
//! An invalid or absent record is the normal case on most boots and is never
//! reported as an error.
//!
//! The report ends with exactly one correlation line,
//! `HF_ADDR PC=0x%08X LR=0x%08X`, which the host correlation tool keys on.
//! That line's format is fixed; the rest of the report may change.

use core::fmt::{self, Write};

use crate::config::ErasePolicy;
use crate::fault_status::FaultEnable;
use crate::record::{
    payload_area, payload_area_len, record_checksum, stored_checksum, DumpHeader, RecordError,
    HEADER_LEN,
};
use crate::store::DumpStore;

/// Report line terminator (UART-friendly).
pub const EOL: &str = "\r\n";

/// Correlation line prefix.
pub const CORRELATION_TAG: &str = "HF_ADDR";

/// A validated record borrowed from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dump<'a> {
    /// Decoded header.
    pub header: DumpHeader,
    /// Copied stack bytes.
    pub payload: &'a [u8],
}

/// Validate raw store contents.
///
/// # Errors
///
/// Any [`RecordError`]: the record is absent or corrupt and must not be
/// rendered.
pub fn validate(bytes: &[u8]) -> Result<Dump<'_>, RecordError> {
    let raw: &[u8; HEADER_LEN] = bytes
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(RecordError::Truncated)?;
    let header = DumpHeader::decode(raw)?;

    let max_payload = payload_area_len(bytes.len());
    let payload_len = usize::try_from(header.stack_bytes)
        .ok()
        .filter(|&len| len <= max_payload)
        .ok_or(RecordError::PayloadTooLarge(header.stack_bytes))?;
    let payload = bytes
        .get(HEADER_LEN..HEADER_LEN.saturating_add(payload_len))
        .ok_or(RecordError::PayloadTooLarge(header.stack_bytes))?;

    let stored = stored_checksum(raw);
    let computed = record_checksum(raw, payload_area(bytes));
    if stored != computed {
        return Err(RecordError::ChecksumMismatch { stored, computed });
    }
    Ok(Dump { header, payload })
}

/// Write the human-readable report for `dump` to `sink`.
///
/// # Errors
///
/// Whatever the sink returns.
pub fn render<W: Write + ?Sized>(dump: &Dump<'_>, sink: &mut W) -> fmt::Result {
    let h = &dump.header;
    let ctx = &h.context;
    let r = &h.registers;
    let f = &h.fault;

    write!(sink, "{EOL}===== HARD FAULT DUMP ====={EOL}")?;
    write!(sink, "Magic: 0x{:08X}, Ver: {}{EOL}", DumpHeader::MAGIC, DumpHeader::VERSION)?;
    write!(
        sink,
        "EXC_RETURN: 0x{:08X}  MSP: 0x{:08X}  PSP: 0x{:08X}{EOL}",
        ctx.exc_return, ctx.msp, ctx.psp
    )?;
    write!(
        sink,
        "Active SP: 0x{:08X}  Used: {}  FP ctx: {}{EOL}",
        ctx.active_sp,
        ctx.stack_name(),
        if ctx.has_fp { "YES" } else { "NO" }
    )?;

    write!(sink, "Core regs:{EOL}")?;
    write!(sink, " R0 : 0x{:08X}  R1 : 0x{:08X}{EOL}", r.r0, r.r1)?;
    write!(sink, " R2 : 0x{:08X}  R3 : 0x{:08X}{EOL}", r.r2, r.r3)?;
    write!(sink, " R12: 0x{:08X}  LR : 0x{:08X}{EOL}", r.r12, r.lr)?;
    write!(sink, " PC : 0x{:08X}  PSR: 0x{:08X}{EOL}", r.pc, r.xpsr)?;

    write!(
        sink,
        "CFSR: 0x{:08X} (MMFSR=0x{:02X} BFSR=0x{:02X} UFSR=0x{:04X}){EOL}",
        f.cfsr,
        f.mmfsr(),
        f.bfsr(),
        f.ufsr()
    )?;
    write!(sink, "Fault flags:")?;
    let mut any = false;
    for (name, _) in f.cfsr_flags().iter_names() {
        write!(sink, " {name}")?;
        any = true;
    }
    for (name, _) in f.hfsr_flags().iter_names() {
        write!(sink, " {name}")?;
        any = true;
    }
    if !any {
        write!(sink, " none")?;
    }
    write!(sink, "{EOL}")?;
    write!(sink, "HFSR: 0x{:08X}  DFSR: 0x{:08X}{EOL}", f.hfsr, f.dfsr)?;
    write!(sink, "MMFAR: 0x{:08X}  BFAR: 0x{:08X}{EOL}", f.mmfar, f.bfar)?;
    write!(sink, "AFSR: 0x{:08X}  SHCSR: 0x{:08X}{EOL}", f.afsr, f.shcsr)?;

    if let Some(task) = &h.task {
        write!(sink, "FreeRTOS:{EOL}")?;
        write!(sink, " Task : '{}'{EOL}", task.name())?;
        write!(sink, " Prio : {}{EOL}", task.priority)?;
        write!(sink, " Stack base : 0x{:08X}{EOL}", task.stack_base)?;
        write!(sink, " Min free   : {} bytes{EOL}", task.stack_high_water_bytes)?;
    } else {
        write!(
            sink,
            "FreeRTOS info: not available (no RTOS or scheduler not started){EOL}"
        )?;
    }

    write!(sink, "Stack dump bytes: {}{EOL}", h.stack_bytes)?;
    write_correlation_line(sink, r.pc, r.lr)?;
    write!(sink, "===== END HARD FAULT DUMP ====={EOL}")
}

/// Emit the machine-parsable `HF_ADDR` line.
///
/// # Errors
///
/// Whatever the sink returns.
pub fn write_correlation_line<W: Write + ?Sized>(sink: &mut W, pc: u32, lr: u32) -> fmt::Result {
    write!(sink, "{CORRELATION_TAG} PC=0x{pc:08X} LR=0x{lr:08X}{EOL}")
}

/// Validates, renders and clears the persistent store.
pub struct Decoder<S> {
    store: S,
    policy: ErasePolicy,
}

impl<S: DumpStore> Decoder<S> {
    /// Decoder with the default policy (erase after render).
    pub fn new(store: S) -> Self {
        Self::with_policy(store, ErasePolicy::default())
    }

    /// Decoder with an explicit erase policy.
    pub fn with_policy(store: S, policy: ErasePolicy) -> Self {
        Self { store, policy }
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give back the underlying store.
    pub fn into_inner(self) -> S {
        self.store
    }

    /// Validate the store and borrow the record.
    ///
    /// # Errors
    ///
    /// The first check that failed. Callers that only care whether a dump
    /// exists should use [`Self::dump_available`].
    pub fn load(&self) -> Result<Dump<'_>, RecordError> {
        validate(self.store.read())
    }

    /// `true` if the store holds a valid record. No side effects.
    pub fn dump_available(&self) -> bool {
        self.load().is_ok()
    }

    /// Render the stored record without erasing it.
    ///
    /// Returns `Ok(false)` without writing anything when there is no valid
    /// record.
    ///
    /// # Errors
    ///
    /// Whatever the sink returns.
    pub fn decode_and_print<W: Write + ?Sized>(&self, sink: &mut W) -> Result<bool, fmt::Error> {
        match self.load() {
            Ok(dump) => render(&dump, sink).map(|()| true),
            Err(_) => Ok(false),
        }
    }

    /// Erase the store unconditionally.
    pub fn clear(&mut self) {
        self.store.erase();
    }

    /// Boot-time entry point.
    ///
    /// Enables the MemManage/BusFault/UsageFault handlers so future faults
    /// carry specific causes, then renders any stored record and applies the
    /// erase policy. A record whose rendering failed at the sink is kept for
    /// the next boot.
    ///
    /// Returns `true` if a dump was reported.
    pub fn init<E, W>(&mut self, faults: &mut E, sink: &mut W) -> bool
    where
        E: FaultEnable + ?Sized,
        W: Write + ?Sized,
    {
        faults.enable_fault_categories();

        match self.decode_and_print(sink) {
            Ok(true) => {
                if self.policy.erases() {
                    self.clear();
                }
                true
            }
            Ok(false) | Err(_) => false,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::capture::{capture, FaultContext, SliceStack};
    use crate::config::{ERASE_BYTE, STORE_CAPACITY};
    use crate::fault_status::FaultStatus;
    use crate::frame::ExcReturn;
    use crate::scheduler::{SchedulerHooks, TaskInfo};
    use crate::store::SliceStore;

    struct CountingEnable(u32);

    impl FaultEnable for CountingEnable {
        fn enable_fault_categories(&mut self) {
            self.0 += 1;
        }
    }

    fn captured_area() -> Vec<u8> {
        let stack = [0xABu8; 64];
        let mut area = vec![0u8; STORE_CAPACITY];
        let fault = FaultContext::from_exception(
            ExcReturn::new(0xFFFF_FFFD),
            0x2001_FFC0,
            0x2000_0FC0,
            &[1, 2, 3, 4, 12, 0x0800_0F00, 0x0800_1234, 0x6100_0000],
            FaultStatus {
                cfsr: 0x0000_8200,
                hfsr: 0x4000_0000,
                bfar: 0x6000_0000,
                shcsr: 0x0007_0000,
                ..FaultStatus::default()
            },
        );
        capture(
            &mut SliceStore::new(&mut area),
            &fault,
            &SchedulerHooks::ABSENT,
            &SliceStack::new(0x2000_0FC0, &stack),
        );
        area
    }

    #[test]
    fn report_has_fixed_sections_in_order() {
        let mut area = captured_area();
        let decoder = Decoder::new(SliceStore::new(&mut area));
        let mut out = String::new();
        assert!(decoder.decode_and_print(&mut out).unwrap());

        let labels = [
            "===== HARD FAULT DUMP =====",
            "Magic: 0x48464450, Ver: 4",
            "EXC_RETURN: 0xFFFFFFFD  MSP: 0x2001FFC0  PSP: 0x20000FC0",
            "Active SP: 0x20000FC0  Used: PSP  FP ctx: NO",
            "Core regs:",
            " R0 : 0x00000001  R1 : 0x00000002",
            " PC : 0x08001234  PSR: 0x61000000",
            "CFSR: 0x00008200 (MMFSR=0x00 BFSR=0x82 UFSR=0x0000)",
            "Fault flags: PRECISERR BFARVALID FORCED",
            "HFSR: 0x40000000  DFSR: 0x00000000",
            "MMFAR: 0x00000000  BFAR: 0x60000000",
            "FreeRTOS info: not available",
            "Stack dump bytes: 64",
            "HF_ADDR PC=0x08001234 LR=0x08000F00",
            "===== END HARD FAULT DUMP =====",
        ];
        let mut cursor = 0;
        for label in labels {
            let at = out[cursor..]
                .find(label)
                .unwrap_or_else(|| panic!("missing or out of order: {label}\n{out}"));
            cursor += at + label.len();
        }
    }

    #[test]
    fn exactly_one_correlation_line() {
        let mut area = captured_area();
        let decoder = Decoder::new(SliceStore::new(&mut area));
        let mut out = String::new();
        decoder.decode_and_print(&mut out).unwrap();
        assert_eq!(out.matches(CORRELATION_TAG).count(), 1);
        assert!(out.contains("HF_ADDR PC=0x08001234 LR=0x08000F00\r\n"));
    }

    #[test]
    fn no_flags_prints_none() {
        let area = captured_area();
        let mut dump = validate(&area).unwrap();
        dump.header.fault = FaultStatus::default();
        let mut out = String::new();
        render(&dump, &mut out).unwrap();
        assert!(out.contains("Fault flags: none\r\n"));
    }

    #[test]
    fn task_block_replaces_unavailable_line() {
        let area = captured_area();
        let mut dump = validate(&area).unwrap();
        dump.header.task = Some(TaskInfo::new(b"sensor", 3, 120, 0x2000_2000));
        let mut out = String::new();
        render(&dump, &mut out).unwrap();
        assert!(out.contains("FreeRTOS:\r\n"));
        assert!(out.contains(" Task : 'sensor'\r\n"));
        assert!(out.contains(" Prio : 3\r\n"));
        assert!(out.contains(" Stack base : 0x20002000\r\n"));
        assert!(out.contains(" Min free   : 120 bytes\r\n"));
        assert!(!out.contains("not available"));
    }

    #[test]
    fn erased_store_prints_nothing() {
        let mut area = vec![ERASE_BYTE; STORE_CAPACITY];
        let decoder = Decoder::new(SliceStore::new(&mut area));
        let mut out = String::new();
        assert!(!decoder.decode_and_print(&mut out).unwrap());
        assert!(out.is_empty());
        assert_eq!(decoder.load().unwrap_err(), RecordError::BadMagic(0xFFFF_FFFF));
    }

    #[test]
    fn truncated_store_is_rejected() {
        let area = captured_area();
        assert_eq!(validate(&area[..HEADER_LEN - 1]), Err(RecordError::Truncated));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let area = captured_area();
        // Same record, but viewed through a store too small for its payload.
        assert_eq!(
            validate(&area[..HEADER_LEN + 10]),
            Err(RecordError::PayloadTooLarge(64))
        );
    }

    #[test]
    fn init_renders_then_erases_by_default() {
        let mut area = captured_area();
        let mut decoder = Decoder::new(SliceStore::new(&mut area));
        let mut faults = CountingEnable(0);
        let mut out = String::new();

        assert!(decoder.init(&mut faults, &mut out));
        assert_eq!(faults.0, 1);
        assert!(out.contains("HF_ADDR"));
        assert!(!decoder.dump_available());

        let mut again = String::new();
        assert!(!decoder.init(&mut faults, &mut again));
        assert!(again.is_empty());
        assert_eq!(faults.0, 2);
    }

    #[test]
    fn init_keeps_record_when_policy_says_so() {
        let mut area = captured_area();
        let mut decoder =
            Decoder::with_policy(SliceStore::new(&mut area), ErasePolicy::KeepAfterRender);
        let mut faults = CountingEnable(0);
        let mut first = String::new();
        let mut second = String::new();

        assert!(decoder.init(&mut faults, &mut first));
        assert!(decoder.init(&mut faults, &mut second));
        assert_eq!(first, second);
    }

    #[test]
    fn init_keeps_record_when_sink_fails() {
        struct Broken;
        impl Write for Broken {
            fn write_str(&mut self, _: &str) -> fmt::Result {
                Err(fmt::Error)
            }
        }

        let mut area = captured_area();
        let mut decoder = Decoder::new(SliceStore::new(&mut area));
        assert!(!decoder.init(&mut CountingEnable(0), &mut Broken));
        assert!(decoder.dump_available());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut area = captured_area();
        let mut decoder = Decoder::new(SliceStore::new(&mut area));
        decoder.clear();
        decoder.clear();
        assert!(!decoder.dump_available());
        assert!(decoder.store().read().iter().all(|&b| b == ERASE_BYTE));
    }

    #[test]
    fn dump_available_has_no_side_effects() {
        let mut area = captured_area();
        let snapshot = area.clone();
        let decoder = Decoder::new(SliceStore::new(&mut area));
        assert!(decoder.dump_available());
        assert!(decoder.dump_available());
        assert_eq!(decoder.into_inner().into_inner(), &snapshot[..]);
    }
}
