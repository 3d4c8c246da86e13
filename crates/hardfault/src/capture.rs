//! Fault capture engine.
//!
//! Runs inside the HardFault handler, after the raw entry thunk has handed
//! over the faulted stack pointer and EXC_RETURN. By then nothing can be
//! trusted beyond the hardware-stacked frame: no heap, no scheduler services,
//! and the current stack may be the one that just overflowed. Everything here
//! is bounded-time, allocation-free and infallible. The only way out is the
//! reset the caller performs next.
//!
//! Order of operations:
//!
//! 1. query the scheduler (both gates, see [`crate::scheduler`])
//! 2. erase the store
//! 3. write the header with a zero checksum
//! 4. size the payload: `min(capacity - header, PAYLOAD_CAP)` when the
//!    faulted SP is below the stack top, additionally clipped to the bytes
//!    left before that top; zero otherwise
//! 5. copy the payload after the header
//! 6. recompute the checksum over the header and the whole payload area,
//!    then rewrite the header
//!
//! Fault-cause registers are stored verbatim. Interpreting them is the
//! decoder's job.

use crate::config::PAYLOAD_CAP;
use crate::fault_status::FaultStatus;
use crate::frame::{ExcReturn, ExecutionContext, StackedRegisters};
use crate::record::{payload_area, record_checksum, DumpHeader, HEADER_LEN};
use crate::scheduler::SchedulerHooks;
use crate::store::DumpStore;

/// Everything read from the core at fault time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultContext {
    /// Stack selection and pointer values.
    pub context: ExecutionContext,
    /// SCB fault registers.
    pub fault: FaultStatus,
    /// Hardware-stacked registers.
    pub registers: StackedRegisters,
}

impl FaultContext {
    /// Assemble the context from raw exception-entry state.
    ///
    /// `frame` is the basic exception frame found at the active stack pointer.
    #[must_use]
    pub fn from_exception(
        exc_return: ExcReturn,
        msp: u32,
        psp: u32,
        frame: &[u32; StackedRegisters::FRAME_WORDS],
        fault: FaultStatus,
    ) -> Self {
        Self {
            context: ExecutionContext::new(exc_return, msp, psp),
            fault,
            registers: StackedRegisters::from_frame(frame),
        }
    }
}

/// Memory the faulted stack lives in.
pub trait StackMemory {
    /// One past the highest valid address of the primary stack region.
    ///
    /// A faulted SP at or above this is treated as garbage.
    fn stack_top(&self) -> u32;

    /// Bytes `[addr, addr + len)`.
    ///
    /// Only called with ranges that end at or below [`Self::stack_top`].
    /// May return fewer than `len` bytes.
    fn bytes(&self, addr: u32, len: usize) -> &[u8];
}

/// [`StackMemory`] backed by a copied slice mapped at `base`.
///
/// The region's top is `base + bytes.len()`.
pub struct SliceStack<'a> {
    base: u32,
    bytes: &'a [u8],
}

impl<'a> SliceStack<'a> {
    /// Map `bytes` at `base`.
    #[must_use]
    pub fn new(base: u32, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }
}

impl StackMemory for SliceStack<'_> {
    fn stack_top(&self) -> u32 {
        let len = u32::try_from(self.bytes.len()).unwrap_or(u32::MAX);
        self.base.saturating_add(len)
    }

    fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        let Some(start) = addr
            .checked_sub(self.base)
            .and_then(|off| usize::try_from(off).ok())
        else {
            return &[];
        };
        let rest = self.bytes.get(start..).unwrap_or(&[]);
        rest.get(..len).unwrap_or(rest)
    }
}

/// Number of stack bytes a capture copies.
///
/// Zero if `active_sp` is not below `stack_top`. Otherwise the smallest of:
/// the store space left after the header, [`PAYLOAD_CAP`], and the distance
/// from `active_sp` to `stack_top`.
#[must_use]
pub fn payload_len(active_sp: u32, stack_top: u32, capacity: usize) -> usize {
    let Some(window) = stack_top.checked_sub(active_sp).filter(|&w| w > 0) else {
        return 0;
    };
    let window = usize::try_from(window).unwrap_or(usize::MAX);
    capacity
        .saturating_sub(HEADER_LEN)
        .min(PAYLOAD_CAP)
        .min(window)
}

/// Capture one fault into `store`, overwriting whatever it held.
///
/// Returns the header as committed, checksum included.
pub fn capture<S, M>(
    store: &mut S,
    fault: &FaultContext,
    scheduler: &SchedulerHooks,
    stack: &M,
) -> DumpHeader
where
    S: DumpStore + ?Sized,
    M: StackMemory + ?Sized,
{
    let mut header = DumpHeader {
        context: fault.context,
        fault: fault.fault,
        registers: fault.registers,
        task: scheduler.query(),
        stack_bytes: 0,
        checksum: 0,
    };

    store.erase();
    store.write(0, &header.encode());

    let active_sp = fault.context.active_sp;
    let len = payload_len(active_sp, stack.stack_top(), store.capacity());
    let copied = if len > 0 {
        store.write(HEADER_LEN, stack.bytes(active_sp, len))
    } else {
        0
    };
    header.stack_bytes = u32::try_from(copied).unwrap_or(0);

    header.checksum = record_checksum(&header.encode(), payload_area(store.read()));
    store.write(0, &header.encode());

    header
}
