//! HardFault entry for the STM32G474 (Cortex-M4F).
//!
//! Capture is split in two so that nothing touches the stack before the
//! faulted state has been read:
//!
//! 1. `HardFault`, a naked assembly thunk placed straight in the vector
//!    table slot. It copies LR (EXC_RETURN), MSP and PSP into argument
//!    registers, picks the stack the hardware frame was pushed to from
//!    EXC_RETURN bit 2, and branches (not calls) to the capture function.
//! 2. `hardware::hardfault_capture`, ordinary Rust that reads the SCB, runs the
//!    host-tested engine in [`hardfault::capture`] against the persistent
//!    region, and resets the core. It never returns.
//!
//! The thunk overrides cortex-m-rt's `PROVIDE(HardFault = ...)` default.
//! cortex-m-rt's own trampoline, when present, only branches, so LR still
//! holds EXC_RETURN by the time the thunk runs.
//!
//! Once boot has set the SHCSR enables, MemManage, BusFault and UsageFault
//! no longer escalate, so their vectors are aliased to the same thunk. The
//! record then carries the specific CFSR cause without HFSR.FORCED.
//!
//! # Stack overflow
//!
//! If the fault was a stack overflow the active SP can point outside RAM.
//! The frame is then read as zeros instead of dereferencing it, and the
//! payload comes out empty. The header still records both stack pointers.

/// RAM base on STM32G474.
pub const RAM_BASE: u32 = 0x2000_0000;
/// RAM size on STM32G474 (SRAM1 + SRAM2 + CCM alias).
pub const RAM_LEN: u32 = 128 * 1024;
/// One past the last RAM byte; the initial MSP.
#[allow(clippy::arithmetic_side_effects)] // constant, 0x2002_0000
pub const RAM_END: u32 = RAM_BASE + RAM_LEN;

/// Size of the basic exception frame in bytes.
#[allow(clippy::arithmetic_side_effects)]
pub const FRAME_BYTES: u32 = 8 * 4;

/// Marker constant: the module compiled, so the thunk is in the image.
pub const HARDFAULT_DEFINED: bool = true;

/// `true` if a full basic frame at `sp` lies inside `[base, top)` and is
/// word-aligned.
pub fn frame_is_readable(sp: u32, base: u32, top: u32) -> bool {
    sp >= base
        && sp.trailing_zeros() >= 2
        && sp
            .checked_add(FRAME_BYTES)
            .is_some_and(|end| end <= top)
}

#[cfg(feature = "hardware")]
mod thunk {
    // Vector table entry. No prologue: r0-r3 and LR are still exactly what
    // the exception entry left behind.
    core::arch::global_asm!(
        ".section .text.HardFault,\"ax\",%progbits",
        ".global HardFault",
        ".type HardFault,%function",
        ".thumb_func",
        "HardFault:",
        "    mov   r1, lr",
        "    mrs   r2, msp",
        "    mrs   r3, psp",
        "    tst   r1, #4",
        "    ite   eq",
        "    moveq r0, r2",
        "    movne r0, r3",
        "    b     {capture}",
        ".size HardFault, . - HardFault",
        ".global MemoryManagement",
        ".thumb_set MemoryManagement, HardFault",
        ".global BusFault",
        ".thumb_set BusFault, HardFault",
        ".global UsageFault",
        ".thumb_set UsageFault, HardFault",
        capture = sym super::hardware::hardfault_capture,
    );
}

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Fault-time code. Everything here runs with the faulted context frozen.

    use cortex_m::peripheral::SCB;
    use hardfault::{capture, ExcReturn, FaultContext, FaultStatusSource, StackMemory};

    use super::{frame_is_readable, RAM_BASE};
    use crate::dump_region;
    use crate::freertos::HOOKS;
    use crate::scb::hardware::ScbFaultStatus;

    extern "C" {
        // Provided by cortex-m-rt's link.x: initial MSP, one past the top of
        // the primary stack.
        static _stack_start: u32;
    }

    /// Initial MSP as placed by the linker.
    #[allow(unsafe_code, unused_unsafe)]
    pub fn stack_top() -> u32 {
        // SAFETY: only the symbol's address is taken, never its value.
        unsafe { core::ptr::addr_of!(_stack_start) as u32 }
    }

    /// Live RAM seen as [`StackMemory`], topped at the primary stack.
    pub struct RamStack;

    impl StackMemory for RamStack {
        fn stack_top(&self) -> u32 {
            stack_top()
        }

        #[allow(unsafe_code)]
        fn bytes(&self, addr: u32, len: usize) -> &[u8] {
            if addr < RAM_BASE {
                return &[];
            }
            // SAFETY: the engine only asks for ranges ending at or below
            // `stack_top()`, and we checked the start is in RAM, so the whole
            // range is mapped SRAM. The core is frozen in the fault handler;
            // nothing writes the range while the slice lives.
            unsafe { core::slice::from_raw_parts(addr as usize as *const u8, len) }
        }
    }

    /// Fault-time entry, reached only from the `HardFault` thunk.
    ///
    /// # Safety
    ///
    /// Must only be branched to from the thunk: `frame` is the active stack
    /// pointer at exception entry and `exc_return` the untouched LR.
    #[allow(unsafe_code)]
    pub unsafe extern "C" fn hardfault_capture(
        frame: *const u32,
        exc_return: u32,
        msp: u32,
        psp: u32,
    ) -> ! {
        let sp = frame as u32;
        let mut words = [0u32; 8];
        if frame_is_readable(sp, RAM_BASE, stack_top()) {
            for (i, w) in words.iter_mut().enumerate() {
                // SAFETY: frame_is_readable checked all eight words are in
                // RAM and aligned.
                *w = unsafe { frame.add(i).read_volatile() };
            }
        }

        let fault = FaultContext::from_exception(
            ExcReturn::new(exc_return),
            msp,
            psp,
            &words,
            ScbFaultStatus.read_fault_status(),
        );

        // SAFETY: the only other user of the region is the boot decoder,
        // which ran to completion before interrupts were enabled.
        let mut store = unsafe { dump_region::hardware::store() };
        capture(&mut store, &fault, &HOOKS, &RamStack);

        #[cfg(feature = "debug-breakpoint")]
        // SAFETY: bkpt has no memory effects.
        unsafe {
            core::arch::asm!("bkpt #1");
        }

        cortex_m::asm::dsb();
        cortex_m::asm::isb();
        SCB::sys_reset()
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    const TOP: u32 = RAM_END;

    #[test]
    fn frame_inside_ram_is_readable() {
        assert!(frame_is_readable(RAM_BASE, RAM_BASE, TOP));
        assert!(frame_is_readable(TOP - FRAME_BYTES, RAM_BASE, TOP));
    }

    #[test]
    fn frame_crossing_stack_top_is_not_readable() {
        assert!(!frame_is_readable(TOP - FRAME_BYTES + 4, RAM_BASE, TOP));
        assert!(!frame_is_readable(TOP, RAM_BASE, TOP));
    }

    #[test]
    fn overflowed_sp_is_not_readable() {
        // Stack ran off the bottom of RAM.
        assert!(!frame_is_readable(RAM_BASE - 8, RAM_BASE, TOP));
        assert!(!frame_is_readable(u32::MAX - 3, RAM_BASE, TOP));
    }

    #[test]
    fn misaligned_sp_is_not_readable() {
        assert!(!frame_is_readable(RAM_BASE + 2, RAM_BASE, TOP));
    }
}
