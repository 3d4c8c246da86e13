//! Exception-entry state: the EXC_RETURN descriptor and the hardware-stacked
//! register frame.
//!
//! On exception entry an ARMv7-M core pushes eight words onto whichever stack
//! was active and loads LR with an EXC_RETURN value describing that push:
//!
//! ```text
//! frame[0] R0    frame[4] R12
//! frame[1] R1    frame[5] LR
//! frame[2] R2    frame[6] PC    (return address, i.e. the faulting instruction)
//! frame[3] R3    frame[7] xPSR
//! ```
//!
//! If the FP extension was active an additional 18 words (S0–S15, FPSCR,
//! reserved) follow; only the basic frame is decoded here.

/// EXC_RETURN value loaded into LR on exception entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct ExcReturn(u32);

impl ExcReturn {
    /// Bit 2: 1 = return to thread mode using PSP, 0 = MSP.
    pub const SPSEL: u32 = 1 << 2;
    /// Bit 4: 0 = extended (FP) frame was stacked, 1 = basic frame.
    pub const FTYPE: u32 = 1 << 4;

    /// Wrap a raw EXC_RETURN value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw register value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// `true` if the process stack (PSP) was active when the fault hit.
    #[must_use]
    pub const fn used_psp(self) -> bool {
        self.0 & Self::SPSEL != 0
    }

    /// `true` if the hardware stacked an extended floating-point context.
    #[must_use]
    pub const fn has_fp_context(self) -> bool {
        self.0 & Self::FTYPE == 0
    }
}

/// Which stack pointer was live at fault time, plus both raw pointer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExecutionContext {
    /// Raw EXC_RETURN.
    pub exc_return: u32,
    /// Main stack pointer at handler entry.
    pub msp: u32,
    /// Process stack pointer at handler entry.
    pub psp: u32,
    /// Address of the hardware-stacked frame (MSP or PSP, per `used_psp`).
    pub active_sp: u32,
    /// PSP was the active stack.
    pub used_psp: bool,
    /// An FP context sits on top of the basic frame.
    pub has_fp: bool,
}

impl ExecutionContext {
    /// Derive the context from EXC_RETURN and the two stack pointers.
    ///
    /// `active_sp` is taken from whichever of `msp`/`psp` EXC_RETURN selects.
    #[must_use]
    pub const fn new(exc_return: ExcReturn, msp: u32, psp: u32) -> Self {
        let used_psp = exc_return.used_psp();
        Self {
            exc_return: exc_return.raw(),
            msp,
            psp,
            active_sp: if used_psp { psp } else { msp },
            used_psp,
            has_fp: exc_return.has_fp_context(),
        }
    }

    /// Name of the active stack pointer as printed in the report.
    #[must_use]
    pub const fn stack_name(&self) -> &'static str {
        if self.used_psp {
            "PSP"
        } else {
            "MSP"
        }
    }
}

/// The eight registers the core pushes on exception entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackedRegisters {
    /// R0
    pub r0: u32,
    /// R1
    pub r1: u32,
    /// R2
    pub r2: u32,
    /// R3
    pub r3: u32,
    /// R12
    pub r12: u32,
    /// Link register of the faulted context.
    pub lr: u32,
    /// Program counter of the faulted context.
    pub pc: u32,
    /// Program status register.
    pub xpsr: u32,
}

impl StackedRegisters {
    /// Number of words in the basic exception frame.
    pub const FRAME_WORDS: usize = 8;

    /// Pick the registers out of a basic exception frame.
    #[must_use]
    pub const fn from_frame(frame: &[u32; Self::FRAME_WORDS]) -> Self {
        let [r0, r1, r2, r3, r12, lr, pc, xpsr] = *frame;
        Self {
            r0,
            r1,
            r2,
            r3,
            r12,
            lr,
            pc,
            xpsr,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn thread_mode_psp_basic_frame() {
        // 0xFFFF_FFFD: thread mode, PSP, no FP
        let exc = ExcReturn::new(0xFFFF_FFFD);
        assert!(exc.used_psp());
        assert!(!exc.has_fp_context());
    }

    #[test]
    fn handler_mode_msp_basic_frame() {
        // 0xFFFF_FFF1: handler mode, MSP, no FP
        let exc = ExcReturn::new(0xFFFF_FFF1);
        assert!(!exc.used_psp());
        assert!(!exc.has_fp_context());
    }

    #[test]
    fn thread_mode_psp_with_fp_frame() {
        // 0xFFFF_FFED: thread mode, PSP, extended frame
        let exc = ExcReturn::new(0xFFFF_FFED);
        assert!(exc.used_psp());
        assert!(exc.has_fp_context());
    }

    #[test]
    fn context_selects_active_stack() {
        let ctx = ExecutionContext::new(ExcReturn::new(0xFFFF_FFFD), 0x2000_7F00, 0x2000_1200);
        assert_eq!(ctx.active_sp, 0x2000_1200);
        assert_eq!(ctx.stack_name(), "PSP");

        let ctx = ExecutionContext::new(ExcReturn::new(0xFFFF_FFF9), 0x2000_7F00, 0x2000_1200);
        assert_eq!(ctx.active_sp, 0x2000_7F00);
        assert_eq!(ctx.stack_name(), "MSP");
    }

    #[test]
    fn frame_word_order() {
        let regs = StackedRegisters::from_frame(&[0, 1, 2, 3, 12, 0x0800_0F00, 0x0800_1234, 0x2100_0000]);
        assert_eq!(regs.r0, 0);
        assert_eq!(regs.r3, 3);
        assert_eq!(regs.r12, 12);
        assert_eq!(regs.lr, 0x0800_0F00);
        assert_eq!(regs.pc, 0x0800_1234);
        assert_eq!(regs.xpsr, 0x2100_0000);
    }
}
