//! System Control Block fault-status registers.
//!
//! Captured verbatim at fault time and only taken apart when the report is
//! rendered. Bit definitions follow the ARMv7-M Architecture Reference Manual
//! (DDI0403E) §B3.2.15–B3.2.18.

use bitflags::bitflags;

/// SHCSR.MEMFAULTENA
pub const SHCSR_MEMFAULTENA: u32 = 1 << 16;
/// SHCSR.BUSFAULTENA
pub const SHCSR_BUSFAULTENA: u32 = 1 << 17;
/// SHCSR.USGFAULTENA
pub const SHCSR_USGFAULTENA: u32 = 1 << 18;

/// The three configurable fault enables that split HardFault into
/// MemManage, BusFault and UsageFault.
pub const SHCSR_FAULT_ENABLES: u32 = SHCSR_MEMFAULTENA | SHCSR_BUSFAULTENA | SHCSR_USGFAULTENA;

/// Raw copies of the SCB fault registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultStatus {
    /// Configurable Fault Status Register (MMFSR | BFSR << 8 | UFSR << 16).
    pub cfsr: u32,
    /// HardFault Status Register.
    pub hfsr: u32,
    /// Debug Fault Status Register.
    pub dfsr: u32,
    /// MemManage Fault Address Register (valid if MMARVALID).
    pub mmfar: u32,
    /// BusFault Address Register (valid if BFARVALID).
    pub bfar: u32,
    /// Auxiliary Fault Status Register (implementation defined).
    pub afsr: u32,
    /// System Handler Control and State Register.
    pub shcsr: u32,
}

impl FaultStatus {
    /// MemManage Fault Status, CFSR[7:0].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // masked to 8 bits
    pub const fn mmfsr(&self) -> u8 {
        (self.cfsr & 0xFF) as u8
    }

    /// BusFault Status, CFSR[15:8].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // masked to 8 bits
    pub const fn bfsr(&self) -> u8 {
        ((self.cfsr >> 8) & 0xFF) as u8
    }

    /// UsageFault Status, CFSR[31:16].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // shifted down to 16 bits
    pub const fn ufsr(&self) -> u16 {
        (self.cfsr >> 16) as u16
    }

    /// Known CFSR bits that are set.
    #[must_use]
    pub const fn cfsr_flags(&self) -> Cfsr {
        Cfsr::from_bits_truncate(self.cfsr)
    }

    /// Known HFSR bits that are set.
    #[must_use]
    pub const fn hfsr_flags(&self) -> Hfsr {
        Hfsr::from_bits_truncate(self.hfsr)
    }
}

bitflags! {
    /// Configurable Fault Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cfsr: u32 {
        // MMFSR
        /// Instruction access violation.
        const IACCVIOL = 1 << 0;
        /// Data access violation; MMFAR holds the address.
        const DACCVIOL = 1 << 1;
        /// MemManage fault on exception return unstacking.
        const MUNSTKERR = 1 << 3;
        /// MemManage fault on exception entry stacking.
        const MSTKERR = 1 << 4;
        /// MemManage fault during lazy FP state preservation.
        const MLSPERR = 1 << 5;
        /// MMFAR holds a valid address.
        const MMARVALID = 1 << 7;

        // BFSR
        /// Instruction bus error.
        const IBUSERR = 1 << 8;
        /// Precise data bus error; BFAR holds the address.
        const PRECISERR = 1 << 9;
        /// Imprecise data bus error.
        const IMPRECISERR = 1 << 10;
        /// BusFault on exception return unstacking.
        const UNSTKERR = 1 << 11;
        /// BusFault on exception entry stacking.
        const STKERR = 1 << 12;
        /// BusFault during lazy FP state preservation.
        const LSPERR = 1 << 13;
        /// BFAR holds a valid address.
        const BFARVALID = 1 << 15;

        // UFSR
        /// Undefined instruction.
        const UNDEFINSTR = 1 << 16;
        /// Invalid EPSR state (e.g. Thumb bit clear).
        const INVSTATE = 1 << 17;
        /// Invalid EXC_RETURN load into PC.
        const INVPC = 1 << 18;
        /// Coprocessor access with coprocessor disabled.
        const NOCP = 1 << 19;
        /// Unaligned access with CCR.UNALIGN_TRP set.
        const UNALIGNED = 1 << 24;
        /// Divide by zero with CCR.DIV_0_TRP set.
        const DIVBYZERO = 1 << 25;
    }
}

bitflags! {
    /// HardFault Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hfsr: u32 {
        /// BusFault on vector table read.
        const VECTTBL = 1 << 1;
        /// Escalated configurable fault.
        const FORCED = 1 << 30;
        /// Debug event while halting debug was disabled.
        const DEBUGEVT = 1 << 31;
    }
}

/// Source of the fault-status block at capture time.
///
/// Implemented over the real SCB on hardware and by fixed values in tests.
pub trait FaultStatusSource {
    /// Read every fault-status register verbatim.
    fn read_fault_status(&self) -> FaultStatus;
}

impl FaultStatusSource for FaultStatus {
    fn read_fault_status(&self) -> FaultStatus {
        *self
    }
}

/// Turns on the fine-grained fault handlers at boot.
///
/// Must be idempotent: setting an already-set enable is a no-op.
pub trait FaultEnable {
    /// Set MEMFAULTENA, BUSFAULTENA and USGFAULTENA in SHCSR.
    fn enable_fault_categories(&mut self);
}

/// SHCSR value with the three fault enables set, other bits preserved.
#[must_use]
pub const fn with_fault_enables(shcsr: u32) -> u32 {
    shcsr | SHCSR_FAULT_ENABLES
}
