//! System Control Block fault registers.
//!
//! Addresses are from the ARMv7-M Architecture Reference Manual (DDI 0403E,
//! B3.2.2). They are listed here so host tests and the ELF checks can refer
//! to them; the hardware accessors go through `cortex_m::peripheral::SCB`.
//!
//! | Register | Address       |
//! |----------|---------------|
//! | SHCSR    | `0xE000_ED24` |
//! | CFSR     | `0xE000_ED28` |
//! | HFSR     | `0xE000_ED2C` |
//! | DFSR     | `0xE000_ED30` |
//! | MMFAR    | `0xE000_ED34` |
//! | BFAR     | `0xE000_ED38` |
//! | AFSR     | `0xE000_ED3C` |

/// System Handler Control and State Register.
pub const SHCSR_ADDR: u32 = 0xE000_ED24;
/// Configurable Fault Status Register.
pub const CFSR_ADDR: u32 = 0xE000_ED28;
/// HardFault Status Register.
pub const HFSR_ADDR: u32 = 0xE000_ED2C;
/// Debug Fault Status Register.
pub const DFSR_ADDR: u32 = 0xE000_ED30;
/// MemManage Fault Address Register.
pub const MMFAR_ADDR: u32 = 0xE000_ED34;
/// BusFault Address Register.
pub const BFAR_ADDR: u32 = 0xE000_ED38;
/// Auxiliary Fault Status Register.
pub const AFSR_ADDR: u32 = 0xE000_ED3C;

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Live register access.

    use cortex_m::peripheral::SCB;
    use hardfault::fault_status::with_fault_enables;
    use hardfault::{FaultEnable, FaultStatus, FaultStatusSource};

    /// Reads the fault-status block straight from the SCB.
    ///
    /// Zero-sized: it goes through `SCB::PTR` rather than owning the
    /// peripheral, because the capture path runs in a fault handler where
    /// the singleton may already be taken.
    pub struct ScbFaultStatus;

    impl FaultStatusSource for ScbFaultStatus {
        #[allow(unsafe_code)]
        fn read_fault_status(&self) -> FaultStatus {
            // SAFETY: SCB::PTR is the architecturally fixed SCB address, and
            // reading these registers has no side effects.
            let scb = unsafe { &*SCB::PTR };
            FaultStatus {
                cfsr: scb.cfsr.read(),
                hfsr: scb.hfsr.read(),
                dfsr: scb.dfsr.read(),
                mmfar: scb.mmfar.read(),
                bfar: scb.bfar.read(),
                afsr: scb.afsr.read(),
                shcsr: scb.shcsr.read(),
            }
        }
    }

    /// Enables MemManage, BusFault and UsageFault through SHCSR.
    pub struct ScbFaultEnable<'a> {
        scb: &'a mut SCB,
    }

    impl<'a> ScbFaultEnable<'a> {
        /// Wrap the owned SCB.
        pub fn new(scb: &'a mut SCB) -> Self {
            Self { scb }
        }
    }

    impl FaultEnable for ScbFaultEnable<'_> {
        #[allow(unsafe_code)]
        fn enable_fault_categories(&mut self) {
            // SAFETY: read-modify-write of SHCSR only sets the three enable
            // bits; pending/active bits are written back unchanged.
            unsafe {
                self.scb.shcsr.modify(with_fault_enables);
            }
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
        }
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn fault_registers_are_contiguous_words() {
        let addrs = [
            SHCSR_ADDR, CFSR_ADDR, HFSR_ADDR, DFSR_ADDR, MMFAR_ADDR, BFAR_ADDR, AFSR_ADDR,
        ];
        for pair in addrs.windows(2) {
            assert_eq!(pair[0] + 4, pair[1], "SCB fault registers are consecutive words");
        }
    }

    #[test]
    fn shcsr_address_matches_cortex_m_layout() {
        // SCB base 0xE000_ED00, SHCSR at offset 0x24.
        assert_eq!(SHCSR_ADDR, 0xE000_ED00 + 0x24);
    }
}
