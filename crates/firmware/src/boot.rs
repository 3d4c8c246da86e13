//! Boot sequence.
//!
//! Initialization order (MUST be respected):
//!   1. defmt-rtt transport (static, no clocks needed)
//!   2. HardFault dump: enable fault categories, report and erase any record
//!   3. HAL init (clocks, time driver, interrupts)
//!   4. Embassy executor: spawn tasks
//!
//! Step 2 runs before anything can enable an interrupt. From then on the only
//! code that touches the dump region is the HardFault handler.

use hardfault::ErasePolicy;

/// Ordered boot steps, checked by the boot-order tests.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. defmt-rtt: log transport ready",
    "2. HardFault dump: enable MemManage/BusFault/UsageFault, report previous record, erase",
    "3. HAL: embassy_stm32::init (clocks, TIM2 time driver, interrupts)",
    "4. Embassy executor: spawn tasks",
];

/// What the decoder does with a record after printing it.
///
/// Erasing keeps the next unrelated boot quiet. Switch to
/// `KeepAfterRender` on the bench to see the same dump on every reset.
pub const ERASE_POLICY: ErasePolicy = ErasePolicy::EraseAfterRender;

/// HAL configuration: the HSI16 default is enough for the demo.
#[cfg(feature = "hardware")]
pub fn build_embassy_config() -> embassy_stm32::Config {
    embassy_stm32::Config::default()
}

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Boot-time hardware steps.

    use cortex_m::peripheral::SCB;
    use hardfault::{Decoder, DumpStore};

    use super::ERASE_POLICY;
    use crate::dump_region;
    use crate::scb::hardware::ScbFaultEnable;
    use crate::sink::defmt_sink;

    /// Report a HardFault from the previous run, then re-arm.
    ///
    /// Returns `true` if a dump was printed.
    #[allow(unsafe_code)]
    pub fn init_hardfault_dumps(scb: &mut SCB) -> bool {
        // SAFETY: boot context, interrupts still disabled; the HardFault
        // handler is the only other user and ends in a reset.
        let store = unsafe { dump_region::hardware::store() };
        defmt::debug!(
            "dump region: {=u32:#010x}, {=usize} bytes",
            dump_region::hardware::base_address(),
            store.capacity()
        );

        let mut decoder = Decoder::with_policy(store, ERASE_POLICY);
        let mut sink = defmt_sink();
        let reported = decoder.init(&mut ScbFaultEnable::new(scb), &mut sink);
        sink.flush();

        if reported {
            defmt::warn!("previous run ended in a HardFault (report above)");
        } else {
            defmt::info!("no HardFault dump stored");
        }
        reported
    }

    /// [`init_hardfault_dumps`] without an owned SCB, for the first line of
    /// `main`.
    ///
    /// # Safety rationale
    ///
    /// `cortex_m::Peripherals::steal()` is fine here: it runs once, before
    /// the HAL takes the core peripherals, and the stolen handle is dropped
    /// on return.
    #[allow(unsafe_code)]
    pub fn init_hardfault_dumps_from_peripherals() -> bool {
        // SAFETY: see above; nothing else holds the core peripherals yet.
        let mut cp = unsafe { cortex_m::Peripherals::steal() };
        init_hardfault_dumps(&mut cp.SCB)
    }
}
