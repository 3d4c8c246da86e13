//! HardFault dump demo - Main Entry Point
//!
//! Hardware-only entry point for STM32G474RE. Reports any dump left by the
//! previous run, then deliberately takes a precise BusFault a few seconds in
//! so the next boot has something to print. The BusFault vector shares the
//! HardFault entry thunk.
//!
//! Feed the RTT log to `cargo xtask addr2line --elf <ELF> --log <LOG>` to
//! turn the `HF_ADDR` line into function names and source lines.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};

use defmt_rtt as _;
use panic_probe as _;

/// Unmapped on STM32G474 (FMC bank 1 with no external memory).
const UNMAPPED_ADDR: u32 = 0x6000_0000;

/// Seconds until the demo fault.
const FAULT_DELAY_S: u64 = 3;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Step 2 of BOOT_SEQUENCE_STEPS: before the HAL enables any interrupt.
    let had_dump = firmware::boot::hardware::init_hardfault_dumps_from_peripherals();

    defmt::info!("HardFault dump demo v{=str}", env!("CARGO_PKG_VERSION"));
    let _p = embassy_stm32::init(firmware::boot::build_embassy_config());

    if had_dump {
        defmt::info!("dump consumed; faulting again in {=u64}s", FAULT_DELAY_S);
    }

    if spawner.spawn(fault_later()).is_err() {
        defmt::error!("failed to spawn fault task");
    }

    loop {
        Timer::after(Duration::from_secs(1)).await;
        defmt::debug!("alive");
    }
}

#[embassy_executor::task]
async fn fault_later() {
    Timer::after(Duration::from_secs(FAULT_DELAY_S)).await;
    defmt::warn!("reading {=u32:#010x} to trigger a BusFault", UNMAPPED_ADDR);
    read_unmapped();
}

#[inline(never)]
#[allow(unsafe_code)]
fn read_unmapped() {
    // SAFETY: not safe at all; the read faults on purpose and never returns.
    let value = unsafe { core::ptr::read_volatile(UNMAPPED_ADDR as *const u32) };
    defmt::error!("unmapped read returned {=u32:#x}", value);
}
