//! HardFault dump firmware binding for STM32G474
//!
//! Ties the host-tested `hardfault` core to a real Cortex-M4F:
//!
//! ```text
//! exception_handlers  HardFault thunk → capture → SCB::sys_reset
//!         ↓ writes
//! dump_region         8 KiB .uninit static, survives reset
//!         ↑ reads
//! boot                enable fault handlers → decode → defmt → erase
//! ```
//!
//! Supporting modules: [`scb`] (fault registers), [`freertos`] (optional
//! task lookup), [`sink`] (defmt line sink).
//!
//! # Features
//!
//! - `hardware` - Build for the STM32G474 target (embassy, cortex-m-rt, defmt)
//! - `freertos` - Record the running FreeRTOS task (image must link the kernel)
//! - `debug-breakpoint` - `bkpt #1` after capture, before the reset
//!
//! # Example
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
#![warn(clippy::dbg_macro)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod boot;
pub mod dump_region;
pub mod exception_handlers;
pub mod freertos;
pub mod scb;
pub mod sink;
