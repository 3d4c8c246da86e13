//! Persistent HardFault dump for Cortex-M
//!
//! Captures a HardFault into a reset-surviving memory region, then lets the
//! next boot validate, print and clear it.
//!
//! # Lifecycle
//!
//! ```text
//! HardFault
//!     ↓  entry thunk (firmware): picks MSP/PSP from EXC_RETURN
//! capture::capture        → store: header + stack bytes + checksum
//!     ↓  system reset
//! decode::Decoder::init   → report on the sink, HF_ADDR line, erase
//!     ↓  serial log
//! correlate (host)        → PC/LR resolved to function and file:line
//! ```
//!
//! # Modules
//!
//! - [`record`] - byte-exact on-store layout and checksum
//! - [`store`] - the reset-surviving region
//! - [`capture`] - fault-time engine
//! - [`decode`] - boot-time validation and report
//! - [`scheduler`] - optional running-task lookup
//! - [`fault_status`] - SCB fault register snapshot and flag names
//! - [`frame`] - EXC_RETURN and the hardware-stacked frame
//! - [`sink`] - line-buffered report sink
//!
//! Nothing in this crate touches hardware. The firmware crate supplies the
//! store backing, the register reads and the entry thunk.
//!
//! # Features
//!
//! - `defmt`: derive `defmt::Format` on the record types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // a panic in the fault path is a second fault
#![deny(clippy::unreachable)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)]
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod capture;
pub mod config;
pub mod decode;
pub mod fault_status;
pub mod frame;
pub mod record;
pub mod scheduler;
pub mod sink;
pub mod store;

pub use capture::{capture, FaultContext, SliceStack, StackMemory};
pub use config::{ErasePolicy, ERASE_BYTE, MAX_TASK_NAME_LEN, PAYLOAD_CAP, STORE_CAPACITY};
pub use decode::{render, validate, Decoder, Dump};
pub use fault_status::{Cfsr, FaultEnable, FaultStatus, FaultStatusSource, Hfsr};
pub use frame::{ExcReturn, ExecutionContext, StackedRegisters};
pub use record::{DumpHeader, RecordError, HEADER_LEN};
pub use scheduler::{SchedulerHooks, TaskInfo};
pub use sink::LineSink;
pub use store::{DumpStore, SliceStore};
