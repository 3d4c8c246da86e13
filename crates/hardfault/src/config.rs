//! Build-time configuration for the dump store and the capture engine.
//!
//! Everything here is fixed at compile time. The store never grows, the
//! payload cap never depends on how much room the store happens to have,
//! and scheduler awareness is a cargo feature of the firmware crate, not a
//! runtime switch.

/// Size of the persistent dump region in bytes.
pub const STORE_CAPACITY: usize = 8 * 1024;

/// Upper bound on the number of stack bytes copied per capture.
///
/// Without precise task stack bounds the copy is limited to a sane slice,
/// independent of [`STORE_CAPACITY`].
pub const PAYLOAD_CAP: usize = 2048;

/// Longest task name stored in the record, excluding the NUL terminator.
///
/// Matches FreeRTOS `configMAX_TASK_NAME_LEN` for the default config.
pub const MAX_TASK_NAME_LEN: usize = 16;

/// Byte written over the whole store on erase.
///
/// `0xFF` rather than `0x00` so a never-captured (or accidentally zeroed)
/// region cannot be mistaken for a record.
pub const ERASE_BYTE: u8 = 0xFF;

/// What the boot-time decoder does with a record after printing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErasePolicy {
    /// Erase the store once the report is rendered (default).
    ///
    /// A later unrelated boot will not re-emit a stale report.
    #[default]
    EraseAfterRender,
    /// Leave the record in place; every boot prints it again.
    KeepAfterRender,
}

impl ErasePolicy {
    /// `true` if the decoder erases after rendering.
    #[must_use]
    pub const fn erases(self) -> bool {
        matches!(self, Self::EraseAfterRender)
    }
}
