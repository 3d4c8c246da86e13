//! Reset-surviving RAM region that holds the dump record.
//!
//! The region is an 8 KiB static placed in cortex-m-rt's `.uninit` output
//! section. That section is `NOLOAD` and sits outside `.bss`/`.data`, so the
//! reset handler neither zeroes nor initialises it: whatever the HardFault
//! handler wrote is still there when `main` runs after the system reset.
//!
//! After a power cycle the contents are random. The record's magic and
//! checksum reject that garbage; nothing here needs to.
//!
//! # Access discipline
//!
//! There are exactly two writers, and they never run concurrently:
//!
//! 1. the HardFault capture function (highest configurable priority, and
//!    ends in a reset), and
//! 2. the boot decoder, which runs in `main` before interrupts are enabled
//!    and before any task starts.
//!
//! Both reach the region through [`hardware::store`] and go through
//! `addr_of_mut!`, never a `&mut` to the `static mut` itself.

use hardfault::STORE_CAPACITY;

/// Linker output section the region is placed in.
///
/// Must match the `link_section` attribute on the static in [`hardware`]
/// (attributes cannot take a const).
pub const SECTION: &str = ".uninit.HARDFAULT_DUMP";

/// Region alignment. Word-aligned so the header's u32 fields never straddle
/// a bus boundary.
pub const ALIGN: usize = 4;

/// Region size in bytes.
pub const REGION_LEN: usize = STORE_CAPACITY;

/// Word-aligned backing array.
#[repr(C, align(4))]
pub struct DumpArea(
    /// Raw record bytes.
    pub [u8; REGION_LEN],
);

const _: () = assert!(core::mem::align_of::<DumpArea>() == ALIGN);
const _: () = assert!(core::mem::size_of::<DumpArea>() == REGION_LEN);

#[cfg(feature = "hardware")]
pub mod hardware {
    //! The region itself. Only exists in hardware builds.

    use core::mem::MaybeUninit;
    use core::ptr::addr_of_mut;

    use hardfault::SliceStore;

    use super::{DumpArea, REGION_LEN};

    #[link_section = ".uninit.HARDFAULT_DUMP"]
    static mut DUMP_AREA: MaybeUninit<DumpArea> = MaybeUninit::uninit();

    /// Start address of the region, for logs and tests on target.
    #[allow(unsafe_code, unused_unsafe)]
    pub fn base_address() -> u32 {
        // SAFETY: only the address is taken; no reference is created.
        unsafe { addr_of_mut!(DUMP_AREA) as u32 }
    }

    /// Borrow the region as a [`SliceStore`].
    ///
    /// # Safety
    ///
    /// - No other `SliceStore` over the region may be alive.
    /// - Call only from the HardFault capture function, or from boot code
    ///   that runs before interrupts are enabled.
    #[allow(unsafe_code)]
    pub unsafe fn store() -> SliceStore<'static> {
        // SAFETY: the static is REGION_LEN bytes long and lives forever. RAM
        // always holds some bit pattern and every pattern is a valid u8, so
        // exposing the never-initialised bytes is sound on this target.
        // Exclusivity is the caller's contract.
        let bytes = unsafe {
            let ptr = addr_of_mut!(DUMP_AREA).cast::<u8>();
            core::slice::from_raw_parts_mut(ptr, REGION_LEN)
        };
        SliceStore::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardfault::{HEADER_LEN, PAYLOAD_CAP};

    #[test]
    fn region_holds_header_and_full_payload() {
        assert!(REGION_LEN >= HEADER_LEN + PAYLOAD_CAP);
    }

    #[test]
    fn section_is_excluded_from_zero_fill() {
        assert!(
            SECTION.starts_with(".uninit."),
            "the dump region must live in cortex-m-rt's NOLOAD .uninit section, \
             otherwise startup code zeroes it and every dump is lost"
        );
    }

    #[test]
    fn area_layout() {
        assert_eq!(core::mem::size_of::<DumpArea>(), STORE_CAPACITY);
        assert_eq!(core::mem::align_of::<DumpArea>(), ALIGN);
    }
}
