//! Property tests for the fault-time frame bounds check.
//!
//! `frame_is_readable` is the only thing standing between a corrupt SP and a
//! dereference inside the HardFault handler.

#![allow(clippy::arithmetic_side_effects)]

use firmware::exception_handlers::{frame_is_readable, FRAME_BYTES, RAM_BASE, RAM_END};
use proptest::prelude::*;

proptest! {
    /// Any accepted SP has all eight frame words inside RAM and aligned.
    #[test]
    fn accepted_frame_lies_in_ram(sp in any::<u32>()) {
        if frame_is_readable(sp, RAM_BASE, RAM_END) {
            prop_assert!(sp >= RAM_BASE);
            prop_assert_eq!(sp % 4, 0);
            prop_assert!(u64::from(sp) + u64::from(FRAME_BYTES) <= u64::from(RAM_END));
        }
    }

    /// Every aligned SP with a full frame below the top is accepted.
    #[test]
    fn aligned_sp_in_ram_is_accepted(word in 0u32..(RAM_END - RAM_BASE - FRAME_BYTES) / 4 + 1) {
        prop_assert!(frame_is_readable(RAM_BASE + word * 4, RAM_BASE, RAM_END));
    }

    /// Near the top of the address space the end bound must not wrap.
    #[test]
    fn sp_near_address_space_top_is_rejected(back in 0u32..FRAME_BYTES) {
        prop_assert!(!frame_is_readable(u32::MAX - back, RAM_BASE, u32::MAX));
    }
}
