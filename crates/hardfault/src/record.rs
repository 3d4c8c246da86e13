//! Binary layout of the dump record.
//!
//! All multi-byte integers are little-endian. The header is packed; there is
//! no padding between fields.
//!
//! ```text
//! [0..4]     magic                      u32  0x48464450 ("HFDP")
//! [4..6]     version                    u16  4
//! [6..8]     header_len                 u16  133
//! [8..12]    exc_return                 u32
//! [12..16]   msp                        u32
//! [16..20]   psp                        u32
//! [20..24]   active_sp                  u32  address of the stacked frame
//! [24..28]   used_psp                   u32  0 = MSP, 1 = PSP
//! [28..32]   has_fp                     u32  0/1
//! [32..60]   cfsr hfsr dfsr mmfar bfar afsr shcsr   u32 each
//! [60..92]   r0 r1 r2 r3 r12 lr pc xpsr            u32 each
//! [92..96]   rtos_present               u32  0/1
//! [96..100]  rtos_task_priority         u32
//! [100..104] rtos_stack_high_water      u32  bytes
//! [104..108] rtos_stack_base            u32
//! [108..125] rtos_task_name             [u8; 17]  NUL-terminated
//! [125..129] stack_bytes                u32  payload length
//! [129..133] checksum                   u32
//! [133..]    payload                    stack_bytes bytes
//! ```
//!
//! The checksum is a CRC-32 over the header (checksum field zero) followed by
//! the whole payload area, `min(store - header, PAYLOAD_CAP)` bytes, not just
//! the `stack_bytes` declared. Capture erases the store first, so the unused
//! tail is always the erase pattern. The sealed message therefore has a fixed
//! length and a corrupted `stack_bytes` is an ordinary single-byte error.

use crc32fast::Hasher;
use thiserror_no_std::Error;

use crate::config::PAYLOAD_CAP;
use crate::fault_status::FaultStatus;
use crate::frame::{ExecutionContext, StackedRegisters};
use crate::scheduler::{TaskInfo, TASK_NAME_FIELD};

/// Byte offsets of each header field.
#[allow(missing_docs)]
pub mod offset {
    pub const MAGIC: usize = 0;
    pub const VERSION: usize = 4;
    pub const HEADER_LEN: usize = 6;
    pub const EXC_RETURN: usize = 8;
    pub const MSP: usize = 12;
    pub const PSP: usize = 16;
    pub const ACTIVE_SP: usize = 20;
    pub const USED_PSP: usize = 24;
    pub const HAS_FP: usize = 28;
    pub const CFSR: usize = 32;
    pub const HFSR: usize = 36;
    pub const DFSR: usize = 40;
    pub const MMFAR: usize = 44;
    pub const BFAR: usize = 48;
    pub const AFSR: usize = 52;
    pub const SHCSR: usize = 56;
    pub const R0: usize = 60;
    pub const R1: usize = 64;
    pub const R2: usize = 68;
    pub const R3: usize = 72;
    pub const R12: usize = 76;
    pub const LR: usize = 80;
    pub const PC: usize = 84;
    pub const XPSR: usize = 88;
    pub const RTOS_PRESENT: usize = 92;
    pub const RTOS_PRIORITY: usize = 96;
    pub const RTOS_HIGH_WATER: usize = 100;
    pub const RTOS_STACK_BASE: usize = 104;
    pub const RTOS_NAME: usize = 108;
    pub const STACK_BYTES: usize = 125;
    pub const CHECKSUM: usize = 129;
}

/// Size of the encoded header in bytes.
pub const HEADER_LEN: usize = 133;

#[allow(clippy::arithmetic_side_effects)]
const _: () = {
    assert!(offset::RTOS_NAME + TASK_NAME_FIELD == offset::STACK_BYTES);
    assert!(offset::CHECKSUM + 4 == HEADER_LEN);
    assert!(HEADER_LEN <= u16::MAX as usize);
};

/// Reasons a stored record is rejected.
///
/// None of these are surfaced to the decoder's caller: a record that fails any
/// check is simply "no dump".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// Store shorter than a header.
    #[error("store too small for a dump header")]
    Truncated,
    /// First four bytes are not `HFDP`.
    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),
    /// Written by an incompatible layout revision.
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u16),
    /// Declared header length differs from this layout.
    #[error("header length {0} does not match layout")]
    HeaderLength(u16),
    /// Declared payload does not fit in the store.
    #[error("payload of {0} bytes exceeds store capacity")]
    PayloadTooLarge(u32),
    /// Header or payload were altered after sealing.
    #[error("checksum mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch {
        /// Value found in the header.
        stored: u32,
        /// Value recomputed over the store contents.
        computed: u32,
    },
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DumpHeader {
    /// Stack pointers and frame location.
    pub context: ExecutionContext,
    /// SCB fault registers, verbatim.
    pub fault: FaultStatus,
    /// Hardware-stacked registers.
    pub registers: StackedRegisters,
    /// Running task, if a started scheduler was linked.
    pub task: Option<TaskInfo>,
    /// Payload length in bytes.
    pub stack_bytes: u32,
    /// Integrity tag over header and payload.
    pub checksum: u32,
}

impl DumpHeader {
    /// `'HFDP'`
    pub const MAGIC: u32 = 0x4846_4450;
    /// Layout revision.
    pub const VERSION: u16 = 4;
    /// Encoded size.
    pub const SIZE: usize = HEADER_LEN;

    /// Encode the header, including the current `checksum` field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // HEADER_LEN <= u16::MAX, asserted above
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        put_u32(&mut buf, offset::MAGIC, Self::MAGIC);
        put_u16(&mut buf, offset::VERSION, Self::VERSION);
        put_u16(&mut buf, offset::HEADER_LEN, HEADER_LEN as u16);

        let ctx = &self.context;
        put_u32(&mut buf, offset::EXC_RETURN, ctx.exc_return);
        put_u32(&mut buf, offset::MSP, ctx.msp);
        put_u32(&mut buf, offset::PSP, ctx.psp);
        put_u32(&mut buf, offset::ACTIVE_SP, ctx.active_sp);
        put_u32(&mut buf, offset::USED_PSP, u32::from(ctx.used_psp));
        put_u32(&mut buf, offset::HAS_FP, u32::from(ctx.has_fp));

        let f = &self.fault;
        put_u32(&mut buf, offset::CFSR, f.cfsr);
        put_u32(&mut buf, offset::HFSR, f.hfsr);
        put_u32(&mut buf, offset::DFSR, f.dfsr);
        put_u32(&mut buf, offset::MMFAR, f.mmfar);
        put_u32(&mut buf, offset::BFAR, f.bfar);
        put_u32(&mut buf, offset::AFSR, f.afsr);
        put_u32(&mut buf, offset::SHCSR, f.shcsr);

        let r = &self.registers;
        put_u32(&mut buf, offset::R0, r.r0);
        put_u32(&mut buf, offset::R1, r.r1);
        put_u32(&mut buf, offset::R2, r.r2);
        put_u32(&mut buf, offset::R3, r.r3);
        put_u32(&mut buf, offset::R12, r.r12);
        put_u32(&mut buf, offset::LR, r.lr);
        put_u32(&mut buf, offset::PC, r.pc);
        put_u32(&mut buf, offset::XPSR, r.xpsr);

        if let Some(task) = &self.task {
            put_u32(&mut buf, offset::RTOS_PRESENT, 1);
            put_u32(&mut buf, offset::RTOS_PRIORITY, task.priority);
            put_u32(&mut buf, offset::RTOS_HIGH_WATER, task.stack_high_water_bytes);
            put_u32(&mut buf, offset::RTOS_STACK_BASE, task.stack_base);
            put_bytes(&mut buf, offset::RTOS_NAME, task.name_field());
        }

        put_u32(&mut buf, offset::STACK_BYTES, self.stack_bytes);
        put_u32(&mut buf, offset::CHECKSUM, self.checksum);
        buf
    }

    /// Decode a header, checking only the self-identification fields.
    ///
    /// Payload bounds and the checksum need the rest of the store; see
    /// [`crate::decode::validate`].
    ///
    /// # Errors
    ///
    /// [`RecordError::BadMagic`], [`RecordError::UnsupportedVersion`] or
    /// [`RecordError::HeaderLength`] when the corresponding field disagrees
    /// with this layout. Nothing else in the header is trusted in that case.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, RecordError> {
        let magic = get_u32(buf, offset::MAGIC);
        if magic != Self::MAGIC {
            return Err(RecordError::BadMagic(magic));
        }
        let version = get_u16(buf, offset::VERSION);
        if version != Self::VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }
        let header_len = get_u16(buf, offset::HEADER_LEN);
        if usize::from(header_len) != HEADER_LEN {
            return Err(RecordError::HeaderLength(header_len));
        }

        let task = (get_u32(buf, offset::RTOS_PRESENT) != 0).then(|| {
            let mut name = [0u8; TASK_NAME_FIELD];
            get_bytes(buf, offset::RTOS_NAME, &mut name);
            TaskInfo::from_raw(
                name,
                get_u32(buf, offset::RTOS_PRIORITY),
                get_u32(buf, offset::RTOS_HIGH_WATER),
                get_u32(buf, offset::RTOS_STACK_BASE),
            )
        });

        Ok(Self {
            context: ExecutionContext {
                exc_return: get_u32(buf, offset::EXC_RETURN),
                msp: get_u32(buf, offset::MSP),
                psp: get_u32(buf, offset::PSP),
                active_sp: get_u32(buf, offset::ACTIVE_SP),
                used_psp: get_u32(buf, offset::USED_PSP) != 0,
                has_fp: get_u32(buf, offset::HAS_FP) != 0,
            },
            fault: FaultStatus {
                cfsr: get_u32(buf, offset::CFSR),
                hfsr: get_u32(buf, offset::HFSR),
                dfsr: get_u32(buf, offset::DFSR),
                mmfar: get_u32(buf, offset::MMFAR),
                bfar: get_u32(buf, offset::BFAR),
                afsr: get_u32(buf, offset::AFSR),
                shcsr: get_u32(buf, offset::SHCSR),
            },
            registers: StackedRegisters {
                r0: get_u32(buf, offset::R0),
                r1: get_u32(buf, offset::R1),
                r2: get_u32(buf, offset::R2),
                r3: get_u32(buf, offset::R3),
                r12: get_u32(buf, offset::R12),
                lr: get_u32(buf, offset::LR),
                pc: get_u32(buf, offset::PC),
                xpsr: get_u32(buf, offset::XPSR),
            },
            task,
            stack_bytes: get_u32(buf, offset::STACK_BYTES),
            checksum: get_u32(buf, offset::CHECKSUM),
        })
    }
}

/// Largest payload a store of `store_len` bytes can hold.
#[must_use]
pub fn payload_area_len(store_len: usize) -> usize {
    store_len.saturating_sub(HEADER_LEN).min(PAYLOAD_CAP)
}

/// The bytes after the header that the checksum covers.
#[must_use]
pub fn payload_area(store: &[u8]) -> &[u8] {
    let end = HEADER_LEN.saturating_add(payload_area_len(store.len()));
    store.get(HEADER_LEN..end).unwrap_or(&[])
}

/// Checksum of an encoded header and the payload area behind it.
///
/// The header's own checksum field is treated as zero whatever it holds.
#[must_use]
pub fn record_checksum(header: &[u8; HEADER_LEN], area: &[u8]) -> u32 {
    let mut zeroed = *header;
    put_u32(&mut zeroed, offset::CHECKSUM, 0);
    let mut hasher = Hasher::new();
    hasher.update(&zeroed);
    hasher.update(area);
    hasher.finalize()
}

/// Stored checksum field of an encoded header.
#[must_use]
pub fn stored_checksum(header: &[u8; HEADER_LEN]) -> u32 {
    get_u32(header, offset::CHECKSUM)
}

// Field accessors. Offsets are the constants above, always in bounds; the
// `get`-based forms keep the indexing lint satisfied without an allow.

fn put_bytes(buf: &mut [u8; HEADER_LEN], at: usize, src: &[u8]) {
    if let Some(dst) = buf.get_mut(at..at.saturating_add(src.len())) {
        dst.copy_from_slice(src);
    }
}

fn put_u32(buf: &mut [u8; HEADER_LEN], at: usize, value: u32) {
    put_bytes(buf, at, &value.to_le_bytes());
}

fn put_u16(buf: &mut [u8; HEADER_LEN], at: usize, value: u16) {
    put_bytes(buf, at, &value.to_le_bytes());
}

fn get_bytes(buf: &[u8; HEADER_LEN], at: usize, dst: &mut [u8]) {
    if let Some(src) = buf.get(at..at.saturating_add(dst.len())) {
        dst.copy_from_slice(src);
    }
}

fn get_u32(buf: &[u8; HEADER_LEN], at: usize) -> u32 {
    let mut word = [0u8; 4];
    get_bytes(buf, at, &mut word);
    u32::from_le_bytes(word)
}

fn get_u16(buf: &[u8; HEADER_LEN], at: usize) -> u16 {
    let mut half = [0u8; 2];
    get_bytes(buf, at, &mut half);
    u16::from_le_bytes(half)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::frame::ExcReturn;

    fn sample_header() -> DumpHeader {
        DumpHeader {
            context: ExecutionContext::new(ExcReturn::new(0xFFFF_FFFD), 0x2001_FF80, 0x2000_4F20),
            fault: FaultStatus {
                cfsr: 0x0000_8200,
                hfsr: 0x4000_0000,
                dfsr: 0,
                mmfar: 0xE000_EDF4,
                bfar: 0xDEAD_BEEF,
                afsr: 0,
                shcsr: 0x0007_0000,
            },
            registers: StackedRegisters {
                r0: 0xDEAD_BEEF,
                r1: 1,
                r2: 2,
                r3: 3,
                r12: 12,
                lr: 0x0800_0F00,
                pc: 0x0800_1234,
                xpsr: 0x2100_0000,
            },
            task: Some(TaskInfo::new(b"sensor", 3, 412, 0x2000_4000)),
            stack_bytes: 64,
            checksum: 0x0000_00A5,
        }
    }

    #[test]
    fn header_size_is_133_bytes() {
        assert_eq!(DumpHeader::SIZE, 133);
        assert_eq!(sample_header().encode().len(), 133);
    }

    #[test]
    fn self_identification_prefix() {
        let bytes = sample_header().encode();
        assert_eq!(&bytes[0..4], b"PDFH"); // 0x48464450 little-endian
        assert_eq!(&bytes[4..6], &[4, 0]);
        assert_eq!(&bytes[6..8], &[133, 0]);
    }

    #[test]
    fn decode_restores_every_field() {
        let header = sample_header();
        let decoded = DumpHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn decode_without_task_leaves_task_absent() {
        let header = DumpHeader {
            task: None,
            ..sample_header()
        };
        let bytes = header.encode();
        assert_eq!(&bytes[offset::RTOS_PRESENT..offset::RTOS_PRESENT + 4], &[0; 4]);
        assert_eq!(DumpHeader::decode(&bytes).unwrap().task, None);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut bytes = sample_header().encode();
        bytes[0] ^= 0x01;
        assert!(matches!(DumpHeader::decode(&bytes), Err(RecordError::BadMagic(_))));
    }

    #[test]
    fn decode_rejects_erased_store() {
        let bytes = [0xFF; HEADER_LEN];
        assert_eq!(
            DumpHeader::decode(&bytes),
            Err(RecordError::BadMagic(0xFFFF_FFFF))
        );
    }

    #[test]
    fn decode_rejects_zeroed_store() {
        let bytes = [0x00; HEADER_LEN];
        assert_eq!(DumpHeader::decode(&bytes), Err(RecordError::BadMagic(0)));
    }

    #[test]
    fn decode_rejects_other_version() {
        let mut bytes = sample_header().encode();
        bytes[offset::VERSION] = 2;
        assert_eq!(
            DumpHeader::decode(&bytes),
            Err(RecordError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn decode_rejects_other_header_len() {
        let mut bytes = sample_header().encode();
        bytes[offset::HEADER_LEN] = 132;
        assert_eq!(
            DumpHeader::decode(&bytes),
            Err(RecordError::HeaderLength(132))
        );
    }

    #[test]
    fn checksum_ignores_stored_checksum_field() {
        let header = sample_header();
        let a = record_checksum(&header.encode(), &[1, 2, 3]);
        let b = record_checksum(
            &DumpHeader {
                checksum: 0xFFFF_FFFF,
                ..header
            }
            .encode(),
            &[1, 2, 3],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_covers_payload() {
        let bytes = sample_header().encode();
        assert_ne!(record_checksum(&bytes, &[0x10]), record_checksum(&bytes, &[0x11]));
    }

    #[test]
    fn checksum_covers_payload_length_field() {
        // Shortening the length by one while the dropped byte matches the
        // change in the length byte must still alter the checksum.
        let mut area = [0xFFu8; 64];
        area[63] = 0x7F;
        let long = sample_header().encode();
        let mut short = long;
        short[offset::STACK_BYTES] = 0x3F;
        assert_ne!(record_checksum(&long, &area), record_checksum(&short, &area));
    }

    #[test]
    fn checksum_is_crc32_of_zeroed_header_then_area() {
        let header = sample_header().encode();
        let mut zeroed = header;
        zeroed[offset::CHECKSUM..HEADER_LEN].fill(0);
        let mut message = zeroed.to_vec();
        message.extend_from_slice(&[9, 8, 7]);
        assert_eq!(record_checksum(&header, &[9, 8, 7]), crc32fast::hash(&message));
    }

    #[test]
    fn payload_area_is_bounded_by_store_and_cap() {
        assert_eq!(payload_area_len(HEADER_LEN - 1), 0);
        assert_eq!(payload_area_len(HEADER_LEN + 10), 10);
        assert_eq!(payload_area_len(usize::MAX), PAYLOAD_CAP);
        let store = vec![0u8; HEADER_LEN + PAYLOAD_CAP + 100];
        assert_eq!(payload_area(&store).len(), PAYLOAD_CAP);
        assert!(payload_area(&store[..HEADER_LEN]).is_empty());
    }
}
