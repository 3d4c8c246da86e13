//! Persistent record store.
//!
//! A fixed-capacity byte region that survives reset. Every operation is
//! clamped to the capacity: out-of-range writes are truncated, out-of-range
//! reads come back as the erase pattern, and nothing ever faults.
//!
//! The backing memory must be excluded from startup zero-initialisation. On
//! hardware that is the firmware's `.uninit` region; on the host it is any
//! `&mut [u8]`.

use crate::config::ERASE_BYTE;

/// Reset-surviving storage for exactly one dump record.
pub trait DumpStore {
    /// Whole store contents.
    fn read(&self) -> &[u8];

    /// Copy `data` to `offset`, truncated at capacity.
    ///
    /// Returns the number of bytes actually written.
    fn write(&mut self, offset: usize, data: &[u8]) -> usize;

    /// Fill the whole store with [`ERASE_BYTE`].
    fn erase(&mut self);

    /// Store size in bytes, fixed for the life of the store.
    fn capacity(&self) -> usize {
        self.read().len()
    }

    /// Copy from `offset` into `buf`.
    ///
    /// Bytes past the end of the store read back as [`ERASE_BYTE`].
    fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let available = self.read().get(offset..).unwrap_or(&[]);
        let n = available.len().min(buf.len());
        let (head, tail) = buf.split_at_mut(n);
        head.copy_from_slice(available.get(..n).unwrap_or(&[]));
        tail.fill(ERASE_BYTE);
    }
}

impl<S: DumpStore + ?Sized> DumpStore for &mut S {
    fn read(&self) -> &[u8] {
        (**self).read()
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> usize {
        (**self).write(offset, data)
    }

    fn erase(&mut self) {
        (**self).erase();
    }
}

/// [`DumpStore`] over a borrowed byte slice.
pub struct SliceStore<'a> {
    mem: &'a mut [u8],
}

impl<'a> SliceStore<'a> {
    /// Wrap `mem` as-is. Existing contents are kept: that is the point.
    pub fn new(mem: &'a mut [u8]) -> Self {
        Self { mem }
    }

    /// Give back the underlying slice.
    pub fn into_inner(self) -> &'a mut [u8] {
        self.mem
    }
}

impl DumpStore for SliceStore<'_> {
    fn read(&self) -> &[u8] {
        &*self.mem
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> usize {
        let Some(dst) = self.mem.get_mut(offset..) else {
            return 0;
        };
        let n = dst.len().min(data.len());
        if let (Some(dst), Some(src)) = (dst.get_mut(..n), data.get(..n)) {
            dst.copy_from_slice(src);
        }
        n
    }

    fn erase(&mut self) {
        self.mem.fill(ERASE_BYTE);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn write_inside_bounds() {
        let mut mem = [0u8; 16];
        let mut store = SliceStore::new(&mut mem);
        assert_eq!(store.write(4, &[1, 2, 3]), 3);
        assert_eq!(&store.read()[4..7], &[1, 2, 3]);
    }

    #[test]
    fn write_is_truncated_at_capacity() {
        let mut mem = [0u8; 8];
        let mut store = SliceStore::new(&mut mem);
        assert_eq!(store.write(6, &[9, 9, 9, 9]), 2);
        assert_eq!(store.read(), &[0, 0, 0, 0, 0, 0, 9, 9]);
    }

    #[test]
    fn write_past_end_is_ignored() {
        let mut mem = [0u8; 8];
        let mut store = SliceStore::new(&mut mem);
        assert_eq!(store.write(8, &[1]), 0);
        assert_eq!(store.write(usize::MAX, &[1]), 0);
        assert_eq!(store.read(), &[0; 8]);
    }

    #[test]
    fn read_past_end_returns_erase_pattern() {
        let mut mem = [7u8; 4];
        let store = SliceStore::new(&mut mem);
        let mut buf = [0u8; 6];
        store.read_at(2, &mut buf);
        assert_eq!(buf, [7, 7, ERASE_BYTE, ERASE_BYTE, ERASE_BYTE, ERASE_BYTE]);

        store.read_at(100, &mut buf);
        assert_eq!(buf, [ERASE_BYTE; 6]);
    }

    #[test]
    fn erase_fills_with_pattern() {
        let mut mem = [0u8; 32];
        let mut store = SliceStore::new(&mut mem);
        store.erase();
        assert!(store.read().iter().all(|&b| b == ERASE_BYTE));
        assert_eq!(store.capacity(), 32);
    }

    #[test]
    fn existing_contents_survive_wrapping() {
        let mut mem = [0x5Au8; 4];
        let store = SliceStore::new(&mut mem);
        assert_eq!(store.read(), &[0x5A; 4]);
    }
}
