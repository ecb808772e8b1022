//! Session transfer buffer

use crate::error::{LoadError, Result};

/// Bounded chunk buffer reused across every transfer of one session.
///
/// The same allocation carries bitstream chunks during streaming and is
/// zero-filled for the padding-clock phases; it is never reallocated within
/// a session and is freed when the session ends.
#[derive(Debug)]
pub struct TransferBuffer {
    buf: Vec<u8>,
}

impl TransferBuffer {
    /// Allocate a buffer of exactly `len` bytes.
    ///
    /// Allocation failure surfaces as [`LoadError::AllocationFailed`]
    /// instead of aborting the process.
    pub fn allocate(len: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| LoadError::AllocationFailed)?;
        buf.resize(len, 0);
        Ok(TransferBuffer { buf })
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Mutable window of the first `len` bytes, for filling with a chunk.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the buffer capacity; the sequencer clamps
    /// chunk sizes before asking.
    pub fn chunk_mut(&mut self, len: usize) -> &mut [u8] {
        assert!(len <= self.buf.len(), "chunk larger than transfer buffer");
        &mut self.buf[..len]
    }

    /// Zero-filled window of the first `len` bytes, for padding clocks
    pub fn zeroed(&mut self, len: usize) -> &[u8] {
        assert!(len <= self.buf.len(), "padding larger than transfer buffer");
        self.buf[..len].fill(0);
        &self.buf[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_reuse() {
        let mut buf = TransferBuffer::allocate(16).unwrap();
        assert_eq!(buf.capacity(), 16);

        buf.chunk_mut(8).copy_from_slice(&[0xAA; 8]);
        assert_eq!(&buf.chunk_mut(8)[..], &[0xAA; 8]);

        // Zero-fill view clears previous chunk contents.
        assert_eq!(buf.zeroed(8), &[0u8; 8]);
    }

    #[test]
    fn zeroed_only_clears_requested_window() {
        let mut buf = TransferBuffer::allocate(4).unwrap();
        buf.chunk_mut(4).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.zeroed(2), &[0, 0]);
        assert_eq!(buf.chunk_mut(4), &[0, 0, 3, 4]);
    }

    #[test]
    #[should_panic(expected = "chunk larger")]
    fn oversized_chunk_panics() {
        let mut buf = TransferBuffer::allocate(4).unwrap();
        let _ = buf.chunk_mut(5);
    }
}
