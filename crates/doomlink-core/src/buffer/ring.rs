//! Fixed-capacity circular byte buffer with all-or-nothing reads.
//!
//! ```text
//!  data: [ . . . x x x x x . . . ]
//!                ^start    ^end
//! ```
//!
//! `start == end` means empty, so one slot is always left unused and the
//! usable capacity is `N - 1`.  `N` must be a power of two so that index
//! wrapping compiles down to a bit-mask.
//!
//! Every read either consumes exactly the bytes requested or leaves the buffer
//! untouched.  The message decoder relies on this to suspend mid-message and
//! pick up again once more bytes arrive.

use thiserror::Error;

/// Default backing-array size for the receive and key-event buffers.
pub const RING_SIZE: usize = 512;

/// Errors returned by writes into a [`RingBuffer`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// The buffer has no room for the bytes being written.
    #[error("ring buffer full: need {needed} free byte(s), have {free}")]
    Full { needed: usize, free: usize },
}

/// Circular byte queue of backing size `N`.
#[derive(Clone)]
pub struct RingBuffer<const N: usize = RING_SIZE> {
    data: [u8; N],
    start: usize,
    end: usize,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring size must be a power of two");
        N - 1
    };

    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            data: [0; N],
            start: 0,
            end: 0,
        }
    }

    /// Maximum number of bytes the buffer can hold (`N - 1`).
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_full(&self) -> bool {
        (self.end + 1) & Self::MASK == self.start
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        if self.end >= self.start {
            self.end - self.start
        } else {
            N - self.start + self.end
        }
    }

    /// Number of bytes that can still be written.
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Reads one byte, or returns `None` if the buffer is empty.
    pub fn read_u8(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let v = self.data[self.start];
        self.start = (self.start + 1) & Self::MASK;
        Some(v)
    }

    /// Reads a little-endian `u16`, or returns `None` if fewer than two bytes
    /// are buffered.
    pub fn read_u16(&mut self) -> Option<u16> {
        let mut raw = [0u8; 2];
        self.read_bytes(&mut raw).then(|| u16::from_le_bytes(raw))
    }

    /// Fills `out` completely from the buffer.
    ///
    /// Returns `false` and consumes nothing if fewer than `out.len()` bytes are
    /// buffered.  An empty `out` always succeeds.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> bool {
        let len = out.len();
        if len == 0 {
            return true;
        }
        if self.len() < len {
            return false;
        }

        let contiguous = if self.start <= self.end {
            self.end - self.start
        } else {
            N - self.start
        };
        let first = contiguous.min(len);

        out[..first].copy_from_slice(&self.data[self.start..self.start + first]);
        self.start = (self.start + first) & Self::MASK;

        let rest = len - first;
        if rest > 0 {
            // Wrapped: the remainder starts at index 0.
            out[first..].copy_from_slice(&self.data[self.start..self.start + rest]);
            self.start += rest;
        }
        true
    }

    /// Appends one byte.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Full`] without modifying the buffer when full.
    pub fn write_u8(&mut self, v: u8) -> Result<(), RingError> {
        if self.is_full() {
            return Err(RingError::Full { needed: 1, free: 0 });
        }
        self.data[self.end] = v;
        self.end = (self.end + 1) & Self::MASK;
        Ok(())
    }

    /// Appends all of `bytes`, or nothing if they do not fit.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Full`] when `bytes.len()` exceeds [`free`](Self::free).
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), RingError> {
        let free = self.free();
        if bytes.len() > free {
            return Err(RingError::Full {
                needed: bytes.len(),
                free,
            });
        }
        for &b in bytes {
            self.data[self.end] = b;
            self.end = (self.end + 1) & Self::MASK;
        }
        Ok(())
    }

    /// Returns the contiguous free region starting at the write cursor.
    ///
    /// The slot just before `start` is never included, so filling the whole
    /// region and calling [`commit`](Self::commit) can at most make the buffer
    /// full, never wrap it back to "empty".  When the free space wraps, only
    /// the part up to the end of the backing array is returned; callers loop.
    pub fn free_region_mut(&mut self) -> &mut [u8] {
        let limit = if self.start > self.end {
            self.start - 1
        } else if self.start == 0 {
            N - 1
        } else {
            N
        };
        &mut self.data[self.end..limit]
    }

    /// Marks `n` bytes of the region returned by
    /// [`free_region_mut`](Self::free_region_mut) as written.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.free(), "commit past free space");
        self.end = (self.end + n) & Self::MASK;
    }

    /// Moves both cursors back to the front once the buffer drains, so later
    /// reads are less likely to straddle the wrap point.
    pub fn reset_if_empty(&mut self) {
        if self.is_empty() {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("size", &N)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("len", &self.len())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
