//! Bit-level primitives over raw byte buffers
//!
//! Bits are numbered MSB-first: bit 0 is the most significant bit of byte 0,
//! bit 7 the least significant bit of byte 0, bit 8 the most significant bit
//! of byte 1, and so on. Every allocation decision in the engine goes through
//! these functions, so they never allocate and never touch I/O.
//!
//! ```text
//! buf = [0b0000_0000, 0b0000_0000]
//! set_bit(buf, 0, true)   -> [0b1000_0000, 0b0000_0000]
//! set_bit(buf, 2, true)   -> [0b1010_0000, 0b0000_0000]
//! set_bit(buf, 15, true)  -> [0b1010_0000, 0b0000_0001]
//! ```

use crate::core::error::{Result, StorageError};

#[inline]
fn check_range(buf: &[u8], index: usize) -> Result<()> {
    let len = buf.len() * 8;
    if index >= len {
        return Err(StorageError::OutOfRange {
            index: index as u64,
            len: len as u64,
        });
    }
    Ok(())
}

#[inline]
fn mask(index: usize) -> u8 {
    0x80 >> (index % 8)
}

/// Read bit `index`
pub fn get_bit(buf: &[u8], index: usize) -> Result<bool> {
    check_range(buf, index)?;
    Ok(buf[index / 8] & mask(index) != 0)
}

/// Write bit `index`, leaving every other bit untouched
pub fn set_bit(buf: &mut [u8], index: usize, value: bool) -> Result<()> {
    check_range(buf, index)?;
    if value {
        buf[index / 8] |= mask(index);
    } else {
        buf[index / 8] &= !mask(index);
    }
    Ok(())
}

/// Population count across the whole buffer
pub fn count_set_bits(buf: &[u8]) -> u64 {
    buf.iter().map(|b| b.count_ones() as u64).sum()
}

/// Lowest index `>= start` holding a 0 bit, or `None` if the scan runs off the end
pub fn first_zero_from(buf: &[u8], start: usize) -> Option<usize> {
    scan_from(buf, start, |byte| !byte)
}

/// Lowest index `>= start` holding a 1 bit, or `None` if the scan runs off the end
pub fn first_one_from(buf: &[u8], start: usize) -> Option<usize> {
    scan_from(buf, start, |byte| byte)
}

/// Byte-at-a-time forward scan. `project` turns the wanted bit value into a 1.
fn scan_from(buf: &[u8], start: usize, project: impl Fn(u8) -> u8) -> Option<usize> {
    if start >= buf.len() * 8 {
        return None;
    }

    let mut byte_idx = start / 8;
    // Drop candidates that sit before `start` inside the first byte
    let mut candidates = project(buf[byte_idx]) & (0xFF >> (start % 8));

    loop {
        if candidates != 0 {
            return Some(byte_idx * 8 + candidates.leading_zeros() as usize);
        }
        byte_idx += 1;
        if byte_idx == buf.len() {
            return None;
        }
        candidates = project(buf[byte_idx]);
    }
}

/// Owned, fixed-length bitmap (a bitmap page or the readable bitmap)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    bytes: Vec<u8>,
}

impl BitVector {
    /// All-zero bitmap of `len_bytes` bytes
    pub fn zeroed(len_bytes: usize) -> Self {
        BitVector {
            bytes: vec![0u8; len_bytes],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        BitVector { bytes }
    }

    pub fn get(&self, index: usize) -> Result<bool> {
        get_bit(&self.bytes, index)
    }

    pub fn set(&mut self, index: usize, value: bool) -> Result<()> {
        set_bit(&mut self.bytes, index, value)
    }

    pub fn count_set_bits(&self) -> u64 {
        count_set_bits(&self.bytes)
    }

    pub fn first_zero_from(&self, start: usize) -> Option<usize> {
        first_zero_from(&self.bytes, start)
    }

    pub fn first_one_from(&self, start: usize) -> Option<usize> {
        first_one_from(&self.bytes, start)
    }

    /// Number of addressable bits
    pub fn len_bits(&self) -> usize {
        self.bytes.len() * 8
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
