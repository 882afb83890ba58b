//! Big-endian output buffer for class-file structures.

use crate::error::ClassFileError;

/// Largest value a u2 length or count may hold.
pub const U2_MAX: usize = 0xFFFF;

/// Convert a length or count into a u2 field.
///
/// # Errors
/// Returns [`ClassFileError::TooLarge`] if `len` does not fit in 16 bits.
pub fn to_u16(len: usize, what: &'static str) -> Result<u16, ClassFileError> {
    u16::try_from(len).map_err(|_| ClassFileError::TooLarge {
        what,
        len,
        max: U2_MAX,
    })
}

/// Convert a length into a u4 field.
///
/// # Errors
/// Returns [`ClassFileError::TooLarge`] if `len` does not fit in 32 bits.
pub fn to_u32(len: usize, what: &'static str) -> Result<u32, ClassFileError> {
    u32::try_from(len).map_err(|_| ClassFileError::TooLarge {
        what,
        len,
        max: usize::try_from(u32::MAX).unwrap_or(usize::MAX),
    })
}

/// A growable big-endian buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Write a u2 count for a collection of `len` items.
    ///
    /// # Errors
    /// Returns an error if `len` does not fit in 16 bits.
    pub fn u16_len(&mut self, len: usize, what: &'static str) -> Result<(), ClassFileError> {
        self.u16(to_u16(len, what)?);
        Ok(())
    }

    /// Write `data` preceded by its u4 length.
    ///
    /// # Errors
    /// Returns an error if `data` is longer than `u32::MAX`.
    pub fn u32_prefixed(&mut self, data: &[u8], what: &'static str) -> Result<(), ClassFileError> {
        self.u32(to_u32(data.len(), what)?);
        self.bytes(data);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
