//! Big-endian cursor over class-file bytes.

use crate::error::ClassFileError;

/// A bounds-checked big-endian reader.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read `n` bytes as a borrowed slice.
    ///
    /// # Errors
    /// Returns [`ClassFileError::Truncated`] if fewer than `n` bytes remain.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ClassFileError> {
        let end = self.pos.checked_add(n);
        let slice = end.and_then(|end| self.data.get(self.pos..end));
        match slice {
            Some(slice) => {
                self.pos = self.pos.saturating_add(n);
                Ok(slice)
            }
            None => Err(ClassFileError::Truncated {
                offset: self.pos,
                needed: n.saturating_sub(self.remaining()),
            }),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ClassFileError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// # Errors
    /// Returns an error if the input is exhausted.
    pub fn u8(&mut self) -> Result<u8, ClassFileError> {
        Ok(u8::from_be_bytes(self.array()?))
    }

    /// # Errors
    /// Returns an error if fewer than two bytes remain.
    pub fn u16(&mut self) -> Result<u16, ClassFileError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// # Errors
    /// Returns an error if fewer than four bytes remain.
    pub fn u32(&mut self) -> Result<u32, ClassFileError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// # Errors
    /// Returns an error if fewer than eight bytes remain.
    pub fn u64(&mut self) -> Result<u64, ClassFileError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    /// Read a u4 length prefix followed by that many bytes.
    ///
    /// # Errors
    /// Returns an error if the prefix or the payload is truncated.
    pub fn u32_prefixed(&mut self) -> Result<&'a [u8], ClassFileError> {
        let len = self.u32()?;
        let len = usize::try_from(len).map_err(|_| ClassFileError::Truncated {
            offset: self.pos,
            needed: usize::MAX,
        })?;
        self.bytes(len)
    }
}
