//! The `Code` attribute and the offset-bearing tables nested inside it.

use crate::class::{read_attributes, write_attributes, Attribute};
use crate::error::ClassFileError;
use crate::reader::ByteReader;
use crate::writer::{to_u32, ByteWriter, U2_MAX};

/// One row of a method's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    /// Exclusive end of the protected range.
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant pool `Class` index, or 0 for `finally`.
    pub catch_type: u16,
}

/// A decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Decode the payload of a `Code` attribute.
    ///
    /// # Errors
    /// Returns an error if the payload is truncated, has trailing bytes, or
    /// declares a code array of 64 KiB or more.
    pub fn parse(info: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = ByteReader::new(info);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let code = r.u32_prefixed()?.to_vec();
        if code.len() > U2_MAX {
            return Err(ClassFileError::TooLarge {
                what: "code",
                len: code.len(),
                max: U2_MAX,
            });
        }
        let exception_count = r.u16()?;
        let exception_table = (0..exception_count)
            .map(|_| {
                Ok(ExceptionEntry {
                    start_pc: r.u16()?,
                    end_pc: r.u16()?,
                    handler_pc: r.u16()?,
                    catch_type: r.u16()?,
                })
            })
            .collect::<Result<Vec<_>, ClassFileError>>()?;
        let attributes = read_attributes(&mut r)?;
        if !r.is_empty() {
            return Err(ClassFileError::MalformedAttribute {
                attribute: "Code",
                reason: format!("{} trailing byte(s)", r.remaining()),
            });
        }
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Encode this attribute's payload.
    ///
    /// # Errors
    /// Returns an error if the code array is 64 KiB or larger, or a nested
    /// count overflows.
    pub fn to_info(&self) -> Result<Vec<u8>, ClassFileError> {
        if self.code.len() > U2_MAX {
            return Err(ClassFileError::TooLarge {
                what: "code",
                len: self.code.len(),
                max: U2_MAX,
            });
        }
        let mut w = ByteWriter::with_capacity(self.code.len().saturating_add(64));
        w.u16(self.max_stack);
        w.u16(self.max_locals);
        w.u32(to_u32(self.code.len(), "code")?);
        w.bytes(&self.code);
        w.u16_len(self.exception_table.len(), "exception table")?;
        for entry in &self.exception_table {
            w.u16(entry.start_pc);
            w.u16(entry.end_pc);
            w.u16(entry.handler_pc);
            w.u16(entry.catch_type);
        }
        write_attributes(&mut w, &self.attributes)?;
        Ok(w.into_bytes())
    }
}

/// One `LineNumberTable` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

/// Decode a `LineNumberTable` payload.
///
/// # Errors
/// Returns an error if the payload is truncated or has trailing bytes.
pub fn parse_line_numbers(info: &[u8]) -> Result<Vec<LineNumber>, ClassFileError> {
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let rows = (0..count)
        .map(|_| {
            Ok(LineNumber {
                start_pc: r.u16()?,
                line_number: r.u16()?,
            })
        })
        .collect::<Result<Vec<_>, ClassFileError>>()?;
    expect_end(&r, "LineNumberTable")?;
    Ok(rows)
}

/// Encode a `LineNumberTable` payload.
///
/// # Errors
/// Returns an error if there are more than 65535 rows.
pub fn write_line_numbers(rows: &[LineNumber]) -> Result<Vec<u8>, ClassFileError> {
    let mut w = ByteWriter::new();
    w.u16_len(rows.len(), "line number table")?;
    for row in rows {
        w.u16(row.start_pc);
        w.u16(row.line_number);
    }
    Ok(w.into_bytes())
}

/// One `LocalVariableTable` or `LocalVariableTypeTable` row (same layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    /// Descriptor index (`LocalVariableTable`) or signature index (`...TypeTable`).
    pub descriptor_index: u16,
    pub index: u16,
}

/// Decode a `LocalVariableTable` / `LocalVariableTypeTable` payload.
///
/// # Errors
/// Returns an error if the payload is truncated or has trailing bytes.
pub fn parse_local_variables(info: &[u8]) -> Result<Vec<LocalVariable>, ClassFileError> {
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let rows = (0..count)
        .map(|_| {
            Ok(LocalVariable {
                start_pc: r.u16()?,
                length: r.u16()?,
                name_index: r.u16()?,
                descriptor_index: r.u16()?,
                index: r.u16()?,
            })
        })
        .collect::<Result<Vec<_>, ClassFileError>>()?;
    expect_end(&r, "LocalVariableTable")?;
    Ok(rows)
}

/// Encode a `LocalVariableTable` / `LocalVariableTypeTable` payload.
///
/// # Errors
/// Returns an error if there are more than 65535 rows.
pub fn write_local_variables(rows: &[LocalVariable]) -> Result<Vec<u8>, ClassFileError> {
    let mut w = ByteWriter::new();
    w.u16_len(rows.len(), "local variable table")?;
    for row in rows {
        w.u16(row.start_pc);
        w.u16(row.length);
        w.u16(row.name_index);
        w.u16(row.descriptor_index);
        w.u16(row.index);
    }
    Ok(w.into_bytes())
}

fn expect_end(r: &ByteReader<'_>, attribute: &'static str) -> Result<(), ClassFileError> {
    if r.is_empty() {
        Ok(())
    } else {
        Err(ClassFileError::MalformedAttribute {
            attribute,
            reason: format!("{} trailing byte(s)", r.remaining()),
        })
    }
}
