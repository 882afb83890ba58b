//! JVM opcodes and instruction-length decoding.

use crate::error::ClassFileError;

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_0: u8 = 0x03;
pub const LCONST_0: u8 = 0x09;
pub const FCONST_0: u8 = 0x0b;
pub const DCONST_0: u8 = 0x0e;
pub const IINC: u8 = 0x84;
pub const IFEQ: u8 = 0x99;
pub const GOTO: u8 = 0xa7;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;
pub const INVOKESTATIC: u8 = 0xb8;
pub const ATHROW: u8 = 0xbf;
pub const WIDE: u8 = 0xc4;

/// Whether `opcode` returns from the method.
pub fn is_return(opcode: u8) -> bool {
    (IRETURN..=RETURN).contains(&opcode)
}

/// Length in bytes of the instruction starting at `offset`.
///
/// # Errors
/// Returns an error if the opcode is unassigned or its operands are truncated.
pub fn instruction_length(code: &[u8], offset: usize) -> Result<usize, ClassFileError> {
    let opcode = *code
        .get(offset)
        .ok_or(ClassFileError::TruncatedInstruction { offset })?;
    let len = match opcode {
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | IINC | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        0xb9 | 0xba | 0xc8 | 0xc9 => 5,
        WIDE => match code.get(offset.saturating_add(1)) {
            Some(&IINC) => 6,
            Some(0x15..=0x19 | 0x36..=0x3a | 0xa9) => 4,
            Some(&opcode) => {
                return Err(ClassFileError::InvalidOpcode {
                    opcode,
                    offset: offset.saturating_add(1),
                })
            }
            None => return Err(ClassFileError::TruncatedInstruction { offset }),
        },
        TABLESWITCH => {
            let base = switch_operands(offset);
            let low = read_i32(code, base.saturating_add(4), offset)?;
            let high = read_i32(code, base.saturating_add(8), offset)?;
            let entries = i64::from(high) - i64::from(low) + 1;
            let entries = usize::try_from(entries)
                .map_err(|_| ClassFileError::TruncatedInstruction { offset })?;
            (base - offset)
                .saturating_add(12)
                .saturating_add(entries.saturating_mul(4))
        }
        LOOKUPSWITCH => {
            let base = switch_operands(offset);
            let pairs = read_i32(code, base.saturating_add(4), offset)?;
            let pairs =
                usize::try_from(pairs).map_err(|_| ClassFileError::TruncatedInstruction { offset })?;
            (base - offset)
                .saturating_add(8)
                .saturating_add(pairs.saturating_mul(8))
        }
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 => 1,
        opcode => return Err(ClassFileError::InvalidOpcode { opcode, offset }),
    };
    if offset.saturating_add(len) > code.len() {
        return Err(ClassFileError::TruncatedInstruction { offset });
    }
    Ok(len)
}

/// Offset of the first operand byte of a switch at `offset` (after 0–3 pad bytes).
fn switch_operands(offset: usize) -> usize {
    let after_opcode = offset.saturating_add(1);
    after_opcode.saturating_add((4 - after_opcode % 4) % 4)
}

fn read_i32(code: &[u8], at: usize, offset: usize) -> Result<i32, ClassFileError> {
    let bytes = code
        .get(at..at.saturating_add(4))
        .ok_or(ClassFileError::TruncatedInstruction { offset })?;
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    Ok(i32::from_be_bytes(out))
}

/// A decoded instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub len: usize,
}

/// Iterator over the instructions of a code array.
///
/// Yields an error once and then stops if the code cannot be decoded.
#[derive(Debug)]
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction, ClassFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let offset = self.offset;
        match instruction_length(self.code, offset) {
            Ok(len) => {
                self.offset = offset.saturating_add(len);
                let opcode = self.code.get(offset).copied().unwrap_or(NOP);
                Some(Ok(Instruction {
                    offset,
                    opcode,
                    len,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
