//! `StackMapTable` frames.
//!
//! Frames are decoded into a uniform shape and re-encoded in the most compact
//! form their offset delta allows, so shifting an offset never produces an
//! invalid frame type.

use crate::error::ClassFileError;
use crate::reader::ByteReader;
use crate::writer::ByteWriter;

const SAME_MAX: u8 = 63;
const SAME_LOCALS_1_BASE: u8 = 64;
const SAME_LOCALS_1_MAX: u8 = 127;
const SAME_LOCALS_1_EXTENDED: u8 = 247;
const CHOP_MIN: u8 = 248;
const CHOP_MAX: u8 = 250;
const SAME_EXTENDED: u8 = 251;
const APPEND_MIN: u8 = 252;
const APPEND_MAX: u8 = 254;
const FULL: u8 = 255;

/// A verification type in a frame's locals or stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Constant pool `Class` index.
    Object(u16),
    /// Code offset of the `new` instruction that created the value.
    Uninitialized(u16),
}

impl VerificationType {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let tag = r.u8()?;
        let ty = match tag {
            0 => Self::Top,
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::Double,
            4 => Self::Long,
            5 => Self::Null,
            6 => Self::UninitializedThis,
            7 => Self::Object(r.u16()?),
            8 => Self::Uninitialized(r.u16()?),
            tag => return Err(ClassFileError::InvalidVerificationTag { tag }),
        };
        Ok(ty)
    }

    fn write(self, w: &mut ByteWriter) {
        match self {
            Self::Top => w.u8(0),
            Self::Integer => w.u8(1),
            Self::Float => w.u8(2),
            Self::Double => w.u8(3),
            Self::Long => w.u8(4),
            Self::Null => w.u8(5),
            Self::UninitializedThis => w.u8(6),
            Self::Object(index) => {
                w.u8(7);
                w.u16(index);
            }
            Self::Uninitialized(offset) => {
                w.u8(8);
                w.u16(offset);
            }
        }
    }
}

/// A single stack map frame.
///
/// `offset_delta` follows the class-file convention: the first frame's
/// offset is `offset_delta`, every later frame's is `previous + offset_delta + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same {
        offset_delta: u16,
    },
    SameLocals1StackItem {
        offset_delta: u16,
        stack: VerificationType,
    },
    /// Drops the last `k` (1–3) locals.
    Chop {
        offset_delta: u16,
        k: u8,
    },
    /// Adds 1–3 locals.
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            Self::Same { offset_delta }
            | Self::SameLocals1StackItem { offset_delta, .. }
            | Self::Chop { offset_delta, .. }
            | Self::Append { offset_delta, .. }
            | Self::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub fn set_offset_delta(&mut self, delta: u16) {
        match self {
            Self::Same { offset_delta }
            | Self::SameLocals1StackItem { offset_delta, .. }
            | Self::Chop { offset_delta, .. }
            | Self::Append { offset_delta, .. }
            | Self::Full { offset_delta, .. } => *offset_delta = delta,
        }
    }

    /// Every verification type mentioned by this frame, mutably.
    pub fn types_mut(&mut self) -> Vec<&mut VerificationType> {
        match self {
            Self::Same { .. } | Self::Chop { .. } => Vec::new(),
            Self::SameLocals1StackItem { stack, .. } => vec![stack],
            Self::Append { locals, .. } => locals.iter_mut().collect(),
            Self::Full { locals, stack, .. } => locals.iter_mut().chain(stack.iter_mut()).collect(),
        }
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let frame_type = r.u8()?;
        let frame = match frame_type {
            0..=SAME_MAX => Self::Same {
                offset_delta: u16::from(frame_type),
            },
            SAME_LOCALS_1_BASE..=SAME_LOCALS_1_MAX => Self::SameLocals1StackItem {
                offset_delta: u16::from(frame_type - SAME_LOCALS_1_BASE),
                stack: VerificationType::read(r)?,
            },
            SAME_LOCALS_1_EXTENDED => Self::SameLocals1StackItem {
                offset_delta: r.u16()?,
                stack: VerificationType::read(r)?,
            },
            CHOP_MIN..=CHOP_MAX => Self::Chop {
                offset_delta: r.u16()?,
                k: SAME_EXTENDED - frame_type,
            },
            SAME_EXTENDED => Self::Same {
                offset_delta: r.u16()?,
            },
            APPEND_MIN..=APPEND_MAX => {
                let offset_delta = r.u16()?;
                let locals = (0..frame_type - SAME_EXTENDED)
                    .map(|_| VerificationType::read(r))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::Append {
                    offset_delta,
                    locals,
                }
            }
            FULL => {
                let offset_delta = r.u16()?;
                let local_count = r.u16()?;
                let locals = (0..local_count)
                    .map(|_| VerificationType::read(r))
                    .collect::<Result<Vec<_>, _>>()?;
                let stack_count = r.u16()?;
                let stack = (0..stack_count)
                    .map(|_| VerificationType::read(r))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            frame_type => return Err(ClassFileError::InvalidFrameType { frame_type }),
        };
        Ok(frame)
    }

    fn write(&self, w: &mut ByteWriter) -> Result<(), ClassFileError> {
        match self {
            Self::Same { offset_delta } => match u8::try_from(*offset_delta) {
                Ok(delta) if delta <= SAME_MAX => w.u8(delta),
                _ => {
                    w.u8(SAME_EXTENDED);
                    w.u16(*offset_delta);
                }
            },
            Self::SameLocals1StackItem {
                offset_delta,
                stack,
            } => {
                match u8::try_from(*offset_delta) {
                    Ok(delta) if delta <= SAME_LOCALS_1_MAX - SAME_LOCALS_1_BASE => {
                        w.u8(SAME_LOCALS_1_BASE + delta);
                    }
                    _ => {
                        w.u8(SAME_LOCALS_1_EXTENDED);
                        w.u16(*offset_delta);
                    }
                }
                stack.write(w);
            }
            Self::Chop { offset_delta, k } => {
                if !(1..=3).contains(k) {
                    return Err(ClassFileError::MalformedAttribute {
                        attribute: "StackMapTable",
                        reason: format!("chop frame removes {k} locals"),
                    });
                }
                w.u8(SAME_EXTENDED - k);
                w.u16(*offset_delta);
            }
            Self::Append {
                offset_delta,
                locals,
            } => {
                let count = u8::try_from(locals.len())
                    .ok()
                    .filter(|n| (1..=3).contains(n))
                    .ok_or_else(|| ClassFileError::MalformedAttribute {
                        attribute: "StackMapTable",
                        reason: format!("append frame adds {} locals", locals.len()),
                    })?;
                w.u8(SAME_EXTENDED + count);
                w.u16(*offset_delta);
                for local in locals {
                    local.write(w);
                }
            }
            Self::Full {
                offset_delta,
                locals,
                stack,
            } => {
                w.u8(FULL);
                w.u16(*offset_delta);
                w.u16_len(locals.len(), "frame locals")?;
                for local in locals {
                    local.write(w);
                }
                w.u16_len(stack.len(), "frame stack")?;
                for item in stack {
                    item.write(w);
                }
            }
        }
        Ok(())
    }
}

/// A decoded `StackMapTable` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    /// Decode a `StackMapTable` payload.
    ///
    /// # Errors
    /// Returns an error on truncation, a reserved frame type, or trailing bytes.
    pub fn parse(info: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = ByteReader::new(info);
        let count = r.u16()?;
        let frames = (0..count)
            .map(|_| StackMapFrame::read(&mut r))
            .collect::<Result<Vec<_>, _>>()?;
        if !r.is_empty() {
            return Err(ClassFileError::MalformedAttribute {
                attribute: "StackMapTable",
                reason: format!("{} trailing byte(s)", r.remaining()),
            });
        }
        Ok(Self { frames })
    }

    /// Encode the table payload.
    ///
    /// # Errors
    /// Returns an error if a frame cannot be encoded.
    pub fn to_info(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut w = ByteWriter::new();
        w.u16_len(self.frames.len(), "stack map frames")?;
        for frame in &self.frames {
            frame.write(&mut w)?;
        }
        Ok(w.into_bytes())
    }

    /// Absolute code offsets of every frame, in order.
    pub fn offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.frames.len());
        let mut previous: Option<u32> = None;
        for frame in &self.frames {
            let delta = u32::from(frame.offset_delta());
            let offset = match previous {
                None => delta,
                Some(p) => p.saturating_add(delta).saturating_add(1),
            };
            offsets.push(offset);
            previous = Some(offset);
        }
        offsets
    }
}
