//! Error types for stitch-classfile.

/// Errors produced while decoding or encoding class-file structures.
#[derive(Debug, thiserror::Error)]
pub enum ClassFileError {
    /// The input does not start with `0xCAFEBABE`.
    #[error("bad magic number 0x{found:08X}, not a class file")]
    BadMagic { found: u32 },

    /// The input ended before a structure was complete.
    #[error("unexpected end of data at byte {offset} (needed {needed} more)")]
    Truncated { offset: usize, needed: usize },

    /// Data remained after the last class-file structure.
    #[error("{count} trailing byte(s) after the end of the class")]
    TrailingBytes { count: usize },

    /// An unknown constant pool tag was encountered.
    #[error("invalid constant pool tag {tag} at entry {index}")]
    InvalidConstantTag { tag: u8, index: u16 },

    /// A constant pool reference points at the wrong kind of entry.
    #[error("constant pool index {index} is not a valid {expected} entry")]
    BadConstantIndex { index: u16, expected: &'static str },

    /// Adding another constant would exceed the u2 pool count.
    #[error("constant pool is full; a class may hold at most 65534 constants")]
    ConstantPoolOverflow,

    /// A structure is too large for its length field.
    #[error("{what} length {len} exceeds the class-file limit of {max}")]
    TooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// An opcode is unassigned or reserved.
    #[error("invalid opcode 0x{opcode:02X} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    /// An instruction's operands run past the end of the code array.
    #[error("instruction at offset {offset} runs past the end of the code")]
    TruncatedInstruction { offset: usize },

    /// A stack map frame uses a reserved frame type.
    #[error("invalid stack map frame type {frame_type}")]
    InvalidFrameType { frame_type: u8 },

    /// A verification type uses an unknown tag.
    #[error("invalid verification type tag {tag}")]
    InvalidVerificationTag { tag: u8 },

    /// A field or method descriptor does not follow the JVM grammar.
    #[error("invalid descriptor \"{descriptor}\"")]
    InvalidDescriptor { descriptor: String },

    /// An attribute's payload does not match its declared layout.
    #[error("{attribute} attribute is malformed: {reason}")]
    MalformedAttribute {
        attribute: &'static str,
        reason: String,
    },
}
