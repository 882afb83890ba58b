#![forbid(unsafe_code)]
//! Reading, editing and writing JVM class files.
//!
//! The model is deliberately shallow: members and attributes keep their raw
//! payloads, and only the structures Stitch edits (`Code`, `StackMapTable`,
//! line and local-variable tables) are decoded into typed form.

pub mod access;
pub mod class;
pub mod code;
pub mod constant;
pub mod descriptor;
pub mod error;
pub mod opcode;
pub mod reader;
pub mod stackmap;
pub mod writer;

pub use class::{Attribute, ClassFile, MemberInfo};
pub use code::{CodeAttribute, ExceptionEntry};
pub use constant::{Constant, ConstantPool, MemberRef};
pub use descriptor::{FieldType, MethodDescriptor};
pub use error::ClassFileError;
pub use stackmap::{StackMapFrame, StackMapTable, VerificationType};
