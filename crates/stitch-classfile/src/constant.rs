//! The constant pool: decoding, lookups, and deduplicating additions.

use crate::error::ClassFileError;
use crate::reader::ByteReader;
use crate::writer::{ByteWriter, U2_MAX};

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// A single constant pool entry.
///
/// `Utf8` keeps the raw modified-UTF-8 bytes so that unchanged entries are
/// written back exactly as they were read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Slot 0, and the slot following every `Long` or `Double`.
    Unusable,
}

impl Constant {
    /// Whether this entry occupies two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }

    fn read(r: &mut ByteReader<'_>, index: u16) -> Result<Self, ClassFileError> {
        let tag = r.u8()?;
        let constant = match tag {
            TAG_UTF8 => {
                let len = usize::from(r.u16()?);
                Self::Utf8(r.bytes(len)?.to_vec())
            }
            TAG_INTEGER => Self::Integer(r.u32()?),
            TAG_FLOAT => Self::Float(r.u32()?),
            TAG_LONG => Self::Long(r.u64()?),
            TAG_DOUBLE => Self::Double(r.u64()?),
            TAG_CLASS => Self::Class {
                name_index: r.u16()?,
            },
            TAG_STRING => Self::String {
                string_index: r.u16()?,
            },
            TAG_FIELDREF => Self::Fieldref {
                class_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_METHODREF => Self::Methodref {
                class_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_INTERFACE_METHODREF => Self::InterfaceMethodref {
                class_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_NAME_AND_TYPE => Self::NameAndType {
                name_index: r.u16()?,
                descriptor_index: r.u16()?,
            },
            TAG_METHOD_HANDLE => Self::MethodHandle {
                reference_kind: r.u8()?,
                reference_index: r.u16()?,
            },
            TAG_METHOD_TYPE => Self::MethodType {
                descriptor_index: r.u16()?,
            },
            TAG_DYNAMIC => Self::Dynamic {
                bootstrap_method_attr_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_INVOKE_DYNAMIC => Self::InvokeDynamic {
                bootstrap_method_attr_index: r.u16()?,
                name_and_type_index: r.u16()?,
            },
            TAG_MODULE => Self::Module {
                name_index: r.u16()?,
            },
            TAG_PACKAGE => Self::Package {
                name_index: r.u16()?,
            },
            tag => return Err(ClassFileError::InvalidConstantTag { tag, index }),
        };
        Ok(constant)
    }

    fn write(&self, w: &mut ByteWriter) -> Result<(), ClassFileError> {
        match self {
            Self::Utf8(bytes) => {
                w.u8(TAG_UTF8);
                w.u16_len(bytes.len(), "UTF-8 constant")?;
                w.bytes(bytes);
            }
            Self::Integer(v) => {
                w.u8(TAG_INTEGER);
                w.u32(*v);
            }
            Self::Float(v) => {
                w.u8(TAG_FLOAT);
                w.u32(*v);
            }
            Self::Long(v) => {
                w.u8(TAG_LONG);
                w.u64(*v);
            }
            Self::Double(v) => {
                w.u8(TAG_DOUBLE);
                w.u64(*v);
            }
            Self::Class { name_index } => {
                w.u8(TAG_CLASS);
                w.u16(*name_index);
            }
            Self::String { string_index } => {
                w.u8(TAG_STRING);
                w.u16(*string_index);
            }
            Self::Fieldref {
                class_index,
                name_and_type_index,
            } => {
                w.u8(TAG_FIELDREF);
                w.u16(*class_index);
                w.u16(*name_and_type_index);
            }
            Self::Methodref {
                class_index,
                name_and_type_index,
            } => {
                w.u8(TAG_METHODREF);
                w.u16(*class_index);
                w.u16(*name_and_type_index);
            }
            Self::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => {
                w.u8(TAG_INTERFACE_METHODREF);
                w.u16(*class_index);
                w.u16(*name_and_type_index);
            }
            Self::NameAndType {
                name_index,
                descriptor_index,
            } => {
                w.u8(TAG_NAME_AND_TYPE);
                w.u16(*name_index);
                w.u16(*descriptor_index);
            }
            Self::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                w.u8(TAG_METHOD_HANDLE);
                w.u8(*reference_kind);
                w.u16(*reference_index);
            }
            Self::MethodType { descriptor_index } => {
                w.u8(TAG_METHOD_TYPE);
                w.u16(*descriptor_index);
            }
            Self::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                w.u8(TAG_DYNAMIC);
                w.u16(*bootstrap_method_attr_index);
                w.u16(*name_and_type_index);
            }
            Self::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                w.u8(TAG_INVOKE_DYNAMIC);
                w.u16(*bootstrap_method_attr_index);
                w.u16(*name_and_type_index);
            }
            Self::Module { name_index } => {
                w.u8(TAG_MODULE);
                w.u16(*name_index);
            }
            Self::Package { name_index } => {
                w.u8(TAG_PACKAGE);
                w.u16(*name_index);
            }
            Self::Unusable => {}
        }
        Ok(())
    }
}

/// A resolved `Methodref`, `InterfaceMethodref` or `Fieldref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the declaring class (e.g. `org/example/Foo`).
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// The constant pool of a class file. Index 0 is always unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create an empty pool (count 1, only the reserved slot 0).
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    /// Decode `constant_pool_count` followed by the pool entries.
    ///
    /// # Errors
    /// Returns an error on truncation or an unknown tag.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let count = r.u16()?;
        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(Constant::Unusable);
        let mut index: u16 = 1;
        while index < count {
            let constant = Constant::read(r, index)?;
            let wide = constant.is_wide();
            entries.push(constant);
            index = index.saturating_add(1);
            if wide {
                entries.push(Constant::Unusable);
                index = index.saturating_add(1);
            }
        }
        // A wide constant in the last slot spills one past the declared count.
        if entries.len() > usize::from(count).max(1) {
            return Err(ClassFileError::BadConstantIndex {
                index: count.saturating_sub(1),
                expected: "single-slot",
            });
        }
        Ok(Self { entries })
    }

    /// Encode the pool count followed by every entry.
    ///
    /// # Errors
    /// Returns an error if an entry cannot be encoded.
    pub fn write(&self, w: &mut ByteWriter) -> Result<(), ClassFileError> {
        w.u16_len(self.entries.len(), "constant pool")?;
        for entry in self.entries.iter().skip(1) {
            entry.write(w)?;
        }
        Ok(())
    }

    /// The `constant_pool_count` value (number of slots including slot 0).
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(usize::from(index))
    }

    /// Iterate over `(index, constant)` for every usable entry.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .filter_map(|(i, c)| u16::try_from(i).ok().map(|i| (i, c)))
    }

    /// Resolve a `Utf8` entry to its raw bytes.
    ///
    /// # Errors
    /// Returns an error if `index` is not a `Utf8` entry.
    pub fn utf8_bytes(&self, index: u16) -> Result<&[u8], ClassFileError> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => Ok(bytes),
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Resolve a `Utf8` entry to a string.
    ///
    /// Modified UTF-8 only diverges from UTF-8 for NUL and supplementary
    /// characters; entries holding either fail here. Compare against
    /// [`ConstantPool::utf8_bytes`] when any member name may be seen.
    ///
    /// # Errors
    /// Returns an error if `index` is not a `Utf8` entry or is not valid UTF-8.
    pub fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        std::str::from_utf8(self.utf8_bytes(index)?).map_err(|_| {
            ClassFileError::BadConstantIndex {
                index,
                expected: "UTF-8 encoded Utf8",
            }
        })
    }

    /// Resolve a `Class` entry to its internal name.
    ///
    /// # Errors
    /// Returns an error if `index` is not a `Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index) {
            Some(Constant::Class { name_index }) => self.utf8(*name_index),
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "Class",
            }),
        }
    }

    /// Resolve a `NameAndType` entry to `(name, descriptor)`.
    ///
    /// # Errors
    /// Returns an error if `index` is not a `NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFileError> {
        match self.get(index) {
            Some(Constant::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a field or method reference.
    ///
    /// # Errors
    /// Returns an error if `index` is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, ClassFileError> {
        match self.get(index) {
            Some(
                Constant::Fieldref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                },
            ) => {
                let owner = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    owner,
                    name,
                    descriptor,
                })
            }
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "member reference",
            }),
        }
    }

    /// Find the index of an entry equal to `constant`.
    pub fn find(&self, constant: &Constant) -> Option<u16> {
        self.iter().find(|(_, c)| *c == constant).map(|(i, _)| i)
    }

    /// Return the index of `constant`, appending it if no equal entry exists.
    ///
    /// # Errors
    /// Returns [`ClassFileError::ConstantPoolOverflow`] if the pool is full.
    pub fn add(&mut self, constant: Constant) -> Result<u16, ClassFileError> {
        if let Some(index) = self.find(&constant) {
            return Ok(index);
        }
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len().saturating_add(slots) > U2_MAX {
            return Err(ClassFileError::ConstantPoolOverflow);
        }
        let index =
            u16::try_from(self.entries.len()).map_err(|_| ClassFileError::ConstantPoolOverflow)?;
        self.entries.push(constant);
        if slots == 2 {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16, ClassFileError> {
        self.add(Constant::Utf8(value.as_bytes().to_vec()))
    }

    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_class(&mut self, internal_name: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(internal_name)?;
        self.add(Constant::Class { name_index })
    }

    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Add (or reuse) a `Methodref` to `owner.name descriptor`.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn add_methodref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassFileError> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::Methodref {
            class_index,
            name_and_type_index,
        })
    }
}
