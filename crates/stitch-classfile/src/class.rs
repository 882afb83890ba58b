//! Top-level class-file structure.

use crate::constant::ConstantPool;
use crate::error::ClassFileError;
use crate::reader::ByteReader;
use crate::writer::ByteWriter;

/// The class-file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// An attribute whose payload is kept undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Constant pool index of the attribute's name.
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Resolve this attribute's name through `pool`.
    ///
    /// # Errors
    /// Returns an error if `name_index` is not a `Utf8` entry.
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ClassFileError> {
        pool.utf8(self.name_index)
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let name_index = r.u16()?;
        let info = r.u32_prefixed()?.to_vec();
        Ok(Self { name_index, info })
    }

    fn write(&self, w: &mut ByteWriter) -> Result<(), ClassFileError> {
        w.u16(self.name_index);
        w.u32_prefixed(&self.info, "attribute")
    }
}

/// Read a u2-counted list of attributes.
///
/// # Errors
/// Returns an error if the list is truncated.
pub fn read_attributes(r: &mut ByteReader<'_>) -> Result<Vec<Attribute>, ClassFileError> {
    let count = r.u16()?;
    (0..count).map(|_| Attribute::read(r)).collect()
}

/// Write a u2-counted list of attributes.
///
/// # Errors
/// Returns an error if there are more than 65535 attributes or one is oversized.
pub fn write_attributes(w: &mut ByteWriter, attributes: &[Attribute]) -> Result<(), ClassFileError> {
    w.u16_len(attributes.len(), "attribute count")?;
    for attribute in attributes {
        attribute.write(w)?;
    }
    Ok(())
}

/// Position of the first attribute named `name`, skipping entries whose name
/// cannot be resolved.
pub fn find_attribute(attributes: &[Attribute], pool: &ConstantPool, name: &str) -> Option<usize> {
    attributes
        .iter()
        .position(|a| a.name(pool).is_ok_and(|n| n == name))
}

/// A field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    /// # Errors
    /// Returns an error if the name index is not a `Utf8` entry.
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ClassFileError> {
        pool.utf8(self.name_index)
    }

    /// # Errors
    /// Returns an error if the descriptor index is not a `Utf8` entry.
    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ClassFileError> {
        pool.utf8(self.descriptor_index)
    }

    /// The first attribute named `name`, if any.
    pub fn attribute(&self, pool: &ConstantPool, name: &str) -> Option<&Attribute> {
        find_attribute(&self.attributes, pool, name).and_then(|i| self.attributes.get(i))
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        Ok(Self {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: read_attributes(r)?,
        })
    }

    fn write(&self, w: &mut ByteWriter) -> Result<(), ClassFileError> {
        w.u16(self.access_flags);
        w.u16(self.name_index);
        w.u16(self.descriptor_index);
        write_attributes(w, &self.attributes)
    }
}

/// A decoded class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Decode a complete class file.
    ///
    /// # Errors
    /// Returns an error if the magic number is wrong, the data is truncated,
    /// a structure is malformed, or bytes remain after the last attribute.
    pub fn parse(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = ByteReader::new(data);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic { found: magic });
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::read(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let interfaces = (0..interface_count)
            .map(|_| r.u16())
            .collect::<Result<Vec<_>, _>>()?;
        let field_count = r.u16()?;
        let fields = (0..field_count)
            .map(|_| MemberInfo::read(&mut r))
            .collect::<Result<Vec<_>, _>>()?;
        let method_count = r.u16()?;
        let methods = (0..method_count)
            .map(|_| MemberInfo::read(&mut r))
            .collect::<Result<Vec<_>, _>>()?;
        let attributes = read_attributes(&mut r)?;
        if !r.is_empty() {
            return Err(ClassFileError::TrailingBytes {
                count: r.remaining(),
            });
        }

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        // Resolve the class name eagerly so a broken header fails here.
        class.name()?;
        Ok(class)
    }

    /// Encode the class file.
    ///
    /// # Errors
    /// Returns an error if any count or length exceeds its field width.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut w = ByteWriter::with_capacity(4096);
        w.u32(MAGIC);
        w.u16(self.minor_version);
        w.u16(self.major_version);
        self.constant_pool.write(&mut w)?;
        w.u16(self.access_flags);
        w.u16(self.this_class);
        w.u16(self.super_class);
        w.u16_len(self.interfaces.len(), "interfaces")?;
        for interface in &self.interfaces {
            w.u16(*interface);
        }
        w.u16_len(self.fields.len(), "fields")?;
        for field in &self.fields {
            field.write(&mut w)?;
        }
        w.u16_len(self.methods.len(), "methods")?;
        for method in &self.methods {
            method.write(&mut w)?;
        }
        write_attributes(&mut w, &self.attributes)?;
        Ok(w.into_bytes())
    }

    /// Internal name of this class (e.g. `org/example/Foo`).
    ///
    /// # Errors
    /// Returns an error if `this_class` is not a `Class` entry.
    pub fn name(&self) -> Result<&str, ClassFileError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal names of the directly implemented interfaces.
    ///
    /// # Errors
    /// Returns an error if an interface index is not a `Class` entry.
    pub fn interface_names(&self) -> Result<Vec<&str>, ClassFileError> {
        self.interfaces
            .iter()
            .map(|i| self.constant_pool.class_name(*i))
            .collect()
    }

    /// Whether the class directly implements `interface` (internal name).
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces
            .iter()
            .any(|i| self.constant_pool.class_name(*i).is_ok_and(|n| n == interface))
    }

    /// Number of class-level attributes named `name`.
    pub fn count_attributes(&self, name: &str) -> usize {
        self.attributes
            .iter()
            .filter(|a| a.name(&self.constant_pool).is_ok_and(|n| n == name))
            .count()
    }
}
