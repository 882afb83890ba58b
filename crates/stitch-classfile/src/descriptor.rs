//! Field and method descriptor parsing.

use std::fmt;

use crate::error::ClassFileError;

/// A field type from a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// An object type by internal name.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Number of local-variable / operand-stack slots this type occupies.
    pub fn slots(&self) -> u16 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    fn parse(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<Self> {
        let field = match chars.next()? {
            'B' => Self::Byte,
            'C' => Self::Char,
            'D' => Self::Double,
            'F' => Self::Float,
            'I' => Self::Int,
            'J' => Self::Long,
            'S' => Self::Short,
            'Z' => Self::Boolean,
            'L' => {
                let mut name = String::new();
                loop {
                    match chars.next()? {
                        ';' => break,
                        c => name.push(c),
                    }
                }
                if name.is_empty() {
                    return None;
                }
                Self::Object(name)
            }
            '[' => Self::Array(Box::new(Self::parse(chars)?)),
            _ => return None,
        };
        Some(field)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("B"),
            Self::Char => f.write_str("C"),
            Self::Double => f.write_str("D"),
            Self::Float => f.write_str("F"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Short => f.write_str("S"),
            Self::Boolean => f.write_str("Z"),
            Self::Object(name) => write!(f, "L{name};"),
            Self::Array(inner) => write!(f, "[{inner}"),
        }
    }
}

/// A parsed method descriptor such as `(Landroid/view/View;)V`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `void`.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor.
    ///
    /// # Errors
    /// Returns [`ClassFileError::InvalidDescriptor`] if `descriptor` is malformed.
    pub fn parse(descriptor: &str) -> Result<Self, ClassFileError> {
        let invalid = || ClassFileError::InvalidDescriptor {
            descriptor: descriptor.to_owned(),
        };
        let mut chars = descriptor.chars().peekable();
        if chars.next() != Some('(') {
            return Err(invalid());
        }
        let mut params = Vec::new();
        while chars.peek().is_some_and(|c| *c != ')') {
            params.push(FieldType::parse(&mut chars).ok_or_else(invalid)?);
        }
        if chars.next() != Some(')') {
            return Err(invalid());
        }
        let ret = if chars.peek() == Some(&'V') {
            chars.next();
            None
        } else {
            Some(FieldType::parse(&mut chars).ok_or_else(invalid)?)
        };
        if chars.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { params, ret })
    }

    /// Slots taken by the parameters (excluding `this`).
    pub fn param_slots(&self) -> u16 {
        self.params
            .iter()
            .map(FieldType::slots)
            .fold(0u16, u16::saturating_add)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{ret}"),
            None => f.write_str("V"),
        }
    }
}
