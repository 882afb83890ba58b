//! The probe method and the prologue that calls it.

use std::fmt;

use stitch_classfile::opcode::{
    ACONST_NULL, ARETURN, DCONST_0, DRETURN, FCONST_0, FRETURN, ICONST_0, IFEQ, INVOKESTATIC,
    IRETURN, LCONST_0, LRETURN, NOP, RETURN,
};
use stitch_classfile::{ConstantPool, FieldType};
use stitch_config::{Probe, ProbeKind};

/// The static method injected into instrumented code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    /// Internal name of the declaring class.
    pub owner: String,
    pub method: String,
    pub kind: ProbeKind,
}

impl ProbeSpec {
    pub fn descriptor(&self) -> &'static str {
        self.kind.descriptor()
    }

    /// Whether `code` already starts with `invokestatic` of this probe.
    pub fn is_called_at_start(&self, code: &[u8], pool: &ConstantPool) -> bool {
        let (Some(&INVOKESTATIC), Some(&hi), Some(&lo)) = (code.first(), code.get(1), code.get(2))
        else {
            return false;
        };
        pool.member_ref(u16::from_be_bytes([hi, lo]))
            .is_ok_and(|m| {
                m.owner == self.owner && m.name == self.method && m.descriptor == self.descriptor()
            })
    }
}

impl From<&Probe> for ProbeSpec {
    fn from(probe: &Probe) -> Self {
        Self {
            owner: probe.owner.clone(),
            method: probe.method.clone(),
            kind: probe.kind,
        }
    }
}

impl fmt::Display for ProbeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.method, self.descriptor())
    }
}

/// Bytes inserted at offset 0 of an instrumented method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Prologue {
    /// Prologue code padded with `nop` to `shift` bytes.
    pub code: Vec<u8>,
    /// How far the original code moves; a multiple of 4.
    pub shift: u16,
    /// Branch target of the guard's `ifeq` (start of the `nop` pad).
    pub landing: Option<u16>,
    /// Operand stack depth the prologue needs.
    pub max_stack: u16,
}

/// Build the prologue calling the probe at constant pool index `probe_ref`.
///
/// `ret` is the instrumented method's return type (`None` for `void`).
pub(crate) fn prologue(kind: ProbeKind, probe_ref: u16, ret: Option<&FieldType>) -> Prologue {
    let [hi, lo] = probe_ref.to_be_bytes();
    let mut code = vec![INVOKESTATIC, hi, lo];
    let mut landing = None;
    let mut max_stack = 0;

    if kind == ProbeKind::Guard {
        let (push, xreturn) = early_return(ret);
        let len = 3 + 3 + u16::from(push.is_some()) + 1;
        let [off_hi, off_lo] = (len - 3).to_be_bytes();
        code.extend_from_slice(&[IFEQ, off_hi, off_lo]);
        code.extend(push);
        code.push(xreturn);
        landing = Some(len);
        max_stack = ret.map_or(1, |t| t.slots().max(1));
    }

    let shift = padded_len(code.len());
    code.resize(usize::from(shift), NOP);
    Prologue {
        code,
        shift,
        landing,
        max_stack,
    }
}

/// Smallest multiple of 4 strictly greater than `len`.
fn padded_len(len: usize) -> u16 {
    let padded = (len / 4 + 1) * 4;
    u16::try_from(padded).unwrap_or(u16::MAX)
}

/// The default-value push and return opcode for an early exit.
fn early_return(ret: Option<&FieldType>) -> (Option<u8>, u8) {
    match ret {
        None => (None, RETURN),
        Some(FieldType::Long) => (Some(LCONST_0), LRETURN),
        Some(FieldType::Float) => (Some(FCONST_0), FRETURN),
        Some(FieldType::Double) => (Some(DCONST_0), DRETURN),
        Some(FieldType::Object(_) | FieldType::Array(_)) => (Some(ACONST_NULL), ARETURN),
        Some(
            FieldType::Int
            | FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short,
        ) => (Some(ICONST_0), IRETURN),
    }
}
