//! The data handed between scanner, rewriter and coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use stitch_classfile::ClassFile;

use crate::error::RewriteError;

/// Name of the class attribute recording that Stitch rewrote the class.
pub const MARKER_ATTRIBUTE: &str = "StitchInstrumented";

/// One compiled class as found on disk. Immutable once scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassArtifact {
    /// Internal class name, e.g. `org/example/Foo`.
    pub name: String,
    /// Absolute path of the class file.
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated.
    pub relative: String,
    pub bytes: Vec<u8>,
}

/// A method selected for instrumentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationPoint {
    /// Index into the class's method table.
    pub method_index: usize,
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Where the prologue goes; always the start of the method.
    pub entry_offset: u32,
    /// Length of the original code array (0 without code).
    pub code_length: u32,
    /// Offsets of return instructions in the original code.
    pub return_offsets: Vec<u32>,
    pub has_code: bool,
    /// The method already begins with a call to the probe.
    pub already_probed: bool,
}

impl InstrumentationPoint {
    /// `name` followed by `descriptor`, as used in messages.
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

/// A class plus the places to instrument in it.
#[derive(Debug, Clone)]
pub struct TransformTarget {
    pub artifact: Arc<ClassArtifact>,
    pub class: ClassFile,
    /// Empty when the class is excluded or nothing matched.
    pub points: Vec<InstrumentationPoint>,
    /// How many marker attributes the class already carries.
    pub markers: usize,
}

/// What rewriting did to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStatus {
    Instrumented { methods: usize },
    Unchanged,
    AlreadyInstrumented,
}

impl RewriteStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Instrumented { .. } => "instrumented",
            Self::Unchanged => "unchanged",
            Self::AlreadyInstrumented => "already-instrumented",
        }
    }
}

/// Output bytes for a class that was processed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub bytes: Vec<u8>,
    pub status: RewriteStatus,
}

/// The rewriter's verdict for one target.
#[derive(Debug)]
pub struct RewriteResult {
    pub artifact: Arc<ClassArtifact>,
    pub outcome: Result<Rewritten, RewriteError>,
}
