//! Error types for stitch-engine.

use stitch_classfile::ClassFileError;
use stitch_targets::JvmTarget;

use crate::report::BuildReport;

/// Errors raised while enumerating or decoding class artifacts.
///
/// Root failures end the run; the rest concern a single file and are
/// reported alongside its siblings.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The scan root does not exist.
    #[error("scan root {path} does not exist")]
    RootMissing { path: String },

    /// The scan root (or a directory below it) cannot be listed.
    #[error("cannot list scan root: {source}")]
    RootUnreadable {
        #[source]
        source: stitch_util::error::UtilError,
    },

    /// A class file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// A class file could not be decoded.
    #[error("malformed class file {path}: {source}")]
    Malformed {
        path: String,
        source: ClassFileError,
    },
}

impl ScanError {
    /// Whether this error ends the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RootMissing { .. } | Self::RootUnreadable { .. })
    }

    /// Path of the artifact this error concerns, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Read { path, .. } | Self::Malformed { path, .. } => Some(path),
            Self::RootMissing { .. } | Self::RootUnreadable { .. } => None,
        }
    }
}

/// A structural failure rewriting one class.
///
/// Every variant carries the code offset it concerns (0 when the problem is
/// not tied to an instruction).
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("{method}: abstract or native method has no code to instrument")]
    NoCode { method: String, offset: u32 },

    #[error("{method}: a guard probe cannot run before the superclass constructor")]
    Constructor { method: String, offset: u32 },

    #[error("class version {major} is newer than the configured target {target}")]
    UnsupportedVersion { major: u16, target: JvmTarget },

    #[error("{method}: malformed code at offset {offset}: {source}")]
    Malformed {
        method: String,
        offset: u32,
        source: ClassFileError,
    },

    #[error("{method}: {what} at offset {offset} exceeds 65535 after relocation")]
    Overflow {
        method: String,
        offset: u32,
        what: &'static str,
    },

    #[error("cannot add probe reference: {source}")]
    ConstantPool { source: ClassFileError },

    #[error("cannot encode rewritten class: {source}")]
    Encode { source: ClassFileError },
}

impl RewriteError {
    /// The offending instruction offset.
    pub fn offset(&self) -> u32 {
        match self {
            Self::NoCode { offset, .. }
            | Self::Constructor { offset, .. }
            | Self::Malformed { offset, .. }
            | Self::Overflow { offset, .. } => *offset,
            Self::UnsupportedVersion { .. } | Self::ConstantPool { .. } | Self::Encode { .. } => 0,
        }
    }
}

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] stitch_util::error::UtilError),

    /// A manifest operation failed.
    #[error("{0}")]
    Manifest(#[from] stitch_config::ManifestError),

    /// Scanning could not start.
    #[error("{0}")]
    Scan(#[from] ScanError),

    /// A `stitch.toml` already exists at the target path.
    #[error("stitch.toml already exists at {path}; refusing to overwrite it")]
    ProjectExists { path: String },

    /// A preset name did not match any built-in preset.
    #[error("unknown preset `{name}` (available: {available})")]
    UnknownPreset { name: String, available: String },

    /// A built-in preset descriptor failed to parse.
    #[error("invalid preset descriptor {name}: {reason}")]
    InvalidPreset { name: String, reason: String },

    /// Neither the manifest nor its preset names a probe.
    #[error("no probe configured: add a [probe] section or an [instrument] preset")]
    MissingProbe,

    /// `execute` was called before `apply`.
    #[error("plugin `{plugin}` was executed before it was applied")]
    NotApplied { plugin: String },

    /// The pipeline was asked to make a transition its state machine forbids.
    #[error("invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The build deadline passed before every artifact was rewritten.
    #[error("timed out after {secs}s with {refused} artifact(s) not rewritten")]
    Timeout { secs: u64, refused: usize },

    /// The rewrite worker pool could not be created.
    #[error("cannot start worker pool: {message}")]
    WorkerPool { message: String },

    /// The build report could not be serialized.
    #[error("cannot serialize build report: {message}")]
    Report { message: String },

    /// One or more artifacts failed; the report lists every failure.
    #[error("{} artifact(s) failed to instrument", report.failures.len())]
    ArtifactsFailed { report: Box<BuildReport> },
}
