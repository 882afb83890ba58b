//! Scanning, rewriting and re-emitting JVM class artifacts for Stitch.

pub mod artifact;
pub mod error;
pub mod init;
pub mod pipeline;
pub mod plugin;
pub mod preset;
pub mod probe;
mod relocate;
pub mod report;
pub mod rewrite;
pub mod scan;
pub mod settings;

#[cfg(test)]
mod fixtures;

pub use artifact::{
    ClassArtifact, InstrumentationPoint, RewriteResult, RewriteStatus, Rewritten, TransformTarget,
};
pub use error::{EngineError, RewriteError, ScanError};
pub use init::init_project;
pub use pipeline::{Coordinator, PipelineState, Transition};
pub use plugin::{BuildPlugin, HostContext, InstrumentPlugin, MANIFEST_FILE};
pub use report::BuildReport;
pub use rewrite::Rewriter;
pub use scan::{ScanSequence, Scanner};
pub use settings::Settings;
