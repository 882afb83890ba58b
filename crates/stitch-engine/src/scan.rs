//! Artifact Scanner: walks a class directory and finds instrumentation points.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stitch_classfile::opcode::{is_return, Instructions};
use stitch_classfile::{ClassFile, ClassFileError, CodeAttribute};
use stitch_config::MatchRule;
use stitch_util::fs::{collect_files, relative_slash_path};
use tracing::{debug, info};

use crate::artifact::{ClassArtifact, InstrumentationPoint, TransformTarget, MARKER_ATTRIBUTE};
use crate::error::ScanError;
use crate::settings::Settings;

/// Finds transformation targets under `settings.root`. Never writes.
#[derive(Debug, Clone, Copy)]
pub struct Scanner<'a> {
    settings: &'a Settings,
}

impl<'a> Scanner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Enumerate class files under the scan root.
    ///
    /// Paths are listed and sorted up front; each file is read and decoded
    /// only when the returned sequence reaches it. Every call starts a fresh
    /// sequence.
    ///
    /// # Errors
    /// Returns [`ScanError::RootMissing`] or [`ScanError::RootUnreadable`]
    /// if the root cannot be listed.
    pub fn scan(&self) -> Result<ScanSequence<'a>, ScanError> {
        let root = &self.settings.root;
        if !root.exists() {
            return Err(ScanError::RootMissing {
                path: root.display().to_string(),
            });
        }
        let paths = collect_files(root, "class").map_err(|source| ScanError::RootUnreadable { source })?;
        info!(root = %root.display(), classes = paths.len(), "scanning");
        Ok(ScanSequence {
            scanner: *self,
            paths: paths.into_iter(),
        })
    }

    /// Read and decode the class file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded.
    pub fn target_from_path(&self, path: &Path) -> Result<TransformTarget, ScanError> {
        let relative = relative_slash_path(&self.settings.root, path)
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path).map_err(|source| ScanError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.target(path.to_path_buf(), relative, bytes)
    }

    /// Decode `bytes` as the class file at `relative` (below the scan root).
    ///
    /// # Errors
    /// Returns [`ScanError::Malformed`] if the bytes are not a valid class file.
    pub fn target_from_bytes(
        &self,
        relative: &str,
        bytes: Vec<u8>,
    ) -> Result<TransformTarget, ScanError> {
        self.target(self.settings.root.join(relative), relative.to_owned(), bytes)
    }

    fn target(
        &self,
        path: PathBuf,
        relative: String,
        bytes: Vec<u8>,
    ) -> Result<TransformTarget, ScanError> {
        let malformed = |source: ClassFileError| ScanError::Malformed {
            path: path.display().to_string(),
            source,
        };
        let class = ClassFile::parse(&bytes).map_err(malformed)?;
        let name = class.name().map_err(malformed)?.to_owned();

        let eligible = self.settings.patterns.matches(&relative) && name != self.settings.probe.owner;
        let points = if eligible {
            self.points(&class).map_err(malformed)?
        } else {
            Vec::new()
        };
        let markers = class.count_attributes(MARKER_ATTRIBUTE);
        debug!(class = %name, points = points.len(), markers, eligible, "scanned class");

        Ok(TransformTarget {
            artifact: Arc::new(ClassArtifact {
                name,
                path,
                relative,
                bytes,
            }),
            class,
            points,
            markers,
        })
    }

    /// One point per method matched by any rule.
    ///
    /// Names are compared as raw modified UTF-8, so methods whose names are
    /// not valid UTF-8 (supplementary characters, NUL) never match and are
    /// skipped instead of failing the class.
    fn points(&self, class: &ClassFile) -> Result<Vec<InstrumentationPoint>, ClassFileError> {
        let pool = &class.constant_pool;
        let mut points = Vec::new();
        for (method_index, method) in class.methods.iter().enumerate() {
            let name = pool.utf8_bytes(method.name_index)?;
            let descriptor = pool.utf8_bytes(method.descriptor_index)?;
            if !self
                .settings
                .rules
                .iter()
                .any(|rule| rule_matches(rule, name, descriptor, class))
            {
                continue;
            }
            // The name equals rule text; only a descriptor naming a class
            // outside the BMP can still fail to decode.
            let name = String::from_utf8_lossy(name).into_owned();
            let descriptor = String::from_utf8_lossy(descriptor).into_owned();

            let code = method
                .attribute(pool, "Code")
                .map(|a| CodeAttribute::parse(&a.info))
                .transpose()?;
            let (code_length, return_offsets, already_probed) = match &code {
                Some(code) => (
                    u32::try_from(code.code.len()).unwrap_or(u32::MAX),
                    return_offsets(&code.code),
                    self.settings.probe.is_called_at_start(&code.code, pool),
                ),
                None => (0, Vec::new(), false),
            };

            points.push(InstrumentationPoint {
                method_index,
                name,
                descriptor,
                access_flags: method.access_flags,
                entry_offset: 0,
                code_length,
                return_offsets,
                has_code: code.is_some(),
                already_probed,
            });
        }
        Ok(points)
    }
}

fn rule_matches(rule: &MatchRule, name: &[u8], descriptor: &[u8], class: &ClassFile) -> bool {
    rule.name.as_bytes() == name
        && rule.descriptor.as_deref().map_or(true, |d| d.as_bytes() == descriptor)
        && rule.implements.as_deref().map_or(true, |i| class.implements(i))
}

/// Offsets of return instructions, up to the first undecodable byte.
fn return_offsets(code: &[u8]) -> Vec<u32> {
    Instructions::new(code)
        .map_while(Result::ok)
        .filter(|i| is_return(i.opcode))
        .filter_map(|i| u32::try_from(i.offset).ok())
        .collect()
}

/// Lazily decoded scan results, in sorted path order.
#[derive(Debug)]
pub struct ScanSequence<'a> {
    scanner: Scanner<'a>,
    paths: std::vec::IntoIter<PathBuf>,
}

impl Iterator for ScanSequence<'_> {
    type Item = Result<TransformTarget, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(self.scanner.target_from_path(&path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for ScanSequence<'_> {}
