//! The per-run build report written as `stitch-report.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::{ClassArtifact, RewriteStatus, Rewritten};
use crate::error::{EngineError, RewriteError, ScanError};

/// File name of the report inside the output directory.
pub const REPORT_FILE: &str = "stitch-report.toml";

/// Summary of one run: every artifact written and every artifact that failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildReport {
    /// `false` when at least one artifact failed and was left out.
    pub complete: bool,
    pub jvm_target: String,
    /// The probe method, e.g. `org/example/FastClickUtil.isFastDoubleClick()Z`.
    pub probe: String,
    pub summary: Summary,
    #[serde(rename = "artifact", default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(rename = "failure", default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Summary {
    pub scanned: usize,
    pub instrumented: usize,
    pub unchanged: usize,
    pub already_instrumented: usize,
    /// Methods that received a prologue, across all classes.
    pub methods: usize,
    pub failed: usize,
}

/// An artifact written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArtifactEntry {
    pub class: String,
    pub path: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub methods: usize,
    /// SHA-256 of the bytes written.
    pub sha256: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// The phase an artifact failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    Scan,
    Duplicate,
    Rewrite,
}

/// An artifact that was not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Failure {
    pub stage: FailureStage,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    pub reason: String,
}

impl Failure {
    pub fn from_scan(error: &ScanError) -> Self {
        Self {
            stage: FailureStage::Scan,
            path: error.path().unwrap_or_default().to_owned(),
            class: None,
            offset: None,
            reason: error.to_string(),
        }
    }

    pub fn duplicate(class: &str, path: &str, first: &str) -> Self {
        Self {
            stage: FailureStage::Duplicate,
            path: path.to_owned(),
            class: Some(class.to_owned()),
            offset: None,
            reason: format!("duplicate class {class}, first seen at {first}"),
        }
    }

    pub fn from_rewrite(class: &str, path: &str, error: &RewriteError) -> Self {
        Self {
            stage: FailureStage::Rewrite,
            path: path.to_owned(),
            class: Some(class.to_owned()),
            offset: Some(error.offset()),
            reason: error.to_string(),
        }
    }
}

impl BuildReport {
    pub fn new(jvm_target: String, probe: String) -> Self {
        Self {
            complete: true,
            jvm_target,
            probe,
            ..Self::default()
        }
    }

    /// Record an artifact written to the output.
    pub fn record(&mut self, artifact: &ClassArtifact, rewritten: &Rewritten) {
        let methods = match rewritten.status {
            RewriteStatus::Instrumented { methods } => {
                self.summary.instrumented = self.summary.instrumented.saturating_add(1);
                self.summary.methods = self.summary.methods.saturating_add(methods);
                methods
            }
            RewriteStatus::Unchanged => {
                self.summary.unchanged = self.summary.unchanged.saturating_add(1);
                0
            }
            RewriteStatus::AlreadyInstrumented => {
                self.summary.already_instrumented =
                    self.summary.already_instrumented.saturating_add(1);
                0
            }
        };
        self.artifacts.push(ArtifactEntry {
            class: artifact.name.clone(),
            path: artifact.relative.clone(),
            status: rewritten.status.label().to_owned(),
            methods,
            sha256: stitch_util::hash::sha256_bytes(&rewritten.bytes),
        });
    }

    pub fn fail(&mut self, failure: Failure) {
        self.complete = false;
        self.summary.failed = self.summary.failed.saturating_add(1);
        self.failures.push(failure);
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Report {
            message: e.to_string(),
        })
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Report {
            message: e.to_string(),
        })
    }

    /// Read a report written by a previous run.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| EngineError::Report {
            message: format!("{}: {e}", path.display()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn artifact(name: &str) -> ClassArtifact {
        ClassArtifact {
            name: name.to_owned(),
            path: format!("/tmp/{name}.class").into(),
            relative: format!("{name}.class"),
            bytes: vec![0xCA, 0xFE],
        }
    }

    fn rewritten(status: RewriteStatus) -> Rewritten {
        Rewritten {
            bytes: vec![1, 2, 3],
            status,
        }
    }

    fn sample() -> BuildReport {
        let mut report = BuildReport::new("1.8".to_owned(), "a/P.p()Z".to_owned());
        report.record(
            &artifact("a/One"),
            &rewritten(RewriteStatus::Instrumented { methods: 2 }),
        );
        report.record(&artifact("a/Two"), &rewritten(RewriteStatus::Unchanged));
        report.fail(Failure::from_rewrite(
            "a/Three",
            "a/Three.class",
            &RewriteError::NoCode {
                method: "onClick(Landroid/view/View;)V".to_owned(),
                offset: 0,
            },
        ));
        report
    }

    #[test]
    fn summary_counts() {
        let report = sample();
        assert!(!report.complete);
        assert!(report.has_failures());
        assert_eq!(report.summary.instrumented, 1);
        assert_eq!(report.summary.unchanged, 1);
        assert_eq!(report.summary.methods, 2);
        assert_eq!(report.summary.failed, 1);
        let failure = report.failures.first().unwrap();
        assert_eq!(failure.offset, Some(0));
        assert!(failure.reason.contains("abstract"), "{}", failure.reason);
    }

    #[test]
    fn toml_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(REPORT_FILE);
        let report = sample();
        std::fs::write(&path, report.to_toml().unwrap()).unwrap();
        assert_eq!(BuildReport::from_path(&path).unwrap(), report);
    }

    #[test]
    fn toml_layout() {
        let content = sample().to_toml().unwrap();
        assert!(content.contains("complete = false"), "{content}");
        assert!(content.contains("[[artifact]]"), "{content}");
        assert!(content.contains("[[failure]]"), "{content}");
        assert!(content.contains("stage = \"rewrite\""), "{content}");
    }

    #[test]
    fn json_output() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value.get("complete"),
            Some(&serde_json::Value::Bool(false))
        );
        assert_eq!(
            value.pointer("/artifact/0/class").and_then(|v| v.as_str()),
            Some("a/One")
        );
        assert_eq!(
            value.pointer("/failure/0/stage").and_then(|v| v.as_str()),
            Some("rewrite")
        );
    }

    #[test]
    fn scan_failures_keep_path() {
        let error = ScanError::Malformed {
            path: "/x/Bad.class".to_owned(),
            source: stitch_classfile::ClassFileError::BadMagic { found: 0 },
        };
        let failure = Failure::from_scan(&error);
        assert_eq!(failure.stage, FailureStage::Scan);
        assert_eq!(failure.path, "/x/Bad.class");
        assert!(failure.offset.is_none());
    }
}
