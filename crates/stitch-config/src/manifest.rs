use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use stitch_classfile::MethodDescriptor;
use stitch_targets::JvmTarget;
use stitch_util::fs::normalize_lexical;
use stitch_util::pattern::PatternSet;

/// The `stitch.toml` plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub instrument: Instrument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<Probe>,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<MatchRule>,
}

/// The `[instrument]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Instrument {
    /// Highest JVM release whose class files may be rewritten.
    #[serde(default = "default_jvm_target")]
    pub jvm_target: String,
    /// Scan root, relative to the project root.
    #[serde(default = "default_input")]
    pub input: String,
    /// Output directory, relative to the project root.
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Built-in preset supplying a probe and match rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            jvm_target: default_jvm_target(),
            input: default_input(),
            output: default_output(),
            include: default_include(),
            exclude: Vec::new(),
            preset: None,
            jobs: None,
            timeout_secs: None,
        }
    }
}

fn default_jvm_target() -> String {
    "1.8".to_owned()
}

fn default_input() -> String {
    "build/classes".to_owned()
}

fn default_output() -> String {
    "build/instrumented".to_owned()
}

fn default_include() -> Vec<String> {
    vec!["**/*.class".to_owned()]
}

/// What the injected prologue does with the probe's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// `()Z` probe; the method returns early when it yields `true`.
    #[default]
    Guard,
    /// `()V` probe called unconditionally on entry.
    Enter,
}

impl ProbeKind {
    /// Descriptor the probe method must have.
    pub fn descriptor(self) -> &'static str {
        match self {
            Self::Guard => "()Z",
            Self::Enter => "()V",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guard => f.write_str("guard"),
            Self::Enter => f.write_str("enter"),
        }
    }
}

/// The `[probe]` section: the static method called from instrumented code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Probe {
    /// Owner class, internal (`org/example/Util`) or dotted form.
    pub owner: String,
    pub method: String,
    #[serde(default)]
    pub kind: ProbeKind,
}

/// One `[[match]]` rule selecting methods to instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
    /// Interface the declaring class must list directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<String>,
}

impl Manifest {
    /// Read, parse and validate a `stitch.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, contains invalid TOML,
    /// or fails validation.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse and validate manifest text. `origin` names the source in errors.
    ///
    /// Class names given in dotted form are normalized to internal form.
    ///
    /// # Errors
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn parse(content: &str, origin: &str) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = toml::from_str(content).map_err(|e| ManifestError::Parse {
            path: origin.to_owned(),
            source: e,
        })?;
        manifest.normalize();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Render as TOML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ManifestError> {
        toml::to_string_pretty(self).map_err(|e| ManifestError::Serialize { source: e })
    }

    /// Write the manifest to disk (write-to-temp-then-rename).
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), ManifestError> {
        let content = self.to_toml()?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, &content).map_err(|e| ManifestError::Write {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| ManifestError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// The configured JVM target.
    ///
    /// # Errors
    /// Returns an error if `jvm-target` is not a known release.
    pub fn jvm_target(&self) -> Result<JvmTarget, ManifestError> {
        self.instrument
            .jvm_target
            .parse()
            .map_err(|e: stitch_targets::TargetError| ManifestError::Invalid {
                reason: e.to_string(),
            })
    }

    /// Include/exclude globs compiled into a matcher.
    ///
    /// # Errors
    /// Returns an error if a pattern is invalid.
    pub fn patterns(&self) -> Result<PatternSet, ManifestError> {
        PatternSet::new(&self.instrument.include, &self.instrument.exclude).map_err(|e| {
            ManifestError::Invalid {
                reason: e.to_string(),
            }
        })
    }

    fn normalize(&mut self) {
        if let Some(probe) = &mut self.probe {
            probe.owner = internal_name(&probe.owner);
        }
        for rule in &mut self.matches {
            if let Some(interface) = &mut rule.implements {
                *interface = internal_name(interface);
            }
        }
    }

    /// Check the manifest for semantic errors.
    ///
    /// # Errors
    /// Returns [`ManifestError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ManifestError> {
        self.jvm_target()?;
        self.patterns()?;

        let instrument = &self.instrument;
        if instrument.jobs == Some(0) {
            return Err(invalid("`jobs` must be at least 1"));
        }
        if instrument.timeout_secs == Some(0) {
            return Err(invalid("`timeout-secs` must be at least 1"));
        }
        if let Some(preset) = &instrument.preset {
            if preset.trim().is_empty() {
                return Err(invalid("`preset` must not be empty"));
            }
        }
        validate_directories(&instrument.input, &instrument.output)?;

        match &self.probe {
            Some(probe) => probe.validate()?,
            None if instrument.preset.is_none() => {
                return Err(invalid("missing [probe] section (or an [instrument] preset)"));
            }
            None => {}
        }
        if self.matches.is_empty() && instrument.preset.is_none() {
            return Err(invalid("at least one [[match]] rule is required"));
        }
        for rule in &self.matches {
            rule.validate()?;
        }
        Ok(())
    }
}

impl Probe {
    fn validate(&self) -> Result<(), ManifestError> {
        if !is_valid_class_name(&self.owner) {
            return Err(invalid(&format!(
                "probe owner `{}` is not a valid class name",
                self.owner
            )));
        }
        if !is_valid_method_name(&self.method) {
            return Err(invalid(&format!(
                "probe method `{}` is not a valid method name",
                self.method
            )));
        }
        Ok(())
    }
}

impl MatchRule {
    fn validate(&self) -> Result<(), ManifestError> {
        if !is_valid_method_name(&self.name) && self.name != "<init>" {
            return Err(invalid(&format!(
                "match name `{}` is not a valid method name",
                self.name
            )));
        }
        if let Some(descriptor) = &self.descriptor {
            MethodDescriptor::parse(descriptor).map_err(|e| ManifestError::Invalid {
                reason: format!("match `{}`: {e}", self.name),
            })?;
        }
        if let Some(interface) = &self.implements {
            if !is_valid_class_name(interface) {
                return Err(invalid(&format!(
                    "match `{}`: `{interface}` is not a valid class name",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ManifestError {
    ManifestError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Convert `org.example.Util` to `org/example/Util`.
fn internal_name(name: &str) -> String {
    name.trim().replace('.', "/")
}

fn is_valid_class_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('/').all(|segment| {
            !segment.is_empty() && !segment.contains([';', '[', '.', '<', '>'])
        })
}

fn is_valid_method_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['.', ';', '[', '/', '<', '>'])
}

fn validate_directories(input: &str, output: &str) -> Result<(), ManifestError> {
    let input_path = normalize_lexical(Path::new(input));
    let output_path = normalize_lexical(Path::new(output));
    if input_path.as_os_str().is_empty() {
        return Err(invalid("`input` must not be the project root"));
    }
    if output_path.as_os_str().is_empty() {
        return Err(invalid("`output` must not be the project root"));
    }
    check_disjoint(&input_path, &output_path)
}

/// Reject an `output` that is `input`, lies inside it, or contains it.
///
/// Both paths are compared after lexical normalization, so callers holding
/// absolute paths (an `input` outside the project, say) get the same check.
///
/// # Errors
/// Returns [`ManifestError::Invalid`] if the directories overlap.
pub fn check_disjoint(input: &Path, output: &Path) -> Result<(), ManifestError> {
    let input = normalize_lexical(input);
    let output = normalize_lexical(output);
    if input == output {
        return Err(invalid(&format!(
            "`output` ({}) must not be the `input` directory",
            output.display()
        )));
    }
    if output.starts_with(&input) {
        return Err(invalid(&format!(
            "`output` ({}) must not be inside `input` ({})",
            output.display(),
            input.display()
        )));
    }
    if input.starts_with(&output) {
        return Err(invalid(&format!(
            "`input` ({}) must not be inside `output` ({})",
            input.display(),
            output.display()
        )));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid stitch.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid stitch.toml: {reason}")]
    Invalid { reason: String },
    #[error("cannot serialize stitch.toml: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}
