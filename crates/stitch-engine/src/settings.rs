//! Resolved run settings: the manifest, its preset and host overrides merged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use stitch_config::{check_disjoint, Manifest, MatchRule};
use stitch_targets::JvmTarget;
use stitch_util::fs::normalize_lexical;
use stitch_util::pattern::PatternSet;

use crate::error::EngineError;
use crate::preset::find_preset;
use crate::probe::ProbeSpec;

/// Everything a scan-and-rewrite run needs.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory of compiled classes to scan.
    pub root: PathBuf,
    /// Directory receiving the instrumented tree.
    pub output: PathBuf,
    pub patterns: PatternSet,
    pub rules: Vec<MatchRule>,
    pub probe: ProbeSpec,
    pub target: JvmTarget,
    /// Rewrite workers; `None` uses the available parallelism.
    pub jobs: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Settings {
    /// Resolve `manifest` against `project_root`.
    ///
    /// A preset contributes its probe (unless the manifest names one) and its
    /// match rules, ahead of the manifest's own.
    ///
    /// Both directories are resolved lexically; `output` may not be `input`,
    /// nor nest with it either way.
    ///
    /// # Errors
    /// Returns an error if the manifest is invalid, names an unknown preset,
    /// ends up without a probe, or its directories overlap.
    pub fn resolve(project_root: &Path, manifest: &Manifest) -> Result<Self, EngineError> {
        manifest.validate()?;
        let instrument = &manifest.instrument;

        let preset = instrument
            .preset
            .as_deref()
            .map(find_preset)
            .transpose()?;

        let probe = manifest
            .probe
            .as_ref()
            .or(preset.as_ref().map(|p| &p.probe))
            .map(ProbeSpec::from)
            .ok_or(EngineError::MissingProbe)?;

        let mut rules = preset.map(|p| p.matches).unwrap_or_default();
        rules.extend(manifest.matches.iter().cloned());

        let root = normalize_lexical(&project_root.join(&instrument.input));
        let output = normalize_lexical(&project_root.join(&instrument.output));
        check_disjoint(&root, &output)?;

        Ok(Self {
            root,
            output,
            patterns: manifest.patterns()?,
            rules,
            probe,
            target: manifest.jvm_target()?,
            jobs: instrument.jobs,
            timeout: instrument.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Number of rewrite workers to start.
    pub fn worker_count(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}
