//! Build-host integration.
//!
//! A host (the `stitch` CLI, or any build tool embedding the engine) applies
//! the plugin once at configuration time and then executes it once per task.

use std::path::PathBuf;
use std::time::Duration;

use stitch_config::Manifest;
use tracing::info;

use crate::error::EngineError;
use crate::pipeline::{Coordinator, Transition};
use crate::report::BuildReport;
use crate::settings::Settings;

/// Name of the project manifest.
pub const MANIFEST_FILE: &str = "stitch.toml";

/// What the host knows about the project being built.
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    pub project_root: PathBuf,
    /// Overrides `jobs` from the manifest.
    pub jobs: Option<usize>,
    /// Overrides `timeout-secs` from the manifest.
    pub timeout: Option<Duration>,
}

impl HostContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }
}

/// A plugin driven by a build host.
pub trait BuildPlugin {
    fn name(&self) -> &str;

    /// Read and validate configuration. Called once, before any `execute`.
    ///
    /// # Errors
    /// Returns an error if the plugin's configuration is missing or invalid.
    fn apply(&mut self, host: &HostContext) -> Result<(), EngineError>;

    /// Run the plugin's task.
    ///
    /// # Errors
    /// Returns an error if the plugin was not applied or the task fails.
    fn execute(&mut self) -> Result<BuildReport, EngineError>;
}

/// Scans, rewrites and re-emits the project's compiled classes.
#[derive(Debug, Default)]
pub struct InstrumentPlugin {
    settings: Option<Settings>,
    history: Vec<Transition>,
}

impl InstrumentPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings resolved by [`BuildPlugin::apply`].
    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// State transitions of the most recent `execute`.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }
}

impl BuildPlugin for InstrumentPlugin {
    fn name(&self) -> &str {
        "stitch"
    }

    fn apply(&mut self, host: &HostContext) -> Result<(), EngineError> {
        let manifest = Manifest::from_path(&host.project_root.join(MANIFEST_FILE))?;
        let mut settings = Settings::resolve(&host.project_root, &manifest)?;
        if host.jobs.is_some() {
            settings.jobs = host.jobs;
        }
        if host.timeout.is_some() {
            settings.timeout = host.timeout;
        }
        info!(
            input = %settings.root.display(),
            output = %settings.output.display(),
            probe = %settings.probe,
            rules = settings.rules.len(),
            "plugin applied"
        );
        self.settings = Some(settings);
        Ok(())
    }

    /// Run one pipeline over the configured class directory.
    ///
    /// A run that finishes with artifact failures still writes the successful
    /// artifacts, then returns [`EngineError::ArtifactsFailed`].
    fn execute(&mut self) -> Result<BuildReport, EngineError> {
        let settings = self.settings.clone().ok_or_else(|| EngineError::NotApplied {
            plugin: self.name().to_owned(),
        })?;
        let mut coordinator = Coordinator::new(settings);
        let outcome = coordinator.run();
        self.history = coordinator.history().to_vec();
        let report = outcome?;
        if report.has_failures() {
            return Err(EngineError::ArtifactsFailed {
                report: Box::new(report),
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{listener, write_class, ClassSpec, MethodSpec, LISTENER, ON_CLICK};
    use crate::pipeline::PipelineState;

    const MANIFEST: &str = r#"
[instrument]
input = "build/classes"
output = "build/instrumented"

[probe]
owner = "org.example.FastClickUtil"
method = "isFastDoubleClick"

[[match]]
name = "onClick"
descriptor = "(Landroid/view/View;)V"
implements = "android/view/View$OnClickListener"
"#;

    fn project() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), MANIFEST).unwrap();
        std::fs::create_dir_all(tmp.path().join("build/classes")).unwrap();
        tmp
    }

    #[test]
    fn execute_before_apply_fails() {
        let mut plugin = InstrumentPlugin::new();
        let err = plugin.execute().unwrap_err();
        assert!(matches!(err, EngineError::NotApplied { .. }), "{err}");
        assert!(err.to_string().contains("stitch"));
    }

    #[test]
    fn apply_reads_manifest_and_host_overrides() {
        let tmp = project();
        let host = HostContext {
            jobs: Some(1),
            timeout: Some(Duration::from_secs(30)),
            ..HostContext::new(tmp.path())
        };
        let mut plugin = InstrumentPlugin::new();
        plugin.apply(&host).unwrap_or_else(|e| panic!("{e}"));
        let settings = plugin.settings().unwrap();
        assert_eq!(settings.root, tmp.path().join("build/classes"));
        assert_eq!(settings.probe.owner, "org/example/FastClickUtil");
        assert_eq!(settings.jobs, Some(1));
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn apply_without_manifest_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut plugin = InstrumentPlugin::new();
        let err = plugin.apply(&HostContext::new(tmp.path())).unwrap_err();
        assert!(matches!(err, EngineError::Manifest(_)), "{err}");
    }

    #[test]
    fn execute_instruments_project() {
        let tmp = project();
        write_class(&tmp.path().join("build/classes"), &listener("app/Main"));
        let mut plugin = InstrumentPlugin::new();
        plugin.apply(&HostContext::new(tmp.path())).unwrap();
        let report = plugin.execute().unwrap_or_else(|e| panic!("{e}"));
        assert!(report.complete);
        assert_eq!(report.summary.instrumented, 1);
        assert_eq!(
            plugin.history().last().map(|t| t.to),
            Some(PipelineState::Done)
        );
        assert!(tmp.path().join("build/instrumented/app/Main.class").is_file());
    }

    #[test]
    fn artifact_failures_surface_with_report() {
        let tmp = project();
        let classes = tmp.path().join("build/classes");
        write_class(&classes, &listener("app/Main"));
        write_class(
            &classes,
            &ClassSpec::new("app/Base")
                .implements(LISTENER)
                .method(MethodSpec::abstract_method("onClick", ON_CLICK)),
        );
        let mut plugin = InstrumentPlugin::new();
        plugin.apply(&HostContext::new(tmp.path())).unwrap();
        match plugin.execute() {
            Err(EngineError::ArtifactsFailed { report }) => {
                assert_eq!(report.summary.instrumented, 1);
                assert_eq!(report.failures.len(), 1);
            }
            other => panic!("expected artifact failures, got {other:?}"),
        }
        assert_eq!(
            plugin.history().last().map(|t| t.to),
            Some(PipelineState::Done)
        );
        assert!(tmp.path().join("build/instrumented/app/Main.class").is_file());
    }
}
