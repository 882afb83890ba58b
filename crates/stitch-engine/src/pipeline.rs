//! Pipeline Coordinator: scan, rewrite and re-emit a class directory.
//!
//! One run walks `Idle -> Scanning -> Rewriting -> Finalizing -> Done`.
//! Fatal errors move it to `Failed` from any active state. Output goes to a
//! staging directory next to the output and replaces it only when
//! finalizing succeeds.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, warn};

use crate::artifact::{RewriteResult, TransformTarget};
use crate::error::EngineError;
use crate::report::{BuildReport, Failure, REPORT_FILE};
use crate::rewrite::Rewriter;
use crate::scan::Scanner;
use crate::settings::Settings;

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Scanning,
    Rewriting,
    Finalizing,
    Done,
    Failed,
}

impl PipelineState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use PipelineState::{Done, Failed, Finalizing, Idle, Rewriting, Scanning};
        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, Rewriting)
                | (Rewriting, Finalizing)
                | (Finalizing, Done)
                | (Idle | Scanning | Rewriting | Finalizing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Scanning => "SCANNING",
            Self::Rewriting => "REWRITING",
            Self::Finalizing => "FINALIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    /// Time since the run started.
    pub elapsed: Duration,
}

/// Drives one scan-rewrite-emit run over a class directory.
#[derive(Debug)]
pub struct Coordinator {
    settings: Settings,
    state: PipelineState,
    history: Vec<Transition>,
    results: Vec<RewriteResult>,
    started: Option<Instant>,
}

impl Coordinator {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: PipelineState::Idle,
            history: Vec::new(),
            results: Vec::new(),
            started: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// One result per dispatched artifact, in scan order.
    pub fn results(&self) -> &[RewriteResult] {
        &self.results
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run the pipeline to completion.
    ///
    /// Artifact-level failures do not fail the run: they are collected in
    /// the returned report, which is then marked incomplete.
    ///
    /// # Errors
    /// Returns an error (and ends in `Failed`) if the scan root cannot be
    /// listed, the deadline passes, or the output cannot be written.
    pub fn run(&mut self) -> Result<BuildReport, EngineError> {
        if self.state != PipelineState::Idle {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: PipelineState::Scanning.to_string(),
            });
        }
        let started = Instant::now();
        self.started = Some(started);
        let deadline = self.settings.timeout.map(|t| started + t);
        let staging = staging_dir(&self.settings.output);

        match self.run_phases(deadline, &staging) {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(error = %e, state = %self.state, "pipeline failed");
                if let Err(cleanup) = stitch_util::fs::remove_dir_all_if_exists(&staging) {
                    warn!(error = %cleanup, "cannot remove staging directory");
                }
                self.advance(PipelineState::Failed)?;
                Err(e)
            }
        }
    }

    fn run_phases(
        &mut self,
        deadline: Option<Instant>,
        staging: &Path,
    ) -> Result<BuildReport, EngineError> {
        let settings = self.settings.clone();
        let mut report = BuildReport::new(settings.target.to_string(), settings.probe.to_string());

        // The output directory is replaced wholesale at the end.
        stitch_config::check_disjoint(&settings.root, &settings.output)?;

        // Scanning: drain the whole sequence before any rewriting starts.
        let sequence = Scanner::new(&settings).scan()?;
        self.advance(PipelineState::Scanning)?;
        let mut targets: Vec<TransformTarget> = Vec::with_capacity(sequence.len());
        let mut seen: HashMap<String, String> = HashMap::new();
        for item in sequence {
            report.summary.scanned = report.summary.scanned.saturating_add(1);
            match item {
                Ok(target) => {
                    let artifact = &target.artifact;
                    if let Some(first) = seen.get(&artifact.name) {
                        warn!(class = %artifact.name, path = %artifact.relative, "duplicate class");
                        report.fail(Failure::duplicate(&artifact.name, &artifact.relative, first));
                        continue;
                    }
                    seen.insert(artifact.name.clone(), artifact.relative.clone());
                    targets.push(target);
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable class");
                    report.fail(Failure::from_scan(&e));
                }
            }
        }
        info!(targets = targets.len(), failed = report.failures.len(), "scan complete");

        // Rewriting.
        self.advance(PipelineState::Rewriting)?;
        let rewriter = Rewriter::new(settings.probe.clone(), settings.target);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_count())
            .build()
            .map_err(|e| EngineError::WorkerPool {
                message: e.to_string(),
            })?;
        let dispatched = targets.len();
        let rewritten: Vec<Option<RewriteResult>> = pool.install(|| {
            targets
                .into_par_iter()
                .map(|target| {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return None;
                    }
                    Some(rewriter.rewrite(target))
                })
                .collect()
        });
        let results: Vec<RewriteResult> = rewritten.into_iter().flatten().collect();
        let refused = dispatched.saturating_sub(results.len());
        if refused > 0 {
            self.results = results;
            return Err(EngineError::Timeout {
                secs: settings.timeout.map_or(0, |t| t.as_secs()),
                refused,
            });
        }

        for result in &results {
            match &result.outcome {
                Ok(rewritten) => report.record(&result.artifact, rewritten),
                Err(e) => {
                    warn!(class = %result.artifact.name, error = %e, "rewrite failed");
                    report.fail(Failure::from_rewrite(
                        &result.artifact.name,
                        &result.artifact.relative,
                        e,
                    ));
                }
            }
        }
        info!(
            instrumented = report.summary.instrumented,
            methods = report.summary.methods,
            failed = report.summary.failed,
            "rewrite complete"
        );

        self.advance(PipelineState::Finalizing)?;
        let emitted = emit(
            &pool,
            &results,
            &report,
            &settings.root,
            staging,
            &settings.output,
        );
        self.results = results;
        emitted?;
        self.advance(PipelineState::Done)?;
        info!(output = %settings.output.display(), "output written");
        Ok(report)
    }

    fn advance(&mut self, to: PipelineState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.history.push(Transition {
            from: self.state,
            to,
            elapsed,
        });
        self.state = to;
        Ok(())
    }
}

/// Write successful artifacts to `staging`, then move it to `output`.
///
/// Files under `root` that are not classes are copied through unchanged.
/// An incomplete run also gets a `stitch-report.toml` listing its failures.
fn emit(
    pool: &rayon::ThreadPool,
    results: &[RewriteResult],
    report: &BuildReport,
    root: &Path,
    staging: &Path,
    output: &Path,
) -> Result<(), EngineError> {
    stitch_util::fs::remove_dir_all_if_exists(staging)?;
    stitch_util::fs::ensure_dir(staging)?;
    let resources = stitch_util::fs::collect_files_except(root, "class")?;
    pool.install(|| {
        resources
            .par_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(root).ok()?;
                Some(stitch_util::fs::copy_file(path, &staging.join(relative)))
            })
            .collect::<Result<Vec<()>, _>>()
    })?;
    debug!(resources = resources.len(), "resources copied");
    pool.install(|| {
        results
            .par_iter()
            .filter_map(|result| {
                let rewritten = result.outcome.as_ref().ok()?;
                let path = staging.join(&result.artifact.relative);
                Some(stitch_util::fs::write_file(&path, &rewritten.bytes))
            })
            .collect::<Result<Vec<()>, _>>()
    })?;
    if !report.complete {
        stitch_util::fs::write_file(&staging.join(REPORT_FILE), report.to_toml()?.as_bytes())?;
    }
    stitch_util::fs::replace_dir(staging, output)?;
    Ok(())
}

/// Sibling of `output` used while writing: `.<name>.stitch-staging`.
fn staging_dir(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    output.with_file_name(format!(".{name}.stitch-staging"))
}
