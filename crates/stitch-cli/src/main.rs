#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use stitch_engine::report::BuildReport;
use stitch_engine::{BuildPlugin, EngineError, HostContext, InstrumentPlugin, MANIFEST_FILE};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "stitch", about = "Bytecode instrumentation for compiled JVM classes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a starter stitch.toml in the current directory
    Init {
        /// Reference a built-in preset instead of spelling out the probe
        #[arg(long)]
        preset: Option<String>,
    },
    /// Instrument the configured class directory
    Instrument {
        /// Number of rewrite workers (defaults to available parallelism)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Fail if rewriting has not finished after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the build report as JSON on stdout
        #[arg(long)]
        json: bool,
        /// Log every artifact
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// List the methods that would be instrumented, without writing anything
    Scan {
        /// Print the matches as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Remove the instrumented output directory
    Clean,
}

fn main() {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Command::Instrument { verbose: true, .. });
    init_logging(verbose);

    let result = std::env::current_dir()
        .map_err(Box::<dyn Error>::from)
        .and_then(|cwd| match cli.command {
            Command::Init { preset } => cmd_init(&cwd, preset.as_deref()),
            Command::Instrument {
                jobs,
                timeout,
                json,
                verbose: _,
            } => cmd_instrument(&cwd, jobs, timeout, json),
            Command::Scan { json } => cmd_scan(&cwd, json),
            Command::Clean => cmd_clean(&cwd),
        });

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

/// Install the tracing subscriber. `STITCH_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("STITCH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Check that `dir` holds a `stitch.toml`.
fn project_root(dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    if !dir.join(MANIFEST_FILE).exists() {
        return Err(
            "no stitch.toml found in current directory; run `stitch init` to create one".into(),
        );
    }
    Ok(dir.to_path_buf())
}

fn cmd_init(dir: &Path, preset: Option<&str>) -> CliResult {
    stitch_engine::init_project(dir, preset)?;

    eprintln!("     Created {}", dir.join(MANIFEST_FILE).display());
    eprintln!();
    eprintln!("  Point `input` at your compiled classes, then run:");
    eprintln!("    stitch instrument");
    Ok(())
}

fn cmd_instrument(dir: &Path, jobs: Option<usize>, timeout: Option<u64>, json: bool) -> CliResult {
    let root = project_root(dir)?;
    let host = HostContext {
        jobs,
        timeout: timeout.map(Duration::from_secs),
        ..HostContext::new(root)
    };

    let started = Instant::now();
    let mut plugin = InstrumentPlugin::new();
    plugin.apply(&host)?;
    if let Some(settings) = plugin.settings() {
        eprintln!(
            "    Scanning {} ({} rule(s), probe {})",
            settings.root.display(),
            settings.rules.len(),
            settings.probe
        );
    }

    match plugin.execute() {
        Ok(report) => {
            print_report(&report, json)?;
            eprintln!(
                "    Finished in {:.2}s",
                started.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Err(EngineError::ArtifactsFailed { report }) => {
            print_report(&report, json)?;
            for failure in &report.failures {
                match failure.offset {
                    Some(offset) => eprintln!(
                        "      Failed {} at offset {offset}: {}",
                        failure.path, failure.reason
                    ),
                    None => eprintln!("      Failed {}: {}", failure.path, failure.reason),
                }
            }
            Err(EngineError::ArtifactsFailed { report }.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &BuildReport, json: bool) -> CliResult {
    let summary = &report.summary;
    eprintln!(
        "Instrumented {} class(es), {} method(s); {} unchanged, {} already instrumented",
        summary.instrumented, summary.methods, summary.unchanged, summary.already_instrumented
    );
    if json {
        println!("{}", report.to_json()?);
    }
    Ok(())
}

fn cmd_scan(dir: &Path, json: bool) -> CliResult {
    let root = project_root(dir)?;
    let mut plugin = InstrumentPlugin::new();
    plugin.apply(&HostContext::new(root))?;
    let settings = plugin
        .settings()
        .ok_or("plugin settings unavailable after apply")?;

    let mut matches = Vec::new();
    let mut skipped = 0usize;
    for item in stitch_engine::Scanner::new(settings).scan()? {
        match item {
            Ok(target) => {
                for point in &target.points {
                    if !json {
                        eprintln!("     Matched {}.{}", target.artifact.name, point.signature());
                    }
                    matches.push(serde_json::json!({
                        "class": target.artifact.name,
                        "path": target.artifact.relative,
                        "method": point.signature(),
                        "already-probed": point.already_probed,
                    }));
                }
            }
            Err(e) => {
                skipped = skipped.saturating_add(1);
                eprintln!("     Skipped {e}");
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    }
    eprintln!("{} method(s) matched, {skipped} file(s) skipped", matches.len());
    Ok(())
}

fn cmd_clean(dir: &Path) -> CliResult {
    let root = project_root(dir)?;
    let mut plugin = InstrumentPlugin::new();
    plugin.apply(&HostContext::new(root))?;
    let output = plugin
        .settings()
        .map(|s| s.output.clone())
        .ok_or("plugin settings unavailable after apply")?;

    stitch_util::fs::remove_dir_all_if_exists(&output)?;

    eprintln!("    Cleaned {}", output.display());
    Ok(())
}
