use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use live_script::args::parse_arg_pairs;
use live_script::catalog::{CatalogState, ClusterState};
use live_script::notify::{Notification, Notifier};
use live_script::pxl::PxlClassifier;
use live_script::route::MemoryRoute;
use live_script::telemetry::{JsonlTelemetry, LogTelemetry, Telemetry};
use live_script::transport::{Scenario, ScriptedTransport};
use live_script::{spawn_controller, ControllerConfig, Dependencies, ResultsStore};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser)]
#[command(
    name = "live-script",
    version,
    about = "Run a live script against a replayed execution transport"
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select a script from a scenario file, execute it, and print the results
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Scenario JSON: cluster, script catalog, selection and recorded events
    pub scenario: PathBuf,

    /// Script to run instead of the scenario's selection
    #[arg(long)]
    pub script_id: Option<String>,

    /// Script argument as NAME=VALUE; repeat a name to pass a list
    #[arg(long = "arg", value_name = "NAME=VALUE")]
    pub args: Vec<String>,

    /// Treat the run as user-triggered (enables mutation retries)
    #[arg(long)]
    pub manual: bool,

    /// Print the results snapshot as JSON
    #[arg(long)]
    pub json: bool,

    /// Cancel the execution if it has not finished after this long
    #[arg(long, default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Controller config file (defaults to the per-user config if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append telemetry events to this JSONL file instead of the log
    #[arg(long)]
    pub telemetry_file: Option<PathBuf>,
}

pub fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

/// Prints notifications on stderr.
struct CliNotifier {
    out_tx: mpsc::UnboundedSender<OutputLine>,
}

impl Notifier for CliNotifier {
    fn show(&self, notification: Notification) {
        let _ = self.out_tx.send(OutputLine::Stderr(format!(
            "error: {} [{}]",
            notification.message, notification.action_title
        )));
    }
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config =
        ControllerConfig::load(args.config.as_deref()).context("failed to load controller config")?;
    let raw = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read {}", args.scenario.display()))?;
    let scenario = Scenario::from_json(&raw)
        .with_context(|| format!("invalid scenario {}", args.scenario.display()))?;

    let mut script_args = scenario.args.clone();
    script_args.extend(parse_arg_pairs(args.args.iter().map(String::as_str))?);
    let script_id = args
        .script_id
        .clone()
        .unwrap_or_else(|| scenario.script_id.clone());
    let script = scenario
        .scripts
        .iter()
        .find(|s| s.id == script_id)
        .cloned()
        .with_context(|| format!("scenario has no script '{script_id}'"))?;

    let (out_tx, out_handle) = spawn_output_writer();
    let (telemetry, telemetry_handle): (Arc<dyn Telemetry>, _) = match args.telemetry_file.clone() {
        Some(path) => {
            let (t, h) = JsonlTelemetry::spawn(path);
            (Arc::new(t), Some(h))
        }
        None => (Arc::new(LogTelemetry), None),
    };

    // Collaborators start out loading, like a freshly opened view.
    let (cluster_tx, cluster_rx) = watch::channel(ClusterState::loading());
    let (catalog_tx, catalog_rx) = watch::channel(CatalogState::loading());
    let results = ResultsStore::new();
    let deps = Dependencies {
        transport: Some(Arc::new(ScriptedTransport::new(scenario.runs.clone()))),
        cluster: cluster_rx,
        catalog: catalog_rx,
        results: results.clone(),
        route: Arc::new(MemoryRoute::default()),
        telemetry: telemetry.clone(),
        notifier: Arc::new(CliNotifier {
            out_tx: out_tx.clone(),
        }),
        classifier: Arc::new(PxlClassifier),
        embed: scenario.embed.clone(),
    };
    let (handle, task) = spawn_controller(config, deps);

    if args.manual {
        handle.set_script_and_args_manually(script, Some(script_args))?;
    } else {
        handle.route_changed(&script_id, script_args)?;
    }
    handle.execute()?;

    cluster_tx.send_replace(ClusterState::connected(scenario.cluster.clone()));
    catalog_tx.send_replace(CatalogState::loaded(scenario.scripts.clone()));

    let mut view_rx = handle.subscribe();
    let mut results_rx = results.subscribe();
    let deadline = tokio::time::sleep(Duration::from(args.timeout));
    tokio::pin!(deadline);
    loop {
        let view = handle.view();
        let started = view.executions > 0;
        let rejected = !view.awaiting_execution && !started && results.error().is_some();
        if (started && !view.executing) || rejected {
            break;
        }
        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = results_rx.changed() => {}
            _ = tokio::signal::ctrl_c() => {
                let _ = out_tx.send(OutputLine::Stderr("Cancelling…".into()));
                handle.cancel_execution()?;
                break;
            }
            _ = &mut deadline => {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "Timed out after {}; cancelling",
                    args.timeout
                )));
                handle.cancel_execution()?;
                break;
            }
        }
    }

    // Let the controller apply any pending cancel before reading the final state.
    let _ = handle.dispose();
    task.await.context("controller task failed")??;

    let snapshot = results.snapshot();
    if args.json {
        let out = serde_json::to_string_pretty(&*snapshot)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_text_summary(&script_id, &snapshot);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(telemetry);
    if let Some(h) = telemetry_handle {
        let _ = h.await;
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
