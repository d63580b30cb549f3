mod logging;
mod snapshot;
mod targets;

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use pingwatch_model::{Target, TargetConfig};
use pingwatch_monitor::{
    ProbeOutcome, Publisher, Scheduler, SchedulerSettings, TargetRegistry, TickReport,
    VariableStore,
};
use pingwatch_probe::{parse_latency, PingSettings, ProbeRunner, SystemPingRunner};
use serde::Serialize;
use snapshot::SnapshotStore;
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "pingwatch", version, about = "Periodic reachability and latency monitor")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Watch(WatchArgs),
    Probe(ProbeArgs),
    Parse(ParseArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// File with one target per line: `address` or `id address`.
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Extra target, `address` or `id=address`. May be repeated.
    #[arg(long = "target")]
    target_list: Vec<String>,

    /// Per-probe timeout; `watch` requires it to be below the interval.
    #[arg(long, default_value_t = 800)]
    timeout_ms: u64,

    #[arg(long, default_value = "ping")]
    ping_program: String,
}

#[derive(Args)]
#[command(about = "Probe all targets every interval and publish their state.")]
struct WatchArgs {
    #[command(flatten)]
    target_args: TargetArgs,

    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Stop after this many ticks; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    count: u64,

    /// Mirror the variable store into this JSON file.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Do not read navigation commands from stdin.
    #[arg(long)]
    no_navigation: bool,
}

#[derive(Args)]
#[command(about = "Probe each target once and print the results as JSON lines.")]
struct ProbeArgs {
    #[command(flatten)]
    target_args: TargetArgs,
}

#[derive(Args)]
#[command(about = "Read ping output and print the round-trip time it reports.")]
struct ParseArgs {
    /// Input file; stdin when omitted.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ProbeLine<'a> {
    id: &'a str,
    address: &'a str,
    observed_at_utc: String,
    reachable: bool,
    latency_ms: Option<f64>,
    detail: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Watch(args) => run_watch(args),
        Commands::Probe(args) => run_probe(args),
        Commands::Parse(args) => run_parse(args),
    }
}

fn build_registry(args: &TargetArgs) -> Result<Arc<TargetRegistry>> {
    let configs: Vec<TargetConfig> =
        targets::load_targets(args.targets.as_deref(), &args.target_list)?;
    let registry = TargetRegistry::new(configs).context("invalid target configuration")?;
    Ok(Arc::new(registry))
}

fn build_runner(args: &TargetArgs) -> Arc<SystemPingRunner> {
    Arc::new(SystemPingRunner::new(PingSettings {
        program: args.ping_program.clone(),
    }))
}

fn run_watch(args: WatchArgs) -> Result<()> {
    if args.interval_ms == 0 {
        return Err(anyhow!("--interval-ms must be greater than zero"));
    }

    let registry = build_registry(&args.target_args)?;
    let runner = build_runner(&args.target_args);
    let store = Arc::new(SnapshotStore::new(args.out.clone()));

    let settings = SchedulerSettings {
        interval: Duration::from_millis(args.interval_ms),
        timeout: Duration::from_millis(args.target_args.timeout_ms),
        max_concurrency: args.concurrency,
    };
    let scheduler = Scheduler::new(
        registry.clone(),
        runner,
        Publisher::new(store.clone()),
        settings,
    )?;

    for (id, err) in scheduler.publish_all() {
        warn!(target_id = %id, error = %err, "initial publish failed");
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    if !args.no_navigation {
        spawn_navigation(registry.clone(), store.clone(), stop.clone());
    }

    info!(
        targets = registry.len(),
        interval_ms = args.interval_ms,
        timeout_ms = args.target_args.timeout_ms,
        "watching"
    );

    let max_ticks = (args.count > 0).then_some(args.count);
    let ticks = scheduler.run(&stop, max_ticks, log_tick);

    info!(ticks, store_version = store.snapshot().version, "stopped");
    Ok(())
}

fn log_tick(report: &TickReport) {
    for target in &report.targets {
        let (latency_ms, detail) = outcome_fields(&target.outcome);
        debug!(
            target_id = %target.id,
            state = %target.transition.to,
            latency_ms,
            detail = detail.as_deref().unwrap_or_default(),
            "target probed"
        );
    }
    debug!(
        targets = report.targets.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "tick finished"
    );
}

fn outcome_fields(outcome: &ProbeOutcome) -> (Option<f64>, Option<String>) {
    match outcome {
        ProbeOutcome::Reachable(latency) => (Some(*latency), None),
        ProbeOutcome::Unreachable(failure) => (None, Some(failure.to_string())),
        ProbeOutcome::Unparseable(err) => (None, Some(err.to_string())),
    }
}

/// "Select next target" over stdin: an empty line or `n` advances the
/// cursor, `q` stops watching.
fn spawn_navigation<S>(registry: Arc<TargetRegistry>, store: Arc<S>, stop: Arc<AtomicBool>)
where
    S: VariableStore + 'static,
{
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines().map_while(|line| line.ok()) {
            match line.trim() {
                "" | "n" => {
                    let target = registry.advance();
                    print_selection(&target, store.as_ref());
                }
                "q" => {
                    stop.store(true, Ordering::SeqCst);
                    break;
                }
                other => eprintln!("unknown command {other:?} (enter, n or q)"),
            }
        }
    });
}

fn print_selection<S: VariableStore + ?Sized>(target: &Target, store: &S) {
    match store.read(target.id()) {
        Some(vars) => {
            let ping_time = vars
                .ping_time
                .value
                .map(|value| format!("{value:.3} ms"))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "> {} ({}) ping_state={} ping_time={} [{:?}]",
                target.id(),
                vars.service_url.value,
                vars.ping_state.value,
                ping_time,
                vars.ping_time.quality
            );
        }
        None => println!("> {} ({}) not published yet", target.id(), target.address()),
    }
}

fn run_probe(args: ProbeArgs) -> Result<()> {
    let registry = build_registry(&args.target_args)?;
    let runner = build_runner(&args.target_args);
    let timeout = Duration::from_millis(args.target_args.timeout_ms);

    for target in registry.targets() {
        let result = runner.probe(target.address(), timeout);
        let outcome = ProbeOutcome::from_probe(&result);
        let (latency_ms, detail) = outcome_fields(&outcome);

        let line = ProbeLine {
            id: target.id(),
            address: target.address(),
            observed_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            reachable: outcome.is_success(),
            latency_ms,
            detail,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<()> {
    let text = match &args.in_path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input {path:?}"))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let latency = parse_latency(&text).context("could not read round-trip time")?;
    println!("{latency}");
    Ok(())
}
