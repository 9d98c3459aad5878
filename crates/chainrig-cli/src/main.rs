//! chainrig - end-to-end harness for multi-process beacon-chain networks.
//!
//! ## Commands
//!
//! - `plan`: print the order components would start in
//! - `launch`: start real processes and keep them up until Ctrl-C
//! - `simulate`: full orchestration and evaluation run against an in-memory network

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chainrig_api::{SimulatedNetwork, SimulatedNetworkConfig};
use chainrig_core::reporting::{
    render_run_summary_md, write_balance_history_json, write_run_report_json,
    write_run_summary_md,
};
use chainrig_core::{
    build_orchestrator, run_end_to_end, telemetry, EvaluationScheduler, NetworkHandles,
    Orchestrator, SimComponentFactory,
};
use chainrig_proc::ProcessFactory;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use crate::config::{CliConfig, Overrides};

#[derive(Parser)]
#[command(name = "chainrig")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "End-to-end harness for beacon-chain networks", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the component start order for a configuration
    Plan {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Start every configured process and keep the network up until Ctrl-C
    Launch {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run orchestration and evaluation against a simulated network
    Simulate {
        #[command(flatten)]
        common: CommonArgs,

        /// Last epoch to evaluate
        #[arg(long)]
        epochs: Option<u64>,

        /// Seed for fault injection and the simulated keystore
        #[arg(long, env = "CHAINRIG_SEED")]
        seed: Option<u64>,

        /// Slot duration in milliseconds
        #[arg(long)]
        slot_millis: Option<u64>,

        /// Simulated component startup delay in milliseconds
        #[arg(long, default_value = "100")]
        startup_millis: u64,

        /// Directory for run_report.json, balance_history.json and run_summary.md
        /// (default: the configured log_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to chainrig.toml (defaults apply when omitted)
    #[arg(short, long, env = "CHAINRIG_CONFIG")]
    config: Option<PathBuf>,

    /// Number of beacon nodes
    #[arg(long)]
    beacon_nodes: Option<usize>,

    /// Number of genesis validators
    #[arg(long)]
    validators: Option<u64>,

    /// Directory for component logs
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl CommonArgs {
    fn load(&self, overrides: Overrides) -> Result<CliConfig> {
        let mut config = CliConfig::load(self.config.as_deref())?;
        Overrides {
            beacon_nodes: self.beacon_nodes,
            validators: self.validators,
            log_dir: self.log_dir.clone(),
            ..overrides
        }
        .apply(&mut config.run)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Plan { common } => cmd_plan(&common.load(Overrides::default())?),
        Commands::Launch { common } => cmd_launch(&common.load(Overrides::default())?).await,
        Commands::Simulate {
            common,
            epochs,
            seed,
            slot_millis,
            startup_millis,
            out,
        } => {
            let config = common.load(Overrides {
                epochs,
                seed,
                slot_millis,
                ..Overrides::default()
            })?;
            let out = out.unwrap_or_else(|| config.run.log_dir.clone());
            cmd_simulate(&config, Duration::from_millis(startup_millis), &out).await
        }
    }
}

/// Cancelled on the first Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        trigger.cancel();
    });
    token
}

async fn stop_and_report(orch: &Orchestrator) {
    for (component, err) in orch.stop_all().await {
        warn!(component = %component, error = %err, "failed to stop");
    }
}

fn cmd_plan(config: &CliConfig) -> Result<()> {
    let topology = config.run.topology();
    let orch = build_orchestrator(
        &topology,
        &SimComponentFactory::new(Duration::ZERO),
        config.run.orchestrator_config(),
        CancellationToken::new(),
    )?;
    let waves = orch.graph().start_waves()?;

    println!(
        "{} beacon node(s), {} validator(s), builder slot: {:?}",
        topology.beacon_nodes, config.run.network.validators, topology.builder
    );
    for (i, wave) in waves.iter().enumerate() {
        println!("  wave {i}: {}", wave.join(", "));
    }

    let missing: Vec<String> = ProcessFactory::from_named(&config.run.log_dir, &config.components)?
        .missing(&topology.roles())
        .into_iter()
        .map(|r| r.to_string())
        .collect();
    if !missing.is_empty() {
        println!("no launch spec for: {}", missing.join(", "));
    }
    Ok(())
}

async fn cmd_launch(config: &CliConfig) -> Result<()> {
    let topology = config.run.topology();
    let factory = ProcessFactory::from_named(&config.run.log_dir, &config.components)?;
    let roles = topology.roles();
    let missing = factory.missing(&roles);
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|r| r.to_string()).collect();
        bail!("no [components.<role>] entry for: {}", names.join(", "));
    }
    std::fs::create_dir_all(&config.run.log_dir).with_context(|| {
        format!("failed to create log dir {}", config.run.log_dir.display())
    })?;

    let cancel = ctrl_c_token();
    let orch = build_orchestrator(
        &topology,
        &factory,
        config.run.orchestrator_config(),
        cancel.clone(),
    )?;

    let started = match orch.run().await {
        Ok(()) => orch.await_all_started().await,
        Err(e) => Err(e),
    };
    if let Err(e) = started {
        stop_and_report(&orch).await;
        return Err(e).context("network failed to start");
    }

    println!("network is up; logs in {}", config.run.log_dir.display());
    for entry in orch.process_ids() {
        println!("  {:<18} {:<20} pid {}", entry.component, entry.member, entry.pid);
    }
    println!("press Ctrl-C to stop");

    cancel.cancelled().await;
    stop_and_report(&orch).await;
    println!("all components stopped");
    Ok(())
}

async fn cmd_simulate(config: &CliConfig, startup_delay: Duration, out: &Path) -> Result<()> {
    let run = &config.run;
    let seed = run.evaluation.seed;
    let net = SimulatedNetwork::new(SimulatedNetworkConfig {
        spec: run.chain.clone(),
        validator_count: run.network.validators,
        seed,
    });
    let handles = NetworkHandles::new(
        net.endpoints(run.network.beacon_nodes),
        net.keystore(),
        net.spec().clone(),
    )
    .with_request_deadline(run.timeouts.request_deadline());

    let orch = build_orchestrator(
        &run.topology(),
        &SimComponentFactory::new(startup_delay),
        run.orchestrator_config(),
        ctrl_c_token(),
    )?;
    let scheduler = EvaluationScheduler::new(run.scheduler_config(), run.evaluators()?);

    let artifacts = run_end_to_end(&orch, &scheduler, &handles, seed).await;

    std::fs::create_dir_all(out)
        .with_context(|| format!("failed to create output dir {}", out.display()))?;
    write_run_report_json(&out.join("run_report.json"), &artifacts.report)?;
    write_balance_history_json(&out.join("balance_history.json"), &artifacts.balance_history)?;
    write_run_summary_md(&out.join("run_summary.md"), &artifacts.report)?;

    print!("{}", render_run_summary_md(&artifacts.report));
    println!("reports written to {}", out.display());

    artifacts.result.context("run failed")
}
