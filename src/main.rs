use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use riskswarm::analysis::AnalysisSuite;
use riskswarm::config::{parse_workers, SwarmConfig};
use riskswarm::dashboard::{run_dashboard, DashboardState};
use riskswarm::shutdown::install_shutdown_handler;
use riskswarm::worker::HeartbeatSender;
use riskswarm::{SwarmCoordinator, TaskStatusReport, WaitOutcome};

#[derive(Parser, Debug)]
#[command(name = "riskswarm")]
#[command(version)]
#[command(about = "Blockchain address risk analysis over a coordinated worker swarm")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the coordinator and its HTTP API
    Server(ServerArgs),

    /// Analyze one address with an in-process swarm and print the result
    Analyze(AnalyzeArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SwarmArgs {
    /// Worker pool, format "kind:count" with kinds token, transaction, risk
    #[arg(long, default_value = "token:2,transaction:2,risk:1")]
    workers: String,

    /// Coordinator loop interval in milliseconds
    #[arg(long, default_value = "1000")]
    loop_interval_ms: u64,

    /// Seconds without a heartbeat before a worker is taken offline
    #[arg(long, default_value = "300")]
    heartbeat_timeout_secs: u64,
}

impl SwarmArgs {
    fn to_config(&self) -> Result<SwarmConfig, Box<dyn std::error::Error>> {
        Ok(SwarmConfig::default()
            .with_workers(parse_workers(&self.workers)?)
            .with_loop_interval_ms(self.loop_interval_ms)
            .with_heartbeat_timeout_ms(self.heartbeat_timeout_secs * 1_000))
    }
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Seconds between heartbeats sent on behalf of the local workers
    #[arg(long, default_value = "30")]
    heartbeat_interval_secs: u64,

    /// Do not send heartbeats for local workers (they must report in over HTTP)
    #[arg(long)]
    no_heartbeats: bool,

    #[command(flatten)]
    swarm: SwarmArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnalysisKind {
    Wallet,
    Token,
    Transaction,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Address to analyze
    address: String,

    /// Kind of analysis to run
    #[arg(long, short = 'k', default_value = "wallet")]
    kind: AnalysisKind,

    /// Task priority (higher runs sooner)
    #[arg(long, default_value = "0")]
    priority: i32,

    /// Seconds to wait for the result
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    #[command(flatten)]
    swarm: SwarmArgs,
}

// =============================================================================
// Server
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args
        .swarm
        .to_config()?
        .with_heartbeat_interval_ms(args.heartbeat_interval_secs * 1_000);
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let worker_ids: Vec<String> = config.workers.iter().map(|w| w.id.clone()).collect();

    let coordinator = Arc::new(SwarmCoordinator::new(config, AnalysisSuite::heuristic()));
    let shutdown = install_shutdown_handler();

    if args.no_heartbeats {
        tracing::warn!("Local heartbeats disabled, workers go offline unless they report in");
    } else {
        let interval_ms = coordinator.config().heartbeat_interval_ms;
        for worker_id in worker_ids {
            let sender = HeartbeatSender::new(worker_id, interval_ms);
            let tx = coordinator.heartbeat_sender();
            let token = shutdown.clone();
            tokio::spawn(async move { sender.run(tx, token).await });
        }
    }

    let loop_coordinator = coordinator.clone();
    let loop_shutdown = shutdown.clone();
    let control_loop = tokio::spawn(async move { loop_coordinator.run(loop_shutdown).await });

    run_dashboard(listen_addr, DashboardState { coordinator }, shutdown.clone()).await;

    // the API can stop on its own (bind failure); take the loop down with it
    shutdown.cancel();
    control_loop.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

// =============================================================================
// One-shot analysis
// =============================================================================

async fn run_analyze(args: AnalyzeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the report, keep logs quiet and on stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.swarm.to_config()?;
    let coordinator = Arc::new(SwarmCoordinator::new(config, AnalysisSuite::heuristic()));

    let shutdown = tokio_util::sync::CancellationToken::new();
    let loop_coordinator = coordinator.clone();
    let loop_shutdown = shutdown.clone();
    let control_loop = tokio::spawn(async move { loop_coordinator.run(loop_shutdown).await });

    let task_id = match args.kind {
        AnalysisKind::Wallet => {
            coordinator
                .submit_wallet_analysis_task(&args.address, args.priority)
                .await?
        }
        AnalysisKind::Token => {
            coordinator
                .submit_token_analysis_task(&args.address, args.priority)
                .await?
        }
        AnalysisKind::Transaction => {
            coordinator
                .submit_transaction_analysis_task(&args.address, args.priority)
                .await?
        }
    };

    let outcome = coordinator
        .wait_for_completion(&task_id, Duration::from_secs(args.timeout_secs))
        .await?;

    shutdown.cancel();
    control_loop.await?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome.report())?),
        OutputFormat::Table => print_report(&outcome),
    }

    if let WaitOutcome::StillRunning(_) = outcome {
        return Err("timed out waiting for the analysis".into());
    }
    Ok(())
}

fn print_report(outcome: &WaitOutcome) {
    let report: &TaskStatusReport = outcome.report();
    println!("Task:      {}", report.task_id);
    println!("Type:      {}", report.task_type);
    println!("Target:    {}", report.target_address);
    println!("Status:    {}", report.status.to_string().to_uppercase());
    if let Some(worker) = &report.assigned_worker {
        println!("Worker:    {}", worker);
    }
    if let Some(ms) = report.duration_ms {
        println!("Duration:  {}ms", ms);
    }
    if let Some(result) = &report.result {
        println!("Score:     {:.1} ({:?})", result.risk_score, result.risk_level);
        if result.signals.is_empty() {
            println!("Signals:   none");
        } else {
            println!("Signals:   {}", result.signals.join(", "));
        }
    }
    if let Some(error) = &report.error {
        println!("Error:     {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    match args.command {
        Commands::Server(server) => run_server(server).await,
        Commands::Analyze(analyze) => run_analyze(analyze).await,
    }
}
