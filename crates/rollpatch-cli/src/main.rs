//! rolling-patch
//!
//! Rolling OS patching across a host fleet: per-host preflight, cluster
//! node drain, package upgrade, reboot coordination, uncordon, and
//! post-validation, strictly one host at a time.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use eyre::eyre;
use kameo::actor::Spawn;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rollpatch_core::{
    AssumeYes, ConfirmationProvider, HostSpec, OrchestratorActor, OrchestratorActorArgs,
    RunConfig, RunEvent, RunFleet, TargetSelection, TerminalPrompt,
};
use rollpatch_k8s::{KubeNodeController, NoClusterController, NodeController};

mod factory;
mod settings;

use factory::DefaultHostFactory;
use settings::Settings;

#[derive(Parser)]
#[command(name = "rolling-patch")]
#[command(version, about = "Rolling OS patching with cluster-aware draining", long_about = None)]
struct Cli {
    /// Patch a single host
    #[arg(long, value_name = "HOST", conflicts_with = "group")]
    target: Option<String>,

    /// Patch a named inventory group
    #[arg(long, value_name = "NAME")]
    group: Option<String>,

    /// Environment tag carried into logs and the summary
    #[arg(long = "env", value_name = "ENV")]
    environment: Option<String>,

    /// Log what would happen without mutating any host or node
    #[arg(long)]
    dry_run: bool,

    /// Never reboot, even when the OS requests it
    #[arg(long)]
    skip_reboot: bool,

    /// Never drain/uncordon cluster nodes
    #[arg(long)]
    skip_drain: bool,

    /// Command to run on each host before patching
    #[arg(long, value_name = "CMD")]
    pre_hook: Option<String>,

    /// Command to run on each host after patching
    #[arg(long, value_name = "CMD")]
    post_hook: Option<String>,

    /// Settings file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Continue past failed hosts without prompting
    #[arg(long, short = 'y')]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let target = match (&cli.target, &cli.group) {
        (Some(host), _) => TargetSelection::Host(host.clone()),
        (None, Some(group)) => TargetSelection::Group(group.clone()),
        (None, None) => TargetSelection::All,
    };

    let entries = match &target {
        TargetSelection::Host(host) => settings.inventory.resolve_host(host),
        TargetSelection::Group(group) => settings.inventory.resolve_group(group)?,
        TargetSelection::All => settings.inventory.resolve_all()?,
    };
    let hosts: Vec<HostSpec> = entries.iter().map(|e| settings.host_spec(e)).collect();

    let config = Arc::new(RunConfig {
        target,
        environment: cli.environment,
        dry_run: cli.dry_run,
        skip_reboot: cli.skip_reboot,
        skip_drain: cli.skip_drain,
        pre_hook: cli.pre_hook,
        post_hook: cli.post_hook,
        timeouts: settings.timeouts(),
    });

    info!(
        hosts = hosts.len(),
        env = config.environment.as_deref().unwrap_or("-"),
        dry_run = config.dry_run,
        "resolved patch targets"
    );

    let node_controller: Arc<dyn NodeController> = match KubeNodeController::connect().await {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            warn!(error = %e, "no cluster access, hosts are treated as standalone");
            Arc::new(NoClusterController)
        }
    };

    let factory = Arc::new(DefaultHostFactory::new(
        settings.ssh.clone(),
        node_controller,
    ));

    let confirmation: Arc<dyn ConfirmationProvider> = if cli.yes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(TerminalPrompt)
    };

    let (event_tx, event_rx) = broadcast::channel(1024);
    let printer = tokio::spawn(print_progress(event_rx));

    let orchestrator = OrchestratorActor::spawn(OrchestratorActorArgs {
        config,
        factory,
        confirmation,
        event_tx,
    });

    let summary = orchestrator
        .ask(RunFleet { hosts })
        .await
        .map_err(|e| eyre!("patch run failed: {e}"))?;

    orchestrator.stop_gracefully().await.ok();
    printer.await.ok();

    print!("{}", summary.render());

    if !summary.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

/// Render run events as per-host progress lines on stdout
async fn print_progress(mut rx: broadcast::Receiver<RunEvent>) {
    loop {
        match rx.recv().await {
            Ok(RunEvent::StageChanged { host, from, to }) => {
                println!("  {host}: {from} -> {to}");
            }
            Ok(RunEvent::StageSkipped {
                host,
                stage,
                reason,
            }) => {
                println!("  {host}: {stage} skipped ({reason})");
            }
            Ok(RunEvent::HostCompleted {
                host,
                outcome,
                error,
            }) => match error {
                Some(error) => println!("  {host}: {outcome} ({error})"),
                None => println!("  {host}: {outcome}"),
            },
            Ok(RunEvent::RunCompleted { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "progress events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
