//! flotillad — the fleet control plane daemon.
//!
//! Single binary that assembles the control plane:
//! - Providers (the in-memory simulator behind `--sim`)
//! - Fleet inventory + load balancer lifecycle
//! - Weighted DNS manager + edge protection associator
//! - Scale workflows, execution registry, operation guard
//! - Integrity enforcer + fleet monitor loops
//! - REST API
//!
//! # Usage
//!
//! ```text
//! flotillad standalone --port 8643 --config fleet.toml --sim
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use flotilla_core::{AliasTarget, LoadBalancerState, MAX_MEMBER_WEIGHT, ORIGIN_TAG_KEY, WeightedRecord};
use flotilla_dns::WeightedDnsManager;
use flotilla_edge::EdgeProtectionAssociator;
use flotilla_fleet::{FleetInventory, LoadBalancerLifecycle};
use flotilla_provider::{InMemoryCloud, InMemorySuspendSwitch, LogNotifier, TargetAddress};
use flotilla_sentinel::{FleetMonitor, IntegrityEnforcer};
use flotilla_workflow::{ExecutionRegistry, OperationGuard, ScaleWorkflow, WorkflowExecutor};

use crate::config::FleetConfig;

#[derive(Parser)]
#[command(name = "flotillad", about = "Weighted-DNS fleet control plane daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all control plane subsystems in one process.
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8643")]
        port: u16,

        /// Path to fleet.toml; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run against the in-memory cloud simulator, seeded with one
        /// static fleet member.
        #[arg(long)]
        sim: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flotillad=debug,flotilla=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone { port, config, sim } => run_standalone(port, config, sim).await,
    }
}

async fn run_standalone(port: u16, config: Option<PathBuf>, sim: bool) -> anyhow::Result<()> {
    info!("fleet control plane starting in standalone mode");

    let config = match config {
        Some(path) => {
            let config = FleetConfig::from_file(&path)?;
            info!(path = ?path, "fleet config loaded");
            config
        }
        None => FleetConfig::simulator(),
    };

    if !sim {
        anyhow::bail!(
            "no cloud provider integration is compiled into this build; run with --sim"
        );
    }

    // ── Providers ──────────────────────────────────────────────

    let cloud = InMemoryCloud::new().with_zone(&config.dns.zone_id).into_shared();
    seed_simulator(&cloud, &config).await;
    let suspend = Arc::new(InMemorySuspendSwitch::new());
    let notifier = Arc::new(LogNotifier);
    info!("in-memory cloud simulator seeded");

    // ── Control plane components ───────────────────────────────

    let inventory = FleetInventory::new(cloud.clone(), config.group_tag());
    let lifecycle =
        LoadBalancerLifecycle::new(cloud.clone(), cloud.clone(), config.lifecycle_settings());
    let edge = EdgeProtectionAssociator::new(cloud.clone(), config.edge_settings());
    let dns = WeightedDnsManager::new(cloud.clone(), config.dns_settings());

    let registry = ExecutionRegistry::new();
    let guard = OperationGuard::new(registry.clone());
    let workflow = ScaleWorkflow::new(
        inventory.clone(),
        lifecycle,
        edge.clone(),
        dns.clone(),
        suspend.clone(),
        notifier.clone(),
    );
    let executor = Arc::new(WorkflowExecutor::new(
        workflow,
        registry.clone(),
        suspend.clone(),
        notifier.clone(),
    ));
    info!("scale workflows initialized");

    let enforcer = IntegrityEnforcer::new(
        inventory.clone(),
        edge.clone(),
        dns.clone(),
        notifier.clone(),
    );
    let monitor = FleetMonitor::new(
        inventory.clone(),
        edge,
        dns.clone(),
        guard.clone(),
        notifier,
        config.enforcer_rate(),
    );
    info!(
        enforcer_rate_secs = config.timers.enforcer_rate_secs,
        monitor_rate_secs = config.timers.monitor_rate_secs,
        "sentinels initialized"
    );

    // ── Background loops ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let enforcer_shutdown = shutdown_rx.clone();
    let monitor_shutdown = shutdown_rx;
    let enforcer_rate = config.enforcer_rate();
    let monitor_rate = config.monitor_rate();

    let enforcer_handle = tokio::spawn(async move {
        enforcer.run(enforcer_rate, enforcer_shutdown).await;
    });
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_rate, monitor_shutdown).await;
    });

    // ── API server ─────────────────────────────────────────────

    let router = flotilla_api::build_router(flotilla_api::ApiState {
        executor,
        inventory,
        dns,
        registry,
        guard,
        suspend,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not install shutdown handler");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = enforcer_handle.await;
    let _ = monitor_handle.await;

    info!("fleet control plane stopped");
    Ok(())
}

/// Install one static fleet member with coherent DNS and edge state, so
/// the simulator starts from the invariant the sentinels enforce.
async fn seed_simulator(cloud: &Arc<InMemoryCloud>, config: &FleetConfig) {
    cloud.seed_backend_target(TargetAddress { ip: "10.0.0.1".to_string(), port: 80 }).await;
    let anchor = cloud
        .seed_load_balancer(
            "fleet-anchor",
            LoadBalancerState::Active,
            std::collections::HashMap::from([
                (config.fleet.group_tag_key.clone(), config.fleet.group_tag_value.clone()),
                (ORIGIN_TAG_KEY.to_string(), "static".to_string()),
            ]),
        )
        .await;
    cloud.seed_association(&anchor.arn).await;
    cloud
        .seed_record(WeightedRecord::weighted_alias(
            &config.dns.record_name,
            &anchor.name,
            MAX_MEMBER_WEIGHT,
            AliasTarget::new(&anchor.canonical_zone_id, &anchor.dns_name),
        ))
        .await;
}
