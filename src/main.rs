// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use cloudstack_lb::{
    cloudstack::{client::CloudStackClient, CloudApis},
    config::ControllerConfig,
    constants::{CONTROLLER_NAME, TOKIO_WORKER_THREADS},
    events::KubeEventPublisher,
    patcher::KubeServicePatcher,
    provider::CloudStackLoadBalancer,
    service_controller::{run_metrics_server, run_node_sync, run_service_controller, Context},
};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name(CONTROLLER_NAME)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_tracing() {
    // RUST_LOG selects the level (default info), RUST_LOG_FORMAT=json switches to JSON lines
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    init_tracing();

    info!("Starting CloudStack load balancer controller");

    let config = ControllerConfig::load()?;
    info!(
        api_url = %config.cloudstack.api_url,
        cluster = %config.cluster_name,
        project = ?config.project_id(),
        "Configuration loaded"
    );

    debug!("Creating CloudStack client");
    let cloudstack = CloudStackClient::new(&config.cloudstack)?;
    let apis = CloudApis::from_shared(Arc::new(cloudstack));

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let events = Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));
    let patcher = Arc::new(KubeServicePatcher::new(client.clone()));

    let provider = CloudStackLoadBalancer::new(
        apis,
        config.project_id().map(str::to_string),
        events.clone(),
        patcher,
    );

    let ctx = Arc::new(Context {
        client,
        provider,
        events,
        cluster_name: config.cluster_name.clone(),
    });

    let node_sync_interval = Duration::from_secs(config.node_sync_interval_secs);

    info!("Starting all controllers");

    // None of these loops is expected to return; exit the process if one does
    tokio::select! {
        result = run_service_controller(ctx.clone()) => {
            error!("CRITICAL: Service controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Service controller exited unexpectedly without error")
        }
        result = run_node_sync(ctx.clone(), node_sync_interval) => {
            error!("CRITICAL: Node sync loop exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Node sync loop exited unexpectedly without error")
        }
        result = run_metrics_server(&config.metrics_bind_address) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
    }
}
