// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Driver loop for LoadBalancer Services.
//!
//! A `kube::runtime::Controller` watches every Service and hands LoadBalancer
//! Services to [`CloudStackLoadBalancer`]. The cleanup finalizer guards the
//! cloud resources: it is added before the first `ensure` and removed only
//! after `ensure_deleted` succeeded, either because the Service is being
//! deleted or because it stopped being of type LoadBalancer.
//!
//! A separate loop periodically resyncs rule membership with the current set
//! of candidate nodes, and a small HTTP server exposes metrics and health.

use crate::constants::{
    ERROR_REQUEUE_DURATION_SECS, HEALTH_SERVER_PATH, LABEL_CONTROL_PLANE,
    LABEL_EXCLUDE_FROM_LOAD_BALANCERS, LOAD_BALANCER_CLEANUP_FINALIZER, METRICS_SERVER_PATH,
    SERVICE_TYPE_LOAD_BALANCER, SUCCESS_REQUEUE_DURATION_SECS,
};
use crate::errors::LoadBalancerError;
use crate::events::{actions, EventPublisher};
use crate::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::metrics;
use crate::provider::CloudStackLoadBalancer;
use crate::retry::retry_api_call;
use anyhow::{Context as _, Result};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Node, Service};
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::runtime::watcher::Config;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Error surfaced to the controller runtime.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

/// Shared state of the Service controller and the node-sync loop.
pub struct Context {
    pub client: Client,
    pub provider: CloudStackLoadBalancer,
    pub events: Arc<dyn EventPublisher>,
    pub cluster_name: String,
}

/// Whether `service` is of type LoadBalancer.
#[must_use]
pub fn is_load_balancer(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .is_some_and(|type_| type_ == SERVICE_TYPE_LOAD_BALANCER)
}

/// Whether the cloud resources of `service` must be removed.
///
/// True when the cleanup finalizer is present and the Service is either being
/// deleted or no longer of type LoadBalancer.
#[must_use]
pub fn needs_cleanup(service: &Service) -> bool {
    has_finalizer(service, LOAD_BALANCER_CLEANUP_FINALIZER)
        && (service.metadata.deletion_timestamp.is_some() || !is_load_balancer(service))
}

fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn has_label(node: &Node, label: &str) -> bool {
    node.labels().contains_key(label)
}

/// Nodes that may back a load balancer.
///
/// Ready nodes not labelled for exclusion. Control-plane nodes are used only
/// when no other node qualifies.
#[must_use]
pub fn candidate_nodes(nodes: &[Node]) -> Vec<Node> {
    let eligible: Vec<&Node> = nodes
        .iter()
        .filter(|node| is_ready(node) && !has_label(node, LABEL_EXCLUDE_FROM_LOAD_BALANCERS))
        .collect();

    let workers: Vec<Node> = eligible
        .iter()
        .filter(|node| !has_label(node, LABEL_CONTROL_PLANE))
        .map(|node| (*node).clone())
        .collect();

    if workers.is_empty() {
        eligible.into_iter().cloned().collect()
    } else {
        workers
    }
}

/// Merge patch writing `status` to `status.loadBalancer`.
#[must_use]
pub fn status_patch(status: &LoadBalancerStatus) -> Value {
    json!({ "status": { "loadBalancer": status } })
}

async fn list_candidate_nodes(client: &Client) -> Result<Vec<Node>> {
    let api: Api<Node> = Api::all(client.clone());
    let params = ListParams::default();
    let nodes = retry_api_call(|| api.list(&params), "list nodes").await?;
    Ok(candidate_nodes(&nodes.items))
}

async fn patch_status(client: &Client, service: &Service, status: &LoadBalancerStatus) -> Result<()> {
    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();

    let current = service.status.as_ref().and_then(|s| s.load_balancer.as_ref());
    if current == Some(status) {
        debug!(service = %format!("{namespace}/{name}"), "Load balancer status is up-to-date");
        return Ok(());
    }

    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let params = PatchParams::default();
    let patch = status_patch(status);
    let merge = Patch::Merge(&patch);
    retry_api_call(|| api.patch_status(&name, &params, &merge), "patch service status").await?;
    Ok(())
}

async fn warn_event(ctx: &Context, service: &Service, action: &str, error: &LoadBalancerError) {
    ctx.events
        .publish(
            &service.object_ref(&()),
            EventType::Warning,
            error.event_reason(),
            action,
            Some(error.to_string()),
        )
        .await;
}

async fn reconcile_service(service: &Service, ctx: &Context) -> Result<Action> {
    let key = format!("{}/{}", service.namespace().unwrap_or_default(), service.name_any());

    if needs_cleanup(service) {
        info!(service = %key, "Deleting load balancer");
        if let Err(e) = ctx.provider.ensure_deleted(&ctx.cluster_name, service).await {
            warn_event(ctx, service, actions::DELETE, &e).await;
            return Err(e).with_context(|| format!("failed to delete load balancer of {key}"));
        }
        remove_finalizer(&ctx.client, service, LOAD_BALANCER_CLEANUP_FINALIZER).await?;
        return Ok(Action::await_change());
    }

    if !is_load_balancer(service) || service.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    ensure_finalizer(&ctx.client, service, LOAD_BALANCER_CLEANUP_FINALIZER).await?;

    let nodes = list_candidate_nodes(&ctx.client).await?;
    let status = match ctx.provider.ensure(&ctx.cluster_name, service, &nodes).await {
        Ok(status) => status,
        Err(e) => {
            if e.is_validation() {
                warn!(service = %key, error = %e, "Service cannot be load balanced until its spec is fixed");
            }
            warn_event(ctx, service, actions::ENSURE, &e).await;
            return Err(e).with_context(|| format!("failed to ensure load balancer of {key}"));
        }
    };

    patch_status(&ctx.client, service, &status).await?;
    info!(service = %key, "Load balancer ensured");

    Ok(Action::requeue(Duration::from_secs(
        SUCCESS_REQUEUE_DURATION_SECS,
    )))
}

/// Reconcile one Service.
///
/// # Errors
///
/// Returns an error if any step fails; the Service is requeued by
/// [`error_policy`].
pub async fn reconcile(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    match reconcile_service(&service, &ctx).await {
        Ok(action) => Ok(action),
        Err(e) => {
            error!(service = %service.name_any(), error = %format!("{e:#}"), "Failed to reconcile service");
            Err(e.into())
        }
    }
}

/// Requeue failed Services after a short delay.
pub fn error_policy(_service: Arc<Service>, _err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Run the Service controller until the watch stream ends.
///
/// # Errors
///
/// Never returns an error today; the signature matches the other loops.
pub async fn run_service_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting Service controller");

    let api = Api::<Service>::all(ctx.client.clone());

    Controller::new(api, Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!(error = %e, "Reconcile loop reported an error");
            }
            futures::future::ready(())
        })
        .await;

    Ok(())
}

async fn sync_nodes(ctx: &Context) -> Result<()> {
    let api: Api<Service> = Api::all(ctx.client.clone());
    let params = ListParams::default();
    let services = retry_api_call(|| api.list(&params), "list services").await?;
    let nodes = list_candidate_nodes(&ctx.client).await?;

    for service in services
        .items
        .iter()
        .filter(|s| is_load_balancer(s) && s.metadata.deletion_timestamp.is_none())
    {
        if let Err(e) = ctx.provider.update(&ctx.cluster_name, service, &nodes).await {
            warn!(
                service = %format!("{}/{}", service.namespace().unwrap_or_default(), service.name_any()),
                error = %e,
                "Failed to update load balancer hosts"
            );
            warn_event(ctx, service, actions::UPDATE, &e).await;
        }
    }

    Ok(())
}

/// Resync load balancer membership with the node set every `interval`.
///
/// # Errors
///
/// Never returns an error; failed passes are logged and retried on the next tick.
pub async fn run_node_sync(ctx: Arc<Context>, interval: Duration) -> Result<()> {
    info!(interval = ?interval, "Starting node sync loop");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = sync_nodes(&ctx).await {
            error!(error = %format!("{e:#}"), "Node sync pass failed");
        }
    }
}

async fn metrics_handler() -> (StatusCode, String) {
    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Router serving Prometheus metrics and the liveness probe.
pub fn metrics_routes() -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTH_SERVER_PATH, get(|| async { "ok" }))
}

/// Serve [`metrics_routes`] on `bind_address`.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_metrics_server(bind_address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind metrics server to {bind_address}"))?;
    info!(addr = %bind_address, "Metrics server started");

    axum::serve(listener, metrics_routes())
        .await
        .context("metrics server error")
}
