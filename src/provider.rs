// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Load balancer lifecycle operations for a Service.
//!
//! [`CloudStackLoadBalancer`] exposes the verbs the driver loop calls:
//!
//! - [`get`](CloudStackLoadBalancer::get) - report the current status, if any
//! - [`ensure`](CloudStackLoadBalancer::ensure) - create or converge the load balancer
//! - [`update`](CloudStackLoadBalancer::update) - resync rule membership with the nodes
//! - [`ensure_deleted`](CloudStackLoadBalancer::ensure_deleted) - remove every cloud resource
//!
//! Every call re-reads CloudStack from scratch. Callers serialise calls per
//! Service; calls for different Services are independent.

use crate::annotations;
use crate::cloudstack::{CloudApis, CloudStackError, LoadBalancerRule, Network};
use crate::constants::{
    ANNOTATION_LOAD_BALANCER_ADDRESS, ANNOTATION_PROXY_PROTOCOL, FIREWALL_SERVICE_NAME,
};
use crate::errors::{LoadBalancerError, Result};
use crate::events::{actions, reasons, EventPublisher};
use crate::loadbalancer::address::{ensure_public_ip, release_public_ip, IpAcquisition};
use crate::loadbalancer::assignment::update_rule_hosts;
use crate::loadbalancer::firewall::{delete_firewall_rules, update_firewall_rule, CleanupReport};
use crate::loadbalancer::hosts::verify_hosts;
use crate::loadbalancer::locator::locate;
use crate::loadbalancer::rules::{delete_rule, reconcile_rule, rule_identity};
use crate::loadbalancer::status::load_balancer_status;
use crate::loadbalancer::{Algorithm, LoadBalancer, PortPlan};
use crate::metrics;
use crate::naming::{legacy_load_balancer_name, load_balancer_name};
use crate::patcher::ServicePatcher;
use crate::protocol::LoadBalancerProtocol;
use crate::source_ranges::load_balancer_source_ranges;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Node, Service};
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Desired state derived from a Service before any remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServicePlan {
    algorithm: Algorithm,
    ports: Vec<PortPlan>,
    source_ranges: Vec<String>,
    requested_ip: Option<String>,
}

impl ServicePlan {
    /// Validate `service` and derive its plan.
    fn from_service(service: &Service) -> Result<Self> {
        let spec = service.spec.as_ref();
        let ports = spec.and_then(|s| s.ports.as_deref()).unwrap_or_default();
        if ports.is_empty() {
            return Err(LoadBalancerError::NoPorts);
        }

        let algorithm =
            Algorithm::from_session_affinity(spec.and_then(|s| s.session_affinity.as_deref()))?;

        let proxy_protocol = annotations::get_bool(service, ANNOTATION_PROXY_PROTOCOL, false);
        let ports = ports
            .iter()
            .map(|port| -> Result<PortPlan> {
                let protocol = LoadBalancerProtocol::from_service_port(port, proxy_protocol)
                    .ok_or_else(|| LoadBalancerError::UnsupportedProtocol {
                        protocol: port.protocol.clone().unwrap_or_default(),
                        port: port.port,
                    })?;
                let node_port = port
                    .node_port
                    .ok_or(LoadBalancerError::MissingNodePort { port: port.port })?;
                Ok(PortPlan {
                    protocol,
                    port: port.port,
                    node_port,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let source_ranges = load_balancer_source_ranges(service)?;

        let requested_ip = spec
            .and_then(|s| s.load_balancer_ip.clone())
            .filter(|ip| !ip.is_empty());

        Ok(Self {
            algorithm,
            ports,
            source_ranges,
            requested_ip,
        })
    }
}

fn service_key(service: &Service) -> String {
    format!(
        "{}/{}",
        service.namespace().unwrap_or_default(),
        service.name_any()
    )
}

fn warn_incomplete_cleanup(rule_name: &str, report: &CleanupReport) {
    if !report.is_clean() {
        warn!(
            rule = %rule_name,
            deleted = report.deleted,
            failed = report.failures.len(),
            "Some firewall rules could not be deleted"
        );
    }
}

fn record<T>(operation: &str, start: Instant, result: &Result<T>) {
    match result {
        Ok(_) => metrics::record_reconciliation_success(operation, start.elapsed()),
        Err(e) => metrics::record_reconciliation_error(operation, start.elapsed(), e.error_type()),
    }
}

/// The CloudStack load balancer implementation.
#[derive(Clone)]
pub struct CloudStackLoadBalancer {
    apis: CloudApis,
    project_id: Option<String>,
    events: Arc<dyn EventPublisher>,
    patcher: Arc<dyn ServicePatcher>,
}

impl CloudStackLoadBalancer {
    #[must_use]
    pub fn new(
        apis: CloudApis,
        project_id: Option<String>,
        events: Arc<dyn EventPublisher>,
        patcher: Arc<dyn ServicePatcher>,
    ) -> Self {
        Self {
            apis,
            project_id: project_id.filter(|p| !p.is_empty()),
            events,
            patcher,
        }
    }

    fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Canonical load balancer name for `service`.
    #[must_use]
    pub fn name(&self, cluster_name: &str, service: &Service) -> String {
        load_balancer_name(cluster_name, service)
    }

    async fn locate(&self, cluster_name: &str, service: &Service) -> Result<LoadBalancer> {
        let name = self.name(cluster_name, service);
        let legacy_name = legacy_load_balancer_name(service);
        locate(
            self.apis.rules.as_ref(),
            &name,
            Some(&legacy_name),
            self.project_id(),
        )
        .await
    }

    async fn event(&self, service: &Service, type_: EventType, reason: &str, action: &str, note: String) {
        self.events
            .publish(&service.object_ref(&()), type_, reason, action, Some(note))
            .await;
    }

    /// Status of the existing load balancer, or `None` when it has no rules.
    ///
    /// # Errors
    ///
    /// Returns an error if listing rules fails.
    pub async fn get(
        &self,
        cluster_name: &str,
        service: &Service,
    ) -> Result<Option<LoadBalancerStatus>> {
        let start = Instant::now();
        debug!(cluster = %cluster_name, service = %service_key(service), "GetLoadBalancer");

        let result = self.locate(cluster_name, service).await.map(|lb| {
            if lb.rules.is_empty() {
                return None;
            }
            debug!(load_balancer = %lb.name, ip = %lb.public_ip, "Found load balancer");
            Some(load_balancer_status(service, &lb.public_ip))
        });

        record("get", start, &result);
        result
    }

    /// Create the load balancer of `service`, or converge the existing one.
    ///
    /// Annotation changes are written back once at the end, whether or not
    /// reconciliation succeeded. When both fail, the reconciliation error is
    /// returned and the patch error is logged.
    ///
    /// # Errors
    ///
    /// Returns the first validation, lookup or remote call error, or the patch
    /// error if only the write-back failed.
    pub async fn ensure(
        &self,
        cluster_name: &str,
        service: &Service,
        nodes: &[Node],
    ) -> Result<LoadBalancerStatus> {
        let start = Instant::now();
        debug!(cluster = %cluster_name, service = %service_key(service), "EnsureLoadBalancer");

        let mut updated = service.clone();
        let reconciled = self.ensure_service(cluster_name, &mut updated, nodes).await;
        let patched = self.patcher.patch_annotations(service, &updated).await;

        let result = match (reconciled, patched) {
            (Ok(status), Ok(())) => Ok(status),
            (Ok(_), Err(patch_err)) => Err(patch_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(patch_err)) => {
                error!(service = %service_key(service), error = %patch_err, "Failed to patch service annotations");
                Err(e)
            }
        };

        record("ensure", start, &result);
        result
    }

    async fn ensure_service(
        &self,
        cluster_name: &str,
        service: &mut Service,
        nodes: &[Node],
    ) -> Result<LoadBalancerStatus> {
        let plan = ServicePlan::from_service(service)?;

        let mut lb = self.locate(cluster_name, service).await?;
        lb.algorithm = plan.algorithm;

        let hosts = verify_hosts(self.apis.virtual_machines.as_ref(), nodes, self.project_id()).await?;
        lb.host_ids = hosts.host_ids;
        lb.network_id = hosts.network_id;

        let network = self
            .apis
            .networks
            .get_network_by_id(&lb.network_id, self.project_id())
            .await
            .map_err(|e| match e {
                CloudStackError::NotFound { .. } => {
                    LoadBalancerError::NetworkNotFound(lb.network_id.clone())
                }
                e => LoadBalancerError::cloudstack("error retrieving network", e),
            })?;

        let acquired = ensure_public_ip(
            self.apis.addresses.as_ref(),
            &mut lb,
            &network,
            plan.requested_ip.as_deref(),
        )
        .await?;

        if acquired != IpAcquisition::Existing {
            let note = format!(
                "Created new load balancer for service {} with algorithm '{}' and IP address {}",
                service_key(service),
                lb.algorithm,
                lb.public_ip
            );
            info!("{note}");
            self.event(service, EventType::Normal, reasons::CREATED_LOAD_BALANCER, actions::ENSURE, note)
                .await;
        }
        debug!(load_balancer = %lb.name, ip = %lb.public_ip, "Load balancer is associated with IP");

        annotations::set(service, ANNOTATION_LOAD_BALANCER_ADDRESS, &lb.public_ip);

        match self.converge(service, &mut lb, &network, &plan).await {
            Ok(()) => Ok(load_balancer_status(service, &lb.public_ip)),
            Err(e) => {
                if acquired.release_on_failure() {
                    if let Err(release_err) =
                        release_public_ip(self.apis.addresses.as_ref(), &lb).await
                    {
                        error!(ip = %lb.public_ip, error = %release_err, "Attempt to release load balancer IP failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Converge every port, then remove rules no port claimed.
    async fn converge(
        &self,
        service: &Service,
        lb: &mut LoadBalancer,
        network: &Network,
        plan: &ServicePlan,
    ) -> Result<()> {
        let firewall_supported = network.supports_service(FIREWALL_SERVICE_NAME);

        for port in &plan.ports {
            let outcome = reconcile_rule(self.apis.rules.as_ref(), lb, port).await?;

            if !firewall_supported {
                continue;
            }

            let rule = outcome.rule();
            debug!(
                rule = %rule.name,
                protocol = %port.protocol,
                ip = %rule.public_ip,
                port = port.port,
                "Updating firewall rules for load balancer rule"
            );
            let sync = update_firewall_rule(
                self.apis.firewall.as_ref(),
                &rule.public_ip_id,
                port.port,
                port.protocol,
                &plan.source_ranges,
                self.project_id(),
            )
            .await?;
            if sync.changed() {
                info!(rule = %rule.name, cidrs = ?plan.source_ranges, "Firewall rules updated");
            }
            warn_incomplete_cleanup(&rule.name, &sync.cleanup);
        }

        if !firewall_supported {
            let note = format!(
                "LoadBalancerSourceRanges are ignored for Service {} because this CloudStack network does not support it",
                service_key(service)
            );
            warn!("{note}");
            self.event(service, EventType::Warning, reasons::SOURCE_RANGES_IGNORED, actions::ENSURE, note)
                .await;
        }

        let stale: Vec<LoadBalancerRule> = lb.rules.values().cloned().collect();
        for rule in stale {
            let (protocol, port) = rule_identity(&rule)?;

            debug!(rule = %rule.name, protocol = %protocol, ip = %rule.public_ip, port, "Deleting firewall rules of obsolete load balancer rule");
            let report = delete_firewall_rules(
                self.apis.firewall.as_ref(),
                &rule.public_ip_id,
                port,
                protocol,
                self.project_id(),
            )
            .await?;
            warn_incomplete_cleanup(&rule.name, &report);

            debug!(rule = %rule.name, "Deleting obsolete load balancer rule");
            delete_rule(self.apis.rules.as_ref(), lb, &rule).await?;
        }

        Ok(())
    }

    /// Bring the virtual machines of every rule in line with `nodes`.
    ///
    /// # Errors
    ///
    /// Returns an error if host verification or any membership call fails.
    pub async fn update(&self, cluster_name: &str, service: &Service, nodes: &[Node]) -> Result<()> {
        let start = Instant::now();
        debug!(cluster = %cluster_name, service = %service_key(service), "UpdateLoadBalancer");

        let result = self.update_hosts(cluster_name, service, nodes).await;
        record("update", start, &result);
        result
    }

    async fn update_hosts(&self, cluster_name: &str, service: &Service, nodes: &[Node]) -> Result<()> {
        let lb = self.locate(cluster_name, service).await?;
        let hosts = verify_hosts(self.apis.virtual_machines.as_ref(), nodes, self.project_id()).await?;

        for rule in lb.rules.values() {
            update_rule_hosts(self.apis.rules.as_ref(), rule, &hosts.host_ids).await?;
        }

        Ok(())
    }

    /// Remove the load balancer of `service`.
    ///
    /// Succeeds when nothing is left, including when nothing existed.
    /// Firewall rules of a rule whose protocol or port cannot be parsed are
    /// left in place and logged; the rule itself is still deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails, a rule cannot be deleted, or the IP
    /// cannot be released.
    pub async fn ensure_deleted(&self, cluster_name: &str, service: &Service) -> Result<()> {
        let start = Instant::now();
        debug!(cluster = %cluster_name, service = %service_key(service), "EnsureLoadBalancerDeleted");

        let result = self.delete_load_balancer(cluster_name, service).await;
        record("delete", start, &result);
        result
    }

    async fn delete_load_balancer(&self, cluster_name: &str, service: &Service) -> Result<()> {
        let mut lb = self.locate(cluster_name, service).await?;
        let existed = !lb.rules.is_empty() || !lb.public_ip.is_empty();

        let rules: Vec<LoadBalancerRule> = lb.rules.values().cloned().collect();
        for rule in rules {
            debug!(rule = %rule.name, "Deleting firewall rules for load balancer rule");
            match rule_identity(&rule) {
                Ok((protocol, port)) => {
                    let report = delete_firewall_rules(
                        self.apis.firewall.as_ref(),
                        &rule.public_ip_id,
                        port,
                        protocol,
                        self.project_id(),
                    )
                    .await?;
                    warn_incomplete_cleanup(&rule.name, &report);
                }
                Err(e) => error!(rule = %rule.name, error = %e, "Skipping firewall cleanup"),
            }

            debug!(rule = %rule.name, "Deleting load balancer rule");
            delete_rule(self.apis.rules.as_ref(), &mut lb, &rule).await?;
        }

        if !lb.public_ip.is_empty() {
            debug!(ip = %lb.public_ip, "Releasing load balancer IP");
            release_public_ip(self.apis.addresses.as_ref(), &lb).await?;
        }

        if existed {
            let note = format!("Deleted load balancer {} of service {}", lb.name, service_key(service));
            info!("{note}");
            self.event(service, EventType::Normal, reasons::DELETED_LOAD_BALANCER, actions::DELETE, note)
                .await;
        }

        Ok(())
    }
}
