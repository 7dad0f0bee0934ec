// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Load balancer rule convergence.
//!
//! Each Service port owns one rule named `<lb>-<protocol>-<port>`. A rule is
//! created when missing, updated in place when only its algorithm or protocol
//! differ, and replaced when its public IP, public port or node port changed.
//! Matched rules leave `LoadBalancer::rules`, so whatever remains after all
//! ports are processed is stale.

use super::{LoadBalancer, PortPlan};
use crate::cloudstack::{CreateLoadBalancerRuleParams, LoadBalancerRule, LoadBalancerRuleApi};
use crate::errors::{LoadBalancerError, Result};
use crate::metrics;
use crate::protocol::LoadBalancerProtocol;
use tracing::{debug, info};

/// What happened to the rule of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Created(LoadBalancerRule),
    Updated(LoadBalancerRule),
    Unchanged(LoadBalancerRule),
}

impl RuleOutcome {
    #[must_use]
    pub fn rule(&self) -> &LoadBalancerRule {
        match self {
            Self::Created(rule) | Self::Updated(rule) | Self::Unchanged(rule) => rule,
        }
    }
}

/// Converge the rule for one Service port.
///
/// Newly created rules get every host of `lb` assigned.
///
/// # Errors
///
/// Returns the first failing create, update, delete or assign call.
pub async fn reconcile_rule(
    rules_api: &dyn LoadBalancerRuleApi,
    lb: &mut LoadBalancer,
    plan: &PortPlan,
) -> Result<RuleOutcome> {
    let rule_name = lb.rule_name(plan.protocol, plan.port);

    if let Some(existing) = lb.rules.get(&rule_name).cloned() {
        if is_compatible(&existing, lb, plan) {
            lb.rules.remove(&rule_name);

            if existing.algorithm == lb.algorithm.as_str()
                && existing.protocol == plan.protocol.cs_protocol()
            {
                debug!(rule = %rule_name, "Load balancer rule is up-to-date");
                return Ok(RuleOutcome::Unchanged(existing));
            }

            debug!(rule = %rule_name, "Updating load balancer rule");
            rules_api
                .update_load_balancer_rule(
                    &existing.id,
                    lb.algorithm.as_str(),
                    plan.protocol.cs_protocol(),
                )
                .await
                .map_err(|e| {
                    LoadBalancerError::cloudstack(
                        format!("error updating load balancer rule {rule_name}"),
                        e,
                    )
                })?;
            metrics::record_remote_mutation("load_balancer_rule", "update");

            let mut updated = existing;
            updated.algorithm = lb.algorithm.as_str().to_string();
            updated.protocol = plan.protocol.cs_protocol().to_string();
            return Ok(RuleOutcome::Updated(updated));
        }

        info!(rule = %rule_name, "Replacing load balancer rule with changed IP or ports");
        delete_rule(rules_api, lb, &existing).await?;
    }

    debug!(rule = %rule_name, "Creating load balancer rule");
    let rule = create_rule(rules_api, lb, &rule_name, plan).await?;

    debug!(rule = %rule_name, hosts = ?lb.host_ids, "Assigning hosts to load balancer rule");
    assign_hosts(rules_api, &rule, &lb.host_ids).await?;

    Ok(RuleOutcome::Created(rule))
}

/// Whether `rule` can be kept for `plan`: same public IP, node port and public port.
fn is_compatible(rule: &LoadBalancerRule, lb: &LoadBalancer, plan: &PortPlan) -> bool {
    rule.public_ip == lb.public_ip
        && rule.private_port == plan.node_port.to_string()
        && rule.public_port == plan.port.to_string()
}

async fn create_rule(
    rules_api: &dyn LoadBalancerRuleApi,
    lb: &LoadBalancer,
    rule_name: &str,
    plan: &PortPlan,
) -> Result<LoadBalancerRule> {
    let params = CreateLoadBalancerRuleParams {
        name: rule_name.to_string(),
        algorithm: lb.algorithm.as_str().to_string(),
        protocol: plan.protocol.cs_protocol().to_string(),
        private_port: plan.node_port,
        public_port: plan.port,
        network_id: lb.network_id.clone(),
        public_ip_id: lb.public_ip_id.clone(),
        // Firewall rules are managed explicitly
        open_firewall: false,
    };

    let rule = rules_api
        .create_load_balancer_rule(&params)
        .await
        .map_err(|e| {
            LoadBalancerError::cloudstack(format!("error creating load balancer rule {rule_name}"), e)
        })?;
    metrics::record_remote_mutation("load_balancer_rule", "create");

    info!(rule = %rule_name, ip = %lb.public_ip, port = plan.port, "Created load balancer rule");
    Ok(rule)
}

/// Delete a rule and forget it.
///
/// # Errors
///
/// Returns an error if the delete call fails; the rule is kept in that case.
pub async fn delete_rule(
    rules_api: &dyn LoadBalancerRuleApi,
    lb: &mut LoadBalancer,
    rule: &LoadBalancerRule,
) -> Result<()> {
    rules_api
        .delete_load_balancer_rule(&rule.id)
        .await
        .map_err(|e| {
            LoadBalancerError::cloudstack(
                format!("error deleting load balancer rule {}", rule.name),
                e,
            )
        })?;
    metrics::record_remote_mutation("load_balancer_rule", "delete");

    lb.rules.remove(&rule.name);
    info!(rule = %rule.name, "Deleted load balancer rule");
    Ok(())
}

/// Assign virtual machines to a rule. An empty list is a no-op.
///
/// # Errors
///
/// Returns an error if the assign call fails.
pub async fn assign_hosts(
    rules_api: &dyn LoadBalancerRuleApi,
    rule: &LoadBalancerRule,
    host_ids: &[String],
) -> Result<()> {
    if host_ids.is_empty() {
        return Ok(());
    }

    rules_api
        .assign_to_load_balancer_rule(&rule.id, host_ids)
        .await
        .map_err(|e| {
            LoadBalancerError::cloudstack(
                format!("error assigning hosts to load balancer rule {}", rule.name),
                e,
            )
        })?;
    metrics::record_remote_mutation("rule_assignment", "assign");
    Ok(())
}

/// Remove virtual machines from a rule. An empty list is a no-op.
///
/// # Errors
///
/// Returns an error if the remove call fails.
pub async fn remove_hosts(
    rules_api: &dyn LoadBalancerRuleApi,
    rule: &LoadBalancerRule,
    host_ids: &[String],
) -> Result<()> {
    if host_ids.is_empty() {
        return Ok(());
    }

    rules_api
        .remove_from_load_balancer_rule(&rule.id, host_ids)
        .await
        .map_err(|e| {
            LoadBalancerError::cloudstack(
                format!("error removing hosts from load balancer rule {}", rule.name),
                e,
            )
        })?;
    metrics::record_remote_mutation("rule_assignment", "remove");
    Ok(())
}

/// Protocol and public port of an existing rule.
///
/// # Errors
///
/// Returns [`LoadBalancerError::InvalidRule`] if either cannot be parsed.
pub fn rule_identity(rule: &LoadBalancerRule) -> Result<(LoadBalancerProtocol, i32)> {
    let protocol = LoadBalancerProtocol::from_load_balancer(&rule.protocol).ok_or_else(|| {
        LoadBalancerError::InvalidRule {
            rule: rule.name.clone(),
            reason: format!("unknown protocol {:?}", rule.protocol),
        }
    })?;

    let port = rule
        .public_port
        .parse::<i32>()
        .map_err(|e| LoadBalancerError::InvalidRule {
            rule: rule.name.clone(),
            reason: format!("invalid port {:?}: {e}", rule.public_port),
        })?;

    Ok((protocol, port))
}
