// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Keeps the virtual machines assigned to a rule in sync with the node set.

use super::rules::{assign_hosts, remove_hosts};
use crate::cloudstack::{LoadBalancerRule, LoadBalancerRuleApi, VirtualMachine};
use crate::errors::{LoadBalancerError, Result};
use std::collections::HashSet;
use tracing::debug;

/// Split desired and current membership into `(assign, remove)`.
///
/// `assign` holds desired ids not currently assigned, in desired order;
/// `remove` holds current instances no longer desired, in current order.
/// Neither contains duplicates.
#[must_use]
pub fn symmetric_difference(
    host_ids: &[String],
    current: &[VirtualMachine],
) -> (Vec<String>, Vec<String>) {
    let desired: HashSet<&str> = host_ids.iter().map(String::as_str).collect();
    let assigned: HashSet<&str> = current.iter().map(|vm| vm.id.as_str()).collect();

    let mut assign: Vec<String> = Vec::new();
    for id in host_ids {
        if !assigned.contains(id.as_str()) && !assign.contains(id) {
            assign.push(id.clone());
        }
    }

    let mut remove: Vec<String> = Vec::new();
    for vm in current {
        if !desired.contains(vm.id.as_str()) && !remove.contains(&vm.id) {
            remove.push(vm.id.clone());
        }
    }

    (assign, remove)
}

/// Bring the membership of `rule` to exactly `host_ids`.
///
/// # Errors
///
/// Returns an error if listing, assigning or removing instances fails.
pub async fn update_rule_hosts(
    rules_api: &dyn LoadBalancerRuleApi,
    rule: &LoadBalancerRule,
    host_ids: &[String],
) -> Result<()> {
    let current = rules_api
        .list_load_balancer_rule_instances(&rule.id)
        .await
        .map_err(|e| LoadBalancerError::cloudstack("error retrieving associated instances", e))?;

    let (assign, remove) = symmetric_difference(host_ids, &current);

    if !assign.is_empty() {
        debug!(rule = %rule.name, hosts = ?assign, "Assigning new hosts to load balancer rule");
        assign_hosts(rules_api, rule, &assign).await?;
    }

    if !remove.is_empty() {
        debug!(rule = %rule.name, hosts = ?remove, "Removing old hosts from load balancer rule");
        remove_hosts(rules_api, rule, &remove).await?;
    }

    Ok(())
}
