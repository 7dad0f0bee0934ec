// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Firewall rule convergence.
//!
//! A firewall rule is identified by (public IP id, protocol, start port, end
//! port). For each load balancer port exactly one rule with exactly the
//! allowed CIDR list should exist. Drift can leave several rules with the same
//! identity; all but the matching one are removed.
//!
//! Two failure policies apply and are kept apart:
//! - listing and creating rules abort the operation (`?`)
//! - deleting superfluous rules is best effort: failures are collected in a
//!   [`CleanupReport`] and logged, and the remaining deletions still run

use crate::cloudstack::{CloudStackError, CreateFirewallRuleParams, FirewallApi, FirewallRule};
use crate::constants::{DEFAULT_ALLOWED_CIDR, PROTO_ICMP, PROTO_TCP, PROTO_UDP};
use crate::errors::{LoadBalancerError, Result};
use crate::metrics;
use crate::protocol::LoadBalancerProtocol;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error};

/// Outcome of a best-effort deletion pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of rules deleted
    pub deleted: usize,
    /// Rule ids that could not be deleted, with the error
    pub failures: Vec<(String, CloudStackError)>,
}

impl CleanupReport {
    /// Whether every deletion succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of [`update_firewall_rule`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FirewallSync {
    /// A new rule was created
    pub created: bool,
    /// Superfluous rules removed
    pub cleanup: CleanupReport,
}

impl FirewallSync {
    /// Whether anything changed in CloudStack.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created || self.cleanup.deleted > 0
    }
}

/// Log rendering of a firewall rule.
pub struct RuleDisplay<'a>(pub &'a FirewallRule);

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = self.0;
        match rule.protocol.as_str() {
            PROTO_TCP | PROTO_UDP => write!(
                f,
                "{{[{}] -> {}:[{}-{}] ({})}}",
                rule.cidr_list, rule.ip_address, rule.start_port, rule.end_port, rule.protocol
            ),
            PROTO_ICMP => write!(
                f,
                "{{[{}] -> {} [{},{}] ({})}}",
                rule.cidr_list, rule.ip_address, rule.icmp_type, rule.icmp_code, rule.protocol
            ),
            _ => write!(
                f,
                "{{[{}] -> {} ({})}}",
                rule.cidr_list, rule.ip_address, rule.protocol
            ),
        }
    }
}

/// Render a list of rules for logs; `none` when empty.
#[must_use]
pub fn rules_to_string<'a>(rules: impl IntoIterator<Item = &'a FirewallRule>) -> String {
    let rendered: Vec<String> = rules
        .into_iter()
        .map(|rule| RuleDisplay(rule).to_string())
        .collect();

    if rendered.is_empty() {
        "none".to_string()
    } else {
        rendered.join(", ")
    }
}

/// Compare two CIDR lists ignoring order but counting duplicates.
#[must_use]
pub fn same_cidrs(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut counts: HashMap<&str, i64> = HashMap::new();
    for cidr in a {
        *counts.entry(cidr.as_str()).or_default() += 1;
    }
    for cidr in b {
        match counts.get_mut(cidr.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => return false,
        }
    }

    counts.values().all(|count| *count == 0)
}

fn matches_port(rule: &FirewallRule, protocol: LoadBalancerProtocol, port: i32) -> bool {
    rule.protocol == protocol.ip_protocol() && rule.start_port == port && rule.end_port == port
}

async fn list_matching(
    api: &dyn FirewallApi,
    ip_address_id: &str,
    port: i32,
    protocol: LoadBalancerProtocol,
    project_id: Option<&str>,
) -> Result<Vec<FirewallRule>> {
    let rules = api
        .list_firewall_rules(ip_address_id, project_id)
        .await
        .map_err(|e| {
            LoadBalancerError::cloudstack(
                format!("error fetching firewall rules for public IP {ip_address_id}"),
                e,
            )
        })?;
    debug!(ip_address_id = %ip_address_id, rules = %rules_to_string(&rules), "Existing firewall rules");

    Ok(rules
        .into_iter()
        .filter(|rule| matches_port(rule, protocol, port))
        .collect())
}

/// Delete `rules`, continuing past failures.
async fn delete_all(api: &dyn FirewallApi, rules: &[FirewallRule]) -> CleanupReport {
    let mut report = CleanupReport::default();

    for rule in rules {
        match api.delete_firewall_rule(&rule.id).await {
            Ok(()) => {
                metrics::record_remote_mutation("firewall_rule", "delete");
                report.deleted += 1;
            }
            Err(e) => {
                error!(rule_id = %rule.id, rule = %RuleDisplay(rule), error = %e, "Error deleting old firewall rule");
                report.failures.push((rule.id.clone(), e));
            }
        }
    }

    report
}

/// Ensure exactly one firewall rule for `(ip, protocol, port)` allows exactly
/// `allowed_cidrs`.
///
/// An empty CIDR list allows everything. Rules with the same identity but a
/// different CIDR list are deleted before the new rule is created, to avoid
/// CloudStack rule conflicts.
///
/// # Errors
///
/// Returns an error if listing or creating rules fails. Failed deletions are
/// reported in [`FirewallSync::cleanup`] instead.
pub async fn update_firewall_rule(
    api: &dyn FirewallApi,
    ip_address_id: &str,
    port: i32,
    protocol: LoadBalancerProtocol,
    allowed_cidrs: &[String],
    project_id: Option<&str>,
) -> Result<FirewallSync> {
    let allowed: Vec<String> = if allowed_cidrs.is_empty() {
        vec![DEFAULT_ALLOWED_CIDR.to_string()]
    } else {
        allowed_cidrs.to_vec()
    };

    let mut candidates = list_matching(api, ip_address_id, port, protocol, project_id).await?;
    debug!(ip_address_id = %ip_address_id, rules = %rules_to_string(&candidates), "Matching firewall rules");

    let keep = candidates
        .iter()
        .position(|rule| same_cidrs(&rule.cidrs(), &allowed));
    if let Some(index) = keep {
        let kept = candidates.remove(index);
        debug!(rule = %RuleDisplay(&kept), "Found identical firewall rule");
    }

    debug!(ip_address_id = %ip_address_id, rules = %rules_to_string(&candidates), "Firewall rules to be deleted");
    let cleanup = delete_all(api, &candidates).await;

    if keep.is_some() {
        return Ok(FirewallSync {
            created: false,
            cleanup,
        });
    }

    let params = CreateFirewallRuleParams {
        ip_address_id: ip_address_id.to_string(),
        protocol: protocol.ip_protocol().to_string(),
        cidr_list: allowed.clone(),
        start_port: port,
        end_port: port,
    };
    api.create_firewall_rule(&params).await.map_err(|e| {
        LoadBalancerError::cloudstack(
            format!(
                "error creating new firewall rule for public IP {ip_address_id}, proto {}, port {port}, allowed {allowed:?}",
                protocol.ip_protocol()
            ),
            e,
        )
    })?;
    metrics::record_remote_mutation("firewall_rule", "create");

    Ok(FirewallSync {
        created: true,
        cleanup,
    })
}

/// Delete every firewall rule for `(ip, protocol, port)`.
///
/// No matching rule is not an error.
///
/// # Errors
///
/// Returns an error if listing rules fails. Failed deletions are reported in
/// the returned [`CleanupReport`].
pub async fn delete_firewall_rules(
    api: &dyn FirewallApi,
    ip_address_id: &str,
    port: i32,
    protocol: LoadBalancerProtocol,
    project_id: Option<&str>,
) -> Result<CleanupReport> {
    let matching = list_matching(api, ip_address_id, port, protocol, project_id).await?;
    Ok(delete_all(api, &matching).await)
}
