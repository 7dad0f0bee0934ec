// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finds the existing rules of a Service's load balancer.

use super::LoadBalancer;
use crate::cloudstack::{LoadBalancerRule, LoadBalancerRuleApi};
use crate::errors::{LoadBalancerError, Result};
use crate::protocol::LoadBalancerProtocol;
use tracing::{debug, warn};

/// Build the [`LoadBalancer`] view for `name`, falling back to `legacy_name`.
///
/// CloudStack matches `keyword` as a substring, so results are narrowed to
/// rules named exactly `<name>-<protocol>-<port>`. When nothing exists under the canonical name but
/// rules exist under the legacy name, the returned load balancer takes the
/// legacy name so those rules are updated in place rather than duplicated.
///
/// An empty result is valid: the load balancer simply does not exist yet.
///
/// # Errors
///
/// Returns an error if listing rules fails.
pub async fn locate(
    rules_api: &dyn LoadBalancerRuleApi,
    name: &str,
    legacy_name: Option<&str>,
    project_id: Option<&str>,
) -> Result<LoadBalancer> {
    let mut lb = LoadBalancer::new(name, project_id.map(str::to_string));

    let mut found = list_rules(rules_api, name, project_id).await?;

    if found.is_empty() {
        let Some(legacy_name) = legacy_name.filter(|n| !n.is_empty()) else {
            return Ok(lb);
        };

        found = list_rules(rules_api, legacy_name, project_id).await?;
        if !found.is_empty() {
            debug!(name = %name, legacy_name = %legacy_name, "Found load balancer under legacy name");
            lb.name = legacy_name.to_string();
        }
    }

    for rule in found {
        if !lb.public_ip.is_empty() && lb.public_ip != rule.public_ip {
            warn!(
                load_balancer = %lb.name,
                ip = %lb.public_ip,
                other_ip = %rule.public_ip,
                "Load balancer has rules associated with different IPs"
            );
        }

        lb.public_ip.clone_from(&rule.public_ip);
        lb.public_ip_id.clone_from(&rule.public_ip_id);
        lb.rules.insert(rule.name.clone(), rule);
    }

    debug!(load_balancer = %lb.name, rules = lb.rules.len(), "Located load balancer");

    Ok(lb)
}

/// Whether `rule_name` is `<name>-<protocol>-<port>`.
///
/// `web` must not claim `web-2-tcp-8080`, so the suffix has to parse as a
/// known protocol and a port.
#[must_use]
pub fn is_rule_of(name: &str, rule_name: &str) -> bool {
    let Some(suffix) = rule_name
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };

    suffix.rsplit_once('-').is_some_and(|(protocol, port)| {
        LoadBalancerProtocol::from_load_balancer(protocol).is_some()
            && port.parse::<u16>().is_ok()
    })
}

async fn list_rules(
    rules_api: &dyn LoadBalancerRuleApi,
    name: &str,
    project_id: Option<&str>,
) -> Result<Vec<LoadBalancerRule>> {
    let rules = rules_api
        .list_load_balancer_rules(name, project_id)
        .await
        .map_err(|e| LoadBalancerError::cloudstack("error retrieving load balancer rules", e))?;

    Ok(rules
        .into_iter()
        .filter(|rule| is_rule_of(name, &rule.name))
        .collect())
}
