// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Maps Kubernetes Nodes to CloudStack virtual machines.

use crate::cloudstack::VirtualMachineApi;
use crate::errors::{LoadBalancerError, Result};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::HashSet;
use tracing::debug;

/// Virtual machines backing a load balancer and their shared network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedHosts {
    pub host_ids: Vec<String>,
    pub network_id: String,
}

/// Node name as CloudStack knows it: lower-cased, without domain.
fn host_name(node_name: &str) -> String {
    node_name
        .to_lowercase()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Resolve `nodes` to virtual machine ids and check they share one network.
///
/// Virtual machines without NICs are skipped; they show up briefly during
/// rollouts.
///
/// # Errors
///
/// - [`LoadBalancerError::CrossNetwork`] if matching VMs sit on different networks
/// - [`LoadBalancerError::NoMatchingHosts`] if no VM matches any node
/// - a CloudStack error if listing virtual machines fails
pub async fn verify_hosts(
    vm_api: &dyn VirtualMachineApi,
    nodes: &[Node],
    project_id: Option<&str>,
) -> Result<VerifiedHosts> {
    let host_names: HashSet<String> = nodes.iter().map(|n| host_name(&n.name_any())).collect();

    let vms = vm_api
        .list_virtual_machines(project_id)
        .await
        .map_err(|e| LoadBalancerError::cloudstack("error retrieving list of hosts", e))?;

    let mut host_ids = Vec::new();
    let mut network_id = String::new();

    for vm in vms {
        if !host_names.contains(&vm.name.to_lowercase()) {
            continue;
        }
        let Some(nic) = vm.nic.first() else {
            debug!(vm = %vm.name, "Skipping virtual machine without network interfaces");
            continue;
        };

        if !network_id.is_empty() && network_id != nic.network_id {
            return Err(LoadBalancerError::CrossNetwork);
        }

        network_id.clone_from(&nic.network_id);
        host_ids.push(vm.id);
    }

    if host_ids.is_empty() || network_id.is_empty() {
        return Err(LoadBalancerError::NoMatchingHosts);
    }

    Ok(VerifiedHosts {
        host_ids,
        network_id,
    })
}
