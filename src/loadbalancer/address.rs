// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Public IP lifecycle.

use super::LoadBalancer;
use crate::cloudstack::{AddressApi, AssociateTarget, Network};
use crate::errors::{LoadBalancerError, Result};
use crate::metrics;
use tracing::{debug, info};

/// How the load balancer got its public IP during this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAcquisition {
    /// The IP was already in use by existing rules
    Existing,
    /// The Service requested this address explicitly
    Requested,
    /// A new address was associated and is owned by this call until it succeeds
    Associated,
}

impl IpAcquisition {
    /// Whether the IP must be released if the rest of the operation fails.
    #[must_use]
    pub fn release_on_failure(self) -> bool {
        self == Self::Associated
    }
}

/// Make sure `lb` has a public IP.
///
/// Keeps the IP found on existing rules. Otherwise looks up `requested_ip`
/// when given, or associates a new IP with the network's VPC (or the network
/// itself when it is not part of a VPC).
///
/// # Errors
///
/// - [`LoadBalancerError::IpAddressNotFound`] if `requested_ip` does not match
///   exactly one address
/// - a CloudStack error if listing or association fails
pub async fn ensure_public_ip(
    addresses: &dyn AddressApi,
    lb: &mut LoadBalancer,
    network: &Network,
    requested_ip: Option<&str>,
) -> Result<IpAcquisition> {
    if lb.has_public_ip() {
        return Ok(IpAcquisition::Existing);
    }

    if let Some(ip) = requested_ip.filter(|ip| !ip.is_empty()) {
        debug!(ip = %ip, "Retrieving load balancer IP details");

        let mut found = addresses
            .list_public_ip_addresses(ip, lb.project_id())
            .await
            .map_err(|e| LoadBalancerError::cloudstack("error retrieving IP address", e))?;

        if found.len() != 1 {
            return Err(LoadBalancerError::IpAddressNotFound {
                ip: ip.to_string(),
                count: found.len(),
            });
        }

        let address = found.remove(0);
        lb.public_ip = address.ip_address;
        lb.public_ip_id = address.id;
        return Ok(IpAcquisition::Requested);
    }

    let target = match network.vpc() {
        Some(vpc_id) => AssociateTarget::Vpc(vpc_id.to_string()),
        None => AssociateTarget::Network(lb.network_id.clone()),
    };
    debug!(load_balancer = %lb.name, target = ?target, "Allocating new IP for load balancer");

    let address = addresses
        .associate_ip_address(&target, lb.project_id())
        .await
        .map_err(|e| LoadBalancerError::cloudstack("error associating new IP address", e))?;
    metrics::record_remote_mutation("public_ip", "create");

    info!(load_balancer = %lb.name, ip = %address.ip_address, "Associated new public IP");
    lb.public_ip = address.ip_address;
    lb.public_ip_id = address.id;

    Ok(IpAcquisition::Associated)
}

/// Release the public IP of `lb`.
///
/// # Errors
///
/// Returns an error if the disassociation fails.
pub async fn release_public_ip(addresses: &dyn AddressApi, lb: &LoadBalancer) -> Result<()> {
    addresses
        .disassociate_ip_address(&lb.public_ip_id)
        .await
        .map_err(|e| {
            LoadBalancerError::cloudstack(
                format!("error releasing load balancer IP {}", lb.public_ip),
                e,
            )
        })?;
    metrics::record_remote_mutation("public_ip", "delete");

    info!(load_balancer = %lb.name, ip = %lb.public_ip, "Released public IP");
    Ok(())
}
