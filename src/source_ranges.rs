// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resolution of the CIDR ranges allowed to reach a load balancer.
//!
//! `spec.loadBalancerSourceRanges` wins when non-empty. Otherwise the
//! comma-separated `service.beta.kubernetes.io/load-balancer-source-ranges`
//! annotation is used, and when that is absent or blank every source is
//! allowed (`0.0.0.0/0`).
//!
//! Each entry must be an address with a prefix length. Entries are normalised
//! to their network address (`10.0.0.7/24` becomes `10.0.0.0/24`), duplicates
//! collapse, and the result is sorted.

use crate::annotations;
use crate::constants::{ANNOTATION_LOAD_BALANCER_SOURCE_RANGES, DEFAULT_ALLOWED_CIDR};
use crate::errors::{LoadBalancerError, Result};
use ipnetwork::IpNetwork;
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeSet;

const SPEC_FIELD: &str = "service.Spec.LoadBalancerSourceRanges";

/// Allowed source CIDRs for a Service.
///
/// # Errors
///
/// Returns [`LoadBalancerError::InvalidSourceRange`] if any entry is not a
/// valid CIDR.
pub fn load_balancer_source_ranges(service: &Service) -> Result<Vec<String>> {
    let from_spec = service
        .spec
        .as_ref()
        .and_then(|spec| spec.load_balancer_source_ranges.as_ref())
        .filter(|ranges| !ranges.is_empty());

    if let Some(ranges) = from_spec {
        return parse_cidrs(ranges.iter().map(String::as_str)).map_err(|reason| {
            LoadBalancerError::InvalidSourceRange {
                origin: SPEC_FIELD.to_string(),
                value: format!("{ranges:?}"),
                reason,
            }
        });
    }

    let annotation = annotations::get_string(service, ANNOTATION_LOAD_BALANCER_SOURCE_RANGES, "");
    let value = match annotation.trim() {
        "" => DEFAULT_ALLOWED_CIDR,
        v => v,
    };

    parse_cidrs(value.split(',')).map_err(|reason| LoadBalancerError::InvalidSourceRange {
        origin: ANNOTATION_LOAD_BALANCER_SOURCE_RANGES.to_string(),
        value: value.to_string(),
        reason,
    })
}

fn parse_cidrs<'a>(
    specs: impl Iterator<Item = &'a str>,
) -> std::result::Result<Vec<String>, String> {
    let mut networks = BTreeSet::new();

    for spec in specs {
        let spec = spec.trim();
        if !spec.contains('/') {
            return Err(format!("invalid CIDR address: {spec}"));
        }

        let parsed: IpNetwork = spec
            .parse()
            .map_err(|e| format!("invalid CIDR address: {spec}: {e}"))?;
        let network = IpNetwork::new(parsed.network(), parsed.prefix())
            .map_err(|e| format!("invalid CIDR address: {spec}: {e}"))?;

        networks.insert(network.to_string());
    }

    Ok(networks.into_iter().collect())
}
