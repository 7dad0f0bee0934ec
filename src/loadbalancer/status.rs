// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service `status.loadBalancer` composition.

use crate::annotations;
use crate::constants::{
    ANNOTATION_LOAD_BALANCER_HOSTNAME, ANNOTATION_PROXY_PROTOCOL, IP_MODE_PROXY, IP_MODE_VIP,
};
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Service};

/// Status reported for a load balancer on `ip`.
///
/// An explicit hostname annotation replaces the IP entirely, so in-cluster
/// clients go through the load balancer when the PROXY protocol is on.
/// Otherwise the IP is reported with `ipMode: Proxy` when the PROXY protocol
/// is enabled and `ipMode: VIP` when it is not.
#[must_use]
pub fn load_balancer_status(service: &Service, ip: &str) -> LoadBalancerStatus {
    let hostname = annotations::get_string(service, ANNOTATION_LOAD_BALANCER_HOSTNAME, "");
    if !hostname.is_empty() {
        return LoadBalancerStatus {
            ingress: Some(vec![LoadBalancerIngress {
                hostname: Some(hostname),
                ..Default::default()
            }]),
        };
    }

    let ip_mode = if annotations::get_bool(service, ANNOTATION_PROXY_PROTOCOL, false) {
        IP_MODE_PROXY
    } else {
        IP_MODE_VIP
    };

    LoadBalancerStatus {
        ingress: Some(vec![LoadBalancerIngress {
            ip: Some(ip.to_string()),
            ip_mode: Some(ip_mode.to_string()),
            ..Default::default()
        }]),
    }
}
