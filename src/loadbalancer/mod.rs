// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The per-call load balancer aggregate and the components converging it.
//!
//! A [`LoadBalancer`] is built fresh by [`locator::locate`] at the start of
//! every operation, threaded by `&mut` through the components below, and
//! dropped when the operation returns. Nothing is cached between calls.
//!
//! - [`locator`] - find existing rules by canonical or legacy name
//! - [`hosts`] - map Nodes to virtual machines on a single network
//! - [`address`] - acquire and release the public IP
//! - [`rules`] - converge one load balancer rule per Service port
//! - [`assignment`] - keep rule membership in sync with the node set
//! - [`firewall`] - converge firewall rules to the allowed source ranges
//! - [`status`] - build the Service `status.loadBalancer`

pub mod address;
pub mod assignment;
pub mod firewall;
pub mod hosts;
pub mod locator;
pub mod rules;
pub mod status;

use crate::cloudstack::LoadBalancerRule;
use crate::constants::{
    ALGORITHM_ROUND_ROBIN, ALGORITHM_SOURCE, SESSION_AFFINITY_CLIENT_IP, SESSION_AFFINITY_NONE,
};
use crate::errors::{LoadBalancerError, Result};
use crate::protocol::LoadBalancerProtocol;
use std::collections::BTreeMap;
use std::fmt;

/// CloudStack balancing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    RoundRobin,
    /// Client IP stickiness
    Source,
}

impl Algorithm {
    /// Map a Service `spec.sessionAffinity`; an unset affinity means `None`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::UnsupportedAffinity`] for any other value.
    pub fn from_session_affinity(affinity: Option<&str>) -> Result<Self> {
        match affinity.unwrap_or(SESSION_AFFINITY_NONE) {
            SESSION_AFFINITY_NONE => Ok(Self::RoundRobin),
            SESSION_AFFINITY_CLIENT_IP => Ok(Self::Source),
            other => Err(LoadBalancerError::UnsupportedAffinity(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => ALGORITHM_ROUND_ROBIN,
            Self::Source => ALGORITHM_SOURCE,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of one Service port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPlan {
    pub protocol: LoadBalancerProtocol,
    /// Public port on the load balancer IP
    pub port: i32,
    /// Node port the traffic is forwarded to
    pub node_port: i32,
}

/// Current view of a Service's load balancer in CloudStack.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancer {
    /// Name prefix of every rule; the legacy name when rules were found under it
    pub name: String,
    pub algorithm: Algorithm,
    pub host_ids: Vec<String>,
    pub public_ip: String,
    pub public_ip_id: String,
    pub network_id: String,
    pub project_id: Option<String>,
    /// Rules keyed by rule name
    pub rules: BTreeMap<String, LoadBalancerRule>,
}

impl LoadBalancer {
    #[must_use]
    pub fn new(name: impl Into<String>, project_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            project_id,
            ..Self::default()
        }
    }

    /// Whether both the public IP and its id are known.
    #[must_use]
    pub fn has_public_ip(&self) -> bool {
        !self.public_ip.is_empty() && !self.public_ip_id.is_empty()
    }

    /// Name of the rule for a port: `<name>-<protocol>-<port>`.
    #[must_use]
    pub fn rule_name(&self, protocol: LoadBalancerProtocol, port: i32) -> String {
        format!("{}-{}-{}", self.name, protocol.cs_protocol(), port)
    }

    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

#[cfg(test)]
mod hosts_tests;
