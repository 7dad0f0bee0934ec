// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Load balancer reconciliation error types.
//!
//! Errors fall into a few families:
//! - Validation errors, raised before any remote mutation (no ports,
//!   unsupported affinity or protocol, invalid source ranges)
//! - Host verification errors (backends on several networks, no matching VMs)
//! - Lookup errors (requested IP or network not found)
//! - Remote call failures, wrapping [`CloudStackError`] with context
//! - Patch failures when writing annotations back to the Service

use crate::cloudstack::CloudStackError;
use thiserror::Error;

/// Errors returned by the reconciliation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadBalancerError {
    /// The Service declares no ports
    #[error("requested load balancer with no ports")]
    NoPorts,

    /// The Service session affinity has no CloudStack equivalent
    #[error("unsupported load balancer affinity: {0}")]
    UnsupportedAffinity(String),

    /// A Service port uses a protocol CloudStack cannot balance
    #[error("unsupported load balancer protocol: {protocol} (port {port})")]
    UnsupportedProtocol {
        /// Protocol as declared on the Service port
        protocol: String,
        /// Service port number
        port: i32,
    },

    /// A Service port has no node port allocated yet
    #[error("service port {port} has no node port assigned")]
    MissingNodePort {
        /// Service port number
        port: i32,
    },

    /// The allowed source ranges could not be parsed
    #[error("{origin}: {value} is not valid. Expecting a list of IP ranges, for example 10.0.0.0/24: {reason}")]
    InvalidSourceRange {
        /// Where the ranges came from (spec field or annotation key)
        origin: String,
        /// Offending input
        value: String,
        /// Parser message
        reason: String,
    },

    /// Backend hosts are attached to more than one network
    #[error("found hosts that belong to different networks")]
    CrossNetwork,

    /// None of the nodes matched a CloudStack virtual machine
    #[error("none of the hosts matched the list of VMs retrieved from CS API")]
    NoMatchingHosts,

    /// The explicitly requested IP did not resolve to exactly one address
    #[error("could not find IP address {ip} (found {count} matches)")]
    IpAddressNotFound {
        /// Requested address
        ip: String,
        /// Number of matches returned
        count: usize,
    },

    /// The backend network does not exist
    #[error("could not find network {0}")]
    NetworkNotFound(String),

    /// An existing load balancer rule carries a protocol or port we cannot parse
    #[error("error parsing load balancer rule {rule}: {reason}")]
    InvalidRule {
        /// Rule name
        rule: String,
        /// What could not be parsed
        reason: String,
    },

    /// A CloudStack API call failed
    #[error("{context}: {source}")]
    CloudStack {
        /// What was being attempted
        context: String,
        /// Underlying API error
        #[source]
        source: CloudStackError,
    },

    /// Writing annotations back to the Service failed
    #[error("failed to patch service object {service}: {reason}")]
    Patch {
        /// `namespace/name` of the Service
        service: String,
        /// Underlying error
        reason: String,
    },
}

/// Result type for reconciliation operations.
pub type Result<T, E = LoadBalancerError> = std::result::Result<T, E>;

impl LoadBalancerError {
    /// Wrap a CloudStack error with a description of the failed step.
    pub fn cloudstack(context: impl Into<String>, source: CloudStackError) -> Self {
        Self::CloudStack {
            context: context.into(),
            source,
        }
    }

    /// Returns true if the error was raised by input validation, before any
    /// remote mutation took place.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoPorts
                | Self::UnsupportedAffinity(_)
                | Self::UnsupportedProtocol { .. }
                | Self::MissingNodePort { .. }
                | Self::InvalidSourceRange { .. }
        )
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoPorts
            | Self::UnsupportedAffinity(_)
            | Self::UnsupportedProtocol { .. }
            | Self::MissingNodePort { .. }
            | Self::InvalidSourceRange { .. } => "validation",
            Self::CrossNetwork => "cross_network",
            Self::NoMatchingHosts => "no_matching_hosts",
            Self::IpAddressNotFound { .. } => "ip_not_found",
            Self::NetworkNotFound(_) => "network_not_found",
            Self::InvalidRule { .. } => "invalid_rule",
            Self::CloudStack { .. } => "cloudstack_api",
            Self::Patch { .. } => "patch",
        }
    }

    /// Kubernetes Event reason for this error.
    #[must_use]
    pub fn event_reason(&self) -> &'static str {
        match self {
            Self::NoPorts
            | Self::UnsupportedAffinity(_)
            | Self::UnsupportedProtocol { .. }
            | Self::MissingNodePort { .. }
            | Self::InvalidSourceRange { .. } => "InvalidLoadBalancerSpec",
            Self::CrossNetwork | Self::NoMatchingHosts => "LoadBalancerHostsInvalid",
            Self::IpAddressNotFound { .. } | Self::NetworkNotFound(_) => "LoadBalancerLookupFailed",
            Self::InvalidRule { .. } | Self::CloudStack { .. } => "SyncLoadBalancerFailed",
            Self::Patch { .. } => "ServicePatchFailed",
        }
    }
}
