// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Protocol mapping between Kubernetes service ports and CloudStack.
//!
//! CloudStack uses two vocabularies: load balancer rules accept `tcp`, `udp`
//! and `tcp-proxy`, while firewall rules only know IP protocols (`tcp`, `udp`,
//! `icmp`). [`LoadBalancerProtocol`] is the closed set of protocols this
//! controller can handle, with a conversion to each vocabulary.

use crate::constants::{PROTO_ICMP, PROTO_TCP, PROTO_TCP_PROXY, PROTO_UDP};
use k8s_openapi::api::core::v1::ServicePort;
use std::fmt;

/// A protocol supported by CloudStack load balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadBalancerProtocol {
    Tcp,
    Udp,
    /// TCP with the PROXY protocol header
    TcpProxy,
    Icmp,
}

impl LoadBalancerProtocol {
    /// Protocol name for load balancer rules.
    #[must_use]
    pub fn cs_protocol(self) -> &'static str {
        match self {
            Self::Tcp => PROTO_TCP,
            Self::Udp => PROTO_UDP,
            Self::TcpProxy => PROTO_TCP_PROXY,
            Self::Icmp => PROTO_ICMP,
        }
    }

    /// Protocol name for firewall rules.
    ///
    /// The PROXY protocol is carried over plain TCP.
    #[must_use]
    pub fn ip_protocol(self) -> &'static str {
        match self {
            Self::Tcp | Self::TcpProxy => PROTO_TCP,
            Self::Udp => PROTO_UDP,
            Self::Icmp => PROTO_ICMP,
        }
    }

    /// Map a Service port to a load balancer protocol.
    ///
    /// A port without an explicit protocol is TCP, as in the Kubernetes API
    /// defaults. TCP becomes [`Self::TcpProxy`] when `proxy_protocol` is set.
    /// Returns `None` for protocols CloudStack cannot balance (e.g. SCTP).
    #[must_use]
    pub fn from_service_port(port: &ServicePort, proxy_protocol: bool) -> Option<Self> {
        match port.protocol.as_deref().unwrap_or("TCP") {
            "TCP" if proxy_protocol => Some(Self::TcpProxy),
            "TCP" => Some(Self::Tcp),
            "UDP" => Some(Self::Udp),
            _ => None,
        }
    }

    /// Parse the protocol stored on an existing load balancer rule.
    #[must_use]
    pub fn from_load_balancer(protocol: &str) -> Option<Self> {
        match protocol {
            PROTO_TCP => Some(Self::Tcp),
            PROTO_UDP => Some(Self::Udp),
            PROTO_TCP_PROXY => Some(Self::TcpProxy),
            PROTO_ICMP => Some(Self::Icmp),
            _ => None,
        }
    }
}

impl fmt::Display for LoadBalancerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cs_protocol())
    }
}
