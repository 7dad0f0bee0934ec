// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed CloudStack API records.
//!
//! Field names follow the CloudStack JSON wire format. Every field defaults
//! when absent because CloudStack omits empty values from its responses.

use serde::{Deserialize, Serialize};

/// A load balancer rule as returned by `listLoadBalancerRules`.
///
/// Ports are kept as the strings CloudStack returns; callers parse them where
/// a number is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerRule {
    pub id: String,
    pub name: String,
    pub algorithm: String,
    pub protocol: String,
    #[serde(rename = "publicip")]
    pub public_ip: String,
    #[serde(rename = "publicipid")]
    pub public_ip_id: String,
    #[serde(rename = "publicport")]
    pub public_port: String,
    #[serde(rename = "privateport")]
    pub private_port: String,
    #[serde(rename = "networkid")]
    pub network_id: String,
    #[serde(rename = "cidrlist")]
    pub cidr_list: String,
}

/// A firewall rule as returned by `listFirewallRules`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallRule {
    pub id: String,
    pub protocol: String,
    #[serde(rename = "startport")]
    pub start_port: i32,
    #[serde(rename = "endport")]
    pub end_port: i32,
    #[serde(rename = "ipaddressid")]
    pub ip_address_id: String,
    #[serde(rename = "ipaddress")]
    pub ip_address: String,
    /// Comma-separated CIDR list
    #[serde(rename = "cidrlist")]
    pub cidr_list: String,
    #[serde(rename = "icmptype")]
    pub icmp_type: i32,
    #[serde(rename = "icmpcode")]
    pub icmp_code: i32,
}

impl FirewallRule {
    /// CIDR entries of this rule, in wire order.
    #[must_use]
    pub fn cidrs(&self) -> Vec<String> {
        self.cidr_list.split(',').map(str::to_string).collect()
    }
}

/// A public IP address as returned by `listPublicIpAddresses` or
/// `associateIpAddress`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicIpAddress {
    pub id: String,
    #[serde(rename = "ipaddress")]
    pub ip_address: String,
    #[serde(rename = "associatednetworkid")]
    pub associated_network_id: String,
    #[serde(rename = "vpcid")]
    pub vpc_id: String,
}

/// A service offered by a network (e.g. `Firewall`, `Lb`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkService {
    pub name: String,
}

/// A guest network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub id: String,
    pub name: String,
    #[serde(rename = "vpcid")]
    pub vpc_id: String,
    pub service: Vec<NetworkService>,
}

impl Network {
    /// Whether the network advertises the given service.
    #[must_use]
    pub fn supports_service(&self, name: &str) -> bool {
        self.service.iter().any(|svc| svc.name == name)
    }

    /// VPC the network belongs to, if any.
    #[must_use]
    pub fn vpc(&self) -> Option<&str> {
        (!self.vpc_id.is_empty()).then_some(self.vpc_id.as_str())
    }
}

/// A virtual machine network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nic {
    pub id: String,
    #[serde(rename = "networkid")]
    pub network_id: String,
    #[serde(rename = "ipaddress")]
    pub ip_address: String,
}

/// A virtual machine as returned by `listVirtualMachines` or
/// `listLoadBalancerRuleInstances`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub nic: Vec<Nic>,
}

/// Parameters for `createLoadBalancerRule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLoadBalancerRuleParams {
    pub name: String,
    pub algorithm: String,
    pub protocol: String,
    pub private_port: i32,
    pub public_port: i32,
    pub network_id: String,
    pub public_ip_id: String,
    /// Whether CloudStack should open the firewall for the rule implicitly
    pub open_firewall: bool,
}

/// Parameters for `createFirewallRule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFirewallRuleParams {
    pub ip_address_id: String,
    pub protocol: String,
    pub cidr_list: Vec<String>,
    pub start_port: i32,
    pub end_port: i32,
}

/// Where a newly associated public IP is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociateTarget {
    /// Attach to a VPC (required when the network belongs to one)
    Vpc(String),
    /// Attach directly to an isolated network
    Network(String),
}
