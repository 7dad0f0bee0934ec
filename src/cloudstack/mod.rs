// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStack API surface consumed by the load balancer reconciler.
//!
//! The platform is modelled as five narrow collaborator traits rather than one
//! monolithic client handle:
//!
//! - [`AddressApi`] - public IP lookup, association and release
//! - [`NetworkApi`] - network lookup
//! - [`LoadBalancerRuleApi`] - load balancer rule CRUD and VM assignment
//! - [`FirewallApi`] - firewall rule listing, creation and deletion
//! - [`VirtualMachineApi`] - virtual machine inventory
//!
//! [`CloudStackClient`] implements all of them over the signed HTTP API.
//! [`CloudApis`] bundles one implementation of each so that components can be
//! handed exactly the capability they need.

pub mod client;
pub mod error;
pub mod signing;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::CloudStackClient;
pub use error::CloudStackError;
pub use types::{
    AssociateTarget, CreateFirewallRuleParams, CreateLoadBalancerRuleParams, FirewallRule,
    LoadBalancerRule, Network, NetworkService, Nic, PublicIpAddress, VirtualMachine,
};

use async_trait::async_trait;
use std::sync::Arc;

/// Result type for CloudStack API calls.
pub type CloudStackResult<T> = Result<T, CloudStackError>;

/// Public IP address operations.
#[async_trait]
pub trait AddressApi: Send + Sync {
    /// List public IPs matching an exact address.
    async fn list_public_ip_addresses(
        &self,
        ip_address: &str,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<PublicIpAddress>>;

    /// Acquire a new public IP attached to a VPC or a network.
    async fn associate_ip_address(
        &self,
        target: &AssociateTarget,
        project_id: Option<&str>,
    ) -> CloudStackResult<PublicIpAddress>;

    /// Release a public IP.
    async fn disassociate_ip_address(&self, id: &str) -> CloudStackResult<()>;
}

/// Network operations.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Fetch a network by id.
    ///
    /// Returns [`CloudStackError::NotFound`] when no network has this id.
    async fn get_network_by_id(&self, id: &str, project_id: Option<&str>)
        -> CloudStackResult<Network>;
}

/// Load balancer rule operations.
#[async_trait]
pub trait LoadBalancerRuleApi: Send + Sync {
    /// List rules whose name matches `keyword`.
    async fn list_load_balancer_rules(
        &self,
        keyword: &str,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<LoadBalancerRule>>;

    /// Create a rule and return it.
    async fn create_load_balancer_rule(
        &self,
        params: &CreateLoadBalancerRuleParams,
    ) -> CloudStackResult<LoadBalancerRule>;

    /// Update algorithm and protocol of an existing rule.
    async fn update_load_balancer_rule(
        &self,
        id: &str,
        algorithm: &str,
        protocol: &str,
    ) -> CloudStackResult<()>;

    /// Delete a rule.
    async fn delete_load_balancer_rule(&self, id: &str) -> CloudStackResult<()>;

    /// Assign virtual machines to a rule.
    async fn assign_to_load_balancer_rule(
        &self,
        id: &str,
        virtual_machine_ids: &[String],
    ) -> CloudStackResult<()>;

    /// Remove virtual machines from a rule.
    async fn remove_from_load_balancer_rule(
        &self,
        id: &str,
        virtual_machine_ids: &[String],
    ) -> CloudStackResult<()>;

    /// List virtual machines currently assigned to a rule.
    async fn list_load_balancer_rule_instances(
        &self,
        id: &str,
    ) -> CloudStackResult<Vec<VirtualMachine>>;
}

/// Firewall rule operations.
#[async_trait]
pub trait FirewallApi: Send + Sync {
    /// List all firewall rules on a public IP.
    async fn list_firewall_rules(
        &self,
        ip_address_id: &str,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<FirewallRule>>;

    /// Create a firewall rule and return it.
    async fn create_firewall_rule(
        &self,
        params: &CreateFirewallRuleParams,
    ) -> CloudStackResult<FirewallRule>;

    /// Delete a firewall rule.
    async fn delete_firewall_rule(&self, id: &str) -> CloudStackResult<()>;
}

/// Virtual machine inventory.
#[async_trait]
pub trait VirtualMachineApi: Send + Sync {
    /// List all virtual machines with their NICs.
    async fn list_virtual_machines(
        &self,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<VirtualMachine>>;
}

/// One implementation of each CloudStack capability.
#[derive(Clone)]
pub struct CloudApis {
    pub addresses: Arc<dyn AddressApi>,
    pub networks: Arc<dyn NetworkApi>,
    pub rules: Arc<dyn LoadBalancerRuleApi>,
    pub firewall: Arc<dyn FirewallApi>,
    pub virtual_machines: Arc<dyn VirtualMachineApi>,
}

impl CloudApis {
    /// Use a single object implementing every capability.
    pub fn from_shared<T>(api: Arc<T>) -> Self
    where
        T: AddressApi
            + NetworkApi
            + LoadBalancerRuleApi
            + FirewallApi
            + VirtualMachineApi
            + 'static,
    {
        Self {
            addresses: api.clone(),
            networks: api.clone(),
            rules: api.clone(),
            firewall: api.clone(),
            virtual_machines: api,
        }
    }
}
