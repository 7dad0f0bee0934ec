// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory CloudStack used by unit tests.
//!
//! Behaves like a small CloudStack zone: rules, firewall rules and public IPs
//! are stored in memory, every mutating call is recorded, and individual
//! commands can be made to fail.

use super::error::CloudStackError;
use super::types::{
    AssociateTarget, CreateFirewallRuleParams, CreateLoadBalancerRuleParams, FirewallRule,
    LoadBalancerRule, Network, NetworkService, Nic, PublicIpAddress, VirtualMachine,
};
use super::{
    AddressApi, CloudApis, CloudStackResult, FirewallApi, LoadBalancerRuleApi, NetworkApi,
    VirtualMachineApi,
};
use crate::constants::FIREWALL_SERVICE_NAME;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A recorded mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mutation {
    pub command: &'static str,
    pub target: String,
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub virtual_machines: Vec<VirtualMachine>,
    pub networks: Vec<Network>,
    pub public_ips: Vec<PublicIpAddress>,
    pub rules: Vec<LoadBalancerRule>,
    pub rule_instances: HashMap<String, Vec<String>>,
    pub firewall_rules: Vec<FirewallRule>,
    pub mutations: Vec<Mutation>,
    pub list_calls: Vec<&'static str>,
    pub failing: HashSet<&'static str>,
    sequence: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }

    fn check(&self, command: &'static str) -> CloudStackResult<()> {
        if self.failing.contains(command) {
            return Err(CloudStackError::Http {
                command: command.to_string(),
                status: 431,
                message: format!("injected failure for {command}"),
            });
        }
        Ok(())
    }

    fn record(&mut self, command: &'static str, target: impl Into<String>) {
        self.mutations.push(Mutation {
            command,
            target: target.into(),
        });
    }

    fn ip_by_id(&self, id: &str) -> Option<&PublicIpAddress> {
        self.public_ips.iter().find(|ip| ip.id == id)
    }
}

/// In-memory CloudStack implementing every capability trait.
#[derive(Debug, Default)]
pub(crate) struct FakeCloudStack {
    state: Mutex<FakeState>,
}

impl FakeCloudStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn apis(self: &Arc<Self>) -> CloudApis {
        CloudApis::from_shared(self.clone())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add a network, optionally in a VPC, optionally offering the firewall service.
    pub fn add_network(&self, id: &str, vpc_id: &str, firewall: bool) {
        let service = if firewall {
            vec![
                NetworkService {
                    name: "Lb".to_string(),
                },
                NetworkService {
                    name: FIREWALL_SERVICE_NAME.to_string(),
                },
            ]
        } else {
            vec![NetworkService {
                name: "Lb".to_string(),
            }]
        };

        self.state().networks.push(Network {
            id: id.to_string(),
            name: format!("network-{id}"),
            vpc_id: vpc_id.to_string(),
            service,
        });
    }

    /// Add a virtual machine with one NIC per given network.
    pub fn add_vm(&self, id: &str, name: &str, network_ids: &[&str]) {
        let nic = network_ids
            .iter()
            .enumerate()
            .map(|(i, network_id)| Nic {
                id: format!("{id}-nic-{i}"),
                network_id: (*network_id).to_string(),
                ip_address: format!("10.1.1.{}", i + 10),
            })
            .collect();

        self.state().virtual_machines.push(VirtualMachine {
            id: id.to_string(),
            name: name.to_string(),
            nic,
        });
    }

    /// Add an already-allocated public IP.
    pub fn add_public_ip(&self, id: &str, ip_address: &str, network_id: &str) {
        self.state().public_ips.push(PublicIpAddress {
            id: id.to_string(),
            ip_address: ip_address.to_string(),
            associated_network_id: network_id.to_string(),
            vpc_id: String::new(),
        });
    }

    /// Insert a load balancer rule directly, bypassing the mutation log.
    pub fn add_rule(&self, rule: LoadBalancerRule, instances: &[&str]) {
        let mut state = self.state();
        state.rule_instances.insert(
            rule.id.clone(),
            instances.iter().map(|s| (*s).to_string()).collect(),
        );
        state.rules.push(rule);
    }

    /// Insert a firewall rule directly, bypassing the mutation log.
    pub fn add_firewall_rule(&self, rule: FirewallRule) {
        self.state().firewall_rules.push(rule);
    }

    /// Make every subsequent call of `command` fail.
    pub fn fail_on(&self, command: &'static str) {
        self.state().failing.insert(command);
    }

    pub fn clear_mutations(&self) {
        let mut state = self.state();
        state.mutations.clear();
        state.list_calls.clear();
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state().mutations.clone()
    }

    /// Number of recorded calls of a mutating command.
    pub fn count(&self, command: &str) -> usize {
        self.state()
            .mutations
            .iter()
            .filter(|m| m.command == command)
            .count()
    }

    pub fn rules(&self) -> Vec<LoadBalancerRule> {
        self.state().rules.clone()
    }

    pub fn firewall_rules(&self) -> Vec<FirewallRule> {
        self.state().firewall_rules.clone()
    }

    pub fn public_ips(&self) -> Vec<PublicIpAddress> {
        self.state().public_ips.clone()
    }

    pub fn instances(&self, rule_id: &str) -> Vec<String> {
        self.state()
            .rule_instances
            .get(rule_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AddressApi for FakeCloudStack {
    async fn list_public_ip_addresses(
        &self,
        ip_address: &str,
        _project_id: Option<&str>,
    ) -> CloudStackResult<Vec<PublicIpAddress>> {
        let mut state = self.state();
        state.list_calls.push("listPublicIpAddresses");
        state.check("listPublicIpAddresses")?;
        Ok(state
            .public_ips
            .iter()
            .filter(|ip| ip.ip_address == ip_address)
            .cloned()
            .collect())
    }

    async fn associate_ip_address(
        &self,
        target: &AssociateTarget,
        _project_id: Option<&str>,
    ) -> CloudStackResult<PublicIpAddress> {
        let mut state = self.state();
        state.check("associateIpAddress")?;

        let id = state.next_id("ip");
        let octet = state.sequence + 9;
        let mut ip = PublicIpAddress {
            id: id.clone(),
            ip_address: format!("203.0.113.{octet}"),
            ..PublicIpAddress::default()
        };
        match target {
            AssociateTarget::Vpc(vpc_id) => ip.vpc_id.clone_from(vpc_id),
            AssociateTarget::Network(network_id) => {
                ip.associated_network_id.clone_from(network_id);
            }
        }

        state.record("associateIpAddress", id);
        state.public_ips.push(ip.clone());
        Ok(ip)
    }

    async fn disassociate_ip_address(&self, id: &str) -> CloudStackResult<()> {
        let mut state = self.state();
        state.check("disassociateIpAddress")?;
        state.record("disassociateIpAddress", id);
        state.public_ips.retain(|ip| ip.id != id);
        Ok(())
    }
}

#[async_trait]
impl NetworkApi for FakeCloudStack {
    async fn get_network_by_id(
        &self,
        id: &str,
        _project_id: Option<&str>,
    ) -> CloudStackResult<Network> {
        let mut state = self.state();
        state.list_calls.push("listNetworks");
        state.check("listNetworks")?;
        state
            .networks
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| CloudStackError::NotFound {
                kind: "network".to_string(),
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl LoadBalancerRuleApi for FakeCloudStack {
    async fn list_load_balancer_rules(
        &self,
        keyword: &str,
        _project_id: Option<&str>,
    ) -> CloudStackResult<Vec<LoadBalancerRule>> {
        let mut state = self.state();
        state.list_calls.push("listLoadBalancerRules");
        state.check("listLoadBalancerRules")?;
        Ok(state
            .rules
            .iter()
            .filter(|r| r.name.contains(keyword))
            .cloned()
            .collect())
    }

    async fn create_load_balancer_rule(
        &self,
        params: &CreateLoadBalancerRuleParams,
    ) -> CloudStackResult<LoadBalancerRule> {
        let mut state = self.state();
        state.check("createLoadBalancerRule")?;

        let public_ip = state
            .ip_by_id(&params.public_ip_id)
            .map(|ip| ip.ip_address.clone())
            .ok_or_else(|| CloudStackError::NotFound {
                kind: "public IP".to_string(),
                id: params.public_ip_id.clone(),
            })?;

        let rule = LoadBalancerRule {
            id: state.next_id("rule"),
            name: params.name.clone(),
            algorithm: params.algorithm.clone(),
            protocol: params.protocol.clone(),
            public_ip,
            public_ip_id: params.public_ip_id.clone(),
            public_port: params.public_port.to_string(),
            private_port: params.private_port.to_string(),
            network_id: params.network_id.clone(),
            cidr_list: String::new(),
        };

        state.record("createLoadBalancerRule", params.name.clone());
        state.rule_instances.insert(rule.id.clone(), Vec::new());
        state.rules.push(rule.clone());
        Ok(rule)
    }

    async fn update_load_balancer_rule(
        &self,
        id: &str,
        algorithm: &str,
        protocol: &str,
    ) -> CloudStackResult<()> {
        let mut state = self.state();
        state.check("updateLoadBalancerRule")?;
        let rule = state
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CloudStackError::NotFound {
                kind: "load balancer rule".to_string(),
                id: id.to_string(),
            })?;
        rule.algorithm = algorithm.to_string();
        rule.protocol = protocol.to_string();
        state.record("updateLoadBalancerRule", id);
        Ok(())
    }

    async fn delete_load_balancer_rule(&self, id: &str) -> CloudStackResult<()> {
        let mut state = self.state();
        state.check("deleteLoadBalancerRule")?;
        if !state.rules.iter().any(|r| r.id == id) {
            return Err(CloudStackError::NotFound {
                kind: "load balancer rule".to_string(),
                id: id.to_string(),
            });
        }
        state.rules.retain(|r| r.id != id);
        state.rule_instances.remove(id);
        state.record("deleteLoadBalancerRule", id);
        Ok(())
    }

    async fn assign_to_load_balancer_rule(
        &self,
        id: &str,
        virtual_machine_ids: &[String],
    ) -> CloudStackResult<()> {
        let mut state = self.state();
        state.check("assignToLoadBalancerRule")?;
        state
            .rule_instances
            .entry(id.to_string())
            .or_default()
            .extend(virtual_machine_ids.iter().cloned());
        state.record("assignToLoadBalancerRule", id);
        Ok(())
    }

    async fn remove_from_load_balancer_rule(
        &self,
        id: &str,
        virtual_machine_ids: &[String],
    ) -> CloudStackResult<()> {
        let mut state = self.state();
        state.check("removeFromLoadBalancerRule")?;
        if let Some(instances) = state.rule_instances.get_mut(id) {
            instances.retain(|vm| !virtual_machine_ids.contains(vm));
        }
        state.record("removeFromLoadBalancerRule", id);
        Ok(())
    }

    async fn list_load_balancer_rule_instances(
        &self,
        id: &str,
    ) -> CloudStackResult<Vec<VirtualMachine>> {
        let mut state = self.state();
        state.list_calls.push("listLoadBalancerRuleInstances");
        state.check("listLoadBalancerRuleInstances")?;
        let ids = state.rule_instances.get(id).cloned().unwrap_or_default();
        Ok(ids
            .into_iter()
            .map(|vm_id| VirtualMachine {
                id: vm_id,
                ..VirtualMachine::default()
            })
            .collect())
    }
}

#[async_trait]
impl FirewallApi for FakeCloudStack {
    async fn list_firewall_rules(
        &self,
        ip_address_id: &str,
        _project_id: Option<&str>,
    ) -> CloudStackResult<Vec<FirewallRule>> {
        let mut state = self.state();
        state.list_calls.push("listFirewallRules");
        state.check("listFirewallRules")?;
        Ok(state
            .firewall_rules
            .iter()
            .filter(|r| r.ip_address_id == ip_address_id)
            .cloned()
            .collect())
    }

    async fn create_firewall_rule(
        &self,
        params: &CreateFirewallRuleParams,
    ) -> CloudStackResult<FirewallRule> {
        let mut state = self.state();
        state.check("createFirewallRule")?;

        let ip_address = state
            .ip_by_id(&params.ip_address_id)
            .map(|ip| ip.ip_address.clone())
            .unwrap_or_default();

        let rule = FirewallRule {
            id: state.next_id("fw"),
            protocol: params.protocol.clone(),
            start_port: params.start_port,
            end_port: params.end_port,
            ip_address_id: params.ip_address_id.clone(),
            ip_address,
            cidr_list: params.cidr_list.join(","),
            icmp_type: 0,
            icmp_code: 0,
        };

        state.record("createFirewallRule", rule.id.clone());
        state.firewall_rules.push(rule.clone());
        Ok(rule)
    }

    async fn delete_firewall_rule(&self, id: &str) -> CloudStackResult<()> {
        let mut state = self.state();
        state.check("deleteFirewallRule")?;
        state.firewall_rules.retain(|r| r.id != id);
        state.record("deleteFirewallRule", id);
        Ok(())
    }
}

#[async_trait]
impl VirtualMachineApi for FakeCloudStack {
    async fn list_virtual_machines(
        &self,
        _project_id: Option<&str>,
    ) -> CloudStackResult<Vec<VirtualMachine>> {
        let mut state = self.state();
        state.list_calls.push("listVirtualMachines");
        state.check("listVirtualMachines")?;
        Ok(state.virtual_machines.clone())
    }
}
