// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Builders shared by unit tests.

use crate::cloudstack::fake::FakeCloudStack;
use crate::cloudstack::{FirewallRule, LoadBalancerRule};
use k8s_openapi::api::core::v1::{Node, Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NETWORK_ID: &str = "net-1";
pub const CLUSTER: &str = "kubernetes";
pub const UID: &str = "6b2f3c1e-9d4a-4f7b-8e21-0c5d7a9b3f10";

/// A LoadBalancer Service `default/web` with the given `(port, node_port)` TCP ports.
pub fn service(ports: &[(i32, i32)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            uid: Some(UID.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            session_affinity: Some("None".to_string()),
            ports: Some(
                ports
                    .iter()
                    .map(|(port, node_port)| ServicePort {
                        name: Some(format!("p{port}")),
                        port: *port,
                        node_port: Some(*node_port),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn with_annotation(mut service: Service, key: &str, value: &str) -> Service {
    service
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    service
}

pub fn spec_mut(service: &mut Service) -> &mut ServiceSpec {
    service.spec.get_or_insert_with(ServiceSpec::default)
}

pub fn node(name: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A rule as CloudStack would list it.
pub fn rule(
    id: &str,
    name: &str,
    ip: (&str, &str),
    public_port: i32,
    private_port: i32,
    protocol: &str,
) -> LoadBalancerRule {
    LoadBalancerRule {
        id: id.to_string(),
        name: name.to_string(),
        algorithm: "roundrobin".to_string(),
        protocol: protocol.to_string(),
        public_ip: ip.1.to_string(),
        public_ip_id: ip.0.to_string(),
        public_port: public_port.to_string(),
        private_port: private_port.to_string(),
        network_id: NETWORK_ID.to_string(),
        cidr_list: String::new(),
    }
}

pub fn firewall_rule(id: &str, ip_id: &str, protocol: &str, port: i32, cidrs: &str) -> FirewallRule {
    FirewallRule {
        id: id.to_string(),
        protocol: protocol.to_string(),
        start_port: port,
        end_port: port,
        ip_address_id: ip_id.to_string(),
        ip_address: "203.0.113.10".to_string(),
        cidr_list: cidrs.to_string(),
        ..Default::default()
    }
}

/// A zone with one firewall-capable network and two VMs `node-1`, `node-2` on it.
pub fn zone() -> Arc<FakeCloudStack> {
    let fake = FakeCloudStack::new();
    fake.add_network(NETWORK_ID, "", true);
    fake.add_vm("vm-1", "node-1", &[NETWORK_ID]);
    fake.add_vm("vm-2", "node-2", &[NETWORK_ID]);
    fake
}

pub fn nodes() -> Vec<Node> {
    vec![node("node-1"), node("node-2.cluster.local")]
}
