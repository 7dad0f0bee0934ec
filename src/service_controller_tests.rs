// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `service_controller.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{
        LABEL_CONTROL_PLANE, LABEL_EXCLUDE_FROM_LOAD_BALANCERS, LOAD_BALANCER_CLEANUP_FINALIZER,
    };
    use crate::service_controller::{
        candidate_nodes, is_load_balancer, needs_cleanup, status_patch,
    };
    use crate::test_fixtures::{service, spec_mut};
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, Node, NodeCondition, NodeStatus, Service,
    };
    use kube::ResourceExt;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn node(name: &str, ready: bool, labels: &[&str]) -> Node {
        let mut node = crate::test_fixtures::node(name);
        node.metadata.labels = Some(
            labels
                .iter()
                .map(|l| ((*l).to_string(), String::new()))
                .collect::<BTreeMap<_, _>>(),
        );
        node.status = Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        node
    }

    fn names(nodes: &[Node]) -> Vec<String> {
        nodes.iter().map(ResourceExt::name_any).collect()
    }

    fn deleted(svc: Service) -> Service {
        let mut value = serde_json::to_value(&svc).unwrap();
        value["metadata"]["deletionTimestamp"] = json!("2025-01-01T00:00:00Z");
        serde_json::from_value(value).unwrap()
    }

    fn finalized(mut svc: Service) -> Service {
        svc.metadata.finalizers = Some(vec![LOAD_BALANCER_CLEANUP_FINALIZER.to_string()]);
        svc
    }

    #[test]
    fn test_is_load_balancer() {
        let mut svc = service(&[(80, 30080)]);
        assert!(is_load_balancer(&svc));

        spec_mut(&mut svc).type_ = Some("ClusterIP".to_string());
        assert!(!is_load_balancer(&svc));

        svc.spec = None;
        assert!(!is_load_balancer(&svc));
    }

    #[test]
    fn test_needs_cleanup() {
        let live = finalized(service(&[(80, 30080)]));
        assert!(!needs_cleanup(&live));

        assert!(needs_cleanup(&deleted(live.clone())));

        let mut converted = live;
        spec_mut(&mut converted).type_ = Some("NodePort".to_string());
        assert!(needs_cleanup(&converted));

        assert!(!needs_cleanup(&deleted(service(&[(80, 30080)]))));
    }

    #[test]
    fn test_candidate_nodes_filters_unready_and_excluded() {
        let nodes = vec![
            node("a", true, &[]),
            node("b", false, &[]),
            node("c", true, &[LABEL_EXCLUDE_FROM_LOAD_BALANCERS]),
            node("d", true, &[LABEL_CONTROL_PLANE]),
        ];

        assert_eq!(names(&candidate_nodes(&nodes)), vec!["a"]);
    }

    #[test]
    fn test_control_plane_used_when_alone() {
        let nodes = vec![
            node("cp-1", true, &[LABEL_CONTROL_PLANE]),
            node("cp-2", false, &[LABEL_CONTROL_PLANE]),
            node("w-1", true, &[LABEL_EXCLUDE_FROM_LOAD_BALANCERS]),
        ];

        assert_eq!(names(&candidate_nodes(&nodes)), vec!["cp-1"]);
    }

    #[test]
    fn test_node_without_status_is_not_ready() {
        let nodes = vec![crate::test_fixtures::node("bare")];

        assert!(candidate_nodes(&nodes).is_empty());
    }

    #[test]
    fn test_status_patch() {
        let status = LoadBalancerStatus {
            ingress: Some(vec![LoadBalancerIngress {
                ip: Some("203.0.113.10".to_string()),
                ip_mode: Some("VIP".to_string()),
                ..Default::default()
            }]),
        };

        assert_eq!(
            status_patch(&status),
            json!({ "status": { "loadBalancer": { "ingress": [{ "ip": "203.0.113.10", "ipMode": "VIP" }] } } })
        );
    }
}
