// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `hosts.rs`

#[cfg(test)]
mod tests {
    use crate::cloudstack::fake::FakeCloudStack;
    use crate::errors::LoadBalancerError;
    use crate::loadbalancer::hosts::verify_hosts;
    use crate::test_fixtures::{node, nodes, zone, NETWORK_ID};

    #[tokio::test]
    async fn test_matches_nodes_case_insensitively_without_domain() {
        let fake = zone();

        let verified = verify_hosts(
            fake.as_ref(),
            &[node("NODE-1.example.com"), node("node-2")],
            None,
        )
        .await
        .unwrap();

        assert_eq!(verified.host_ids, vec!["vm-1".to_string(), "vm-2".to_string()]);
        assert_eq!(verified.network_id, NETWORK_ID);
    }

    #[tokio::test]
    async fn test_ignores_vms_that_are_not_nodes() {
        let fake = zone();
        fake.add_vm("vm-3", "bastion", &["net-2"]);

        let verified = verify_hosts(fake.as_ref(), &nodes(), None).await.unwrap();

        assert_eq!(verified.host_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_skips_vms_without_nics() {
        let fake = zone();
        fake.add_vm("vm-3", "node-3", &[]);

        let verified = verify_hosts(fake.as_ref(), &[node("node-1"), node("node-3")], None)
            .await
            .unwrap();

        assert_eq!(verified.host_ids, vec!["vm-1".to_string()]);
    }

    #[tokio::test]
    async fn test_cross_network_is_rejected() {
        let fake = zone();
        fake.add_vm("vm-3", "node-3", &["net-2"]);

        let err = verify_hosts(fake.as_ref(), &[node("node-1"), node("node-3")], None)
            .await
            .unwrap_err();

        assert_eq!(err, LoadBalancerError::CrossNetwork);
    }

    #[tokio::test]
    async fn test_no_matching_hosts() {
        let fake = zone();

        let err = verify_hosts(fake.as_ref(), &[node("other")], None)
            .await
            .unwrap_err();

        assert_eq!(err, LoadBalancerError::NoMatchingHosts);
    }

    #[tokio::test]
    async fn test_only_nicless_vms_is_no_match() {
        let fake = FakeCloudStack::new();
        fake.add_vm("vm-1", "node-1", &[]);

        let err = verify_hosts(fake.as_ref(), &[node("node-1")], None)
            .await
            .unwrap_err();

        assert_eq!(err, LoadBalancerError::NoMatchingHosts);
    }
}
