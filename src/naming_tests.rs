// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `naming.rs`

#[cfg(test)]
mod tests {
    use crate::naming::{legacy_load_balancer_name, load_balancer_name};
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;

    fn service(namespace: &str, name: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                uid: Some("6b2f3c1e-9d4a-4f7b-8e21-0c5d7a9b3f10".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_canonical_name() {
        let svc = service("default", "web");
        assert_eq!(
            load_balancer_name("kubernetes", &svc),
            "K8s_svc_kubernetes_default_web"
        );
    }

    #[test]
    fn test_canonical_name_never_exceeds_limit() {
        for cluster_len in [0, 1, 63, 200, 300] {
            for namespace_len in [1, 63, 253] {
                for name_len in [1, 63, 253] {
                    let cluster = "c".repeat(cluster_len);
                    let svc = service(&"n".repeat(namespace_len), &"s".repeat(name_len));
                    let name = load_balancer_name(&cluster, &svc);
                    assert!(
                        name.len() <= 255,
                        "name of length {} for ({cluster_len}, {namespace_len}, {name_len})",
                        name.len()
                    );
                    assert!(name.starts_with("K8s_svc_"));
                }
            }
        }
    }

    #[test]
    fn test_truncation_is_proportional() {
        let svc = service(&"n".repeat(200), &"s".repeat(100));
        let name = load_balancer_name(&"c".repeat(100), &svc);

        let parts: Vec<&str> = name.trim_start_matches("K8s_svc_").split('_').collect();
        assert_eq!(parts.len(), 3);
        // 245 bytes are available for 400 bytes of input
        assert_eq!(parts[0].len(), 61);
        assert_eq!(parts[1].len(), 122);
        assert_eq!(parts[2].len(), 61);
    }

    #[test]
    fn test_name_at_limit_is_untouched() {
        // prefix (8) + two separators + 245 bytes of input = 255
        let svc = service(&"n".repeat(100), &"s".repeat(100));
        let name = load_balancer_name(&"c".repeat(45), &svc);
        assert_eq!(name.len(), 255);
        assert!(name.ends_with(&"s".repeat(100)));
    }

    #[test]
    fn test_legacy_name() {
        let svc = service("default", "web");
        let name = legacy_load_balancer_name(&svc);
        assert_eq!(name, "a6b2f3c1e9d4a4f7b8e210c5d7a9b3f1");
        assert_eq!(name.len(), 32);
    }

    #[test]
    fn test_legacy_name_short_uid() {
        let mut svc = service("default", "web");
        svc.metadata.uid = Some("abc-def".to_string());
        assert_eq!(legacy_load_balancer_name(&svc), "aabcdef");
    }
}
