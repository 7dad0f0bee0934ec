// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Load balancer name derivation.
//!
//! New resources are named `K8s_svc_<cluster>_<namespace>_<service>`. Older
//! deployments used the generic cloud provider name (`a` followed by the
//! Service UID without dashes, at most 32 characters); that name is only used
//! to find existing rules.

use crate::constants::{LEGACY_NAME_MAX_LENGTH, MAX_NAME_LENGTH, SERVICE_PREFIX};
use k8s_openapi::api::core::v1::Service;

/// Canonical load balancer name for a Service.
///
/// Never longer than [`MAX_NAME_LENGTH`]; when the full name would be longer,
/// cluster, namespace and service name are shortened in proportion to their
/// length.
#[must_use]
pub fn load_balancer_name(cluster_name: &str, service: &Service) -> String {
    let namespace = service.metadata.namespace.as_deref().unwrap_or_default();
    let name = service.metadata.name.as_deref().unwrap_or_default();

    format_bounded(SERVICE_PREFIX, [cluster_name, namespace, name], MAX_NAME_LENGTH)
}

/// Name used by the generic cloud provider before canonical names existed.
#[must_use]
pub fn legacy_load_balancer_name(service: &Service) -> String {
    let uid = service.metadata.uid.as_deref().unwrap_or_default();
    let mut name: String = format!("a{}", uid.replace('-', ""));
    name.truncate(LEGACY_NAME_MAX_LENGTH);
    name
}

/// Join `prefix` and `parts` with `_`, shortening the parts proportionally so
/// the result fits in `limit` bytes.
fn format_bounded(prefix: &str, parts: [&str; 3], limit: usize) -> String {
    let fixed = prefix.len() + parts.len() - 1;
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let available = limit.saturating_sub(fixed);

    let parts: Vec<&str> = if total <= available {
        parts.to_vec()
    } else {
        parts
            .iter()
            .map(|part| truncate_at_char(part, part.len() * available / total))
            .collect()
    };

    format!("{prefix}{}", parts.join("_"))
}

fn truncate_at_char(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
