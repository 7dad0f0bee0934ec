// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed access to Service annotations.

use k8s_openapi::api::core::v1::Service;
use tracing::debug;

/// Read a string annotation, falling back to `default` when absent.
///
/// A present but empty annotation is returned as-is.
#[must_use]
pub fn get_string(service: &Service, key: &str, default: &str) -> String {
    match service
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
    {
        Some(value) => {
            debug!(annotation = %key, value = %value, "Found service annotation");
            value.clone()
        }
        None => default.to_string(),
    }
}

/// Read a boolean annotation.
///
/// Only the literal values `"true"` and `"false"` are recognised; anything
/// else yields `default`.
#[must_use]
pub fn get_bool(service: &Service, key: &str, default: bool) -> bool {
    let value = service
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key));

    match value.map(String::as_str) {
        Some("true") => true,
        Some("false") => false,
        _ => default,
    }
}

/// Create or replace an annotation.
pub fn set(service: &mut Service, key: &str, value: &str) {
    service
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}
