// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for LoadBalancer Services.
//!
//! The cleanup finalizer keeps a Service around until its cloud resources are
//! gone. Both helpers are idempotent and patch only `metadata.finalizers`.

use crate::retry::retry_api_call;
use anyhow::Result;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Value};
use tracing::info;

/// Whether `service` carries `finalizer`.
#[must_use]
pub fn has_finalizer(service: &Service, finalizer: &str) -> bool {
    service.finalizers().iter().any(|f| f == finalizer)
}

/// Merge patch setting the finalizer list with `finalizer` present or absent,
/// or `None` when the list already has the requested shape.
#[must_use]
pub fn finalizer_patch(service: &Service, finalizer: &str, present: bool) -> Option<Value> {
    if has_finalizer(service, finalizer) == present {
        return None;
    }

    let mut finalizers: Vec<String> = service.finalizers().to_vec();
    if present {
        finalizers.push(finalizer.to_string());
    } else {
        finalizers.retain(|f| f != finalizer);
    }

    Some(json!({ "metadata": { "finalizers": finalizers } }))
}

async fn apply(client: &Client, service: &Service, patch: &Value) -> Result<()> {
    let namespace = service.namespace().unwrap_or_default();
    let name = service.name_any();

    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let params = PatchParams::default();
    let merge = Patch::Merge(patch);
    retry_api_call(|| api.patch(&name, &params, &merge), "patch service finalizers").await?;
    Ok(())
}

/// Add `finalizer` to `service` if missing.
///
/// # Errors
///
/// Returns an error if the patch fails.
pub async fn ensure_finalizer(client: &Client, service: &Service, finalizer: &str) -> Result<()> {
    let Some(patch) = finalizer_patch(service, finalizer, true) else {
        return Ok(());
    };

    info!(
        service = %format!("{}/{}", service.namespace().unwrap_or_default(), service.name_any()),
        finalizer,
        "Adding finalizer"
    );
    apply(client, service, &patch).await
}

/// Remove `finalizer` from `service` if present.
///
/// # Errors
///
/// Returns an error if the patch fails.
pub async fn remove_finalizer(client: &Client, service: &Service, finalizer: &str) -> Result<()> {
    let Some(patch) = finalizer_patch(service, finalizer, false) else {
        return Ok(());
    };

    info!(
        service = %format!("{}/{}", service.namespace().unwrap_or_default(), service.name_any()),
        finalizer,
        "Removing finalizer"
    );
    apply(client, service, &patch).await
}
