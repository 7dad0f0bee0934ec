// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Writes annotation changes back to a Service.
//!
//! Reconciliation mutates an in-memory copy of the Service. Once it finishes,
//! the difference between the original and the copy, restricted to
//! `metadata.annotations`, is sent as a single JSON merge patch. Nothing is
//! sent when the annotations did not change.

use crate::errors::{LoadBalancerError, Result};
use crate::retry::retry_api_call;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Applies annotation changes made during reconciliation.
#[async_trait]
pub trait ServicePatcher: Send + Sync {
    /// Patch `original` so its annotations match `updated`.
    async fn patch_annotations(&self, original: &Service, updated: &Service) -> Result<()>;
}

/// Compute the merge patch turning the annotations of `original` into those of
/// `updated`, or `None` when they are identical.
///
/// Removed annotations are set to `null`.
#[must_use]
pub fn annotation_patch(original: &Service, updated: &Service) -> Option<Value> {
    let before = original.metadata.annotations.clone().unwrap_or_default();
    let after = updated.metadata.annotations.clone().unwrap_or_default();

    if before == after {
        return None;
    }

    let mut changes = Map::new();
    for (key, value) in &after {
        if before.get(key) != Some(value) {
            changes.insert(key.clone(), Value::String(value.clone()));
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            changes.insert(key.clone(), Value::Null);
        }
    }

    Some(json!({ "metadata": { "annotations": changes } }))
}

/// Patcher backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeServicePatcher {
    client: Client,
}

impl KubeServicePatcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServicePatcher for KubeServicePatcher {
    async fn patch_annotations(&self, original: &Service, updated: &Service) -> Result<()> {
        let Some(patch) = annotation_patch(original, updated) else {
            return Ok(());
        };

        let namespace = original.namespace().unwrap_or_default();
        let name = original.name_any();
        let service = format!("{namespace}/{name}");
        debug!(service = %service, patch = %patch, "Patching service annotations");

        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let params = PatchParams::default();
        let merge = Patch::Merge(&patch);
        retry_api_call(
            || api.patch(&name, &params, &merge),
            "patch service annotations",
        )
        .await
        .map_err(|e| LoadBalancerError::Patch {
            service,
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

/// Patcher that records every patch it is asked to apply.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingPatcher {
    pub patches: std::sync::Mutex<Vec<Value>>,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl ServicePatcher for RecordingPatcher {
    async fn patch_annotations(&self, original: &Service, updated: &Service) -> Result<()> {
        let Some(patch) = annotation_patch(original, updated) else {
            return Ok(());
        };
        self.patches.lock().unwrap().push(patch);
        if self.fail {
            return Err(LoadBalancerError::Patch {
                service: original.name_any(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}
