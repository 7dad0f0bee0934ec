// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes Event publication.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails a
//! reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Well-known event reasons.
pub mod reasons {
    /// A public IP was acquired for a new load balancer
    pub const CREATED_LOAD_BALANCER: &str = "CreatedLoadBalancer";
    /// The network has no firewall service, so source ranges are not enforced
    pub const SOURCE_RANGES_IGNORED: &str = "LoadBalancerSourceRangesIgnored";
    /// Load balancer cloud resources were removed
    pub const DELETED_LOAD_BALANCER: &str = "DeletedLoadBalancer";
}

/// Well-known event actions.
pub mod actions {
    pub const ENSURE: &str = "EnsureLoadBalancer";
    pub const UPDATE: &str = "UpdateLoadBalancer";
    pub const DELETE: &str = "EnsureLoadBalancerDeleted";
}

/// Publishes Kubernetes Events about a resource.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`.
    #[must_use]
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that keeps every event in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingEventPublisher {
    events: std::sync::Mutex<Vec<(EventType, String, Option<String>)>>,
}

#[cfg(test)]
impl RecordingEventPublisher {
    /// Reasons of all recorded events, in order.
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason, _)| reason.clone())
            .collect()
    }

    /// Number of recorded Warning events.
    pub fn warnings(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(type_, _, _)| matches!(type_, EventType::Warning))
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events
            .lock()
            .unwrap()
            .push((type_, reason.to_string(), note));
    }
}
