// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # cloudstack-lb - CloudStack load balancers for Kubernetes Services
//!
//! Reconciles Kubernetes `Service` objects of type `LoadBalancer` against the
//! CloudStack load balancing and firewall APIs: a public IP per Service, one
//! load balancer rule per Service port, and firewall rules restricting the
//! allowed source ranges.
//!
//! ## Modules
//!
//! - [`provider`] - the `get` / `ensure` / `update` / `ensure_deleted` operations
//! - [`loadbalancer`] - the per-call load balancer aggregate and its components
//! - [`cloudstack`] - CloudStack API traits, records and the signed HTTP client
//! - [`service_controller`] - the Kubernetes driver loop used by the binary
//! - [`config`] - controller configuration
//! - [`errors`] - error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use cloudstack_lb::naming::load_balancer_name;
//! use k8s_openapi::api::core::v1::Service;
//! use kube::api::ObjectMeta;
//!
//! let service = Service {
//!     metadata: ObjectMeta {
//!         name: Some("web".to_string()),
//!         namespace: Some("default".to_string()),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! assert_eq!(load_balancer_name("kubernetes", &service), "K8s_svc_kubernetes_default_web");
//! ```

pub mod annotations;
pub mod cloudstack;
pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod finalizers;
pub mod loadbalancer;
pub mod metrics;
pub mod naming;
pub mod patcher;
pub mod protocol;
pub mod provider;
pub mod retry;
pub mod service_controller;
pub mod source_ranges;

#[cfg(test)]
pub(crate) mod test_fixtures;

#[cfg(test)]
mod naming_tests;
#[cfg(test)]
mod service_controller_tests;
