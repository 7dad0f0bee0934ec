// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the CloudStack load balancer controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Provider Constants
// ============================================================================

/// Controller name reported on Kubernetes Events and used as field manager
pub const CONTROLLER_NAME: &str = "cloudstack-lb-controller";

// ============================================================================
// Service Annotation Constants
// ============================================================================

/// Enables the PROXY protocol on the CloudStack load balancer.
///
/// Only applies to TCP service ports and requires CloudStack >= 4.6.
pub const ANNOTATION_PROXY_PROTOCOL: &str =
    "service.beta.kubernetes.io/cloudstack-load-balancer-proxy-protocol";

/// Explicit hostname reported in the Service status instead of the IP.
///
/// Used together with the PROXY protocol so the service stays reachable from
/// inside the cluster (kubernetes/kubernetes#66607).
pub const ANNOTATION_LOAD_BALANCER_HOSTNAME: &str =
    "service.beta.kubernetes.io/cloudstack-load-balancer-hostname";

/// Read-only annotation carrying the IP address assigned to the load balancer
pub const ANNOTATION_LOAD_BALANCER_ADDRESS: &str =
    "service.beta.kubernetes.io/cloudstack-load-balancer-address";

/// Standard Kubernetes annotation listing allowed source ranges
pub const ANNOTATION_LOAD_BALANCER_SOURCE_RANGES: &str =
    "service.beta.kubernetes.io/load-balancer-source-ranges";

// ============================================================================
// Naming Constants
// ============================================================================

/// Prefix for every load balancer name owned by this controller
pub const SERVICE_PREFIX: &str = "K8s_svc_";

/// Maximum identifier length accepted by CloudStack
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length of the legacy (generic cloud provider) load balancer name
pub const LEGACY_NAME_MAX_LENGTH: usize = 32;

// ============================================================================
// Firewall Constants
// ============================================================================

/// Network range allowed on the firewall when no explicit CIDR list is given
pub const DEFAULT_ALLOWED_CIDR: &str = "0.0.0.0/0";

/// Name of the network service that indicates firewall support
pub const FIREWALL_SERVICE_NAME: &str = "Firewall";

// ============================================================================
// CloudStack Wire Constants
// ============================================================================

/// CloudStack protocol name for TCP
pub const PROTO_TCP: &str = "tcp";

/// CloudStack protocol name for UDP
pub const PROTO_UDP: &str = "udp";

/// CloudStack protocol name for ICMP
pub const PROTO_ICMP: &str = "icmp";

/// CloudStack protocol name for TCP with the PROXY protocol enabled
pub const PROTO_TCP_PROXY: &str = "tcp-proxy";

/// CloudStack round-robin balancing algorithm
pub const ALGORITHM_ROUND_ROBIN: &str = "roundrobin";

/// CloudStack source-IP affinity balancing algorithm
pub const ALGORITHM_SOURCE: &str = "source";

/// Async job is still pending
pub const JOB_STATUS_PENDING: i32 = 0;

/// Async job completed successfully
pub const JOB_STATUS_SUCCEEDED: i32 = 1;

/// Async job failed
pub const JOB_STATUS_FAILED: i32 = 2;

/// Interval between `queryAsyncJobResult` polls
pub const ASYNC_JOB_POLL_INTERVAL_MILLIS: u64 = 1000;

/// Default maximum time to wait for an async job (5 minutes)
pub const DEFAULT_ASYNC_JOB_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Kubernetes Constants
// ============================================================================

/// Service type handled by this controller
pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";

/// Session affinity value for round-robin balancing
pub const SESSION_AFFINITY_NONE: &str = "None";

/// Session affinity value for client-IP stickiness
pub const SESSION_AFFINITY_CLIENT_IP: &str = "ClientIP";

/// Finalizer protecting cloud resources of a LoadBalancer Service
pub const LOAD_BALANCER_CLEANUP_FINALIZER: &str = "service.kubernetes.io/load-balancer-cleanup";

/// Node label excluding a node from external load balancers
pub const LABEL_EXCLUDE_FROM_LOAD_BALANCERS: &str =
    "node.kubernetes.io/exclude-from-external-load-balancers";

/// Node label marking control-plane nodes
pub const LABEL_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";

/// Ingress IP mode when traffic is delivered to the node with the VIP as destination
pub const IP_MODE_VIP: &str = "VIP";

/// Ingress IP mode when the load balancer proxies traffic
pub const IP_MODE_PROXY: &str = "Proxy";

/// Default cluster name used in load balancer names
pub const DEFAULT_CLUSTER_NAME: &str = "kubernetes";

// ============================================================================
// Controller Timing Constants
// ============================================================================

/// Requeue duration after a successful reconciliation (5 minutes)
pub const SUCCESS_REQUEUE_DURATION_SECS: u64 = 300;

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Default interval between node synchronisation passes
pub const DEFAULT_NODE_SYNC_INTERVAL_SECS: u64 = 100;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default bind address for the metrics HTTP server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";
