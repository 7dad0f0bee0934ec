// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the CloudStack HTTP client using wiremock
//!
//! These tests run the real client against a mock API endpoint and check
//! envelope decoding, async job polling, error mapping and retries.

use cloudstack_lb::cloudstack::{
    AddressApi, AssociateTarget, CloudStackClient, CloudStackError, FirewallApi,
    LoadBalancerRuleApi, NetworkApi,
};
use cloudstack_lb::config::CloudStackConfig;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

const API_PATH: &str = "/client/api";

fn client(server: &MockServer) -> CloudStackClient {
    let config = CloudStackConfig {
        api_url: format!("{}{API_PATH}", server.uri()),
        api_key: "test-key".to_string(),
        secret_key: "test-secret".to_string(),
        async_job_timeout_secs: 5,
        ..CloudStackConfig::default()
    };

    CloudStackClient::new(&config)
        .expect("valid client")
        .with_poll_interval(Duration::from_millis(10))
}

fn command(name: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("command", name))
}

// ============================================================================
// Synchronous commands
// ============================================================================

#[tokio::test]
async fn test_list_load_balancer_rules_decodes_envelope() {
    let server = MockServer::start().await;

    command("listLoadBalancerRules")
        .and(query_param("keyword", "K8s_svc_kubernetes_default_web"))
        .and(query_param("listall", "true"))
        .and(query_param("apiKey", "test-key"))
        .and(query_param("response", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "listloadbalancerrulesresponse": {
                "count": 1,
                "loadbalancerrule": [{
                    "id": "rule-1",
                    "name": "K8s_svc_kubernetes_default_web-tcp-80",
                    "algorithm": "roundrobin",
                    "protocol": "tcp",
                    "publicip": "203.0.113.10",
                    "publicipid": "ip-1",
                    "publicport": "80",
                    "privateport": "30080",
                    "networkid": "net-1"
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rules = client(&server)
        .list_load_balancer_rules("K8s_svc_kubernetes_default_web", None)
        .await
        .expect("should list rules");

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, "rule-1");
    assert_eq!(rules[0].public_ip, "203.0.113.10");
    assert_eq!(rules[0].public_port, "80");
    assert_eq!(rules[0].private_port, "30080");
}

#[tokio::test]
async fn test_empty_list_response() {
    let server = MockServer::start().await;

    command("listFirewallRules")
        .and(query_param("ipaddressid", "ip-1"))
        .and(query_param("projectid", "proj-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "listfirewallrulesresponse": {} })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rules = client(&server)
        .list_firewall_rules("ip-1", Some("proj-1"))
        .await
        .expect("should list firewall rules");

    assert!(rules.is_empty());
}

#[tokio::test]
async fn test_network_not_found() {
    let server = MockServer::start().await;

    command("listNetworks")
        .and(query_param("id", "net-missing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "listnetworksresponse": { "count": 0 } })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .get_network_by_id("net-missing", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CloudStackError::NotFound { ref id, .. } if id == "net-missing"));
}

#[tokio::test]
async fn test_missing_envelope_is_decode_error() {
    let server = MockServer::start().await;

    command("listNetworks")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": {} })))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_network_by_id("net-1", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CloudStackError::Decode { .. }));
}

// ============================================================================
// Error mapping and retries
// ============================================================================

#[tokio::test]
async fn test_api_error_carries_errortext() {
    let server = MockServer::start().await;

    command("listLoadBalancerRules")
        .respond_with(ResponseTemplate::new(431).set_body_json(json!({
            "listloadbalancerrulesresponse": {
                "errorcode": 431,
                "errortext": "Unable to execute API command due to invalid value"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .list_load_balancer_rules("web", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CloudStackError::Http { status: 431, .. }));
    assert!(err.to_string().contains("invalid value"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_retries_service_unavailable() {
    let server = MockServer::start().await;

    command("listFirewallRules")
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    command("listFirewallRules")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "listfirewallrulesresponse": {
                "count": 1,
                "firewallrule": [{
                    "id": "fw-1",
                    "protocol": "tcp",
                    "startport": 80,
                    "endport": 80,
                    "ipaddressid": "ip-1",
                    "cidrlist": "10.0.0.0/24"
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rules = client(&server)
        .list_firewall_rules("ip-1", None)
        .await
        .expect("should succeed after retry");

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].cidr_list, "10.0.0.0/24");
}

// ============================================================================
// Async jobs
// ============================================================================

#[tokio::test]
async fn test_async_job_is_polled_until_done() {
    let server = MockServer::start().await;

    command("associateIpAddress")
        .and(query_param("networkid", "net-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "associateipaddressresponse": { "id": "ip-9", "jobid": "job-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    command("queryAsyncJobResult")
        .and(query_param("jobid", "job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queryasyncjobresultresponse": { "jobid": "job-1", "jobstatus": 0 }
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    command("queryAsyncJobResult")
        .and(query_param("jobid", "job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queryasyncjobresultresponse": {
                "jobid": "job-1",
                "jobstatus": 1,
                "jobresult": {
                    "ipaddress": {
                        "id": "ip-9",
                        "ipaddress": "203.0.113.19",
                        "associatednetworkid": "net-1"
                    }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ip = client(&server)
        .associate_ip_address(&AssociateTarget::Network("net-1".to_string()), None)
        .await
        .expect("should associate");

    assert_eq!(ip.id, "ip-9");
    assert_eq!(ip.ip_address, "203.0.113.19");
    assert_eq!(ip.associated_network_id, "net-1");
}

#[tokio::test]
async fn test_async_job_failure() {
    let server = MockServer::start().await;

    command("deleteFirewallRule")
        .and(query_param("id", "fw-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deletefirewallruleresponse": { "jobid": "job-2" }
        })))
        .mount(&server)
        .await;

    command("queryAsyncJobResult")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queryasyncjobresultresponse": {
                "jobid": "job-2",
                "jobstatus": 2,
                "jobresult": { "errorcode": 530, "errortext": "rule is in use" }
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .delete_firewall_rule("fw-1")
        .await
        .unwrap_err();

    match err {
        CloudStackError::AsyncJobFailed { job_id, text, .. } => {
            assert_eq!(job_id, "job-2");
            assert_eq!(text, "rule is in use");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_async_job_timeout() {
    let server = MockServer::start().await;

    command("deleteLoadBalancerRule")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deleteloadbalancerruleresponse": { "jobid": "job-3" }
        })))
        .mount(&server)
        .await;

    command("queryAsyncJobResult")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queryasyncjobresultresponse": { "jobid": "job-3", "jobstatus": 0 }
        })))
        .mount(&server)
        .await;

    let config = CloudStackConfig {
        api_url: format!("{}{API_PATH}", server.uri()),
        api_key: "test-key".to_string(),
        secret_key: "test-secret".to_string(),
        async_job_timeout_secs: 0,
        ..CloudStackConfig::default()
    };
    let client = CloudStackClient::new(&config)
        .expect("valid client")
        .with_poll_interval(Duration::from_millis(10));

    let err = client.delete_load_balancer_rule("rule-1").await.unwrap_err();

    assert!(matches!(err, CloudStackError::AsyncJobTimeout { ref job_id, .. } if job_id == "job-3"));
}
