// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Signed HTTP client for the CloudStack API.
//!
//! Every request is a GET against the configured API endpoint carrying
//! `command`, `response=json`, `apiKey` and a `signature` (see
//! [`super::signing`]). Asynchronous commands return a job id which is polled
//! with `queryAsyncJobResult` until the job succeeds, fails or times out.
//! Transient failures (HTTP 429/5xx, connection errors) are retried with the
//! HTTP backoff schedule from [`crate::retry`].

use super::error::CloudStackError;
use super::signing::signed_query;
use super::types::{
    AssociateTarget, CreateFirewallRuleParams, CreateLoadBalancerRuleParams, FirewallRule,
    LoadBalancerRule, Network, PublicIpAddress, VirtualMachine,
};
use super::{
    AddressApi, CloudStackResult, FirewallApi, LoadBalancerRuleApi, NetworkApi, VirtualMachineApi,
};
use crate::config::CloudStackConfig;
use crate::constants::{
    ASYNC_JOB_POLL_INTERVAL_MILLIS, JOB_STATUS_FAILED, JOB_STATUS_PENDING, JOB_STATUS_SUCCEEDED,
};
use crate::metrics;
use crate::retry::http_backoff;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

/// Per-request HTTP timeout
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Ordered request parameters.
#[derive(Debug, Default, Clone)]
struct Params(Vec<(String, String)>);

impl Params {
    fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.push((key.to_string(), value.into()));
        self
    }

    fn set_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.set(key, v),
            _ => self,
        }
    }

    fn list_all(self, project_id: Option<&str>) -> Self {
        self.set("listall", "true").set_opt("projectid", project_id)
    }
}

/// CloudStack API client implementing every capability trait.
#[derive(Debug, Clone)]
pub struct CloudStackClient {
    http: reqwest::Client,
    api_url: Url,
    api_key: String,
    secret_key: String,
    async_job_timeout: Duration,
    poll_interval: Duration,
}

impl CloudStackClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &CloudStackConfig) -> CloudStackResult<Self> {
        let api_url = Url::parse(&config.api_url).map_err(|e| CloudStackError::Transport {
            command: "init".to_string(),
            reason: format!("invalid API URL {}: {e}", config.api_url),
        })?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.ssl_no_verify)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CloudStackError::Transport {
                command: "init".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_url,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            async_job_timeout: Duration::from_secs(config.async_job_timeout_secs),
            poll_interval: Duration::from_millis(ASYNC_JOB_POLL_INTERVAL_MILLIS),
        })
    }

    /// Override the async job polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Build the signed request URL for a command.
    #[must_use]
    pub fn request_url(&self, command: &str, params: &[(String, String)]) -> String {
        let mut all = Vec::with_capacity(params.len() + 3);
        all.push(("command".to_string(), command.to_string()));
        all.push(("response".to_string(), "json".to_string()));
        all.push(("apiKey".to_string(), self.api_key.clone()));
        all.extend(params.iter().cloned());

        format!("{}?{}", self.api_url, signed_query(&all, &self.secret_key))
    }

    /// Execute a synchronous command, returning its `<command>response` object.
    async fn execute(&self, command: &str, params: &Params) -> CloudStackResult<Value> {
        let mut backoff = http_backoff();
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let e = match self.execute_once(command, params).await {
                Ok(value) => {
                    metrics::record_cloud_api_call(command, "success", start_time.elapsed());
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !e.is_transient() {
                metrics::record_cloud_api_call(command, "error", start_time.elapsed());
                return Err(e);
            }

            let Some(duration) = backoff.next_backoff() else {
                error!(
                    command = %command,
                    attempt = attempt,
                    elapsed = ?start_time.elapsed(),
                    error = %e,
                    "Backoff exhausted, giving up"
                );
                metrics::record_cloud_api_call(command, "error", start_time.elapsed());
                return Err(e);
            };

            warn!(
                command = %command,
                attempt = attempt,
                retry_after = ?duration,
                error = %e,
                "Retryable CloudStack API error, will retry"
            );
            tokio::time::sleep(duration).await;
        }
    }

    async fn execute_once(&self, command: &str, params: &Params) -> CloudStackResult<Value> {
        debug!(command = %command, params = ?redact(&params.0), "CloudStack API request");

        let url = self.request_url(command, &params.0);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CloudStackError::Transport {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CloudStackError::Transport {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(CloudStackError::Http {
                command: command.to_string(),
                status: status.as_u16(),
                message: error_text(&body).unwrap_or(body),
            });
        }

        let mut json: Value =
            serde_json::from_str(&body).map_err(|e| CloudStackError::Decode {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let key = format!("{}response", command.to_lowercase());
        json.get_mut(&key)
            .map(Value::take)
            .ok_or_else(|| CloudStackError::Decode {
                command: command.to_string(),
                reason: format!("missing '{key}' in response"),
            })
    }

    /// Execute an asynchronous command and wait for its job result.
    async fn execute_async(&self, command: &str, params: &Params) -> CloudStackResult<Value> {
        let response = self.execute(command, params).await?;

        let job_id = response
            .get("jobid")
            .and_then(Value::as_str)
            .ok_or_else(|| CloudStackError::Decode {
                command: command.to_string(),
                reason: "missing 'jobid' in async response".to_string(),
            })?
            .to_string();

        self.wait_for_job(command, &job_id).await
    }

    async fn wait_for_job(&self, command: &str, job_id: &str) -> CloudStackResult<Value> {
        let start_time = Instant::now();
        let params = Params::new().set("jobid", job_id);

        loop {
            let mut response = self.execute("queryAsyncJobResult", &params).await?;
            let status = response
                .get("jobstatus")
                .and_then(Value::as_i64)
                .unwrap_or(i64::from(JOB_STATUS_PENDING));

            match i32::try_from(status).unwrap_or(JOB_STATUS_PENDING) {
                JOB_STATUS_SUCCEEDED => {
                    debug!(command = %command, job_id = %job_id, "Async job completed");
                    return Ok(response
                        .get_mut("jobresult")
                        .map(Value::take)
                        .unwrap_or(Value::Null));
                }
                JOB_STATUS_FAILED => {
                    let text = response
                        .get("jobresult")
                        .and_then(|r| r.get("errortext"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(CloudStackError::AsyncJobFailed {
                        command: command.to_string(),
                        job_id: job_id.to_string(),
                        text,
                    });
                }
                _ => {}
            }

            if start_time.elapsed() >= self.async_job_timeout {
                return Err(CloudStackError::AsyncJobTimeout {
                    command: command.to_string(),
                    job_id: job_id.to_string(),
                    timeout_secs: self.async_job_timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Strip credentials before logging parameters.
fn redact(params: &[(String, String)]) -> Vec<(&str, &str)> {
    params
        .iter()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case("apikey") {
                (k.as_str(), "<redacted>")
            } else {
                (k.as_str(), v.as_str())
            }
        })
        .collect()
}

/// Extract `errortext` from a CloudStack error body.
fn error_text(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.as_object()?
        .values()
        .find_map(|v| v.get("errortext"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Decode the list stored under `item_key`; an absent key is an empty list.
fn decode_list<T: DeserializeOwned>(
    command: &str,
    response: &mut Value,
    item_key: &str,
) -> CloudStackResult<Vec<T>> {
    match response.get_mut(item_key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items) => serde_json::from_value(items).map_err(|e| CloudStackError::Decode {
            command: command.to_string(),
            reason: format!("{item_key}: {e}"),
        }),
    }
}

/// Decode the object stored under `item_key`.
fn decode_item<T: DeserializeOwned>(
    command: &str,
    response: &mut Value,
    item_key: &str,
) -> CloudStackResult<T> {
    let item = response
        .get_mut(item_key)
        .map(Value::take)
        .ok_or_else(|| CloudStackError::Decode {
            command: command.to_string(),
            reason: format!("missing '{item_key}' in job result"),
        })?;

    serde_json::from_value(item).map_err(|e| CloudStackError::Decode {
        command: command.to_string(),
        reason: format!("{item_key}: {e}"),
    })
}

#[async_trait]
impl AddressApi for CloudStackClient {
    async fn list_public_ip_addresses(
        &self,
        ip_address: &str,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<PublicIpAddress>> {
        let command = "listPublicIpAddresses";
        let params = Params::new()
            .set("ipaddress", ip_address)
            .list_all(project_id);
        let mut response = self.execute(command, &params).await?;
        decode_list(command, &mut response, "publicipaddress")
    }

    async fn associate_ip_address(
        &self,
        target: &AssociateTarget,
        project_id: Option<&str>,
    ) -> CloudStackResult<PublicIpAddress> {
        let command = "associateIpAddress";
        let params = match target {
            AssociateTarget::Vpc(vpc_id) => Params::new().set("vpcid", vpc_id.as_str()),
            AssociateTarget::Network(network_id) => {
                Params::new().set("networkid", network_id.as_str())
            }
        }
        .set_opt("projectid", project_id);
        let mut result = self.execute_async(command, &params).await?;
        decode_item(command, &mut result, "ipaddress")
    }

    async fn disassociate_ip_address(&self, id: &str) -> CloudStackResult<()> {
        let params = Params::new().set("id", id);
        self.execute_async("disassociateIpAddress", &params).await?;
        Ok(())
    }
}

#[async_trait]
impl NetworkApi for CloudStackClient {
    async fn get_network_by_id(
        &self,
        id: &str,
        project_id: Option<&str>,
    ) -> CloudStackResult<Network> {
        let command = "listNetworks";
        let params = Params::new().set("id", id).list_all(project_id);
        let mut response = self.execute(command, &params).await?;
        let networks: Vec<Network> = decode_list(command, &mut response, "network")?;

        networks
            .into_iter()
            .next()
            .ok_or_else(|| CloudStackError::NotFound {
                kind: "network".to_string(),
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl LoadBalancerRuleApi for CloudStackClient {
    async fn list_load_balancer_rules(
        &self,
        keyword: &str,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<LoadBalancerRule>> {
        let command = "listLoadBalancerRules";
        let params = Params::new().set("keyword", keyword).list_all(project_id);
        let mut response = self.execute(command, &params).await?;
        decode_list(command, &mut response, "loadbalancerrule")
    }

    async fn create_load_balancer_rule(
        &self,
        params: &CreateLoadBalancerRuleParams,
    ) -> CloudStackResult<LoadBalancerRule> {
        let command = "createLoadBalancerRule";
        let request = Params::new()
            .set("algorithm", params.algorithm.as_str())
            .set("name", params.name.as_str())
            .set("privateport", params.private_port.to_string())
            .set("publicport", params.public_port.to_string())
            .set("networkid", params.network_id.as_str())
            .set("publicipid", params.public_ip_id.as_str())
            .set("protocol", params.protocol.as_str())
            .set("openfirewall", params.open_firewall.to_string());
        let mut result = self.execute_async(command, &request).await?;
        decode_item(command, &mut result, "loadbalancer")
    }

    async fn update_load_balancer_rule(
        &self,
        id: &str,
        algorithm: &str,
        protocol: &str,
    ) -> CloudStackResult<()> {
        let params = Params::new()
            .set("id", id)
            .set("algorithm", algorithm)
            .set("protocol", protocol);
        self.execute_async("updateLoadBalancerRule", &params).await?;
        Ok(())
    }

    async fn delete_load_balancer_rule(&self, id: &str) -> CloudStackResult<()> {
        let params = Params::new().set("id", id);
        self.execute_async("deleteLoadBalancerRule", &params).await?;
        Ok(())
    }

    async fn assign_to_load_balancer_rule(
        &self,
        id: &str,
        virtual_machine_ids: &[String],
    ) -> CloudStackResult<()> {
        let params = Params::new()
            .set("id", id)
            .set("virtualmachineids", virtual_machine_ids.join(","));
        self.execute_async("assignToLoadBalancerRule", &params).await?;
        Ok(())
    }

    async fn remove_from_load_balancer_rule(
        &self,
        id: &str,
        virtual_machine_ids: &[String],
    ) -> CloudStackResult<()> {
        let params = Params::new()
            .set("id", id)
            .set("virtualmachineids", virtual_machine_ids.join(","));
        self.execute_async("removeFromLoadBalancerRule", &params)
            .await?;
        Ok(())
    }

    async fn list_load_balancer_rule_instances(
        &self,
        id: &str,
    ) -> CloudStackResult<Vec<VirtualMachine>> {
        let command = "listLoadBalancerRuleInstances";
        let params = Params::new().set("id", id);
        let mut response = self.execute(command, &params).await?;
        decode_list(command, &mut response, "loadbalancerruleinstance")
    }
}

#[async_trait]
impl FirewallApi for CloudStackClient {
    async fn list_firewall_rules(
        &self,
        ip_address_id: &str,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<FirewallRule>> {
        let command = "listFirewallRules";
        let params = Params::new()
            .set("ipaddressid", ip_address_id)
            .list_all(project_id);
        let mut response = self.execute(command, &params).await?;
        decode_list(command, &mut response, "firewallrule")
    }

    async fn create_firewall_rule(
        &self,
        params: &CreateFirewallRuleParams,
    ) -> CloudStackResult<FirewallRule> {
        let command = "createFirewallRule";
        let request = Params::new()
            .set("ipaddressid", params.ip_address_id.as_str())
            .set("protocol", params.protocol.as_str())
            .set("cidrlist", params.cidr_list.join(","))
            .set("startport", params.start_port.to_string())
            .set("endport", params.end_port.to_string());
        let mut result = self.execute_async(command, &request).await?;
        decode_item(command, &mut result, "firewallrule")
    }

    async fn delete_firewall_rule(&self, id: &str) -> CloudStackResult<()> {
        let params = Params::new().set("id", id);
        self.execute_async("deleteFirewallRule", &params).await?;
        Ok(())
    }
}

#[async_trait]
impl VirtualMachineApi for CloudStackClient {
    async fn list_virtual_machines(
        &self,
        project_id: Option<&str>,
    ) -> CloudStackResult<Vec<VirtualMachine>> {
        let command = "listVirtualMachines";
        let params = Params::new()
            .set("details", "min,nics")
            .list_all(project_id);
        let mut response = self.execute(command, &params).await?;
        decode_list(command, &mut response, "virtualmachine")
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
