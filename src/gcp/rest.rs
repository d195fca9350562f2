// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! REST implementation of the GCP client traits.
//!
//! One [`RestClient`] serves the Resource Manager, Billing, Service Usage and IAM
//! APIs with a single bearer token. Base URLs are configurable so tests can point
//! the client at a mock server.
//!
//! [`RestClientFactory`] holds one `reqwest::Client`, and with it one connection
//! pool, for the life of the controller. Every [`RestClient`] it builds shares
//! that pool. Access tokens are not shared: each `connect` exchanges the key
//! for a new token, so a pass never reuses a token from an earlier one.
//!
//! References:
//! - [Resource Manager v1](https://cloud.google.com/resource-manager/reference/rest)
//! - [Cloud Billing v1](https://cloud.google.com/billing/docs/reference/rest)
//! - [Service Usage v1](https://cloud.google.com/service-usage/docs/reference/rest)
//! - [IAM v1](https://cloud.google.com/iam/docs/reference/rest)

use super::{
    Billing, BillingInfo, CreatedKey, GcpClientFactory, GcpClients, Iam, Operation, Project,
    ResourceManager, ServiceAccount, ServiceAccountKey, ServiceUsage,
};
use crate::constants::{
    GCP_BILLING_URL, GCP_HTTP_TIMEOUT_SECS, GCP_IAM_URL, GCP_RESOURCE_MANAGER_URL,
    GCP_SERVICE_USAGE_URL,
};
use crate::errors::ProviderError;
use crate::metrics;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const SERVICE_RESOURCE_MANAGER: &str = "cloudresourcemanager";
const SERVICE_BILLING: &str = "cloudbilling";
const SERVICE_USAGE: &str = "serviceusage";
const SERVICE_IAM: &str = "iam";

/// Base URLs of the GCP APIs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcpEndpoints {
    pub resource_manager: String,
    pub billing: String,
    pub service_usage: String,
    pub iam: String,
    /// Overrides the token endpoint named in each service account key
    pub token_uri: Option<String>,
}

impl Default for GcpEndpoints {
    fn default() -> Self {
        Self {
            resource_manager: GCP_RESOURCE_MANAGER_URL.to_string(),
            billing: GCP_BILLING_URL.to_string(),
            service_usage: GCP_SERVICE_USAGE_URL.to_string(),
            iam: GCP_IAM_URL.to_string(),
            token_uri: None,
        }
    }
}

impl GcpEndpoints {
    /// Points every API, and the token endpoint, at one base URL.
    #[must_use]
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            resource_manager: base.clone(),
            billing: base.clone(),
            service_usage: base.clone(),
            iam: base.clone(),
            token_uri: Some(format!("{base}/token")),
        }
    }
}

// ============================================================================
// Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListProjectsResponse {
    #[serde(default)]
    projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    state: String,
}

/// Standard GCP error envelope
#[derive(Debug, Deserialize)]
struct GcpErrorResponse {
    error: GcpError,
}

#[derive(Debug, Deserialize)]
struct GcpError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated REST client for the GCP APIs kore uses.
pub struct RestClient {
    http: Client,
    endpoints: GcpEndpoints,
    access_token: String,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    #[must_use]
    pub fn new(http: Client, endpoints: GcpEndpoints, access_token: String) -> Self {
        Self {
            http,
            endpoints,
            access_token,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        service: &'static str,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let start = Instant::now();
        let result = self.execute(service, request).await;
        metrics::record_provider_operation(service, operation, result.is_ok(), start.elapsed());
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        service: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                service: service.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GcpErrorResponse>(&text) {
                Ok(envelope) if envelope.error.status.is_empty() => envelope.error.message,
                Ok(envelope) => format!("{} ({})", envelope.error.message, envelope.error.status),
                Err(_) => text,
            };
            return Err(ProviderError::Http {
                service: service.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| ProviderError::Decode {
            service: service.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ResourceManager for RestClient {
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, ProviderError> {
        let mut url = url::Url::parse(&format!("{}/v1/projects", self.endpoints.resource_manager))
            .map_err(|e| ProviderError::Transport {
                service: SERVICE_RESOURCE_MANAGER.to_string(),
                message: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("filter", &format!("id:{project_id}"));

        let list: ListProjectsResponse = self
            .send(SERVICE_RESOURCE_MANAGER, "list_projects", self.http.get(url))
            .await?;
        Ok(list.projects.into_iter().find(|p| p.project_id == project_id))
    }

    async fn create_project(&self, project: &Project) -> Result<Operation, ProviderError> {
        debug!(project_id = %project.project_id, "Creating GCP project");
        let url = format!("{}/v1/projects", self.endpoints.resource_manager);
        self.send(
            SERVICE_RESOURCE_MANAGER,
            "create_project",
            self.http.post(url).json(project),
        )
        .await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, ProviderError> {
        let url = format!("{}/v1/{name}", self.endpoints.resource_manager);
        self.send(SERVICE_RESOURCE_MANAGER, "get_operation", self.http.get(url))
            .await
    }
}

#[async_trait]
impl Billing for RestClient {
    async fn get_billing_info(&self, project_id: &str) -> Result<BillingInfo, ProviderError> {
        let url = format!("{}/v1/projects/{project_id}/billingInfo", self.endpoints.billing);
        self.send(SERVICE_BILLING, "get_billing_info", self.http.get(url))
            .await
    }

    async fn update_billing_info(
        &self,
        project_id: &str,
        account: &str,
    ) -> Result<BillingInfo, ProviderError> {
        let url = format!("{}/v1/projects/{project_id}/billingInfo", self.endpoints.billing);
        let body = json!({ "billingAccountName": account });
        self.send(
            SERVICE_BILLING,
            "update_billing_info",
            self.http.put(url).json(&body),
        )
        .await
    }
}

#[async_trait]
impl ServiceUsage for RestClient {
    async fn service_state(
        &self,
        project_id: &str,
        service: &str,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1/projects/{project_id}/services/{service}",
            self.endpoints.service_usage
        );
        let response: ServiceResponse = self
            .send(SERVICE_USAGE, "get_service", self.http.get(url))
            .await?;
        Ok(response.state)
    }

    async fn enable_service(
        &self,
        project_id: &str,
        service: &str,
    ) -> Result<Operation, ProviderError> {
        let url = format!(
            "{}/v1/projects/{project_id}/services/{service}:enable",
            self.endpoints.service_usage
        );
        self.send(
            SERVICE_USAGE,
            "enable_service",
            self.http.post(url).json(&json!({})),
        )
        .await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, ProviderError> {
        let url = format!("{}/v1/{name}", self.endpoints.service_usage);
        self.send(SERVICE_USAGE, "get_operation", self.http.get(url))
            .await
    }
}

#[async_trait]
impl Iam for RestClient {
    async fn find_service_account(
        &self,
        project_id: &str,
        email: &str,
    ) -> Result<Option<ServiceAccount>, ProviderError> {
        let url = format!(
            "{}/v1/projects/{project_id}/serviceAccounts/{email}",
            self.endpoints.iam
        );
        match self
            .send::<ServiceAccount>(SERVICE_IAM, "get_service_account", self.http.get(url))
            .await
        {
            Ok(account) => Ok(Some(account)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        display_name: &str,
    ) -> Result<ServiceAccount, ProviderError> {
        let url = format!("{}/v1/projects/{project_id}/serviceAccounts", self.endpoints.iam);
        let body = json!({
            "accountId": account_id,
            "serviceAccount": { "displayName": display_name },
        });
        self.send(
            SERVICE_IAM,
            "create_service_account",
            self.http.post(url).json(&body),
        )
        .await
    }

    async fn create_key(&self, project_id: &str, email: &str) -> Result<CreatedKey, ProviderError> {
        let url = format!(
            "{}/v1/projects/{project_id}/serviceAccounts/{email}/keys",
            self.endpoints.iam
        );
        let body: Value = json!({});
        self.send(SERVICE_IAM, "create_key", self.http.post(url).json(&body))
            .await
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Builds [`RestClient`]s over a shared HTTP client, exchanging the key for a
/// fresh access token on every `connect`.
#[derive(Clone, Debug)]
pub struct RestClientFactory {
    http: Client,
    endpoints: GcpEndpoints,
}

impl RestClientFactory {
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(endpoints: GcpEndpoints) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(GCP_HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Transport {
                service: "http".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { http, endpoints })
    }
}

#[async_trait]
impl GcpClientFactory for RestClientFactory {
    async fn connect(&self, key: &ServiceAccountKey) -> Result<GcpClients, ProviderError> {
        let token = key
            .access_token(&self.http, self.endpoints.token_uri.as_deref())
            .await?;
        let client = Arc::new(RestClient::new(
            self.http.clone(),
            self.endpoints.clone(),
            token,
        ));
        Ok(GcpClients {
            projects: client.clone(),
            billing: client.clone(),
            services: client.clone(),
            iam: client,
        })
    }
}

#[cfg(test)]
#[path = "rest_tests.rs"]
mod rest_tests;
