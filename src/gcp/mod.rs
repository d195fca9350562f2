// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Google Cloud clients used by the project claim reconciler.
//!
//! The reconcilers depend only on the traits in this module. Each reconcile pass
//! builds a fresh [`GcpClients`] bundle from the organization's service account
//! key through a [`GcpClientFactory`], so rotated credentials are picked up on the
//! next pass and no connection outlives it.
//!
//! - [`credentials`] - service account key parsing and the OAuth2 JWT-bearer grant
//! - [`rest`] - REST implementation of every trait, built on `reqwest`
//! - [`operation`] - cancellation-aware polling of long-running operations

pub mod credentials;
pub mod operation;
pub mod rest;

pub use credentials::ServiceAccountKey;
pub use operation::{wait_until_complete, PollPolicy};
pub use rest::{GcpEndpoints, RestClientFactory};

use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// API Types
// ============================================================================

/// A Cloud Resource Manager project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lifecycle_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ResourceId>,
}

/// Parent of a project: an organization, folder or project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceId {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// A long-running operation handle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationStatus>,
}

/// Error reported by a finished operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Billing linkage of a project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingInfo {
    #[serde(default)]
    pub billing_account_name: String,
    #[serde(default)]
    pub billing_enabled: bool,
}

/// An IAM service account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub unique_id: String,
    #[serde(default)]
    pub display_name: String,
}

/// A freshly created service account key.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedKey {
    #[serde(default)]
    pub name: String,
    /// Base64 encoded JSON key file
    #[serde(default)]
    pub private_key_data: String,
}

impl std::fmt::Debug for CreatedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedKey")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Fully qualified billing account name (`billingAccounts/<id>`).
#[must_use]
pub fn billing_account_name(account: &str) -> String {
    if account.starts_with("billingAccounts/") {
        account.to_string()
    } else {
        format!("billingAccounts/{account}")
    }
}

/// Email of a service account inside a project.
#[must_use]
pub fn service_account_email(account: &str, project_id: &str) -> String {
    format!("{account}@{project_id}.iam.gserviceaccount.com")
}

// ============================================================================
// Client Traits
// ============================================================================

/// Cloud Resource Manager.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Finds a project by id among the projects visible to the caller.
    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, ProviderError>;

    /// Starts creating a project.
    async fn create_project(&self, project: &Project) -> Result<Operation, ProviderError>;

    /// Fetches a project creation operation.
    async fn get_operation(&self, name: &str) -> Result<Operation, ProviderError>;
}

/// Cloud Billing.
#[async_trait]
pub trait Billing: Send + Sync {
    async fn get_billing_info(&self, project_id: &str) -> Result<BillingInfo, ProviderError>;

    /// Links the project to `account` (a fully qualified billing account name).
    async fn update_billing_info(
        &self,
        project_id: &str,
        account: &str,
    ) -> Result<BillingInfo, ProviderError>;
}

/// Service Usage.
#[async_trait]
pub trait ServiceUsage: Send + Sync {
    /// State of a service in a project, e.g. `ENABLED` or `DISABLED`.
    async fn service_state(&self, project_id: &str, service: &str) -> Result<String, ProviderError>;

    /// Starts enabling a service.
    async fn enable_service(
        &self,
        project_id: &str,
        service: &str,
    ) -> Result<Operation, ProviderError>;

    /// Fetches a service usage operation.
    async fn get_operation(&self, name: &str) -> Result<Operation, ProviderError>;
}

/// Identity and Access Management.
#[async_trait]
pub trait Iam: Send + Sync {
    async fn find_service_account(
        &self,
        project_id: &str,
        email: &str,
    ) -> Result<Option<ServiceAccount>, ProviderError>;

    async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        display_name: &str,
    ) -> Result<ServiceAccount, ProviderError>;

    async fn create_key(&self, project_id: &str, email: &str) -> Result<CreatedKey, ProviderError>;
}

/// The clients needed by one reconcile pass, authenticated as one identity.
#[derive(Clone)]
pub struct GcpClients {
    pub projects: Arc<dyn ResourceManager>,
    pub billing: Arc<dyn Billing>,
    pub services: Arc<dyn ServiceUsage>,
    pub iam: Arc<dyn Iam>,
}

/// Builds authenticated clients from a service account key.
#[async_trait]
pub trait GcpClientFactory: Send + Sync {
    async fn connect(&self, key: &ServiceAccountKey) -> Result<GcpClients, ProviderError>;
}
