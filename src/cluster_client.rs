// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Clients for downstream (managed) clusters.
//!
//! A managed cluster's credentials live in a Secret with the same name and
//! namespace as its `Kubernetes` record, holding the keys `endpoint`, `ca.crt`
//! and `token`. [`client_for`] reads that Secret on every call and asks a
//! [`ClusterClientFactory`] for a client, so rotated tokens take effect on the
//! next pass.

use crate::errors::{ClusterClientError, ReconcileError};
use crate::store::{ObjectKey, ResourceStore};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::ClusterRole;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Secret key holding the API server URL
pub const CREDENTIALS_ENDPOINT_KEY: &str = "endpoint";

/// Secret key holding the PEM encoded cluster CA
pub const CREDENTIALS_CA_KEY: &str = "ca.crt";

/// Secret key holding the bearer token
pub const CREDENTIALS_TOKEN_KEY: &str = "token";

/// Connection details of a downstream cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterCredentials {
    pub endpoint: String,
    pub ca_cert: Option<Vec<u8>>,
    pub token: String,
}

impl std::fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("endpoint", &self.endpoint)
            .field("ca_cert", &self.ca_cert.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl ClusterCredentials {
    /// Reads the credentials out of a cluster's Secret.
    ///
    /// # Errors
    ///
    /// [`ClusterClientError::CredentialsNotFound`] when `endpoint` or `token` is missing.
    pub fn from_secret(cluster: &ObjectKey, secret: &Secret) -> Result<Self, ClusterClientError> {
        let field = |key: &str| -> Option<Vec<u8>> {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|value| value.0.clone())
                .or_else(|| {
                    secret
                        .string_data
                        .as_ref()
                        .and_then(|data| data.get(key))
                        .map(|value| value.clone().into_bytes())
                })
                .filter(|value| !value.is_empty())
        };
        let missing = |key: &str| ClusterClientError::CredentialsNotFound {
            cluster: cluster.to_string(),
            message: format!("secret has no '{key}' entry"),
        };

        let endpoint = field(CREDENTIALS_ENDPOINT_KEY)
            .ok_or_else(|| missing(CREDENTIALS_ENDPOINT_KEY))?;
        let token = field(CREDENTIALS_TOKEN_KEY).ok_or_else(|| missing(CREDENTIALS_TOKEN_KEY))?;

        Ok(Self {
            endpoint: String::from_utf8_lossy(&endpoint).trim().to_string(),
            ca_cert: field(CREDENTIALS_CA_KEY),
            token: String::from_utf8_lossy(&token).trim().to_string(),
        })
    }
}

/// Outcome of applying an object to a downstream cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

impl ApplyOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Operations the propagator performs on a downstream cluster.
#[async_trait]
pub trait ClusterRoleClient: Send + Sync {
    /// Create or update a `ClusterRole`; a no-op when it already matches.
    async fn apply_cluster_role(
        &self,
        role: &ClusterRole,
    ) -> Result<ApplyOutcome, ClusterClientError>;

    /// Delete a `ClusterRole`; a missing role is not an error.
    async fn delete_cluster_role(&self, name: &str) -> Result<(), ClusterClientError>;
}

/// Builds clients for downstream clusters.
#[async_trait]
pub trait ClusterClientFactory: Send + Sync {
    async fn connect(
        &self,
        cluster: &ObjectKey,
        credentials: &ClusterCredentials,
    ) -> Result<Arc<dyn ClusterRoleClient>, ClusterClientError>;
}

/// Resolve a client for `cluster` from its credentials Secret.
///
/// # Errors
///
/// [`ClusterClientError::CredentialsNotFound`] when the Secret is missing or
/// incomplete, [`ClusterClientError::Connection`] when no client can be built,
/// and a store error when the Secret cannot be read.
pub async fn client_for<S: ResourceStore>(
    store: &S,
    factory: &dyn ClusterClientFactory,
    cluster: &ObjectKey,
) -> Result<Arc<dyn ClusterRoleClient>, ReconcileError> {
    let secret = store.get_opt::<Secret>(cluster).await?.ok_or_else(|| {
        ClusterClientError::CredentialsNotFound {
            cluster: cluster.to_string(),
            message: "credentials secret does not exist".to_string(),
        }
    })?;
    let credentials = ClusterCredentials::from_secret(cluster, &secret)?;
    Ok(factory.connect(cluster, &credentials).await?)
}

/// True when `current` already carries the rules and labels of `desired`.
#[must_use]
pub fn cluster_role_matches(current: &ClusterRole, desired: &ClusterRole) -> bool {
    let rules = |role: &ClusterRole| role.rules.clone().unwrap_or_default();
    let labels_present = desired
        .labels()
        .iter()
        .all(|(key, value)| current.labels().get(key) == Some(value));
    rules(current) == rules(desired) && labels_present
}

/// Kubeconfig describing a single cluster, user and context.
///
/// # Errors
///
/// [`ClusterClientError::Connection`] when the document cannot be built.
pub fn kubeconfig_for(
    cluster: &ObjectKey,
    credentials: &ClusterCredentials,
) -> Result<Kubeconfig, ClusterClientError> {
    let name = format!("{}-{}", cluster.namespace, cluster.name);
    let mut server = json!({ "server": credentials.endpoint });
    if let Some(ca) = &credentials.ca_cert {
        server["certificate-authority-data"] = json!(BASE64.encode(ca));
    }
    let document = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": name, "cluster": server }],
        "users": [{ "name": name, "user": { "token": credentials.token } }],
        "contexts": [{ "name": name, "context": { "cluster": name, "user": name } }],
        "current-context": name,
    });
    serde_json::from_value(document).map_err(|e| ClusterClientError::Connection {
        cluster: cluster.to_string(),
        message: format!("invalid kubeconfig: {e}"),
    })
}

// ============================================================================
// Kubernetes implementation
// ============================================================================

/// Builds `kube` clients from cluster credentials.
#[derive(Clone, Debug, Default)]
pub struct KubeClusterClientFactory;

#[async_trait]
impl ClusterClientFactory for KubeClusterClientFactory {
    async fn connect(
        &self,
        cluster: &ObjectKey,
        credentials: &ClusterCredentials,
    ) -> Result<Arc<dyn ClusterRoleClient>, ClusterClientError> {
        let connection_error = |message: String| ClusterClientError::Connection {
            cluster: cluster.to_string(),
            message,
        };

        let kubeconfig = kubeconfig_for(cluster, credentials)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| connection_error(e.to_string()))?;
        let client = Client::try_from(config).map_err(|e| connection_error(e.to_string()))?;

        debug!(
            cluster = %cluster,
            endpoint = %credentials.endpoint,
            "Built downstream cluster client"
        );
        Ok(Arc::new(KubeClusterRoleClient {
            cluster: cluster.to_string(),
            client,
        }))
    }
}

/// `ClusterRole` operations against one downstream cluster.
pub struct KubeClusterRoleClient {
    cluster: String,
    client: Client,
}

impl KubeClusterRoleClient {
    fn error(&self, err: &kube::Error) -> ClusterClientError {
        ClusterClientError::Connection {
            cluster: self.cluster.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ClusterRoleClient for KubeClusterRoleClient {
    async fn apply_cluster_role(
        &self,
        role: &ClusterRole,
    ) -> Result<ApplyOutcome, ClusterClientError> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        let name = role.name_any();

        match api.get_opt(&name).await.map_err(|e| self.error(&e))? {
            None => {
                info!(cluster = %self.cluster, "Creating ClusterRole {}", name);
                api.create(&PostParams::default(), role)
                    .await
                    .map_err(|e| self.error(&e))?;
                Ok(ApplyOutcome::Created)
            }
            Some(current) if cluster_role_matches(&current, role) => {
                debug!(cluster = %self.cluster, "ClusterRole {} is up to date", name);
                Ok(ApplyOutcome::Unchanged)
            }
            Some(current) => {
                info!(cluster = %self.cluster, "Updating ClusterRole {}", name);
                let mut desired = role.clone();
                desired.metadata.resource_version = current.metadata.resource_version;
                api.replace(&name, &PostParams::default(), &desired)
                    .await
                    .map_err(|e| self.error(&e))?;
                Ok(ApplyOutcome::Updated)
            }
        }
    }

    async fn delete_cluster_role(&self, name: &str) -> Result<(), ClusterClientError> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        match api.delete(name, &Default::default()).await {
            Ok(_) => {
                info!(cluster = %self.cluster, "Deleted ClusterRole {}", name);
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(cluster = %self.cluster, "ClusterRole {} already absent", name);
                Ok(())
            }
            Err(e) => Err(self.error(&e)),
        }
    }
}

#[cfg(test)]
#[path = "cluster_client_tests.rs"]
mod cluster_client_tests;
