// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error taxonomy shared by the store, the cloud clients and the reconcilers.
//!
//! - [`StoreError`] - failures of the resource store (Kubernetes API or in-memory)
//! - [`ProviderError`] - failures of a cloud provider API call
//! - [`ClusterClientError`] - failures reaching a downstream cluster
//! - [`ReconcileError`] - everything a reconcile pass can fail with; drives both the
//!   recorded stage condition and the requeue delay

use crate::crd::Status;
use crate::reconcilers::retry::is_retryable_http_status;
use crate::status_reasons::{
    REASON_ALREADY_CLAIMED, REASON_CANCELLED, REASON_CLUSTER_CLIENT_ERROR,
    REASON_DEPENDENCY_NOT_READY, REASON_NOT_PERMITTED, REASON_OPERATION_TIMEOUT,
    REASON_PARTIAL_FAILURE, REASON_PROVIDER_ERROR, REASON_STORE_ERROR,
};
use std::time::Duration;
use thiserror::Error;

/// HTTP status code for Not Found
const HTTP_NOT_FOUND: u16 = 404;

/// HTTP status code for Conflict
const HTTP_CONFLICT: u16 = 409;

/// Errors returned by a [`crate::store::ResourceStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    /// An object with the same key already exists
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: String },

    /// The write was based on a stale resource version
    #[error("{kind} {key} has been modified, the write was based on a stale version")]
    Conflict { kind: String, key: String },

    /// Any other API failure
    #[error("API error on {kind} {key}: {message}")]
    Api {
        kind: String,
        key: String,
        message: String,
        /// True when the failure is transient (throttling, server error, transport)
        transient: bool,
    },

    /// The object could not be converted to or from its stored form
    #[error("failed to serialize {kind}: {message}")]
    Serialization { kind: String, message: String },
}

impl StoreError {
    /// Maps a Kubernetes client error onto the store taxonomy.
    #[must_use]
    pub fn from_kube(err: &kube::Error, kind: &str, key: &str) -> Self {
        match err {
            kube::Error::Api(response) if response.code == HTTP_NOT_FOUND => Self::NotFound {
                kind: kind.to_string(),
                key: key.to_string(),
            },
            kube::Error::Api(response)
                if response.code == HTTP_CONFLICT && response.reason == "AlreadyExists" =>
            {
                Self::AlreadyExists {
                    kind: kind.to_string(),
                    key: key.to_string(),
                }
            }
            kube::Error::Api(response) if response.code == HTTP_CONFLICT => Self::Conflict {
                kind: kind.to_string(),
                key: key.to_string(),
            },
            kube::Error::Api(response) => Self::Api {
                kind: kind.to_string(),
                key: key.to_string(),
                message: response.message.clone(),
                transient: is_retryable_http_status(response.code),
            },
            kube::Error::SerdeError(e) => Self::Serialization {
                kind: kind.to_string(),
                message: e.to_string(),
            },
            other => Self::Api {
                kind: kind.to_string(),
                key: key.to_string(),
                message: other.to_string(),
                transient: true,
            },
        }
    }

    /// Returns true for [`StoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`StoreError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Throttling, server and transport failures worth retrying inline.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api { transient: true, .. })
    }
}

/// Errors returned by a cloud provider API call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The API answered with a non-success status
    #[error("{service}: HTTP {status}: {message}")]
    Http {
        service: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response
    #[error("{service}: request failed: {message}")]
    Transport { service: String, message: String },

    /// The response body could not be decoded
    #[error("{service}: unable to decode response: {message}")]
    Decode { service: String, message: String },

    /// Credentials were rejected or could not be used
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A long-running operation finished with an error
    #[error("operation {operation} failed with code {code}: {message}")]
    Operation {
        operation: String,
        code: i32,
        message: String,
    },
}

impl ProviderError {
    /// Returns true when the same call is expected to succeed if retried later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => is_retryable_http_status(*status),
            Self::Transport { .. } => true,
            Self::Decode { .. } | Self::Auth(_) => false,
            // Operations fail for quota and propagation reasons far more often than
            // for permanent ones; the next pass starts a fresh operation.
            Self::Operation { .. } => true,
        }
    }

    /// Returns true when the API reported the object as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status, .. } if *status == HTTP_NOT_FOUND)
    }
}

/// Errors reaching a downstream cluster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterClientError {
    /// The cluster's credentials secret is missing or incomplete
    #[error("credentials for cluster {cluster} not found: {message}")]
    CredentialsNotFound { cluster: String, message: String },

    /// A client could not be built, or the cluster API call failed
    #[error("cluster {cluster}: {message}")]
    Connection { cluster: String, message: String },
}

/// Errors produced by a reconcile pass.
///
/// Each variant carries enough context to be recorded as a stage condition. The
/// variant decides whether the failure is transient and how soon to retry.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A dependency has not been allocated to the requesting team
    #[error("{resource} has not been allocated to team {team}")]
    NotPermitted { resource: String, team: String },

    /// The requested name is held by a claim in another namespace
    #[error("{name} has already been claimed by team {team}")]
    AlreadyClaimed { name: String, team: String },

    /// A dependency is missing or not successful yet
    #[error("{dependency} is not ready: {message}")]
    DependencyNotReady { dependency: String, message: String },

    /// A cloud provider call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A long-running operation did not finish in time
    #[error("timed out after {timeout:?} waiting for {operation}")]
    OperationTimeout { operation: String, timeout: Duration },

    /// The pass was cancelled or exceeded its deadline
    #[error("reconciliation cancelled")]
    Cancelled,

    /// The resource store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A downstream cluster could not be reached
    #[error(transparent)]
    ClusterClient(#[from] ClusterClientError),

    /// Some downstream targets failed
    #[error("{failed} of {total} failed")]
    PartialFailure { failed: usize, total: usize },
}

impl ReconcileError {
    /// CamelCase reason for conditions, logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotPermitted { .. } => REASON_NOT_PERMITTED,
            Self::AlreadyClaimed { .. } => REASON_ALREADY_CLAIMED,
            Self::DependencyNotReady { .. } => REASON_DEPENDENCY_NOT_READY,
            Self::Provider(_) => REASON_PROVIDER_ERROR,
            Self::OperationTimeout { .. } => REASON_OPERATION_TIMEOUT,
            Self::Cancelled => REASON_CANCELLED,
            Self::Store(_) => REASON_STORE_ERROR,
            Self::ClusterClient(_) => REASON_CLUSTER_CLIENT_ERROR,
            Self::PartialFailure { .. } => REASON_PARTIAL_FAILURE,
        }
    }

    /// Returns true when the failure is expected to clear without a spec change.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotPermitted { .. } | Self::AlreadyClaimed { .. } => false,
            Self::Provider(e) => e.is_retryable(),
            Self::Store(StoreError::Serialization { .. }) => false,
            Self::DependencyNotReady { .. }
            | Self::OperationTimeout { .. }
            | Self::Cancelled
            | Self::Store(_)
            | Self::ClusterClient(_)
            | Self::PartialFailure { .. } => true,
        }
    }

    /// Requeue delay after this failure: `retry` when transient, `resync` otherwise.
    #[must_use]
    pub fn requeue_after(&self, retry: Duration, resync: Duration) -> Duration {
        if self.is_retryable() {
            retry
        } else {
            resync
        }
    }

    /// Overall resource status implied by this failure.
    #[must_use]
    pub fn overall_status(&self) -> Status {
        match self {
            Self::PartialFailure { .. } => Status::Warning,
            _ => Status::Failure,
        }
    }
}
