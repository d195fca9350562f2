// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every reconciler receives a [`Context`] holding:
//! - the [`ResourceStore`] used for every read and write
//! - the factory building GCP clients from an organization's key
//! - the factory building clients for downstream clusters
//! - the timing and provisioning settings
//! - the supervisor cancellation token
//!
//! Neither factory caches clients. Credentials are read from the store on every
//! pass and a fresh client is built from them.

use crate::cluster_client::ClusterClientFactory;
use crate::constants::{
    API_POLL_INTERVAL_SECS, API_POLL_TIMEOUT_SECS, DEFAULT_SERVICE_ACCOUNT_NAME,
    ERROR_REQUEUE_DURATION_SECS, PROJECT_POLL_INTERVAL_SECS, PROJECT_POLL_TIMEOUT_SECS,
    PROPAGATION_CONCURRENCY, RECONCILE_TIMEOUT_SECS, REQUIRED_GCP_APIS, RESYNC_INTERVAL_SECS,
    RETRY_INTERVAL_SECS,
};
use crate::gcp::{GcpClientFactory, PollPolicy};
use crate::store::{KubeStore, ResourceStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timing and provisioning settings shared by the reconcilers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Requeue delay after a successful pass (drift detection)
    pub resync_interval: Duration,

    /// Requeue delay after a transient failure
    pub retry_interval: Duration,

    /// Requeue delay used by the controller error policy
    pub error_requeue: Duration,

    /// Deadline for a single reconcile pass
    pub reconcile_timeout: Duration,

    /// Polling of project creation operations
    pub project_poll: PollPolicy,

    /// Polling of service enablement operations
    pub api_poll: PollPolicy,

    /// Number of downstream clusters updated concurrently
    pub propagation_concurrency: usize,

    /// Service account created in claimed projects when the claim names none
    pub default_service_account: String,

    /// APIs enabled in every claimed project
    pub required_apis: Vec<String>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(RESYNC_INTERVAL_SECS),
            retry_interval: Duration::from_secs(RETRY_INTERVAL_SECS),
            error_requeue: Duration::from_secs(ERROR_REQUEUE_DURATION_SECS),
            reconcile_timeout: Duration::from_secs(RECONCILE_TIMEOUT_SECS),
            project_poll: PollPolicy::new(
                Duration::from_secs(PROJECT_POLL_INTERVAL_SECS),
                Duration::from_secs(PROJECT_POLL_TIMEOUT_SECS),
            ),
            api_poll: PollPolicy::new(
                Duration::from_secs(API_POLL_INTERVAL_SECS),
                Duration::from_secs(API_POLL_TIMEOUT_SECS),
            ),
            propagation_concurrency: PROPAGATION_CONCURRENCY,
            default_service_account: DEFAULT_SERVICE_ACCOUNT_NAME.to_string(),
            required_apis: REQUIRED_GCP_APIS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context<S: ResourceStore = KubeStore> {
    /// Resource store for all reads and writes
    pub store: S,

    /// Builds GCP clients from an organization's service account key
    pub gcp: Arc<dyn GcpClientFactory>,

    /// Builds clients for downstream clusters
    pub clusters: Arc<dyn ClusterClientFactory>,

    pub settings: ReconcileSettings,

    /// Cancelled on SIGTERM/CTRL-C; every pass runs under a child token
    pub shutdown: CancellationToken,
}

impl<S: ResourceStore> Context<S> {
    #[must_use]
    pub fn new(
        store: S,
        gcp: Arc<dyn GcpClientFactory>,
        clusters: Arc<dyn ClusterClientFactory>,
        settings: ReconcileSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            gcp,
            clusters,
            settings,
            shutdown,
        }
    }
}
