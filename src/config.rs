// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! Every option can be given on the command line or through a `KORE_*`
//! environment variable. Defaults come from [`crate::constants`].

use crate::constants::{
    API_POLL_INTERVAL_SECS, API_POLL_TIMEOUT_SECS, DEFAULT_SERVICE_ACCOUNT_NAME,
    ERROR_REQUEUE_DURATION_SECS, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PORT,
    PROJECT_POLL_INTERVAL_SECS, PROJECT_POLL_TIMEOUT_SECS, PROPAGATION_CONCURRENCY,
    RECONCILE_TIMEOUT_SECS, REQUIRED_GCP_APIS, RESYNC_INTERVAL_SECS, RETRY_INTERVAL_SECS,
};
use crate::context::ReconcileSettings;
use crate::gcp::{GcpEndpoints, PollPolicy};
use clap::Parser;
use std::time::Duration;

/// Command line and environment configuration of `kore-controller`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kore-controller",
    version,
    about = "Reconciles kore cloud resources",
    long_about = None
)]
pub struct ControllerConfig {
    /// Address the metrics and probe server binds to
    #[arg(long, env = "KORE_METRICS_BIND_ADDRESS", default_value = METRICS_SERVER_BIND_ADDRESS)]
    pub metrics_bind_address: String,

    /// Port of the metrics and probe server
    #[arg(long, env = "KORE_METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,

    /// Seconds between reconciliations of a healthy resource
    #[arg(long, env = "KORE_RESYNC_INTERVAL_SECS", default_value_t = RESYNC_INTERVAL_SECS)]
    pub resync_interval_secs: u64,

    /// Seconds before retrying a resource that failed transiently
    #[arg(long, env = "KORE_RETRY_INTERVAL_SECS", default_value_t = RETRY_INTERVAL_SECS)]
    pub retry_interval_secs: u64,

    /// Seconds before retrying after the reconciler itself returned an error
    #[arg(long, env = "KORE_ERROR_REQUEUE_SECS", default_value_t = ERROR_REQUEUE_DURATION_SECS)]
    pub error_requeue_secs: u64,

    /// Deadline in seconds for a single reconcile pass
    #[arg(long, env = "KORE_RECONCILE_TIMEOUT_SECS", default_value_t = RECONCILE_TIMEOUT_SECS)]
    pub reconcile_timeout_secs: u64,

    /// Number of clusters a managed cluster role is applied to concurrently
    #[arg(long, env = "KORE_PROPAGATION_CONCURRENCY", default_value_t = PROPAGATION_CONCURRENCY)]
    pub propagation_concurrency: usize,

    /// Service account created in claimed projects unless the claim names one
    #[arg(long, env = "KORE_DEFAULT_SERVICE_ACCOUNT", default_value = DEFAULT_SERVICE_ACCOUNT_NAME)]
    pub default_service_account: String,

    /// Send every GCP API call (and the token exchange) to this base URL
    #[arg(long, env = "KORE_GCP_ENDPOINT")]
    pub gcp_endpoint: Option<String>,
}

impl ControllerConfig {
    /// Reconciler settings derived from this configuration.
    #[must_use]
    pub fn settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            project_poll: PollPolicy::new(
                Duration::from_secs(PROJECT_POLL_INTERVAL_SECS),
                Duration::from_secs(PROJECT_POLL_TIMEOUT_SECS),
            ),
            api_poll: PollPolicy::new(
                Duration::from_secs(API_POLL_INTERVAL_SECS),
                Duration::from_secs(API_POLL_TIMEOUT_SECS),
            ),
            propagation_concurrency: self.propagation_concurrency.max(1),
            default_service_account: self.default_service_account.clone(),
            required_apis: REQUIRED_GCP_APIS.iter().map(ToString::to_string).collect(),
        }
    }

    /// GCP endpoints, honouring the endpoint override.
    #[must_use]
    pub fn gcp_endpoints(&self) -> GcpEndpoints {
        match &self.gcp_endpoint {
            Some(base) => GcpEndpoints::single(base),
            None => GcpEndpoints::default(),
        }
    }

    /// Socket address of the metrics and probe server.
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.metrics_bind_address, self.metrics_port)
    }
}
