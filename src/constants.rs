// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the kore controllers.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the GCP provisioning CRDs (`Organization`, `ProjectClaim`)
pub const GCP_API_GROUP: &str = "gcp.compute.kore.appvia.io";

/// API version for the GCP provisioning CRDs
pub const GCP_API_VERSION: &str = "v1alpha1";

/// API group for cluster records and managed cluster roles
pub const CLUSTERS_API_GROUP: &str = "clusters.compute.kore.appvia.io";

/// Kind name for `Organization` resource
pub const KIND_ORGANIZATION: &str = "Organization";

/// Kind name for `Kubernetes` resource
pub const KIND_KUBERNETES: &str = "Kubernetes";

/// Team wildcard accepted in `Allocation.spec.teams`
pub const ALL_TEAMS: &str = "*";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer held by the organization reconciler
pub const FINALIZER_ORGANIZATION: &str = "gcp-organizations.kore.appvia.io";

/// Finalizer held by the project claim reconciler
pub const FINALIZER_PROJECT_CLAIM: &str = "gcp-project-claims.kore.appvia.io";

/// Finalizer held by the managed cluster role propagator
pub const FINALIZER_MANAGED_CLUSTER_ROLE: &str = "managedclusterroles.kore.appvia.io";

// ============================================================================
// Provisioning Stages
// ============================================================================

/// Permission, uniqueness and project creation
pub const STAGE_PROVISION: &str = "provision";

/// Parent organization and its credentials
pub const STAGE_ORGANIZATION: &str = "organization";

/// Billing account linkage
pub const STAGE_BILLING: &str = "billing";

/// Required service APIs
pub const STAGE_APIS: &str = "apis";

/// Project service account
pub const STAGE_IAM: &str = "iam";

/// Service account key material and the derived secret
pub const STAGE_CREDENTIALS: &str = "credentials";

/// Summary component written by the cluster role propagator
pub const STAGE_CLUSTERS: &str = "clusters";

// ============================================================================
// GCP Constants
// ============================================================================

/// Service account created in every claimed project unless overridden
pub const DEFAULT_SERVICE_ACCOUNT_NAME: &str = "kore";

/// Key in credential secrets that holds the JSON service account key
pub const SERVICE_ACCOUNT_KEY_FIELD: &str = "key.json";

/// Suffix of the derived credentials secret written for each claim
pub const CREDENTIALS_SECRET_SUFFIX: &str = "-credentials";

/// APIs enabled in every claimed project
pub const REQUIRED_GCP_APIS: &[&str] = &[
    "cloudbilling.googleapis.com",
    "cloudresourcemanager.googleapis.com",
    "compute.googleapis.com",
    "iam.googleapis.com",
    "serviceusage.googleapis.com",
];

/// Service state reported by the service usage API for enabled APIs
pub const SERVICE_STATE_ENABLED: &str = "ENABLED";

/// OAuth scope requested for the controller's access token
pub const GCP_OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Default OAuth token endpoint when the key does not carry one
pub const GCP_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for signed JWT assertions
pub const GCP_ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Cloud Resource Manager base URL
pub const GCP_RESOURCE_MANAGER_URL: &str = "https://cloudresourcemanager.googleapis.com";

/// Cloud Billing base URL
pub const GCP_BILLING_URL: &str = "https://cloudbilling.googleapis.com";

/// Service Usage base URL
pub const GCP_SERVICE_USAGE_URL: &str = "https://serviceusage.googleapis.com";

/// IAM base URL
pub const GCP_IAM_URL: &str = "https://iam.googleapis.com";

/// HTTP timeout for individual GCP REST calls
pub const GCP_HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Operation Polling
// ============================================================================

/// Interval between project creation operation polls
pub const PROJECT_POLL_INTERVAL_SECS: u64 = 10;

/// Ceiling for project creation
pub const PROJECT_POLL_TIMEOUT_SECS: u64 = 300;

/// Interval between API enablement operation polls
pub const API_POLL_INTERVAL_SECS: u64 = 5;

/// Ceiling for a single API enablement
pub const API_POLL_TIMEOUT_SECS: u64 = 180;

// ============================================================================
// Controller Timing
// ============================================================================

/// Periodic resync after a successful reconciliation (drift detection)
pub const RESYNC_INTERVAL_SECS: u64 = 900;

/// Requeue after a retryable failure
pub const RETRY_INTERVAL_SECS: u64 = 120;

/// Requeue used by the controller error policy
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Overall deadline for a single reconcile pass
pub const RECONCILE_TIMEOUT_SECS: u64 = 600;

/// Number of downstream clusters updated concurrently by the propagator
pub const PROPAGATION_CONCURRENCY: usize = 4;

// ============================================================================
// Server Constants
// ============================================================================

/// Default port for the metrics and probe server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Bind address for the metrics and probe server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";

/// Metrics endpoint path
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Liveness endpoint path
pub const HEALTHZ_PATH: &str = "/healthz";

/// Readiness endpoint path
pub const READYZ_PATH: &str = "/readyz";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
