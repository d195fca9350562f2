// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stable condition reasons and user-facing messages for kore resources.
//!
//! Reasons are programmatic identifiers in CamelCase. They are attached to the
//! error taxonomy (see [`crate::errors::ReconcileError::reason`]) and surface in
//! logs and metrics. Messages are the stable text written into a stage's
//! `message` field; the raw error text always goes into `detail`.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   status: Failure
//!   projectID: team-a-dev
//!   conditions:
//!     - name: provision
//!       status: Success
//!       message: GCP Project has been provisioned
//!     - name: organization
//!       status: Success
//!       message: Organization credentials resolved
//!     - name: billing
//!       status: Failure
//!       message: Failed to link the billing account to project
//!       detail: "cloudbilling: HTTP 403: permission denied"
//!       retryable: true
//! ```

// ============================================================================
// Reasons
// ============================================================================

/// The dependency is not allocated to the requesting team.
pub const REASON_NOT_PERMITTED: &str = "NotPermitted";

/// The requested name is already held by another team.
pub const REASON_ALREADY_CLAIMED: &str = "AlreadyClaimed";

/// A resource this one depends on is missing or not yet successful.
pub const REASON_DEPENDENCY_NOT_READY: &str = "DependencyNotReady";

/// A cloud provider API call failed.
pub const REASON_PROVIDER_ERROR: &str = "ProviderError";

/// A long-running cloud operation exceeded its ceiling.
pub const REASON_OPERATION_TIMEOUT: &str = "OperationTimeout";

/// The reconcile pass was cancelled or ran past its deadline.
pub const REASON_CANCELLED: &str = "Cancelled";

/// The resource store rejected or failed a request.
pub const REASON_STORE_ERROR: &str = "StoreError";

/// A downstream cluster could not be reached.
pub const REASON_CLUSTER_CLIENT_ERROR: &str = "ClusterClientError";

/// Some, but not all, downstream targets failed.
pub const REASON_PARTIAL_FAILURE: &str = "PartialFailure";

// ============================================================================
// Organization Messages
// ============================================================================

pub const MSG_ORGANIZATION_CREDENTIALS_VALID: &str = "Organization credentials are valid";

pub const MSG_ORGANIZATION_CREDENTIALS_FAILED: &str =
    "Unable to retrieve the organization credentials";

// ============================================================================
// Project Claim Messages
// ============================================================================

pub const MSG_NOT_PERMITTED: &str =
    "Organization has not been allocated to the team, unable to fulfil the request";

pub const MSG_ALREADY_CLAIMED: &str = "Project has already been claimed by another team in kore";

pub const MSG_UNIQUENESS_CHECK_FAILED: &str =
    "Unable to fulfil request, failed to verify project name uniqueness";

pub const MSG_ORGANIZATION_RESOLVED: &str = "Organization credentials resolved";

pub const MSG_ORGANIZATION_NOT_READY: &str = "Organization is not ready, unable to fulfil request";

pub const MSG_ORGANIZATION_CREDENTIALS_MISSING: &str =
    "Unable to retrieve the credentials for the organization";

pub const MSG_PROJECT_PROVISIONED: &str = "GCP Project has been provisioned";

pub const MSG_PROJECT_FAILED: &str = "Unable to provision project in GCP";

pub const MSG_BILLING_LINKED: &str = "GCP Project has been linked billing account";

pub const MSG_BILLING_FAILED: &str = "Failed to link the billing account to project";

pub const MSG_APIS_ENABLED: &str = "Successfully enabled all the APIs in project";

pub const MSG_APIS_FAILED: &str = "Failed to enable the required APIs in the project";

pub const MSG_IAM_PROVISIONED: &str = "Successfully provision the IAM in project";

pub const MSG_IAM_FAILED: &str = "Failed to provision the IAM credentials in the project";

pub const MSG_CREDENTIALS_PROVISIONED: &str = "Project credentials are available to the team";

pub const MSG_CREDENTIALS_FAILED: &str = "Failed to provision the project credentials";

// ============================================================================
// Cluster Role Messages
// ============================================================================

pub const MSG_CLUSTER_ROLE_APPLIED: &str = "Cluster role applied";

pub const MSG_CLUSTER_ROLE_FAILED: &str = "Failed to apply the cluster role";

pub const MSG_CLUSTER_ROLES_RESOLVE_FAILED: &str = "Unable to resolve the target clusters";

pub const MSG_CLUSTER_ROLES_PARTIAL: &str = "Failed to provision on all clusters";
