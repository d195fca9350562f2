// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for kore.
//!
//! This module defines the Kubernetes Custom Resource Definitions reconciled by the
//! kore controllers, together with the status model they share.
//!
//! # Resource Types
//!
//! ## GCP Provisioning
//!
//! - [`Organization`] - A GCP organization (or folder/project parent) and the
//!   credentials kore uses to act inside it
//! - [`ProjectClaim`] - A team's claim on a GCP project provisioned under an organization
//!
//! ## Team Configuration
//!
//! - [`Allocation`] - Shares a resource (such as an organization) with other teams
//!
//! ## Clusters
//!
//! - [`Kubernetes`] - A managed cluster record; its credentials live in a Secret of
//!   the same name
//! - [`ManagedClusterRole`] - A `ClusterRole` projected onto many clusters
//!
//! # Example: Claiming a Project
//!
//! ```rust,no_run
//! use kore::crd::{Ownership, ProjectClaim, ProjectClaimSpec};
//!
//! let spec = ProjectClaimSpec {
//!     project_name: Some("team-a-dev".to_string()),
//!     service_account_name: None,
//!     organization: Ownership {
//!         group: "gcp.compute.kore.appvia.io".to_string(),
//!         version: "v1alpha1".to_string(),
//!         kind: "Organization".to_string(),
//!         namespace: "kore-admin".to_string(),
//!         name: "appvia".to_string(),
//!     },
//! };
//! let claim = ProjectClaim::new("team-a-dev", spec);
//! ```

use crate::constants::{ALL_TEAMS, GCP_API_GROUP, GCP_API_VERSION, KIND_ORGANIZATION};
use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Shared Types
// ============================================================================

/// A typed pointer to another resource.
///
/// Ownership never implies control over the target; it is only ever used as a
/// lookup key when resolving dependencies between resources.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Ownership {
    /// API group of the referenced resource (empty for the core group)
    #[serde(default)]
    pub group: String,
    /// API version of the referenced resource
    pub version: String,
    /// Kind of the referenced resource
    pub kind: String,
    /// Namespace of the referenced resource
    pub namespace: String,
    /// Name of the referenced resource
    pub name: String,
}

impl Ownership {
    /// Builds a reference to a core/v1 `Secret`.
    #[must_use]
    pub fn secret(namespace: &str, name: &str) -> Self {
        Self {
            group: String::new(),
            version: "v1".to_string(),
            kind: "Secret".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Returns true when this reference points at a GCP organization.
    #[must_use]
    pub fn is_organization(&self) -> bool {
        self.group == GCP_API_GROUP
            && self.version == GCP_API_VERSION
            && self.kind == KIND_ORGANIZATION
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}/{}/{}", self.version, self.kind, self.namespace, self.name)
        } else {
            write!(
                f,
                "{}/{}/{}/{}/{}",
                self.group, self.version, self.kind, self.namespace, self.name
            )
        }
    }
}

/// Overall status of a resource, and the outcome of a single stage.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
pub enum Status {
    /// Not yet reconciled, or some required stage has not run
    #[default]
    Pending,
    /// Every required stage succeeded
    Success,
    /// At least one stage failed
    Failure,
    /// Partially applied (some downstream targets failed)
    Warning,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Warning => "Warning",
        };
        f.write_str(s)
    }
}

/// The outcome of one named provisioning stage.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Stage name, unique within the owning status block
    pub name: String,

    /// Outcome of the stage
    pub status: Status,

    /// Stable, human readable summary
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Raw diagnostic text of the underlying error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Whether a failure is expected to clear on its own once retried
    #[serde(default)]
    pub retryable: bool,

    /// RFC3339 timestamp of the last status change of this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Ordered set of stage outcomes, keyed by stage name.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct Components(pub Vec<Component>);

// ============================================================================
// GCP Organization
// ============================================================================

/// `Organization` registers a GCP organization with kore.
///
/// The referenced credentials Secret must contain a JSON service account key under
/// `key.json`. That service account is used to create projects under the parent.
///
/// # Example
///
/// ```yaml
/// apiVersion: gcp.compute.kore.appvia.io/v1alpha1
/// kind: Organization
/// metadata:
///   name: appvia
///   namespace: kore-admin
/// spec:
///   parentType: organization
///   parentID: "123456789012"
///   billingAccount: 0000AA-BBBBBB-CCCCCC
///   serviceAccount: kore-admin
///   credentialsRef:
///     version: v1
///     kind: Secret
///     namespace: kore-admin
///     name: gcp-admin
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "gcp.compute.kore.appvia.io",
    version = "v1alpha1",
    kind = "Organization",
    namespaced,
    doc = "Organization is a GCP organization, folder or project that team projects go under."
)]
#[kube(status = "OrganizationStatus")]
#[kube(printcolumn = r#"{"name":"Parent","type":"string","jsonPath":".spec.parentID"}"#)]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec {
    /// Type of the parent resource: `organization`, `folder` or `project`
    pub parent_type: String,

    /// Identifier of the parent resource
    #[serde(rename = "parentID")]
    pub parent_id: String,

    /// Billing account linked to every claimed project
    pub billing_account: String,

    /// Name of the administrative service account
    #[serde(default)]
    pub service_account: String,

    /// Secret holding the administrative service account key
    pub credentials_ref: Ownership,
}

/// Status of an [`Organization`]
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationStatus {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub conditions: Components,
}

// ============================================================================
// GCP Project Claim
// ============================================================================

/// `ProjectClaim` asks kore for a GCP project owned by the claiming team.
///
/// A project name can be held by a single team at a time. Once provisioned, the
/// claim's `status.credentialsSecret` names a Secret in the team namespace holding
/// a key for the project service account.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "gcp.compute.kore.appvia.io",
    version = "v1alpha1",
    kind = "ProjectClaim",
    namespaced,
    doc = "ProjectClaim is a team's claim on a GCP project provisioned under an Organization."
)]
#[kube(status = "ProjectClaimStatus")]
#[kube(printcolumn = r#"{"name":"Project","type":"string","jsonPath":".status.projectID"}"#)]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClaimSpec {
    /// Name (and id) of the GCP project; defaults to the claim name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Name of the service account provisioned inside the project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Organization the project is created under
    pub organization: Ownership,
}

/// Status of a [`ProjectClaim`]
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClaimStatus {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub conditions: Components,

    /// Identifier of the provisioned project
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Secret in the claim namespace holding the project credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<String>,
}

impl ProjectClaim {
    /// The GCP project name requested by this claim.
    #[must_use]
    pub fn project_name(&self) -> String {
        self.spec
            .project_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    /// The service account name to provision, falling back to `default`.
    #[must_use]
    pub fn service_account_name(&self, default: &str) -> String {
        self.spec
            .service_account_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

// ============================================================================
// Allocation
// ============================================================================

/// `Allocation` shares a resource with one or more teams.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.kore.appvia.io",
    version = "v1",
    kind = "Allocation",
    namespaced,
    doc = "Allocation grants teams the use of a resource owned by another namespace."
)]
#[kube(status = "AllocationStatus")]
#[serde(rename_all = "camelCase")]
pub struct AllocationSpec {
    /// Display name of the allocation
    #[serde(default)]
    pub name: String,

    /// Short description of the allocation
    #[serde(default)]
    pub summary: String,

    /// The allocated resource
    pub resource: Ownership,

    /// Teams granted access; `*` grants every team
    #[serde(default)]
    pub teams: Vec<String>,
}

/// Status of an [`Allocation`]
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationStatus {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub conditions: Components,
}

impl Allocation {
    /// True when this allocation shares `resource` with `team`.
    #[must_use]
    pub fn grants(&self, team: &str, resource: &Ownership) -> bool {
        self.spec.resource == *resource
            && self
                .spec
                .teams
                .iter()
                .any(|t| t == team || t == ALL_TEAMS)
    }
}

// ============================================================================
// Kubernetes Clusters
// ============================================================================

/// `Kubernetes` is a cluster managed by kore on behalf of a team.
///
/// Credentials for the cluster are stored in a Secret of the same name and
/// namespace, with the keys `endpoint`, `ca.crt` and `token`.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "clusters.compute.kore.appvia.io",
    version = "v1",
    kind = "Kubernetes",
    plural = "kubernetes",
    namespaced,
    doc = "Kubernetes is a cluster owned by a team and managed by kore."
)]
#[kube(status = "KubernetesStatus")]
#[kube(printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.endpoint"}"#)]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSpec {
    /// DNS domain of the cluster
    #[serde(default)]
    pub domain: String,

    /// The cloud cluster backing this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Ownership>,
}

/// Status of a [`Kubernetes`] cluster
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesStatus {
    #[serde(default)]
    pub status: Status,

    /// API endpoint of the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub components: Components,
}

// ============================================================================
// Managed Cluster Roles
// ============================================================================

/// `ManagedClusterRole` projects a `ClusterRole` onto many clusters.
///
/// With neither `clusters` nor `teams` set, the role is applied to every cluster
/// kore manages. Otherwise it is applied to the listed clusters plus every cluster
/// owned by the listed teams.
///
/// # Example
///
/// ```yaml
/// apiVersion: clusters.compute.kore.appvia.io/v1
/// kind: ManagedClusterRole
/// metadata:
///   name: view-pods
///   namespace: kore-admin
/// spec:
///   enabled: true
///   teams: ["team-a"]
///   rules:
///     - apiGroups: [""]
///       resources: ["pods"]
///       verbs: ["get", "list", "watch"]
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "clusters.compute.kore.appvia.io",
    version = "v1",
    kind = "ManagedClusterRole",
    namespaced,
    doc = "ManagedClusterRole is a ClusterRole kore keeps in sync across managed clusters."
)]
#[kube(status = "ManagedClusterRoleStatus")]
#[kube(printcolumn = r#"{"name":"Enabled","type":"boolean","jsonPath":".spec.enabled"}"#)]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterRoleSpec {
    /// When false the role is kept on every target with no rules
    #[serde(default)]
    pub enabled: bool,

    /// Rules of the projected ClusterRole
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    /// Explicit target clusters
    #[serde(default)]
    pub clusters: Vec<Ownership>,

    /// Teams whose clusters are targeted
    #[serde(default)]
    pub teams: Vec<String>,
}

/// Status of a [`ManagedClusterRole`]
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterRoleStatus {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub conditions: Components,
}
