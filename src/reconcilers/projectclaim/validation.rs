// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admission checks run before anything is provisioned.
//!
//! - [`ensure_permitted`] - the organization belongs to, or is allocated to, the team
//! - [`ensure_unique`] - no other team holds the same project name

use crate::crd::{Allocation, Ownership, ProjectClaim};
use crate::errors::{ReconcileError, StoreError};
use crate::reconcilers::finalizers::is_deletion_candidate;
use crate::store::ResourceStore;
use kube::{Resource, ResourceExt};
use tracing::{debug, warn};

/// Check the claim's team may use the referenced organization.
///
/// A team may always use an organization in its own namespace. Otherwise an
/// [`Allocation`] in the organization's namespace must list the team, or `*`.
///
/// # Errors
///
/// [`ReconcileError::NotPermitted`] when no allocation grants access.
pub async fn ensure_permitted<S: ResourceStore>(
    store: &S,
    team: &str,
    organization: &Ownership,
) -> Result<(), ReconcileError> {
    if organization.namespace == team {
        return Ok(());
    }

    let allocations = store.list::<Allocation>(Some(&organization.namespace)).await?;
    if allocations.iter().any(|a| a.grants(team, organization)) {
        debug!(team, organization = %organization, "Organization allocated to team");
        return Ok(());
    }

    warn!(team, organization = %organization, "Organization has not been allocated to team");
    Err(ReconcileError::NotPermitted {
        resource: format!("{}/{}", organization.namespace, organization.name),
        team: team.to_string(),
    })
}

/// List every project claim in the cluster for the uniqueness scan.
///
/// # Errors
///
/// Any store failure; the caller records it as a failed uniqueness check.
pub async fn list_claims<S: ResourceStore>(store: &S) -> Result<Vec<ProjectClaim>, StoreError> {
    store.list::<ProjectClaim>(None).await
}

/// Check no claim in another namespace holds the same project name.
///
/// `holds` is true once this claim has been assigned the project, which makes
/// it the holder regardless of age. Between two unassigned claims the older
/// one wins, ties broken by namespace.
///
/// # Errors
///
/// [`ReconcileError::AlreadyClaimed`] naming the holding team.
pub fn ensure_unique(
    claim: &ProjectClaim,
    holds: bool,
    claims: &[ProjectClaim],
) -> Result<(), ReconcileError> {
    if holds {
        return Ok(());
    }
    match claimed_elsewhere(claim, claims) {
        Some(holder) => Err(ReconcileError::AlreadyClaimed {
            name: claim.project_name(),
            team: holder.namespace().unwrap_or_default(),
        }),
        None => Ok(()),
    }
}

fn claimed_elsewhere<'a>(
    claim: &ProjectClaim,
    claims: &'a [ProjectClaim],
) -> Option<&'a ProjectClaim> {
    let name = claim.project_name();
    let team = claim.namespace();

    claims
        .iter()
        .filter(|other| other.namespace() != team)
        .filter(|other| !is_deletion_candidate(*other))
        .filter(|other| other.project_name() == name)
        .find(|other| has_project(other) || precedes(other, claim))
}

fn has_project(claim: &ProjectClaim) -> bool {
    claim
        .status
        .as_ref()
        .is_some_and(|status| status.project_id.is_some())
}

fn precedes(a: &ProjectClaim, b: &ProjectClaim) -> bool {
    let order = |claim: &ProjectClaim| {
        (
            claim.meta().creation_timestamp.as_ref().map(|t| t.0),
            claim.namespace().unwrap_or_default(),
        )
    };
    let (a_created, a_namespace) = order(a);
    let (b_created, b_namespace) = order(b);
    match (a_created, b_created) {
        (Some(a_created), Some(b_created)) if a_created != b_created => a_created < b_created,
        _ => a_namespace < b_namespace,
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;
