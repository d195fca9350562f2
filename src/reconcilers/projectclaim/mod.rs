// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ProjectClaim` reconciliation.
//!
//! A claim provisions a GCP project for a team under a shared organization and
//! hands the team a service account key for it. Steps run in a fixed order and
//! a pass stops at the first failure. The failed stage is recorded and the
//! stages after it are dropped from the status until a pass reaches them again:
//!
//! | Step | Stage |
//! |------|-------|
//! | organization allocated to the team | `provision` |
//! | project name not claimed by another team | `provision` |
//! | organization exists and is Success | `organization` |
//! | organization credentials usable | `organization` |
//! | project exists | `provision` |
//! | billing account linked | `billing` |
//! | required APIs enabled | `apis` |
//! | service account exists | `iam` |
//! | key published as `<claim>-credentials` | `credentials` |
//!
//! ## Module Structure
//!
//! - [`validation`] - permission and uniqueness checks
//! - [`provision`] - the GCP ensure steps
//! - [`cleanup`] - deletion of the published credentials

pub mod cleanup;
pub mod provision;
pub mod validation;

use crate::constants::{
    FINALIZER_PROJECT_CLAIM, KIND_ORGANIZATION, STAGE_APIS, STAGE_BILLING, STAGE_CREDENTIALS,
    STAGE_IAM, STAGE_ORGANIZATION, STAGE_PROVISION,
};
use crate::context::Context;
use crate::crd::{Organization, Ownership, ProjectClaim, ProjectClaimStatus, Status};
use crate::errors::ReconcileError;
use crate::gcp::GcpClients;
use crate::reconcilers::driver::Reconciler;
use crate::reconcilers::organization::load_organization_key;
use crate::reconcilers::status::track_ordered;
use crate::status_reasons::{
    MSG_ALREADY_CLAIMED, MSG_APIS_ENABLED, MSG_APIS_FAILED, MSG_BILLING_FAILED,
    MSG_BILLING_LINKED, MSG_CREDENTIALS_FAILED, MSG_CREDENTIALS_PROVISIONED, MSG_IAM_FAILED,
    MSG_IAM_PROVISIONED, MSG_NOT_PERMITTED, MSG_ORGANIZATION_CREDENTIALS_MISSING,
    MSG_ORGANIZATION_NOT_READY, MSG_ORGANIZATION_RESOLVED, MSG_PROJECT_FAILED,
    MSG_PROJECT_PROVISIONED, MSG_UNIQUENESS_CHECK_FAILED,
};
use crate::store::{ObjectKey, ResourceStore};
use async_trait::async_trait;
use kube::ResourceExt;
use provision::{
    ensure_apis, ensure_billing, ensure_credentials, ensure_project, ensure_service_account,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use validation::{ensure_permitted, ensure_unique, list_claims};

/// Stages that must all succeed for a claim to be Success, in the order a pass
/// completes them
const REQUIRED_STAGES: &[&str] = &[
    STAGE_ORGANIZATION,
    STAGE_PROVISION,
    STAGE_BILLING,
    STAGE_APIS,
    STAGE_IAM,
    STAGE_CREDENTIALS,
];

/// Controller half for [`ProjectClaim`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ProjectClaimReconciler;

#[async_trait]
impl Reconciler for ProjectClaimReconciler {
    type Resource = ProjectClaim;

    fn finalizer(&self) -> &'static str {
        FINALIZER_PROJECT_CLAIM
    }

    fn required_stages(&self) -> &'static [&'static str] {
        REQUIRED_STAGES
    }

    async fn ensure<S: ResourceStore>(
        &self,
        ctx: &Context<S>,
        claim: &mut ProjectClaim,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let mut status = claim.status.take().unwrap_or_default();
        let result = run_steps(ctx, claim, &mut status, cancel).await;
        claim.status = Some(status);
        result
    }

    async fn cleanup<S: ResourceStore>(
        &self,
        ctx: &Context<S>,
        claim: &ProjectClaim,
    ) -> Result<(), ReconcileError> {
        cleanup::delete_credentials(&ctx.store, claim).await
    }
}

async fn run_steps<S: ResourceStore>(
    ctx: &Context<S>,
    claim: &ProjectClaim,
    status: &mut ProjectClaimStatus,
    cancel: &CancellationToken,
) -> Result<(), ReconcileError> {
    let team = claim.namespace().unwrap_or_default();
    let reference = &claim.spec.organization;

    track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_PROVISION,
        None,
        MSG_NOT_PERMITTED,
        ensure_permitted(&ctx.store, &team, reference).await,
    )?;
    let claims = track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_PROVISION,
        None,
        MSG_UNIQUENESS_CHECK_FAILED,
        list_claims(&ctx.store).await.map_err(ReconcileError::from),
    )?;
    track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_PROVISION,
        None,
        MSG_ALREADY_CLAIMED,
        ensure_unique(claim, status.project_id.is_some(), &claims),
    )?;
    let organization = track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_ORGANIZATION,
        None,
        MSG_ORGANIZATION_NOT_READY,
        resolve_organization(&ctx.store, reference).await,
    )?;
    let clients = track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_ORGANIZATION,
        Some(MSG_ORGANIZATION_RESOLVED),
        MSG_ORGANIZATION_CREDENTIALS_MISSING,
        connect(ctx, &organization).await,
    )?;

    let project_id = track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_PROVISION,
        Some(MSG_PROJECT_PROVISIONED),
        MSG_PROJECT_FAILED,
        ensure_project(ctx, &clients, &organization, &claim.project_name(), cancel).await,
    )?;
    status.project_id = Some(project_id.clone());

    track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_BILLING,
        Some(MSG_BILLING_LINKED),
        MSG_BILLING_FAILED,
        ensure_billing(&clients, &organization, &project_id).await,
    )?;
    track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_APIS,
        Some(MSG_APIS_ENABLED),
        MSG_APIS_FAILED,
        ensure_apis(ctx, &clients, &project_id, cancel).await,
    )?;

    let account = claim.service_account_name(&ctx.settings.default_service_account);
    let email = track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_IAM,
        Some(MSG_IAM_PROVISIONED),
        MSG_IAM_FAILED,
        ensure_service_account(&clients, &project_id, &account).await,
    )?;

    let secret = track_ordered(
        &mut status.conditions,
        REQUIRED_STAGES,
        STAGE_CREDENTIALS,
        Some(MSG_CREDENTIALS_PROVISIONED),
        MSG_CREDENTIALS_FAILED,
        ensure_credentials(ctx, &clients, claim, &project_id, &email).await,
    )?;
    status.credentials_secret = Some(secret);

    Ok(())
}

/// Fetch the referenced organization, requiring it to be Success.
async fn resolve_organization<S: ResourceStore>(
    store: &S,
    reference: &Ownership,
) -> Result<Organization, ReconcileError> {
    let dependency = format!("organization {}/{}", reference.namespace, reference.name);
    if !reference.is_organization() {
        return Err(ReconcileError::DependencyNotReady {
            dependency,
            message: format!("reference is a {}, expected a {KIND_ORGANIZATION}", reference.kind),
        });
    }

    match store.get_opt::<Organization>(&ObjectKey::from(reference)).await? {
        None => Err(ReconcileError::DependencyNotReady {
            dependency,
            message: "organization does not exist".to_string(),
        }),
        Some(organization) => {
            let current = organization
                .status
                .as_ref()
                .map(|s| s.status)
                .unwrap_or_default();
            if current == Status::Success {
                debug!(organization = %dependency, "Organization is ready");
                Ok(organization)
            } else {
                Err(ReconcileError::DependencyNotReady {
                    dependency,
                    message: format!("organization status is {current}"),
                })
            }
        }
    }
}

/// Build GCP clients from the organization's key, read fresh from its Secret.
async fn connect<S: ResourceStore>(
    ctx: &Context<S>,
    organization: &Organization,
) -> Result<GcpClients, ReconcileError> {
    let key = load_organization_key(ctx, organization).await?;
    Ok(ctx.gcp.connect(&key).await?)
}
