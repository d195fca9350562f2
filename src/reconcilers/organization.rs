// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Organization` reconciliation.
//!
//! An organization is Success once the service account key referenced by its
//! `credentialsRef` Secret can be read and parsed. Project claims only proceed
//! against a successful organization, and read the same key through
//! [`load_organization_key`] on every pass.

use crate::constants::{FINALIZER_ORGANIZATION, SERVICE_ACCOUNT_KEY_FIELD, STAGE_CREDENTIALS};
use crate::context::Context;
use crate::crd::Organization;
use crate::errors::{ProviderError, ReconcileError};
use crate::gcp::ServiceAccountKey;
use crate::reconcilers::driver::Reconciler;
use crate::reconcilers::status::track;
use crate::status_reasons::{
    MSG_ORGANIZATION_CREDENTIALS_FAILED, MSG_ORGANIZATION_CREDENTIALS_VALID,
};
use crate::store::{ObjectKey, ResourceStore};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Controller half for [`Organization`].
#[derive(Clone, Copy, Debug, Default)]
pub struct OrganizationReconciler;

#[async_trait]
impl Reconciler for OrganizationReconciler {
    type Resource = Organization;

    fn finalizer(&self) -> &'static str {
        FINALIZER_ORGANIZATION
    }

    fn required_stages(&self) -> &'static [&'static str] {
        &[STAGE_CREDENTIALS]
    }

    async fn ensure<S: ResourceStore>(
        &self,
        ctx: &Context<S>,
        organization: &mut Organization,
        _cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let mut status = organization.status.take().unwrap_or_default();
        let result = track(
            &mut status.conditions,
            STAGE_CREDENTIALS,
            Some(MSG_ORGANIZATION_CREDENTIALS_VALID),
            MSG_ORGANIZATION_CREDENTIALS_FAILED,
            load_organization_key(ctx, organization).await.map(drop),
        );
        organization.status = Some(status);
        result
    }

    async fn cleanup<S: ResourceStore>(
        &self,
        _ctx: &Context<S>,
        _organization: &Organization,
    ) -> Result<(), ReconcileError> {
        Ok(())
    }
}

/// Read and parse the service account key of an organization.
///
/// # Errors
///
/// [`ReconcileError::DependencyNotReady`] when the Secret or its key entry is
/// missing, a non-retryable provider error when the key does not parse.
pub async fn load_organization_key<S: ResourceStore>(
    ctx: &Context<S>,
    organization: &Organization,
) -> Result<ServiceAccountKey, ReconcileError> {
    let reference = &organization.spec.credentials_ref;
    let key = ObjectKey::from(reference);

    let secret = ctx.store.get_opt::<Secret>(&key).await?.ok_or_else(|| {
        ReconcileError::DependencyNotReady {
            dependency: format!("secret {key}"),
            message: "organization credentials secret does not exist".to_string(),
        }
    })?;

    let data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(SERVICE_ACCOUNT_KEY_FIELD))
        .map(|value| value.0.as_slice())
        .ok_or_else(|| ReconcileError::DependencyNotReady {
            dependency: format!("secret {key}"),
            message: format!("secret has no '{SERVICE_ACCOUNT_KEY_FIELD}' entry"),
        })?;

    let parsed = ServiceAccountKey::from_json(data).map_err(|e| match e {
        ProviderError::Auth(message) => {
            ProviderError::Auth(format!("secret {key}: {message}"))
        }
        other => other,
    })?;
    debug!(secret = %key, account = %parsed.client_email, "Loaded organization credentials");
    Ok(parsed)
}

#[cfg(test)]
#[path = "organization_tests.rs"]
mod organization_tests;
