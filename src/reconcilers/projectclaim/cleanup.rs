// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cleanup of a deleted project claim.
//!
//! The credentials Secret published to the team is removed. The GCP project
//! itself is kept: deleting a project destroys everything in it, and that is
//! left to an operator.

use super::provision::credentials_secret_name;
use crate::errors::ReconcileError;
use crate::crd::ProjectClaim;
use crate::store::{ObjectKey, ResourceStore};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info};

/// Delete the claim's credentials Secret; a missing Secret is not an error.
///
/// # Errors
///
/// Store failures other than not-found.
pub async fn delete_credentials<S: ResourceStore>(
    store: &S,
    claim: &ProjectClaim,
) -> Result<(), ReconcileError> {
    let key = ObjectKey::new(
        &claim.namespace().unwrap_or_default(),
        &credentials_secret_name(claim),
    );
    match store.delete::<Secret>(&key).await {
        Ok(()) => {
            info!(secret = %key, "Deleted project credentials");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(secret = %key, "Project credentials already removed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
