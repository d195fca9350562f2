// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Idempotent provisioning steps for a claimed GCP project.
//!
//! Every step reads the current state first and only mutates when it differs
//! from the desired state, so re-running a successful claim issues reads only.
//! Steps that start a long-running operation wait for it under the pass's
//! cancellation token.

use crate::constants::{SERVICE_ACCOUNT_KEY_FIELD, SERVICE_STATE_ENABLED};
use crate::context::Context;
use crate::crd::{Organization, ProjectClaim};
use crate::errors::{ProviderError, ReconcileError};
use crate::gcp::{
    billing_account_name, service_account_email, wait_until_complete, GcpClients, Project,
    ResourceId,
};
use crate::labels::{K8S_MANAGED_BY, KORE_CLAIM, KORE_OWNED, KORE_OWNED_VALUE, MANAGED_BY_KORE};
use crate::store::{ObjectKey, ResourceStore};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Display name given to service accounts kore creates
const SERVICE_ACCOUNT_DISPLAY_NAME: &str = "Kore managed service account";

/// Service name used in errors about the downloaded key
const SERVICE_IAM: &str = "iam";

/// Find the project, creating it under the organization's parent when missing.
///
/// # Errors
///
/// Provider failures, a failed or timed out create operation, or cancellation.
pub async fn ensure_project<S: ResourceStore>(
    ctx: &Context<S>,
    clients: &GcpClients,
    organization: &Organization,
    project_id: &str,
    cancel: &CancellationToken,
) -> Result<String, ReconcileError> {
    if let Some(project) = clients.projects.find_project(project_id).await? {
        debug!(project = project_id, "Project already exists");
        return Ok(project.project_id);
    }

    info!(
        project = project_id,
        parent = %organization.spec.parent_id,
        "Creating GCP project"
    );
    let request = Project {
        project_id: project_id.to_string(),
        name: project_id.to_string(),
        lifecycle_state: String::new(),
        parent: Some(ResourceId {
            kind: organization.spec.parent_type.clone(),
            id: organization.spec.parent_id.clone(),
        }),
    };
    let operation = clients.projects.create_project(&request).await?;

    let projects = Arc::clone(&clients.projects);
    wait_until_complete(
        cancel,
        ctx.settings.project_poll,
        "create project",
        operation,
        move |name| {
            let projects = Arc::clone(&projects);
            async move { projects.get_operation(&name).await }
        },
    )
    .await?;

    info!(project = project_id, "GCP project created");
    Ok(project_id.to_string())
}

/// Link the project to the organization's billing account.
///
/// # Errors
///
/// Provider failures reading or updating the billing info.
pub async fn ensure_billing(
    clients: &GcpClients,
    organization: &Organization,
    project_id: &str,
) -> Result<(), ReconcileError> {
    let desired = billing_account_name(&organization.spec.billing_account);
    let current = clients.billing.get_billing_info(project_id).await?;
    if current.billing_account_name == desired {
        debug!(project = project_id, account = %desired, "Billing account already linked");
        return Ok(());
    }

    info!(project = project_id, account = %desired, "Linking billing account");
    clients.billing.update_billing_info(project_id, &desired).await?;
    Ok(())
}

/// Enable every required API that is not enabled yet.
///
/// # Errors
///
/// Provider failures, a failed or timed out enable operation, or cancellation.
pub async fn ensure_apis<S: ResourceStore>(
    ctx: &Context<S>,
    clients: &GcpClients,
    project_id: &str,
    cancel: &CancellationToken,
) -> Result<(), ReconcileError> {
    for api in &ctx.settings.required_apis {
        let state = clients.services.service_state(project_id, api).await?;
        if state == SERVICE_STATE_ENABLED {
            debug!(project = project_id, api = %api, "API already enabled");
            continue;
        }

        info!(project = project_id, api = %api, "Enabling API");
        let operation = clients.services.enable_service(project_id, api).await?;
        let services = Arc::clone(&clients.services);
        wait_until_complete(
            cancel,
            ctx.settings.api_poll,
            &format!("enable {api}"),
            operation,
            move |name| {
                let services = Arc::clone(&services);
                async move { services.get_operation(&name).await }
            },
        )
        .await?;
    }
    Ok(())
}

/// Make sure the claim's service account exists, returning its email.
///
/// # Errors
///
/// Provider failures looking up or creating the account.
pub async fn ensure_service_account(
    clients: &GcpClients,
    project_id: &str,
    account: &str,
) -> Result<String, ReconcileError> {
    let email = service_account_email(account, project_id);
    if clients
        .iam
        .find_service_account(project_id, &email)
        .await?
        .is_some()
    {
        debug!(project = project_id, account = %email, "Service account already exists");
        return Ok(email);
    }

    info!(project = project_id, account = %email, "Creating service account");
    let created = clients
        .iam
        .create_service_account(project_id, account, SERVICE_ACCOUNT_DISPLAY_NAME)
        .await?;
    Ok(if created.email.is_empty() { email } else { created.email })
}

/// Name of the Secret holding a claim's service account key.
#[must_use]
pub fn credentials_secret_name(claim: &ProjectClaim) -> String {
    format!("{}{}", claim.name_any(), crate::constants::CREDENTIALS_SECRET_SUFFIX)
}

/// Publish a service account key to the team as a Secret.
///
/// A Secret that already holds a key is left untouched; a new key is only
/// minted when there is nowhere it has been stored yet.
///
/// # Errors
///
/// Provider failures creating the key, an undecodable key, or store failures.
pub async fn ensure_credentials<S: ResourceStore>(
    ctx: &Context<S>,
    clients: &GcpClients,
    claim: &ProjectClaim,
    project_id: &str,
    email: &str,
) -> Result<String, ReconcileError> {
    let name = credentials_secret_name(claim);
    let key = ObjectKey::new(&claim.namespace().unwrap_or_default(), &name);

    let existing = ctx.store.get_opt::<Secret>(&key).await?;
    let has_key = existing
        .as_ref()
        .and_then(|secret| secret.data.as_ref())
        .is_some_and(|data| data.contains_key(SERVICE_ACCOUNT_KEY_FIELD));
    if has_key {
        debug!(secret = %key, "Credentials secret already holds a key");
        return Ok(name);
    }

    info!(project = project_id, account = email, secret = %key, "Creating service account key");
    let created = clients.iam.create_key(project_id, email).await?;
    let material = BASE64
        .decode(created.private_key_data.as_bytes())
        .map_err(|e| ProviderError::Decode {
            service: SERVICE_IAM.to_string(),
            message: format!("service account key is not valid base64: {e}"),
        })?;

    if existing.is_some() {
        let patch = json!({ "data": { SERVICE_ACCOUNT_KEY_FIELD: BASE64.encode(&material) } });
        ctx.store.patch::<Secret>(&key, &patch).await?;
    } else {
        ctx.store.create(&credentials_secret(claim, &key, material)).await?;
    }
    Ok(name)
}

fn credentials_secret(claim: &ProjectClaim, key: &ObjectKey, material: Vec<u8>) -> Secret {
    let labels = BTreeMap::from([
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_KORE.to_string()),
        (KORE_OWNED.to_string(), KORE_OWNED_VALUE.to_string()),
        (KORE_CLAIM.to_string(), claim.name_any()),
    ]);
    Secret {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            SERVICE_ACCOUNT_KEY_FIELD.to_string(),
            ByteString(material),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}
