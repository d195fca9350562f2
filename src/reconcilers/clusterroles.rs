// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ManagedClusterRole` propagation to downstream clusters.
//!
//! A managed cluster role is projected as an rbac/v1 `ClusterRole` of the same
//! name onto every target cluster. Targets are:
//!
//! - every `Kubernetes` record, when neither `clusters` nor `teams` is set
//! - otherwise the explicit `clusters` plus every `Kubernetes` record in the
//!   listed team namespaces
//!
//! The fan-out is best effort. Every target is attempted, with bounded
//! concurrency, and the outcomes are collected into one list. One condition per
//! target (`<team>/<cluster>`) plus a `clusters` summary is recorded. When any
//! target fails the role is Warning with "N of M failed" and is retried soon;
//! targets already in sync are no-ops on the retry.

use crate::cluster_client::{client_for, ApplyOutcome};
use crate::constants::{ALL_TEAMS, FINALIZER_MANAGED_CLUSTER_ROLE, STAGE_CLUSTERS};
use crate::context::Context;
use crate::crd::{Kubernetes, ManagedClusterRole, ManagedClusterRoleSpec, ManagedClusterRoleStatus};
use crate::errors::ReconcileError;
use crate::labels::{K8S_MANAGED_BY, KORE_OWNED, KORE_OWNED_VALUE, MANAGED_BY_KORE};
use crate::metrics;
use crate::reconcilers::driver::Reconciler;
use crate::reconcilers::status::track;
use crate::status_reasons::{
    MSG_CLUSTER_ROLES_PARTIAL, MSG_CLUSTER_ROLES_RESOLVE_FAILED, MSG_CLUSTER_ROLE_APPLIED,
    MSG_CLUSTER_ROLE_FAILED,
};
use crate::store::{ObjectKey, ResourceStore};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use k8s_openapi::api::rbac::v1::ClusterRole;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Controller half for [`ManagedClusterRole`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ManagedClusterRoleReconciler;

#[async_trait]
impl Reconciler for ManagedClusterRoleReconciler {
    type Resource = ManagedClusterRole;

    fn finalizer(&self) -> &'static str {
        FINALIZER_MANAGED_CLUSTER_ROLE
    }

    fn required_stages(&self) -> &'static [&'static str] {
        &[STAGE_CLUSTERS]
    }

    async fn ensure<S: ResourceStore>(
        &self,
        ctx: &Context<S>,
        role: &mut ManagedClusterRole,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let mut status = role.status.take().unwrap_or_default();
        let result = propagate(ctx, role, &mut status, cancel).await;
        role.status = Some(status);
        result
    }

    async fn cleanup<S: ResourceStore>(
        &self,
        ctx: &Context<S>,
        role: &ManagedClusterRole,
    ) -> Result<(), ReconcileError> {
        let targets = resolve_targets(&ctx.store, &role.spec).await?;
        let name = role.name_any();
        let total = targets.len();
        let shutdown = &ctx.shutdown;

        let failed = stream::iter(targets)
            .map(|cluster| {
                let name = name.as_str();
                async move {
                    if shutdown.is_cancelled() {
                        return None;
                    }
                    let result = remove_from(ctx, &cluster, name).await;
                    if let Err(e) = &result {
                        error!(
                            cluster = %cluster,
                            error = %e,
                            "Failed to remove ClusterRole {}", name
                        );
                    }
                    Some(result.is_err())
                }
            })
            .buffer_unordered(ctx.settings.propagation_concurrency.max(1))
            .collect::<Vec<Option<bool>>>()
            .await;

        if shutdown.is_cancelled() {
            debug!("Removal of ClusterRole {} interrupted by shutdown", name);
            return Err(ReconcileError::Cancelled);
        }
        let failed = failed.into_iter().filter(|f| *f == Some(true)).count();
        if failed > 0 {
            return Err(ReconcileError::PartialFailure { failed, total });
        }
        info!("Removed ClusterRole {} from {} clusters", name, total);
        Ok(())
    }
}

async fn propagate<S: ResourceStore>(
    ctx: &Context<S>,
    role: &ManagedClusterRole,
    status: &mut ManagedClusterRoleStatus,
    cancel: &CancellationToken,
) -> Result<(), ReconcileError> {
    let targets = track(
        &mut status.conditions,
        STAGE_CLUSTERS,
        None,
        MSG_CLUSTER_ROLES_RESOLVE_FAILED,
        resolve_targets(&ctx.store, &role.spec).await,
    )?;

    let desired = project_cluster_role(role);
    let desired = &desired;
    let mut results: Vec<(ObjectKey, Result<ApplyOutcome, ReconcileError>)> = stream::iter(targets)
        .map(|cluster| async move {
            // targets not started before cancellation are skipped
            let result = if cancel.is_cancelled() {
                Err(ReconcileError::Cancelled)
            } else {
                apply_to(ctx, &cluster, desired).await
            };
            (cluster, result)
        })
        .buffer_unordered(ctx.settings.propagation_concurrency.max(1))
        .collect()
        .await;
    if cancel.is_cancelled() {
        debug!("Propagation of ClusterRole {} interrupted", desired.name_any());
        return Err(ReconcileError::Cancelled);
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));

    // conditions of clusters that are no longer targeted are dropped
    let current: BTreeSet<String> = results
        .iter()
        .map(|(cluster, _)| component_name(cluster))
        .collect();
    status
        .conditions
        .0
        .retain(|c| c.name == STAGE_CLUSTERS || current.contains(&c.name));

    let mut failed = 0;
    for (cluster, result) in &results {
        let name = component_name(cluster);
        match result {
            Ok(outcome) => {
                debug!(cluster = %cluster, ?outcome, "ClusterRole {} in sync", desired.name_any());
                metrics::record_cluster_propagation(outcome.as_str());
                status.conditions.set_success(&name, MSG_CLUSTER_ROLE_APPLIED);
            }
            Err(e) => {
                failed += 1;
                metrics::record_cluster_propagation("failed");
                error!(
                    cluster = %cluster,
                    error = %e,
                    "Failed to apply ClusterRole {}", desired.name_any()
                );
                status.conditions.set_failure(&name, MSG_CLUSTER_ROLE_FAILED, e);
            }
        }
    }

    let total = results.len();
    if failed > 0 {
        let err = ReconcileError::PartialFailure { failed, total };
        status
            .conditions
            .set_failure(STAGE_CLUSTERS, MSG_CLUSTER_ROLES_PARTIAL, &err);
        return Err(err);
    }
    status
        .conditions
        .set_success(STAGE_CLUSTERS, MSG_CLUSTER_ROLE_APPLIED);
    Ok(())
}

async fn apply_to<S: ResourceStore>(
    ctx: &Context<S>,
    cluster: &ObjectKey,
    desired: &ClusterRole,
) -> Result<ApplyOutcome, ReconcileError> {
    let client = client_for(&ctx.store, ctx.clusters.as_ref(), cluster).await?;
    Ok(client.apply_cluster_role(desired).await?)
}

async fn remove_from<S: ResourceStore>(
    ctx: &Context<S>,
    cluster: &ObjectKey,
    name: &str,
) -> Result<(), ReconcileError> {
    let client = client_for(&ctx.store, ctx.clusters.as_ref(), cluster).await?;
    Ok(client.delete_cluster_role(name).await?)
}

fn component_name(cluster: &ObjectKey) -> String {
    format!("{}/{}", cluster.namespace, cluster.name)
}

/// Clusters a role applies to, de-duplicated and ordered by key.
///
/// # Errors
///
/// Store failures listing `Kubernetes` records.
pub async fn resolve_targets<S: ResourceStore>(
    store: &S,
    spec: &ManagedClusterRoleSpec,
) -> Result<Vec<ObjectKey>, ReconcileError> {
    let mut targets = BTreeSet::new();

    if spec.clusters.is_empty() && spec.teams.is_empty() {
        targets.extend(store.list::<Kubernetes>(None).await?.iter().map(ObjectKey::of));
        return Ok(targets.into_iter().collect());
    }

    targets.extend(spec.clusters.iter().map(ObjectKey::from));
    for team in &spec.teams {
        let namespace = (team != ALL_TEAMS).then_some(team.as_str());
        targets.extend(store.list::<Kubernetes>(namespace).await?.iter().map(ObjectKey::of));
    }
    Ok(targets.into_iter().collect())
}

/// The `ClusterRole` a managed cluster role is projected as.
///
/// A disabled role keeps its name and labels but grants nothing.
#[must_use]
pub fn project_cluster_role(role: &ManagedClusterRole) -> ClusterRole {
    let labels = BTreeMap::from([
        (KORE_OWNED.to_string(), KORE_OWNED_VALUE.to_string()),
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_KORE.to_string()),
    ]);
    let rules = if role.spec.enabled {
        role.spec.rules.clone()
    } else {
        Vec::new()
    };
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(role.name_any()),
            labels: Some(labels),
            ..Default::default()
        },
        rules: Some(rules),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "clusterroles_tests.rs"]
mod clusterroles_tests;
