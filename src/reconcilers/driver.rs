// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic reconcile loop shared by every resource kind.
//!
//! A kind plugs in through [`Reconciler`]: which finalizer it owns, which stages
//! must succeed, the ordered ensure steps and the deletion cleanup. [`reconcile`]
//! runs one pass for one object:
//!
//! 1. **Fetch** - a missing object is done
//! 2. **Delete** - when marked for deletion, clean up and drop the finalizer
//! 3. **Ensure** - run the steps under the pass deadline and a child cancellation token
//! 4. **Finalizer** - on success, attach the finalizer and requeue immediately
//! 5. **Status** - patch the status against the version read in step 1
//! 6. **Requeue** - resync on success, retry soon on a transient failure
//!
//! Step failures are recorded as stage conditions and decide the requeue delay.
//! Only failures the status cannot describe are returned as errors: store
//! failures (including a lost version race), cleanup failures and cancellation.
//! The controller's error policy requeues those, and the next pass re-fetches
//! and recomputes everything.

use crate::context::Context;
use crate::errors::{ReconcileError, StoreError};
use crate::metrics;
use crate::reconcilers::finalizers::{
    add_finalizer, has_finalizer, is_deletion_candidate, need_to_add, remove_finalizer,
};
use crate::reconcilers::status::{Tracked, TrackedStatus};
use crate::store::{kind_of, serialization_error, ObjectKey, ResourceStore, StoredResource};
use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kind-specific half of a controller.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Resource: StoredResource + Tracked;

    /// Finalizer token owned by this controller.
    fn finalizer(&self) -> &'static str;

    /// Stages that must all report Success for the resource to be Success.
    fn required_stages(&self) -> &'static [&'static str];

    /// Run the ordered ensure steps, recording each stage in the resource status.
    ///
    /// Stops at the first failing step and returns its error.
    async fn ensure<S: ResourceStore>(
        &self,
        ctx: &Context<S>,
        resource: &mut Self::Resource,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError>;

    /// Release whatever the resource produced before its finalizer is removed.
    async fn cleanup<S: ResourceStore>(
        &self,
        ctx: &Context<S>,
        resource: &Self::Resource,
    ) -> Result<(), ReconcileError>;
}

/// Run one reconcile pass for the object at `key`.
///
/// # Errors
///
/// Store failures, cleanup failures and cancellation. Failed ensure steps are
/// recorded in the status and answered with a requeue instead.
pub async fn reconcile<R, S>(
    reconciler: &R,
    ctx: &Context<S>,
    key: &ObjectKey,
) -> Result<Action, ReconcileError>
where
    R: Reconciler,
    S: ResourceStore,
{
    let kind = kind_of::<R::Resource>();
    let finalizer = reconciler.finalizer();

    let Some(mut resource) = ctx.store.get_opt::<R::Resource>(key).await? else {
        debug!("{} {} no longer exists, nothing to do", kind, key);
        return Ok(Action::await_change());
    };

    if is_deletion_candidate(&resource) {
        if !has_finalizer(&resource, finalizer) {
            debug!("{} {} is being deleted and holds no finalizer of ours", kind, key);
            return Ok(Action::await_change());
        }
        info!("Running cleanup for deleted {} {}", kind, key);
        reconciler.cleanup(ctx, &resource).await?;
        remove_finalizer(&ctx.store, &resource, finalizer).await?;
        return Ok(Action::await_change());
    }

    info!("Reconciling {} {}", kind, key);
    let original = resource.tracked_status().cloned().unwrap_or_default();

    // Shutdown preempts the steps even between their own cancellation checks
    let cancel = ctx.shutdown.child_token();
    let deadline = ctx.settings.reconcile_timeout;
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!("Reconcile of {} {} cancelled by shutdown", kind, key);
            Err(ReconcileError::Cancelled)
        }
        outcome = reconciler.ensure(ctx, &mut resource, &cancel) => outcome,
        () = tokio::time::sleep(deadline) => {
            cancel.cancel();
            warn!("Reconcile of {} {} exceeded its {:?} deadline", kind, key, deadline);
            Err(ReconcileError::Cancelled)
        }
    };
    if matches!(outcome, Err(ReconcileError::Cancelled)) {
        return Err(ReconcileError::Cancelled);
    }

    let overall = match &outcome {
        Ok(()) => resource
            .tracked_status_mut()
            .conditions()
            .overall_status(reconciler.required_stages()),
        Err(e) => e.overall_status(),
    };
    resource.tracked_status_mut().set_overall(overall);

    if outcome.is_ok() && need_to_add(&resource, finalizer) {
        add_finalizer(&ctx.store, &resource, finalizer).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let status = resource.tracked_status().cloned().unwrap_or_default();
    if status == original {
        debug!("Status of {} {} unchanged", kind, key);
    } else {
        let body = serde_json::to_value(&status)
            .map_err(|e| ReconcileError::from(serialization_error::<R::Resource>(&e)))?;
        if let Err(e) = ctx
            .store
            .patch_status::<R::Resource>(key, &body, resource.resource_version().as_deref())
            .await
        {
            if let StoreError::Conflict { .. } = e {
                warn!("Status of {} {} was written concurrently, retrying", kind, key);
            } else {
                error!("Failed to persist status of {} {}: {}", kind, key, e);
            }
            return Err(e.into());
        }
    }

    match outcome {
        Ok(()) => {
            info!("Reconciled {} {} ({})", kind, key, overall);
            Ok(Action::requeue(ctx.settings.resync_interval))
        }
        Err(e) => {
            let delay = e.requeue_after(ctx.settings.retry_interval, ctx.settings.resync_interval);
            warn!(
                reason = e.reason(),
                retryable = e.is_retryable(),
                "Reconcile of {} {} failed, requeue in {:?}: {}",
                kind,
                key,
                delay,
                e
            );
            metrics::record_error(&kind, e.reason());
            metrics::record_reconciliation_requeue(&kind, e.reason());
            Ok(Action::requeue(delay))
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod driver_tests;
