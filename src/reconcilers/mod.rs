// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation controllers for kore resources.
//!
//! Each kind is a [`Reconciler`]: a finalizer, a set of required stages, ordered
//! ensure steps and a deletion cleanup. The generic [`reconcile`] driver runs a
//! pass for any of them against any [`crate::store::ResourceStore`].
//!
//! # Reconciliation Architecture
//!
//! 1. **Watch** - `kube::runtime::Controller` triggers a pass per changed object
//! 2. **Ensure** - run the kind's steps in order, stopping at the first failure
//! 3. **Status** - record one condition per stage and patch the status once
//! 4. **Requeue** - resync on success, retry soon on transient failures
//!
//! # Available Reconcilers
//!
//! - [`OrganizationReconciler`] - validates the organization's service account key
//! - [`ProjectClaimReconciler`] - provisions a GCP project for a team
//! - [`ManagedClusterRoleReconciler`] - propagates a `ClusterRole` to downstream clusters
//!
//! # Example
//!
//! ```rust,no_run
//! use kore::context::Context;
//! use kore::reconcilers::{reconcile, ProjectClaimReconciler};
//! use kore::store::ObjectKey;
//!
//! async fn once(ctx: &Context) -> anyhow::Result<()> {
//!     let key = ObjectKey::new("team-a", "dev");
//!     let action = reconcile(&ProjectClaimReconciler, ctx, &key).await?;
//!     println!("next pass: {action:?}");
//!     Ok(())
//! }
//! ```

pub mod clusterroles;
pub mod driver;
pub mod finalizers;
pub mod organization;
pub mod projectclaim;
pub mod retry;
pub mod status;

#[cfg(test)]
pub(crate) mod test_support;

pub use clusterroles::ManagedClusterRoleReconciler;
pub use driver::{reconcile, Reconciler};
pub use organization::OrganizationReconciler;
pub use projectclaim::ProjectClaimReconciler;
