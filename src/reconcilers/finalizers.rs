// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for kore resources.
//!
//! A finalizer token blocks physical deletion of a resource until the owning
//! reconciler has cleaned up whatever external state the resource produced.
//!
//! - [`is_deletion_candidate`] - the resource carries a deletion timestamp
//! - [`need_to_add`] - the token is absent and the resource is not being deleted
//! - [`add_finalizer`] / [`remove_finalizer`] - persist the token list
//!
//! Both writes are merge patches guarded by the resource version the caller read.
//! A conflict is returned as-is and retried by the next reconcile pass. Once a
//! resource is being deleted and its finalizer list becomes empty, the store
//! removes it.
//!
//! # Example
//!
//! ```rust,ignore
//! use kore::reconcilers::finalizers::{add_finalizer, is_deletion_candidate, need_to_add};
//!
//! if need_to_add(&claim, FINALIZER_PROJECT_CLAIM) {
//!     add_finalizer(&store, &claim, FINALIZER_PROJECT_CLAIM).await?;
//!     // requeue: the resource version has moved on
//! }
//! ```

use crate::errors::StoreError;
use crate::store::{ObjectKey, ResourceStore, StoredResource};
use kube::ResourceExt;
use serde_json::json;
use tracing::info;

/// Returns true when the resource has been marked for deletion.
pub fn is_deletion_candidate<K: ResourceExt>(resource: &K) -> bool {
    resource.meta().deletion_timestamp.is_some()
}

/// Returns true when the resource holds `finalizer`.
pub fn has_finalizer<K: ResourceExt>(resource: &K, finalizer: &str) -> bool {
    resource.finalizers().iter().any(|f| f == finalizer)
}

/// Returns true when `finalizer` should be added to the resource.
pub fn need_to_add<K: ResourceExt>(resource: &K, finalizer: &str) -> bool {
    !has_finalizer(resource, finalizer) && !is_deletion_candidate(resource)
}

/// Adds `finalizer` to the resource.
///
/// The caller must requeue afterwards: the write changes the resource version,
/// so anything derived from `resource` is stale.
///
/// # Errors
///
/// [`StoreError::Conflict`] when the resource changed since it was read.
pub async fn add_finalizer<S, K>(store: &S, resource: &K, finalizer: &str) -> Result<K, StoreError>
where
    S: ResourceStore,
    K: StoredResource,
{
    let key = ObjectKey::of(resource);
    info!("Adding finalizer {} to {} {}", finalizer, K::kind(&()), key);

    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    write_finalizers(store, resource, &key, finalizers).await
}

/// Removes `finalizer` from the resource.
///
/// When the resource is being deleted and no other finalizer remains, the store
/// completes the deletion.
///
/// # Errors
///
/// [`StoreError::Conflict`] when the resource changed since it was read.
pub async fn remove_finalizer<S, K>(
    store: &S,
    resource: &K,
    finalizer: &str,
) -> Result<Option<K>, StoreError>
where
    S: ResourceStore,
    K: StoredResource,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(None);
    }
    let key = ObjectKey::of(resource);
    info!("Removing finalizer {} from {} {}", finalizer, K::kind(&()), key);

    let finalizers: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();
    write_finalizers(store, resource, &key, finalizers).await.map(Some)
}

async fn write_finalizers<S, K>(
    store: &S,
    resource: &K,
    key: &ObjectKey,
    finalizers: Vec<String>,
) -> Result<K, StoreError>
where
    S: ResourceStore,
    K: StoredResource,
{
    let patch = match resource.resource_version() {
        Some(version) => json!({
            "metadata": { "finalizers": finalizers, "resourceVersion": version }
        }),
        None => json!({ "metadata": { "finalizers": finalizers } }),
    };
    store.patch::<K>(key, &patch).await
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
