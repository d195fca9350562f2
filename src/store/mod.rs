// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed resource store used by every reconciler.
//!
//! The reconcilers never talk to the Kubernetes API directly. They go through
//! [`ResourceStore`], which offers get/list/create/update/patch/delete plus an
//! optimistic status patch. Two implementations exist:
//!
//! - [`KubeStore`] - backed by the Kubernetes API server
//! - [`MemoryStore`] - an in-process store with the same resource-version,
//!   finalizer and merge-patch semantics, used by the unit tests
//!
//! Change notification is not part of this trait: the controllers are driven by
//! `kube::runtime::Controller`, which owns the watch on each kind.

pub mod kubernetes;
pub mod memory;

pub use self::kubernetes::KubeStore;
pub use self::memory::MemoryStore;

use crate::errors::StoreError;
use async_trait::async_trait;
use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fmt::Debug;

/// Bounds shared by every type kept in a [`ResourceStore`].
pub trait StoredResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> StoredResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Namespaced key of a stored object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Key of an existing object.
    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl From<&crate::crd::Ownership> for ObjectKey {
    fn from(owner: &crate::crd::Ownership) -> Self {
        Self::new(&owner.namespace, &owner.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// CRUD access to typed, namespaced resources.
///
/// All writes are optimistic: `update` and a `patch_status` with a base version
/// fail with [`StoreError::Conflict`] when the stored resource version moved on.
/// Conflicts are never retried here; callers re-fetch on their next pass.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    /// Fetch an object.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the object does not exist.
    async fn get<K: StoredResource>(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// List objects in one namespace, or in every namespace with `None`.
    async fn list<K: StoredResource>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError>;

    /// Create an object; fails with [`StoreError::AlreadyExists`] on a duplicate key.
    async fn create<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object, guarded by its `metadata.resourceVersion` when set.
    async fn update<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError>;

    /// Apply a JSON merge patch to an object (status excluded).
    async fn patch<K: StoredResource>(
        &self,
        key: &ObjectKey,
        patch: &Value,
    ) -> Result<K, StoreError>;

    /// Merge `status` into the status subresource.
    ///
    /// With `base_version` set, the write is rejected with [`StoreError::Conflict`]
    /// unless the stored object is still at that version.
    async fn patch_status<K: StoredResource>(
        &self,
        key: &ObjectKey,
        status: &Value,
        base_version: Option<&str>,
    ) -> Result<K, StoreError>;

    /// Request deletion. Objects holding finalizers are only marked for deletion.
    async fn delete<K: StoredResource>(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Fetch an object, mapping [`StoreError::NotFound`] to `None`.
    async fn get_opt<K: StoredResource>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        match self.get::<K>(key).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Kind name used in errors and logs.
pub(crate) fn kind_of<K: StoredResource>() -> String {
    K::kind(&()).to_string()
}

/// Build a serialization error for `K`.
pub(crate) fn serialization_error<K: StoredResource>(err: &serde_json::Error) -> StoreError {
    StoreError::Serialization {
        kind: kind_of::<K>(),
        message: err.to_string(),
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
