// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`ResourceStore`] backed by the Kubernetes API server.

use super::{kind_of, ObjectKey, ResourceStore, StoredResource};
use crate::errors::StoreError;
use crate::reconcilers::retry::retry_transient;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use tracing::debug;

/// Resource store talking to the Kubernetes API.
///
/// Reads are retried with backoff on transient failures. Writes are issued once;
/// a conflict surfaces as [`StoreError::Conflict`] and is handled by requeueing.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoredResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_err<K: StoredResource>(key: &ObjectKey) -> impl Fn(kube::Error) -> StoreError + '_ {
    move |e| StoreError::from_kube(&e, &kind_of::<K>(), &key.to_string())
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get<K: StoredResource>(&self, key: &ObjectKey) -> Result<K, StoreError> {
        let api = &self.api::<K>(&key.namespace);
        let description = format!("get {} {key}", kind_of::<K>());
        retry_transient(&description, StoreError::is_transient, move || async move {
            api.get(&key.name).await.map_err(map_err::<K>(key))
        })
        .await
    }

    async fn list<K: StoredResource>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let api: &Api<K> = &match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let scope = namespace.unwrap_or("*");
        let description = format!("list {} in {scope}", kind_of::<K>());
        let list = retry_transient(&description, StoreError::is_transient, move || async move {
            api.list(&ListParams::default())
                .await
                .map_err(|e| StoreError::from_kube(&e, &kind_of::<K>(), scope))
        })
        .await?;
        Ok(list.items)
    }

    async fn create<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        debug!(kind = %kind_of::<K>(), %key, "Creating object");
        self.api::<K>(&key.namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(map_err::<K>(&key))
    }

    async fn update<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        debug!(kind = %kind_of::<K>(), %key, "Replacing object");
        self.api::<K>(&key.namespace)
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await
            .map_err(map_err::<K>(&key))
    }

    async fn patch<K: StoredResource>(
        &self,
        key: &ObjectKey,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.api::<K>(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(map_err::<K>(key))
    }

    async fn patch_status<K: StoredResource>(
        &self,
        key: &ObjectKey,
        status: &Value,
        base_version: Option<&str>,
    ) -> Result<K, StoreError> {
        // The API server rejects a merge patch carrying a stale resourceVersion
        let body = match base_version {
            Some(version) => json!({
                "metadata": { "resourceVersion": version },
                "status": status,
            }),
            None => json!({ "status": status }),
        };
        self.api::<K>(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map_err(map_err::<K>(key))
    }

    async fn delete<K: StoredResource>(&self, key: &ObjectKey) -> Result<(), StoreError> {
        debug!(kind = %kind_of::<K>(), %key, "Deleting object");
        self.api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(map_err::<K>(key))
    }
}
