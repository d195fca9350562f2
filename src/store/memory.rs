// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process [`ResourceStore`].
//!
//! Objects are held as JSON, keyed by API version, kind, namespace and name. The
//! store mimics the API server where the reconcilers depend on it:
//!
//! - every write bumps a store-wide revision stamped into `metadata.resourceVersion`
//! - `update`, `patch` and `patch_status` reject stale resource versions
//! - status is only writable through `patch_status`
//! - deleting an object with finalizers only sets `metadata.deletionTimestamp`; the
//!   object is removed once a later write leaves its finalizer list empty
//!
//! Unlike the API server, a status supplied on `create` is kept so that fixtures
//! can seed observed state.

use super::{kind_of, serialization_error, ObjectKey, ResourceStore, StoredResource};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Slot = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Slot, Value>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// In-memory resource store, cheap to clone and shared between clones.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the object is physically present.
    pub async fn contains<K: StoredResource>(&self, key: &ObjectKey) -> bool {
        self.state.lock().await.objects.contains_key(&slot::<K>(key))
    }
}

fn type_key<K: StoredResource>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn slot<K: StoredResource>(key: &ObjectKey) -> Slot {
    (type_key::<K>(), key.namespace.clone(), key.name.clone())
}

fn not_found<K: StoredResource>(key: &ObjectKey) -> StoreError {
    StoreError::NotFound {
        kind: kind_of::<K>(),
        key: key.to_string(),
    }
}

fn conflict<K: StoredResource>(key: &ObjectKey) -> StoreError {
    StoreError::Conflict {
        kind: kind_of::<K>(),
        key: key.to_string(),
    }
}

fn decode<K: StoredResource>(value: &Value) -> Result<K, StoreError> {
    serde_json::from_value(value.clone()).map_err(|e| serialization_error::<K>(&e))
}

fn encode<K: StoredResource>(obj: &K) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(obj).map_err(|e| serialization_error::<K>(&e))?;
    if let Value::Object(map) = &mut value {
        map.insert("apiVersion".to_string(), Value::String(K::api_version(&()).to_string()));
        map.insert("kind".to_string(), Value::String(K::kind(&()).to_string()));
    }
    Ok(value)
}

fn resource_version(value: &Value) -> Option<&str> {
    value.pointer("/metadata/resourceVersion").and_then(Value::as_str)
}

fn set_metadata(value: &mut Value, field: &str, v: Value) {
    if let Some(obj) = value.as_object_mut() {
        let meta = obj
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert(field.to_string(), v);
        }
    }
}

fn remove_metadata(value: &mut Value, field: &str) {
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove(field);
    }
}

/// Carries the server-owned fields of `stored` over to `next`.
fn preserve_server_fields(stored: &Value, next: &mut Value) {
    for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
        match stored.pointer(&format!("/metadata/{field}")).cloned() {
            Some(v) => set_metadata(next, field, v),
            None => remove_metadata(next, field),
        }
    }
    if let Some(obj) = next.as_object_mut() {
        match stored.get("status") {
            Some(status) => {
                obj.insert("status".to_string(), status.clone());
            }
            None => {
                obj.remove("status");
            }
        }
    }
    let generation = stored
        .pointer("/metadata/generation")
        .and_then(Value::as_i64)
        .unwrap_or(1);
    let generation = if stored.get("spec") == next.get("spec") {
        generation
    } else {
        generation + 1
    };
    set_metadata(next, "generation", Value::from(generation));
}

fn is_releasable(value: &Value) -> bool {
    let deleting = value
        .pointer("/metadata/deletionTimestamp")
        .is_some_and(|v| !v.is_null());
    let holds_finalizers = value
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty());
    deleting && !holds_finalizers
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Applies an RFC 7386 JSON merge patch.
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl State {
    /// Stores `next` under `slot`, or releases it when deletion can complete.
    fn settle<K: StoredResource>(&mut self, slot: Slot, mut next: Value) -> Result<K, StoreError> {
        let version = self.next_revision();
        set_metadata(&mut next, "resourceVersion", Value::String(version));
        if is_releasable(&next) {
            self.objects.remove(&slot);
        } else {
            self.objects.insert(slot, next.clone());
        }
        decode(&next)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get<K: StoredResource>(&self, key: &ObjectKey) -> Result<K, StoreError> {
        let state = self.state.lock().await;
        let value = state.objects.get(&slot::<K>(key)).ok_or_else(|| not_found::<K>(key))?;
        decode(value)
    }

    async fn list<K: StoredResource>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let state = self.state.lock().await;
        let kind = type_key::<K>();
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && namespace.is_none_or(|n| n == ns.as_str()))
            .map(|(_, value)| decode(value))
            .collect()
    }

    async fn create<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let slot = slot::<K>(&key);
        let mut state = self.state.lock().await;
        if state.objects.contains_key(&slot) {
            return Err(StoreError::AlreadyExists {
                kind: kind_of::<K>(),
                key: key.to_string(),
            });
        }
        let mut value = encode(obj)?;
        let uid = format!("uid-{}", state.revision + 1);
        set_metadata(&mut value, "uid", Value::String(uid));
        set_metadata(&mut value, "creationTimestamp", Value::String(now()));
        set_metadata(&mut value, "generation", Value::from(1));
        remove_metadata(&mut value, "deletionTimestamp");
        state.settle(slot, value)
    }

    async fn update<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let slot = slot::<K>(&key);
        let mut state = self.state.lock().await;
        let stored = state.objects.get(&slot).ok_or_else(|| not_found::<K>(&key))?;
        let mut next = encode(obj)?;
        if let Some(version) = resource_version(&next) {
            if Some(version) != resource_version(stored) {
                return Err(conflict::<K>(&key));
            }
        }
        preserve_server_fields(stored, &mut next);
        state.settle(slot, next)
    }

    async fn patch<K: StoredResource>(
        &self,
        key: &ObjectKey,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let slot = slot::<K>(key);
        let mut state = self.state.lock().await;
        let stored = state.objects.get(&slot).ok_or_else(|| not_found::<K>(key))?;
        if let Some(version) = resource_version(patch) {
            if Some(version) != resource_version(stored) {
                return Err(conflict::<K>(key));
            }
        }
        let mut next = stored.clone();
        merge_patch(&mut next, patch);
        preserve_server_fields(stored, &mut next);
        state.settle(slot, next)
    }

    async fn patch_status<K: StoredResource>(
        &self,
        key: &ObjectKey,
        status: &Value,
        base_version: Option<&str>,
    ) -> Result<K, StoreError> {
        let slot = slot::<K>(key);
        let mut state = self.state.lock().await;
        let stored = state.objects.get(&slot).ok_or_else(|| not_found::<K>(key))?;
        if base_version.is_some() && base_version != resource_version(stored) {
            return Err(conflict::<K>(key));
        }
        let mut next = stored.clone();
        if let Some(obj) = next.as_object_mut() {
            let current = obj
                .entry("status")
                .or_insert_with(|| Value::Object(Map::new()));
            merge_patch(current, status);
        }
        state.settle(slot, next)
    }

    async fn delete<K: StoredResource>(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let slot = slot::<K>(key);
        let mut state = self.state.lock().await;
        let stored = state.objects.get(&slot).ok_or_else(|| not_found::<K>(key))?;
        let holds_finalizers = stored
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .is_some_and(|f| !f.is_empty());
        if !holds_finalizers {
            state.objects.remove(&slot);
            return Ok(());
        }
        if stored.pointer("/metadata/deletionTimestamp").is_some_and(|v| !v.is_null()) {
            return Ok(());
        }
        let mut next = stored.clone();
        set_metadata(&mut next, "deletionTimestamp", Value::String(now()));
        state.settle::<K>(slot, next).map(|_| ())
    }
}
