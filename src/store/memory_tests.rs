// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the in-memory store

#[cfg(test)]
mod tests {
    use crate::crd::{Ownership, ProjectClaim, ProjectClaimSpec};
    use crate::errors::StoreError;
    use crate::store::memory::merge_patch;
    use crate::store::{MemoryStore, ObjectKey, ResourceStore};
    use kube::api::ObjectMeta;
    use kube::ResourceExt;
    use serde_json::json;

    fn claim(namespace: &str, name: &str) -> ProjectClaim {
        ProjectClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: ProjectClaimSpec {
                project_name: None,
                service_account_name: None,
                organization: Ownership {
                    group: "gcp.compute.kore.appvia.io".to_string(),
                    version: "v1alpha1".to_string(),
                    kind: "Organization".to_string(),
                    namespace: "kore-admin".to_string(),
                    name: "appvia".to_string(),
                },
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_version_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let created = store.create(&claim("team-a", "dev")).await.unwrap();

        assert!(created.resource_version().is_some());
        assert_eq!(created.metadata.generation, Some(1));
        assert!(created.metadata.creation_timestamp.is_some());

        let err = store.create(&claim("team-a", "dev")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("team-a", "missing");

        let err = store.get::<ProjectClaim>(&key).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.get_opt::<ProjectClaim>(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(&claim("team-a", "dev")).await.unwrap();

        let mut first = created.clone();
        first.spec.service_account_name = Some("ci".to_string());
        let updated = store.update(&first).await.unwrap();
        assert_ne!(updated.resource_version(), created.resource_version());
        assert_eq!(updated.metadata.generation, Some(2));

        let mut stale = created;
        stale.spec.service_account_name = Some("other".to_string());
        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_status_only_changes_through_patch_status() {
        let store = MemoryStore::new();
        let created = store.create(&claim("team-a", "dev")).await.unwrap();
        let key = ObjectKey::of(&created);

        let patched: ProjectClaim = store
            .patch_status(
                &key,
                &json!({"status": "Success", "projectID": "dev"}),
                created.resource_version().as_deref(),
            )
            .await
            .unwrap();
        assert_eq!(
            patched.status.as_ref().and_then(|s| s.project_id.as_deref()),
            Some("dev")
        );

        // A spec update carrying a different status does not touch the stored status
        let mut replacement = patched.clone();
        replacement.status = None;
        let updated = store.update(&replacement).await.unwrap();
        assert_eq!(
            updated.status.as_ref().and_then(|s| s.project_id.as_deref()),
            Some("dev")
        );
    }

    #[tokio::test]
    async fn test_patch_status_with_stale_base_version_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(&claim("team-a", "dev")).await.unwrap();
        let key = ObjectKey::of(&created);

        store
            .patch::<ProjectClaim>(&key, &json!({"spec": {"serviceAccountName": "ci"}}))
            .await
            .unwrap();

        let err = store
            .patch_status::<ProjectClaim>(
                &key,
                &json!({"status": "Success"}),
                created.resource_version().as_deref(),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_without_finalizers_removes_immediately() {
        let store = MemoryStore::new();
        let created = store.create(&claim("team-a", "dev")).await.unwrap();
        let key = ObjectKey::of(&created);

        store.delete::<ProjectClaim>(&key).await.unwrap();
        assert!(!store.contains::<ProjectClaim>(&key).await);
    }

    #[tokio::test]
    async fn test_delete_with_finalizers_waits_for_release() {
        let store = MemoryStore::new();
        let mut fixture = claim("team-a", "dev");
        fixture.metadata.finalizers = Some(vec!["gcp-project-claims.kore.appvia.io".to_string()]);
        let created = store.create(&fixture).await.unwrap();
        let key = ObjectKey::of(&created);

        store.delete::<ProjectClaim>(&key).await.unwrap();
        let marked: ProjectClaim = store.get(&key).await.unwrap();
        assert!(marked.metadata.deletion_timestamp.is_some());

        store
            .patch::<ProjectClaim>(&key, &json!({"metadata": {"finalizers": []}}))
            .await
            .unwrap();
        assert!(!store.contains::<ProjectClaim>(&key).await);
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let store = MemoryStore::new();
        store.create(&claim("team-a", "dev")).await.unwrap();
        store.create(&claim("team-a", "prod")).await.unwrap();
        store.create(&claim("team-b", "dev")).await.unwrap();

        let team_a: Vec<ProjectClaim> = store.list(Some("team-a")).await.unwrap();
        let all: Vec<ProjectClaim> = store.list(None).await.unwrap();

        assert_eq!(team_a.len(), 2);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_merge_patch_follows_rfc7386() {
        let mut target = json!({"a": "b", "c": {"d": "e", "f": "g"}, "list": [1, 2]});
        merge_patch(
            &mut target,
            &json!({"a": "z", "c": {"f": null}, "list": [3]}),
        );

        assert_eq!(target, json!({"a": "z", "c": {"d": "e"}, "list": [3]}));
    }
}
