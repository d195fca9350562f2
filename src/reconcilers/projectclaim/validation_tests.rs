// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use super::super::{ensure_permitted, ensure_unique};
    use crate::crd::{Allocation, AllocationSpec, ProjectClaimStatus};
    use crate::errors::ReconcileError;
    use crate::reconcilers::test_support::{claim, organization_ref, timestamp};
    use crate::store::{MemoryStore, ResourceStore};

    fn created_at(mut claim: crate::crd::ProjectClaim, secs: i64) -> crate::crd::ProjectClaim {
        claim.metadata.creation_timestamp = Some(timestamp(secs));
        claim
    }

    fn allocation(teams: &[&str]) -> Allocation {
        let mut allocation = Allocation::new(
            "share-appvia",
            AllocationSpec {
                name: "appvia".to_string(),
                summary: "Shared GCP organization".to_string(),
                resource: organization_ref("kore-admin", "appvia"),
                teams: teams.iter().map(ToString::to_string).collect(),
            },
        );
        allocation.metadata.namespace = Some("kore-admin".to_string());
        allocation
    }

    #[tokio::test]
    async fn test_same_namespace_is_permitted() {
        let store = MemoryStore::new();
        let result =
            ensure_permitted(&store, "kore-admin", &organization_ref("kore-admin", "appvia")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_allocation_grants_team() {
        let store = MemoryStore::new();
        store.create(&allocation(&["team-a"])).await.unwrap();

        let org = organization_ref("kore-admin", "appvia");
        assert!(ensure_permitted(&store, "team-a", &org).await.is_ok());
        assert!(matches!(
            ensure_permitted(&store, "team-b", &org).await,
            Err(ReconcileError::NotPermitted { .. })
        ));
    }

    #[tokio::test]
    async fn test_wildcard_allocation_grants_every_team() {
        let store = MemoryStore::new();
        store.create(&allocation(&["*"])).await.unwrap();

        let result =
            ensure_permitted(&store, "team-z", &organization_ref("kore-admin", "appvia")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_allocation_of_other_resource_is_ignored() {
        let store = MemoryStore::new();
        store.create(&allocation(&["team-a"])).await.unwrap();

        let result =
            ensure_permitted(&store, "team-a", &organization_ref("kore-admin", "other")).await;
        assert!(matches!(result, Err(ReconcileError::NotPermitted { .. })));
    }

    #[test]
    fn test_older_claim_holds_the_name() {
        let first = created_at(claim("team-a", "shared"), 100);
        let second = created_at(claim("team-b", "shared"), 200);
        let all = vec![first.clone(), second.clone()];

        assert!(ensure_unique(&first, false, &all).is_ok());
        match ensure_unique(&second, false, &all) {
            Err(ReconcileError::AlreadyClaimed { name, team }) => {
                assert_eq!(name, "shared");
                assert_eq!(team, "team-a");
            }
            other => panic!("expected AlreadyClaimed, got {other:?}"),
        }
    }

    #[test]
    fn test_assigned_claim_holds_the_name_regardless_of_age() {
        let older = created_at(claim("team-a", "shared"), 100);
        let mut holder = created_at(claim("team-b", "shared"), 200);
        holder.status = Some(ProjectClaimStatus {
            project_id: Some("shared".to_string()),
            ..Default::default()
        });
        let all = vec![older.clone(), holder.clone()];

        assert!(ensure_unique(&holder, true, &all).is_ok());
        assert!(matches!(
            ensure_unique(&older, false, &all),
            Err(ReconcileError::AlreadyClaimed { .. })
        ));
    }

    #[test]
    fn test_same_namespace_and_other_names_do_not_conflict() {
        let mine = created_at(claim("team-a", "alpha"), 200);
        let sibling = created_at(claim("team-a", "alpha-copy"), 100);
        let other_name = created_at(claim("team-b", "beta"), 100);

        assert!(ensure_unique(&mine, false, &[sibling, other_name]).is_ok());
    }

    #[test]
    fn test_deleting_claim_releases_the_name() {
        let mine = created_at(claim("team-b", "shared"), 200);
        let mut leaving = created_at(claim("team-a", "shared"), 100);
        leaving.metadata.deletion_timestamp = Some(timestamp(1_700_000_000));

        assert!(ensure_unique(&mine, false, &[leaving]).is_ok());
    }

    #[test]
    fn test_tie_broken_by_namespace() {
        let a = created_at(claim("team-a", "shared"), 100);
        let b = created_at(claim("team-b", "shared"), 100);
        let all = vec![a.clone(), b.clone()];

        assert!(ensure_unique(&a, false, &all).is_ok());
        assert!(ensure_unique(&b, false, &all).is_err());
    }
}
