// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the generic reconcile driver, using a scripted reconciler.

#[cfg(test)]
mod tests {
    use super::super::{reconcile, Reconciler};
    use crate::constants::STAGE_CREDENTIALS;
    use crate::context::Context;
    use crate::crd::{Organization, Status};
    use crate::errors::ReconcileError;
    use crate::reconcilers::status::{Tracked, TrackedStatus};
    use crate::reconcilers::test_support::{
        context, organization, MockClusters, MockGcp, ADMIN_NAMESPACE, ORGANIZATION_NAME,
    };
    use crate::store::{MemoryStore, ObjectKey, ResourceStore};
    use async_trait::async_trait;
    use kube::runtime::controller::Action;
    use kube::ResourceExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const FINALIZER: &str = "scripted.kore.appvia.io";

    #[derive(Clone, Copy, Debug)]
    enum Script {
        Succeed,
        NotReady,
        Partial,
        Hang,
        WaitForCancel,
    }

    struct Scripted {
        script: Mutex<Script>,
        ensures: AtomicUsize,
        cleanups: AtomicUsize,
        fail_cleanup: bool,
    }

    impl Scripted {
        fn new(script: Script) -> Self {
            Self {
                script: Mutex::new(script),
                ensures: AtomicUsize::new(0),
                cleanups: AtomicUsize::new(0),
                fail_cleanup: false,
            }
        }

        fn set(&self, script: Script) {
            *self.script.lock().unwrap() = script;
        }
    }

    #[async_trait]
    impl Reconciler for Scripted {
        type Resource = Organization;

        fn finalizer(&self) -> &'static str {
            FINALIZER
        }

        fn required_stages(&self) -> &'static [&'static str] {
            &[STAGE_CREDENTIALS]
        }

        async fn ensure<S: ResourceStore>(
            &self,
            _ctx: &Context<S>,
            resource: &mut Organization,
            cancel: &CancellationToken,
        ) -> Result<(), ReconcileError> {
            self.ensures.fetch_add(1, Ordering::SeqCst);
            let script = *self.script.lock().unwrap();
            let conditions = resource.tracked_status_mut().conditions_mut();
            match script {
                Script::Succeed => {
                    conditions.set_success(STAGE_CREDENTIALS, "ok");
                    Ok(())
                }
                Script::NotReady => {
                    let err = ReconcileError::DependencyNotReady {
                        dependency: "secret kore-admin/appvia-gcp-key".to_string(),
                        message: "not found".to_string(),
                    };
                    conditions.set_failure(STAGE_CREDENTIALS, "not ready", &err);
                    Err(err)
                }
                Script::Partial => {
                    let err = ReconcileError::PartialFailure { failed: 1, total: 3 };
                    conditions.set_failure(STAGE_CREDENTIALS, "partial", &err);
                    Err(err)
                }
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
                Script::WaitForCancel => {
                    cancel.cancelled().await;
                    Err(ReconcileError::Cancelled)
                }
            }
        }

        async fn cleanup<S: ResourceStore>(
            &self,
            _ctx: &Context<S>,
            _resource: &Organization,
        ) -> Result<(), ReconcileError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.fail_cleanup {
                return Err(ReconcileError::PartialFailure { failed: 1, total: 1 });
            }
            Ok(())
        }
    }

    fn key() -> ObjectKey {
        ObjectKey::new(ADMIN_NAMESPACE, ORGANIZATION_NAME)
    }

    async fn setup() -> Context<MemoryStore> {
        let store = MemoryStore::new();
        store.create(&organization(None)).await.unwrap();
        context(store, &MockGcp::new(), &MockClusters::new())
    }

    async fn stored(ctx: &Context<MemoryStore>) -> Organization {
        ctx.store.get(&key()).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_object_waits_for_change() {
        let ctx = context(MemoryStore::new(), &MockGcp::new(), &MockClusters::new());
        let reconciler = Scripted::new(Script::Succeed);

        let action = reconcile(&reconciler, &ctx, &key()).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(reconciler.ensures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_success_attaches_finalizer_before_status() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::Succeed);

        let action = reconcile(&reconciler, &ctx, &key()).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::ZERO));
        let org = stored(&ctx).await;
        assert!(org.finalizers().contains(&FINALIZER.to_string()));
        assert!(org.status.is_none());

        let action = reconcile(&reconciler, &ctx, &key()).await.unwrap();
        assert_eq!(action, Action::requeue(ctx.settings.resync_interval));
        assert_eq!(stored(&ctx).await.status.unwrap().status, Status::Success);
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_rewritten() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::Succeed);
        reconcile(&reconciler, &ctx, &key()).await.unwrap();
        reconcile(&reconciler, &ctx, &key()).await.unwrap();
        let version = stored(&ctx).await.resource_version();

        reconcile(&reconciler, &ctx, &key()).await.unwrap();

        assert_eq!(stored(&ctx).await.resource_version(), version);
        assert_eq!(reconciler.ensures.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_recorded_and_requeued_soon() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::NotReady);

        let action = reconcile(&reconciler, &ctx, &key()).await.unwrap();

        assert_eq!(action, Action::requeue(ctx.settings.retry_interval));
        let org = stored(&ctx).await;
        assert!(org.finalizers().is_empty());
        let status = org.status.unwrap();
        assert_eq!(status.status, Status::Failure);
        assert!(status.conditions.get(STAGE_CREDENTIALS).unwrap().retryable);
    }

    #[tokio::test]
    async fn test_partial_failure_is_a_warning() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::Partial);

        let action = reconcile(&reconciler, &ctx, &key()).await.unwrap();

        assert_eq!(action, Action::requeue(ctx.settings.retry_interval));
        let status = stored(&ctx).await.status.unwrap();
        assert_eq!(status.status, Status::Warning);
        assert_eq!(
            status.conditions.get(STAGE_CREDENTIALS).unwrap().detail.as_deref(),
            Some("1 of 3 failed")
        );
    }

    #[tokio::test]
    async fn test_recovery_replaces_failure() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::NotReady);
        reconcile(&reconciler, &ctx, &key()).await.unwrap();

        reconciler.set(Script::Succeed);
        reconcile(&reconciler, &ctx, &key()).await.unwrap();
        reconcile(&reconciler, &ctx, &key()).await.unwrap();

        let status = stored(&ctx).await.status.unwrap();
        assert_eq!(status.status, Status::Success);
        assert_eq!(status.conditions.0.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_pass_without_writing() {
        let mut ctx = setup().await;
        ctx.settings.reconcile_timeout = Duration::from_secs(5);
        let reconciler = Scripted::new(Script::Hang);

        let result = reconcile(&reconciler, &ctx, &key()).await;

        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        let org = stored(&ctx).await;
        assert!(org.status.is_none());
        assert!(org.finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_reaches_running_pass() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::WaitForCancel);
        ctx.shutdown.cancel();

        let result = reconcile(&reconciler, &ctx, &key()).await;

        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        assert!(stored(&ctx).await.status.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_preempts_pass_ignoring_token() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::Hang);
        ctx.shutdown.cancel();
        let started = tokio::time::Instant::now();

        let result = reconcile(&reconciler, &ctx, &key()).await;

        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(stored(&ctx).await.status.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_pass_stops_it_promptly() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::Hang);
        let shutdown = ctx.shutdown.clone();
        let started = tokio::time::Instant::now();
        let key = key();

        let (result, ()) = tokio::join!(reconcile(&reconciler, &ctx, &key), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            shutdown.cancel();
        });

        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        assert!(started.elapsed() < ctx.settings.reconcile_timeout);
        assert_eq!(reconciler.ensures.load(Ordering::SeqCst), 1);
        let org = stored(&ctx).await;
        assert!(org.status.is_none());
        assert!(org.finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_deletion_runs_cleanup_then_releases() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::Succeed);
        reconcile(&reconciler, &ctx, &key()).await.unwrap();
        ctx.store.delete::<Organization>(&key()).await.unwrap();

        let action = reconcile(&reconciler, &ctx, &key()).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(reconciler.cleanups.load(Ordering::SeqCst), 1);
        assert!(!ctx.store.contains::<Organization>(&key()).await);
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_finalizer() {
        let ctx = setup().await;
        let mut reconciler = Scripted::new(Script::Succeed);
        reconciler.fail_cleanup = true;
        reconcile(&reconciler, &ctx, &key()).await.unwrap();
        ctx.store.delete::<Organization>(&key()).await.unwrap();

        let result = reconcile(&reconciler, &ctx, &key()).await;

        assert!(matches!(result, Err(ReconcileError::PartialFailure { .. })));
        let org = stored(&ctx).await;
        assert!(org.metadata.deletion_timestamp.is_some());
        assert!(org.finalizers().contains(&FINALIZER.to_string()));
    }

    #[tokio::test]
    async fn test_deletion_without_our_finalizer_is_ignored() {
        let ctx = setup().await;
        let reconciler = Scripted::new(Script::Succeed);
        ctx.store
            .patch::<Organization>(
                &key(),
                &serde_json::json!({ "metadata": { "finalizers": ["someone-else.example.com"] } }),
            )
            .await
            .unwrap();
        ctx.store.delete::<Organization>(&key()).await.unwrap();

        let action = reconcile(&reconciler, &ctx, &key()).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(reconciler.cleanups.load(Ordering::SeqCst), 0);
        assert!(ctx.store.contains::<Organization>(&key()).await);
    }
}
