// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use kore::{
    cluster_client::KubeClusterClientFactory,
    config::ControllerConfig,
    constants::TOKIO_WORKER_THREADS,
    context::Context,
    errors::ReconcileError,
    gcp::RestClientFactory,
    metrics,
    reconcilers::{
        reconcile, ManagedClusterRoleReconciler, OrganizationReconciler, ProjectClaimReconciler,
        Reconciler,
    },
    server::{self, ServerState},
    store::{KubeStore, ObjectKey},
};
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, Resource,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What every pass of one controller shares.
struct Shared<R> {
    reconciler: R,
    ctx: Context,
}

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("kore-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT (text or json)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    // rustls 0.23 needs a process-wide provider before the first TLS client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    let config = ControllerConfig::parse();
    info!("Starting kore controllers");
    debug!(?config, "Loaded configuration");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let shutdown = CancellationToken::new();
    let ctx = Context::new(
        KubeStore::new(client.clone()),
        Arc::new(RestClientFactory::new(config.gcp_endpoints())?),
        Arc::new(KubeClusterClientFactory),
        config.settings(),
        shutdown.clone(),
    );

    let state = Arc::new(ServerState::default());
    let mut tasks = JoinSet::new();
    tasks.spawn(run_controller::<OrganizationReconciler>(client.clone(), ctx.clone()));
    tasks.spawn(run_controller::<ProjectClaimReconciler>(client.clone(), ctx.clone()));
    tasks.spawn(run_controller::<ManagedClusterRoleReconciler>(client, ctx));
    {
        let address = config.metrics_address();
        let state = Arc::clone(&state);
        let shutdown = shutdown.clone();
        tasks.spawn(async move { server::serve(&address, state, shutdown).await });
    }
    state.set_ready(true);

    // Controllers never exit on their own; either a signal or a crash ends the process
    let mut crashed = false;
    tokio::select! {
        result = shutdown_signal() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signals: {}", e);
            }
            info!("Shutdown signal received, stopping controllers");
        }
        Some(result) = tasks.join_next() => {
            error!("CRITICAL: a controller task exited unexpectedly: {:?}", result);
            crashed = true;
        }
    }

    state.set_ready(false);
    shutdown.cancel();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Task stopped with an error: {:#}", e),
            Err(e) => error!("Task panicked or was aborted: {}", e),
        }
    }

    if crashed {
        anyhow::bail!("a controller exited unexpectedly");
    }
    info!("All controllers stopped");
    Ok(())
}

/// Resolves on CTRL-C, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Run the controller of one kind until the shutdown token fires.
async fn run_controller<R>(client: Client, ctx: Context) -> Result<()>
where
    R: Reconciler + Default,
{
    let kind = <R::Resource as Resource>::kind(&()).to_string();
    info!("Starting {} controller", kind);

    let shutdown = ctx.shutdown.clone();
    let api = Api::<R::Resource>::all(client);
    let shared = Arc::new(Shared {
        reconciler: R::default(),
        ctx,
    });

    Controller::new(api, Config::default())
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile_wrapper::<R>, error_policy::<R>, shared)
        .for_each(|result| {
            if let Err(e) = result {
                debug!("Controller event error: {}", e);
            }
            futures::future::ready(())
        })
        .await;

    info!("{} controller stopped", kind);
    Ok(())
}

async fn reconcile_wrapper<R: Reconciler>(
    resource: Arc<R::Resource>,
    shared: Arc<Shared<R>>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let kind = <R::Resource as Resource>::kind(&()).to_string();
    let key = ObjectKey::of(resource.as_ref());

    match reconcile(&shared.reconciler, &shared.ctx, &key).await {
        Ok(action) => {
            metrics::record_reconciliation_success(&kind, start.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!(reason = e.reason(), "Failed to reconcile {} {}: {}", kind, key, e);
            metrics::record_reconciliation_error(&kind, start.elapsed());
            Err(e)
        }
    }
}

fn error_policy<R: Reconciler>(
    resource: Arc<R::Resource>,
    err: &ReconcileError,
    shared: Arc<Shared<R>>,
) -> Action {
    let delay = shared.ctx.settings.error_requeue;
    warn!(
        "Requeueing {} {} in {:?} after error: {}",
        <R::Resource as Resource>::kind(&()),
        ObjectKey::of(resource.as_ref()),
        delay,
        err
    );
    Action::requeue(delay)
}
