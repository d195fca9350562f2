// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Polling of long-running cloud operations.
//!
//! Polls run at a fixed interval up to a fixed ceiling. A failed poll is logged
//! and counted as "not done yet"; only an error reported by the operation itself
//! is fatal. Every wait selects on the pass's cancellation token so a cancelled
//! reconcile stops polling immediately.

use super::Operation;
use crate::errors::{ProviderError, ReconcileError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Interval and ceiling of an operation poll loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

fn finished(operation: &Operation, description: &str) -> Result<(), ReconcileError> {
    match &operation.error {
        Some(status) => Err(ProviderError::Operation {
            operation: description.to_string(),
            code: status.code,
            message: status.message.clone(),
        }
        .into()),
        None => Ok(()),
    }
}

/// Waits for `initial` to finish, re-fetching it with `poll`.
///
/// # Errors
///
/// - [`ProviderError::Operation`] when the operation finished with an error
/// - [`ReconcileError::OperationTimeout`] when the ceiling elapsed first
/// - [`ReconcileError::Cancelled`] when `cancel` fired
pub async fn wait_until_complete<F, Fut>(
    cancel: &CancellationToken,
    policy: PollPolicy,
    description: &str,
    initial: Operation,
    mut poll: F,
) -> Result<(), ReconcileError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Operation, ProviderError>>,
{
    if initial.done {
        return finished(&initial, description);
    }

    let deadline = Instant::now() + policy.timeout;
    let name = initial.name;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(operation = description, "Stopped waiting, reconcile cancelled");
                return Err(ReconcileError::Cancelled);
            }
            () = tokio::time::sleep(policy.interval) => {}
        }

        match poll(name.clone()).await {
            Ok(operation) if operation.done => return finished(&operation, description),
            Ok(_) => debug!(operation = description, name = %name, "Operation still running"),
            Err(e) => warn!(
                operation = description,
                name = %name,
                error = %e,
                "Failed to check operation status, will retry"
            ),
        }

        if Instant::now() >= deadline {
            return Err(ReconcileError::OperationTimeout {
                operation: description.to_string(),
                timeout: policy.timeout,
            });
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod operation_tests;
