// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stage condition tracking for kore resources.
//!
//! Every provisioning stage records its outcome as a named [`Component`] in the
//! resource's status. Recording is an upsert keyed by stage name: a re-run of a
//! stage overwrites its previous outcome instead of appending. The overall status
//! is derived from the recorded stages.
//!
//! Nothing here talks to the API server; the reconcile driver persists the
//! accumulated status with a single status patch at the end of a pass.
//!
//! # Example
//!
//! ```rust
//! use kore::crd::{Components, Status};
//!
//! let mut components = Components::default();
//! components.set_success("provision", "GCP Project has been provisioned");
//! components.set_condition(
//!     "billing",
//!     Status::Failure,
//!     "Failed to link the billing account",
//!     Some("HTTP 403".to_string()),
//! );
//!
//! assert_eq!(components.overall_status(&["provision", "billing"]), Status::Failure);
//! ```

use crate::crd::{
    Component, Components, ManagedClusterRole, ManagedClusterRoleStatus, Organization,
    OrganizationStatus, ProjectClaim, ProjectClaimStatus, Status,
};
use crate::errors::ReconcileError;
use crate::metrics;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, error};

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Components {
    /// Upserts the outcome of a stage.
    ///
    /// The transition time is only refreshed when the stage status changes, so
    /// re-recording an identical outcome leaves the component untouched.
    pub fn set_condition(
        &mut self,
        name: &str,
        status: Status,
        message: &str,
        detail: Option<String>,
    ) {
        self.record(name, status, message, detail, false);
    }

    /// Records a successful stage.
    pub fn set_success(&mut self, name: &str, message: &str) {
        self.record(name, Status::Success, message, None, false);
    }

    /// Records a failed stage, keeping the error text as the detail.
    pub fn set_failure(&mut self, name: &str, message: &str, err: &ReconcileError) {
        self.record(
            name,
            err.overall_status(),
            message,
            Some(err.to_string()),
            err.is_retryable(),
        );
    }

    fn record(
        &mut self,
        name: &str,
        status: Status,
        message: &str,
        detail: Option<String>,
        retryable: bool,
    ) {
        let last_transition_time = match self.get(name) {
            Some(existing) if existing.status == status => existing.last_transition_time.clone(),
            _ => Some(now()),
        };
        let component = Component {
            name: name.to_string(),
            status,
            message: message.to_string(),
            detail,
            retryable,
            last_transition_time,
        };
        match self.0.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = component,
            None => self.0.push(component),
        }
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Component> {
        self.0.iter().find(|c| c.name == name)
    }

    /// Removes a stage, returning true when it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c.name != name);
        self.0.len() != before
    }

    /// Removes every stage that comes after `stage` in `order`.
    ///
    /// Stages missing from `order` are kept, as is everything when `stage`
    /// itself is not listed.
    pub fn clear_after(&mut self, stage: &str, order: &[&str]) {
        let Some(position) = order.iter().position(|s| *s == stage) else {
            return;
        };
        let later = &order[position + 1..];
        self.0.retain(|c| !later.contains(&c.name.as_str()));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.0.iter()
    }

    /// Derives the overall status from the recorded stages.
    ///
    /// - any `Failure` stage: `Failure`
    /// - no stages yet: `Pending`
    /// - any `Warning` stage: `Warning`
    /// - every stage in `required` recorded as `Success`: `Success`
    /// - otherwise: `Pending`
    #[must_use]
    pub fn overall_status(&self, required: &[&str]) -> Status {
        if self.0.iter().any(|c| c.status == Status::Failure) {
            return Status::Failure;
        }
        if self.0.is_empty() {
            return Status::Pending;
        }
        if self.0.iter().any(|c| c.status == Status::Warning) {
            return Status::Warning;
        }
        let complete = required
            .iter()
            .all(|stage| self.get(stage).is_some_and(|c| c.status == Status::Success));
        if complete {
            Status::Success
        } else {
            Status::Pending
        }
    }
}

/// Records the outcome of a stage and passes the result through.
///
/// A `success` message of `None` leaves the stage untouched on success; checks
/// that share a stage with a later step only ever report their failures.
///
/// # Errors
///
/// Returns `result` unchanged when it is an error.
pub fn track<T>(
    components: &mut Components,
    stage: &str,
    success: Option<&str>,
    failure: &str,
    result: Result<T, ReconcileError>,
) -> Result<T, ReconcileError> {
    match &result {
        Ok(_) => {
            if let Some(message) = success {
                debug!(stage, "{}", message);
                components.set_success(stage, message);
            }
        }
        // Cancellation is not a property of the resource
        Err(ReconcileError::Cancelled) => {}
        Err(e) => {
            error!(stage, reason = e.reason(), error = %e, "{}", failure);
            metrics::record_stage_failure(stage, e.reason());
            components.set_failure(stage, failure, e);
        }
    }
    result
}

/// [`track`] for a resource whose stages complete in a fixed `order`.
///
/// A failed stage also drops the stages after it, which a pass that stops here
/// has not re-checked.
///
/// # Errors
///
/// Returns `result` unchanged when it is an error.
pub fn track_ordered<T>(
    components: &mut Components,
    order: &[&str],
    stage: &str,
    success: Option<&str>,
    failure: &str,
    result: Result<T, ReconcileError>,
) -> Result<T, ReconcileError> {
    let result = track(components, stage, success, failure, result);
    if matches!(&result, Err(e) if !matches!(e, ReconcileError::Cancelled)) {
        components.clear_after(stage, order);
    }
    result
}

/// Access to the status block of a resource that tracks stage conditions.
pub trait Tracked {
    type Status: TrackedStatus;

    fn tracked_status(&self) -> Option<&Self::Status>;

    /// The status block, created empty when absent.
    fn tracked_status_mut(&mut self) -> &mut Self::Status;
}

/// A status block with an overall status and a condition set.
pub trait TrackedStatus: Clone + Default + PartialEq + Serialize + Send + Sync {
    fn overall(&self) -> Status;
    fn set_overall(&mut self, status: Status);
    fn conditions(&self) -> &Components;
    fn conditions_mut(&mut self) -> &mut Components;
}

macro_rules! impl_tracked {
    ($resource:ty, $status:ty) => {
        impl TrackedStatus for $status {
            fn overall(&self) -> Status {
                self.status
            }

            fn set_overall(&mut self, status: Status) {
                self.status = status;
            }

            fn conditions(&self) -> &Components {
                &self.conditions
            }

            fn conditions_mut(&mut self) -> &mut Components {
                &mut self.conditions
            }
        }

        impl Tracked for $resource {
            type Status = $status;

            fn tracked_status(&self) -> Option<&$status> {
                self.status.as_ref()
            }

            fn tracked_status_mut(&mut self) -> &mut $status {
                self.status.get_or_insert_with(Default::default)
            }
        }
    };
}

impl_tracked!(Organization, OrganizationStatus);
impl_tracked!(ProjectClaim, ProjectClaimStatus);
impl_tracked!(ManagedClusterRole, ManagedClusterRoleStatus);

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
