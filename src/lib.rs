// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Kore - multi-tenant cloud provisioning controllers for Kubernetes
//!
//! Kore lets platform administrators share cloud organizations and clusters with
//! teams. Teams are namespaces; administrators publish resources to them through
//! `Allocation`s, and the controllers in this crate turn team requests into
//! provisioned cloud resources.
//!
//! ## Overview
//!
//! - An `Organization` holds a GCP service account key for a parent folder or org
//! - A `ProjectClaim` asks for a GCP project under an allocated organization; the
//!   controller creates it, links billing, enables APIs and publishes a key
//! - A `ManagedClusterRole` is propagated as a `ClusterRole` to every targeted
//!   downstream `Kubernetes` cluster
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - the generic driver and one reconciler per kind
//! - [`store`] - typed resource store, Kubernetes or in-memory
//! - [`gcp`] - GCP REST clients and long-running operation polling
//! - [`cluster_client`] - clients for downstream clusters
//! - [`context`] - shared context handed to every pass
//! - [`config`] - command line and environment configuration
//! - [`server`] - metrics and health endpoints
//!
//! ## Example
//!
//! ```rust
//! use kore::crd::{Ownership, ProjectClaimSpec};
//!
//! let spec = ProjectClaimSpec {
//!     project_name: Some("payments-dev".to_string()),
//!     service_account_name: None,
//!     organization: Ownership {
//!         group: "gcp.compute.kore.appvia.io".to_string(),
//!         version: "v1alpha1".to_string(),
//!         kind: "Organization".to_string(),
//!         namespace: "kore-admin".to_string(),
//!         name: "appvia".to_string(),
//!     },
//! };
//! assert!(spec.organization.is_organization());
//! ```

pub mod cluster_client;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod gcp;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod server;
pub mod status_reasons;
pub mod store;
