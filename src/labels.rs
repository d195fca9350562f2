// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label constants stamped on objects written by the controllers.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_KORE: &str = "kore";

// ============================================================================
// Kore Labels
// ============================================================================

/// Marks an object as created and owned by kore
pub const KORE_OWNED: &str = "kore.appvia.io/owned";

/// Value for [`KORE_OWNED`]
pub const KORE_OWNED_VALUE: &str = "true";

/// Name of the claim a derived object was written for
pub const KORE_CLAIM: &str = "kore.appvia.io/claim";
