// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Writes the CRD manifests of every kore kind.
//!
//! Usage:
//!   cargo run --bin crdgen [OUTPUT_DIR]
//!
//! Each CRD lands in `<OUTPUT_DIR>/<plural>.<group>.yaml` (default
//! `deploy/crds`), so the manifests always match `src/crd.rs`.

use anyhow::{Context as _, Result};
use kore::crd::{Allocation, Kubernetes, ManagedClusterRole, Organization, ProjectClaim};
use kube::CustomResourceExt;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_OUTPUT_DIR: &str = "deploy/crds";

const HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# Generated by `cargo run --bin crdgen` from src/crd.rs; do not edit.
";

fn main() -> Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR), PathBuf::from);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let written = [
        write_crd::<Organization>(&output_dir)?,
        write_crd::<ProjectClaim>(&output_dir)?,
        write_crd::<Allocation>(&output_dir)?,
        write_crd::<Kubernetes>(&output_dir)?,
        write_crd::<ManagedClusterRole>(&output_dir)?,
    ];

    for path in &written {
        println!("  ✓ {}", path.display());
    }
    println!("Apply with: kubectl apply -f {}", output_dir.display());
    Ok(())
}

fn write_crd<T: CustomResourceExt>(output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(format!("{}.yaml", T::crd_name()));
    let yaml = serde_yaml::to_string(&T::crd())?;
    fs::write(&path, format!("{HEADER}{yaml}"))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
