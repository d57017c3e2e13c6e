//! Tenant layout validation.

use anyhow::{Context, Result};
use railyard_config::Layout;
use std::path::Path;

/// Parses and validates a tenant layout document.
pub fn run(path: &str) -> Result<()> {
    let layout_path = Path::new(path);
    println!("Validating tenant layout at {}...", layout_path.display());

    let layout = Layout::load(layout_path).with_context(|| format!("failed to load layout at {path}"))?;

    println!("Layout is valid.");
    println!();
    for tenant in &layout.tenants {
        println!("tenant {} (id {})", tenant.name, tenant.id);
        for pipeline in &tenant.pipelines {
            println!("  pipeline {:<16} manager_kind={:?} jobs={}", pipeline.name, pipeline.manager_kind, pipeline.jobs.len());
        }
    }
    Ok(())
}
