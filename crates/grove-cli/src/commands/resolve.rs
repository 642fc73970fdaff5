//! `grove resolve` command implementation.
//!
//! Queries the catalog for the closure of the targets and prints it
//! without touching the package store.

use chrono::Utc;
use grove_core::error::GroveResult;
use grove_core::types::Package;
use grove_registry::RegistryClient;
use grove_resolver::{DependencyGraph, PackageCatalog};

use super::{target_package, CommandContext};

pub async fn execute(targets: &[String], ctx: &CommandContext) -> GroveResult<()> {
    let requested = targets
        .iter()
        .map(|t| target_package(t))
        .collect::<GroveResult<Vec<Package>>>()?;

    let client = RegistryClient::with_settings(&ctx.settings.http)?;
    let catalog = PackageCatalog::new(&ctx.settings, client, Utc::now())?;
    let answer = catalog.find_dependencies(&requested).await?;

    let graph = DependencyGraph::from_index(&answer.index);
    if let Err(cycle) = graph.validate_no_cycles() {
        ctx.output.warn(&cycle.to_string());
    }
    let order = graph.publication_order();
    let source = if answer.source.is_local() { "local mirror" } else { "registry" };
    ctx.output.step(&format!(
        "Resolved {} package(s) from the {} of {}",
        order.len(),
        source,
        answer.remote.name
    ));

    for package in &order {
        let Some(entry) = answer.index.find(package) else {
            continue;
        };
        let marker = if entry.package.is_direct() { "*" } else { " " };
        ctx.output
            .item(&format!("{} {}  {}", marker, entry.package, entry.hash));
    }
    Ok(())
}
