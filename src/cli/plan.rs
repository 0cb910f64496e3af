//! Plan command handler.

use std::path::Path;

use anyhow::{Context, Result};

use plugwarden::config::Config;
use plugwarden::plugins::DependencyGraph;

/// Resolve the manifest into an initialization order.
pub(crate) async fn cmd_plan(path: &Path) -> Result<()> {
    let config = Config::load_from_path(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    if config.plugins.is_empty() {
        println!("No plugins declared in {}", path.display());
        return Ok(());
    }

    let mut graph = DependencyGraph::new();
    for manifest in &config.plugins {
        let normalized = manifest
            .config
            .clone()
            .normalize(&manifest.id)
            .with_context(|| format!("Invalid manifest entry '{}'", manifest.id))?;
        if !graph.add_node(&manifest.id, normalized.dependencies) {
            anyhow::bail!("Plugin '{}' is declared more than once", manifest.id);
        }
    }

    let order = graph.resolve_order().context("Cannot plan initialization")?;

    println!("Initialization order:");
    println!();
    for (i, id) in order.iter().enumerate() {
        let eh = config
            .plugins
            .iter()
            .find(|m| &m.id == id)
            .map(|m| m.config.error_handling.clone())
            .unwrap_or_default();
        let deps = graph.dependencies_of(id);
        println!(
            "  {:>3}. {:<24} attempts={} timeout={}ms recovery={}{}",
            i + 1,
            id,
            eh.retry_attempts,
            eh.timeout_ms,
            eh.recovery_strategy.as_str(),
            if deps.is_empty() {
                String::new()
            } else {
                format!("  after: {}", deps.join(", "))
            }
        );
    }
    println!();
    println!("{} plugin(s)", order.len());
    Ok(())
}
