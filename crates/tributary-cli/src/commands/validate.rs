//! Validate configuration command

use anyhow::{bail, Context, Result};

use tributary_core::{Config, TransformRegistry};

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("✓ Project: {}", config.project.name);
    tracing::info!("✓ Version: {}", config.project.version);
    tracing::info!("✓ Storage backend: {:?}", config.project.storage.backend);

    let registry = TransformRegistry::builtin();
    let sources = config
        .load_sources(&registry)
        .context("Failed to scan sources directory")?;

    for descriptor in &sources.descriptors {
        tracing::info!(
            "✓ Source '{}' ({}): {} columns",
            descriptor.name,
            descriptor.source_type,
            descriptor.column_map.len()
        );
    }

    if !sources.failures.is_empty() {
        for (name, err) in &sources.failures {
            tracing::error!("✗ Source '{}': {}", name, err);
        }
        bail!(
            "{} of {} sources failed validation",
            sources.failures.len(),
            sources.descriptors.len() + sources.failures.len()
        );
    }

    tracing::info!("✓ Configuration is valid");
    Ok(())
}
