//! List configured sources

use anyhow::{Context, Result};

use tributary_core::{Config, TransformRegistry};

/// Run the sources command
pub async fn run(config_path: &str) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let registry = TransformRegistry::builtin();
    let sources = config
        .load_sources(&registry)
        .context("Failed to scan sources directory")?;

    println!(
        "{} source(s) in {}:",
        sources.descriptors.len(),
        config.sources_dir().display()
    );
    for descriptor in &sources.descriptors {
        let keys = if descriptor.unique_keys.is_empty() {
            "all non-null fields".to_string()
        } else {
            descriptor.unique_keys.join(", ")
        };
        println!(
            "  {:<24} {:<8} {} columns, identity: {}",
            descriptor.name,
            descriptor.source_type.to_string(),
            descriptor.column_map.len(),
            keys
        );
    }

    if !sources.failures.is_empty() {
        println!("{} source(s) failed to load:", sources.failures.len());
        for (name, err) in &sources.failures {
            println!("  {:<24} {}", name, err);
        }
    }

    Ok(())
}
