//! Run the ingestion pipeline

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use tributary_core::config::StorageBackend;
use tributary_core::{Config, TransformRegistry};
use tributary_engine::{Ingestor, ReqwestClient};
use tributary_store::{MemoryStore, PgStore, Store};

/// Run the run command
pub async fn run(config_path: &str, only_source: Option<&str>) -> Result<()> {
    tracing::info!("Loading configuration from {}", config_path);
    let config = Config::load(config_path).context("Failed to load configuration")?;
    tracing::info!("Project: {}", config.project.name);

    let registry = TransformRegistry::builtin();
    let sources = config
        .load_sources(&registry)
        .context("Failed to scan sources directory")?;

    for (name, err) in &sources.failures {
        tracing::error!(source = %name, error = %err, "source disabled");
    }

    let mut descriptors = sources.descriptors;
    if let Some(only) = only_source {
        descriptors.retain(|d| d.name == only);
        if descriptors.is_empty() {
            bail!("source '{}' not found", only);
        }
    }
    if descriptors.is_empty() {
        bail!("no usable sources in {}", config.sources_dir().display());
    }

    let store: Arc<dyn Store> = match config.project.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("memory backend selected; data is discarded on exit");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Postgres => {
            let url = config
                .project
                .storage
                .postgres_url
                .as_deref()
                .context("postgres backend requires storage.postgres_url")?;
            Arc::new(
                PgStore::connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?,
            )
        }
    };

    let client = Arc::new(ReqwestClient::new().context("Failed to build HTTP client")?);
    let ingestor = Ingestor::new(client, store.clone());

    let reports = ingestor
        .run(&descriptors, &registry)
        .await
        .context("Ingestion failed")?;

    let mut failed = 0;
    for report in &reports {
        match &report.failed {
            None => tracing::info!(
                source = %report.source,
                read = report.records_read,
                upserted = report.records_upserted,
                rejected = report.records_rejected,
                "source complete"
            ),
            Some(err) => {
                failed += 1;
                tracing::error!(
                    source = %report.source,
                    read = report.records_read,
                    upserted = report.records_upserted,
                    error = %err,
                    "source failed"
                );
            }
        }
    }

    let total_rows = store.count_rows().await.context("Failed to count rows")?;
    tracing::info!(rows = total_rows, sources = reports.len(), "ingestion finished");

    if failed > 0 {
        bail!("{} of {} sources failed", failed, reports.len());
    }
    Ok(())
}
