//! Ingestion orchestration
//!
//! The ingestor ties the pipeline together: register every source, make
//! sure the data table carries every declared column, then run one worker
//! per source that pulls raw records, extracts canonical rows, and upserts
//! them. Failures isolate at two levels: a record that fails extraction or
//! matches ambiguously is logged and skipped, and a source that fails
//! outright reports its error without touching the other sources.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;

use tributary_core::{FieldExtractor, SourceDescriptor, SourceType, TransformRegistry};
use tributary_store::{
    IdentityPolicy, ReconciliationEngine, SchemaManager, SourceRegistration, Store,
};

use crate::error::{Error, Result};
use crate::fetch::FetchEngine;
use crate::http::HttpClient;
use crate::limiter::LimiterRegistry;
use crate::source::RecordSource;
use crate::tabular::{DatasetSource, ImportSource};

/// Outcome of ingesting one source
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Source name
    pub source: String,
    /// Raw records pulled from the source
    pub records_read: u64,
    /// Records that landed in the store
    pub records_upserted: u64,
    /// Records skipped for extraction or ambiguity errors
    pub records_rejected: u64,
    /// Error that stopped the source early, if any
    pub failed: Option<String>,
}

/// Runs the full ingestion pipeline over a set of sources
pub struct Ingestor {
    client: Arc<dyn HttpClient>,
    store: Arc<dyn Store>,
    limiters: LimiterRegistry,
}

impl Ingestor {
    /// Ingestor writing to the given store through the given transport
    pub fn new(client: Arc<dyn HttpClient>, store: Arc<dyn Store>) -> Self {
        Self {
            client,
            store,
            limiters: LimiterRegistry::new(),
        }
    }

    /// Ingest every source concurrently; one report per source, in name
    /// order.
    pub async fn run(
        &self,
        descriptors: &[SourceDescriptor],
        registry: &TransformRegistry,
    ) -> Result<Vec<IngestReport>> {
        // Register the full column set up front so sources never race the
        // schema mid-run.
        let columns: BTreeSet<String> = descriptors
            .iter()
            .flat_map(|d| d.destination_columns())
            .collect();
        let columns: Vec<String> = columns.into_iter().collect();
        SchemaManager::new(self.store.clone())
            .ensure_columns(&columns)
            .await
            .map_err(Error::Store)?;

        let engine = Arc::new(ReconciliationEngine::new(self.store.clone()));

        let mut workers = JoinSet::new();
        for descriptor in descriptors {
            let descriptor = descriptor.clone();
            let source_id = self
                .store
                .register_source(&SourceRegistration {
                    name: descriptor.name.clone(),
                    source_type: descriptor.source_type.to_string(),
                    config_path: Some(descriptor.config_path.clone()),
                    unique_keys: descriptor.unique_keys.clone(),
                })
                .await
                .map_err(Error::Store)?;

            let extractor = FieldExtractor::compile(&descriptor.column_map, registry)?;
            let policy = IdentityPolicy::for_keys(&descriptor.unique_keys);
            let limiter = self.limiters.limiter_for(&descriptor).await;
            let client = self.client.clone();
            let engine = engine.clone();

            workers.spawn(async move {
                let name = descriptor.name.clone();
                tracing::info!(source = %name, kind = %descriptor.source_type, "ingesting source");

                let source: Result<Box<dyn RecordSource>> = match descriptor.source_type {
                    SourceType::Api => Ok(Box::new(FetchEngine::new(
                        descriptor.clone(),
                        client,
                        limiter,
                    ))),
                    SourceType::Import => Ok(Box::new(ImportSource::new(
                        descriptor.clone(),
                        client,
                        limiter,
                    ))),
                    SourceType::Dataset => {
                        DatasetSource::new(descriptor.clone()).map(|s| Box::new(s) as _)
                    }
                };

                match source {
                    Ok(source) => {
                        ingest_source(name, source, extractor, engine, source_id, policy).await
                    }
                    Err(err) => IngestReport {
                        source: name,
                        records_read: 0,
                        records_upserted: 0,
                        records_rejected: 0,
                        failed: Some(err.to_string()),
                    },
                }
            });
        }

        let mut reports = Vec::with_capacity(descriptors.len());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(error = %err, "ingestion worker panicked");
                }
            }
        }
        reports.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(reports)
    }
}

async fn ingest_source(
    name: String,
    mut source: Box<dyn RecordSource>,
    extractor: FieldExtractor,
    engine: Arc<ReconciliationEngine>,
    source_id: i64,
    policy: IdentityPolicy,
) -> IngestReport {
    let mut report = IngestReport {
        source: name.clone(),
        records_read: 0,
        records_upserted: 0,
        records_rejected: 0,
        failed: None,
    };

    loop {
        let record = match source.next_record().await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(source = %name, error = %err, "source failed");
                report.failed = Some(err.to_string());
                break;
            }
        };
        report.records_read += 1;

        let row = match extractor.extract(&record) {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(source = %name, error = %err, "skipping record");
                report.records_rejected += 1;
                continue;
            }
        };

        match engine.upsert(&row, source_id, &policy).await {
            Ok(_) => report.records_upserted += 1,
            Err(err @ tributary_store::Error::AmbiguousIdentity { .. }) => {
                tracing::warn!(source = %name, error = %err, "skipping record");
                report.records_rejected += 1;
            }
            Err(err) => {
                tracing::error!(source = %name, error = %err, "store failed");
                report.failed = Some(err.to_string());
                break;
            }
        }
    }

    tracing::info!(
        source = %name,
        read = report.records_read,
        upserted = report.records_upserted,
        rejected = report.records_rejected,
        "source finished"
    );
    report
}
