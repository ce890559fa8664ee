pub mod caption;
pub mod source;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::consult::vector_store::GarmentIndex;
use crate::error::ServiceError;
use crate::models::{ClothingPart, GarmentRecord};
use self::source::{decode_row, ItemSource};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Outcome of one collection's ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub fetched: usize,
    pub malformed: usize,
    pub already_indexed: usize,
    pub inserted: usize,
    pub failed_batches: usize,
}

/// Batch write target, seamed out so the retry loop is testable without a
/// live index.
pub(crate) trait BatchSink: Sync {
    fn insert(
        &self,
        part: ClothingPart,
        batch: &[GarmentRecord],
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

impl BatchSink for GarmentIndex {
    async fn insert(
        &self,
        part: ClothingPart,
        batch: &[GarmentRecord],
    ) -> Result<(), ServiceError> {
        self.insert_batch(part, batch).await
    }
}

/// Offline ingestion driver. Per collection: ensure it exists, ensure its
/// payload indexes, fetch and decode source rows, skip ids that are
/// already indexed, then batch-insert the remainder with bounded retries.
/// An exhausted batch is logged and skipped; the pipeline never aborts on
/// partial infrastructure flakiness.
pub struct IngestPipeline<'a> {
    index: &'a GarmentIndex,
    source: &'a ItemSource,
    batch_size: usize,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(index: &'a GarmentIndex, source: &'a ItemSource) -> Self {
        Self {
            index,
            source,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub async fn run_part(
        &self,
        part: ClothingPart,
        dim: usize,
    ) -> Result<IngestReport, ServiceError> {
        self.index.ensure_collection(part).await?;
        self.index.ensure_payload_indexes(part).await?;

        let rows = self
            .source
            .fetch_part_rows(part)
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;

        let mut report = IngestReport {
            fetched: rows.len(),
            ..Default::default()
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_row(row, dim) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::warn!("Dropping item {} from '{}': {}", row.item_id, part, reason);
                    report.malformed += 1;
                }
            }
        }

        let existing = self.index.existing_item_ids(part).await?;
        let decoded = records.len();
        let new_records = filter_new_records(records, &existing);
        report.already_indexed = decoded - new_records.len();

        if new_records.is_empty() {
            tracing::info!("No new data to insert into '{}'", part);
            return Ok(report);
        }

        let (inserted, failed_batches) = insert_batches(
            self.index,
            part,
            &new_records,
            self.batch_size,
            self.max_attempts,
            self.retry_delay,
        )
        .await;
        report.inserted = inserted;
        report.failed_batches = failed_batches;

        tracing::info!(
            "Ingestion for '{}' done: {} fetched, {} malformed, {} already indexed, {} inserted, {} failed batches",
            part,
            report.fetched,
            report.malformed,
            report.already_indexed,
            report.inserted,
            report.failed_batches
        );
        Ok(report)
    }
}

/// Re-running the pipeline over unchanged source data inserts nothing.
pub(crate) fn filter_new_records(
    records: Vec<GarmentRecord>,
    existing: &HashSet<i64>,
) -> Vec<GarmentRecord> {
    records
        .into_iter()
        .filter(|record| !existing.contains(&record.item_id))
        .collect()
}

pub(crate) async fn insert_batches<S: BatchSink>(
    sink: &S,
    part: ClothingPart,
    records: &[GarmentRecord],
    batch_size: usize,
    max_attempts: u32,
    retry_delay: Duration,
) -> (usize, usize) {
    let mut inserted = 0;
    let mut failed_batches = 0;

    for (batch_index, batch) in records.chunks(batch_size.max(1)).enumerate() {
        let mut succeeded = false;
        for attempt in 1..=max_attempts {
            match sink.insert(part, batch).await {
                Ok(()) => {
                    tracing::info!(
                        "Batch {} ({} records) inserted into '{}'",
                        batch_index + 1,
                        batch.len(),
                        part
                    );
                    inserted += batch.len();
                    succeeded = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        "Batch {} for '{}' failed on attempt {}: {}",
                        batch_index + 1,
                        part,
                        attempt,
                        e
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }

        if !succeeded {
            let err = ServiceError::BatchInsertExhausted {
                collection: part.collection_name().to_string(),
                batch: batch_index + 1,
                attempts: max_attempts,
            };
            tracing::error!("{err}");
            failed_batches += 1;
        }
    }

    (inserted, failed_batches)
}
