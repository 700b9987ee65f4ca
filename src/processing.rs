// VecUpload — processing.rs
// Batch accumulation, per-partition projection, and the sequential upload driver.
// Author: d65v <https://github.com/d65v>
//
// One batch is fully uploaded (name partition, then type partition) before the
// next is started. The first error of any kind ends the run.

use std::fmt;

use serde_json::{Map, Value};

use crate::client::{PineconeClient, Transport, VectorRecord};
use crate::record::Record;
use crate::Result;

/// Records per upload batch.
pub const BATCH_SIZE: usize = 100;

// ── Batch Accumulator ─────────────────────────────────────────────────────────

/// Collects records until a batch is full.
pub struct BatchAccumulator {
    capacity: usize,
    pending: Vec<Record>,
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new(BATCH_SIZE)
    }
}

impl BatchAccumulator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Add a record. Returns the full batch when this record completes one.
    pub fn accumulate(&mut self, record: Record) -> Option<Vec<Record>> {
        self.pending.push(record);
        if self.pending.len() == self.capacity {
            Some(self.take())
        } else {
            None
        }
    }

    /// Hand over whatever is pending, possibly nothing.
    pub fn flush(&mut self) -> Vec<Record> {
        self.take()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> Vec<Record> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity))
    }
}

// ── Partitions ────────────────────────────────────────────────────────────────

/// Logical namespace a record's embedding is uploaded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Name,
    Type,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Name, Partition::Type];

    /// Namespace string used on the wire.
    pub fn namespace(self) -> &'static str {
        match self {
            Partition::Name => "name",
            Partition::Type => "type",
        }
    }

    pub fn embedding(self, record: &Record) -> Option<&[f32]> {
        match self {
            Partition::Name => record.name_embedding.as_deref(),
            Partition::Type => record.type_embedding.as_deref(),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Which hash becomes a vector's id.
///
/// `NameHash` uses the name hash for both partitions, so a record's name and
/// type vectors share an id. `PartitionHash` uses the type hash for the type
/// partition instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdSource {
    #[default]
    NameHash,
    PartitionHash,
}

// ── Projector ─────────────────────────────────────────────────────────────────

/// Turns a batch of records into the vectors for one partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Projector {
    pub ids: IdSource,
}

impl Projector {
    pub fn new(ids: IdSource) -> Self {
        Self { ids }
    }

    /// Vectors for `partition`, one per record that has that embedding.
    /// Records without it are skipped; an empty result is fine.
    pub fn project(&self, batch: &[Record], partition: Partition) -> Vec<VectorRecord> {
        batch
            .iter()
            .filter_map(|record| {
                partition.embedding(record).map(|values| VectorRecord {
                    id: self.id_for(record, partition).to_string(),
                    values: values.to_vec(),
                    metadata: Some(metadata(record)),
                })
            })
            .collect()
    }

    fn id_for(&self, record: &Record, partition: Partition) -> u64 {
        match (self.ids, partition) {
            (IdSource::PartitionHash, Partition::Type) => record.type_hash,
            _ => record.name_hash,
        }
    }
}

fn metadata(record: &Record) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("name".into(), Value::from(record.name.as_str()));
    m.insert("type".into(), Value::from(record.ty.as_str()));
    m.insert("module".into(), Value::from(record.module.as_str()));
    m.insert("rev".into(), Value::from(record.rev.as_str()));
    m.insert("nameHash".into(), Value::from(record.name_hash));
    m.insert("typeHash".into(), Value::from(record.type_hash));
    m
}

// ── Upload Driver ─────────────────────────────────────────────────────────────

/// Result of one upsert call, handed to the caller as soon as it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// 1-based batch number
    pub batch: usize,
    pub partition: Partition,
    /// Records in the batch
    pub records: usize,
    /// Vectors sent for this partition
    pub attempted: usize,
    /// Vectors the service reported as upserted
    pub upserted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub records_read: usize,
    pub batches: usize,
    pub name_upserted: u64,
    pub type_upserted: u64,
}

pub struct Uploader<T: Transport> {
    client: PineconeClient<T>,
    projector: Projector,
    batch_size: usize,
}

impl<T: Transport> Uploader<T> {
    pub fn new(client: PineconeClient<T>) -> Self {
        Self {
            client,
            projector: Projector::default(),
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_projector(mut self, projector: Projector) -> Self {
        self.projector = projector;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn client(&self) -> &PineconeClient<T> {
        &self.client
    }

    /// Upload every record from `records`, batch by batch.
    ///
    /// `on_report` sees each upsert result before the next call starts.
    ///
    /// # Errors
    /// Stops at the first decode, transport, service or response-format error.
    /// Batches already uploaded stay uploaded.
    pub fn run<I, F>(&self, records: I, mut on_report: F) -> Result<UploadSummary>
    where
        I: IntoIterator<Item = Result<Record>>,
        F: FnMut(&BatchReport),
    {
        let mut acc = BatchAccumulator::new(self.batch_size);
        let mut summary = UploadSummary::default();

        for record in records {
            summary.records_read += 1;
            if let Some(batch) = acc.accumulate(record?) {
                self.upload_batch(&batch, &mut summary, &mut on_report)?;
            }
        }

        let rest = acc.flush();
        if !rest.is_empty() {
            self.upload_batch(&rest, &mut summary, &mut on_report)?;
        }

        log::info!(
            "Read {} records in {} batches; upserted {} name / {} type vectors",
            summary.records_read,
            summary.batches,
            summary.name_upserted,
            summary.type_upserted
        );
        Ok(summary)
    }

    fn upload_batch<F>(
        &self,
        batch: &[Record],
        summary: &mut UploadSummary,
        on_report: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&BatchReport),
    {
        summary.batches += 1;
        let number = summary.batches;

        for partition in Partition::ALL {
            let vectors = self.projector.project(batch, partition);
            if vectors.is_empty() {
                log::debug!("batch {}: no {} embeddings, skipping", number, partition);
                continue;
            }

            let upserted = self.client.upsert(&vectors, partition.namespace())?;
            match partition {
                Partition::Name => summary.name_upserted += upserted,
                Partition::Type => summary.type_upserted += upserted,
            }
            on_report(&BatchReport {
                batch: number,
                partition,
                records: batch.len(),
                attempted: vectors.len(),
                upserted,
            });
        }

        log::info!("batch {} done ({} records)", number, batch.len());
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
