//! Streaming, type-partitioned Parquet writer.
//!
//! Records are routed to the open file of their type. Each type first buffers
//! a sample to fix its shredding plan, then streams rows in batches into
//! size-bounded files. A file is sealed when the next record would push it
//! past its row or byte threshold; sealing emits a [`WriteResult`] and a
//! manifest entry. Files are created with `create_new`, so nothing already on
//! disk is ever overwritten.

use parquet::arrow::ArrowWriter;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::files;
use super::manifest::{Manifest, ManifestFile};
use super::options::{Thresholds, WriterOptions};
use super::schema::ArticleBatchBuilder;
use super::shred::ShreddingPlan;
use crate::constants::{
    CHUNK_METADATA_BYTES, FOOTER_RESERVE_BYTES, PARQUET_BATCH_SIZE, VALUE_OVERHEAD_BYTES,
};
use crate::error::{Result, StoreError};
use crate::types::{ArticleRecord, ArticleType};

/// Emitted once per sealed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub article_type: ArticleType,
    /// Path relative to the store root.
    pub path: String,
    pub row_count: u64,
    pub byte_size: u64,
}

/// Passed to the size-warning callback when an open file nears its budget.
#[derive(Debug, Clone)]
pub struct SizeWarning {
    pub article_type: ArticleType,
    pub path: String,
    pub rows: u64,
    pub estimated_bytes: u64,
    pub max_file_bytes: u64,
}

/// Called at most once per file. Changes made to the thresholds apply to files
/// opened afterwards; the file that triggered the warning keeps its own.
pub type SizeWarningCallback = Box<dyn FnMut(&SizeWarning, &mut Thresholds) + Send>;

/// Everything a finished writer run produced.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub manifest: Manifest,
    pub results: Vec<WriteResult>,
}

/// Helper struct for one open data file.
struct OpenFile {
    writer: ArrowWriter<File>,
    rel_path: String,
    abs_path: PathBuf,
    batch: ArticleBatchBuilder,
    thresholds: Thresholds,
    rows: u64,
    leaf_columns: u64,
    row_group_size: u64,
    /// Estimated bytes of rows still sitting in `batch`.
    pending_bytes: u64,
    warned: bool,
}

impl OpenFile {
    fn create(
        root: &Path,
        rel_path: String,
        plan: ShreddingPlan,
        thresholds: Thresholds,
        options: &WriterOptions,
    ) -> Result<Self> {
        let abs_path = root.join(&rel_path);
        let batch = ArticleBatchBuilder::new(plan)?;
        let props = options.parquet.to_writer_properties();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs_path)
            .map_err(|e| StoreError::io(abs_path.clone(), "create data file", e))?;
        let leaf_columns = batch.schema().fields().len() as u64;
        let writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        log::debug!("Opened data file {}", rel_path);

        Ok(Self {
            writer,
            rel_path,
            abs_path,
            batch,
            thresholds,
            rows: 0,
            leaf_columns,
            row_group_size: options.parquet.row_group_size as u64,
            pending_bytes: 0,
            warned: false,
        })
    }

    /// Footer bytes reserved for the row groups written so far plus the
    /// next one.
    fn footer_reserve(&self) -> u64 {
        let row_groups = self.rows / self.row_group_size.max(1) + 1;
        FOOTER_RESERVE_BYTES + row_groups * self.leaf_columns * CHUNK_METADATA_BYTES
    }

    /// Upper-bound estimate of the file size if sealed now.
    fn estimated_size(&self) -> u64 {
        self.writer.bytes_written() as u64
            + self.writer.in_progress_size() as u64
            + self.pending_bytes
            + self.footer_reserve()
    }

    fn flush_batch(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = self.batch.finish()?;
        self.writer.write(&batch)?;
        self.pending_bytes = 0;
        Ok(())
    }

    fn seal(mut self, article_type: ArticleType) -> Result<WriteResult> {
        self.flush_batch()?;
        self.writer.close()?;
        let byte_size = fs::metadata(&self.abs_path)
            .map_err(|e| StoreError::io(self.abs_path.clone(), "stat sealed file", e))?
            .len();
        if byte_size > self.thresholds.max_file_bytes {
            log::error!(
                "Sealed {} at {} bytes, above its {} byte budget",
                self.rel_path,
                byte_size,
                self.thresholds.max_file_bytes
            );
            fs::remove_file(&self.abs_path)
                .map_err(|e| StoreError::io(self.abs_path.clone(), "remove oversized file", e))?;
            return Err(StoreError::FileOverBudget {
                path: self.rel_path,
                limit: self.thresholds.max_file_bytes,
                actual: byte_size,
            });
        }
        log::info!(
            "Sealed {} ({} rows, {} bytes)",
            self.rel_path,
            self.rows,
            byte_size
        );
        Ok(WriteResult {
            article_type,
            path: self.rel_path,
            row_count: self.rows,
            byte_size,
        })
    }
}

/// Per-type writer state.
struct Partition {
    article_type: ArticleType,
    /// `None` while the sample is still being collected.
    plan: Option<ShreddingPlan>,
    sample: Vec<ArticleRecord>,
    open: Option<OpenFile>,
    next_seq: u32,
}

impl Partition {
    fn new(article_type: ArticleType) -> Self {
        Self {
            article_type,
            plan: None,
            sample: Vec::new(),
            open: None,
            next_seq: 0,
        }
    }
}

/// Writes a record stream into per-type, size-bounded Parquet files.
pub struct PartitionedWriter {
    root: PathBuf,
    options: WriterOptions,
    /// Thresholds applied to the next file opened.
    thresholds: Thresholds,
    partitions: BTreeMap<ArticleType, Partition>,
    manifest: Manifest,
    results: Vec<WriteResult>,
    on_size_warning: Option<SizeWarningCallback>,
}

impl PartitionedWriter {
    /// Create a writer rooted at `root` (created if missing).
    pub fn create(root: &Path, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        fs::create_dir_all(root)
            .map_err(|e| StoreError::io(root.to_path_buf(), "create store root", e))?;
        Ok(Self {
            root: root.to_path_buf(),
            thresholds: options.thresholds,
            options,
            partitions: BTreeMap::new(),
            manifest: Manifest::new(),
            results: Vec::new(),
            on_size_warning: None,
        })
    }

    /// Install the size-warning callback.
    pub fn with_size_warning(mut self, callback: SizeWarningCallback) -> Self {
        self.on_size_warning = Some(callback);
        self
    }

    /// Thresholds that the next opened file will use.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Columns a record can touch: 11 fixed ones plus one per infobox key at
    /// most.
    fn record_columns(record: &ArticleRecord) -> u64 {
        11 + record.infobox.len() as u64
    }

    /// Bytes a record occupies for size accounting.
    fn record_cost(record: &ArticleRecord) -> u64 {
        record.estimated_size() + Self::record_columns(record) * VALUE_OVERHEAD_BYTES
    }

    fn check_fits(record: &ArticleRecord, cost: u64, thresholds: &Thresholds) -> Result<()> {
        let needed = cost
            + FOOTER_RESERVE_BYTES
            + Self::record_columns(record) * CHUNK_METADATA_BYTES;
        if needed > thresholds.max_file_bytes {
            return Err(StoreError::FileLimitExceeded {
                article_type: record.article_type,
                record_id: record.id.clone(),
                limit: thresholds.max_file_bytes,
                actual: needed,
            });
        }
        Ok(())
    }

    /// Write one record. Returns the files sealed as a consequence.
    pub fn write(&mut self, record: ArticleRecord) -> Result<Vec<WriteResult>> {
        let cost = Self::record_cost(&record);
        Self::check_fits(&record, cost, &self.thresholds)?;

        let article_type = record.article_type;
        let sample_size = self.options.shredding.sample_size;
        let partition = self
            .partitions
            .entry(article_type)
            .or_insert_with(|| Partition::new(article_type));

        if partition.plan.is_some() {
            return self.append(article_type, record);
        }

        partition.sample.push(record);
        if partition.sample.len() < sample_size {
            return Ok(Vec::new());
        }
        self.fix_plan(article_type)
    }

    /// Write every record of a stream.
    pub fn write_all<I>(&mut self, records: I) -> Result<Vec<WriteResult>>
    where
        I: IntoIterator<Item = ArticleRecord>,
    {
        let mut sealed = Vec::new();
        for record in records {
            sealed.extend(self.write(record)?);
        }
        Ok(sealed)
    }

    /// Infer the plan from the buffered sample and replay the sample.
    fn fix_plan(&mut self, article_type: ArticleType) -> Result<Vec<WriteResult>> {
        let Some(partition) = self.partitions.get_mut(&article_type) else {
            return Ok(Vec::new());
        };
        let sample = std::mem::take(&mut partition.sample);
        let plan = ShreddingPlan::infer(&sample, &self.options.shredding);
        log::info!(
            "{} partition: shredding {} infobox keys from {} sampled records",
            article_type,
            plan.columns.len(),
            sample.len()
        );
        partition.plan = Some(plan);

        let mut sealed = Vec::new();
        for record in sample {
            sealed.extend(self.append(article_type, record)?);
        }
        Ok(sealed)
    }

    fn append(
        &mut self,
        article_type: ArticleType,
        record: ArticleRecord,
    ) -> Result<Vec<WriteResult>> {
        let cost = Self::record_cost(&record);
        let mut sealed = Vec::new();

        let Some(partition) = self.partitions.get_mut(&article_type) else {
            return Err(StoreError::validation(format!(
                "no partition state for {}",
                article_type
            )));
        };

        let must_seal = partition.open.as_ref().is_some_and(|open| {
            open.rows > 0
                && (open.rows >= open.thresholds.max_rows_per_file as u64
                    || open.estimated_size() + cost > open.thresholds.max_file_bytes)
        });
        if must_seal {
            if let Some(open) = partition.open.take() {
                let result = open.seal(article_type)?;
                self.manifest.add_file(
                    article_type,
                    ManifestFile {
                        path: result.path.clone(),
                        row_count: result.row_count,
                        byte_size: result.byte_size,
                    },
                );
                self.results.push(result.clone());
                sealed.push(result);
            }
        }

        if partition.open.is_none() {
            let rel_path = format!(
                "{}/{}",
                article_type.as_str(),
                files::data_file(&self.options.file_prefix, partition.next_seq)
            );
            let dir = self.root.join(article_type.as_str());
            fs::create_dir_all(&dir)
                .map_err(|e| StoreError::io(dir.clone(), "create partition directory", e))?;
            let plan = partition.plan.clone().unwrap_or_default();
            partition.open = Some(OpenFile::create(
                &self.root,
                rel_path,
                plan,
                self.thresholds,
                &self.options,
            )?);
            partition.next_seq += 1;
        }

        let Some(open) = partition.open.as_mut() else {
            return Ok(sealed);
        };
        Self::check_fits(&record, cost, &open.thresholds)?;

        open.batch.append(&record)?;
        open.rows += 1;
        open.pending_bytes += cost;
        if open.batch.len() >= PARQUET_BATCH_SIZE {
            open.flush_batch()?;
        }

        let estimated = open.estimated_size();
        let warn_at = (open.thresholds.max_file_bytes as f64 * self.options.warn_ratio) as u64;
        if !open.warned && estimated >= warn_at {
            open.warned = true;
            let warning = SizeWarning {
                article_type,
                path: open.rel_path.clone(),
                rows: open.rows,
                estimated_bytes: estimated,
                max_file_bytes: open.thresholds.max_file_bytes,
            };
            log::warn!(
                "{} is at ~{} of {} bytes after {} rows",
                warning.path,
                warning.estimated_bytes,
                warning.max_file_bytes,
                warning.rows
            );
            if let Some(callback) = self.on_size_warning.as_mut() {
                let mut next = self.thresholds;
                callback(&warning, &mut next);
                if next != self.thresholds {
                    next.validate()?;
                    log::info!(
                        "Thresholds for new files changed: {} rows, {} bytes",
                        next.max_rows_per_file,
                        next.max_file_bytes
                    );
                    self.thresholds = next;
                }
            }
        }

        Ok(sealed)
    }

    /// Seal all open files, save `manifest.toml`, and return the run's outcome.
    pub fn finish(mut self) -> Result<WriteOutcome> {
        let sampling: Vec<ArticleType> = self
            .partitions
            .values()
            .filter(|p| p.plan.is_none())
            .map(|p| p.article_type)
            .collect();
        for article_type in sampling {
            self.fix_plan(article_type)?;
        }

        for partition in self.partitions.values_mut() {
            if let Some(open) = partition.open.take() {
                let result = open.seal(partition.article_type)?;
                self.manifest.add_file(
                    partition.article_type,
                    ManifestFile {
                        path: result.path.clone(),
                        row_count: result.row_count,
                        byte_size: result.byte_size,
                    },
                );
                self.results.push(result);
            }
        }

        self.manifest.validate()?;
        self.manifest.save(&self.root)?;
        log::info!(
            "Writer finished: {} files, {} rows",
            self.results.len(),
            self.manifest.total_count()
        );

        Ok(WriteOutcome {
            manifest: self.manifest,
            results: self.results,
        })
    }
}
