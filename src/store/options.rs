//! Parquet write options and writer thresholds.
//!
//! This module contains configuration for data file writing: compression,
//! row group size, per-file row/byte thresholds and the shredding policy.

use serde::{Deserialize, Serialize};

use super::schema::columns;
use crate::constants::{
    DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_ROWS_PER_FILE, DEFAULT_ROW_GROUP_SIZE, DEFAULT_WARN_RATIO,
    STATISTICS_TRUNCATE_LENGTH,
};
use crate::error::{Result, StoreError};

/// Compression codec for Parquet files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    /// Snappy compression (fast, moderate ratio). Default.
    #[default]
    Snappy,
    /// Zstd compression (slower, better ratio).
    Zstd,
    /// No compression.
    None,
}

/// Configuration options for Parquet file writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParquetWriteOptions {
    /// Maximum rows per row group. Default: 4,096.
    ///
    /// Row groups are the unit a remote reader fetches: one row lookup downloads
    /// the column chunks of exactly one row group. Smaller groups mean cheaper
    /// point lookups and more footer metadata; larger groups compress better
    /// and suit type scans.
    pub row_group_size: usize,

    /// Compression codec. Default: Snappy.
    pub compression: ParquetCompression,

    /// Write page-level statistics. Default: true.
    pub write_page_statistics: bool,
}

impl Default for ParquetWriteOptions {
    fn default() -> Self {
        Self {
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            compression: ParquetCompression::Snappy,
            write_page_statistics: true,
        }
    }
}

impl ParquetWriteOptions {
    /// Validate options. Returns error if any values are out of bounds.
    pub fn validate(&self) -> Result<()> {
        if self.row_group_size == 0 {
            return Err(StoreError::validation("row_group_size must be > 0"));
        }
        Ok(())
    }

    /// Convert options to parquet WriterProperties.
    ///
    /// This is the single source of truth for building WriterProperties across
    /// article and relationship partitions.
    pub fn to_writer_properties(&self) -> parquet::file::properties::WriterProperties {
        use parquet::basic::Compression;
        use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};
        use parquet::schema::types::ColumnPath;

        let compression = match self.compression {
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Zstd => Compression::ZSTD(parquet::basic::ZstdLevel::default()),
            ParquetCompression::None => Compression::UNCOMPRESSED,
        };

        let statistics = if self.write_page_statistics {
            EnabledStatistics::Page
        } else {
            EnabledStatistics::None
        };

        // Article bodies are large and rarely repeat: no dictionary, no
        // min/max in the footer.
        let content = ColumnPath::from(columns::CONTENT);

        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(compression)
            .set_statistics_enabled(statistics)
            .set_statistics_truncate_length(Some(STATISTICS_TRUNCATE_LENGTH))
            .set_column_index_truncate_length(Some(STATISTICS_TRUNCATE_LENGTH))
            .set_column_statistics_enabled(content.clone(), EnabledStatistics::None)
            .set_column_dictionary_enabled(content, false)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

/// Per-file sealing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Seal a file once it holds this many rows.
    pub max_rows_per_file: usize,
    /// Hard byte budget per file.
    pub max_file_bytes: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_rows_per_file: DEFAULT_MAX_ROWS_PER_FILE,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        if self.max_rows_per_file == 0 {
            return Err(StoreError::validation("max_rows_per_file must be > 0"));
        }
        if self.max_file_bytes == 0 {
            return Err(StoreError::validation("max_file_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Policy for promoting infobox keys to typed columns.
///
/// Keys present in at least `min_frequency` of the first `sample_size`
/// records of a type become columns, at most `max_columns` of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShreddingPolicy {
    pub sample_size: usize,
    pub min_frequency: f64,
    pub max_columns: usize,
}

impl Default for ShreddingPolicy {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            min_frequency: 0.5,
            max_columns: 32,
        }
    }
}

impl ShreddingPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(StoreError::validation("shredding sample_size must be > 0"));
        }
        if !(self.min_frequency > 0.0 && self.min_frequency <= 1.0) {
            return Err(StoreError::validation(format!(
                "shredding min_frequency must be in (0.0, 1.0], got {}",
                self.min_frequency
            )));
        }
        Ok(())
    }
}

/// Options for [`super::PartitionedWriter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Initial thresholds; the size-warning callback may replace them.
    pub thresholds: Thresholds,
    /// Fraction of `max_file_bytes` at which the size warning fires.
    pub warn_ratio: f64,
    /// File name prefix. Independent writer runs must use distinct prefixes
    /// so their manifests merge without path collisions.
    pub file_prefix: String,
    pub parquet: ParquetWriteOptions,
    pub shredding: ShreddingPolicy,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            warn_ratio: DEFAULT_WARN_RATIO,
            file_prefix: "part".to_string(),
            parquet: ParquetWriteOptions::default(),
            shredding: ShreddingPolicy::default(),
        }
    }
}

impl WriterOptions {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.parquet.validate()?;
        self.shredding.validate()?;
        if !(self.warn_ratio > 0.0 && self.warn_ratio <= 1.0) {
            return Err(StoreError::validation(format!(
                "warn_ratio must be in (0.0, 1.0], got {}",
                self.warn_ratio
            )));
        }
        if self.file_prefix.is_empty()
            || self
                .file_prefix
                .contains(|c: char| c == '/' || c == '\\' || c.is_whitespace())
        {
            return Err(StoreError::validation(format!(
                "file_prefix must be a plain non-empty name, got '{}'",
                self.file_prefix
            )));
        }
        Ok(())
    }
}
