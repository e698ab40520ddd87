//! Constants used throughout the wikicol library for size limits, performance
//! tuning, and binary format definitions.
//!
//! Centralizing these constants ensures the writer, index builder and reader
//! agree on every magic number.

// ============================================================================
// Store format
// ============================================================================

/// Magic string written into `manifest.toml`.
pub const MANIFEST_MAGIC: &str = "WIKICOL_MANIFEST_V1";

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Arrow schema metadata key carrying the store format version.
pub(crate) const SCHEMA_VERSION_KEY: &str = "wikicol.format_version";

/// Current data file schema version.
pub(crate) const SCHEMA_VERSION: u32 = 1;

/// Column name prefix for shredded infobox fields.
pub const SHREDDED_PREFIX: &str = "ib_";

// ============================================================================
// Parquet footer
// ============================================================================

/// Trailing magic of every Parquet file.
pub(crate) const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Trailing magic of encrypted-footer Parquet files (unsupported).
pub(crate) const PARQUET_ENCRYPTED_MAGIC: &[u8; 4] = b"PARE";

/// Footer tail: 4-byte metadata length + 4-byte magic.
pub(crate) const FOOTER_TAIL_LEN: u64 = 8;

/// Default number of trailing bytes fetched on first contact with a file.
/// Usually large enough to cover the whole footer in one request.
pub const DEFAULT_FOOTER_PREFETCH: u64 = 64 * 1024;

/// Bytes reserved for the footer when estimating the size of an open file.
pub(crate) const FOOTER_RESERVE_BYTES: u64 = 16 * 1024;

/// Footer bytes reserved per column chunk (chunk metadata plus page index
/// entries) on top of [`FOOTER_RESERVE_BYTES`].
pub(crate) const CHUNK_METADATA_BYTES: u64 = 512;

/// Longest min/max value kept in column statistics and the column index.
pub const STATISTICS_TRUNCATE_LENGTH: usize = 64;

/// Per-value encoding overhead assumed by the writer's size estimate
/// (length prefix + definition level).
pub(crate) const VALUE_OVERHEAD_BYTES: u64 = 6;

// ============================================================================
// Index artifacts
// ============================================================================

/// Magic bytes prefixing every index artifact blob.
pub(crate) const ARTIFACT_MAGIC: &[u8; 4] = b"WKIX";

/// Current index artifact version.
pub(crate) const ARTIFACT_VERSION: u32 = 1;

/// Name of the pointer file naming the current index snapshot.
pub const CURRENT_POINTER: &str = "CURRENT";

// ============================================================================
// Performance tuning
// ============================================================================

/// Records buffered before a RecordBatch is handed to the Parquet writer.
pub(crate) const PARQUET_BATCH_SIZE: usize = 1024;

/// Default rows per Parquet row group.
pub const DEFAULT_ROW_GROUP_SIZE: usize = 4096;

/// Default maximum rows per data file.
pub const DEFAULT_MAX_ROWS_PER_FILE: usize = 100_000;

/// Default maximum bytes per data file (128 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 128 * 1024 * 1024;

/// Default fraction of the byte budget at which the size warning fires.
pub const DEFAULT_WARN_RATIO: f64 = 0.9;

/// Default gap under which neighbouring column-chunk ranges are fetched together.
pub const DEFAULT_COALESCE_GAP: u64 = 64 * 1024;
