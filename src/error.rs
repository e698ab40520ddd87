//! Unified error type for the wikicol library.
//!
//! Every failure mode of the store is captured here with enough context for a
//! caller to tell "not found" apart from "corrupt data" and to retry network
//! failures meaningfully.
//!
//! # Error Categories
//!
//! - **Network**: fetch failure, timeout, non-partial-content response
//! - **Format**: corrupt/truncated footer, offset out of bounds, schema mismatch
//! - **Lookup**: stale index referencing a file that no longer exists
//! - **Write**: file-limit exceeded, shredding violation
//! - **Merge**: duplicate or conflicting file entries, row-count mismatch
//!
//! Plain lookup misses are not errors; see [`crate::client::Lookup`].

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::ArticleType;

/// Unified error type for the wikicol library.
#[derive(Debug)]
pub enum StoreError {
    /// Local I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
    },

    /// Remote fetch failed (connection, server error, body read).
    Network {
        path: String,
        range: Option<Range<u64>>,
        detail: String,
    },

    /// A fetch exceeded its time budget.
    Timeout {
        path: String,
        range: Option<Range<u64>>,
        budget: Duration,
    },

    /// Server ignored the range request or returned a different span.
    NotPartialContent {
        path: String,
        range: Range<u64>,
        status: u16,
    },

    /// Remote object does not exist.
    NotFound { path: String },

    /// Invalid file format (magic bytes, version, truncated footer).
    Format { path: String, detail: String },

    /// A byte offset lies outside the file's declared length.
    OffsetOutOfBounds {
        path: String,
        range: Range<u64>,
        file_len: u64,
    },

    /// Decoded columns do not match what the caller expected.
    SchemaMismatch { path: String, detail: String },

    /// Index points at a data file that is gone.
    StaleIndex { path: String },

    /// A single record cannot fit into any file under the byte budget.
    FileLimitExceeded {
        article_type: ArticleType,
        record_id: String,
        limit: u64,
        actual: u64,
    },

    /// A sealed file came out larger than its byte budget.
    FileOverBudget {
        path: String,
        limit: u64,
        actual: u64,
    },

    /// Infobox value cannot be stored losslessly.
    Shredding(String),

    /// The same file entry appears twice across merged manifests.
    DuplicateFile { path: String },

    /// Same path, different statistics.
    ConflictingFile { path: String, detail: String },

    /// Declared count disagrees with the sum of file row counts.
    RowCountMismatch {
        article_type: ArticleType,
        declared: u64,
        actual: u64,
    },

    /// Validation error (invalid parameters, data invariants).
    Validation(String),

    /// Parquet/Arrow error.
    Parquet {
        context: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Encoding/decoding error for index artifacts and overflow blobs.
    Encoding(String),
}

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Network,
    Format,
    Lookup,
    Write,
    Merge,
    Validation,
}

fn fmt_range(range: &Option<Range<u64>>) -> String {
    match range {
        Some(r) => format!(" bytes {}..{}", r.start, r.end),
        None => String::new(),
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {} on '{}': {}",
                operation,
                path.display(),
                source
            ),
            StoreError::Network {
                path,
                range,
                detail,
            } => write!(
                f,
                "Network error fetching '{}'{}: {}",
                path,
                fmt_range(range),
                detail
            ),
            StoreError::Timeout {
                path,
                range,
                budget,
            } => write!(
                f,
                "Fetch of '{}'{} timed out after {:?}",
                path,
                fmt_range(range),
                budget
            ),
            StoreError::NotPartialContent {
                path,
                range,
                status,
            } => write!(
                f,
                "Server did not honor range {}..{} for '{}' (status {})",
                range.start, range.end, path, status
            ),
            StoreError::NotFound { path } => write!(f, "Remote object not found: '{}'", path),
            StoreError::Format { path, detail } => {
                write!(f, "Invalid format in '{}': {}", path, detail)
            }
            StoreError::OffsetOutOfBounds {
                path,
                range,
                file_len,
            } => write!(
                f,
                "Byte range {}..{} outside '{}' (length {})",
                range.start, range.end, path, file_len
            ),
            StoreError::SchemaMismatch { path, detail } => {
                write!(f, "Schema mismatch in '{}': {}", path, detail)
            }
            StoreError::StaleIndex { path } => {
                write!(f, "Index references missing data file '{}'", path)
            }
            StoreError::FileLimitExceeded {
                article_type,
                record_id,
                limit,
                actual,
            } => write!(
                f,
                "Record '{}' ({}) needs {} bytes, exceeding the file limit of {}",
                record_id, article_type, actual, limit
            ),
            StoreError::FileOverBudget {
                path,
                limit,
                actual,
            } => write!(
                f,
                "Sealed file '{}' is {} bytes, over its budget of {}",
                path, actual, limit
            ),
            StoreError::Shredding(msg) => write!(f, "Shredding error: {}", msg),
            StoreError::DuplicateFile { path } => {
                write!(f, "Duplicate manifest file entry '{}'", path)
            }
            StoreError::ConflictingFile { path, detail } => {
                write!(f, "Conflicting manifest entries for '{}': {}", path, detail)
            }
            StoreError::RowCountMismatch {
                article_type,
                declared,
                actual,
            } => write!(
                f,
                "Row count mismatch for {}: declared {}, files hold {}",
                article_type, declared, actual
            ),
            StoreError::Validation(msg) => write!(f, "Validation error: {}", msg),
            StoreError::Parquet { context, source } => {
                if let Some(src) = source {
                    write!(f, "Parquet error ({}): {}", context, src)
                } else {
                    write!(f, "Parquet error: {}", context)
                }
            }
            StoreError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Parquet {
                source: Some(s), ..
            } => Some(s.as_ref()),
            _ => None,
        }
    }
}

// ============================================================================
// Conversion traits
// ============================================================================

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: PathBuf::new(),
            operation: "unknown",
            source: err,
        }
    }
}

impl From<parquet::errors::ParquetError> for StoreError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        StoreError::Parquet {
            context: "parquet operation".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<arrow::error::ArrowError> for StoreError {
    fn from(err: arrow::error::ArrowError) -> Self {
        StoreError::Parquet {
            context: "arrow operation".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Convenience type alias for Results using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Helper constructors
// ============================================================================

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Create a network error.
    pub fn network(
        path: impl Into<String>,
        range: Option<Range<u64>>,
        detail: impl Into<String>,
    ) -> Self {
        StoreError::Network {
            path: path.into(),
            range,
            detail: detail.into(),
        }
    }

    /// Create a format error.
    pub fn format(path: impl Into<String>, detail: impl Into<String>) -> Self {
        StoreError::Format {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a schema mismatch error.
    pub fn schema(path: impl Into<String>, detail: impl Into<String>) -> Self {
        StoreError::SchemaMismatch {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    /// Create a Parquet error without source.
    pub fn parquet(context: impl Into<String>) -> Self {
        StoreError::Parquet {
            context: context.into(),
            source: None,
        }
    }

    /// Create an encoding error.
    pub fn encoding(msg: impl Into<String>) -> Self {
        StoreError::Encoding(msg.into())
    }

    /// Attach a file path to a bare parquet/arrow error.
    pub fn in_file(self, path: &str) -> Self {
        match self {
            StoreError::Parquet { context, source } => StoreError::Parquet {
                context: format!("{} in '{}'", context, path),
                source,
            },
            other => other,
        }
    }

    /// Classify into the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Io { .. } => ErrorKind::Io,
            StoreError::Network { .. }
            | StoreError::Timeout { .. }
            | StoreError::NotPartialContent { .. }
            | StoreError::NotFound { .. } => ErrorKind::Network,
            StoreError::Format { .. }
            | StoreError::OffsetOutOfBounds { .. }
            | StoreError::SchemaMismatch { .. }
            | StoreError::Parquet { .. }
            | StoreError::Encoding(_) => ErrorKind::Format,
            StoreError::StaleIndex { .. } => ErrorKind::Lookup,
            StoreError::FileLimitExceeded { .. }
            | StoreError::FileOverBudget { .. }
            | StoreError::Shredding(_) => ErrorKind::Write,
            StoreError::DuplicateFile { .. }
            | StoreError::ConflictingFile { .. }
            | StoreError::RowCountMismatch { .. } => ErrorKind::Merge,
            StoreError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Network { .. } | StoreError::Timeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = StoreError::io(
            "/data/person/part-00000.parquet",
            "read",
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/data/person/part-00000.parquet"));
        assert!(msg.contains("read"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_network_error_keeps_range() {
        let err = StoreError::network("person/part-00000.parquet", Some(10..20), "reset");
        let msg = err.to_string();
        assert!(msg.contains("bytes 10..20"));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_format_and_merge_are_not_retryable() {
        let fmt = StoreError::format("a.parquet", "bad magic");
        assert_eq!(fmt.kind(), ErrorKind::Format);
        assert!(!fmt.is_retryable());

        let dup = StoreError::DuplicateFile {
            path: "person/part-00000.parquet".to_string(),
        };
        assert_eq!(dup.kind(), ErrorKind::Merge);
        assert!(!dup.is_retryable());
    }

    #[test]
    fn test_file_limit_display() {
        let err = StoreError::FileLimitExceeded {
            article_type: ArticleType::Person,
            record_id: "Q42".to_string(),
            limit: 1000,
            actual: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("Q42"));
        assert!(msg.contains("person"));
        assert!(msg.contains("5000"));
        assert_eq!(err.kind(), ErrorKind::Write);
    }

    #[test]
    fn test_error_source_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err = StoreError::io("/path", "open", io_err);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: StoreError = io_err.into();

        match err {
            StoreError::Io { operation, .. } => assert_eq!(operation, "unknown"),
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_in_file_adds_context() {
        let err = StoreError::parquet("decode row group").in_file("place/part-00001.parquet");
        assert!(err.to_string().contains("place/part-00001.parquet"));
    }
}
