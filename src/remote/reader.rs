//! Range-read Parquet reader.
//!
//! Reconstructs single rows (or whole row groups) from a remote file without
//! downloading it:
//!
//! 1. fetch a trailing prefetch window and validate the `PAR1` trailer
//! 2. fetch the rest of the footer only if the window did not cover it
//! 3. compute the byte spans of the needed column chunks, coalesce
//!    neighbours, fetch them concurrently
//! 4. decode through [`SparseChunks`], which serves only the fetched spans
//!
//! Footers are cached per reader with a TTL.

use arrow::compute::concat_batches;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use bytes::{Buf, Bytes};
use futures::future::try_join_all;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReaderBuilder, RowSelection, RowSelector};
use parquet::arrow::ProjectionMask;
use parquet::errors::ParquetError;
use parquet::file::reader::{ChunkReader, Length};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::fetch::{HttpFetcher, LocalFetcher, RangeFetcher};
use super::footer::{metadata_len, ParsedFooter};
use super::row::{rows_from_batch, Row};
use crate::cache::TtlCache;
use crate::constants::{DEFAULT_COALESCE_GAP, DEFAULT_FOOTER_PREFETCH, FOOTER_TAIL_LEN};
use crate::error::{Result, StoreError};

/// Reader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Trailing bytes fetched on first contact. Default: 64 KiB.
    pub footer_prefetch: u64,

    /// Column chunk ranges closer than this are fetched as one. Default: 64 KiB.
    pub coalesce_gap: u64,

    /// Budget for each individual fetch. Default: 30 s.
    pub timeout: Duration,

    /// How long a parsed footer stays valid. Default: 10 min.
    pub footer_ttl: Duration,

    /// Footers kept per reader. Default: 256.
    pub footer_cache_capacity: usize,

    /// For HTTP: slice the full body when a server ignores `Range`.
    /// Default: false (fail with `NotPartialContent`).
    pub allow_full_fetch_fallback: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            footer_prefetch: DEFAULT_FOOTER_PREFETCH,
            coalesce_gap: DEFAULT_COALESCE_GAP,
            timeout: Duration::from_secs(30),
            footer_ttl: Duration::from_secs(600),
            footer_cache_capacity: 256,
            allow_full_fetch_fallback: false,
        }
    }
}

impl ReaderOptions {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(StoreError::validation("reader timeout must be > 0"));
        }
        Ok(())
    }
}

/// Merge ranges whose gap is at most `max_gap`. Output is sorted.
pub fn coalesce_ranges(ranges: &[Range<u64>], max_gap: u64) -> Vec<Range<u64>> {
    let mut sorted: Vec<Range<u64>> = ranges.iter().filter(|r| r.start < r.end).cloned().collect();
    sorted.sort_by_key(|r| r.start);

    let mut out: Vec<Range<u64>> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match out.last_mut() {
            Some(last) if range.start <= last.end.saturating_add(max_gap) => {
                last.end = last.end.max(range.end);
            }
            _ => out.push(range),
        }
    }
    out
}

/// A [`ChunkReader`] over the fetched spans of one file.
///
/// Any read outside the spans is an error rather than a silent fetch, so a
/// decode that needs more bytes than were planned fails loudly.
pub struct SparseChunks {
    file_len: u64,
    /// `(offset, bytes)` sorted by offset, non-overlapping.
    spans: Vec<(u64, Bytes)>,
}

impl SparseChunks {
    pub fn new(file_len: u64, mut spans: Vec<(u64, Bytes)>) -> Self {
        spans.sort_by_key(|(start, _)| *start);
        Self { file_len, spans }
    }

    fn span(&self, start: u64, len: u64) -> parquet::errors::Result<&(u64, Bytes)> {
        let idx = self.spans.partition_point(|(s, _)| *s <= start);
        idx.checked_sub(1)
            .map(|i| &self.spans[i])
            .filter(|(s, b)| start + len <= s + b.len() as u64)
            .ok_or_else(|| {
                ParquetError::General(format!(
                    "bytes {}..{} were not fetched",
                    start,
                    start + len
                ))
            })
    }
}

impl Length for SparseChunks {
    fn len(&self) -> u64 {
        self.file_len
    }
}

impl ChunkReader for SparseChunks {
    type T = bytes::buf::Reader<Bytes>;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        let (offset, bytes) = self.span(start, 0)?;
        Ok(bytes.slice((start - offset) as usize..).reader())
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        let (offset, bytes) = self.span(start, length as u64)?;
        let from = (start - offset) as usize;
        Ok(bytes.slice(from..from + length))
    }
}

/// Reads rows of remote Parquet files through a [`RangeFetcher`].
pub struct RangeReader {
    fetcher: Arc<dyn RangeFetcher>,
    options: ReaderOptions,
    footers: TtlCache<String, ParsedFooter>,
}

impl RangeReader {
    pub fn new(fetcher: Arc<dyn RangeFetcher>, options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        let footers = TtlCache::new(options.footer_cache_capacity, options.footer_ttl);
        Ok(Self {
            fetcher,
            options,
            footers,
        })
    }

    /// Reader over an HTTP base URL.
    pub fn http(base_url: impl Into<String>, options: ReaderOptions) -> Result<Self> {
        let fetcher = HttpFetcher::new(base_url)
            .with_full_fetch_fallback(options.allow_full_fetch_fallback);
        Self::new(Arc::new(fetcher), options)
    }

    /// Reader over a local store directory.
    pub fn local(root: impl Into<PathBuf>, options: ReaderOptions) -> Result<Self> {
        Self::new(Arc::new(LocalFetcher::new(root)), options)
    }

    pub fn fetcher(&self) -> &Arc<dyn RangeFetcher> {
        &self.fetcher
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    async fn timed<T, F>(&self, path: &str, range: Option<Range<u64>>, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.options.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                path: path.to_string(),
                range,
                budget: self.options.timeout,
            }),
        }
    }

    async fn fetch(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        self.timed(
            path,
            Some(range.clone()),
            self.fetcher.fetch_range(path, range),
        )
        .await
    }

    async fn load_footer(&self, path: &str) -> Result<ParsedFooter> {
        let prefetch = self.options.footer_prefetch.max(FOOTER_TAIL_LEN);
        let (tail, file_len) = self
            .timed(path, None, self.fetcher.fetch_suffix(path, prefetch))
            .await?;
        if (tail.len() as u64) < FOOTER_TAIL_LEN {
            return Err(StoreError::format(
                path,
                format!("file of {} bytes has no footer", file_len),
            ));
        }

        let trailer_at = tail.len() - FOOTER_TAIL_LEN as usize;
        let meta_len = metadata_len(path, &tail[trailer_at..], file_len)?;
        let metadata = if meta_len <= trailer_at as u64 {
            tail.slice(trailer_at - meta_len as usize..trailer_at)
        } else {
            let end = file_len - FOOTER_TAIL_LEN;
            log::debug!(
                "Footer of {} is {} bytes, larger than the {} byte prefetch",
                path,
                meta_len,
                prefetch
            );
            self.fetch(path, end - meta_len..end).await?
        };

        let footer = ParsedFooter::decode(path, &metadata, file_len)?;
        log::debug!(
            "Parsed footer of {}: {} rows in {} row groups",
            path,
            footer.layout.num_rows,
            footer.layout.row_groups.len()
        );
        Ok(footer)
    }

    /// Parsed footer of `path`, cached.
    pub async fn footer(&self, path: &str) -> Result<Arc<ParsedFooter>> {
        self.footers
            .get_or_try_load(path.to_string(), || self.load_footer(path))
            .await
    }

    /// Drop a cached footer, e.g. after the file was replaced.
    pub fn forget(&self, path: &str) {
        self.footers.invalidate(&path.to_string());
    }

    async fn decode(
        &self,
        path: &str,
        footer: &ParsedFooter,
        row_group: usize,
        columns: &[usize],
        selection: Option<RowSelection>,
    ) -> Result<RecordBatch> {
        let layout = &footer.layout;
        let group = layout.row_groups.get(row_group).ok_or_else(|| {
            StoreError::format(
                path,
                format!(
                    "row group {} out of range ({} groups)",
                    row_group,
                    layout.row_groups.len()
                ),
            )
        })?;

        let ranges: Vec<Range<u64>> = columns
            .iter()
            .map(|&c| group.columns[c].range.clone())
            .collect();
        let fetch_plan = coalesce_ranges(&ranges, self.options.coalesce_gap);
        log::debug!(
            "{} rg {}: {} column chunks in {} requests",
            path,
            row_group,
            ranges.len(),
            fetch_plan.len()
        );

        let fetched = try_join_all(fetch_plan.iter().map(|r| self.fetch(path, r.clone()))).await?;
        let spans = fetch_plan
            .iter()
            .map(|r| r.start)
            .zip(fetched)
            .collect();
        let chunks = SparseChunks::new(layout.file_len, spans);

        let mask = ProjectionMask::leaves(
            footer.metadata.file_metadata().schema_descr(),
            columns.iter().copied(),
        );
        let mut builder =
            ParquetRecordBatchReaderBuilder::new_with_metadata(chunks, footer.arrow.clone())
                .with_row_groups(vec![row_group])
                .with_projection(mask)
                .with_batch_size(group.num_rows.max(1) as usize);
        if let Some(selection) = selection {
            builder = builder.with_row_selection(selection);
        }
        let reader = builder
            .build()
            .map_err(|e| StoreError::from(e).in_file(path))?;
        let schema = reader.schema();
        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StoreError::from(e).in_file(path))?;
        Ok(concat_batches(&schema, &batches)?)
    }

    /// Read one row. `columns` projects by name; `None` reads the full row.
    pub async fn read_row(
        &self,
        path: &str,
        row_group: usize,
        row: usize,
        columns: Option<&[&str]>,
    ) -> Result<Row> {
        let footer = self.footer(path).await?;
        let num_rows = footer
            .layout
            .row_groups
            .get(row_group)
            .map_or(0, |g| g.num_rows as usize);
        if row >= num_rows {
            return Err(StoreError::format(
                path,
                format!(
                    "row {} out of range in row group {} ({} rows)",
                    row, row_group, num_rows
                ),
            ));
        }
        let projection = footer.projection(path, columns)?;

        let mut selectors = Vec::with_capacity(2);
        if row > 0 {
            selectors.push(RowSelector::skip(row));
        }
        selectors.push(RowSelector::select(1));
        let batch = self
            .decode(
                path,
                &footer,
                row_group,
                &projection,
                Some(RowSelection::from(selectors)),
            )
            .await?;

        rows_from_batch(path, &batch)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::format(path, format!("row {} decoded empty", row)))
    }

    /// Decode the rows of one row group picked by `selection`.
    pub async fn read_selection(
        &self,
        path: &str,
        row_group: usize,
        selection: RowSelection,
        columns: Option<&[&str]>,
    ) -> Result<RecordBatch> {
        let footer = self.footer(path).await?;
        let projection = footer.projection(path, columns)?;
        self.decode(path, &footer, row_group, &projection, Some(selection))
            .await
    }

    /// Decode a whole row group.
    pub async fn read_row_group(
        &self,
        path: &str,
        row_group: usize,
        columns: Option<&[&str]>,
    ) -> Result<RecordBatch> {
        let footer = self.footer(path).await?;
        let projection = footer.projection(path, columns)?;
        self.decode(path, &footer, row_group, &projection, None).await
    }
}
