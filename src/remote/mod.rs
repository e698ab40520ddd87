//! Remote access to store files: byte-range transport, footer parsing and
//! row reconstruction.

pub mod fetch;
pub mod footer;
pub mod reader;
pub mod row;

pub use fetch::{HttpFetcher, LocalFetcher, ObjectFetch, RangeFetcher};
pub use footer::{ColumnChunkInfo, FileLayout, ParsedFooter, RowGroupInfo, SchemaElement};
pub use reader::{coalesce_ranges, RangeReader, ReaderOptions, SparseChunks};
pub use row::{rows_from_batch, Row, Value};
