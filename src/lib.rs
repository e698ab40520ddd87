//! wikicol: a type-partitioned encyclopedia store in Parquet, with a query
//! client that answers lookups through byte-range reads.
//!
//! # Pipeline
//!
//! 1. [`store::PartitionedWriter`] shards articles by type into size-bounded
//!    Parquet files and records them in a [`store::Manifest`].
//! 2. [`store::RelationshipWriter`] derives forward and reverse edges.
//! 3. [`index::IndexBuilder`] builds the title index, id index, type manifest
//!    and bloom filter, and publishes them as a snapshot.
//! 4. [`client::QueryClient`] loads the snapshot and reads single rows or row
//!    groups through [`remote::RangeReader`].

pub mod cache;
pub mod client;
pub mod constants;
pub mod error;
pub mod index;
pub mod logging;
pub mod remote;
pub mod store;
pub mod types;

pub use client::{ClientOptions, Lookup, MissReason, QueryClient, SimilarityHit, SimilarityService};
pub use error::{ErrorKind, Result, StoreError};
pub use index::{build_and_publish, normalize_title, IndexBuildOptions, IndexBuilder, IndexSet};
pub use remote::{HttpFetcher, LocalFetcher, RangeFetcher, RangeReader, ReaderOptions, Row, Value};
pub use store::{
    ingest_corpus, merge_manifests, Direction, IngestItem, Manifest, ManifestFile,
    PartitionedWriter, Relationship, RelationshipOptions, WriterOptions,
};
pub use types::{Article, ArticleRecord, ArticleType, Coords, Infobox, InfoboxValue, RowPointer};
