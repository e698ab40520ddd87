//! On-disk store: partitioned article files, relationship partitions and the
//! manifest.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── manifest.toml
//! ├── person/part-00000.parquet
//! ├── person/part-00001.parquet
//! ├── place/part-00000.parquet
//! └── relationships/
//!     ├── catalog.toml
//!     ├── forward/edges-00000.parquet
//!     └── reverse/edges-00000.parquet
//! ```
//!
//! All paths recorded in manifests and indexes are relative to the root and
//! `/`-separated, so the same tree can be served over HTTP unchanged.

pub mod manifest;
pub mod options;
pub mod relationships;
pub mod schema;
pub mod shred;
pub mod writer;

use std::path::Path;

pub use manifest::{merge_manifests, Manifest, ManifestFile, TypePartition};
pub use options::{ParquetCompression, ParquetWriteOptions, ShreddingPolicy, Thresholds, WriterOptions};
pub use relationships::{
    Direction, EdgeCatalog, EdgeFile, LinkCandidate, Predicate, ReconciledEdges, Relationship,
    RelationshipOptions, RelationshipWriter, TitleResolver,
};
pub use shred::{ShreddedColumn, ShreddedInfobox, ShreddingPlan};
pub use writer::{PartitionedWriter, SizeWarning, SizeWarningCallback, WriteOutcome, WriteResult};

use crate::error::Result;
use crate::index::{IndexBuildOptions, IndexBuilder};
use crate::types::ArticleRecord;

/// File naming shared by writers, the index builder and the client.
pub mod files {
    /// Manifest file name at the store root.
    pub const MANIFEST: &str = "manifest.toml";

    /// Directory holding relationship partitions.
    pub const RELATIONSHIPS_DIR: &str = "relationships";

    /// Edge catalog path relative to the store root.
    pub const EDGE_CATALOG: &str = "relationships/catalog.toml";

    /// Data file name for a writer prefix and sequence number.
    pub fn data_file(prefix: &str, seq: u32) -> String {
        format!("{}-{:05}.parquet", prefix, seq)
    }
}

/// One ingested record with the raw link candidates the parser found in it.
#[derive(Debug, Clone)]
pub struct IngestItem {
    pub record: ArticleRecord,
    pub links: Vec<LinkCandidate>,
}

impl From<ArticleRecord> for IngestItem {
    fn from(record: ArticleRecord) -> Self {
        Self {
            record,
            links: Vec::new(),
        }
    }
}

/// Result of a full ingestion pass.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub write: WriteOutcome,
    pub edges: EdgeCatalog,
    /// Forward edges whose target never resolved.
    pub unresolved_edges: usize,
}

/// Write articles and their relationship partitions in one pass.
///
/// Edge targets are resolved against the title index of the written
/// manifest, so an edge to a colliding title points at the same article a
/// title lookup returns. Targets not seen anywhere in the stream stay
/// unresolved.
pub fn ingest_corpus<I>(
    root: &Path,
    items: I,
    writer_options: WriterOptions,
    relationship_options: &RelationshipOptions,
) -> Result<IngestOutcome>
where
    I: IntoIterator<Item = IngestItem>,
{
    relationship_options.parquet.validate()?;
    let mut writer = PartitionedWriter::create(root, writer_options)?;
    let mut edges = RelationshipWriter::new();

    for item in items {
        edges.add(&item.record, &item.links);
        writer.write(item.record)?;
    }
    let write = writer.finish()?;

    let titles = IndexBuilder::new(root, IndexBuildOptions::default())?
        .build(&write.manifest)?
        .titles;
    let reconciled = edges.reconcile(&titles);
    let unresolved_edges = reconciled.unresolved;
    let catalog =
        relationships::write_relationship_partitions(root, &reconciled, relationship_options)?;

    Ok(IngestOutcome {
        write,
        edges: catalog,
        unresolved_edges,
    })
}
