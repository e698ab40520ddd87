//! Lookup indexes over a store snapshot.
//!
//! The builder reads every data file named by a manifest once and produces
//! four small artifacts (plus the edge catalog when relationships exist):
//!
//! - title index: normalized title -> display title, id and row location
//! - id index: article id -> row location
//! - type manifest: type -> count and files (with row group sizes)
//! - bloom filter over normalized titles
//!
//! Artifacts are published under `<root>/<snapshot_id>/` and activated by
//! rewriting `<root>/CURRENT`.

pub mod artifacts;
pub mod bloom;
pub mod builder;
pub mod normalize;
pub mod tables;

pub use artifacts::{decode_artifact, encode_artifact, ArtifactKind};
pub use bloom::BloomFilter;
pub use builder::{build_and_publish, snapshot_id, IndexBuildOptions, IndexBuilder, IndexSet};
pub use normalize::normalize_title;
pub use tables::{
    IdEntry, IdIndex, RowLocation, TitleEntry, TitleIndex, TypeEntry, TypeFile, TypeManifest,
};
