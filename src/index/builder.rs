//! Builds the index artifacts of one manifest snapshot and publishes them.
//!
//! Data files are read in parallel (one rayon task per file, row groups in
//! order within it) with only the `id` and `title` columns projected. Results
//! are then merged sequentially in manifest order, which makes "first
//! occurrence wins" for title collisions deterministic.

use arrow::array::StringArray;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

use super::artifacts::{encode_artifact, ArtifactKind};
use super::bloom::BloomFilter;
use super::normalize::normalize_title;
use super::tables::{
    IdEntry, IdIndex, RowLocation, TitleEntry, TitleIndex, TypeEntry, TypeFile, TypeManifest,
};
use crate::constants::{CURRENT_POINTER, PARQUET_BATCH_SIZE};
use crate::error::{Result, StoreError};
use crate::store::schema::columns;
use crate::store::{EdgeCatalog, Manifest, ManifestFile};
use crate::types::ArticleType;

/// Configuration for index builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexBuildOptions {
    /// Target bloom filter false-positive rate. Default: 0.01.
    pub bloom_fp_rate: f64,

    /// Gzip artifact payloads. Default: true.
    pub compress: bool,

    /// Worker threads for reading data files; 0 uses the rayon default.
    pub threads: usize,
}

impl Default for IndexBuildOptions {
    fn default() -> Self {
        Self {
            bloom_fp_rate: 0.01,
            compress: true,
            threads: 0,
        }
    }
}

impl IndexBuildOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.bloom_fp_rate > 0.0 && self.bloom_fp_rate < 1.0) {
            return Err(StoreError::validation(format!(
                "bloom_fp_rate must be in (0, 1), got {}",
                self.bloom_fp_rate
            )));
        }
        Ok(())
    }
}

/// Every artifact derived from one manifest snapshot.
#[derive(Debug, Clone)]
pub struct IndexSet {
    pub snapshot_id: String,
    pub titles: TitleIndex,
    pub ids: IdIndex,
    pub types: TypeManifest,
    pub bloom: BloomFilter,
    pub edges: Option<EdgeCatalog>,
}

/// Deterministic snapshot id of a manifest and the edge catalog published
/// with it.
pub fn snapshot_id(manifest: &Manifest, edges: Option<&EdgeCatalog>) -> Result<String> {
    let mut text = toml::to_string(manifest)
        .map_err(|e| StoreError::encoding(format!("serialize manifest: {}", e)))?;
    if let Some(edges) = edges {
        text.push_str("\n[edges]\n");
        text.push_str(
            &toml::to_string(edges)
                .map_err(|e| StoreError::encoding(format!("serialize edge catalog: {}", e)))?,
        );
    }
    Ok(format!("{:016x}", xxh3_64(text.as_bytes())))
}

/// Keys read from one data file.
struct FileKeys {
    row_groups: Vec<u64>,
    /// `(id, title, row_group, row)` in file order.
    rows: Vec<(String, String, u32, u32)>,
}

fn string_column<'a>(
    batch: &'a arrow::record_batch::RecordBatch,
    name: &str,
    path: &str,
) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::schema(path, format!("expected Utf8 column '{}'", name)))
}

fn read_keys(root: &Path, path: &str) -> Result<FileKeys> {
    let abs = root.join(path);
    let buffer = fs::read(&abs).map_err(|e| StoreError::io(abs.clone(), "read data file", e))?;
    let bytes = Bytes::from(buffer);

    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
        .map_err(|e| StoreError::from(e).in_file(path))?;
    let metadata = builder.metadata().clone();
    let schema = builder.schema().clone();
    let projection: Vec<usize> = [columns::ID, columns::TITLE]
        .iter()
        .map(|name| {
            schema
                .index_of(name)
                .map_err(|_| StoreError::schema(path, format!("missing column '{}'", name)))
        })
        .collect::<Result<_>>()?;

    let row_groups: Vec<u64> = metadata
        .row_groups()
        .iter()
        .map(|rg| rg.num_rows() as u64)
        .collect();
    let mut rows = Vec::new();

    for rg_idx in 0..row_groups.len() {
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), projection.iter().copied());
        let reader = builder
            .with_projection(mask)
            .with_row_groups(vec![rg_idx])
            .with_batch_size(PARQUET_BATCH_SIZE)
            .build()?;

        let mut row = 0u32;
        for batch in reader {
            let batch = batch?;
            let ids = string_column(&batch, columns::ID, path)?;
            let titles = string_column(&batch, columns::TITLE, path)?;
            for i in 0..batch.num_rows() {
                rows.push((
                    ids.value(i).to_string(),
                    titles.value(i).to_string(),
                    rg_idx as u32,
                    row,
                ));
                row += 1;
            }
        }
    }

    Ok(FileKeys { row_groups, rows })
}

/// Builds an [`IndexSet`] from a store root and its manifest.
pub struct IndexBuilder {
    root: PathBuf,
    options: IndexBuildOptions,
}

impl IndexBuilder {
    pub fn new(root: &Path, options: IndexBuildOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            root: root.to_path_buf(),
            options,
        })
    }

    pub fn options(&self) -> &IndexBuildOptions {
        &self.options
    }

    fn read_all(&self, files: &[(ArticleType, &ManifestFile)]) -> Result<Vec<FileKeys>> {
        let run = || {
            files
                .par_iter()
                .map(|(_, file)| read_keys(&self.root, &file.path))
                .collect::<Result<Vec<_>>>()
        };
        if self.options.threads == 0 {
            return run();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads)
            .build()
            .map_err(|e| StoreError::validation(format!("build thread pool: {}", e)))?;
        pool.install(run)
    }

    /// Build all artifacts from one manifest snapshot.
    pub fn build(&self, manifest: &Manifest) -> Result<IndexSet> {
        manifest.validate()?;
        let edges = EdgeCatalog::load(&self.root)?;
        let snapshot_id = snapshot_id(manifest, edges.as_ref())?;
        let files: Vec<(ArticleType, &ManifestFile)> = manifest.files().collect();
        log::info!(
            "Building index snapshot {} from {} files ({} rows)",
            snapshot_id,
            files.len(),
            manifest.total_count()
        );

        let keys = self.read_all(&files)?;

        let file_table: Vec<String> = files.iter().map(|(_, f)| f.path.clone()).collect();
        let mut title_entries: Vec<TitleEntry> = Vec::new();
        let mut title_slots: HashSet<String> = HashSet::new();
        let mut id_entries: Vec<IdEntry> = Vec::with_capacity(manifest.total_count() as usize);
        let mut id_seen: HashMap<String, &str> = HashMap::new();
        let mut collisions = 0usize;
        let mut type_files: Vec<(ArticleType, TypeFile)> = Vec::with_capacity(files.len());

        for (file_idx, ((article_type, file), file_keys)) in files.iter().zip(&keys).enumerate() {
            let actual = file_keys.rows.len() as u64;
            if actual != file.row_count {
                return Err(StoreError::RowCountMismatch {
                    article_type: *article_type,
                    declared: file.row_count,
                    actual,
                });
            }

            for (id, title, row_group, row) in &file_keys.rows {
                let location = RowLocation {
                    file: file_idx as u32,
                    row_group: *row_group,
                    row: *row,
                };
                if let Some(prev) = id_seen.insert(id.clone(), file.path.as_str()) {
                    return Err(StoreError::validation(format!(
                        "duplicate article id '{}' in '{}' (first seen in '{}')",
                        id, file.path, prev
                    )));
                }
                id_entries.push(IdEntry {
                    id: id.clone(),
                    location,
                });

                let key = normalize_title(title);
                if title_slots.contains(&key) {
                    collisions += 1;
                    log::debug!("Title collision on '{}': keeping first occurrence", key);
                    continue;
                }
                title_slots.insert(key.clone());
                title_entries.push(TitleEntry {
                    key,
                    title: title.clone(),
                    id: id.clone(),
                    location,
                });
            }

            type_files.push((
                *article_type,
                TypeFile {
                    path: file.path.clone(),
                    row_count: file.row_count,
                    byte_size: file.byte_size,
                    row_groups: file_keys.row_groups.clone(),
                },
            ));
        }
        if collisions > 0 {
            log::warn!(
                "{} titles collided after normalization; first occurrence kept",
                collisions
            );
        }

        let mut bloom = BloomFilter::with_rate(title_entries.len(), self.options.bloom_fp_rate)?;
        for entry in &title_entries {
            bloom.insert(&entry.key);
        }

        let types = TypeManifest {
            types: manifest
                .partitions
                .iter()
                .map(|p| TypeEntry {
                    article_type: p.article_type,
                    count: p.count,
                    files: type_files
                        .iter()
                        .filter(|(t, _)| *t == p.article_type)
                        .map(|(_, f)| f.clone())
                        .collect(),
                })
                .collect(),
        };

        let titles = TitleIndex::new(file_table.clone(), title_entries);
        let ids = IdIndex::new(file_table, id_entries);
        log::info!(
            "Index built: {} titles, {} ids, bloom {} bits / {} hashes{}",
            titles.len(),
            ids.len(),
            bloom.bit_count(),
            bloom.hash_count(),
            if edges.is_some() { ", with edge catalog" } else { "" }
        );

        Ok(IndexSet {
            snapshot_id,
            titles,
            ids,
            types,
            bloom,
            edges,
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| StoreError::io(tmp.clone(), "write artifact", e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path.to_path_buf(), "publish artifact", e))
}

impl IndexSet {
    /// Write artifacts to `<root>/<snapshot_id>/` and then point
    /// `<root>/CURRENT` at the snapshot. Readers see either the old or the new
    /// snapshot, never a mix.
    pub fn publish(&self, root: &Path, compress: bool) -> Result<PathBuf> {
        let dir = root.join(&self.snapshot_id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir.clone(), "create snapshot dir", e))?;

        let mut blobs = vec![
            (
                ArtifactKind::TitleIndex,
                encode_artifact(ArtifactKind::TitleIndex, &self.titles, compress)?,
            ),
            (
                ArtifactKind::IdIndex,
                encode_artifact(ArtifactKind::IdIndex, &self.ids, compress)?,
            ),
            (
                ArtifactKind::TypeManifest,
                encode_artifact(ArtifactKind::TypeManifest, &self.types, compress)?,
            ),
            (
                ArtifactKind::Bloom,
                encode_artifact(ArtifactKind::Bloom, &self.bloom, compress)?,
            ),
        ];
        if let Some(edges) = &self.edges {
            blobs.push((
                ArtifactKind::EdgeCatalog,
                encode_artifact(ArtifactKind::EdgeCatalog, edges, compress)?,
            ));
        }
        for (kind, blob) in &blobs {
            write_atomic(&dir.join(kind.file_name()), blob)?;
        }

        write_atomic(&root.join(CURRENT_POINTER), self.snapshot_id.as_bytes())?;
        log::info!(
            "Published index snapshot {} to {}",
            self.snapshot_id,
            dir.display()
        );
        Ok(dir)
    }
}

/// Build from `<root>/manifest.toml` and publish into `<root>`.
pub fn build_and_publish(root: &Path, options: IndexBuildOptions) -> Result<IndexSet> {
    let manifest = Manifest::load(root)?;
    let builder = IndexBuilder::new(root, options)?;
    let index = builder.build(&manifest)?;
    index.publish(root, builder.options().compress)?;
    Ok(index)
}
