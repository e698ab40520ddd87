//! Manifest describing the sealed data files of a store.
//!
//! Stored as TOML for human readability:
//!
//! ```text
//! magic = "WIKICOL_MANIFEST_V1"
//! format_version = 1
//!
//! [[partitions]]
//! article_type = "person"
//! count = 1000
//!
//! [[partitions.files]]
//! path = "person/part-00000.parquet"
//! row_count = 300
//! byte_size = 48211
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use super::files;
use crate::constants::{MANIFEST_MAGIC, MANIFEST_VERSION};
use crate::error::{Result, StoreError};
use crate::types::ArticleType;

/// One sealed data file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the store root, `/`-separated.
    pub path: String,
    pub row_count: u64,
    pub byte_size: u64,
}

/// All files holding one article type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePartition {
    pub article_type: ArticleType,
    /// Declared number of rows of this type.
    pub count: u64,
    pub files: Vec<ManifestFile>,
}

impl TypePartition {
    fn row_sum(&self) -> u64 {
        self.files.iter().map(|f| f.row_count).sum()
    }
}

/// Catalog mapping each type partition to its sealed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Magic string for format identification.
    pub magic: String,

    /// Format version for compatibility checking.
    pub format_version: u32,

    /// Partitions in [`ArticleType::ALL`] order; empty types are omitted.
    #[serde(default)]
    pub partitions: Vec<TypePartition>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            magic: MANIFEST_MAGIC.to_string(),
            format_version: MANIFEST_VERSION,
            partitions: Vec::new(),
        }
    }

    /// Partition for a type, if any file of that type exists.
    pub fn partition(&self, article_type: ArticleType) -> Option<&TypePartition> {
        self.partitions
            .iter()
            .find(|p| p.article_type == article_type)
    }

    /// Declared row count for a type (0 when absent).
    pub fn count(&self, article_type: ArticleType) -> u64 {
        self.partition(article_type).map_or(0, |p| p.count)
    }

    /// Total declared rows over all types.
    pub fn total_count(&self) -> u64 {
        self.partitions.iter().map(|p| p.count).sum()
    }

    /// Iterate `(type, file)` in partition order.
    pub fn files(&self) -> impl Iterator<Item = (ArticleType, &ManifestFile)> {
        self.partitions
            .iter()
            .flat_map(|p| p.files.iter().map(move |f| (p.article_type, f)))
    }

    /// Append a sealed file. Files are never revised once added.
    pub fn add_file(&mut self, article_type: ArticleType, file: ManifestFile) {
        let idx = match self
            .partitions
            .iter()
            .position(|p| p.article_type == article_type)
        {
            Some(idx) => idx,
            None => {
                self.partitions.push(TypePartition {
                    article_type,
                    count: 0,
                    files: Vec::new(),
                });
                self.partitions.sort_by_key(|p| p.article_type);
                self.partitions
                    .iter()
                    .position(|p| p.article_type == article_type)
                    .unwrap_or(0)
            }
        };
        let partition = &mut self.partitions[idx];
        partition.count += file.row_count;
        partition.files.push(file);
    }

    /// Check the per-type count invariant and path uniqueness.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, &ManifestFile> = HashMap::new();
        let mut types: HashSet<ArticleType> = HashSet::new();
        for partition in &self.partitions {
            if !types.insert(partition.article_type) {
                return Err(StoreError::validation(format!(
                    "type {} is listed under more than one partition",
                    partition.article_type
                )));
            }
            let actual = partition.row_sum();
            if actual != partition.count {
                return Err(StoreError::RowCountMismatch {
                    article_type: partition.article_type,
                    declared: partition.count,
                    actual,
                });
            }
            for file in &partition.files {
                if let Some(prev) = seen.insert(file.path.as_str(), file) {
                    return Err(duplicate_or_conflict(prev, file));
                }
            }
        }
        Ok(())
    }

    /// Save manifest to the store root.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(files::MANIFEST);
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| StoreError::encoding(format!("serialize manifest: {}", e)))?;
        let tmp = root.join(format!("{}.tmp", files::MANIFEST));
        fs::write(&tmp, toml_str).map_err(|e| StoreError::io(tmp.clone(), "write manifest", e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(path.clone(), "publish manifest", e))?;
        Ok(())
    }

    /// Load manifest from the store root.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(files::MANIFEST);
        let toml_str =
            fs::read_to_string(&path).map_err(|e| StoreError::io(path.clone(), "read manifest", e))?;
        Self::from_toml(&toml_str, &path.display().to_string())
    }

    /// Parse and validate manifest text.
    pub fn from_toml(text: &str, origin: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(text)
            .map_err(|e| StoreError::format(origin, format!("parse manifest: {}", e)))?;

        if manifest.magic != MANIFEST_MAGIC {
            return Err(StoreError::format(
                origin,
                format!(
                    "invalid manifest magic: expected '{}', got '{}'",
                    MANIFEST_MAGIC, manifest.magic
                ),
            ));
        }
        if manifest.format_version > MANIFEST_VERSION {
            return Err(StoreError::format(
                origin,
                format!(
                    "unsupported format version: {} (max supported: {})",
                    manifest.format_version, MANIFEST_VERSION
                ),
            ));
        }
        manifest.validate()?;
        Ok(manifest)
    }
}

fn duplicate_or_conflict(prev: &ManifestFile, file: &ManifestFile) -> StoreError {
    if prev == file {
        StoreError::DuplicateFile {
            path: file.path.clone(),
        }
    } else {
        StoreError::ConflictingFile {
            path: file.path.clone(),
            detail: format!(
                "({} rows, {} bytes) vs ({} rows, {} bytes)",
                prev.row_count, prev.byte_size, file.row_count, file.byte_size
            ),
        }
    }
}

/// Combine manifests from independent writer runs into one.
///
/// Every input must satisfy its own count invariant. A file path may appear
/// only once across all inputs: an exact repeat is [`StoreError::DuplicateFile`],
/// a repeat with different statistics is [`StoreError::ConflictingFile`].
/// Files within a type are ordered by path, so the result does not depend on
/// input order.
pub fn merge_manifests(manifests: &[Manifest]) -> Result<Manifest> {
    let mut by_type: BTreeMap<ArticleType, Vec<ManifestFile>> = BTreeMap::new();
    let mut seen: HashMap<String, ManifestFile> = HashMap::new();

    for manifest in manifests {
        manifest.validate()?;
        for (article_type, file) in manifest.files() {
            if let Some(prev) = seen.get(&file.path) {
                return Err(duplicate_or_conflict(prev, file));
            }
            seen.insert(file.path.clone(), file.clone());
            by_type.entry(article_type).or_default().push(file.clone());
        }
    }

    let mut merged = Manifest::new();
    for (article_type, mut files) in by_type {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let count = files.iter().map(|f| f.row_count).sum();
        merged.partitions.push(TypePartition {
            article_type,
            count,
            files,
        });
    }

    log::info!(
        "Merged {} manifests: {} files, {} rows",
        manifests.len(),
        seen.len(),
        merged.total_count()
    );
    Ok(merged)
}
