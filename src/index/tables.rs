//! In-memory index tables: title index, ID index and type manifest.
//!
//! Both lookup tables keep a shared file table and refer to files by position,
//! so a multi-million entry index does not repeat every path string.

use serde::{Deserialize, Serialize};

use crate::store::relationships::TitleResolver;
use crate::store::ManifestFile;
use crate::types::{ArticleType, RowPointer};

/// Row address relative to a file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowLocation {
    pub file: u32,
    pub row_group: u32,
    pub row: u32,
}

fn pointer(files: &[String], location: RowLocation) -> Option<RowPointer> {
    files.get(location.file as usize).map(|path| RowPointer {
        path: path.clone(),
        row_group: location.row_group,
        row: location.row,
    })
}

/// One title index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleEntry {
    /// Normalized title (the lookup key).
    pub key: String,
    /// Title as written.
    pub title: String,
    pub id: String,
    pub location: RowLocation,
}

/// Normalized title -> location. One entry per key, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleIndex {
    files: Vec<String>,
    entries: Vec<TitleEntry>,
}

impl TitleIndex {
    /// Entries must be unique by key; they are sorted here.
    pub fn new(files: Vec<String>, mut entries: Vec<TitleEntry>) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Self { files, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn get(&self, key: &str) -> Option<&TitleEntry> {
        self.entries
            .binary_search_by(|e| e.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Contiguous run of entries whose key starts with `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> &[TitleEntry] {
        let start = self.entries.partition_point(|e| e.key.as_str() < prefix);
        let len = self.entries[start..].partition_point(|e| e.key.starts_with(prefix));
        &self.entries[start..start + len]
    }

    pub fn pointer(&self, entry: &TitleEntry) -> Option<RowPointer> {
        pointer(&self.files, entry.location)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TitleEntry> {
        self.entries.iter()
    }
}

impl TitleResolver for TitleIndex {
    fn resolve(&self, normalized_title: &str) -> Option<String> {
        self.get(normalized_title).map(|e| e.id.clone())
    }
}

/// One ID index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdEntry {
    pub id: String,
    pub location: RowLocation,
}

/// Article ID -> location, sorted by ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdIndex {
    files: Vec<String>,
    entries: Vec<IdEntry>,
}

impl IdIndex {
    pub fn new(files: Vec<String>, mut entries: Vec<IdEntry>) -> Self {
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Self { files, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<RowPointer> {
        let i = self
            .entries
            .binary_search_by(|e| e.id.as_str().cmp(id))
            .ok()?;
        pointer(&self.files, self.entries[i].location)
    }
}

/// One data file of a type, with its row group sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFile {
    pub path: String,
    pub row_count: u64,
    pub byte_size: u64,
    /// Rows per row group, in file order.
    pub row_groups: Vec<u64>,
}

impl TypeFile {
    pub fn manifest_file(&self) -> ManifestFile {
        ManifestFile {
            path: self.path.clone(),
            row_count: self.row_count,
            byte_size: self.byte_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub article_type: ArticleType,
    pub count: u64,
    pub files: Vec<TypeFile>,
}

/// Type -> count and ordered file list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeManifest {
    pub types: Vec<TypeEntry>,
}

impl TypeManifest {
    pub fn get(&self, article_type: ArticleType) -> Option<&TypeEntry> {
        self.types.iter().find(|t| t.article_type == article_type)
    }

    pub fn count(&self, article_type: ArticleType) -> u64 {
        self.get(article_type).map_or(0, |t| t.count)
    }

    pub fn total_count(&self) -> u64 {
        self.types.iter().map(|t| t.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, row: u32) -> TitleEntry {
        TitleEntry {
            key: key.to_string(),
            title: key.to_uppercase(),
            id: format!("Q{}", row),
            location: RowLocation {
                file: 0,
                row_group: 0,
                row,
            },
        }
    }

    #[test]
    fn test_title_lookup_and_prefix() {
        let index = TitleIndex::new(
            vec!["person/part-00000.parquet".to_string()],
            vec![entry("ulm", 0), entry("berlin", 1), entry("ulm minster", 2), entry("um", 3)],
        );
        assert_eq!(index.get("ulm").unwrap().id, "Q0");
        assert!(index.get("paris").is_none());

        let keys: Vec<&str> = index.with_prefix("ul").iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["ulm", "ulm minster"]);
        assert!(index.with_prefix("zz").is_empty());
        assert_eq!(index.with_prefix("").len(), 4);

        let ptr = index.pointer(index.get("berlin").unwrap()).unwrap();
        assert_eq!(ptr.path, "person/part-00000.parquet");
        assert_eq!(ptr.row, 1);
        assert_eq!(index.resolve("um"), Some("Q3".to_string()));
    }

    #[test]
    fn test_id_lookup() {
        let index = IdIndex::new(
            vec!["a.parquet".to_string(), "b.parquet".to_string()],
            vec![
                IdEntry {
                    id: "Q2".into(),
                    location: RowLocation { file: 1, row_group: 3, row: 9 },
                },
                IdEntry {
                    id: "Q1".into(),
                    location: RowLocation { file: 0, row_group: 0, row: 0 },
                },
            ],
        );
        let ptr = index.get("Q2").unwrap();
        assert_eq!((ptr.path.as_str(), ptr.row_group, ptr.row), ("b.parquet", 3, 9));
        assert!(index.get("Q3").is_none());
    }
}
