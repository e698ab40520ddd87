//! Relationship extraction, deferred resolution and partition writing.
//!
//! Edges are collected in one streaming pass. A target whose title is not yet
//! known goes onto an explicit pending queue with its title kept and its ID
//! absent; [`RelationshipWriter::reconcile`] drains that queue and settles
//! every target once against the final title index. Reverse edges are mirrored from resolved forward edges
//! and written to their own partition, so traversal in either direction reads
//! exactly one file.

use arrow::array::{ArrayRef, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::files;
use super::options::ParquetWriteOptions;
use crate::constants::PARQUET_BATCH_SIZE;
use crate::error::{Result, StoreError};
use crate::index::normalize_title;
use crate::types::ArticleRecord;

/// Edge label. Every predicate has an inverse used for the reverse partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    LinksTo,
    LinkedFrom,
    BornIn,
    BirthplaceOf,
    DiedIn,
    DeathplaceOf,
    MemberOf,
    HasMember,
    LocatedIn,
    Contains,
    CreatedBy,
    CreatorOf,
    PartOf,
    HasPart,
}

impl Predicate {
    const ALL: [Predicate; 14] = [
        Predicate::LinksTo,
        Predicate::LinkedFrom,
        Predicate::BornIn,
        Predicate::BirthplaceOf,
        Predicate::DiedIn,
        Predicate::DeathplaceOf,
        Predicate::MemberOf,
        Predicate::HasMember,
        Predicate::LocatedIn,
        Predicate::Contains,
        Predicate::CreatedBy,
        Predicate::CreatorOf,
        Predicate::PartOf,
        Predicate::HasPart,
    ];

    pub fn inverse(&self) -> Predicate {
        match self {
            Predicate::LinksTo => Predicate::LinkedFrom,
            Predicate::LinkedFrom => Predicate::LinksTo,
            Predicate::BornIn => Predicate::BirthplaceOf,
            Predicate::BirthplaceOf => Predicate::BornIn,
            Predicate::DiedIn => Predicate::DeathplaceOf,
            Predicate::DeathplaceOf => Predicate::DiedIn,
            Predicate::MemberOf => Predicate::HasMember,
            Predicate::HasMember => Predicate::MemberOf,
            Predicate::LocatedIn => Predicate::Contains,
            Predicate::Contains => Predicate::LocatedIn,
            Predicate::CreatedBy => Predicate::CreatorOf,
            Predicate::CreatorOf => Predicate::CreatedBy,
            Predicate::PartOf => Predicate::HasPart,
            Predicate::HasPart => Predicate::PartOf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::LinksTo => "links_to",
            Predicate::LinkedFrom => "linked_from",
            Predicate::BornIn => "born_in",
            Predicate::BirthplaceOf => "birthplace_of",
            Predicate::DiedIn => "died_in",
            Predicate::DeathplaceOf => "deathplace_of",
            Predicate::MemberOf => "member_of",
            Predicate::HasMember => "has_member",
            Predicate::LocatedIn => "located_in",
            Predicate::Contains => "contains",
            Predicate::CreatedBy => "created_by",
            Predicate::CreatorOf => "creator_of",
            Predicate::PartOf => "part_of",
            Predicate::HasPart => "has_part",
        }
    }

    /// Structured relation carried by an infobox key, if any.
    pub fn from_infobox_key(key: &str) -> Option<Predicate> {
        match key {
            "birth_place" | "place_of_birth" => Some(Predicate::BornIn),
            "death_place" | "place_of_death" => Some(Predicate::DiedIn),
            "employer" | "member_of" | "party" | "affiliation" => Some(Predicate::MemberOf),
            "location" | "country" | "city" | "state" | "headquarters" => {
                Some(Predicate::LocatedIn)
            }
            "author" | "creator" | "director" | "artist" | "developer" => {
                Some(Predicate::CreatedBy)
            }
            "part_of" | "parent" | "series" => Some(Predicate::PartOf),
            _ => None,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Predicate {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Predicate::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| StoreError::validation(format!("unknown predicate '{}'", s)))
    }
}

/// Raw link candidate supplied by the upstream parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub target_title: String,
    pub predicate: Predicate,
}

impl LinkCandidate {
    pub fn link(target_title: impl Into<String>) -> Self {
        Self {
            target_title: target_title.into(),
            predicate: Predicate::LinksTo,
        }
    }
}

/// A directed edge. `to_id` is `None` while the target is unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from_id: String,
    pub from_title: String,
    pub to_id: Option<String>,
    pub to_title: String,
    pub predicate: Predicate,
}

impl Relationship {
    pub fn is_resolved(&self) -> bool {
        self.to_id.is_some()
    }

    /// Mirror a resolved edge. Unresolved edges have no reverse.
    pub fn reversed(&self) -> Option<Relationship> {
        let to_id = self.to_id.as_ref()?;
        Some(Relationship {
            from_id: to_id.clone(),
            from_title: self.to_title.clone(),
            to_id: Some(self.from_id.clone()),
            to_title: self.from_title.clone(),
            predicate: self.predicate.inverse(),
        })
    }
}

/// Resolves a normalized title to an article ID.
pub trait TitleResolver: Send + Sync {
    fn resolve(&self, normalized_title: &str) -> Option<String>;
}

impl TitleResolver for HashMap<String, String> {
    fn resolve(&self, normalized_title: &str) -> Option<String> {
        self.get(normalized_title).cloned()
    }
}

/// Structured candidates found in a record's infobox.
pub fn extract_candidates(record: &ArticleRecord) -> Vec<LinkCandidate> {
    let mut out = Vec::new();
    for (key, value) in &record.infobox {
        let Some(predicate) = Predicate::from_infobox_key(key) else {
            continue;
        };
        for target in value.as_texts() {
            let target = target.trim();
            if !target.is_empty() {
                out.push(LinkCandidate {
                    target_title: target.to_string(),
                    predicate,
                });
            }
        }
    }
    out
}

/// Final forward/reverse edge sets after reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ReconciledEdges {
    /// Sorted by `(from_id, predicate, to_title)`.
    pub forward: Vec<Relationship>,
    /// Mirrors of every resolved forward edge, same ordering.
    pub reverse: Vec<Relationship>,
    /// Forward edges whose target never resolved.
    pub unresolved: usize,
}

/// Collects edges during ingestion.
pub struct RelationshipWriter {
    known: Option<Arc<dyn TitleResolver>>,
    /// Titles seen so far in this pass: normalized title -> id.
    seen: HashMap<String, String>,
    resolved: Vec<Relationship>,
    pending: VecDeque<Relationship>,
}

impl Default for RelationshipWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationshipWriter {
    pub fn new() -> Self {
        Self {
            known: None,
            seen: HashMap::new(),
            resolved: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Resolve against a previously published title index as well.
    pub fn with_resolver(mut self, resolver: Arc<dyn TitleResolver>) -> Self {
        self.known = Some(resolver);
        self
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    fn resolve(&self, key: &str) -> Option<String> {
        if let Some(id) = self.seen.get(key) {
            return Some(id.clone());
        }
        self.known.as_ref().and_then(|k| k.resolve(key))
    }

    /// Collect the edges of one record. Returns the number of edges kept.
    pub fn add(&mut self, record: &ArticleRecord, raw: &[LinkCandidate]) -> usize {
        let own_key = normalize_title(&record.title);
        self.seen
            .entry(own_key.clone())
            .or_insert_with(|| record.id.clone());

        let mut dedup: HashSet<(String, Predicate)> = HashSet::new();
        let mut kept = 0;
        for candidate in extract_candidates(record).iter().chain(raw) {
            let key = normalize_title(&candidate.target_title);
            if key.is_empty() || key == own_key {
                continue;
            }
            if !dedup.insert((key.clone(), candidate.predicate)) {
                continue;
            }
            let edge = Relationship {
                from_id: record.id.clone(),
                from_title: record.title.clone(),
                to_id: self.resolve(&key),
                to_title: candidate.target_title.trim().to_string(),
                predicate: candidate.predicate,
            };
            if edge.is_resolved() {
                self.resolved.push(edge);
            } else {
                self.pending.push_back(edge);
            }
            kept += 1;
        }
        kept
    }

    /// Resolve every edge against the final title index and mirror reverse
    /// edges. The index wins over titles seen during ingestion, so edges
    /// agree with title lookups when normalized titles collide.
    pub fn reconcile(mut self, index: &dyn TitleResolver) -> ReconciledEdges {
        let drained = self.pending.len();
        let mut forward = std::mem::take(&mut self.resolved);
        forward.extend(self.pending.drain(..));

        let mut unresolved = 0;
        let mut redirected = 0;
        for edge in &mut forward {
            let key = normalize_title(&edge.to_title);
            match index.resolve(&key) {
                Some(id) => {
                    if edge.to_id.as_ref().is_some_and(|prev| *prev != id) {
                        redirected += 1;
                    }
                    edge.to_id = Some(id);
                }
                None if edge.to_id.is_none() => {
                    edge.to_id = self.seen.get(&key).cloned();
                }
                None => {}
            }
            if !edge.is_resolved() {
                unresolved += 1;
            }
        }
        if redirected > 0 {
            log::warn!(
                "{} edges re-pointed to the title index's choice for a colliding title",
                redirected
            );
        }

        forward.sort_by(edge_order);
        let mut reverse: Vec<Relationship> = forward.iter().filter_map(|e| e.reversed()).collect();
        reverse.sort_by(edge_order);

        log::info!(
            "Reconciled {} deferred edges ({} still unresolved); {} forward, {} reverse",
            drained,
            unresolved,
            forward.len(),
            reverse.len()
        );
        ReconciledEdges {
            forward,
            reverse,
            unresolved,
        }
    }
}

fn edge_order(a: &Relationship, b: &Relationship) -> std::cmp::Ordering {
    a.from_id
        .cmp(&b.from_id)
        .then(a.predicate.cmp(&b.predicate))
        .then_with(|| a.to_title.cmp(&b.to_title))
}

// ============================================================================
// Partition files
// ============================================================================

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// One sealed edge file. All edges of any `from_id` in
/// `[min_from_id, max_from_id]` live in this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFile {
    pub path: String,
    pub row_count: u64,
    pub byte_size: u64,
    pub min_from_id: String,
    pub max_from_id: String,
}

/// Catalog of forward and reverse edge files, each list sorted by id range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCatalog {
    #[serde(default)]
    pub forward: Vec<EdgeFile>,
    #[serde(default)]
    pub reverse: Vec<EdgeFile>,
}

impl EdgeCatalog {
    pub fn files(&self, direction: Direction) -> &[EdgeFile] {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        }
    }

    /// The single file that may hold edges from `id`.
    pub fn file_for(&self, direction: Direction, id: &str) -> Option<&EdgeFile> {
        let files = self.files(direction);
        let idx = files.partition_point(|f| f.max_from_id.as_str() < id);
        files.get(idx).filter(|f| f.min_from_id.as_str() <= id)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(files::EDGE_CATALOG);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(parent.to_path_buf(), "create relationships dir", e))?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| StoreError::encoding(format!("serialize edge catalog: {}", e)))?;
        let tmp = root.join(format!("{}.tmp", files::EDGE_CATALOG));
        fs::write(&tmp, text).map_err(|e| StoreError::io(tmp.clone(), "write edge catalog", e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(path.clone(), "publish edge catalog", e))
    }

    /// Load the catalog if the store has relationship partitions.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = root.join(files::EDGE_CATALOG);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| StoreError::io(path.clone(), "read edge catalog", e))?;
        toml::from_str(&text)
            .map(Some)
            .map_err(|e| StoreError::format(path.display().to_string(), e.to_string()))
    }
}

/// Options for writing edge partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipOptions {
    /// Soft row threshold; files only break between distinct `from_id`s.
    pub max_rows_per_file: usize,
    pub file_prefix: String,
    pub parquet: ParquetWriteOptions,
}

impl Default for RelationshipOptions {
    fn default() -> Self {
        Self {
            max_rows_per_file: 250_000,
            file_prefix: "edges".to_string(),
            parquet: ParquetWriteOptions::default(),
        }
    }
}

/// Edge column names.
pub mod edge_columns {
    pub const FROM_ID: &str = "from_id";
    pub const FROM_TITLE: &str = "from_title";
    pub const TO_ID: &str = "to_id";
    pub const TO_TITLE: &str = "to_title";
    pub const PREDICATE: &str = "predicate";
}

fn edge_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(edge_columns::FROM_ID, DataType::Utf8, false),
        Field::new(edge_columns::FROM_TITLE, DataType::Utf8, false),
        Field::new(edge_columns::TO_ID, DataType::Utf8, true),
        Field::new(edge_columns::TO_TITLE, DataType::Utf8, false),
        Field::new(edge_columns::PREDICATE, DataType::Utf8, false),
    ]))
}

fn edge_batch(schema: &SchemaRef, edges: &[Relationship]) -> Result<RecordBatch> {
    let mut from_id = StringBuilder::new();
    let mut from_title = StringBuilder::new();
    let mut to_id = StringBuilder::new();
    let mut to_title = StringBuilder::new();
    let mut predicate = StringBuilder::new();
    for edge in edges {
        from_id.append_value(&edge.from_id);
        from_title.append_value(&edge.from_title);
        to_id.append_option(edge.to_id.as_deref());
        to_title.append_value(&edge.to_title);
        predicate.append_value(edge.predicate.as_str());
    }
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(from_id.finish()),
        Arc::new(from_title.finish()),
        Arc::new(to_id.finish()),
        Arc::new(to_title.finish()),
        Arc::new(predicate.finish()),
    ];
    Ok(RecordBatch::try_new(schema.clone(), arrays)?)
}

fn write_edge_file(
    root: &Path,
    rel_path: String,
    edges: &[Relationship],
    options: &RelationshipOptions,
) -> Result<EdgeFile> {
    let abs_path = root.join(&rel_path);
    let schema = edge_schema();
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&abs_path)
        .map_err(|e| StoreError::io(abs_path.clone(), "create edge file", e))?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(options.parquet.to_writer_properties()))?;
    for chunk in edges.chunks(PARQUET_BATCH_SIZE) {
        writer.write(&edge_batch(&schema, chunk)?)?;
    }
    writer.close()?;

    let byte_size = fs::metadata(&abs_path)
        .map_err(|e| StoreError::io(abs_path.clone(), "stat edge file", e))?
        .len();
    Ok(EdgeFile {
        path: rel_path,
        row_count: edges.len() as u64,
        byte_size,
        min_from_id: edges.first().map(|e| e.from_id.clone()).unwrap_or_default(),
        max_from_id: edges.last().map(|e| e.from_id.clone()).unwrap_or_default(),
    })
}

/// Split sorted edges into file-sized runs, never splitting one `from_id`.
fn split_runs(edges: &[Relationship], max_rows: usize) -> Vec<&[Relationship]> {
    let mut runs = Vec::new();
    let mut start = 0;
    while start < edges.len() {
        let mut end = (start + max_rows).min(edges.len());
        while end < edges.len() && edges[end].from_id == edges[end - 1].from_id {
            end += 1;
        }
        runs.push(&edges[start..end]);
        start = end;
    }
    runs
}

fn write_direction(
    root: &Path,
    direction: Direction,
    edges: &[Relationship],
    options: &RelationshipOptions,
) -> Result<Vec<EdgeFile>> {
    let dir = root.join(files::RELATIONSHIPS_DIR).join(direction.as_str());
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(dir.clone(), "create edge dir", e))?;

    let mut out = Vec::new();
    for (seq, run) in split_runs(edges, options.max_rows_per_file.max(1))
        .into_iter()
        .enumerate()
    {
        let rel_path = format!(
            "{}/{}/{}",
            files::RELATIONSHIPS_DIR,
            direction.as_str(),
            files::data_file(&options.file_prefix, seq as u32)
        );
        out.push(write_edge_file(root, rel_path, run, options)?);
    }
    Ok(out)
}

/// Write forward and reverse partitions and save their catalog.
pub fn write_relationship_partitions(
    root: &Path,
    edges: &ReconciledEdges,
    options: &RelationshipOptions,
) -> Result<EdgeCatalog> {
    options.parquet.validate()?;
    let catalog = EdgeCatalog {
        forward: write_direction(root, Direction::Forward, &edges.forward, options)?,
        reverse: write_direction(root, Direction::Reverse, &edges.reverse, options)?,
    };
    catalog.save(root)?;
    log::info!(
        "Wrote {} forward and {} reverse edge files",
        catalog.forward.len(),
        catalog.reverse.len()
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArticleType, Infobox, InfoboxValue};
    use tempfile::TempDir;

    fn article(id: &str, title: &str, infobox: Infobox) -> ArticleRecord {
        ArticleRecord {
            id: id.to_string(),
            article_type: ArticleType::Person,
            title: title.to_string(),
            description: String::new(),
            wikidata_id: None,
            coords: None,
            infobox,
            content: String::new(),
            updated_at: 0,
        }
    }

    #[test]
    fn test_inverse_is_involution() {
        for p in Predicate::ALL {
            assert_eq!(p.inverse().inverse(), p);
            assert_ne!(p.inverse(), p);
            assert_eq!(p.as_str().parse::<Predicate>().unwrap(), p);
        }
    }

    #[test]
    fn test_extract_and_dedup() {
        let mut infobox = Infobox::new();
        infobox.insert("birth_place".into(), InfoboxValue::Text("Ulm".into()));
        infobox.insert("height".into(), InfoboxValue::Number(1.7));
        let record = article("Q937", "Albert Einstein", infobox);

        let mut writer = RelationshipWriter::new();
        let kept = writer.add(
            &record,
            &[
                LinkCandidate::link("Ulm"),
                LinkCandidate::link("ulm "),
                LinkCandidate::link("Albert_Einstein"),
            ],
        );
        // born_in Ulm + links_to Ulm; duplicate and self-link dropped
        assert_eq!(kept, 2);
        assert_eq!(writer.pending_len(), 2);
    }

    #[test]
    fn test_seen_titles_resolve_immediately() {
        let mut writer = RelationshipWriter::new();
        writer.add(&article("Q3012", "Ulm", Infobox::new()), &[]);
        writer.add(
            &article("Q937", "Albert Einstein", Infobox::new()),
            &[LinkCandidate::link("Ulm")],
        );
        assert_eq!(writer.resolved_len(), 1);
        assert_eq!(writer.pending_len(), 0);
    }

    #[test]
    fn test_reconcile_resolves_and_mirrors() {
        let mut infobox = Infobox::new();
        infobox.insert("birth_place".into(), InfoboxValue::Text("Ulm".into()));
        let mut writer = RelationshipWriter::new();
        writer.add(&article("Q937", "Albert Einstein", infobox), &[]);
        assert_eq!(writer.pending_len(), 1);

        let index: HashMap<String, String> =
            HashMap::from([("ulm".to_string(), "Q3012".to_string())]);
        let edges = writer.reconcile(&index);

        assert_eq!(edges.unresolved, 0);
        assert_eq!(edges.forward.len(), 1);
        assert_eq!(edges.forward[0].to_id.as_deref(), Some("Q3012"));
        assert_eq!(
            edges.reverse,
            vec![Relationship {
                from_id: "Q3012".into(),
                from_title: "Ulm".into(),
                to_id: Some("Q937".into()),
                to_title: "Albert Einstein".into(),
                predicate: Predicate::BirthplaceOf,
            }]
        );
    }

    #[test]
    fn test_index_choice_wins_on_title_collision() {
        let mut writer = RelationshipWriter::new();
        // two articles share the normalized title "mercury"
        writer.add(&article("L1", "Mercury", Infobox::new()), &[]);
        writer.add(&article("P1", "MERCURY", Infobox::new()), &[]);
        writer.add(
            &article("Q9", "Observer", Infobox::new()),
            &[LinkCandidate::link("Mercury")],
        );
        // resolved eagerly to the first title seen in the stream
        assert_eq!(writer.resolved_len(), 1);

        let index: HashMap<String, String> =
            HashMap::from([("mercury".to_string(), "P1".to_string())]);
        let edges = writer.reconcile(&index);
        assert_eq!(edges.forward[0].to_id.as_deref(), Some("P1"));
        assert_eq!(edges.reverse[0].from_id, "P1");
    }

    #[test]
    fn test_unresolved_edges_have_no_reverse() {
        let mut writer = RelationshipWriter::new();
        writer.add(
            &article("Q1", "A", Infobox::new()),
            &[LinkCandidate::link("Nowhere")],
        );
        let edges = writer.reconcile(&HashMap::new());
        assert_eq!(edges.unresolved, 1);
        assert_eq!(edges.forward.len(), 1);
        assert!(edges.reverse.is_empty());
    }

    #[test]
    fn test_split_runs_keeps_sources_together() {
        let edge = |from: &str| Relationship {
            from_id: from.into(),
            from_title: from.into(),
            to_id: None,
            to_title: "x".into(),
            predicate: Predicate::LinksTo,
        };
        let edges = vec![edge("a"), edge("a"), edge("a"), edge("b"), edge("c")];
        let runs = split_runs(&edges, 2);
        let sizes: Vec<usize> = runs.iter().map(|r| r.len()).collect();
        assert_eq!(sizes, vec![3, 2]);
    }

    #[test]
    fn test_write_partitions_and_catalog_lookup() {
        let tmp = TempDir::new().unwrap();
        let mut writer = RelationshipWriter::new();
        for i in 0..10 {
            writer.add(
                &article(&format!("Q{:02}", i), &format!("T{}", i), Infobox::new()),
                &[LinkCandidate::link(format!("T{}", (i + 1) % 10))],
            );
        }
        let edges = writer.reconcile(&HashMap::new());
        assert_eq!(edges.unresolved, 0);

        let options = RelationshipOptions {
            max_rows_per_file: 4,
            ..Default::default()
        };
        let catalog = write_relationship_partitions(tmp.path(), &edges, &options).unwrap();
        assert_eq!(catalog.forward.len(), 3);
        assert_eq!(catalog.reverse.len(), 3);

        let file = catalog.file_for(Direction::Forward, "Q05").unwrap();
        assert!(file.min_from_id.as_str() <= "Q05" && "Q05" <= file.max_from_id.as_str());
        assert!(catalog.file_for(Direction::Forward, "Z").is_none());

        assert_eq!(EdgeCatalog::load(tmp.path()).unwrap(), Some(catalog));
        assert!(!tmp.path().join("relationships/catalog.toml.tmp").exists());
    }

    #[test]
    fn test_catalog_save_replaces_previous() {
        let tmp = TempDir::new().unwrap();
        let file = EdgeFile {
            path: "relationships/forward/edges-00000.parquet".into(),
            row_count: 1,
            byte_size: 10,
            min_from_id: "a".into(),
            max_from_id: "a".into(),
        };
        let first = EdgeCatalog {
            forward: vec![file.clone()],
            reverse: Vec::new(),
        };
        first.save(tmp.path()).unwrap();
        let second = EdgeCatalog {
            forward: vec![file.clone()],
            reverse: vec![file],
        };
        second.save(tmp.path()).unwrap();
        assert_eq!(EdgeCatalog::load(tmp.path()).unwrap(), Some(second));
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("relationships"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("catalog.toml")]);
    }
}
