//! Query client: lookups, type scans, autocomplete, similarity and
//! relationship traversal over a published store.

use futures::stream::{self, Stream};
use parquet::arrow::arrow_reader::{RowSelection, RowSelector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::loader::IndexLoader;
use super::similarity::{SimilarityHit, SimilarityService};
use crate::cache::TtlCache;
use crate::error::{Result, StoreError};
use crate::index::{normalize_title, IndexSet, TypeFile};
use crate::remote::{rows_from_batch, RangeFetcher, RangeReader, ReaderOptions};
use crate::store::relationships::edge_columns;
use crate::store::{Direction, Relationship};
use crate::types::{Article, ArticleType, RowPointer};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub reader: ReaderOptions,

    /// How long loaded index artifacts are trusted before `CURRENT` is
    /// revalidated. Default: 5 min.
    pub index_ttl: Duration,

    /// Decoded articles kept per client. Default: 1024.
    pub row_cache_capacity: usize,

    /// Default: 10 min.
    pub row_cache_ttl: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            reader: ReaderOptions::default(),
            index_ttl: Duration::from_secs(300),
            row_cache_capacity: 1024,
            row_cache_ttl: Duration::from_secs(600),
        }
    }
}

impl ClientOptions {
    pub fn validate(&self) -> Result<()> {
        self.reader.validate()
    }
}

/// Why a lookup found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// The bloom filter ruled the title out; no index or data was consulted.
    BloomRejected,
    /// Not present in the index.
    NotIndexed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Article),
    Missing(MissReason),
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn article(&self) -> Option<&Article> {
        match self {
            Lookup::Found(article) => Some(article),
            Lookup::Missing(_) => None,
        }
    }

    pub fn into_article(self) -> Option<Article> {
        match self {
            Lookup::Found(article) => Some(article),
            Lookup::Missing(_) => None,
        }
    }
}

/// An autocomplete candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub title: String,
    pub id: String,
    /// Normalized title equals the normalized prefix.
    pub exact: bool,
}

/// A data file named by the index is gone: the index is older than the data.
fn stale(e: StoreError) -> StoreError {
    match e {
        StoreError::NotFound { path } => StoreError::StaleIndex { path },
        other => other,
    }
}

struct ScanState {
    files: Option<Vec<TypeFile>>,
    file: usize,
    row_group: usize,
    skip: u64,
    remaining: u64,
    buffer: VecDeque<Article>,
}

pub struct QueryClient {
    loader: IndexLoader,
    reader: RangeReader,
    rows: TtlCache<RowPointer, Article>,
    similarity: Option<Arc<dyn SimilarityService>>,
}

impl QueryClient {
    /// Client over any transport; index artifacts and data files are
    /// fetched from the same root.
    pub fn new(fetcher: Arc<dyn RangeFetcher>, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let reader = RangeReader::new(fetcher.clone(), options.reader.clone())?;
        Ok(Self::assemble(fetcher, reader, &options))
    }

    pub fn http(base_url: impl Into<String>, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let reader = RangeReader::http(base_url, options.reader.clone())?;
        Ok(Self::assemble(reader.fetcher().clone(), reader, &options))
    }

    pub fn local(root: impl Into<PathBuf>, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let reader = RangeReader::local(root, options.reader.clone())?;
        Ok(Self::assemble(reader.fetcher().clone(), reader, &options))
    }

    fn assemble(fetcher: Arc<dyn RangeFetcher>, reader: RangeReader, options: &ClientOptions) -> Self {
        Self {
            loader: IndexLoader::new(fetcher, options.index_ttl, options.reader.timeout),
            reader,
            rows: TtlCache::new(options.row_cache_capacity, options.row_cache_ttl),
            similarity: None,
        }
    }

    pub fn with_similarity(mut self, service: Arc<dyn SimilarityService>) -> Self {
        self.similarity = Some(service);
        self
    }

    pub fn reader(&self) -> &RangeReader {
        &self.reader
    }

    /// The active index snapshot.
    pub async fn index(&self) -> Result<Arc<IndexSet>> {
        self.loader.current().await
    }

    /// Revalidate `CURRENT` on the next query.
    pub async fn refresh(&self) {
        self.loader.expire().await;
    }

    async fn read_article(&self, pointer: RowPointer) -> Result<Arc<Article>> {
        let key = pointer.clone();
        self.rows
            .get_or_try_load(key, || async move {
                let row = self
                    .reader
                    .read_row(
                        &pointer.path,
                        pointer.row_group as usize,
                        pointer.row as usize,
                        None,
                    )
                    .await
                    .map_err(stale)?;
                row.into_article(&pointer.path)
            })
            .await
    }

    /// Exact title lookup. Titles the bloom filter rejects cost no requests
    /// beyond the (cached) index.
    pub async fn lookup_title(&self, title: &str) -> Result<Lookup> {
        let key = normalize_title(title);
        let index = self.index().await?;
        if !index.bloom.contains(&key) {
            log::debug!("Bloom filter rejected '{}'", key);
            return Ok(Lookup::Missing(MissReason::BloomRejected));
        }
        let Some(entry) = index.titles.get(&key) else {
            return Ok(Lookup::Missing(MissReason::NotIndexed));
        };
        let pointer = index.titles.pointer(entry).ok_or_else(|| {
            StoreError::format(
                crate::index::artifacts::names::TITLE_INDEX,
                format!("entry '{}' names an unknown file", key),
            )
        })?;
        let article = self.read_article(pointer).await?;
        Ok(Lookup::Found(article.as_ref().clone()))
    }

    pub async fn lookup_id(&self, id: &str) -> Result<Lookup> {
        let index = self.index().await?;
        let Some(pointer) = index.ids.get(id) else {
            return Ok(Lookup::Missing(MissReason::NotIndexed));
        };
        let article = self.read_article(pointer).await?;
        Ok(Lookup::Found(article.as_ref().clone()))
    }

    /// Stream articles of one type, starting at `offset`.
    ///
    /// Whole files and row groups before `offset` are skipped by count; only
    /// one row group is decoded at a time.
    pub fn scan_type(
        &self,
        article_type: ArticleType,
        offset: u64,
        limit: Option<u64>,
    ) -> impl Stream<Item = Result<Article>> + '_ {
        let state = ScanState {
            files: None,
            file: 0,
            row_group: 0,
            skip: offset,
            remaining: limit.unwrap_or(u64::MAX),
            buffer: VecDeque::new(),
        };
        stream::try_unfold(state, move |mut st| async move {
            loop {
                if st.remaining == 0 {
                    return Ok::<_, StoreError>(None);
                }
                if let Some(article) = st.buffer.pop_front() {
                    st.remaining -= 1;
                    return Ok(Some((article, st)));
                }
                if st.files.is_none() {
                    let index = self.index().await?;
                    st.files = Some(
                        index
                            .types
                            .get(article_type)
                            .map(|t| t.files.clone())
                            .unwrap_or_default(),
                    );
                }
                let Some(files) = st.files.as_ref() else {
                    return Ok(None);
                };
                let Some(file) = files.get(st.file) else {
                    return Ok(None);
                };
                if st.row_group == 0 && st.skip >= file.row_count {
                    st.skip -= file.row_count;
                    st.file += 1;
                    continue;
                }
                let Some(&group_rows) = file.row_groups.get(st.row_group) else {
                    st.file += 1;
                    st.row_group = 0;
                    continue;
                };
                if st.skip >= group_rows {
                    st.skip -= group_rows;
                    st.row_group += 1;
                    continue;
                }

                let batch = self
                    .reader
                    .read_row_group(&file.path, st.row_group, None)
                    .await
                    .map_err(stale)?;
                for row in rows_from_batch(&file.path, &batch)?
                    .into_iter()
                    .skip(st.skip as usize)
                {
                    st.buffer.push_back(row.into_article(&file.path)?);
                }
                st.skip = 0;
                st.row_group += 1;
            }
        })
    }

    /// Titles starting with `prefix`: exact match first, then shorter, then
    /// lexicographic.
    pub async fn autocomplete(&self, prefix: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let key = normalize_title(prefix);
        if key.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let index = self.index().await?;
        let mut matches: Vec<_> = index.titles.with_prefix(&key).iter().collect();
        matches.sort_by(|a, b| {
            (a.key != key, a.key.len(), &a.key).cmp(&(b.key != key, b.key.len(), &b.key))
        });
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|e| Suggestion {
                title: e.title.clone(),
                id: e.id.clone(),
                exact: e.key == key,
            })
            .collect())
    }

    /// Similar articles, as ranked by the configured service.
    pub async fn similar(&self, query: &str, k: usize) -> Result<Vec<SimilarityHit>> {
        let service = self
            .similarity
            .as_ref()
            .ok_or_else(|| StoreError::validation("no similarity service configured"))?;
        service.search(query, k).await
    }

    /// Edges leaving `id` in the given direction. Reverse edges of `id` are
    /// the edges pointing at it, with the inverse predicate.
    pub async fn relationships(&self, id: &str, direction: Direction) -> Result<Vec<Relationship>> {
        let index = self.index().await?;
        let Some(file) = index
            .edges
            .as_ref()
            .and_then(|edges| edges.file_for(direction, id))
        else {
            return Ok(Vec::new());
        };

        let footer = self.reader.footer(&file.path).await.map_err(stale)?;
        let candidates = footer.row_groups_containing(edge_columns::FROM_ID, id);
        log::debug!(
            "{}: {} of {} row groups may hold edges of {}",
            file.path,
            candidates.len(),
            footer.layout.row_groups.len(),
            id
        );

        let mut edges = Vec::new();
        for row_group in candidates {
            let keys = self
                .reader
                .read_row_group(&file.path, row_group, Some(&[edge_columns::FROM_ID][..]))
                .await
                .map_err(stale)?;
            let from_ids: Vec<String> = rows_from_batch(&file.path, &keys)?
                .iter()
                .map(|row| {
                    row.get(edge_columns::FROM_ID)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                })
                .collect();
            // edge files are sorted by from_id, so matches are one run
            let first = from_ids.partition_point(|from| from.as_str() < id);
            let count = from_ids[first..].partition_point(|from| from.as_str() == id);
            if count == 0 {
                continue;
            }

            let mut selectors = Vec::with_capacity(2);
            if first > 0 {
                selectors.push(RowSelector::skip(first));
            }
            selectors.push(RowSelector::select(count));
            let batch = self
                .reader
                .read_selection(&file.path, row_group, RowSelection::from(selectors), None)
                .await
                .map_err(stale)?;
            for row in rows_from_batch(&file.path, &batch)? {
                edges.push(row.into_relationship(&file.path)?);
            }
            if first + count < from_ids.len() {
                break;
            }
        }
        Ok(edges)
    }
}
