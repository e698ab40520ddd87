//! Fetches and caches the published index artifacts.
//!
//! `CURRENT` names the active snapshot. It is fetched first, then every
//! artifact of that snapshot is fetched concurrently as a whole object. The
//! loaded set is reused for `ttl`; after that `CURRENT` is revalidated with
//! its entity tag and the artifacts are only re-downloaded when the snapshot
//! actually changed.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::constants::CURRENT_POINTER;
use crate::error::{Result, StoreError};
use crate::index::artifacts::{decode_artifact, ArtifactKind};
use crate::index::{BloomFilter, IdIndex, IndexSet, TitleIndex, TypeManifest};
use crate::remote::{ObjectFetch, RangeFetcher};
use crate::store::EdgeCatalog;

struct Loaded {
    index: Arc<IndexSet>,
    current_etag: Option<String>,
    checked_at: Instant,
}

pub struct IndexLoader {
    fetcher: Arc<dyn RangeFetcher>,
    ttl: Duration,
    timeout: Duration,
    state: Mutex<Option<Loaded>>,
}

impl IndexLoader {
    pub fn new(fetcher: Arc<dyn RangeFetcher>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            timeout,
            state: Mutex::new(None),
        }
    }

    async fn timed<T, F>(&self, path: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Timeout {
                    path: path.to_string(),
                    range: None,
                    budget: self.timeout,
                })
            })
    }

    async fn fetch_body(&self, path: &str) -> Result<Bytes> {
        match self.timed(path, self.fetcher.fetch_object(path, None)).await? {
            ObjectFetch::Modified { body, .. } => Ok(body),
            ObjectFetch::NotModified => Err(StoreError::network(
                path,
                None,
                "unconditional fetch answered 304",
            )),
        }
    }

    async fn fetch_artifact<T: serde::de::DeserializeOwned>(
        &self,
        snapshot: &str,
        kind: ArtifactKind,
    ) -> Result<T> {
        let path = format!("{}/{}", snapshot, kind.file_name());
        let body = self.fetch_body(&path).await?;
        decode_artifact(kind, &body, &path)
    }

    async fn fetch_edges(&self, snapshot: &str) -> Result<Option<EdgeCatalog>> {
        match self.fetch_artifact(snapshot, ArtifactKind::EdgeCatalog).await {
            Ok(edges) => Ok(Some(edges)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn load_snapshot(&self, snapshot_id: String) -> Result<IndexSet> {
        let (titles, ids, types, bloom, edges) = futures::try_join!(
            self.fetch_artifact::<TitleIndex>(&snapshot_id, ArtifactKind::TitleIndex),
            self.fetch_artifact::<IdIndex>(&snapshot_id, ArtifactKind::IdIndex),
            self.fetch_artifact::<TypeManifest>(&snapshot_id, ArtifactKind::TypeManifest),
            self.fetch_artifact::<BloomFilter>(&snapshot_id, ArtifactKind::Bloom),
            self.fetch_edges(&snapshot_id),
        )?;
        bloom.validate()?;
        log::info!(
            "Loaded index snapshot {}: {} titles, {} ids, {} rows",
            snapshot_id,
            titles.len(),
            ids.len(),
            types.total_count()
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

    /// The active index, loading or revalidating it when needed.
    ///
    /// Concurrent callers wait on one load.
    pub async fn current(&self) -> Result<Arc<IndexSet>> {
        let mut state = self.state.lock().await;
        if let Some(loaded) = state.as_ref() {
            if loaded.checked_at.elapsed() < self.ttl {
                return Ok(loaded.index.clone());
            }
        }

        let etag = state.as_ref().and_then(|l| l.current_etag.clone());
        let pointer = self
            .timed(
                CURRENT_POINTER,
                self.fetcher.fetch_object(CURRENT_POINTER, etag.as_deref()),
            )
            .await?;

        let (body, new_etag) = match pointer {
            ObjectFetch::NotModified => {
                if let Some(loaded) = state.as_mut() {
                    log::debug!("Index pointer unchanged; keeping {}", loaded.index.snapshot_id);
                    loaded.checked_at = Instant::now();
                    return Ok(loaded.index.clone());
                }
                // 304 without a cached copy: fetch unconditionally
                (self.fetch_body(CURRENT_POINTER).await?, None)
            }
            ObjectFetch::Modified { body, etag } => (body, etag),
        };

        let snapshot_id = std::str::from_utf8(&body)
            .map_err(|_| StoreError::format(CURRENT_POINTER, "pointer is not UTF-8"))?
            .trim()
            .to_string();
        if snapshot_id.is_empty() || snapshot_id.contains('/') {
            return Err(StoreError::format(
                CURRENT_POINTER,
                format!("invalid snapshot id '{}'", snapshot_id),
            ));
        }

        if let Some(loaded) = state.as_mut() {
            if loaded.index.snapshot_id == snapshot_id {
                loaded.current_etag = new_etag;
                loaded.checked_at = Instant::now();
                return Ok(loaded.index.clone());
            }
        }

        let index = Arc::new(self.load_snapshot(snapshot_id).await?);
        *state = Some(Loaded {
            index: index.clone(),
            current_etag: new_etag,
            checked_at: Instant::now(),
        });
        Ok(index)
    }

    /// Force revalidation on the next [`current`](Self::current) call.
    pub async fn expire(&self) {
        if let Some(loaded) = self.state.lock().await.as_mut() {
            loaded.checked_at = Instant::now()
                .checked_sub(self.ttl)
                .unwrap_or(loaded.checked_at);
        }
    }
}
