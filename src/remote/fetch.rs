//! Byte-range transport.
//!
//! [`RangeFetcher`] is the only seam between the reader and storage. Two
//! implementations ship: [`HttpFetcher`] for any server that honors `Range`
//! and `If-None-Match`, and [`LocalFetcher`] for a directory on disk.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, ETAG, IF_NONE_MATCH, RANGE};
use reqwest::StatusCode;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Result, StoreError};

/// Result of a whole-object fetch with revalidation.
#[derive(Debug, Clone)]
pub enum ObjectFetch {
    Modified { body: Bytes, etag: Option<String> },
    NotModified,
}

/// Range access to objects addressed by store-relative paths.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Exactly the bytes of `range`.
    async fn fetch_range(&self, path: &str, range: Range<u64>) -> Result<Bytes>;

    /// The last `len` bytes of the object (fewer if it is shorter) and the
    /// object's total length.
    async fn fetch_suffix(&self, path: &str, len: u64) -> Result<(Bytes, u64)>;

    /// The whole object, or `NotModified` when `etag` still matches.
    async fn fetch_object(&self, path: &str, etag: Option<&str>) -> Result<ObjectFetch>;
}

// ============================================================================
// HTTP
// ============================================================================

/// Fetches from `<base_url>/<path>` with HTTP range requests.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    allow_full_fetch_fallback: bool,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            allow_full_fetch_fallback: false,
        }
    }

    /// Accept `200 OK` answers to range requests by slicing the full body.
    pub fn with_full_fetch_fallback(mut self, allow: bool) -> Self {
        self.allow_full_fetch_fallback = allow;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request_error(path: &str, range: Option<Range<u64>>, err: reqwest::Error) -> StoreError {
        StoreError::network(path, range, err.to_string())
    }

    fn status_error(path: &str, range: Option<Range<u64>>, status: StatusCode) -> StoreError {
        match status {
            StatusCode::NOT_FOUND => StoreError::NotFound {
                path: path.to_string(),
            },
            other => StoreError::network(path, range, format!("unexpected status {}", other)),
        }
    }
}

/// Total length from a `Content-Range: bytes a-b/total` header.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

/// Served span (end exclusive) and total length, if known, from a
/// `Content-Range: bytes a-b/total` header.
fn content_range_span(value: &str) -> Option<(Range<u64>, Option<u64>)> {
    let (span, total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;
    let (start, end) = span.trim().split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    if end < start {
        return None;
    }
    Some((start..end + 1, total.trim().parse().ok()))
}

fn served_span(response: &reqwest::Response) -> Option<(Range<u64>, Option<u64>)> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(content_range_span)
}

#[async_trait]
impl RangeFetcher for HttpFetcher {
    async fn fetch_range(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        if range.start >= range.end {
            return Ok(Bytes::new());
        }
        let want = range.end - range.start;
        let response = self
            .client
            .get(self.url(path))
            .header(RANGE, format!("bytes={}-{}", range.start, range.end - 1))
            .send()
            .await
            .map_err(|e| Self::request_error(path, Some(range.clone()), e))?;

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT => {
                let served = served_span(&response).map(|(span, _)| span);
                if served.as_ref() != Some(&range) {
                    log::warn!(
                        "{} answered bytes {:?} for requested {}..{}",
                        path,
                        served,
                        range.start,
                        range.end
                    );
                    return Err(StoreError::NotPartialContent {
                        path: path.to_string(),
                        range,
                        status: status.as_u16(),
                    });
                }
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Self::request_error(path, Some(range.clone()), e))?;
                if body.len() as u64 != want {
                    return Err(StoreError::NotPartialContent {
                        path: path.to_string(),
                        range,
                        status: status.as_u16(),
                    });
                }
                Ok(body)
            }
            StatusCode::OK if self.allow_full_fetch_fallback => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Self::request_error(path, Some(range.clone()), e))?;
                let file_len = body.len() as u64;
                if range.end > file_len {
                    return Err(StoreError::OffsetOutOfBounds {
                        path: path.to_string(),
                        range,
                        file_len,
                    });
                }
                log::warn!(
                    "Server ignored range request for {}; sliced {} of {} bytes",
                    path,
                    want,
                    file_len
                );
                Ok(body.slice(range.start as usize..range.end as usize))
            }
            StatusCode::OK => Err(StoreError::NotPartialContent {
                path: path.to_string(),
                range,
                status: status.as_u16(),
            }),
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let file_len = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(content_range_total)
                    .unwrap_or(0);
                Err(StoreError::OffsetOutOfBounds {
                    path: path.to_string(),
                    range,
                    file_len,
                })
            }
            other => Err(Self::status_error(path, Some(range), other)),
        }
    }

    async fn fetch_suffix(&self, path: &str, len: u64) -> Result<(Bytes, u64)> {
        // `bytes=-0` is unsatisfiable
        let want = len.max(1);
        let response = self
            .client
            .get(self.url(path))
            .header(RANGE, format!("bytes=-{}", want))
            .send()
            .await
            .map_err(|e| Self::request_error(path, None, e))?;

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT => {
                let Some((served, Some(total))) = served_span(&response) else {
                    return Err(StoreError::network(
                        path,
                        None,
                        "206 response without Content-Range total",
                    ));
                };
                let expected = total.saturating_sub(want)..total;
                if served != expected {
                    return Err(StoreError::NotPartialContent {
                        path: path.to_string(),
                        range: expected,
                        status: status.as_u16(),
                    });
                }
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Self::request_error(path, None, e))?;
                if body.len() as u64 != want.min(total) {
                    return Err(StoreError::NotPartialContent {
                        path: path.to_string(),
                        range: expected,
                        status: status.as_u16(),
                    });
                }
                let keep = len.min(body.len() as u64) as usize;
                Ok((body.slice(body.len() - keep..), total))
            }
            StatusCode::OK if self.allow_full_fetch_fallback => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Self::request_error(path, None, e))?;
                let total = body.len() as u64;
                log::warn!(
                    "Server ignored suffix request for {}; fetched all {} bytes",
                    path,
                    total
                );
                Ok((body.slice(total.saturating_sub(len) as usize..), total))
            }
            StatusCode::OK => Err(StoreError::NotPartialContent {
                path: path.to_string(),
                range: 0..len,
                status: status.as_u16(),
            }),
            other => Err(Self::status_error(path, None, other)),
        }
    }

    async fn fetch_object(&self, path: &str, etag: Option<&str>) -> Result<ObjectFetch> {
        let mut request = self.client.get(self.url(path));
        if let Some(tag) = etag {
            request = request.header(IF_NONE_MATCH, tag);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Self::request_error(path, None, e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(ObjectFetch::NotModified),
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Self::request_error(path, None, e))?;
                Ok(ObjectFetch::Modified { body, etag })
            }
            other => Err(Self::status_error(path, None, other)),
        }
    }
}

// ============================================================================
// Local directory
// ============================================================================

/// Serves a directory with the same contract as [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StoreError::validation(format!(
                "path '{}' escapes the store root",
                path
            )));
        }
        Ok(self.root.join(rel))
    }

    async fn open(&self, path: &str) -> Result<(tokio::fs::File, u64)> {
        let abs = self.resolve(path)?;
        let file = tokio::fs::File::open(&abs).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    path: path.to_string(),
                }
            } else {
                StoreError::io(abs.clone(), "open", e)
            }
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(abs.clone(), "stat", e))?
            .len();
        Ok((file, len))
    }

    async fn read_at(&self, path: &str, file: &mut tokio::fs::File, range: Range<u64>) -> Result<Bytes> {
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| StoreError::io(self.root.join(path), "seek", e))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| StoreError::io(self.root.join(path), "read range", e))?;
        Ok(Bytes::from(buf))
    }
}

#[async_trait]
impl RangeFetcher for LocalFetcher {
    async fn fetch_range(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        let (mut file, file_len) = self.open(path).await?;
        if range.start > range.end || range.end > file_len {
            return Err(StoreError::OffsetOutOfBounds {
                path: path.to_string(),
                range,
                file_len,
            });
        }
        self.read_at(path, &mut file, range).await
    }

    async fn fetch_suffix(&self, path: &str, len: u64) -> Result<(Bytes, u64)> {
        let (mut file, file_len) = self.open(path).await?;
        let start = file_len.saturating_sub(len);
        let bytes = self.read_at(path, &mut file, start..file_len).await?;
        Ok((bytes, file_len))
    }

    async fn fetch_object(&self, path: &str, etag: Option<&str>) -> Result<ObjectFetch> {
        let (mut file, file_len) = self.open(path).await?;
        let modified = file
            .metadata()
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        let current = format!("\"{:x}-{:x}\"", file_len, modified);
        if etag == Some(current.as_str()) {
            return Ok(ObjectFetch::NotModified);
        }
        let body = self.read_at(path, &mut file, 0..file_len).await?;
        Ok(ObjectFetch::Modified {
            body,
            etag: Some(current),
        })
    }
}
