//! HTTP transport against a minimal in-process file server.

mod common;

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::{build_store, corpus, small_files};
use wikicol::remote::ObjectFetch;
use wikicol::{
    ClientOptions, ErrorKind, HttpFetcher, Lookup, MissReason, QueryClient, RangeFetcher,
    StoreError,
};

#[derive(Debug, Clone, Copy)]
enum RangeMode {
    Honor,
    Ignore,
    /// Serve the requested length one byte later, with a matching header.
    Shift,
}

/// `(start, end)` of a single `bytes=` range; `None` when unsatisfiable.
fn parse_range(header: &str, len: usize) -> Option<(usize, usize)> {
    let (a, b) = header.strip_prefix("bytes=")?.split_once('-')?;
    if a.is_empty() {
        let n: usize = b.parse().ok()?;
        return Some((len.saturating_sub(n), len));
    }
    let start: usize = a.parse().ok()?;
    let end = b.parse::<usize>().ok()?.min(len.checked_sub(1)?) + 1;
    (start < end).then_some((start, end))
}

async fn handle(mut stream: TcpStream, root: &Path, mode: RangeMode) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.lines();
    let path = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/")
        .trim_start_matches('/')
        .to_string();
    let mut range = None;
    let mut if_none_match = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "range" => range = Some(value.trim().to_string()),
                "if-none-match" => if_none_match = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    let (status, headers, body) = match std::fs::read(root.join(&path)) {
        Err(_) => ("404 Not Found", Vec::new(), Vec::new()),
        Ok(data) => {
            let etag = format!("\"{:x}\"", data.len());
            let span = range.as_deref().and_then(|r| parse_range(r, data.len()));
            if if_none_match.as_deref() == Some(etag.as_str()) {
                ("304 Not Modified", vec![format!("ETag: {}", etag)], Vec::new())
            } else if let (RangeMode::Honor | RangeMode::Shift, Some((start, end))) = (mode, span) {
                let (start, end) = match mode {
                    RangeMode::Shift if end < data.len() => (start + 1, end + 1),
                    RangeMode::Shift => (start.saturating_sub(1), end - 1),
                    _ => (start, end),
                };
                let header = format!("Content-Range: bytes {}-{}/{}", start, end - 1, data.len());
                ("206 Partial Content", vec![header], data[start..end].to_vec())
            } else {
                ("200 OK", vec![format!("ETag: {}", etag)], data)
            }
        }
    };

    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        body.len()
    );
    for header in headers {
        response.push_str(&header);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    stream.write_all(response.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}

/// Serve `root` until the test's runtime shuts down. Returns the base URL.
async fn serve(root: PathBuf, mode: RangeMode) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let root = root.clone();
            tokio::spawn(async move {
                let _ = handle(stream, &root, mode).await;
            });
        }
    });
    Ok(format!("http://{}", addr))
}

fn digits_fixture() -> Result<tempfile::TempDir> {
    let dir = tempdir()?;
    std::fs::create_dir_all(dir.path().join("person"))?;
    std::fs::write(dir.path().join("person/a.bin"), b"0123456789")?;
    Ok(dir)
}

#[tokio::test]
async fn test_range_and_suffix_requests() -> Result<()> {
    let dir = digits_fixture()?;
    let base = serve(dir.path().to_path_buf(), RangeMode::Honor).await?;
    let fetcher = HttpFetcher::new(base);

    assert_eq!(&fetcher.fetch_range("person/a.bin", 2..5).await?[..], b"234");
    let (tail, len) = fetcher.fetch_suffix("person/a.bin", 4).await?;
    assert_eq!((&tail[..], len), (&b"6789"[..], 10));
    let (all, len) = fetcher.fetch_suffix("person/a.bin", 64).await?;
    assert_eq!((all.len(), len), (10, 10));
    Ok(())
}

#[tokio::test]
async fn test_server_ignoring_range() -> Result<()> {
    let dir = digits_fixture()?;
    let base = serve(dir.path().to_path_buf(), RangeMode::Ignore).await?;

    let strict = HttpFetcher::new(base.clone());
    let err = strict.fetch_range("person/a.bin", 2..5).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotPartialContent { status: 200, .. }
    ));
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(!err.is_retryable());

    let lenient = HttpFetcher::new(base).with_full_fetch_fallback(true);
    assert_eq!(&lenient.fetch_range("person/a.bin", 2..5).await?[..], b"234");
    let (tail, len) = lenient.fetch_suffix("person/a.bin", 3).await?;
    assert_eq!((&tail[..], len), (&b"789"[..], 10));
    Ok(())
}

#[tokio::test]
async fn test_misaligned_partial_content_is_rejected() -> Result<()> {
    let dir = digits_fixture()?;
    let base = serve(dir.path().to_path_buf(), RangeMode::Shift).await?;
    let fetcher = HttpFetcher::new(base);

    let err = fetcher.fetch_range("person/a.bin", 2..5).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotPartialContent { status: 206, ref range, .. } if *range == (2..5)
    ));
    assert!(!err.is_retryable());

    // a tail that stops short of the end is not the suffix
    assert!(matches!(
        fetcher.fetch_suffix("person/a.bin", 4).await,
        Err(StoreError::NotPartialContent { status: 206, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_missing_objects_and_etags() -> Result<()> {
    let dir = digits_fixture()?;
    let base = serve(dir.path().to_path_buf(), RangeMode::Honor).await?;
    let fetcher = HttpFetcher::new(base);

    assert!(matches!(
        fetcher.fetch_range("person/missing.bin", 0..1).await,
        Err(StoreError::NotFound { .. })
    ));

    let ObjectFetch::Modified { body, etag } = fetcher.fetch_object("person/a.bin", None).await?
    else {
        panic!("expected a body");
    };
    assert_eq!(body.len(), 10);
    let etag = etag.expect("server sends an etag");
    assert!(matches!(
        fetcher.fetch_object("person/a.bin", Some(&etag)).await?,
        ObjectFetch::NotModified
    ));
    Ok(())
}

#[tokio::test]
async fn test_query_client_over_http() -> Result<()> {
    let dir = tempdir()?;
    build_store(dir.path(), corpus(120), small_files(50, 16))?;
    let base = serve(dir.path().to_path_buf(), RangeMode::Honor).await?;

    let client = QueryClient::http(base, ClientOptions::default())?;
    let article = client
        .lookup_title("person 42")
        .await?
        .into_article()
        .expect("indexed");
    assert_eq!(article.id, "P00042");
    assert!(matches!(
        client.lookup_title("No Such Person Anywhere").await?,
        Lookup::Missing(MissReason::BloomRejected | MissReason::NotIndexed)
    ));
    Ok(())
}
