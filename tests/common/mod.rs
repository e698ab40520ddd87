//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex};

use wikicol::remote::ObjectFetch;
use wikicol::store::{
    IngestOutcome, LinkCandidate, ParquetWriteOptions, RelationshipOptions, Thresholds,
};
use wikicol::{
    build_and_publish, ingest_corpus, ArticleRecord, ArticleType, Coords, IndexBuildOptions,
    IndexSet, IngestItem, Infobox, InfoboxValue, LocalFetcher, RangeFetcher, WriterOptions,
};

/// Which fetcher method a request went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Range,
    Suffix,
    Object,
}

/// Wraps a [`LocalFetcher`] and records every request.
pub struct CountingFetcher {
    inner: LocalFetcher,
    log: Mutex<Vec<(RequestKind, String)>>,
}

impl CountingFetcher {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalFetcher::new(root),
            log: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, kind: RequestKind, path: &str) {
        self.log.lock().unwrap().push((kind, path.to_string()));
    }

    pub fn requests(&self) -> Vec<(RequestKind, String)> {
        self.log.lock().unwrap().clone()
    }

    /// Requests that touched a Parquet data or edge file.
    pub fn data_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|(_, path)| path.ends_with(".parquet"))
            .count()
    }

    pub fn object_requests(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(kind, p)| *kind == RequestKind::Object && p == path)
            .count()
    }

    pub fn reset(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl RangeFetcher for CountingFetcher {
    async fn fetch_range(&self, path: &str, range: Range<u64>) -> wikicol::Result<Bytes> {
        self.record(RequestKind::Range, path);
        self.inner.fetch_range(path, range).await
    }

    async fn fetch_suffix(&self, path: &str, len: u64) -> wikicol::Result<(Bytes, u64)> {
        self.record(RequestKind::Suffix, path);
        self.inner.fetch_suffix(path, len).await
    }

    async fn fetch_object(&self, path: &str, etag: Option<&str>) -> wikicol::Result<ObjectFetch> {
        self.record(RequestKind::Object, path);
        self.inner.fetch_object(path, etag).await
    }
}

/// Deterministic splitmix64 stream for fixtures that must not compress.
pub struct Mix(pub u64);

impl Mix {
    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    pub fn text(&mut self, len: usize) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        (0..len)
            .map(|_| ALPHABET[(self.next_u64() % ALPHABET.len() as u64) as usize] as char)
            .collect()
    }
}

pub fn person(i: usize) -> ArticleRecord {
    let mut infobox = Infobox::new();
    infobox.insert("born".into(), InfoboxValue::Text(format!("{}", 1800 + i % 200)));
    infobox.insert("occupation".into(), InfoboxValue::Text("writer".into()));
    if i % 3 == 0 {
        infobox.insert("height".into(), InfoboxValue::Number(1.5 + (i % 50) as f64 / 100.0));
    }
    if i % 7 == 0 {
        infobox.insert(
            "spouses".into(),
            InfoboxValue::List(vec![format!("Spouse {}a", i), format!("Spouse {}b", i)]),
        );
    }
    ArticleRecord {
        id: format!("P{:05}", i),
        article_type: ArticleType::Person,
        title: format!("Person {}", i),
        description: format!("Fictional person number {}", i),
        wikidata_id: Some(format!("Q{}", 100_000 + i)),
        coords: None,
        infobox,
        content: format!("Person {} was born somewhere and wrote things.", i),
        updated_at: 1_700_000_000_000 + i as i64,
    }
}

pub fn place(i: usize, title: &str) -> ArticleRecord {
    let mut infobox = Infobox::new();
    infobox.insert("country".into(), InfoboxValue::Text("Germany".into()));
    infobox.insert("population".into(), InfoboxValue::Number(100_000.0 + i as f64));
    ArticleRecord {
        id: format!("L{:05}", i),
        article_type: ArticleType::Place,
        title: title.to_string(),
        description: format!("City {}", title),
        wikidata_id: None,
        coords: Some(Coords {
            lat: 48.0 + i as f64 / 10.0,
            lon: 9.0 + i as f64 / 10.0,
        }),
        infobox,
        content: format!("{} is a city.", title),
        updated_at: 1_600_000_000_000,
    }
}

/// Small writer thresholds so a few hundred records span several files and
/// row groups.
pub fn small_files(max_rows_per_file: usize, row_group_size: usize) -> WriterOptions {
    WriterOptions {
        thresholds: Thresholds {
            max_rows_per_file,
            ..Thresholds::default()
        },
        parquet: ParquetWriteOptions {
            row_group_size,
            ..ParquetWriteOptions::default()
        },
        ..WriterOptions::default()
    }
}

/// Persons 0..n born in one of three places. The places are ingested after
/// the persons, so every birthplace edge starts unresolved.
pub fn corpus(persons: usize) -> Vec<IngestItem> {
    const PLACES: [&str; 3] = ["Ulm", "Berlin", "Zürich"];
    let mut items: Vec<IngestItem> = (0..persons)
        .map(|i| {
            let mut record = person(i);
            record.infobox.insert(
                "birth_place".into(),
                InfoboxValue::Text(PLACES[i % PLACES.len()].into()),
            );
            let mut links = vec![LinkCandidate::link("Nowhere In Particular")];
            if i > 0 {
                links.push(LinkCandidate::link(format!("Person {}", i - 1)));
            }
            IngestItem { record, links }
        })
        .collect();
    items.extend(
        PLACES
            .iter()
            .enumerate()
            .map(|(i, title)| IngestItem::from(place(i, title))),
    );
    items
}

/// Write, reconcile and index a corpus under `root`.
pub fn build_store(
    root: &Path,
    items: Vec<IngestItem>,
    options: WriterOptions,
) -> anyhow::Result<(IngestOutcome, IndexSet)> {
    wikicol::logging::init_logger(false);
    let relationship_options = RelationshipOptions {
        max_rows_per_file: 200,
        ..RelationshipOptions::default()
    };
    let outcome = ingest_corpus(root, items, options, &relationship_options)?;
    let index = build_and_publish(root, IndexBuildOptions::default())?;
    Ok((outcome, index))
}
