//! End-to-end tests of the write side: partitioned writer, manifest merge,
//! relationship partitions and the index builder.

mod common;

use anyhow::Result;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use tempfile::tempdir;

use common::{build_store, corpus, person, small_files, Mix};
use wikicol::index::{artifacts, decode_artifact, ArtifactKind, TitleIndex};
use wikicol::store::{EdgeCatalog, Thresholds};
use wikicol::{
    merge_manifests, ArticleType, Direction, ErrorKind, Manifest, PartitionedWriter, StoreError,
    WriterOptions,
};

#[test]
fn test_thousand_persons_split_at_300_rows() -> Result<()> {
    let dir = tempdir()?;
    let mut writer = PartitionedWriter::create(dir.path(), small_files(300, 4096))?;
    writer.write_all((0..1000).map(person))?;
    let outcome = writer.finish()?;

    let counts: Vec<u64> = outcome.results.iter().map(|r| r.row_count).collect();
    assert_eq!(counts, vec![300, 300, 300, 100]);
    assert_eq!(outcome.manifest.count(ArticleType::Person), 1000);

    // the saved manifest agrees with the files on disk
    let manifest = Manifest::load(dir.path())?;
    assert_eq!(manifest, outcome.manifest);
    for (_, file) in manifest.files() {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(dir.path().join(&file.path))?)?;
        assert_eq!(reader.metadata().file_metadata().num_rows() as u64, file.row_count);
        assert_eq!(std::fs::metadata(dir.path().join(&file.path))?.len(), file.byte_size);
    }
    Ok(())
}

#[test]
fn test_byte_budget_bounds_every_file() -> Result<()> {
    let dir = tempdir()?;
    let cap = 64 * 1024;
    let options = WriterOptions {
        thresholds: Thresholds {
            max_rows_per_file: 1_000_000,
            max_file_bytes: cap,
        },
        ..WriterOptions::default()
    };
    let mut writer = PartitionedWriter::create(dir.path(), options)?;
    writer.write_all((0..2000).map(person))?;
    let outcome = writer.finish()?;

    assert!(outcome.results.len() > 1);
    assert!(outcome.results.iter().all(|r| r.byte_size <= cap));
    let total: u64 = outcome.results.iter().map(|r| r.row_count).sum();
    assert_eq!(total, 2000);
    Ok(())
}

#[test]
fn test_byte_budget_holds_for_large_incompressible_records() -> Result<()> {
    let dir = tempdir()?;
    let cap = 2 * 1024 * 1024;
    let options = WriterOptions {
        thresholds: Thresholds {
            max_rows_per_file: 1_000_000,
            max_file_bytes: cap,
        },
        ..WriterOptions::default()
    };
    let mut writer = PartitionedWriter::create(dir.path(), options)?;
    let mut mix = Mix(7);
    writer.write_all((0..60).map(|i| {
        let mut record = person(i);
        record.content = mix.text(100_000);
        record
    }))?;
    let outcome = writer.finish()?;

    assert!(outcome.results.len() >= 3);
    for result in &outcome.results {
        let on_disk = std::fs::metadata(dir.path().join(&result.path))?.len();
        assert!(on_disk <= cap, "{} is {} bytes", result.path, on_disk);
    }
    assert_eq!(outcome.manifest.count(ArticleType::Person), 60);
    Ok(())
}

#[test]
fn test_oversized_record_is_fatal() -> Result<()> {
    let dir = tempdir()?;
    let options = WriterOptions {
        thresholds: Thresholds {
            max_rows_per_file: 100,
            max_file_bytes: 32 * 1024,
        },
        ..WriterOptions::default()
    };
    let mut writer = PartitionedWriter::create(dir.path(), options)?;
    let mut huge = person(1);
    huge.content = "x".repeat(64 * 1024);

    // the record is buffered for sampling, but its size is checked up front
    let err = writer.write(huge).unwrap_err();
    assert!(matches!(err, StoreError::FileLimitExceeded { .. }));
    assert_eq!(err.kind(), ErrorKind::Write);
    Ok(())
}

fn shard(prefix: &str, ids: std::ops::Range<usize>) -> Result<Manifest> {
    let dir = tempdir()?;
    let options = WriterOptions {
        file_prefix: prefix.to_string(),
        ..small_files(50, 4096)
    };
    let mut writer = PartitionedWriter::create(dir.path(), options)?;
    writer.write_all(ids.map(person))?;
    Ok(writer.finish()?.manifest)
}

#[test]
fn test_merge_is_commutative_and_associative() -> Result<()> {
    let a = shard("a", 0..120)?;
    let b = shard("b", 120..200)?;
    let c = shard("c", 200..230)?;

    let ab = merge_manifests(&[a.clone(), b.clone()])?;
    let ba = merge_manifests(&[b.clone(), a.clone()])?;
    assert_eq!(ab, ba);

    let ab_c = merge_manifests(&[ab, c.clone()])?;
    let a_bc = merge_manifests(&[a.clone(), merge_manifests(&[b.clone(), c.clone()])?])?;
    assert_eq!(ab_c, a_bc);
    assert_eq!(ab_c.count(ArticleType::Person), 230);

    // the same shard twice is a duplicate
    let err = merge_manifests(&[a.clone(), a]).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateFile { .. }));
    assert_eq!(err.kind(), ErrorKind::Merge);
    Ok(())
}

#[test]
fn test_ingest_writes_mirrored_edge_partitions() -> Result<()> {
    let dir = tempdir()?;
    let (outcome, index) = build_store(dir.path(), corpus(400), small_files(150, 64))?;

    assert_eq!(outcome.write.manifest.count(ArticleType::Person), 400);
    assert_eq!(outcome.write.manifest.count(ArticleType::Place), 3);
    // one dangling raw link per person, one unknown country per place
    assert_eq!(outcome.unresolved_edges, 403);

    let catalog = EdgeCatalog::load(dir.path())?.expect("catalog written");
    assert_eq!(catalog, outcome.edges);
    assert_eq!(index.edges.as_ref(), Some(&catalog));

    // every source id lives in exactly one forward file
    let forward = catalog.files(Direction::Forward);
    assert!(forward.len() > 1);
    for pair in forward.windows(2) {
        assert!(pair[0].max_from_id < pair[1].min_from_id);
    }

    // birthplace (400) and previous-person (399) edges resolved and mirrored
    let forward_rows: u64 = forward.iter().map(|f| f.row_count).sum();
    let reverse_rows: u64 = catalog.files(Direction::Reverse).iter().map(|f| f.row_count).sum();
    assert_eq!(forward_rows, 400 + 399 + 403);
    assert_eq!(reverse_rows, 400 + 399);
    Ok(())
}

#[test]
fn test_published_snapshot_is_activated_by_current() -> Result<()> {
    let dir = tempdir()?;
    let (_, index) = build_store(dir.path(), corpus(50), small_files(20, 8))?;

    let current = std::fs::read_to_string(dir.path().join("CURRENT"))?;
    assert_eq!(current.trim(), index.snapshot_id);

    let blob = std::fs::read(
        dir.path()
            .join(&index.snapshot_id)
            .join(artifacts::names::TITLE_INDEX),
    )?;
    let titles: TitleIndex = decode_artifact(ArtifactKind::TitleIndex, &blob, "title.idx")?;
    assert_eq!(titles.len(), 53);
    assert_eq!(titles, index.titles);

    // every normalized title is in the bloom filter
    for entry in titles.iter() {
        assert!(index.bloom.contains(&entry.key));
    }
    Ok(())
}
