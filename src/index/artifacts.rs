//! Versioned binary encoding of index artifacts.
//!
//! ```text
//! [0..4)   magic "WKIX"
//! [4..8)   format version, u32 little-endian
//! [8]      artifact kind
//! [9]      1 if the payload is gzip-compressed, else 0
//! [10..)   bincode payload
//! ```

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use crate::constants::{ARTIFACT_MAGIC, ARTIFACT_VERSION};
use crate::error::{Result, StoreError};

const HEADER_LEN: usize = 10;

/// Artifact file names inside a snapshot directory.
pub mod names {
    pub const TITLE_INDEX: &str = "title.idx";
    pub const ID_INDEX: &str = "id.idx";
    pub const TYPE_MANIFEST: &str = "types.idx";
    pub const BLOOM: &str = "bloom.idx";
    pub const EDGE_CATALOG: &str = "edges.idx";
}

/// What an artifact blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArtifactKind {
    TitleIndex = 1,
    IdIndex = 2,
    TypeManifest = 3,
    Bloom = 4,
    EdgeCatalog = 5,
}

impl ArtifactKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(ArtifactKind::TitleIndex),
            2 => Some(ArtifactKind::IdIndex),
            3 => Some(ArtifactKind::TypeManifest),
            4 => Some(ArtifactKind::Bloom),
            5 => Some(ArtifactKind::EdgeCatalog),
            _ => None,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::TitleIndex => names::TITLE_INDEX,
            ArtifactKind::IdIndex => names::ID_INDEX,
            ArtifactKind::TypeManifest => names::TYPE_MANIFEST,
            ArtifactKind::Bloom => names::BLOOM,
            ArtifactKind::EdgeCatalog => names::EDGE_CATALOG,
        }
    }
}

/// Serialize an artifact with its header.
pub fn encode_artifact<T: Serialize>(kind: ArtifactKind, value: &T, compress: bool) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)
        .map_err(|e| StoreError::encoding(format!("serialize {:?}: {}", kind, e)))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(ARTIFACT_MAGIC);
    out.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
    out.push(kind as u8);
    out.push(compress as u8);

    if compress {
        let mut encoder = GzEncoder::new(out, Compression::default());
        encoder
            .write_all(&payload)
            .map_err(|e| StoreError::encoding(format!("compress {:?}: {}", kind, e)))?;
        encoder
            .finish()
            .map_err(|e| StoreError::encoding(format!("compress {:?}: {}", kind, e)))
    } else {
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// Check the header and decode an artifact. Decompression is transparent.
pub fn decode_artifact<T: DeserializeOwned>(
    expected: ArtifactKind,
    bytes: &[u8],
    origin: &str,
) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(StoreError::format(
            origin,
            format!("artifact truncated: {} bytes", bytes.len()),
        ));
    }
    if &bytes[0..4] != ARTIFACT_MAGIC {
        return Err(StoreError::format(origin, "invalid artifact magic"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version > ARTIFACT_VERSION {
        return Err(StoreError::format(
            origin,
            format!(
                "unsupported artifact version: {} (max supported: {})",
                version, ARTIFACT_VERSION
            ),
        ));
    }
    match ArtifactKind::from_byte(bytes[8]) {
        Some(kind) if kind == expected => {}
        Some(kind) => {
            return Err(StoreError::format(
                origin,
                format!("expected {:?} artifact, found {:?}", expected, kind),
            ))
        }
        None => {
            return Err(StoreError::format(
                origin,
                format!("unknown artifact kind {}", bytes[8]),
            ))
        }
    }

    let body = &bytes[HEADER_LEN..];
    let decoded = match bytes[9] {
        0 => bincode::deserialize(body),
        1 => {
            let mut payload = Vec::new();
            GzDecoder::new(body)
                .read_to_end(&mut payload)
                .map_err(|e| StoreError::format(origin, format!("decompress artifact: {}", e)))?;
            bincode::deserialize(&payload)
        }
        other => {
            return Err(StoreError::format(
                origin,
                format!("unknown compression flag {}", other),
            ))
        }
    };
    decoded.map_err(|e| StoreError::format(origin, format!("decode {:?}: {}", expected, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample() -> BTreeMap<String, u32> {
        (0..100).map(|i| (format!("key {}", i), i)).collect()
    }

    #[test]
    fn test_plain_and_compressed_decode_alike() {
        let plain = encode_artifact(ArtifactKind::IdIndex, &sample(), false).unwrap();
        let packed = encode_artifact(ArtifactKind::IdIndex, &sample(), true).unwrap();
        assert_eq!(&plain[0..4], b"WKIX");
        assert_eq!(packed[9], 1);
        assert!(packed.len() < plain.len());

        let a: BTreeMap<String, u32> = decode_artifact(ArtifactKind::IdIndex, &plain, "id.idx").unwrap();
        let b: BTreeMap<String, u32> = decode_artifact(ArtifactKind::IdIndex, &packed, "id.idx").unwrap();
        assert_eq!(a, sample());
        assert_eq!(b, sample());
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let blob = encode_artifact(ArtifactKind::Bloom, &sample(), false).unwrap();
        let err = decode_artifact::<BTreeMap<String, u32>>(ArtifactKind::TitleIndex, &blob, "t")
            .unwrap_err();
        assert!(err.to_string().contains("expected TitleIndex"));
    }

    #[test]
    fn test_corrupt_header_rejected() {
        assert!(decode_artifact::<u32>(ArtifactKind::Bloom, b"WKIX", "b").is_err());

        let mut blob = encode_artifact(ArtifactKind::Bloom, &7u32, false).unwrap();
        blob[0] = b'X';
        assert!(decode_artifact::<u32>(ArtifactKind::Bloom, &blob, "b").is_err());

        let mut blob = encode_artifact(ArtifactKind::Bloom, &7u32, false).unwrap();
        blob[4] = 99;
        assert!(matches!(
            decode_artifact::<u32>(ArtifactKind::Bloom, &blob, "b"),
            Err(StoreError::Format { .. })
        ));
    }
}
