//! Parquet footer parsing and physical layout.
//!
//! A Parquet file ends with `<metadata> <u32 LE metadata length> "PAR1"`.
//! The reader fetches a tail of the file, validates the trailer here, decodes
//! the metadata, and keeps a [`FileLayout`] summary of where every column
//! chunk lives so that later reads can request exactly those bytes.

use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions};
use parquet::file::metadata::{ColumnChunkMetaData, ParquetMetaData, ParquetMetaDataReader};
use std::ops::Range;
use std::sync::Arc;

use crate::constants::{FOOTER_TAIL_LEN, PARQUET_ENCRYPTED_MAGIC, PARQUET_MAGIC};
use crate::error::{Result, StoreError};

/// One leaf column of the file schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaElement {
    pub name: String,
    pub physical_type: String,
    pub nullable: bool,
}

/// Byte span of one column chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChunkInfo {
    /// Leaf column index.
    pub column: usize,
    pub range: Range<u64>,
    pub num_values: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGroupInfo {
    pub num_rows: u64,
    /// Index of this group's first row within the file.
    pub first_row: u64,
    pub columns: Vec<ColumnChunkInfo>,
}

/// Physical layout of one data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    pub file_len: u64,
    pub metadata_len: u64,
    pub num_rows: u64,
    pub schema: Vec<SchemaElement>,
    pub row_groups: Vec<RowGroupInfo>,
}

impl FileLayout {
    /// Leaf index of a column name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|s| s.name == name)
    }

    /// Offset where the footer metadata begins.
    pub fn metadata_start(&self) -> u64 {
        self.file_len.saturating_sub(FOOTER_TAIL_LEN + self.metadata_len)
    }
}

/// Decoded footer: layout summary plus what the Arrow decoder needs.
#[derive(Debug, Clone)]
pub struct ParsedFooter {
    pub layout: FileLayout,
    pub metadata: Arc<ParquetMetaData>,
    pub arrow: ArrowReaderMetadata,
}

/// Validate the 8-byte trailer and return the metadata length.
pub fn metadata_len(path: &str, trailer: &[u8], file_len: u64) -> Result<u64> {
    if trailer.len() != FOOTER_TAIL_LEN as usize {
        return Err(StoreError::format(
            path,
            format!("footer trailer must be 8 bytes, got {}", trailer.len()),
        ));
    }
    // leading magic + trailer
    if file_len < FOOTER_TAIL_LEN + 4 {
        return Err(StoreError::format(
            path,
            format!("file of {} bytes is too short for Parquet", file_len),
        ));
    }
    let magic = &trailer[4..8];
    if magic == PARQUET_ENCRYPTED_MAGIC {
        return Err(StoreError::format(path, "encrypted footers are not supported"));
    }
    if magic != PARQUET_MAGIC {
        return Err(StoreError::format(path, "missing PAR1 trailer magic"));
    }
    let len = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as u64;
    if len + FOOTER_TAIL_LEN + 4 > file_len {
        return Err(StoreError::format(
            path,
            format!(
                "footer declares {} metadata bytes but file is {} bytes",
                len, file_len
            ),
        ));
    }
    Ok(len)
}

/// Byte span of a column chunk, from its first page to the end of its
/// compressed data. Negative offsets or sizes are a corrupt footer.
pub fn chunk_range(path: &str, chunk: &ColumnChunkMetaData) -> Result<Range<u64>> {
    let start = chunk
        .dictionary_page_offset()
        .unwrap_or_else(|| chunk.data_page_offset());
    let start = u64::try_from(start).map_err(|_| {
        StoreError::format(
            path,
            format!("column chunk {} starts at negative offset {}", chunk.column_path(), start),
        )
    })?;
    let len = u64::try_from(chunk.compressed_size()).map_err(|_| {
        StoreError::format(
            path,
            format!(
                "column chunk {} has negative size {}",
                chunk.column_path(),
                chunk.compressed_size()
            ),
        )
    })?;
    let end = start.checked_add(len).ok_or_else(|| {
        StoreError::format(path, format!("column chunk {} overflows", chunk.column_path()))
    })?;
    Ok(start..end)
}

impl ParsedFooter {
    /// Decode footer metadata and check every column chunk lies in the data
    /// region of the file.
    pub fn decode(path: &str, metadata_bytes: &[u8], file_len: u64) -> Result<Self> {
        let metadata_len = metadata_bytes.len() as u64;
        let metadata = ParquetMetaDataReader::decode_metadata(metadata_bytes)
            .map_err(|e| StoreError::format(path, format!("decode footer: {}", e)))?;
        let metadata = Arc::new(metadata);

        let descr = metadata.file_metadata().schema_descr();
        let schema = descr
            .columns()
            .iter()
            .map(|c| SchemaElement {
                name: c.path().string(),
                physical_type: c.physical_type().to_string(),
                nullable: c.self_type().is_optional(),
            })
            .collect();

        let data_end = file_len.saturating_sub(FOOTER_TAIL_LEN + metadata_len);
        let mut row_groups = Vec::with_capacity(metadata.num_row_groups());
        let mut first_row = 0u64;
        for rg in metadata.row_groups() {
            let mut columns = Vec::with_capacity(rg.num_columns());
            for (column, chunk) in rg.columns().iter().enumerate() {
                let range = chunk_range(path, chunk)?;
                if range.end > data_end {
                    return Err(StoreError::OffsetOutOfBounds {
                        path: path.to_string(),
                        range,
                        file_len,
                    });
                }
                columns.push(ColumnChunkInfo {
                    column,
                    range,
                    num_values: chunk.num_values(),
                });
            }
            let num_rows = u64::try_from(rg.num_rows()).map_err(|_| {
                StoreError::format(path, format!("row group declares {} rows", rg.num_rows()))
            })?;
            row_groups.push(RowGroupInfo {
                num_rows,
                first_row,
                columns,
            });
            first_row += num_rows;
        }

        let arrow = ArrowReaderMetadata::try_new(metadata.clone(), ArrowReaderOptions::new())
            .map_err(|e| StoreError::schema(path, format!("arrow schema from footer: {}", e)))?;

        Ok(Self {
            layout: FileLayout {
                file_len,
                metadata_len,
                num_rows: first_row,
                schema,
                row_groups,
            },
            metadata,
            arrow,
        })
    }

    /// Row groups whose min/max statistics for `column` admit `value`.
    /// Groups without statistics are kept, an unknown column keeps them all.
    pub fn row_groups_containing(&self, column: &str, value: &str) -> Vec<usize> {
        let all = 0..self.metadata.num_row_groups();
        let Some(leaf) = self.layout.column_index(column) else {
            return all.collect();
        };
        let value = value.as_bytes();
        all.filter(|&rg| {
            let Some(stats) = self.metadata.row_group(rg).column(leaf).statistics() else {
                return true;
            };
            let below = stats.min_bytes_opt().is_some_and(|min| value < min);
            let above = stats.max_bytes_opt().is_some_and(|max| value > max);
            !(below || above)
        })
        .collect()
    }

    /// Leaf indices for a projection, in schema order. `None` selects all.
    pub fn projection(&self, path: &str, columns: Option<&[&str]>) -> Result<Vec<usize>> {
        let Some(names) = columns else {
            return Ok((0..self.layout.schema.len()).collect());
        };
        let mut indices = names
            .iter()
            .map(|name| {
                self.layout
                    .column_index(name)
                    .ok_or_else(|| StoreError::schema(path, format!("no column '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer(len: u32, magic: &[u8; 4]) -> Vec<u8> {
        let mut t = len.to_le_bytes().to_vec();
        t.extend_from_slice(magic);
        t
    }

    #[test]
    fn test_metadata_len_accepts_valid_trailer() {
        assert_eq!(metadata_len("a", &trailer(100, b"PAR1"), 1000).unwrap(), 100);
    }

    #[test]
    fn test_metadata_len_rejects_bad_trailers() {
        let err = metadata_len("a", &trailer(100, b"PARE"), 1000).unwrap_err();
        assert!(err.to_string().contains("encrypted"));
        assert!(metadata_len("a", &trailer(100, b"NOPE"), 1000).is_err());
        // declared length runs past the start of the file
        assert!(metadata_len("a", &trailer(995, b"PAR1"), 1000).is_err());
        assert!(metadata_len("a", &trailer(0, b"PAR1"), 8).is_err());
        assert!(metadata_len("a", b"PAR1", 1000).is_err());
    }

    fn chunk(dictionary: Option<i64>, data: i64, size: i64) -> ColumnChunkMetaData {
        use parquet::schema::parser::parse_message_type;
        use parquet::schema::types::SchemaDescriptor;

        let schema = parse_message_type("message m { required int64 a; }").unwrap();
        let descr = SchemaDescriptor::new(Arc::new(schema));
        ColumnChunkMetaData::builder(descr.column(0))
            .set_dictionary_page_offset(dictionary)
            .set_data_page_offset(data)
            .set_total_compressed_size(size)
            .build()
            .unwrap()
    }

    #[test]
    fn test_chunk_range_starts_at_dictionary_page() {
        assert_eq!(chunk_range("a", &chunk(None, 4, 100)).unwrap(), 4..104);
        assert_eq!(chunk_range("a", &chunk(Some(4), 40, 100)).unwrap(), 4..104);
    }

    #[test]
    fn test_chunk_range_rejects_negative_offsets() {
        for bad in [chunk(None, -8, 100), chunk(Some(-1), 40, 100), chunk(None, 4, -100)] {
            let err = chunk_range("a", &bad).unwrap_err();
            assert!(matches!(err, StoreError::Format { .. }), "{}", err);
        }
    }

    #[test]
    fn test_decode_rejects_negative_chunk_offset() {
        use arrow::array::Int64Array;
        use arrow::record_batch::RecordBatch;
        use bytes::Bytes;
        use parquet::arrow::ArrowWriter;
        use parquet::file::metadata::ParquetMetaDataWriter;
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let batch =
            RecordBatch::try_from_iter([("a", Arc::new(Int64Array::from(vec![1, 2, 3])) as _)])
                .unwrap();
        let mut file = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut file, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        let file_len = file.len() as u64;
        let reader = SerializedFileReader::new(Bytes::from(file)).unwrap();
        let metadata = reader.metadata().clone();

        let row_group = metadata.row_group(0).clone();
        let corrupt = row_group
            .column(0)
            .clone()
            .into_builder()
            .set_dictionary_page_offset(None)
            .set_data_page_offset(-5)
            .build()
            .unwrap();
        let row_group = row_group
            .into_builder()
            .set_column_metadata(vec![corrupt])
            .build()
            .unwrap();
        let corrupt = ParquetMetaData::new(metadata.file_metadata().clone(), vec![row_group]);

        let mut footer = Vec::new();
        ParquetMetaDataWriter::new(&mut footer, &corrupt).finish().unwrap();
        let body = &footer[..footer.len() - FOOTER_TAIL_LEN as usize];
        let err = ParsedFooter::decode("a.parquet", body, file_len + footer.len() as u64)
            .unwrap_err();
        assert!(matches!(err, StoreError::Format { .. }), "{}", err);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ParsedFooter::decode("a", &[0xff; 32], 1000),
            Err(StoreError::Format { .. })
        ));
    }
}
