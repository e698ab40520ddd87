//! Arrow schema of article data files and the batch builder that fills it.
//!
//! Column order is fixed: the core columns, then one column per shredded
//! infobox key (plan order), then the overflow blob, content and timestamp.
//! The shredding plan is recoverable from the schema alone, so readers need
//! no side channel to rebuild infoboxes.

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;

use super::shred::{ShreddedColumn, ShreddingPlan};
use crate::constants::{SCHEMA_VERSION, SCHEMA_VERSION_KEY, SHREDDED_PREFIX};
use crate::error::{Result, StoreError};
use crate::types::{ArticleRecord, InfoboxValue, ValueKind};

/// Fixed column names.
pub mod columns {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const WIKIDATA_ID: &str = "wikidata_id";
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";
    pub const INFOBOX_OVERFLOW: &str = "infobox_overflow";
    pub const CONTENT: &str = "content";
    pub const UPDATED_AT: &str = "updated_at";
}

fn kind_data_type(kind: ValueKind) -> Result<DataType> {
    match kind {
        ValueKind::Text => Ok(DataType::Utf8),
        ValueKind::Number => Ok(DataType::Float64),
        ValueKind::Flag => Ok(DataType::Boolean),
        ValueKind::List => Err(StoreError::Shredding(
            "list values cannot be promoted to a column".to_string(),
        )),
    }
}

/// Build the data file schema for a shredding plan.
pub fn article_schema(plan: &ShreddingPlan) -> Result<SchemaRef> {
    let mut fields = vec![
        Field::new(columns::ID, DataType::Utf8, false),
        Field::new(columns::TYPE, DataType::Utf8, false),
        Field::new(columns::TITLE, DataType::Utf8, false),
        Field::new(columns::DESCRIPTION, DataType::Utf8, false),
        Field::new(columns::WIKIDATA_ID, DataType::Utf8, true),
        Field::new(columns::LAT, DataType::Float64, true),
        Field::new(columns::LON, DataType::Float64, true),
    ];
    for column in &plan.columns {
        fields.push(Field::new(
            column.column_name(),
            kind_data_type(column.kind)?,
            true,
        ));
    }
    fields.push(Field::new(columns::INFOBOX_OVERFLOW, DataType::Utf8, true));
    fields.push(Field::new(columns::CONTENT, DataType::Utf8, false));
    fields.push(Field::new(columns::UPDATED_AT, DataType::Int64, false));

    let metadata = HashMap::from([(
        SCHEMA_VERSION_KEY.to_string(),
        SCHEMA_VERSION.to_string(),
    )]);
    Ok(Arc::new(Schema::new_with_metadata(fields, metadata)))
}

/// Recover the shredding plan from a data file schema.
pub fn plan_from_schema(schema: &Schema) -> Result<ShreddingPlan> {
    let mut plan = ShreddingPlan::default();
    for field in schema.fields() {
        let Some(key) = field.name().strip_prefix(SHREDDED_PREFIX) else {
            continue;
        };
        let kind = match field.data_type() {
            DataType::Utf8 | DataType::LargeUtf8 => ValueKind::Text,
            DataType::Float64 => ValueKind::Number,
            DataType::Boolean => ValueKind::Flag,
            other => {
                return Err(StoreError::Shredding(format!(
                    "unsupported shredded column type {} for '{}'",
                    other,
                    field.name()
                )))
            }
        };
        plan.columns.push(ShreddedColumn {
            key: key.to_string(),
            kind,
        });
    }
    Ok(plan)
}

enum ShreddedBuilder {
    Text(StringBuilder),
    Number(Float64Builder),
    Flag(BooleanBuilder),
}

impl ShreddedBuilder {
    fn new(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Number => ShreddedBuilder::Number(Float64Builder::new()),
            ValueKind::Flag => ShreddedBuilder::Flag(BooleanBuilder::new()),
            ValueKind::Text | ValueKind::List => ShreddedBuilder::Text(StringBuilder::new()),
        }
    }

    fn append(&mut self, value: Option<&InfoboxValue>) {
        match (self, value) {
            (ShreddedBuilder::Text(b), Some(InfoboxValue::Text(s))) => b.append_value(s),
            (ShreddedBuilder::Number(b), Some(InfoboxValue::Number(n))) => b.append_value(*n),
            (ShreddedBuilder::Flag(b), Some(InfoboxValue::Flag(f))) => b.append_value(*f),
            (ShreddedBuilder::Text(b), _) => b.append_null(),
            (ShreddedBuilder::Number(b), _) => b.append_null(),
            (ShreddedBuilder::Flag(b), _) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ShreddedBuilder::Text(b) => Arc::new(b.finish()),
            ShreddedBuilder::Number(b) => Arc::new(b.finish()),
            ShreddedBuilder::Flag(b) => Arc::new(b.finish()),
        }
    }
}

/// Accumulates records into a RecordBatch of the article schema.
pub struct ArticleBatchBuilder {
    schema: SchemaRef,
    plan: ShreddingPlan,
    id: StringBuilder,
    article_type: StringBuilder,
    title: StringBuilder,
    description: StringBuilder,
    wikidata_id: StringBuilder,
    lat: Float64Builder,
    lon: Float64Builder,
    shredded: Vec<ShreddedBuilder>,
    overflow: StringBuilder,
    content: StringBuilder,
    updated_at: Int64Builder,
    len: usize,
}

impl ArticleBatchBuilder {
    pub fn new(plan: ShreddingPlan) -> Result<Self> {
        let schema = article_schema(&plan)?;
        let shredded = plan
            .columns
            .iter()
            .map(|c| ShreddedBuilder::new(c.kind))
            .collect();
        Ok(Self {
            schema,
            plan,
            id: StringBuilder::new(),
            article_type: StringBuilder::new(),
            title: StringBuilder::new(),
            description: StringBuilder::new(),
            wikidata_id: StringBuilder::new(),
            lat: Float64Builder::new(),
            lon: Float64Builder::new(),
            shredded,
            overflow: StringBuilder::new(),
            content: StringBuilder::new(),
            updated_at: Int64Builder::new(),
            len: 0,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn plan(&self) -> &ShreddingPlan {
        &self.plan
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shred and append one record.
    pub fn append(&mut self, record: &ArticleRecord) -> Result<()> {
        let shredded = self.plan.shred(&record.infobox)?;
        let overflow = shredded.overflow_json()?;

        self.id.append_value(&record.id);
        self.article_type.append_value(record.article_type.as_str());
        self.title.append_value(&record.title);
        self.description.append_value(&record.description);
        self.wikidata_id.append_option(record.wikidata_id.as_deref());
        self.lat.append_option(record.coords.map(|c| c.lat));
        self.lon.append_option(record.coords.map(|c| c.lon));
        for (builder, value) in self.shredded.iter_mut().zip(&shredded.fields) {
            builder.append(value.as_ref());
        }
        self.overflow.append_option(overflow.as_deref());
        self.content.append_value(&record.content);
        self.updated_at.append_value(record.updated_at);
        self.len += 1;
        Ok(())
    }

    /// Drain accumulated rows into a RecordBatch.
    pub fn finish(&mut self) -> Result<RecordBatch> {
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(self.id.finish()),
            Arc::new(self.article_type.finish()),
            Arc::new(self.title.finish()),
            Arc::new(self.description.finish()),
            Arc::new(self.wikidata_id.finish()),
            Arc::new(self.lat.finish()),
            Arc::new(self.lon.finish()),
        ];
        arrays.extend(self.shredded.iter_mut().map(|b| b.finish()));
        arrays.push(Arc::new(self.overflow.finish()));
        arrays.push(Arc::new(self.content.finish()));
        arrays.push(Arc::new(self.updated_at.finish()));
        self.len = 0;
        Ok(RecordBatch::try_new(self.schema.clone(), arrays)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArticleType, Coords, Infobox};
    use arrow::array::Array;

    fn plan() -> ShreddingPlan {
        ShreddingPlan {
            columns: vec![
                ShreddedColumn {
                    key: "born".to_string(),
                    kind: ValueKind::Text,
                },
                ShreddedColumn {
                    key: "height".to_string(),
                    kind: ValueKind::Number,
                },
            ],
        }
    }

    #[test]
    fn test_schema_column_order() {
        let schema = article_schema(&plan()).unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "type",
                "title",
                "description",
                "wikidata_id",
                "lat",
                "lon",
                "ib_born",
                "ib_height",
                "infobox_overflow",
                "content",
                "updated_at"
            ]
        );
        assert_eq!(plan_from_schema(&schema).unwrap(), plan());
    }

    #[test]
    fn test_batch_builder() {
        let mut builder = ArticleBatchBuilder::new(plan()).unwrap();
        let mut infobox = Infobox::new();
        infobox.insert("born".to_string(), InfoboxValue::Text("1879".to_string()));
        infobox.insert("motto".to_string(), InfoboxValue::Text("E=mc2".to_string()));
        let record = ArticleRecord {
            id: "Q937".to_string(),
            article_type: ArticleType::Person,
            title: "Albert Einstein".to_string(),
            description: "physicist".to_string(),
            wikidata_id: Some("Q937".to_string()),
            coords: Some(Coords { lat: 48.4, lon: 9.99 }),
            infobox,
            content: "…".to_string(),
            updated_at: 1_700_000_000_000,
        };
        builder.append(&record).unwrap();
        builder.append(&record).unwrap();
        assert_eq!(builder.len(), 2);

        let batch = builder.finish().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 12);
        assert!(builder.is_empty());
        // height absent -> null
        assert_eq!(batch.column(8).null_count(), 2);
    }

    #[test]
    fn test_list_column_rejected() {
        let plan = ShreddingPlan {
            columns: vec![ShreddedColumn {
                key: "spouses".to_string(),
                kind: ValueKind::List,
            }],
        };
        assert!(article_schema(&plan).is_err());
    }
}
