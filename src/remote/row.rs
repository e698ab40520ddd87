//! Decoded rows and their conversion back into articles and edges.

use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeStringArray,
    StringArray,
};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::{Result, StoreError};
use crate::store::relationships::edge_columns;
use crate::store::schema::{columns, plan_from_schema};
use crate::store::shred::{parse_overflow, ShreddedInfobox};
use crate::store::{Predicate, Relationship};
use crate::types::{Article, ArticleType, Coords, Infobox, InfoboxValue};

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// One decoded row; values are in the schema order of the (projected) batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: SchemaRef,
    values: Vec<Value>,
}

fn cell(path: &str, array: &dyn Array, name: &str, i: usize) -> Result<Value> {
    if array.is_null(i) {
        return Ok(Value::Null);
    }
    macro_rules! downcast {
        ($ty:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .ok_or_else(|| StoreError::schema(path, format!("bad array for column '{}'", name)))?
                .value(i)
        };
    }
    Ok(match array.data_type() {
        DataType::Utf8 => Value::Text(downcast!(StringArray).to_string()),
        DataType::LargeUtf8 => Value::Text(downcast!(LargeStringArray).to_string()),
        DataType::Int64 => Value::Int(downcast!(Int64Array)),
        DataType::Int32 => Value::Int(downcast!(Int32Array) as i64),
        DataType::Float64 => Value::Float(downcast!(Float64Array)),
        DataType::Float32 => Value::Float(downcast!(Float32Array) as f64),
        DataType::Boolean => Value::Bool(downcast!(BooleanArray)),
        other => {
            return Err(StoreError::schema(
                path,
                format!("unsupported type {} for column '{}'", other, name),
            ))
        }
    })
}

/// Split a batch into rows.
pub fn rows_from_batch(path: &str, batch: &RecordBatch) -> Result<Vec<Row>> {
    let schema = batch.schema();
    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let values = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| cell(path, array.as_ref(), field.name(), i))
            .collect::<Result<Vec<_>>>()?;
        rows.push(Row {
            schema: schema.clone(),
            values,
        });
    }
    Ok(rows)
}

impl Row {
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(column, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .zip(&self.values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.schema.index_of(name).ok()?;
        self.values.get(idx)
    }

    fn required_text(&self, path: &str, name: &str) -> Result<String> {
        self.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::schema(path, format!("row lacks text column '{}'", name)))
    }

    fn optional_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::as_str).map(str::to_string)
    }

    /// Rebuild the article; requires a full-row read.
    pub fn into_article(self, path: &str) -> Result<Article> {
        let article_type: ArticleType = self.required_text(path, columns::TYPE)?.parse()?;
        let updated_at = self
            .get(columns::UPDATED_AT)
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::schema(path, "row lacks 'updated_at'"))?;
        let coords = match (
            self.get(columns::LAT).and_then(Value::as_f64),
            self.get(columns::LON).and_then(Value::as_f64),
        ) {
            (Some(lat), Some(lon)) => Some(Coords { lat, lon }),
            _ => None,
        };

        let plan = plan_from_schema(&self.schema)?;
        let fields = plan
            .columns
            .iter()
            .map(|column| {
                Ok(match self.get(&column.column_name()) {
                    None | Some(Value::Null) => None,
                    Some(Value::Text(s)) => Some(InfoboxValue::Text(s.clone())),
                    Some(Value::Float(f)) => Some(InfoboxValue::Number(*f)),
                    Some(Value::Bool(b)) => Some(InfoboxValue::Flag(*b)),
                    Some(other) => {
                        return Err(StoreError::schema(
                            path,
                            format!("unexpected value {:?} in '{}'", other, column.column_name()),
                        ))
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let overflow = match self.optional_text(columns::INFOBOX_OVERFLOW) {
            Some(json) => parse_overflow(&json)?,
            None => Infobox::new(),
        };
        let infobox = ShreddedInfobox { fields, overflow }.reconstruct(&plan)?;

        Ok(Article {
            id: self.required_text(path, columns::ID)?,
            article_type,
            title: self.required_text(path, columns::TITLE)?,
            description: self.required_text(path, columns::DESCRIPTION)?,
            wikidata_id: self.optional_text(columns::WIKIDATA_ID),
            coords,
            infobox,
            content: self.required_text(path, columns::CONTENT)?,
            updated_at,
        })
    }

    /// Rebuild a relationship edge.
    pub fn into_relationship(self, path: &str) -> Result<Relationship> {
        Ok(Relationship {
            from_id: self.required_text(path, edge_columns::FROM_ID)?,
            from_title: self.required_text(path, edge_columns::FROM_TITLE)?,
            to_id: self.optional_text(edge_columns::TO_ID),
            to_title: self.required_text(path, edge_columns::TO_TITLE)?,
            predicate: self
                .required_text(path, edge_columns::PREDICATE)?
                .parse::<Predicate>()?,
        })
    }
}
