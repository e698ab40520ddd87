//! Infobox shredding: promoting frequent keys to typed columns.
//!
//! The plan for a partition is inferred once from a sample of that
//! partition's records and then applied to every record written into it.
//! Values that do not fit a promoted column's kind stay in the overflow map,
//! so `shred` followed by `reconstruct` always returns the original infobox.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::options::ShreddingPolicy;
use crate::constants::SHREDDED_PREFIX;
use crate::error::{Result, StoreError};
use crate::types::{ArticleRecord, Infobox, InfoboxValue, ValueKind};

/// One promoted infobox key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShreddedColumn {
    pub key: String,
    pub kind: ValueKind,
}

impl ShreddedColumn {
    /// Parquet column name for this key.
    pub fn column_name(&self) -> String {
        format!("{}{}", SHREDDED_PREFIX, self.key)
    }
}

/// Columns promoted for one partition, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShreddingPlan {
    pub columns: Vec<ShreddedColumn>,
}

/// A record's infobox split along a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ShreddedInfobox {
    /// One slot per plan column, in plan order.
    pub fields: Vec<Option<InfoboxValue>>,
    /// Keys not promoted, or whose value kind did not match.
    pub overflow: Infobox,
}

impl ShreddingPlan {
    /// Infer a plan from sampled records.
    ///
    /// Deterministic: keys are ranked by presence count (descending) then key,
    /// the top `max_columns` above `min_frequency` are kept, and each column
    /// takes the most frequent scalar kind observed for its key (text on ties).
    /// Keys observed only with list values are never promoted.
    pub fn infer(sample: &[ArticleRecord], policy: &ShreddingPolicy) -> Self {
        if sample.is_empty() {
            return Self::default();
        }

        let mut presence: HashMap<&str, usize> = HashMap::new();
        let mut kinds: HashMap<&str, HashMap<ValueKind, usize>> = HashMap::new();
        for record in sample {
            for (key, value) in &record.infobox {
                *presence.entry(key.as_str()).or_default() += 1;
                *kinds
                    .entry(key.as_str())
                    .or_default()
                    .entry(value.kind())
                    .or_default() += 1;
            }
        }

        let min_count = (policy.min_frequency * sample.len() as f64).ceil() as usize;
        let mut ranked: Vec<(&str, usize)> = presence
            .into_iter()
            .filter(|&(_, count)| count >= min_count.max(1))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

        let mut columns: Vec<ShreddedColumn> = ranked
            .into_iter()
            .filter_map(|(key, _)| {
                let kind = kinds
                    .get(key)?
                    .iter()
                    .filter(|(k, _)| **k != ValueKind::List)
                    .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                    .map(|(k, _)| *k)?;
                Some(ShreddedColumn {
                    key: key.to_string(),
                    kind,
                })
            })
            .take(policy.max_columns)
            .collect();
        columns.sort_by(|a, b| a.key.cmp(&b.key));

        log::debug!(
            "Shredding plan from {} sampled records: {} columns",
            sample.len(),
            columns.len()
        );
        Self { columns }
    }

    /// Split an infobox along this plan.
    ///
    /// Non-finite numbers cannot be represented in the JSON overflow, so they
    /// are rejected unless their key is a numeric column.
    pub fn shred(&self, infobox: &Infobox) -> Result<ShreddedInfobox> {
        let mut fields = vec![None; self.columns.len()];
        let mut overflow = Infobox::new();

        for (key, value) in infobox {
            let slot = self
                .columns
                .binary_search_by(|c| c.key.as_str().cmp(key.as_str()))
                .ok()
                .filter(|&i| self.columns[i].kind == value.kind());
            match slot {
                Some(i) => fields[i] = Some(value.clone()),
                None => {
                    if let InfoboxValue::Number(n) = value {
                        if !n.is_finite() {
                            return Err(StoreError::Shredding(format!(
                                "non-finite number for long-tail infobox key '{}'",
                                key
                            )));
                        }
                    }
                    overflow.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(ShreddedInfobox { fields, overflow })
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.column_name()).collect()
    }
}

impl ShreddedInfobox {
    /// Rebuild the original infobox.
    pub fn reconstruct(&self, plan: &ShreddingPlan) -> Result<Infobox> {
        if self.fields.len() != plan.columns.len() {
            return Err(StoreError::Shredding(format!(
                "{} shredded fields for a {}-column plan",
                self.fields.len(),
                plan.columns.len()
            )));
        }
        let mut infobox = self.overflow.clone();
        for (column, value) in plan.columns.iter().zip(&self.fields) {
            if let Some(value) = value {
                if infobox.insert(column.key.clone(), value.clone()).is_some() {
                    return Err(StoreError::Shredding(format!(
                        "key '{}' present both as column and in overflow",
                        column.key
                    )));
                }
            }
        }
        Ok(infobox)
    }

    /// Overflow as a JSON object, `None` when empty.
    pub fn overflow_json(&self) -> Result<Option<String>> {
        if self.overflow.is_empty() {
            return Ok(None);
        }
        serde_json::to_string(&self.overflow)
            .map(Some)
            .map_err(|e| StoreError::encoding(format!("serialize infobox overflow: {}", e)))
    }
}

/// Parse an overflow JSON blob.
pub fn parse_overflow(json: &str) -> Result<Infobox> {
    serde_json::from_str(json)
        .map_err(|e| StoreError::encoding(format!("parse infobox overflow: {}", e)))
}
