use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::InstrumentCode;

/// Named numeric fields for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub code: InstrumentCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub values: BTreeMap<String, f64>,
}

impl MetricRow {
    pub fn new(code: InstrumentCode) -> Self {
        Self {
            code,
            label: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Stores `value` under `field`. Missing and non-finite values are not stored,
    /// so an absent key always means "unavailable".
    pub fn set(&mut self, field: &str, value: Option<f64>) {
        match value {
            Some(v) if v.is_finite() => {
                self.values.insert(field.to_owned(), v);
            }
            _ => {
                self.values.remove(field);
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }

    pub fn has_all(&self, fields: &[&str]) -> bool {
        fields.iter().all(|field| self.values.contains_key(*field))
    }
}

/// Rows dropped because a required field was unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRow {
    pub code: InstrumentCode,
    pub missing: Vec<String>,
}

/// Instrument code to named numeric fields, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTable {
    rows: Vec<MetricRow>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<MetricRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: MetricRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, code: &InstrumentCode) -> Option<&MetricRow> {
        self.rows.iter().find(|row| &row.code == code)
    }

    pub fn codes(&self) -> Vec<InstrumentCode> {
        self.rows.iter().map(|row| row.code.clone()).collect()
    }

    /// Values of `field` in row order. Only meaningful after
    /// [`retain_complete`](Self::retain_complete) for that field.
    pub fn column(&self, field: &str) -> Vec<f64> {
        self.rows.iter().filter_map(|row| row.get(field)).collect()
    }

    /// Drops every row that lacks one of `fields` and returns what was dropped.
    pub fn retain_complete(&mut self, fields: &[&str]) -> Vec<DroppedRow> {
        let mut dropped = Vec::new();
        self.rows.retain(|row| {
            if row.has_all(fields) {
                return true;
            }
            dropped.push(DroppedRow {
                code: row.code.clone(),
                missing: fields
                    .iter()
                    .filter(|field| !row.values.contains_key(**field))
                    .map(|field| (*field).to_owned())
                    .collect(),
            });
            false
        });
        dropped
    }

    /// Keeps rows whose code satisfies `keep`.
    pub fn retain_codes(&mut self, mut keep: impl FnMut(&InstrumentCode) -> bool) {
        self.rows.retain(|row| keep(&row.code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> InstrumentCode {
        InstrumentCode::parse(raw).expect("valid code")
    }

    #[test]
    fn non_finite_values_are_treated_as_missing() {
        let mut row = MetricRow::new(code("000300.SH"));
        row.set("pe", Some(f64::NAN));
        row.set("pb", Some(1.2));
        assert_eq!(row.get("pe"), None);
        assert_eq!(row.get("pb"), Some(1.2));
    }

    #[test]
    fn retain_complete_reports_missing_fields() {
        let mut full = MetricRow::new(code("000300.SH"));
        full.set("a", Some(1.0));
        full.set("b", Some(2.0));
        let mut partial = MetricRow::new(code("000905.SH"));
        partial.set("a", Some(1.0));

        let mut table = MetricTable::from_rows(vec![full, partial]);
        let dropped = table.retain_complete(&["a", "b"]);

        assert_eq!(table.len(), 1);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].code.as_str(), "000905.SH");
        assert_eq!(dropped[0].missing, vec![String::from("b")]);
    }
}
