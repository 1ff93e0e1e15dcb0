use serde_json::Value;
use std::io::Read;

use crate::error::{PipelineError, Result};
use crate::normalize::columns::{normalize_column_name, resolve_alias};
use crate::normalize::values::{parse_calendar_date, parse_number};
use chrono::NaiveDate;

/// A single untyped cell as it came out of a source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Missing,
    Number(f64),
    Text(String),
}

impl RawCell {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RawCell::Missing,
            Value::Number(n) => n.as_f64().map(RawCell::Number).unwrap_or(RawCell::Missing),
            Value::String(s) => RawCell::Text(s.clone()),
            other => RawCell::Text(other.to_string()),
        }
    }

    fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            RawCell::Missing
        } else {
            RawCell::Text(text.to_string())
        }
    }
}

/// Tabular result with unpredictable column naming, shared by the JSON
/// and CSV sources before it is turned into typed records.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    origin: String,
    columns: Vec<String>,
    rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn new(origin: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            origin: origin.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from a columnar JSON object (`{"time": [...], "field": [...]}`),
    /// the shape Open-Meteo uses for its `daily` and `hourly` blocks.
    pub fn from_columnar_json(origin: impl Into<String>, block: &Value) -> Result<Self> {
        let origin = origin.into();
        let object = block.as_object().ok_or_else(|| {
            PipelineError::schema(&origin, "expected an object of column arrays")
        })?;

        let mut columns = Vec::with_capacity(object.len());
        let mut arrays = Vec::with_capacity(object.len());
        for (name, values) in object {
            let values = values.as_array().ok_or_else(|| {
                PipelineError::schema(&origin, format!("column '{}' is not an array", name))
            })?;
            columns.push(name.clone());
            arrays.push(values);
        }

        let row_count = arrays.first().map(|a| a.len()).unwrap_or(0);
        if let Some((name, values)) = columns
            .iter()
            .zip(&arrays)
            .find(|(_, values)| values.len() != row_count)
        {
            return Err(PipelineError::schema(
                &origin,
                format!(
                    "column '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    row_count
                ),
            ));
        }

        let mut table = RawTable::new(origin, columns);
        for i in 0..row_count {
            table
                .rows
                .push(arrays.iter().map(|a| RawCell::from_json(&a[i])).collect());
        }

        Ok(table)
    }

    /// Build from CSV text with a header row. Short rows are padded with
    /// missing cells.
    pub fn from_csv_reader<R: Read>(origin: impl Into<String>, reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut table = RawTable::new(origin, columns);

        for record in csv_reader.records() {
            let record = record?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            let mut row: Vec<RawCell> = record.iter().map(RawCell::from_text).collect();
            row.resize(table.columns.len(), RawCell::Missing);
            table.rows.push(row);
        }

        Ok(table)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Apply `normalize_column_name` to every header.
    pub fn normalize_columns(mut self) -> Self {
        self.columns = self
            .columns
            .iter()
            .map(|c| normalize_column_name(c))
            .collect();
        self
    }

    pub fn find_column(&self, aliases: &[&str]) -> Option<usize> {
        resolve_alias(&self.columns, aliases)
    }

    pub fn require_column(&self, aliases: &[&str]) -> Result<usize> {
        self.find_column(aliases).ok_or_else(|| {
            PipelineError::schema(
                &self.origin,
                format!(
                    "no column matching {:?} in {:?}",
                    aliases, self.columns
                ),
            )
        })
    }

    pub fn cells(&self, column: usize) -> impl Iterator<Item = &RawCell> + '_ {
        self.rows.iter().map(move |row| &row[column])
    }

    /// Parse a column as calendar dates. Any unparsable or missing value is
    /// a schema mismatch: a row without a date cannot be keyed.
    pub fn dates(&self, column: usize) -> Result<Vec<NaiveDate>> {
        self.cells(column)
            .enumerate()
            .map(|(row, cell)| {
                let parsed = match cell {
                    RawCell::Text(text) => parse_calendar_date(text),
                    _ => None,
                };
                parsed.ok_or_else(|| {
                    PipelineError::schema(
                        &self.origin,
                        format!(
                            "unparsable date {:?} in column '{}' at row {}",
                            cell,
                            self.columns[column],
                            row + 1
                        ),
                    )
                })
            })
            .collect()
    }

    /// Parse a column as numbers. Fails closed: anything not a finite
    /// number becomes `None`.
    pub fn numbers(&self, column: usize) -> Vec<Option<f64>> {
        self.cells(column).map(parse_number).collect()
    }
}
