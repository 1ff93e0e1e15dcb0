use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::SensorKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId {
    pub name: String,
    pub version: u32,
}

impl DatasetId {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Directory name used by file-backed stores.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.name, self.version)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// What a caller asks for when opening or creating a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub id: DatasetId,
    pub primary_key: Vec<String>,
    pub event_time: String,
    pub description: String,
}

impl DatasetSpec {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            id: DatasetId::new(name, version),
            primary_key: Vec::new(),
            event_time: "date".to_string(),
            description: String::new(),
        }
    }

    pub fn with_primary_key<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.primary_key = columns.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_event_time(mut self, column: &str) -> Self {
        self.event_time = column.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Persisted alongside the data of every dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub id: DatasetId,
    pub primary_key: Vec<String>,
    pub event_time: String,
    pub description: String,
    pub row_count: usize,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DatasetMeta {
    pub fn from_spec(spec: &DatasetSpec) -> Self {
        let now = Utc::now();
        Self {
            id: spec.id.clone(),
            primary_key: spec.primary_key.clone(),
            event_time: spec.event_time.clone(),
            description: spec.description.clone(),
            row_count: 0,
            min_date: None,
            max_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional restrictions applied when reading a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Inclusive lower bound on the event date.
    pub start: Option<NaiveDate>,
    /// Inclusive upper bound on the event date.
    pub end: Option<NaiveDate>,
    pub sensor: Option<SensorKey>,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(start: NaiveDate) -> Self {
        Self {
            start: Some(start),
            ..Self::default()
        }
    }

    pub fn until(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    pub fn for_sensor(mut self, sensor: SensorKey) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn matches(&self, date: NaiveDate, sensor: Option<&SensorKey>) -> bool {
        self.start.map_or(true, |s| date >= s)
            && self.end.map_or(true, |e| date <= e)
            && self.sensor.as_ref().map_or(true, |wanted| sensor == Some(wanted))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub rejected: usize,
}

impl fmt::Display for InsertReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} rejected",
            self.inserted, self.updated, self.rejected
        )
    }
}
