//! Record and candidate types
//!
//! A Record is one video game entry in the record store. A Candidate is the part of
//! an unresolved Record that the resolver needs; the priority weight stays behind.

use serde::{Deserialize, Serialize};

/// An entity to enrich, as stored in the record store file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    //=== Identity ===
    /// Stable identity key, unique within a store
    pub key: String,

    /// Display name, used as the lookup query
    pub name: String,

    //=== Lookup hints ===
    /// Platform the game was released on (categorical attribute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Release year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    //=== Ordering ===
    /// Priority weight (global sales in millions); missing counts as zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_sales: Option<f64>,

    //=== Enrichment ===
    /// Previously resolved external identifier (entity URI)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_as: Option<String>,

    /// Attributes this tool does not interpret, preserved through load/save
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Create a record with just identity and name
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            platform: None,
            year: None,
            global_sales: None,
            same_as: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_sales(mut self, sales: f64) -> Self {
        self.global_sales = Some(sales);
        self
    }

    pub fn with_same_as(mut self, uri: impl Into<String>) -> Self {
        self.same_as = Some(uri.into());
        self
    }

    /// Returns true if the record already carries a non-empty external identifier
    pub fn is_enriched(&self) -> bool {
        self.same_as.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    /// Priority weight used for candidate ordering. NaN is treated as missing.
    pub fn weight(&self) -> f64 {
        match self.global_sales {
            Some(sales) if !sales.is_nan() => sales,
            _ => 0.0,
        }
    }

    /// Snapshot the fields the resolver needs
    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            key: self.key.clone(),
            name: self.name.clone(),
            platform: self.platform.clone(),
            year: self.year,
        }
    }
}

/// A record selected for resolution this run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub key: String,
    pub name: String,
    pub platform: Option<String>,
    pub year: Option<i32>,
}

impl Candidate {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            platform: None,
            year: None,
        }
    }
}
