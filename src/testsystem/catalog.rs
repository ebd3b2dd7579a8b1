//! Test metadata catalog
//!
//! Queries are path-like strings:
//! - `tests` - every known test, across all chips
//! - `tests/<chip>` - tests available for one chip
//! - `plans/<name>` - the ordered steps of a test plan

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors returned by catalog lookups
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("No record for query: {0}")]
    NotFound(String),

    #[error("Failed to load catalog: {0}")]
    Load(String),
}

/// Persisted test metadata lookup
#[async_trait]
pub trait TestCatalog: Send + Sync {
    /// Fetch the record matching `query`
    async fn fetch_from_db(&self, query: &str) -> Result<Value, CatalogError>;
}

/// One step of a test plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(rename = "chipName")]
    pub chip_name: String,
    #[serde(rename = "testName")]
    pub test_name: String,
}

/// Catalog held entirely in memory, optionally loaded from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    /// Chip name -> available test names
    #[serde(default)]
    tests: BTreeMap<String, Vec<String>>,
    /// Plan name -> ordered steps
    #[serde(default)]
    plans: BTreeMap<String, Vec<PlanStep>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Load(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| CatalogError::Load(format!("{}: {}", path.display(), e)))
    }

    /// Register a test for a chip
    pub fn with_test(mut self, chip: impl Into<String>, test: impl Into<String>) -> Self {
        self.tests.entry(chip.into()).or_default().push(test.into());
        self
    }

    /// Register a test plan
    pub fn with_plan(mut self, name: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        self.plans.insert(name.into(), steps);
        self
    }

    fn test_records<'a>(
        chip: &'a str,
        tests: &'a [String],
    ) -> impl Iterator<Item = Value> + 'a {
        tests
            .iter()
            .map(move |test| json!({ "Chip": chip, "testName": test }))
    }
}

#[async_trait]
impl TestCatalog for InMemoryCatalog {
    async fn fetch_from_db(&self, query: &str) -> Result<Value, CatalogError> {
        let mut parts = query.splitn(2, '/');
        let table = parts.next().unwrap_or_default();
        let key = parts.next();

        match (table, key) {
            ("tests", None) => Ok(Value::Array(
                self.tests
                    .iter()
                    .flat_map(|(chip, tests)| Self::test_records(chip, tests))
                    .collect(),
            )),
            ("tests", Some(chip)) => self
                .tests
                .get(chip)
                .map(|tests| Value::Array(Self::test_records(chip, tests).collect()))
                .ok_or_else(|| CatalogError::NotFound(query.into())),
            ("plans", Some(name)) => {
                let steps = self
                    .plans
                    .get(name)
                    .ok_or_else(|| CatalogError::NotFound(query.into()))?;
                Ok(json!({ "planName": name, "tests": steps }))
            }
            _ => Err(CatalogError::MalformedQuery(query.into())),
        }
    }
}
