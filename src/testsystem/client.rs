//! Test system client abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::CatalogError;

/// Errors reported by a test system
#[derive(Error, Debug)]
pub enum TestSystemError {
    #[error("No test running with id '{0}'")]
    NoSuchRun(String),

    #[error("Invalid test plan '{plan}': {reason}")]
    InvalidPlan { plan: String, reason: String },

    #[error("Catalog lookup failed: {0}")]
    Catalog(#[from] CatalogError),
}

/// Inputs and measured results of a test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestValues {
    pub inputs: Value,
    pub results: Map<String, Value>,
}

/// Result of a single test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(rename = "Chip")]
    pub chip: String,

    #[serde(rename = "testName")]
    pub test_name: String,

    #[serde(rename = "testValues")]
    pub test_values: TestValues,
}

/// Interface to the hardware test execution backend
#[async_trait]
pub trait TestSystem: Send + Sync {
    /// Run a single test on a chip
    async fn run_test(
        &self,
        chip_type: &str,
        test_name: &str,
        params: &Map<String, Value>,
    ) -> Result<TestResult, TestSystemError>;

    /// Stop a running test
    async fn abort_test(&self, test_id: &str) -> Result<Value, TestSystemError>;

    /// Status of a running test
    async fn test_status(&self, test_id: &str) -> Result<Value, TestSystemError>;

    /// Run the same test repeatedly and aggregate the results
    async fn run_loop_test(
        &self,
        chip_type: &str,
        test_name: &str,
        params: &Map<String, Value>,
        iterations: u32,
    ) -> Result<Value, TestSystemError>;

    /// Run a named sequence of tests and aggregate the results
    async fn run_test_plan(
        &self,
        plan_name: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, TestSystemError>;

    /// List of all available tests
    async fn get_all_tests(&self) -> Result<Vec<Value>, TestSystemError>;
}
