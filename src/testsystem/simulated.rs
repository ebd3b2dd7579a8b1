//! Simulated test system
//!
//! Stands in for the hardware rig: every run succeeds after a configurable
//! delay and reports a fixed output voltage.

use super::{PlanStep, TestCatalog, TestResult, TestSystem, TestSystemError, TestValues};
use crate::config::SimulationConfig;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Output voltage reported by every simulated run
const SIMULATED_VOUT: f64 = 1.20;

/// Test system that simulates hardware interaction
pub struct SimulatedTestSystem {
    timings: SimulationConfig,
    catalog: Arc<dyn TestCatalog>,
}

impl SimulatedTestSystem {
    /// Create a new simulated test system
    pub fn new(timings: SimulationConfig, catalog: Arc<dyn TestCatalog>) -> Self {
        info!("TestSystemClient instance created");
        Self { timings, catalog }
    }

    /// Prepare the rig for a chip and test
    async fn initialize(&self, chip_type: &str, test_name: &str) {
        info!(
            "Initializing test system for chip '{}' and test '{}'...",
            chip_type, test_name
        );
        tokio::time::sleep(self.timings.init_delay).await;
        info!("Initialization complete for {} ({})", chip_type, test_name);
    }

    /// Retrieve the most recent readings from the rig
    pub async fn retrieve_data_from_system(&self) -> Value {
        info!("Retrieving results from test system...");
        tokio::time::sleep(self.timings.retrieve_delay).await;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let data = json!({ "status": "ok", "timestamp": timestamp });

        info!("Retrieved data: {}", data);
        data
    }
}

#[async_trait]
impl TestSystem for SimulatedTestSystem {
    async fn run_test(
        &self,
        chip_type: &str,
        test_name: &str,
        params: &Map<String, Value>,
    ) -> Result<TestResult, TestSystemError> {
        self.initialize(chip_type, test_name).await;

        let params_json = Value::Object(params.clone());
        info!(
            "Running test '{}' on chip '{}' with parameters: {}",
            test_name, chip_type, params_json
        );
        tokio::time::sleep(self.timings.run_delay).await;

        let inputs = params
            .get("inputs")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let mut results = Map::new();
        results.insert("vOut".into(), json!(SIMULATED_VOUT));

        info!("Test '{}' completed. Results: {:?}", test_name, results);

        Ok(TestResult {
            chip: chip_type.into(),
            test_name: test_name.into(),
            test_values: TestValues { inputs, results },
        })
    }

    async fn abort_test(&self, test_id: &str) -> Result<Value, TestSystemError> {
        // Runs complete before the next command is read, so nothing is ever in flight here.
        Err(TestSystemError::NoSuchRun(test_id.into()))
    }

    async fn test_status(&self, test_id: &str) -> Result<Value, TestSystemError> {
        let system = self.retrieve_data_from_system().await;
        Ok(json!({
            "testId": test_id,
            "state": "Idle",
            "system": system,
        }))
    }

    async fn run_loop_test(
        &self,
        chip_type: &str,
        test_name: &str,
        params: &Map<String, Value>,
        iterations: u32,
    ) -> Result<Value, TestSystemError> {
        let mut runs = Vec::new();
        for iteration in 0..iterations {
            info!(
                "Loop test '{}' iteration {}/{}",
                test_name,
                iteration + 1,
                iterations
            );
            let result = self.run_test(chip_type, test_name, params).await?;
            runs.push(result.test_values);
        }

        Ok(json!({
            "Chip": chip_type,
            "testName": test_name,
            "iterations": iterations,
            "runs": runs,
        }))
    }

    async fn run_test_plan(
        &self,
        plan_name: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, TestSystemError> {
        let steps: Vec<PlanStep> = params
            .get("tests")
            .cloned()
            .map(serde_json::from_value::<Vec<PlanStep>>)
            .transpose()
            .map_err(|e| TestSystemError::InvalidPlan {
                plan: plan_name.into(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| TestSystemError::InvalidPlan {
                plan: plan_name.into(),
                reason: "no tests listed".into(),
            })?;

        info!("Running test plan '{}' ({} tests)", plan_name, steps.len());

        let mut results = Vec::with_capacity(steps.len());
        for step in &steps {
            results.push(self.run_test(&step.chip_name, &step.test_name, params).await?);
        }

        Ok(json!({
            "planName": plan_name,
            "results": results,
        }))
    }

    async fn get_all_tests(&self) -> Result<Vec<Value>, TestSystemError> {
        match self.catalog.fetch_from_db("tests").await? {
            Value::Array(tests) => Ok(tests),
            other => Ok(vec![other]),
        }
    }
}
