//! External collaborators for hardware test execution
//!
//! This module provides:
//! - The test system client interface the command handlers delegate to
//! - A simulated client that stands in for real hardware
//! - The test metadata catalog (`fetch_from_db`)

mod catalog;
mod client;
mod simulated;

pub use catalog::{CatalogError, InMemoryCatalog, PlanStep, TestCatalog};
pub use client::{TestResult, TestSystem, TestSystemError, TestValues};
pub use simulated::SimulatedTestSystem;
