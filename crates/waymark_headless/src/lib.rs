//! Headless scenario runner for path and order verification.
//!
//! Loads a RON [`Scenario`], drives a [`waymark_core::simulation::Simulation`]
//! through its order schedule and produces a JSON-serializable report. Used
//! by CI to check that movement behaves the same on every machine.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario to completion and print the report
//! cargo run -p waymark_headless -- run --scenario scenarios/crossing.ron
//!
//! # Ask for a single path
//! cargo run -p waymark_headless -- path --scenario scenarios/crossing.ron \
//!     --archetype scout --from 0.5,0.5 --to 11.5,7.5
//! ```

pub mod runner;
pub mod scenario;

pub use runner::{query_path, PathReport, RunReport, ScenarioRunner};
pub use scenario::{Scenario, ScenarioError};
