//! Chaos Sim - run chaos plans against an in-memory container runtime
//!
//! - [`SimulatedRuntime`] implements the runtime capability set with
//!   scriptable failures and a call journal
//! - [`ChaosPlan`] describes scenes, entities and their scripted output
//! - [`run_scenario`] drives the orchestrator for a fixed duration and
//!   checks scene limits and baseline restoration

#![warn(unreachable_pub)]

/// Error types
pub mod error;
/// Plan documents
pub mod plan;
/// In-memory runtime
pub mod runtime;
/// Scenario runner and reports
pub mod scenario;

pub use error::ScenarioError;
pub use plan::{ArchivePlan, ChaosPlan, EntityPlan, ScenePlan, WorkloadPlan};
pub use runtime::{RuntimeCall, SimulatedRuntime};
pub use scenario::{run_scenario, EntityReport, ScenarioConfig, ScenarioReport, SceneReport, Violation};
