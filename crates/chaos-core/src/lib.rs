//! Chaos Core - randomized disruption of monitored containers
//!
//! One monitor task per entity watches its status and output, reports
//! success/failure/error events, and (when chaos is enabled) pauses, stops,
//! restarts and re-addresses it on randomized schedules. Scenes cap how many
//! entities of a group may be disrupted at the same time.
//!
//! # Example
//!
//! ```rust,ignore
//! use chaos_core::prelude::*;
//! use chaos_filter::FilterSpec;
//!
//! # async fn example(runtime: std::sync::Arc<dyn ContainerRuntime>) -> Result<(), ChaosError> {
//! let orchestrator = ChaosOrchestrator::new(runtime);
//! orchestrator.configure_scene("validators", SceneLimits::new(1, 2, 2));
//!
//! let spec = MonitorSpec::new("validator-1")
//!     .with_scene("validators")
//!     .with_settings(ChaosSettings::new().enabled())
//!     .add_success_filter(FilterSpec::literal("all tests passed"))
//!     .add_fail_filter(FilterSpec::literal("panicked at"));
//!
//! let mut events = orchestrator.start_monitor(spec)?;
//! while let Some(event) = events.recv().await {
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! orchestrator.stop_all().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

/// Error types
pub mod error;
/// Monitor events and their channel
pub mod event;
/// Per-entity monitor loop
pub mod monitor;
/// Monitor registry
pub mod orchestrator;
/// Container runtime capability
pub mod runtime;
/// Scene admission control
pub mod scene;
/// Dwell windows and probability draws
pub mod scheduler;
/// Chaos knobs and monitor specs
pub mod settings;
/// Chaos phases and per-entity state
pub mod state_machine;
/// Entity identity and status
pub mod types;

pub use error::{ChaosError, ConfigError, RuntimeError, RuntimeOp, StateMachineError};
pub use event::{event_channel, Event, EventSender, EventStream};
pub use monitor::{ChaosAction, Monitor, MonitorSummary, TickOutcome};
pub use orchestrator::ChaosOrchestrator;
pub use runtime::ContainerRuntime;
pub use scene::{Admission, SceneCoordinator, SceneLimits, SceneSnapshot};
pub use scheduler::{pick_window, sample, DwellWindow};
pub use settings::{ChaosSettings, FilterSets, MonitorSpec};
pub use state_machine::{ChaosPhase, ChaosRuntimeState};
pub use types::{EntityId, EntityStatus};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving chaos monitors
    pub use crate::{
        ChaosError, ChaosOrchestrator, ChaosSettings, ContainerRuntime, DwellWindow, EntityId,
        EntityStatus, Event, EventStream, MonitorSpec, SceneLimits,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
