//! Container runtime capability set
//!
//! The monitor only ever talks to the runtime through this trait; image
//! builds, networks and credentials live elsewhere.

use crate::error::RuntimeError;
use crate::types::{EntityId, EntityStatus};
use async_trait::async_trait;

/// Runtime operations the chaos monitor consumes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Current lifecycle status
    async fn inspect(&self, id: &EntityId) -> Result<EntityStatus, RuntimeError>;

    /// Entire output since the container was created
    async fn read_full_output(&self, id: &EntityId) -> Result<Vec<u8>, RuntimeError>;

    /// Start a stopped entity
    async fn start(&self, id: &EntityId) -> Result<(), RuntimeError>;

    /// Stop a running entity
    async fn stop(&self, id: &EntityId) -> Result<(), RuntimeError>;

    /// Freeze a running entity
    async fn pause(&self, id: &EntityId) -> Result<(), RuntimeError>;

    /// Resume a paused entity
    async fn unpause(&self, id: &EntityId) -> Result<(), RuntimeError>;

    /// Move the entity to the next address of its network
    async fn reconnect_to_next_address(&self, id: &EntityId) -> Result<(), RuntimeError>;
}
