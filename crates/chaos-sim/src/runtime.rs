//! In-memory container runtime
//!
//! Models just enough of a container engine for chaos runs: lifecycle
//! flags, an append-only output buffer, a pool of network addresses and
//! a journal of every call. Failures can be scripted per entity and
//! operation with [`SimulatedRuntime::fail_next`].

use async_trait::async_trait;
use chaos_core::{ContainerRuntime, EntityId, EntityStatus, RuntimeError, RuntimeOp};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Exit code reported after a graceful stop
pub const STOP_EXIT_CODE: i64 = 143;

/// Exit code reported after an OOM kill
pub const OOM_EXIT_CODE: i64 = 137;

/// One recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    /// Target entity
    pub entity: EntityId,
    /// Operation
    pub op: RuntimeOp,
    /// Call succeeded
    pub ok: bool,
    /// When it was made
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct SimEntity {
    status: EntityStatus,
    output: Vec<u8>,
    addresses: Vec<String>,
    address_index: usize,
    pending_failures: VecDeque<(RuntimeOp, String)>,
}

impl SimEntity {
    fn new(addresses: Vec<String>) -> Self {
        let mut status = EntityStatus::running();
        status.address = addresses.first().cloned();
        Self {
            status,
            output: Vec::new(),
            addresses,
            address_index: 0,
            pending_failures: VecDeque::new(),
        }
    }

    fn take_failure(&mut self, op: RuntimeOp) -> Option<String> {
        let pos = self.pending_failures.iter().position(|(o, _)| *o == op)?;
        self.pending_failures.remove(pos).map(|(_, message)| message)
    }

    fn apply(&mut self, id: &EntityId, op: RuntimeOp) -> Result<(), RuntimeError> {
        let status = &mut self.status;
        match op {
            RuntimeOp::Start => {
                if status.running {
                    return Err(RuntimeError::call_failed(op, id, "already running"));
                }
                status.running = true;
                status.paused = false;
                status.exit_code = 0;
            }
            RuntimeOp::Stop => {
                if !status.running {
                    return Err(RuntimeError::call_failed(op, id, "not running"));
                }
                status.running = false;
                status.paused = false;
                status.exit_code = STOP_EXIT_CODE;
            }
            RuntimeOp::Pause => {
                if !status.running || status.paused {
                    return Err(RuntimeError::call_failed(op, id, "not running"));
                }
                status.paused = true;
            }
            RuntimeOp::Unpause => {
                if !status.paused {
                    return Err(RuntimeError::call_failed(op, id, "not paused"));
                }
                status.paused = false;
            }
            RuntimeOp::Reconnect => {
                if self.addresses.is_empty() {
                    return Err(RuntimeError::call_failed(op, id, "no address pool"));
                }
                self.address_index = (self.address_index + 1) % self.addresses.len();
                status.address = Some(self.addresses[self.address_index].clone());
            }
            RuntimeOp::Inspect | RuntimeOp::ReadOutput => {}
        }
        Ok(())
    }
}

/// Container runtime backed by process memory
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    entities: Mutex<HashMap<EntityId, SimEntity>>,
    journal: Mutex<Vec<RuntimeCall>>,
}

impl SimulatedRuntime {
    /// Runtime with no entities
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running entity; re-adding resets it
    pub fn add_entity(&self, id: impl Into<EntityId>, addresses: Vec<String>) {
        self.entities.lock().insert(id.into(), SimEntity::new(addresses));
    }

    /// Append raw bytes to the entity's output regardless of its state
    pub fn append_output(&self, id: &EntityId, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.with_entity(id, |entity| {
            entity.output.extend_from_slice(bytes);
        })
    }

    /// Append a line as the workload would: only while running and not paused
    ///
    /// Returns whether the line was written.
    pub fn emit_line(&self, id: &EntityId, line: &str) -> Result<bool, RuntimeError> {
        self.with_entity(id, |entity| {
            if !entity.status.running || entity.status.paused {
                return false;
            }
            entity.output.extend_from_slice(line.as_bytes());
            entity.output.push(b'\n');
            true
        })
    }

    /// Make the next `op` on `id` fail with `message`
    pub fn fail_next(&self, id: &EntityId, op: RuntimeOp, message: impl Into<String>) -> Result<(), RuntimeError> {
        let message = message.into();
        self.with_entity(id, |entity| entity.pending_failures.push_back((op, message)))
    }

    /// Crash the entity
    pub fn mark_dead(&self, id: &EntityId, exit_code: i64) -> Result<(), RuntimeError> {
        self.with_entity(id, |entity| {
            entity.status.running = false;
            entity.status.paused = false;
            entity.status.dead = true;
            entity.status.exit_code = exit_code;
        })
    }

    /// Kill the entity for exceeding its memory limit
    pub fn mark_oom_killed(&self, id: &EntityId) -> Result<(), RuntimeError> {
        self.with_entity(id, |entity| {
            entity.status.running = false;
            entity.status.paused = false;
            entity.status.oom_killed = true;
            entity.status.exit_code = OOM_EXIT_CODE;
        })
    }

    /// Current status without journaling
    #[must_use]
    pub fn status(&self, id: &EntityId) -> Option<EntityStatus> {
        self.entities.lock().get(id).map(|e| e.status.clone())
    }

    /// All recorded calls, oldest first
    #[must_use]
    pub fn journal(&self) -> Vec<RuntimeCall> {
        self.journal.lock().clone()
    }

    /// Successful calls of `op` across all entities
    #[must_use]
    pub fn count(&self, op: RuntimeOp) -> usize {
        self.journal.lock().iter().filter(|c| c.op == op && c.ok).count()
    }

    /// Successful calls of `op` on `id`
    #[must_use]
    pub fn count_for(&self, id: &EntityId, op: RuntimeOp) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|c| c.op == op && c.ok && &c.entity == id)
            .count()
    }

    fn with_entity<T>(&self, id: &EntityId, f: impl FnOnce(&mut SimEntity) -> T) -> Result<T, RuntimeError> {
        let mut entities = self.entities.lock();
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(id.clone()))?;
        Ok(f(entity))
    }

    fn record(&self, id: &EntityId, op: RuntimeOp, ok: bool) {
        self.journal.lock().push(RuntimeCall {
            entity: id.clone(),
            op,
            ok,
            at: Utc::now(),
        });
    }

    /// Run `op` through scripted failures, then `f`, and journal the result
    fn call<T>(
        &self,
        id: &EntityId,
        op: RuntimeOp,
        f: impl FnOnce(&mut SimEntity) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let result = {
            let mut entities = self.entities.lock();
            match entities.get_mut(id) {
                None => Err(RuntimeError::NotFound(id.clone())),
                Some(entity) => match entity.take_failure(op) {
                    Some(message) => Err(RuntimeError::call_failed(op, id, message)),
                    None => f(entity),
                },
            }
        };
        self.record(id, op, result.is_ok());
        if let Err(err) = &result {
            tracing::debug!(entity = %id, %op, error = %err, "simulated call failed");
        }
        result
    }

    fn lifecycle(&self, id: &EntityId, op: RuntimeOp) -> Result<(), RuntimeError> {
        self.call(id, op, |entity| entity.apply(id, op))
    }
}

#[async_trait]
impl ContainerRuntime for SimulatedRuntime {
    async fn inspect(&self, id: &EntityId) -> Result<EntityStatus, RuntimeError> {
        self.call(id, RuntimeOp::Inspect, |entity| Ok(entity.status.clone()))
    }

    async fn read_full_output(&self, id: &EntityId) -> Result<Vec<u8>, RuntimeError> {
        self.call(id, RuntimeOp::ReadOutput, |entity| Ok(entity.output.clone()))
    }

    async fn start(&self, id: &EntityId) -> Result<(), RuntimeError> {
        self.lifecycle(id, RuntimeOp::Start)
    }

    async fn stop(&self, id: &EntityId) -> Result<(), RuntimeError> {
        self.lifecycle(id, RuntimeOp::Stop)
    }

    async fn pause(&self, id: &EntityId) -> Result<(), RuntimeError> {
        self.lifecycle(id, RuntimeOp::Pause)
    }

    async fn unpause(&self, id: &EntityId) -> Result<(), RuntimeError> {
        self.lifecycle(id, RuntimeOp::Unpause)
    }

    async fn reconnect_to_next_address(&self, id: &EntityId) -> Result<(), RuntimeError> {
        self.lifecycle(id, RuntimeOp::Reconnect)
    }
}
