//! Scene admission control
//!
//! A scene caps how many of its entities may be paused or stopped at the
//! same time, so chaos never takes an entire topology down at once. All
//! scenes share one lock; every operation is a short read-modify-write.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Disruption limits of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneLimits {
    /// Cap on stopped entities
    pub max_stopped: u32,
    /// Cap on paused entities
    pub max_paused: u32,
    /// Cap on paused + stopped
    pub max_total: u32,
}

impl SceneLimits {
    /// Limits from the three caps
    #[inline]
    #[must_use]
    pub const fn new(max_stopped: u32, max_paused: u32, max_total: u32) -> Self {
        Self {
            max_stopped,
            max_paused,
            max_total,
        }
    }
}

/// Answer to a reservation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Slot reserved
    Admitted,
    /// Scene is at a limit; nothing reserved
    Rejected,
}

impl Admission {
    /// Reservation was refused
    #[inline]
    #[must_use]
    pub fn is_rejected(self) -> bool {
        self == Self::Rejected
    }
}

/// Point-in-time view of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneSnapshot {
    /// Configured limits
    pub limits: SceneLimits,
    /// Stop slots held
    pub stopped: u32,
    /// Pause slots held
    pub paused: u32,
}

impl SceneSnapshot {
    /// Paused plus stopped
    #[inline]
    #[must_use]
    pub fn disrupted(&self) -> u32 {
        self.stopped + self.paused
    }

    /// Admission invariant
    #[must_use]
    pub fn within_limits(&self) -> bool {
        self.stopped <= self.limits.max_stopped
            && self.paused <= self.limits.max_paused
            && self.disrupted() <= self.limits.max_total
    }
}

#[derive(Debug, Clone, Copy)]
struct Scene {
    limits: SceneLimits,
    stopped: u32,
    paused: u32,
}

impl Scene {
    fn new(limits: SceneLimits) -> Self {
        Self {
            limits,
            stopped: 0,
            paused: 0,
        }
    }

    fn total_full(&self) -> bool {
        self.paused + self.stopped >= self.limits.max_total
    }
}

/// Process-wide admission controller shared by all monitors
#[derive(Debug, Default)]
pub struct SceneCoordinator {
    scenes: Mutex<HashMap<String, Scene>>,
}

impl SceneCoordinator {
    /// Coordinator with no scenes
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a scene; counters start at zero
    pub fn configure(&self, name: impl Into<String>, limits: SceneLimits) {
        let name = name.into();
        tracing::debug!(scene = %name, ?limits, "scene configured");
        self.scenes.lock().insert(name, Scene::new(limits));
    }

    /// Reserve a pause slot
    ///
    /// Unconfigured scenes do not limit anything.
    pub fn try_reserve_pause(&self, name: &str) -> Admission {
        let mut scenes = self.scenes.lock();
        let Some(scene) = scenes.get_mut(name) else {
            return Admission::Admitted;
        };
        if scene.paused >= scene.limits.max_paused || scene.total_full() {
            return Admission::Rejected;
        }
        scene.paused += 1;
        Admission::Admitted
    }

    /// Reserve a stop slot
    pub fn try_reserve_stop(&self, name: &str) -> Admission {
        let mut scenes = self.scenes.lock();
        let Some(scene) = scenes.get_mut(name) else {
            return Admission::Admitted;
        };
        if scene.stopped >= scene.limits.max_stopped || scene.total_full() {
            return Admission::Rejected;
        }
        scene.stopped += 1;
        Admission::Admitted
    }

    /// Give back a pause slot; never drops below zero
    pub fn release_pause(&self, name: &str) {
        if let Some(scene) = self.scenes.lock().get_mut(name) {
            scene.paused = scene.paused.saturating_sub(1);
        }
    }

    /// Give back a stop slot; never drops below zero
    pub fn release_stop(&self, name: &str) {
        if let Some(scene) = self.scenes.lock().get_mut(name) {
            scene.stopped = scene.stopped.saturating_sub(1);
        }
    }

    /// Current counters, `None` for an unknown scene
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<SceneSnapshot> {
        self.scenes.lock().get(name).map(|scene| SceneSnapshot {
            limits: scene.limits,
            stopped: scene.stopped,
            paused: scene.paused,
        })
    }

    /// Names of all configured scenes, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scenes.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
