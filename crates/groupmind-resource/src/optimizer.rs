//! Maps resource samples to a 3-level pressure state, debounced so
//! transient spikes don't flap consumers between levels.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

use crate::monitor::ResourceStats;

/// Minimum time between level transitions.
pub const DEBOUNCE: Duration = Duration::from_secs(30);

/// Optimizer-specific thresholds (distinct from the monitor's own
/// warn/critical bands — spec.md §4.6 gives these separately).
const OPTIMIZED_CPU_PERCENT: f32 = 80.0;
const OPTIMIZED_RAM_PERCENT: f32 = 70.0;
const EMERGENCY_CPU_PERCENT: f32 = 95.0;
const EMERGENCY_RAM_PERCENT: f32 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptimizationLevel {
    Normal = 0,
    Optimized = 1,
    Emergency = 2,
}

fn level_for(stats: &ResourceStats) -> OptimizationLevel {
    if stats.cpu_percent >= EMERGENCY_CPU_PERCENT || stats.ram_percent >= EMERGENCY_RAM_PERCENT {
        OptimizationLevel::Emergency
    } else if stats.cpu_percent >= OPTIMIZED_CPU_PERCENT || stats.ram_percent >= OPTIMIZED_RAM_PERCENT
    {
        OptimizationLevel::Optimized
    } else {
        OptimizationLevel::Normal
    }
}

struct State {
    level: OptimizationLevel,
    last_change: Instant,
}

pub struct ResourceOptimizer {
    state: Mutex<State>,
}

impl ResourceOptimizer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                level: OptimizationLevel::Normal,
                last_change: Instant::now() - DEBOUNCE,
            }),
        }
    }

    /// Feed a fresh sample; returns the (possibly unchanged) current level.
    /// A level change within `DEBOUNCE` of the previous one is suppressed.
    pub fn observe(&self, stats: ResourceStats) -> OptimizationLevel {
        let target = level_for(&stats);
        let mut state = self.state.lock().unwrap();
        if target != state.level {
            if state.last_change.elapsed() >= DEBOUNCE {
                info!(from = ?state.level, to = ?target, "resource optimization level changed");
                state.level = target;
                state.last_change = Instant::now();
            }
        }
        state.level
    }

    pub fn current_level(&self) -> OptimizationLevel {
        self.state.lock().unwrap().level
    }

    /// Level 2 (emergency) suppresses the optional in-process model.
    pub fn should_disable_local_model(&self) -> bool {
        self.current_level() == OptimizationLevel::Emergency
    }

    /// Level 1+ disables non-essential telemetry and shrinks caches.
    pub fn should_shed_non_essential_work(&self) -> bool {
        self.current_level() >= OptimizationLevel::Optimized
    }
}

impl Default for ResourceOptimizer {
    fn default() -> Self {
        Self::new()
    }
}
