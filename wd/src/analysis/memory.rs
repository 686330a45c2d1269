//! Memory probing and progressive degradation
//!
//! The executor checks the process heap before each analysis type.
//! Above the threshold it degrades: the streaming batch size is
//! halved (floor 10) and the threshold relaxed by 0.05 (cap 0.9),
//! trading throughput for staying under the budget. At or over the
//! full budget the job ends partial with reason `memory`.

use tracing::debug;

/// Heap usage probe; a trait so tests can script pressure
pub trait MemoryProbe: Send + Sync {
    /// Resident memory of this process in bytes
    fn heap_bytes(&self) -> u64;
}

/// Reads resident set size from /proc/self/statm
#[derive(Default)]
pub struct ProcessMemoryProbe;

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    #[cfg(target_os = "linux")]
    fn heap_bytes(&self) -> u64 {
        let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
            return 0;
        };
        // Second field is resident pages
        statm
            .split_whitespace()
            .nth(1)
            .and_then(|pages| pages.parse::<u64>().ok())
            .map(|pages| pages * 4096)
            .unwrap_or(0)
    }

    #[cfg(not(target_os = "linux"))]
    fn heap_bytes(&self) -> u64 {
        0
    }
}

/// Mutable degradation state for one analysis run
#[derive(Debug, Clone)]
pub struct DegradationState {
    pub batch_size: usize,
    pub threshold: f64,
    pub fallback_triggers: u32,
}

/// Batch size never degrades below this
pub const MIN_BATCH_SIZE: usize = 10;

/// Threshold never relaxes past this
pub const MAX_THRESHOLD: f64 = 0.9;

impl DegradationState {
    pub fn new(batch_size: usize, threshold: f64) -> Self {
        Self {
            batch_size,
            threshold,
            fallback_triggers: 0,
        }
    }

    /// One degradation step
    pub fn degrade(&mut self) {
        self.batch_size = (self.batch_size / 2).max(MIN_BATCH_SIZE);
        self.threshold = (self.threshold + 0.05).min(MAX_THRESHOLD);
        self.fallback_triggers += 1;
        debug!(
            batch_size = self.batch_size,
            threshold = self.threshold,
            triggers = self.fallback_triggers,
            "Degraded analysis settings"
        );
    }
}

pub mod mock {
    //! Scripted probe for tests

    use super::MemoryProbe;
    use std::sync::Mutex;

    /// Returns scripted readings in order, repeating the last
    pub struct ScriptedProbe {
        readings: Mutex<Vec<u64>>,
        last: Mutex<u64>,
    }

    impl ScriptedProbe {
        pub fn new(readings: Vec<u64>) -> Self {
            Self {
                readings: Mutex::new(readings),
                last: Mutex::new(0),
            }
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn heap_bytes(&self) -> u64 {
            let mut readings = self.readings.lock().unwrap();
            if readings.is_empty() {
                *self.last.lock().unwrap()
            } else {
                let value = readings.remove(0);
                *self.last.lock().unwrap() = value;
                value
            }
        }
    }
}
