use std::sync::Mutex;
use sysinfo::System;

/// Process-wide memory pressure, read by the dispatcher's admission gate
pub trait MemoryProbe: Send + Sync {
    /// Used memory as a percentage of total (0..=100)
    fn used_percent(&self) -> f64;
}

/// Samples system memory through `sysinfo`
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn used_percent(&self) -> f64 {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        system.used_memory() as f64 / total as f64 * 100.0
    }
}
