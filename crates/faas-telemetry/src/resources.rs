use crate::TelemetrySampler;
use serde::{Deserialize, Serialize};

/// Static view of what this host offers, served at `/rid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub cpus: usize,
    pub total_mem_kb: i64,
    pub free_mem_kb: i64,
}

impl ResourceDescriptor {
    pub fn discover(sampler: &TelemetrySampler) -> Self {
        let memory = sampler.sample_memory();
        Self {
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            total_mem_kb: memory.total_kb,
            free_mem_kb: memory.free_kb,
        }
    }
}
