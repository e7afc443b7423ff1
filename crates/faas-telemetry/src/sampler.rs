use crate::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub const MEMINFO_PATH: &str = "/proc/meminfo";
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Host memory counters in kB. `-1` in both fields means the counters
/// could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_kb: i64,
    pub free_kb: i64,
}

impl MemoryStats {
    pub const UNAVAILABLE: MemoryStats = MemoryStats {
        total_kb: -1,
        free_kb: -1,
    };

    pub fn is_available(&self) -> bool {
        *self != Self::UNAVAILABLE
    }
}

/// Pulls `MemTotal` and `MemFree` out of meminfo-formatted text.
pub fn parse_meminfo(contents: &str) -> Result<MemoryStats> {
    let mut total = None;
    let mut free = None;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let (field, slot) = match key.trim_end_matches(':') {
            "MemTotal" => ("MemTotal", &mut total),
            "MemFree" => ("MemFree", &mut free),
            _ => continue,
        };
        let parsed = value.parse::<i64>().map_err(|_| TelemetryError::InvalidValue {
            field,
            value: value.to_string(),
        })?;
        *slot = Some(parsed);

        if total.is_some() && free.is_some() {
            break;
        }
    }

    Ok(MemoryStats {
        total_kb: total.ok_or(TelemetryError::MissingField("MemTotal"))?,
        free_kb: free.ok_or(TelemetryError::MissingField("MemFree"))?,
    })
}

/// Source of the CPU usage fraction reported with every response.
pub trait CpuSampler: Send + Sync {
    /// Busy fraction in `[0.0, 1.0]`. Never fails; unreadable counters
    /// report `0.0`.
    fn sample(&self) -> f32;
}

/// Reports a fixed value. The default until a host sampler is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantCpuSampler(pub f32);

impl CpuSampler for ConstantCpuSampler {
    fn sample(&self) -> f32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

/// Busy fraction from the aggregate `cpu` line of `/proc/stat`, measured
/// between consecutive samples. The first sample covers time since boot.
#[derive(Debug)]
pub struct ProcStatCpuSampler {
    path: PathBuf,
    previous: Mutex<Option<CpuTimes>>,
}

impl ProcStatCpuSampler {
    pub fn new() -> Self {
        Self::with_path(PROC_STAT_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            previous: Mutex::new(None),
        }
    }

    fn read_times(&self) -> Option<CpuTimes> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let line = contents.lines().find(|l| l.starts_with("cpu "))?;
        let values: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|v| v.parse::<u64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if values.len() < 4 {
            return None;
        }
        // idle + iowait
        let idle = values[3].saturating_add(values.get(4).copied().unwrap_or(0));
        Some(CpuTimes {
            idle,
            total: values.iter().fold(0u64, |acc, v| acc.saturating_add(*v)),
        })
    }
}

impl Default for ProcStatCpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler for ProcStatCpuSampler {
    fn sample(&self) -> f32 {
        let Some(current) = self.read_times() else {
            warn!("Failed to read CPU counters from {}", self.path.display());
            return 0.0;
        };

        let mut previous = self.previous.lock().unwrap_or_else(|e| e.into_inner());
        let base = previous.replace(current).unwrap_or(CpuTimes { idle: 0, total: 0 });

        let total = current.total.saturating_sub(base.total);
        let idle = current.idle.saturating_sub(base.idle);
        if total == 0 {
            return 0.0;
        }
        (total.saturating_sub(idle) as f64 / total as f64) as f32
    }
}

/// Host resources at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub memory: MemoryStats,
    pub cpu_usage: f32,
}

/// Reads host counters on demand. Sampling never fails the caller.
#[derive(Clone)]
pub struct TelemetrySampler {
    meminfo_path: PathBuf,
    cpu: Arc<dyn CpuSampler>,
}

impl TelemetrySampler {
    pub fn new(cpu: Arc<dyn CpuSampler>) -> Self {
        Self {
            meminfo_path: PathBuf::from(MEMINFO_PATH),
            cpu,
        }
    }

    pub fn with_meminfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.meminfo_path = path.into();
        self
    }

    pub fn sample_memory(&self) -> MemoryStats {
        let contents = match std::fs::read_to_string(&self.meminfo_path) {
            Ok(contents) => contents,
            Err(source) => {
                let err = TelemetryError::Read {
                    path: self.meminfo_path.display().to_string(),
                    source,
                };
                warn!("Error reading memory stats: {}", err);
                return MemoryStats::UNAVAILABLE;
            }
        };

        parse_meminfo(&contents).unwrap_or_else(|err| {
            warn!("Error parsing memory stats: {}", err);
            MemoryStats::UNAVAILABLE
        })
    }

    pub fn sample_cpu(&self) -> f32 {
        self.cpu.sample()
    }

    pub fn sample(&self) -> TelemetrySample {
        TelemetrySample {
            memory: self.sample_memory(),
            cpu_usage: self.sample_cpu(),
        }
    }
}

impl Default for TelemetrySampler {
    fn default() -> Self {
        Self::new(Arc::new(ConstantCpuSampler::default()))
    }
}
