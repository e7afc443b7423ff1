// Host telemetry for invocation responses: sampling, the response envelope
// and the resource descriptor served to schedulers.

use thiserror::Error;

mod envelope;
mod resources;
mod sampler;

pub use envelope::{canonical_header_key, header_map, wrap, WrappedResponse};
pub use resources::ResourceDescriptor;
pub use sampler::{
    parse_meminfo, ConstantCpuSampler, CpuSampler, MemoryStats, ProcStatCpuSampler,
    TelemetrySample, TelemetrySampler, MEMINFO_PATH, PROC_STAT_PATH,
};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
