//! Error type for the integrator.
//!
//! Nothing here is recoverable mid-run: invalid input is rejected before the
//! first tick, everything else aborts the integration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HermiteError {
    /// The initial particle set is empty.
    #[error("particle set is empty")]
    EmptySystem,

    /// A particle failed validation at load time.
    #[error("particle {index} rejected: {reason}")]
    InvalidParticle { index: usize, reason: &'static str },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Force or step computation produced NaN/Inf.
    #[error("non-finite {quantity} for particle {index} at tick {tick}")]
    NumericalDegeneracy {
        tick: u64,
        index: usize,
        quantity: &'static str,
    },

    /// No GPU adapter could be requested.
    #[error("no GPU adapter found: {0}")]
    NoAdapter(String),

    /// The adapter cannot run f64 shaders.
    #[error("GPU adapter {0} does not support SHADER_F64")]
    NoShaderF64(String),

    /// Device creation failed or lacks a required feature.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// The crate was built without compiling the SPIR-V kernels.
    #[error("compute shaders unavailable, rebuild with `--features gpu`")]
    ShaderUnavailable,

    /// No force kernel is compiled for this tile width.
    #[error("no force kernel for block size {0} (available: 32, 64, 128, 256)")]
    UnsupportedBlockSize(usize),

    /// The active set needs more workgroups than the device can dispatch.
    #[error("dispatch of {groups} workgroups exceeds the device limit of {limit}")]
    DispatchTooLarge { groups: u32, limit: u32 },

    /// A device buffer would exceed the adapter's binding limit.
    #[error("{buffer} buffer needs {bytes} bytes, the device binds at most {limit}")]
    BufferTooLarge {
        buffer: &'static str,
        bytes: u64,
        limit: u64,
    },

    /// Host/device transfer or read-back failed.
    #[error("GPU transfer failed: {0}")]
    Transfer(String),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_offending_particle_and_tick() {
        let err = HermiteError::NumericalDegeneracy {
            tick: 42,
            index: 7,
            quantity: "acceleration",
        };
        assert_eq!(
            err.to_string(),
            "non-finite acceleration for particle 7 at tick 42"
        );
    }

    #[test]
    fn display_invalid_particle() {
        let err = HermiteError::InvalidParticle {
            index: 3,
            reason: "mass must be positive",
        };
        assert!(err.to_string().contains("particle 3"));
        assert!(err.to_string().contains("mass must be positive"));
    }

    #[test]
    fn converts_into_anyhow() {
        let err: anyhow::Error = HermiteError::ShaderUnavailable.into();
        assert!(err.to_string().contains("--features gpu"));
    }
}
