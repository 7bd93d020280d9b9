use super::device::{DeviceError, Platform};
use crate::core::models::ModelError;
use crate::core::params::ParamError;
use crate::core::special::SpecialError;
use thiserror::Error;

/// Failures of the pair style. Each maps to the integer status code the host
/// engine expects, see [`PairError::code`].
#[derive(Debug, Error)]
pub enum PairError {
    #[error("No accelerator context is attached to this pair style")]
    NoDeviceContext,

    #[error("Insufficient memory on accelerator: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("This build has no kernels for the {platform:?} platform")]
    NotCompiled { platform: Platform },

    #[error("{precision} precision is not supported on device '{device}'")]
    PrecisionUnsupported {
        precision: &'static str,
        device: String,
    },

    #[error("Kernel '{kernel}' failed: {message}")]
    Kernel {
        kernel: &'static str,
        message: String,
    },

    #[error("Device buffers are still in use by an unfinished step")]
    Busy,

    #[error("Invalid coefficients: {0}")]
    Params(#[from] ParamError),

    #[error("Invalid atom or neighbor data: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid special-bond factors: {0}")]
    Special(#[from] SpecialError),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Number of atom types changed from {expected} to {found}; a full init is required")]
    TypeCountChanged { expected: usize, found: usize },

    #[error("The pair style has not been initialized")]
    NotInitialized,
}

impl PairError {
    /// Status code in the host engine's convention.
    pub fn code(&self) -> i32 {
        match self {
            Self::NoDeviceContext => -1,
            Self::OutOfMemory { .. } => -3,
            Self::NotCompiled { .. } => -4,
            Self::PrecisionUnsupported { .. } => -5,
            Self::Kernel { .. } | Self::Busy => -6,
            Self::Params(_)
            | Self::Model(_)
            | Self::Special(_)
            | Self::Argument(_)
            | Self::TypeCountChanged { .. } => -13,
            Self::NotInitialized => -20,
        }
    }
}

impl From<DeviceError> for PairError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::OutOfMemory {
                requested,
                available,
            } => Self::OutOfMemory {
                requested,
                available,
            },
            other => Self::Argument(other.to_string()),
        }
    }
}

/// `0` on success, otherwise the error's status code.
pub fn status_code<T>(result: &Result<T, PairError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}
