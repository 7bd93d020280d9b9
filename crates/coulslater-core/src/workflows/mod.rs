//! # Workflows Module
//!
//! High-level entry points that drive the pair style end to end.
//!
//! ## Architecture
//!
//! - **Evaluation Workflow** ([`evaluate`]) - opens a device, initializes the pair
//!   style for a described system, runs a number of timesteps with the device
//!   share and the host share computed concurrently, applies scheduled
//!   coefficient changes through `reinit`, and merges the answers.
//!
//! ## Key Capabilities
//!
//! - **Precision selection** at run time (single, mixed or double builds)
//! - **Overlap** of device and host work within each step
//! - **Progress monitoring** through [`crate::engine::progress::ProgressReporter`]

pub mod evaluate;

use crate::core::models::ModelError;
use crate::core::params::ParamError;
use crate::core::special::SpecialError;
use crate::engine::device::DeviceError;
use crate::engine::error::PairError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Pair style failed with status {code}: {0}", code = .0.code())]
    Pair(#[from] PairError),

    #[error("Invalid system: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid coefficients: {0}")]
    Params(#[from] ParamError),

    #[error("Invalid special-bond factors: {0}")]
    Special(#[from] SpecialError),
}
