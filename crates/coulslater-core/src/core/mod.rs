//! # Core Module
//!
//! Stateless building blocks of the pair style.
//!
//! - **Numeric precision** ([`precision`]) - storage/accumulation scalar traits
//! - **Parameters** ([`params`]) - the host scale matrix and physical constants
//! - **Special bonds** ([`special`]) - 1-2/1-3/1-4 Coulomb factors and the
//!   neighbor-index bit encoding
//! - **Force law** ([`potentials`]) - Slater-damped real-space Ewald force and energy
//! - **Accumulators** ([`term`]) - per-atom energy/virial terms
//! - **Host models** ([`models`]) - atoms and full neighbor lists as the host hands them over
//! - **Reference path** ([`reference`]) - host evaluation of the same law

pub mod models;
pub mod params;
pub mod potentials;
pub mod precision;
pub mod reference;
pub mod special;
pub mod term;
