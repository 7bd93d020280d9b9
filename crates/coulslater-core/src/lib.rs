//! # coulslater Core Library
//!
//! An accelerated implementation of the `coul/slater/long` pair style: Coulomb
//! interactions between point charges whose short-range part is damped by the
//! overlap of Slater-type charge distributions, combined with the real-space
//! part of an Ewald sum.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless pieces: numeric precision traits,
//!   host-side parameter tables, the special-bond table, the analytic force law,
//!   host atom/neighbor models and a host reference evaluation.
//!
//! - **[`engine`]: The Device Layer.** Stateful pieces: the software device and
//!   its memory pool, RAII device buffers, the shared charge compute-loop base
//!   ([`engine::base::ChargeEngine`]) and the pair style itself
//!   ([`engine::pair::CoulSlaterLong`]) with its init / reinit / clear lifecycle
//!   and per-timestep dispatch.
//!
//! - **[`workflows`]: The Public API.** End-to-end evaluation of a described
//!   system over several timesteps, splitting work between device and host.

pub mod core;
pub mod engine;
pub mod workflows;
