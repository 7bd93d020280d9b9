//! # Engine Module
//!
//! The stateful device layer of the pair style.
//!
//! ## Architecture
//!
//! - **Device** ([`device`], [`buffers`]) - the accelerator descriptor, its memory
//!   pool and worker pool, and RAII device buffers that return their bytes on drop
//! - **Type data** ([`tables`]) - the scale table and special-Coulomb table as
//!   they live on the device, plus fast-path eligibility
//! - **Compute-loop base** ([`base`]) - atom, neighbor and answer storage shared by
//!   every charge pair style, host/device split, non-blocking launch
//! - **Force law** ([`kernel`]) - the Slater-long kernel the base is configured with
//! - **Pair style** ([`pair`]) - init / reinit / clear lifecycle and per-step dispatch
//! - **Bookkeeping** ([`state`], [`progress`]) - execution state, run statistics,
//!   progress events
//! - **Configuration & errors** ([`config`], [`error`])
//!
//! ## Key Capabilities
//!
//! - **Generic precision** with separate storage and accumulation types
//! - **Leak-free lifecycle**: a failed `init` releases everything it acquired
//! - **Overlap** of device work with host work on the remaining particles
//! - **Runtime coefficient updates** through `reinit` without reallocation

pub mod base;
pub mod buffers;
pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod pair;
pub mod progress;
pub mod state;
pub mod tables;
