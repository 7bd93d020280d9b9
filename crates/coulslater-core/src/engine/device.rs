//! The accelerator the pair style runs on.
//!
//! A [`Device`] is an in-process accelerator: a fixed memory capacity that every
//! device buffer is charged against, and a worker pool whose threads stand in
//! for compute units. Kernels launched on it run asynchronously with respect to
//! the host thread.

use crate::core::precision::PrecisionMode;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("Invalid device description: {0}")]
    InvalidInfo(String),

    #[error("Failed to start device workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    #[default]
    Host,
    Cuda,
    Opencl,
    Hip,
}

impl Platform {
    /// Whether this build carries kernels for the platform.
    pub fn kernels_compiled(self) -> bool {
        cfg!(feature = "accelerator") && matches!(self, Self::Host)
    }
}

/// Static description of an accelerator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeviceInfo {
    pub name: String,
    pub platform: Platform,
    pub compute_units: usize,
    /// Global memory in bytes.
    pub global_memory: usize,
    pub double_precision: bool,
    /// Largest padded type-table side that fits in block-local memory.
    pub max_shared_types: usize,
    pub block_size: usize,
    pub threads_per_atom: usize,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "Host Accelerator".to_string(),
            platform: Platform::Host,
            compute_units: std::thread::available_parallelism().map_or(1, |n| n.get()),
            global_memory: 4 << 30,
            double_precision: true,
            max_shared_types: 11,
            block_size: 256,
            threads_per_atom: 8,
        }
    }
}

impl DeviceInfo {
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.compute_units == 0 {
            return Err(DeviceError::InvalidInfo(
                "compute-units must be at least 1".into(),
            ));
        }
        if self.block_size == 0 || self.threads_per_atom == 0 {
            return Err(DeviceError::InvalidInfo(
                "block-size and threads-per-atom must be positive".into(),
            ));
        }
        if self.block_size % self.threads_per_atom != 0 {
            return Err(DeviceError::InvalidInfo(format!(
                "block-size {} is not a multiple of threads-per-atom {}",
                self.block_size, self.threads_per_atom
            )));
        }
        Ok(())
    }

    /// Atoms handled by one block.
    pub fn atoms_per_block(&self) -> usize {
        self.block_size / self.threads_per_atom
    }
}

pub struct Device {
    info: DeviceInfo,
    used: AtomicUsize,
    peak: AtomicUsize,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("used", &self.used_bytes())
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn open(info: DeviceInfo) -> Result<Arc<Self>, DeviceError> {
        info.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(info.compute_units)
            .thread_name(|i| format!("csl-device-{i}"))
            .build()?;
        info!(
            name = %info.name,
            platform = ?info.platform,
            compute_units = info.compute_units,
            memory = info.global_memory,
            "Opened accelerator."
        );
        Ok(Arc::new(Self {
            info,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            pool,
        }))
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn supports_double(&self) -> bool {
        self.info.double_precision
    }

    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn free_bytes(&self) -> usize {
        self.info.global_memory.saturating_sub(self.used_bytes())
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub(crate) fn reserve(&self, bytes: usize) -> Result<(), DeviceError> {
        let capacity = self.info.global_memory;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= capacity)
            })
            .map_err(|used| DeviceError::OutOfMemory {
                requested: bytes,
                available: capacity.saturating_sub(used),
            })?;
        self.peak.fetch_max(self.used_bytes(), Ordering::AcqRel);
        debug!(bytes, used = self.used_bytes(), "Reserved device memory.");
        Ok(())
    }

    pub(crate) fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    pub(crate) fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// One-paragraph description written to the diagnostic stream at init.
    pub fn banner(&self, mode: PrecisionMode) -> String {
        let info = &self.info;
        format!(
            "--------------------------------------------------------------------------\n\
             - Using acceleration for coul/slater/long:\n\
             -  with {} thread(s) per atom, {} atoms per block\n\
             - Device: {} ({:?}), {} compute units, {:.1} GB, {}\n\
             --------------------------------------------------------------------------",
            info.threads_per_atom,
            info.atoms_per_block(),
            info.name,
            info.platform,
            info.compute_units,
            info.global_memory as f64 / (1u64 << 30) as f64,
            mode.label(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(memory: usize) -> Arc<Device> {
        Device::open(DeviceInfo {
            compute_units: 2,
            global_memory: memory,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn reserve_and_release_track_usage_and_peak() {
        let device = small(1000);
        device.reserve(600).unwrap();
        device.reserve(300).unwrap();
        assert_eq!(device.used_bytes(), 900);
        assert_eq!(device.free_bytes(), 100);
        device.release(600);
        assert_eq!(device.used_bytes(), 300);
        assert_eq!(device.peak_bytes(), 900);
    }

    #[test]
    fn reserve_beyond_capacity_fails_without_changing_usage() {
        let device = small(1000);
        device.reserve(800).unwrap();
        match device.reserve(300) {
            Err(DeviceError::OutOfMemory {
                requested,
                available,
            }) => {
                assert_eq!(requested, 300);
                assert_eq!(available, 200);
            }
            other => panic!("expected out of memory, got {other:?}"),
        }
        assert_eq!(device.used_bytes(), 800);
    }

    #[test]
    fn validate_rejects_inconsistent_launch_geometry() {
        let info = DeviceInfo {
            block_size: 100,
            threads_per_atom: 8,
            ..Default::default()
        };
        assert!(info.validate().is_err());
        assert!(Device::open(info).is_err());
    }

    #[test]
    fn only_host_platform_has_kernels_in_this_build() {
        assert_eq!(
            Platform::Host.kernels_compiled(),
            cfg!(feature = "accelerator")
        );
        assert!(!Platform::Cuda.kernels_compiled());
    }

    #[test]
    fn banner_names_device_and_precision() {
        let device = small(1 << 30);
        let banner = device.banner(PrecisionMode::Mixed);
        assert!(banner.contains("Host Accelerator"));
        assert!(banner.contains("Mixed Precision"));
        assert!(banner.contains("32 atoms per block"));
    }
}
