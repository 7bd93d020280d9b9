//! Per-type and special-bond tables as they live on the device.

use super::buffers::DeviceVec;
use super::device::{Device, DeviceError, DeviceInfo};
use super::error::PairError;
use crate::core::params::ScaleMatrix;
use crate::core::precision::Real;
use crate::core::special::{SPECIAL_DEGREES, SpecialCoulomb};
use std::mem::size_of;
use std::sync::Arc;

/// Whether the scale table fits in block-local memory for `ntypes` real types.
pub fn shared_types_eligible(ntypes: usize, info: &DeviceInfo) -> bool {
    // `ntypes + 1` rows including the padding row.
    ntypes < info.max_shared_types && info.block_size >= info.max_shared_types
}

/// Side of the packed type table and whether the fast path applies.
pub fn table_dim(ntypes: usize, info: &DeviceInfo) -> (usize, bool) {
    if shared_types_eligible(ntypes, info) {
        (info.max_shared_types, true)
    } else {
        (ntypes + 1, false)
    }
}

/// Row-major `dim * dim` table with `matrix[i][j]` for `i, j <= ntypes`, zero elsewhere.
pub fn pack_type_table<N: Real>(matrix: &ScaleMatrix, dim: usize, out: &mut Vec<N>) {
    out.clear();
    out.resize(dim * dim, N::zero());
    let n = matrix.ntypes().min(dim.saturating_sub(1));
    for i in 0..=n {
        for j in 0..=n {
            out[i * dim + j] = N::of(matrix.get(i, j));
        }
    }
}

/// Bytes the tables for `dim` take on the device.
pub fn device_bytes<N: Real>(dim: usize) -> usize {
    (dim * dim + SPECIAL_DEGREES) * size_of::<N>()
}

/// Scale and special-Coulomb tables.
///
/// The host mirror of the scale table is kept so `repack` can reuse its
/// allocation.
#[derive(Debug)]
pub struct TypeTables<N: Real> {
    scale: Arc<DeviceVec<N>>,
    sp_cl: Arc<DeviceVec<N>>,
    host_scale: Vec<N>,
    dim: usize,
    ntypes: usize,
}

impl<N: Real> TypeTables<N> {
    pub fn upload(
        device: &Arc<Device>,
        matrix: &ScaleMatrix,
        special: &SpecialCoulomb,
        dim: usize,
    ) -> Result<Self, DeviceError> {
        let mut host_scale = Vec::new();
        pack_type_table(matrix, dim, &mut host_scale);
        let mut scale = DeviceVec::alloc(device, dim * dim)?;
        scale.upload(&host_scale)?;
        let mut sp_cl = DeviceVec::alloc(device, SPECIAL_DEGREES)?;
        sp_cl.upload(&special.device_table::<N>())?;
        Ok(Self {
            scale: Arc::new(scale),
            sp_cl: Arc::new(sp_cl),
            host_scale,
            dim,
            ntypes: matrix.ntypes(),
        })
    }

    /// Re-packs and re-uploads the scale table in place.
    pub fn repack(&mut self, matrix: &ScaleMatrix) -> Result<(), PairError> {
        pack_type_table(matrix, self.dim, &mut self.host_scale);
        let scale = Arc::get_mut(&mut self.scale).ok_or(PairError::Busy)?;
        scale.upload(&self.host_scale)?;
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    pub fn scale(&self) -> &Arc<DeviceVec<N>> {
        &self.scale
    }

    pub fn sp_cl(&self) -> &Arc<DeviceVec<N>> {
        &self.sp_cl
    }

    pub fn host_bytes(&self) -> usize {
        self.host_scale.capacity() * size_of::<N>()
    }
}
