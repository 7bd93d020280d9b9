use super::base::{PairInput, PairKernel};
use super::buffers::DeviceVec;
use crate::core::params::PhysicalConstants;
use crate::core::potentials::{PairForce, coul_slater_long};
use crate::core::precision::Real;
use std::sync::Arc;

/// The Slater-damped real-space Ewald law, configured with the tables of one
/// pair-style instance.
#[derive(Debug, Clone)]
pub struct SlaterLongKernel<N: Real> {
    scale: Arc<DeviceVec<N>>,
    sp_cl: Arc<DeviceVec<N>>,
    dim: usize,
    consts: PhysicalConstants<N>,
    shared_types: bool,
}

impl<N: Real> SlaterLongKernel<N> {
    pub fn new(
        scale: Arc<DeviceVec<N>>,
        sp_cl: Arc<DeviceVec<N>>,
        dim: usize,
        consts: PhysicalConstants<N>,
        shared_types: bool,
    ) -> Self {
        Self {
            scale,
            sp_cl,
            dim,
            consts,
            shared_types,
        }
    }

    pub fn shared_types(&self) -> bool {
        self.shared_types
    }
}

impl<N: Real> PairKernel<N> for SlaterLongKernel<N> {
    fn name(&self) -> &'static str {
        if self.shared_types {
            "k_coul_slater_long_fast"
        } else {
            "k_coul_slater_long"
        }
    }

    fn begin_block(&self, local: &mut Vec<N>) {
        if self.shared_types {
            local.clear();
            local.extend_from_slice(self.scale.as_slice());
        }
    }

    #[inline]
    fn pair(&self, local: &[N], input: &PairInput<N>, eflag: bool) -> Option<PairForce<N>> {
        let table = if local.is_empty() {
            self.scale.as_slice()
        } else {
            local
        };
        let scale = table[input.itype * self.dim + input.jtype];
        let qq = self.consts.qqrd2e * scale * input.qi * input.qj;
        let factor_coul = N::one() - self.sp_cl.as_slice()[input.degree];
        coul_slater_long(input.rsq, qq, factor_coul, &self.consts, eflag)
    }
}
