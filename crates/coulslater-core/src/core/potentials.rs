use super::params::PhysicalConstants;
use super::precision::Real;

pub const EWALD_F: f64 = 1.12837917;
pub const EWALD_P: f64 = 0.3275911;
pub const A1: f64 = 0.254829592;
pub const A2: f64 = -0.284496736;
pub const A3: f64 = 1.421413741;
pub const A4: f64 = -1.453152027;
pub const A5: f64 = 1.061405429;

/// Scalar force factor and pair energy for one interacting pair.
///
/// The force on `i` is `del * fpair` with `del = x_i - x_j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairForce<N> {
    pub fpair: N,
    pub energy: N,
}

/// Polynomial complementary error function (Abramowitz & Stegun 7.1.26),
/// taking `exp(-grij^2)` precomputed since the force reuses it.
#[inline]
pub fn erfc_poly<N: Real>(grij: N, expm2: N) -> N {
    let t = (N::one() + N::of(EWALD_P) * grij).recip();
    t * (N::of(A1) + t * (N::of(A2) + t * (N::of(A3) + t * (N::of(A4) + t * N::of(A5))))) * expm2
}

/// Slater-damped real-space Ewald interaction.
///
/// `qq` is `qqrd2e * scale[itype][jtype] * q_i * q_j`. `factor_coul` is
/// `1 - special_coul[degree]` and removes that share of the full Coulomb
/// interaction. Returns `None` at or beyond the cutoff.
#[inline]
pub fn coul_slater_long<N: Real>(
    rsq: N,
    qq: N,
    factor_coul: N,
    consts: &PhysicalConstants<N>,
    eflag: bool,
) -> Option<PairForce<N>> {
    if rsq.is_nan() || rsq >= consts.cut_coulsq {
        return None;
    }
    let one = N::one();
    let two = N::of(2.0);

    let r2inv = rsq.recip();
    let r = rsq.sqrt();
    let grij = consts.g_ewald * r;
    let expm2 = (-grij * grij).exp();
    let erfc = erfc_poly(grij, expm2);

    let prefactor = qq / r;
    let rlamdainv = r / consts.lamda;
    let exprlmdainv = (-two * rlamdainv).exp();
    let slater_term = exprlmdainv * (one + two * rlamdainv * (one + rlamdainv));

    let mut force = prefactor * (erfc + N::of(EWALD_F) * grij * expm2 - slater_term);
    if factor_coul > N::zero() {
        force = force - factor_coul * prefactor * (one - slater_term);
    }

    let energy = if eflag {
        let e_slater = (one + rlamdainv) * exprlmdainv;
        let mut e = prefactor * (erfc - e_slater);
        if factor_coul > N::zero() {
            e = e - factor_coul * prefactor * (one - e_slater);
        }
        e
    } else {
        N::zero()
    };

    Some(PairForce {
        fpair: force * r2inv,
        energy,
    })
}
