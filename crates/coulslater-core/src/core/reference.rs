//! Host evaluation of the Slater-long law in double precision.
//!
//! This is the path the host takes for the particles the device split leaves to
//! it, and the yardstick the device results are checked against.

use super::models::atoms::AtomData;
use super::models::neighbors::NeighborList;
use super::params::{PhysicalConstants, ScaleMatrix};
use super::potentials::coul_slater_long;
use super::special::{SpecialCoulomb, decode};
use super::term::{EnergyTerm, Virial};
use nalgebra::Vector3;
use std::ops::Range;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Everything the law needs besides the particles.
#[derive(Debug, Clone, Copy)]
pub struct HostParams<'a> {
    pub scale: &'a ScaleMatrix,
    pub special: &'a SpecialCoulomb,
    pub consts: &'a PhysicalConstants<f64>,
}

/// Per-atom results for a contiguous range of local atoms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostAnswers {
    pub start: usize,
    pub forces: Vec<Vector3<f64>>,
    pub energies: Vec<f64>,
    pub virials: Vec<[f64; 6]>,
    pub totals: EnergyTerm,
}

struct AtomResult {
    force: Vector3<f64>,
    energy: f64,
    virial: Virial<f64>,
}

pub fn evaluate_range(
    atoms: &AtomData,
    neighbors: &NeighborList,
    range: Range<usize>,
    params: HostParams<'_>,
    eflag: bool,
    vflag: bool,
) -> HostAnswers {
    let sp: [f64; 4] = params.special.device_table();
    let positions = atoms.positions();
    let charges = atoms.charges();
    let types = atoms.types();

    let evaluate_atom = |i: usize| -> AtomResult {
        let xi = positions[i];
        let qi = charges[i];
        let itype = types[i];
        let mut result = AtomResult {
            force: Vector3::zeros(),
            energy: 0.0,
            virial: Virial::default(),
        };
        for &packed in neighbors.neighbors(i) {
            let (j, degree) = decode(packed);
            let del = xi - positions[j];
            let qq = params.consts.qqrd2e * params.scale.get(itype, types[j]) * qi * charges[j];
            let factor_coul = 1.0 - sp[degree];
            let Some(pf) =
                coul_slater_long(del.norm_squared(), qq, factor_coul, params.consts, eflag)
            else {
                continue;
            };
            result.force += del * pf.fpair;
            if eflag {
                result.energy += pf.energy;
            }
            if vflag {
                result.virial += Virial::of_pair([del.x, del.y, del.z], pf.fpair);
            }
        }
        result.energy *= 0.5;
        result.virial = result.virial.scaled(0.5);
        result
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<AtomResult> = range.clone().map(evaluate_atom).collect();

    #[cfg(feature = "parallel")]
    let results: Vec<AtomResult> = range.clone().into_par_iter().map(evaluate_atom).collect();

    let mut answers = HostAnswers {
        start: range.start,
        ..Default::default()
    };
    for r in results {
        answers.totals += EnergyTerm::new(r.energy, r.virial.v);
        answers.forces.push(r.force);
        answers.energies.push(r.energy);
        answers.virials.push(r.virial.v);
    }
    answers
}
