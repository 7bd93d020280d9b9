use approx::assert_relative_eq;
use coulslater::core::models::atoms::AtomData;
use coulslater::core::models::neighbors::{NeighborList, SpecialBonds};
use coulslater::core::params::{PhysicalConstants, ScaleMatrix};
use coulslater::core::precision::Real;
use coulslater::core::reference::{self, HostParams};
use coulslater::core::special::SpecialCoulomb;
use coulslater::engine::base::StepAnswers;
use coulslater::engine::device::{Device, DeviceInfo};
use coulslater::engine::error::{PairError, status_code};
use coulslater::engine::pair::{CoulSlaterLong, InitArgs};
use nalgebra::Point3;
use statrs::function::erf::erfc;
use std::sync::Arc;

const CUTOFF: f64 = 9.0;
const QQRD2E: f64 = 332.06371;
const G_EWALD: f64 = 0.29;
const LAMDA: f64 = 0.7;

fn consts() -> PhysicalConstants {
    PhysicalConstants {
        cut_coulsq: CUTOFF * CUTOFF,
        qqrd2e: QQRD2E,
        g_ewald: G_EWALD,
        lamda: LAMDA,
    }
}

fn open(info: DeviceInfo) -> Arc<Device> {
    Device::open(DeviceInfo {
        compute_units: 2,
        ..info
    })
    .unwrap()
}

fn init_args<'a>(scale: &'a ScaleMatrix, atoms: &AtomData, max_nbors: usize) -> InitArgs<'a> {
    InitArgs {
        ntypes: scale.ntypes(),
        scale,
        nlocal: atoms.nlocal(),
        nall: atoms.nall(),
        max_nbors,
        maxspecial: 4,
        cell_size: CUTOFF,
        gpu_split: 0.0,
        screen: None,
        cut_coulsq: CUTOFF * CUTOFF,
        special_coul: [0.0, 0.0, 0.5, 0.8333],
        qqrd2e: QQRD2E,
        g_ewald: G_EWALD,
        lamda: LAMDA,
    }
}

/// Two well-separated dimers: one of type 1 atoms, one of type 2 atoms.
fn two_dimers() -> AtomData {
    AtomData::new(
        4,
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.4, 0.0, 0.0),
            Point3::new(30.0, 0.0, 0.0),
            Point3::new(31.2, 0.3, 0.0),
        ],
        vec![1, 1, 2, 2],
        vec![0.6, -0.6, 0.35, -0.45],
    )
    .unwrap()
}

/// A small irregular cluster with a bonded triple.
fn cluster() -> (AtomData, NeighborList) {
    let atoms = AtomData::new(
        6,
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.96, 0.0, 0.0),
            Point3::new(-0.24, 0.93, 0.0),
            Point3::new(2.8, 0.4, -0.3),
            Point3::new(3.5, 1.1, 0.2),
            Point3::new(1.2, -2.1, 1.7),
        ],
        vec![1, 2, 2, 1, 2, 1],
        vec![-0.82, 0.41, 0.41, -0.5, 0.5, 0.0],
    )
    .unwrap();
    let mut specials = SpecialBonds::new(6);
    specials.add(0, 1, 1).unwrap();
    specials.add(0, 2, 1).unwrap();
    specials.add(1, 2, 2).unwrap();
    specials.add(3, 4, 1).unwrap();
    let list = NeighborList::build_full(&atoms, CUTOFF, &specials).unwrap();
    (atoms, list)
}

fn step<N: Real, A: Real>(
    pair: &mut CoulSlaterLong<N, A>,
    atoms: &AtomData,
    list: &NeighborList,
) -> StepAnswers<A> {
    pair.compute(atoms, list, true, true).unwrap().wait().unwrap()
}

#[test]
fn init_then_clear_restores_device_and_host_usage() {
    let device = open(DeviceInfo::default());
    let (atoms, list) = cluster();
    let scale = ScaleMatrix::uniform(2, 1.0);
    let mut pair = CoulSlaterLong::<f32, f64>::with_device(Arc::clone(&device));
    let host_baseline = pair.host_memory_usage();

    pair.init(init_args(&scale, &atoms, 16)).unwrap();
    step(&mut pair, &atoms, &list);
    assert!(device.used_bytes() > 0);
    assert!(pair.host_memory_usage() > host_baseline);

    pair.clear();
    assert_eq!(device.used_bytes(), 0);
    assert_eq!(pair.host_memory_usage(), host_baseline);
    assert!(!pair.state().allocated);
}

#[test]
fn reinit_changes_only_affected_type_pairs() {
    let device = open(DeviceInfo::default());
    let atoms = two_dimers();
    let list = NeighborList::build_full(&atoms, CUTOFF, &SpecialBonds::new(4)).unwrap();
    let before = ScaleMatrix::uniform(2, 1.0);
    let mut after = before.clone();
    after.set(2, 2, 0.5).unwrap();

    let mut pair = CoulSlaterLong::<f64, f64>::with_device(Arc::clone(&device));
    pair.init(init_args(&before, &atoms, 4)).unwrap();
    let original = step(&mut pair, &atoms, &list);
    let used = device.used_bytes();
    pair.reinit(2, &after).unwrap();
    assert_eq!(device.used_bytes(), used);
    let updated = step(&mut pair, &atoms, &list);

    assert_eq!(updated.forces[0], original.forces[0]);
    assert_eq!(updated.forces[1], original.forces[1]);
    assert_relative_eq!(updated.forces[2][0], 0.5 * original.forces[2][0], max_relative = 1e-12);

    let mut fresh = CoulSlaterLong::<f64, f64>::with_device(device);
    fresh.init(init_args(&after, &atoms, 4)).unwrap();
    let reference = step(&mut fresh, &atoms, &list);
    assert_eq!(updated.forces, reference.forces);
    assert_eq!(updated.energies, reference.energies);
}

#[test]
fn bytes_per_atom_is_monotone_and_available_before_init() {
    let pair = CoulSlaterLong::<f32, f64>::new(None);
    let mut previous = 0;
    for rows in 0..512 {
        let bytes = pair.bytes_per_atom(rows);
        assert!(bytes >= previous);
        previous = bytes;
    }
    let double = CoulSlaterLong::<f64, f64>::new(None);
    assert!(double.bytes_per_atom(64) > pair.bytes_per_atom(64));
}

#[test]
fn pair_energy_is_symmetric_under_index_swap() {
    let device = open(DeviceInfo::default());
    let scale = ScaleMatrix::uniform(2, 1.0);
    let make = |swap: bool| {
        let (mut pos, mut ty, mut q) = (
            vec![Point3::origin(), Point3::new(1.1, 0.7, 0.0)],
            vec![1, 2],
            vec![0.7, -0.3],
        );
        if swap {
            pos.swap(0, 1);
            ty.swap(0, 1);
            q.swap(0, 1);
        }
        let atoms = AtomData::new(2, pos, ty, q).unwrap();
        let list = NeighborList::build_full(&atoms, CUTOFF, &SpecialBonds::new(2)).unwrap();
        (atoms, list)
    };
    let mut pair = CoulSlaterLong::<f64, f64>::with_device(device);
    let (a, la) = make(false);
    pair.init(init_args(&scale, &a, 4)).unwrap();
    let direct = step(&mut pair, &a, &la);
    let (b, lb) = make(true);
    let swapped = step(&mut pair, &b, &lb);

    assert_relative_eq!(direct.totals.ecoul, swapped.totals.ecoul, max_relative = 1e-14);
    assert_relative_eq!(direct.energies[0], swapped.energies[1], max_relative = 1e-14);
    assert_relative_eq!(direct.forces[0][0], swapped.forces[1][0], max_relative = 1e-14);
}

#[test]
fn split_zero_runs_everything_on_device_and_split_one_nothing() {
    let device = open(DeviceInfo::default());
    let (atoms, list) = cluster();
    let scale = ScaleMatrix::uniform(2, 1.0);
    let mut pair = CoulSlaterLong::<f32, f32>::with_device(device);

    pair.init(init_args(&scale, &atoms, 16)).unwrap();
    let pending = pair.compute(&atoms, &list, false, false).unwrap();
    assert_eq!(pending.host_start(), atoms.nlocal());
    assert_eq!(pending.wait().unwrap().forces.len(), atoms.nlocal());

    let mut args = init_args(&scale, &atoms, 16);
    args.gpu_split = 1.0;
    pair.init(args).unwrap();
    let pending = pair.compute(&atoms, &list, false, false).unwrap();
    assert_eq!(pending.host_start(), 0);
    assert_eq!(pending.shape().grid, 0);
    assert!(pending.wait().unwrap().forces.is_empty());
}

#[test]
fn two_particle_force_matches_closed_form() {
    let device = open(DeviceInfo::default());
    let scale = ScaleMatrix::uniform(1, 1.0);
    let (qi, qj) = (0.5, -0.7);
    for &r in &[0.4, 1.0, 2.5, 6.0] {
        let atoms = AtomData::new(
            2,
            vec![Point3::origin(), Point3::new(r, 0.0, 0.0)],
            vec![1, 1],
            vec![qi, qj],
        )
        .unwrap();
        let list = NeighborList::build_full(&atoms, CUTOFF, &SpecialBonds::new(2)).unwrap();
        let mut pair = CoulSlaterLong::<f32, f64>::with_device(Arc::clone(&device));
        pair.init(init_args(&scale, &atoms, 4)).unwrap();
        let answers = step(&mut pair, &atoms, &list);

        let qq = QQRD2E * qi * qj;
        let x = r / LAMDA;
        let g = G_EWALD * r;
        let slater = (-2.0 * x).exp() * (1.0 + 2.0 * x * (1.0 + x));
        let force = qq / (r * r)
            * (erfc(g) + 2.0 / std::f64::consts::PI.sqrt() * g * (-g * g).exp() - slater);
        let energy = qq / r * (erfc(g) - (1.0 + x) * (-2.0 * x).exp());

        // Atom 0 sits at the origin, so del = -r along x.
        assert_relative_eq!(answers.forces[0][0], -force, max_relative = 1e-4);
        assert_relative_eq!(answers.forces[1][0], force, max_relative = 1e-4);
        assert_relative_eq!(answers.totals.ecoul, energy, max_relative = 1e-4);
    }
}

#[test]
fn unsupported_precision_fails_with_status_five_and_allocates_nothing() {
    let device = open(DeviceInfo {
        double_precision: false,
        ..Default::default()
    });
    let (atoms, _) = cluster();
    let scale = ScaleMatrix::uniform(2, 1.0);
    let mut pair = CoulSlaterLong::<f64, f64>::with_device(Arc::clone(&device));
    let baseline = pair.host_memory_usage();
    let result = pair.init(init_args(&scale, &atoms, 16));
    assert_eq!(status_code(&result), -5);
    assert_eq!(device.used_bytes(), 0);
    assert_eq!(device.peak_bytes(), 0);
    assert_eq!(pair.host_memory_usage(), baseline);
}

#[test]
fn init_on_a_device_too_small_fails_with_status_three_and_leaks_nothing() {
    let device = open(DeviceInfo {
        global_memory: 4096,
        ..Default::default()
    });
    let (atoms, _) = cluster();
    let scale = ScaleMatrix::uniform(2, 1.0);
    let mut pair = CoulSlaterLong::<f32, f64>::with_device(Arc::clone(&device));
    let result = pair.init(init_args(&scale, &atoms, 512));
    assert!(matches!(result, Err(PairError::OutOfMemory { .. })));
    assert_eq!(status_code(&result), -3);
    assert_eq!(device.used_bytes(), 0);
    assert!(!pair.state().allocated);
}

#[test]
fn failed_regrow_leaves_the_pair_style_unallocated() {
    let device = open(DeviceInfo {
        global_memory: 3000,
        ..Default::default()
    });
    let spread = |n: usize| {
        AtomData::new(
            n,
            (0..n).map(|i| Point3::new(50.0 * i as f64, 0.0, 0.0)).collect(),
            vec![1; n],
            vec![0.1; n],
        )
        .unwrap()
    };
    let small = spread(2);
    let scale = ScaleMatrix::uniform(2, 1.0);
    let mut pair = CoulSlaterLong::<f64, f64>::with_device(Arc::clone(&device));
    pair.init(init_args(&scale, &small, 1)).unwrap();
    assert!(device.used_bytes() > 0);

    let large = spread(40);
    let list = NeighborList::build_full(&large, CUTOFF, &SpecialBonds::new(40)).unwrap();
    let result = pair.compute(&large, &list, true, true).map(|_| ());
    assert_eq!(status_code(&result), -3);
    assert!(!pair.state().allocated);
    assert_eq!(pair.state().atom_capacity, 0);
    assert_eq!(device.used_bytes(), 0);

    let again = pair.compute(&large, &list, true, true).map(|_| ());
    assert_eq!(status_code(&again), -20);

    pair.init(init_args(&scale, &small, 1)).unwrap();
    assert!(pair.state().allocated);
}

#[test]
fn neighbor_rows_grow_when_a_list_overflows() {
    let device = open(DeviceInfo::default());
    let (atoms, list) = cluster();
    let scale = ScaleMatrix::uniform(2, 1.0);
    let mut pair = CoulSlaterLong::<f64, f64>::with_device(device);
    pair.init(init_args(&scale, &atoms, 1)).unwrap();
    assert_eq!(pair.state().neighbor_rows, 1);

    let answers = step(&mut pair, &atoms, &list);
    assert!(pair.state().neighbor_rows >= list.max_neighbors());
    assert_eq!(pair.stats().resizes, 1);

    let special = SpecialCoulomb::new([0.0, 0.0, 0.5, 0.8333]).unwrap();
    let c = consts();
    let host = reference::evaluate_range(
        &atoms,
        &list,
        0..atoms.nlocal(),
        HostParams {
            scale: &scale,
            special: &special,
            consts: &c,
        },
        true,
        true,
    );
    for (d, h) in answers.forces.iter().zip(&host.forces) {
        assert_relative_eq!(d[0], h.x, epsilon = 1e-9);
        assert_relative_eq!(d[1], h.y, epsilon = 1e-9);
        assert_relative_eq!(d[2], h.z, epsilon = 1e-9);
    }
    assert_relative_eq!(answers.totals.ecoul, host.totals.ecoul, epsilon = 1e-9);
    for k in 0..6 {
        assert_relative_eq!(answers.totals.virial[k], host.totals.virial[k], epsilon = 1e-9);
    }
}

#[test]
fn special_neighbors_are_scaled_by_their_factor() {
    let device = open(DeviceInfo::default());
    let atoms = AtomData::new(
        2,
        vec![Point3::origin(), Point3::new(1.5, 0.0, 0.0)],
        vec![1, 1],
        vec![0.5, -0.5],
    )
    .unwrap();
    let plain = NeighborList::build_full(&atoms, CUTOFF, &SpecialBonds::new(2)).unwrap();
    let mut bonded = SpecialBonds::new(2);
    bonded.add(0, 1, 2).unwrap();
    let bonded = NeighborList::build_full(&atoms, CUTOFF, &bonded).unwrap();
    let scale = ScaleMatrix::uniform(1, 1.0);

    let mut pair = CoulSlaterLong::<f64, f64>::with_device(device);
    pair.init(init_args(&scale, &atoms, 4)).unwrap();
    let e_plain = step(&mut pair, &atoms, &plain).totals.ecoul;
    let e_bonded = step(&mut pair, &atoms, &bonded).totals.ecoul;

    // 1-3 factor 0.5 removes half of the bare Coulomb share 1 - (1 + x) e^{-2x}.
    let r: f64 = 1.5;
    let x = r / LAMDA;
    let prefactor = QQRD2E * 0.5 * -0.5 / r;
    let removed = 0.5 * prefactor * (1.0 - (1.0 + x) * (-2.0 * x).exp());
    assert_relative_eq!(e_plain - e_bonded, removed, max_relative = 1e-9);
}

#[test]
fn fast_and_slow_type_paths_give_identical_results() {
    let (atoms, list) = cluster();
    let scale = {
        let mut m = ScaleMatrix::uniform(2, 1.0);
        m.set(1, 2, 0.75).unwrap();
        m
    };
    let fast_device = open(DeviceInfo::default());
    let slow_device = open(DeviceInfo {
        max_shared_types: 2,
        ..Default::default()
    });

    let mut fast = CoulSlaterLong::<f32, f64>::with_device(fast_device);
    fast.init(init_args(&scale, &atoms, 16)).unwrap();
    let mut slow = CoulSlaterLong::<f32, f64>::with_device(slow_device);
    slow.init(init_args(&scale, &atoms, 16)).unwrap();
    assert!(fast.shared_types());
    assert!(!slow.shared_types());

    let a = step(&mut fast, &atoms, &list);
    let b = step(&mut slow, &atoms, &list);
    assert_eq!(a.forces, b.forces);
    assert_eq!(a.energies, b.energies);
}

#[test]
fn dispatch_requires_staged_particles() {
    let device = open(DeviceInfo::default());
    let (atoms, _) = cluster();
    let scale = ScaleMatrix::uniform(2, 1.0);
    let mut pair = CoulSlaterLong::<f32, f64>::with_device(device);
    assert_eq!(pair.dispatch(true, false).map(|_| ()).map_err(|e| e.code()), Err(-20));
    pair.init(init_args(&scale, &atoms, 16)).unwrap();
    assert_eq!(pair.dispatch(true, false).map(|_| ()).map_err(|e| e.code()), Err(-20));
}
