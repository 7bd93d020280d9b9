//! C calling convention for host simulation engines.
//!
//! One process-global pair-style instance lives behind a mutex. Its storage
//! and accumulation precision are fixed at build time by the `single`, `mixed`
//! (default) or `double` feature. Every entry point returns `0` or a positive
//! value on success and a negative status code on failure.

use coulslater::core::models::atoms::AtomData;
use coulslater::core::models::neighbors::NeighborList;
use coulslater::core::params::ScaleMatrix;
use coulslater::core::precision::Real;
use coulslater::engine::device::{Device, DeviceInfo};
use coulslater::engine::error::{PairError, status_code};
use coulslater::engine::pair::{CoulSlaterLong, InitArgs};
use nalgebra::Point3;
use once_cell::sync::Lazy;
use std::ffi::c_int;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

#[cfg(feature = "double")]
mod precision {
    pub type Storage = f64;
    pub type Accum = f64;
}

#[cfg(all(feature = "single", not(feature = "double")))]
mod precision {
    pub type Storage = f32;
    pub type Accum = f32;
}

#[cfg(not(any(feature = "single", feature = "double")))]
mod precision {
    pub type Storage = f32;
    pub type Accum = f64;
}

use precision::{Accum, Storage};

type Instance = CoulSlaterLong<Storage, Accum>;

static INSTANCE: Lazy<Mutex<Instance>> = Lazy::new(|| Mutex::new(CoulSlaterLong::new(None)));

fn instance() -> MutexGuard<'static, Instance> {
    INSTANCE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn count(value: c_int, name: &str) -> Result<usize, PairError> {
    usize::try_from(value).map_err(|_| PairError::Argument(format!("{name} is negative: {value}")))
}

/// # Safety
///
/// `rows` must be null or point to `ntypes + 1` row pointers, each null or
/// pointing to `ntypes + 1` readable values.
unsafe fn read_matrix(ntypes: usize, rows: *const *const f64) -> Result<ScaleMatrix, PairError> {
    if rows.is_null() {
        return Err(PairError::Argument("scale matrix is null".into()));
    }
    let dim = ntypes + 1;
    let row_ptrs = unsafe { std::slice::from_raw_parts(rows, dim) };
    let mut matrix = Vec::with_capacity(dim);
    for (i, &row) in row_ptrs.iter().enumerate() {
        if row.is_null() {
            return Err(PairError::Argument(format!("scale matrix row {i} is null")));
        }
        matrix.push(unsafe { std::slice::from_raw_parts(row, dim) }.to_vec());
    }
    Ok(ScaleMatrix::from_rows(&matrix)?)
}

/// Opens the process-global device. Non-positive arguments keep the default
/// description. Any existing pair-style state is cleared first.
#[unsafe(no_mangle)]
pub extern "C" fn csl_gpu_device_init(
    compute_units: c_int,
    global_memory_mb: c_int,
    double_precision: bool,
) -> c_int {
    let mut info = DeviceInfo {
        double_precision,
        ..Default::default()
    };
    match usize::try_from(compute_units) {
        Ok(units) if units > 0 => info.compute_units = units,
        _ => {}
    }
    match usize::try_from(global_memory_mb) {
        Ok(mb) if mb > 0 => info.global_memory = mb << 20,
        _ => {}
    }

    let mut pair = instance();
    pair.clear();
    match Device::open(info) {
        Ok(device) => {
            pair.attach_device(device);
            0
        }
        Err(e) => {
            warn!("Device initialization failed: {e}");
            PairError::from(e).code()
        }
    }
}

/// Releases the pair style and detaches the process-global device.
#[unsafe(no_mangle)]
pub extern "C" fn csl_gpu_device_clear() {
    *instance() = CoulSlaterLong::new(None);
}

/// Initializes the pair style. Checks run in the same order as
/// [`CoulSlaterLong::init`]; a missing device is reported before any
/// argument is read.
///
/// # Safety
///
/// `host_scale` must satisfy the layout described for [`csl_gpu_reinit`] and
/// `host_special_coul` must be null or point to four readable values.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn csl_gpu_init(
    ntypes: c_int,
    host_scale: *const *const f64,
    nlocal: c_int,
    nall: c_int,
    max_nbors: c_int,
    maxspecial: c_int,
    cell_size: f64,
    gpu_split: f64,
    screen: bool,
    cut_coulsq: f64,
    host_special_coul: *const f64,
    qqrd2e: f64,
    g_ewald: f64,
    lamda: f64,
) -> c_int {
    let mut pair = instance();
    pair.clear();
    if let Err(e) = pair.engine().check_device() {
        return e.code();
    }

    let result = (|| -> Result<(), PairError> {
        let ntypes = count(ntypes, "ntypes")?;
        let scale = unsafe { read_matrix(ntypes, host_scale)? };
        let special_coul = if host_special_coul.is_null() {
            [1.0; 4]
        } else {
            let s = unsafe { std::slice::from_raw_parts(host_special_coul, 4) };
            [s[0], s[1], s[2], s[3]]
        };
        let mut args = InitArgs {
            ntypes,
            scale: &scale,
            nlocal: count(nlocal, "nlocal")?,
            nall: count(nall, "nall")?,
            max_nbors: count(max_nbors, "max_nbors")?,
            maxspecial: count(maxspecial, "maxspecial")?,
            cell_size,
            gpu_split,
            screen: None,
            cut_coulsq,
            special_coul,
            qqrd2e,
            g_ewald,
            lamda,
        };
        if screen {
            args = args.with_screen(Box::new(std::io::stderr()));
        }
        pair.init(args)
    })();

    if result.is_ok() {
        info!("Pair style initialized through the C interface.");
    }
    status_code(&result)
}

/// Replaces the per-type-pair scale coefficients.
///
/// # Safety
///
/// `host_scale` must point to `ntypes + 1` row pointers, each pointing to
/// `ntypes + 1` readable values. Row and column 0 are padding.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn csl_gpu_reinit(ntypes: c_int, host_scale: *const *const f64) -> c_int {
    let mut pair = instance();
    let result = (|| -> Result<(), PairError> {
        let ntypes = count(ntypes, "ntypes")?;
        let scale = unsafe { read_matrix(ntypes, host_scale)? };
        pair.reinit(ntypes, &scale)
    })();
    status_code(&result)
}

#[unsafe(no_mangle)]
pub extern "C" fn csl_gpu_clear() {
    instance().clear();
}

/// Host bytes held by the pair style.
#[unsafe(no_mangle)]
pub extern "C" fn csl_gpu_bytes() -> f64 {
    instance().host_memory_usage()
}

/// Computes one timestep and adds the device share of the answers into the
/// caller's buffers. Returns the index of the first particle left to the host
/// (every particle before it is done) or a negative status code.
///
/// # Safety
///
/// - `host_x` points to `3 * nall` values, `host_type` and `host_q` to `nall`.
/// - `numj` points to `inum` counts and `firstneigh` to `inum` rows holding
///   `numj[i]` neighbor indices with special-bond bits.
/// - `f` points to `3 * inum` writable values. `eatom`, `energy` (one value)
///   and `virial` (six values) may be null.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn csl_gpu_compute(
    nlocal: c_int,
    nall: c_int,
    host_x: *const f64,
    host_type: *const c_int,
    host_q: *const f64,
    inum: c_int,
    numj: *const c_int,
    firstneigh: *const *const c_int,
    eflag: bool,
    vflag: bool,
    f: *mut f64,
    eatom: *mut f64,
    energy: *mut f64,
    virial: *mut f64,
) -> c_int {
    let mut pair = instance();
    let result = (|| -> Result<usize, PairError> {
        let nlocal = count(nlocal, "nlocal")?;
        let nall = count(nall, "nall")?;
        let inum = count(inum, "inum")?;
        if host_x.is_null() || host_type.is_null() || host_q.is_null() || f.is_null() {
            return Err(PairError::Argument("particle or force buffer is null".into()));
        }
        if inum > 0 && (numj.is_null() || firstneigh.is_null()) {
            return Err(PairError::Argument("neighbor buffers are null".into()));
        }

        let x = unsafe { std::slice::from_raw_parts(host_x, 3 * nall) };
        let positions = x.chunks_exact(3).map(|p| Point3::new(p[0], p[1], p[2])).collect();
        let types = unsafe { std::slice::from_raw_parts(host_type, nall) }
            .iter()
            .map(|&t| count(t, "atom type"))
            .collect::<Result<Vec<_>, _>>()?;
        let charges = unsafe { std::slice::from_raw_parts(host_q, nall) }.to_vec();
        let atoms = AtomData::new(nlocal, positions, types, charges)?;

        let mut lists = Vec::with_capacity(inum);
        if inum > 0 {
            let counts = unsafe { std::slice::from_raw_parts(numj, inum) };
            let rows = unsafe { std::slice::from_raw_parts(firstneigh, inum) };
            for (&n, &row) in counts.iter().zip(rows) {
                let n = count(n, "neighbor count")?;
                if n > 0 && row.is_null() {
                    return Err(PairError::Argument("neighbor row is null".into()));
                }
                let row = if n == 0 {
                    &[][..]
                } else {
                    unsafe { std::slice::from_raw_parts(row, n) }
                };
                lists.push(row.iter().map(|&j| j as u32).collect::<Vec<u32>>());
            }
        }
        let neighbors = NeighborList::from_lists(&lists);

        let answers = pair.compute(&atoms, &neighbors, eflag, vflag)?.wait()?;

        let forces = unsafe { std::slice::from_raw_parts_mut(f, 3 * inum) };
        for (out, fi) in forces.chunks_exact_mut(3).zip(&answers.forces) {
            for k in 0..3 {
                out[k] += fi[k].as_f64();
            }
        }
        if eflag {
            if !eatom.is_null() {
                let per_atom = unsafe { std::slice::from_raw_parts_mut(eatom, inum) };
                for (out, &e) in per_atom.iter_mut().zip(&answers.energies) {
                    *out += e.as_f64();
                }
            }
            if !energy.is_null() {
                unsafe { *energy += answers.totals.ecoul };
            }
        }
        if vflag && !virial.is_null() {
            let out = unsafe { std::slice::from_raw_parts_mut(virial, 6) };
            for (o, v) in out.iter_mut().zip(answers.totals.virial) {
                *o += v;
            }
        }
        Ok(answers.host_start)
    })();

    match result {
        Ok(host_start) => c_int::try_from(host_start).unwrap_or(c_int::MAX),
        Err(e) => {
            warn!("Force computation failed: {e}");
            e.code()
        }
    }
}
