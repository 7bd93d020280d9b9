//! Compute-loop base shared by charge pair styles.
//!
//! [`ChargeEngine`] owns everything that is not specific to one force law:
//! packed positions and charges, the neighbor matrix, the answer buffers, the
//! host/device split and the non-blocking launch. A pair style configures it
//! with a [`PairKernel`] each step.

use super::buffers::DeviceVec;
use super::device::{Device, DeviceInfo};
use super::error::PairError;
use super::state::RunStats;
use crate::core::models::atoms::AtomData;
use crate::core::models::neighbors::NeighborList;
use crate::core::potentials::PairForce;
use crate::core::precision::Real;
use crate::core::special::decode;
use crate::core::term::{EnergyTerm, Virial};
use rayon::prelude::*;
use std::mem::size_of;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Growth applied to atom and neighbor-row capacity whenever it is exceeded.
pub const RESIZE_FACTOR: f64 = 1.10;

/// Energy plus six virial components per atom.
pub const ENGV_STRIDE: usize = 7;

pub fn grown(n: usize) -> usize {
    ((n as f64 * RESIZE_FACTOR).ceil() as usize).max(1)
}

/// Device bytes needed per atom of capacity for `max_nbors` neighbor rows.
pub fn bytes_per_atom<N: Real, A: Real>(max_nbors: usize) -> usize {
    size_of::<[N; 4]>()
        + size_of::<N>()
        + size_of::<[A; 4]>()
        + ENGV_STRIDE * size_of::<A>()
        + (max_nbors + 1) * size_of::<u32>()
}

/// Leading local atoms handled by the device when `split` is the fraction
/// left to the host.
pub fn device_share(nlocal: usize, split: f64) -> usize {
    // Products such as 0.07 * 100 land just above the integer they represent.
    let host = ((split * nlocal as f64 - 1e-9).ceil().max(0.0) as usize).min(nlocal);
    nlocal - host
}

/// One pair as the kernel sees it.
#[derive(Debug, Clone, Copy)]
pub struct PairInput<N> {
    pub itype: usize,
    pub jtype: usize,
    pub rsq: N,
    pub qi: N,
    pub qj: N,
    /// Special-bond degree of the pair (0 = ordinary).
    pub degree: usize,
}

/// The force law the base runs for every neighbor pair.
pub trait PairKernel<N: Real>: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Fills block-local memory before a block processes its atoms.
    fn begin_block(&self, _local: &mut Vec<N>) {}

    fn pair(&self, local: &[N], input: &PairInput<N>, eflag: bool) -> Option<PairForce<N>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchShape {
    pub grid: usize,
    pub block_size: usize,
    pub threads_per_atom: usize,
    pub atoms_per_block: usize,
}

impl LaunchShape {
    pub fn new(inum: usize, info: &DeviceInfo) -> Self {
        let atoms_per_block = info.atoms_per_block().max(1);
        Self {
            grid: inum.div_ceil(atoms_per_block),
            block_size: info.block_size,
            threads_per_atom: info.threads_per_atom,
            atoms_per_block,
        }
    }
}

/// Shape of the atom data handed to `init_atomic`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomicArgs {
    pub nlocal: usize,
    pub nall: usize,
    pub max_nbors: usize,
    pub maxspecial: usize,
    pub cell_size: f64,
    pub gpu_split: f64,
}

impl AtomicArgs {
    fn validate(&self) -> Result<(), PairError> {
        if self.nlocal > self.nall {
            return Err(PairError::Argument(format!(
                "nlocal ({}) exceeds nall ({})",
                self.nlocal, self.nall
            )));
        }
        if self.max_nbors == 0 {
            return Err(PairError::Argument("max_nbors must be at least 1".into()));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(PairError::Argument(format!(
                "cell size {} must be positive",
                self.cell_size
            )));
        }
        if !(0.0..=1.0).contains(&self.gpu_split) {
            return Err(PairError::Argument(format!(
                "split fraction {} is outside [0, 1]",
                self.gpu_split
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct AtomBuffers<N: Real> {
    x: Arc<DeviceVec<[N; 4]>>,
    q: Arc<DeviceVec<N>>,
    nbor: Arc<DeviceVec<u32>>,
    numj: Arc<DeviceVec<u32>>,
}

impl<N: Real> AtomBuffers<N> {
    fn alloc(device: &Arc<Device>, capacity: usize, rows: usize) -> Result<Self, PairError> {
        Ok(Self {
            x: Arc::new(DeviceVec::alloc(device, capacity)?),
            q: Arc::new(DeviceVec::alloc(device, capacity)?),
            nbor: Arc::new(DeviceVec::alloc(device, capacity * rows)?),
            numj: Arc::new(DeviceVec::alloc(device, capacity)?),
        })
    }
}

#[derive(Debug)]
struct AnswerBuffers<A: Real> {
    force: DeviceVec<[A; 4]>,
    engv: DeviceVec<A>,
}

impl<A: Real> AnswerBuffers<A> {
    fn alloc(device: &Arc<Device>, capacity: usize) -> Result<Self, PairError> {
        Ok(Self {
            force: DeviceVec::alloc(device, capacity)?,
            engv: DeviceVec::alloc(device, capacity * ENGV_STRIDE)?,
        })
    }
}

fn exclusive<T: Copy + Default>(buf: &mut Arc<DeviceVec<T>>) -> Result<&mut DeviceVec<T>, PairError> {
    Arc::get_mut(buf).ok_or(PairError::Busy)
}

/// Particle counts of the step currently staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staged {
    pub inum: usize,
    pub nlocal: usize,
    pub nall: usize,
}

impl Staged {
    /// First local atom the host processes.
    pub fn host_start(&self) -> usize {
        self.inum
    }
}

pub struct ChargeEngine<N: Real, A: Real> {
    device: Option<Arc<Device>>,
    inputs: Option<AtomBuffers<N>>,
    answers: Option<AnswerBuffers<A>>,
    atom_capacity: usize,
    nbor_rows: usize,
    maxspecial: usize,
    cell_size: f64,
    gpu_split: f64,
    staged: Option<Staged>,
    host_x: Vec<[N; 4]>,
    host_q: Vec<N>,
    host_nbor: Vec<u32>,
    host_numj: Vec<u32>,
    stats: RunStats,
}

impl<N: Real, A: Real> ChargeEngine<N, A> {
    pub fn new(device: Option<Arc<Device>>) -> Self {
        Self {
            device,
            inputs: None,
            answers: None,
            atom_capacity: 0,
            nbor_rows: 0,
            maxspecial: 0,
            cell_size: 0.0,
            gpu_split: 0.0,
            staged: None,
            host_x: Vec::new(),
            host_q: Vec::new(),
            host_nbor: Vec::new(),
            host_numj: Vec::new(),
            stats: RunStats::default(),
        }
    }

    pub fn attach(&mut self, device: Arc<Device>) {
        self.device = Some(device);
    }

    pub fn device(&self) -> Option<&Arc<Device>> {
        self.device.as_ref()
    }

    /// Device context, kernel availability and precision support, in that order.
    pub fn check_device(&self) -> Result<&Arc<Device>, PairError> {
        let device = self.device.as_ref().ok_or(PairError::NoDeviceContext)?;
        let info = device.info();
        if !info.platform.kernels_compiled() {
            return Err(PairError::NotCompiled {
                platform: info.platform,
            });
        }
        if (N::IS_DOUBLE || A::IS_DOUBLE) && !device.supports_double() {
            return Err(PairError::PrecisionUnsupported {
                precision: "double",
                device: info.name.clone(),
            });
        }
        Ok(device)
    }

    /// Allocates atom, neighbor and answer storage.
    ///
    /// `extra_bytes` is what the caller will allocate right after, counted
    /// against the same budget.
    #[instrument(skip_all, name = "init_atomic", fields(nall = args.nall, max_nbors = args.max_nbors))]
    pub fn init_atomic(&mut self, args: &AtomicArgs, extra_bytes: usize) -> Result<(), PairError> {
        args.validate()?;
        let device = Arc::clone(self.check_device()?);

        let capacity = grown(args.nall);
        let rows = args.max_nbors;
        let requested = bytes_per_atom::<N, A>(rows) * capacity + extra_bytes;
        let available = device.free_bytes();
        if requested > available {
            return Err(PairError::OutOfMemory {
                requested,
                available,
            });
        }

        let inputs = AtomBuffers::alloc(&device, capacity, rows)?;
        let answers = AnswerBuffers::alloc(&device, capacity)?;

        self.host_x.reserve_exact(capacity);
        self.host_q.reserve_exact(capacity);
        self.host_numj.reserve_exact(capacity);

        self.inputs = Some(inputs);
        self.answers = Some(answers);
        self.atom_capacity = capacity;
        self.nbor_rows = rows;
        self.maxspecial = args.maxspecial;
        self.cell_size = args.cell_size;
        self.gpu_split = args.gpu_split;
        self.staged = None;
        self.stats = RunStats::default();
        debug!(capacity, rows, used = device.used_bytes(), "Allocated atom storage.");
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.inputs.is_some() && self.answers.is_some()
    }

    fn reallocate(&mut self, capacity: usize, rows: usize) -> Result<(), PairError> {
        let device = Arc::clone(self.device.as_ref().ok_or(PairError::NoDeviceContext)?);
        self.inputs = None;
        self.answers = None;
        self.stats.resizes += 1;
        let (inputs, answers) = match AtomBuffers::alloc(&device, capacity, rows)
            .and_then(|i| Ok((i, AnswerBuffers::alloc(&device, capacity)?)))
        {
            Ok(buffers) => buffers,
            Err(e) => {
                warn!(capacity, rows, "Failed to grow device storage: {e}");
                self.atom_capacity = 0;
                self.nbor_rows = 0;
                self.staged = None;
                return Err(e);
            }
        };
        self.inputs = Some(inputs);
        self.answers = Some(answers);
        self.atom_capacity = capacity;
        self.nbor_rows = rows;
        Ok(())
    }

    /// Packs and uploads one step's particles and the device share of the
    /// neighbor list. Returns the number of atoms the device will process.
    #[instrument(skip_all, name = "stage", fields(nlocal = atoms.nlocal(), nall = atoms.nall()))]
    pub fn stage(&mut self, atoms: &AtomData, neighbors: &NeighborList) -> Result<usize, PairError> {
        if !self.is_allocated() {
            return Err(PairError::NotInitialized);
        }
        neighbors.check(atoms.nlocal(), atoms.nall())?;
        let start = Instant::now();

        let nlocal = atoms.nlocal();
        let nall = atoms.nall();
        let inum = device_share(nlocal, self.gpu_split);
        let rows_needed = (0..inum)
            .map(|i| neighbors.neighbors(i).len())
            .max()
            .unwrap_or(0);

        if nall > self.atom_capacity || rows_needed > self.nbor_rows {
            let capacity = if nall > self.atom_capacity {
                grown(nall)
            } else {
                self.atom_capacity
            };
            let rows = if rows_needed > self.nbor_rows {
                grown(rows_needed)
            } else {
                self.nbor_rows
            };
            info!(
                from_capacity = self.atom_capacity,
                capacity,
                from_rows = self.nbor_rows,
                rows,
                "Growing device storage."
            );
            self.reallocate(capacity, rows)?;
        }

        let pitch = self.atom_capacity;
        self.host_x.clear();
        self.host_x.extend(
            atoms
                .positions()
                .iter()
                .zip(atoms.types())
                .map(|(p, &ty)| [N::of(p.x), N::of(p.y), N::of(p.z), N::of(ty as f64)]),
        );
        self.host_q.clear();
        self.host_q.extend(atoms.charges().iter().map(|&q| N::of(q)));

        self.host_numj.clear();
        self.host_nbor.clear();
        self.host_nbor.resize(rows_needed * pitch, 0);
        for i in 0..inum {
            let row = neighbors.neighbors(i);
            self.host_numj.push(row.len() as u32);
            for (k, &packed) in row.iter().enumerate() {
                self.host_nbor[k * pitch + i] = packed;
            }
        }

        let inputs = self.inputs.as_mut().ok_or(PairError::NotInitialized)?;
        exclusive(&mut inputs.x)?.upload(&self.host_x)?;
        exclusive(&mut inputs.q)?.upload(&self.host_q)?;
        exclusive(&mut inputs.nbor)?.upload(&self.host_nbor)?;
        exclusive(&mut inputs.numj)?.upload(&self.host_numj)?;

        self.staged = Some(Staged { inum, nlocal, nall });
        self.stats.record_transfer(start.elapsed());
        debug!(inum, rows_needed, "Staged step.");
        Ok(inum)
    }

    /// Launches `kernel` over the staged device share without waiting for it.
    pub fn launch<K: PairKernel<N>>(
        &mut self,
        kernel: K,
        eflag: bool,
        vflag: bool,
    ) -> Result<PendingStep<'_, N, A>, PairError> {
        let device = Arc::clone(self.device.as_ref().ok_or(PairError::NoDeviceContext)?);
        let staged = self.staged.ok_or(PairError::NotInitialized)?;
        let inputs = self.inputs.clone().ok_or(PairError::NotInitialized)?;
        let mut answers = self.answers.take().ok_or(PairError::Busy)?;
        let shape = LaunchShape::new(staged.inum, device.info());
        let launch = Launch {
            inputs,
            pitch: self.atom_capacity,
            inum: staged.inum,
            atoms_per_block: shape.atoms_per_block,
            eflag,
            vflag,
        };
        let kernel_name = kernel.name();
        debug!(kernel = kernel_name, grid = shape.grid, inum = staged.inum, "Launching kernel.");

        let (tx, rx) = mpsc::channel();
        device.pool().spawn(move || {
            let start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                launch.run(&kernel, &mut answers);
            }))
            .map_err(panic_message);
            // Buffers must be exclusively owned again once the step is collected.
            drop(kernel);
            drop(launch);
            let _ = tx.send(KernelDone {
                answers,
                elapsed: start.elapsed(),
                outcome,
            });
        });

        Ok(PendingStep {
            engine: self,
            rx: Some(rx),
            staged,
            shape,
            kernel: kernel_name,
            failure: None,
        })
    }

    /// Releases all storage. Returns the statistics of the run if any step ran.
    pub fn clear_atomic(&mut self) -> Option<RunStats> {
        self.inputs = None;
        self.answers = None;
        self.staged = None;
        self.atom_capacity = 0;
        self.nbor_rows = 0;
        self.host_x = Vec::new();
        self.host_q = Vec::new();
        self.host_nbor = Vec::new();
        self.host_numj = Vec::new();
        let stats = std::mem::take(&mut self.stats);
        (stats.steps > 0).then_some(stats)
    }

    pub fn host_memory_usage_atomic(&self) -> usize {
        self.host_x.capacity() * size_of::<[N; 4]>()
            + self.host_q.capacity() * size_of::<N>()
            + self.host_nbor.capacity() * size_of::<u32>()
            + self.host_numj.capacity() * size_of::<u32>()
    }

    pub fn atom_capacity(&self) -> usize {
        self.atom_capacity
    }

    pub fn neighbor_rows(&self) -> usize {
        self.nbor_rows
    }

    pub fn maxspecial(&self) -> usize {
        self.maxspecial
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn gpu_split(&self) -> f64 {
        self.gpu_split
    }

    pub fn staged(&self) -> Option<Staged> {
        self.staged
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "kernel panicked".to_string())
}

struct Launch<N: Real> {
    inputs: AtomBuffers<N>,
    pitch: usize,
    inum: usize,
    atoms_per_block: usize,
    eflag: bool,
    vflag: bool,
}

impl<N: Real> Launch<N> {
    fn run<A: Real, K: PairKernel<N>>(&self, kernel: &K, answers: &mut AnswerBuffers<A>) {
        let block = self.atoms_per_block;
        let force = &mut answers.force.as_mut_slice()[..self.inum];
        let engv = &mut answers.engv.as_mut_slice()[..self.inum * ENGV_STRIDE];
        force
            .par_chunks_mut(block)
            .zip(engv.par_chunks_mut(block * ENGV_STRIDE))
            .enumerate()
            .for_each(|(b, (forces, energies))| {
                let mut local = Vec::new();
                kernel.begin_block(&mut local);
                for (offset, (f, e)) in forces
                    .iter_mut()
                    .zip(energies.chunks_mut(ENGV_STRIDE))
                    .enumerate()
                {
                    self.atom(kernel, &local, b * block + offset, f, e);
                }
            });
    }

    fn atom<A: Real, K: PairKernel<N>>(
        &self,
        kernel: &K,
        local: &[N],
        i: usize,
        force_out: &mut [A; 4],
        engv_out: &mut [A],
    ) {
        let x = self.inputs.x.as_slice();
        let q = self.inputs.q.as_slice();
        let nbor = self.inputs.nbor.as_slice();
        let numj = self.inputs.numj.as_slice()[i] as usize;

        let xi = x[i];
        let itype = type_index(xi[3]);
        let qi = q[i];
        let mut f = [A::zero(); 3];
        let mut energy = A::zero();
        let mut virial = Virial::<A>::default();

        for k in 0..numj {
            let (j, degree) = decode(nbor[k * self.pitch + i]);
            let xj = x[j];
            let del = [xi[0] - xj[0], xi[1] - xj[1], xi[2] - xj[2]];
            let input = PairInput {
                itype,
                jtype: type_index(xj[3]),
                rsq: del[0] * del[0] + del[1] * del[1] + del[2] * del[2],
                qi,
                qj: q[j],
                degree,
            };
            let Some(pf) = kernel.pair(local, &input, self.eflag) else {
                continue;
            };
            let fpair: A = pf.fpair.cast();
            let del: [A; 3] = del.map(|d| d.cast());
            for (fc, d) in f.iter_mut().zip(del) {
                *fc += d * fpair;
            }
            if self.eflag {
                energy += pf.energy.cast::<A>();
            }
            if self.vflag {
                virial += Virial::of_pair(del, fpair);
            }
        }

        let half = A::of(0.5);
        *force_out = [f[0], f[1], f[2], A::zero()];
        engv_out[0] = energy * half;
        for (out, v) in engv_out[1..].iter_mut().zip(virial.v) {
            *out = v * half;
        }
    }
}

#[inline]
fn type_index<N: Real>(packed: N) -> usize {
    packed.as_f64().round() as usize
}

struct KernelDone<A: Real> {
    answers: AnswerBuffers<A>,
    elapsed: Duration,
    outcome: Result<(), String>,
}

/// Device answers of one step, in accumulation precision.
#[derive(Debug, Clone, PartialEq)]
pub struct StepAnswers<A> {
    pub host_start: usize,
    pub forces: Vec<[A; 3]>,
    pub energies: Vec<A>,
    pub virials: Vec<[A; 6]>,
    pub totals: EnergyTerm,
}

/// A launched step. Holds the engine exclusively until the kernel finishes;
/// dropping it waits for the kernel.
pub struct PendingStep<'a, N: Real, A: Real> {
    engine: &'a mut ChargeEngine<N, A>,
    rx: Option<Receiver<KernelDone<A>>>,
    staged: Staged,
    shape: LaunchShape,
    kernel: &'static str,
    failure: Option<String>,
}

impl<N: Real, A: Real> PendingStep<'_, N, A> {
    pub fn host_start(&self) -> usize {
        self.staged.host_start()
    }

    pub fn staged(&self) -> Staged {
        self.staged
    }

    pub fn shape(&self) -> LaunchShape {
        self.shape
    }

    fn collect(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        match rx.recv() {
            Ok(done) => {
                self.engine.answers = Some(done.answers);
                self.engine
                    .stats
                    .record_step(done.elapsed, self.staged.inum, self.staged.nlocal);
                if let Err(message) = done.outcome {
                    self.failure = Some(message);
                }
            }
            Err(_) => self.failure = Some("device worker exited before reporting".into()),
        }
    }

    /// Waits for the kernel and reads the answers back.
    pub fn wait(mut self) -> Result<StepAnswers<A>, PairError> {
        self.collect();
        if let Some(message) = self.failure.take() {
            return Err(PairError::Kernel {
                kernel: self.kernel,
                message,
            });
        }
        let start = Instant::now();
        let answers = self.engine.answers.as_ref().ok_or(PairError::NotInitialized)?;
        let inum = self.staged.inum;
        let forces = answers
            .force
            .download(inum)
            .iter()
            .map(|f| [f[0], f[1], f[2]])
            .collect();
        let engv = answers.engv.download(inum * ENGV_STRIDE);
        let mut energies = Vec::with_capacity(inum);
        let mut virials = Vec::with_capacity(inum);
        let mut totals = EnergyTerm::default();
        for atom in engv.chunks(ENGV_STRIDE) {
            let virial = [atom[1], atom[2], atom[3], atom[4], atom[5], atom[6]];
            totals += EnergyTerm::new(atom[0].as_f64(), virial.map(Real::as_f64));
            energies.push(atom[0]);
            virials.push(virial);
        }
        self.engine.stats.record_transfer(start.elapsed());
        Ok(StepAnswers {
            host_start: self.staged.host_start(),
            forces,
            energies,
            virials,
            totals,
        })
    }
}

impl<N: Real, A: Real> Drop for PendingStep<'_, N, A> {
    fn drop(&mut self) {
        self.collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::special::encode;
    use nalgebra::Point3;

    /// Unit force on every pair inside `cut`, energy equal to `rsq`.
    struct Spring {
        cut: f64,
    }

    impl PairKernel<f64> for Spring {
        fn name(&self) -> &'static str {
            "spring"
        }

        fn pair(&self, _local: &[f64], input: &PairInput<f64>, _eflag: bool) -> Option<PairForce<f64>> {
            (input.rsq < self.cut * self.cut).then_some(PairForce {
                fpair: 1.0,
                energy: input.rsq,
            })
        }
    }

    struct Exploding;

    impl PairKernel<f64> for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn pair(&self, _: &[f64], _: &PairInput<f64>, _: bool) -> Option<PairForce<f64>> {
            panic!("boom")
        }
    }

    fn device(memory: usize) -> Arc<Device> {
        Device::open(DeviceInfo {
            compute_units: 2,
            global_memory: memory,
            block_size: 4,
            threads_per_atom: 2,
            ..Default::default()
        })
        .unwrap()
    }

    fn args(nlocal: usize, nall: usize, max_nbors: usize, gpu_split: f64) -> AtomicArgs {
        AtomicArgs {
            nlocal,
            nall,
            max_nbors,
            maxspecial: 0,
            cell_size: 10.0,
            gpu_split,
        }
    }

    fn chain(n: usize) -> (AtomData, NeighborList) {
        let atoms = AtomData::new(
            n,
            (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect(),
            vec![1; n],
            vec![1.0; n],
        )
        .unwrap();
        let lists: Vec<Vec<u32>> = (0..n)
            .map(|i| {
                [i.checked_sub(1), (i + 1 < n).then_some(i + 1)]
                    .into_iter()
                    .flatten()
                    .map(|j| encode(j, 0).unwrap())
                    .collect()
            })
            .collect();
        (atoms, NeighborList::from_lists(&lists))
    }

    #[test]
    fn bytes_per_atom_counts_every_buffer() {
        assert_eq!(bytes_per_atom::<f32, f64>(0), 16 + 4 + 32 + 56 + 4);
        assert_eq!(bytes_per_atom::<f64, f64>(10), 32 + 8 + 32 + 56 + 44);
    }

    #[test]
    fn device_share_follows_host_fraction() {
        assert_eq!(device_share(10, 0.0), 10);
        assert_eq!(device_share(10, 1.0), 0);
        assert_eq!(device_share(10, 0.25), 7);
        assert_eq!(device_share(0, 0.5), 0);
        assert_eq!(device_share(100, 0.07), 93);
        assert_eq!(device_share(100, 0.29), 71);
        assert_eq!(device_share(3, 0.34), 1);
    }

    #[test]
    fn launch_shape_rounds_grid_up() {
        let info = DeviceInfo {
            block_size: 64,
            threads_per_atom: 4,
            ..Default::default()
        };
        assert_eq!(LaunchShape::new(33, &info).grid, 3);
        assert_eq!(LaunchShape::new(0, &info).grid, 0);
    }

    #[test]
    fn init_atomic_rejects_budget_overrun_without_allocating() {
        let device = device(1000);
        let mut engine = ChargeEngine::<f64, f64>::new(Some(Arc::clone(&device)));
        let result = engine.init_atomic(&args(100, 100, 32, 0.0), 0);
        assert_eq!(result.map_err(|e| e.code()), Err(-3));
        assert_eq!(device.used_bytes(), 0);
        assert!(!engine.is_allocated());
    }

    #[test]
    fn stage_and_launch_accumulate_half_energies() {
        let device = device(1 << 20);
        let mut engine = ChargeEngine::<f64, f64>::new(Some(device));
        engine.init_atomic(&args(3, 3, 2, 0.0), 0).unwrap();
        let (atoms, list) = chain(3);
        assert_eq!(engine.stage(&atoms, &list).unwrap(), 3);

        let answers = engine
            .launch(Spring { cut: 1.5 }, true, true)
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(answers.host_start, 3);
        // Middle atom is pulled equally both ways.
        assert_eq!(answers.forces[1], [0.0, 0.0, 0.0]);
        assert_eq!(answers.forces[0], [-1.0, 0.0, 0.0]);
        assert_eq!(answers.energies, vec![0.5, 1.0, 0.5]);
        assert_eq!(answers.totals.ecoul, 2.0);
        assert_eq!(answers.virials[0][0], 0.5);
        assert_eq!(engine.stats().steps, 1);
    }

    #[test]
    fn stage_grows_neighbor_rows_on_overflow() {
        let device = device(1 << 20);
        let mut engine = ChargeEngine::<f32, f32>::new(Some(device));
        engine.init_atomic(&args(3, 3, 1, 0.0), 0).unwrap();
        let (atoms, list) = chain(3);
        engine.stage(&atoms, &list).unwrap();
        assert_eq!(engine.neighbor_rows(), grown(2));
        assert_eq!(engine.stats().resizes, 1);
    }

    #[test]
    fn kernel_panic_is_reported_and_buffers_survive() {
        let device = device(1 << 20);
        let mut engine = ChargeEngine::<f64, f64>::new(Some(device));
        engine.init_atomic(&args(2, 2, 2, 0.0), 0).unwrap();
        let (atoms, list) = chain(2);
        engine.stage(&atoms, &list).unwrap();
        let err = engine.launch(Exploding, true, false).unwrap().wait().unwrap_err();
        assert_eq!(err.code(), -6);
        assert!(err.to_string().contains("boom"));
        assert!(engine.is_allocated());
        assert!(engine.stage(&atoms, &list).is_ok());
    }

    #[test]
    fn dropping_a_pending_step_waits_and_restores_answers() {
        let device = device(1 << 20);
        let mut engine = ChargeEngine::<f64, f64>::new(Some(device));
        engine.init_atomic(&args(3, 3, 2, 0.0), 0).unwrap();
        let (atoms, list) = chain(3);
        engine.stage(&atoms, &list).unwrap();
        drop(engine.launch(Spring { cut: 1.5 }, false, false).unwrap());
        assert!(engine.is_allocated());
        assert!(engine.launch(Spring { cut: 1.5 }, false, false).is_ok());
    }

    #[test]
    fn clear_atomic_releases_device_and_host_memory() {
        let device = device(1 << 20);
        let mut engine = ChargeEngine::<f32, f64>::new(Some(Arc::clone(&device)));
        let baseline = engine.host_memory_usage_atomic();
        engine.init_atomic(&args(8, 10, 4, 0.5), 0).unwrap();
        assert!(device.used_bytes() > 0);
        assert!(engine.host_memory_usage_atomic() > baseline);
        assert!(engine.clear_atomic().is_none());
        assert_eq!(device.used_bytes(), 0);
        assert_eq!(engine.host_memory_usage_atomic(), baseline);
    }

    #[test]
    fn double_storage_on_single_only_device_is_unsupported() {
        let device = Device::open(DeviceInfo {
            compute_units: 1,
            double_precision: false,
            ..Default::default()
        })
        .unwrap();
        let engine = ChargeEngine::<f32, f64>::new(Some(device));
        assert_eq!(engine.check_device().map(|_| ()).map_err(|e| e.code()), Err(-5));
        let single = ChargeEngine::<f32, f32>::new(engine.device().cloned());
        assert!(single.check_device().is_ok());
    }
}
