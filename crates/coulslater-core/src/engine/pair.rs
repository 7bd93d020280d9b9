//! The accelerated `coul/slater/long` pair style.
//!
//! [`CoulSlaterLong`] owns the type tables and physical constants and configures
//! the shared [`ChargeEngine`] with the Slater-long kernel each step.
//!
//! ```text
//!   new ──> init ──> (compute | stage + dispatch) ──> wait ──> ... ──> clear
//!              │                                                  ^
//!              └──────────────── reinit (scale table only) ───────┘
//! ```

use super::base::{AtomicArgs, ChargeEngine, PendingStep, bytes_per_atom};
use super::config::PairConfig;
use super::device::Device;
use super::error::PairError;
use super::kernel::SlaterLongKernel;
use super::state::{ExecutionState, RunStats};
use super::tables::{self, TypeTables};
use crate::core::models::atoms::AtomData;
use crate::core::models::neighbors::NeighborList;
use crate::core::params::{ParamError, PhysicalConstants, ScaleMatrix};
use crate::core::precision::{PrecisionMode, Real};
use crate::core::special::SpecialCoulomb;
use std::io::Write;
use std::mem::size_of;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Arguments of [`CoulSlaterLong::init`], in the host engine's order.
pub struct InitArgs<'a> {
    pub ntypes: usize,
    pub scale: &'a ScaleMatrix,
    pub nlocal: usize,
    pub nall: usize,
    pub max_nbors: usize,
    pub maxspecial: usize,
    pub cell_size: f64,
    pub gpu_split: f64,
    /// Diagnostic stream for the device banner and the timing summary.
    pub screen: Option<Box<dyn Write + Send>>,
    pub cut_coulsq: f64,
    pub special_coul: [f64; 4],
    pub qqrd2e: f64,
    pub g_ewald: f64,
    pub lamda: f64,
}

impl<'a> InitArgs<'a> {
    pub fn from_config(
        config: &PairConfig,
        scale: &'a ScaleMatrix,
        nlocal: usize,
        nall: usize,
    ) -> Self {
        Self {
            ntypes: scale.ntypes(),
            scale,
            nlocal,
            nall,
            max_nbors: config.max_nbors,
            maxspecial: config.maxspecial,
            cell_size: config.cell_size,
            gpu_split: config.gpu_split,
            screen: None,
            cut_coulsq: config.constants.cut_coulsq,
            special_coul: config.special_coul,
            qqrd2e: config.constants.qqrd2e,
            g_ewald: config.constants.g_ewald,
            lamda: config.constants.lamda,
        }
    }

    pub fn with_screen(mut self, screen: Box<dyn Write + Send>) -> Self {
        self.screen = Some(screen);
        self
    }

    fn constants(&self) -> PhysicalConstants {
        PhysicalConstants {
            cut_coulsq: self.cut_coulsq,
            qqrd2e: self.qqrd2e,
            g_ewald: self.g_ewald,
            lamda: self.lamda,
        }
    }

    fn atomic(&self) -> AtomicArgs {
        AtomicArgs {
            nlocal: self.nlocal,
            nall: self.nall,
            max_nbors: self.max_nbors,
            maxspecial: self.maxspecial,
            cell_size: self.cell_size,
            gpu_split: self.gpu_split,
        }
    }
}

pub struct CoulSlaterLong<N: Real, A: Real> {
    engine: ChargeEngine<N, A>,
    tables: Option<TypeTables<N>>,
    consts: Option<PhysicalConstants<N>>,
    special: SpecialCoulomb,
    shared_types: bool,
    screen: Option<Box<dyn Write + Send>>,
}

impl<N: Real, A: Real> CoulSlaterLong<N, A> {
    pub fn new(device: Option<Arc<Device>>) -> Self {
        Self {
            engine: ChargeEngine::new(device),
            tables: None,
            consts: None,
            special: SpecialCoulomb::none(),
            shared_types: false,
            screen: None,
        }
    }

    pub fn with_device(device: Arc<Device>) -> Self {
        Self::new(Some(device))
    }

    pub fn attach_device(&mut self, device: Arc<Device>) {
        self.clear();
        self.engine.attach(device);
    }

    pub fn device(&self) -> Option<&Arc<Device>> {
        self.engine.device()
    }

    /// Validates the device and arguments, then allocates storage and uploads
    /// the type tables. Nothing stays allocated when this fails.
    #[instrument(skip_all, name = "coul_slater_long_init", fields(ntypes = args.ntypes, nlocal = args.nlocal, nall = args.nall))]
    pub fn init(&mut self, mut args: InitArgs<'_>) -> Result<(), PairError> {
        self.clear();
        let screen = args.screen.take();
        match self.try_init(&args) {
            Ok(()) => {
                self.screen = screen;
                let banner = self
                    .engine
                    .device()
                    .map(|d| d.banner(PrecisionMode::of::<N, A>()));
                if let (Some(out), Some(banner)) = (self.screen.as_mut(), banner) {
                    let _ = writeln!(out, "{banner}");
                }
                info!(
                    shared_types = self.shared_types,
                    capacity = self.engine.atom_capacity(),
                    precision = PrecisionMode::of::<N, A>().label(),
                    "Initialized coul/slater/long."
                );
                Ok(())
            }
            Err(e) => {
                warn!(code = e.code(), "Initialization failed: {e}");
                self.release();
                Err(e)
            }
        }
    }

    fn try_init(&mut self, args: &InitArgs<'_>) -> Result<(), PairError> {
        let device = Arc::clone(self.engine.check_device()?);

        if args.ntypes == 0 {
            return Err(ParamError::NoTypes.into());
        }
        if args.scale.ntypes() != args.ntypes {
            return Err(ParamError::RowCount {
                expected: args.ntypes + 1,
                found: args.scale.dim(),
            }
            .into());
        }
        args.scale.validate()?;
        let consts = args.constants();
        consts.validate()?;
        let special = SpecialCoulomb::new(args.special_coul)?;

        let (dim, shared_types) = tables::table_dim(args.ntypes, device.info());
        self.engine
            .init_atomic(&args.atomic(), tables::device_bytes::<N>(dim))?;
        let tables = TypeTables::upload(&device, args.scale, &special, dim)?;

        self.tables = Some(tables);
        self.consts = Some(consts.cast());
        self.special = special;
        self.shared_types = shared_types;
        Ok(())
    }

    /// Replaces the scale coefficients of an initialized instance in place.
    #[instrument(skip_all, name = "coul_slater_long_reinit", fields(ntypes = ntypes))]
    pub fn reinit(&mut self, ntypes: usize, scale: &ScaleMatrix) -> Result<(), PairError> {
        let tables = self.tables.as_mut().ok_or(PairError::NotInitialized)?;
        if ntypes != tables.ntypes() {
            return Err(PairError::TypeCountChanged {
                expected: tables.ntypes(),
                found: ntypes,
            });
        }
        if scale.ntypes() != ntypes {
            return Err(ParamError::RowCount {
                expected: ntypes + 1,
                found: scale.dim(),
            }
            .into());
        }
        scale.validate()?;
        tables.repack(scale)?;
        info!("Re-uploaded scale table.");
        Ok(())
    }

    /// Releases everything and writes the timing summary if any step ran.
    pub fn clear(&mut self) {
        let was_allocated = self.is_allocated();
        let device = self.engine.device().cloned();
        let stats = self.release();
        if !was_allocated {
            return;
        }
        if let (Some(stats), Some(device)) = (stats, device) {
            self.report(&stats, &device);
        }
        info!("Released coul/slater/long device storage.");
        self.screen = None;
    }

    fn release(&mut self) -> Option<RunStats> {
        self.tables = None;
        self.consts = None;
        self.shared_types = false;
        self.engine.clear_atomic()
    }

    fn report(&mut self, stats: &RunStats, device: &Device) {
        info!(
            steps = stats.steps,
            kernel_s = stats.kernel.as_secs_f64(),
            transfer_s = stats.transfer.as_secs_f64(),
            device_fraction = stats.average_device_fraction(),
            peak_bytes = device.peak_bytes(),
            "Run statistics."
        );
        if let Some(out) = self.screen.as_mut() {
            let _ = write!(out, "{}", stats.summary(&device.info().name, device.peak_bytes()));
            let _ = out.flush();
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.tables.is_some()
    }

    /// Device bytes per atom of capacity for `max_nbors` neighbor rows.
    pub fn bytes_per_atom(&self, max_nbors: usize) -> usize {
        bytes_per_atom::<N, A>(max_nbors)
    }

    /// Host bytes held by this instance, staging buffers included.
    pub fn host_memory_usage(&self) -> f64 {
        let tables = self.tables.as_ref().map_or(0, TypeTables::host_bytes);
        (size_of::<Self>() + self.engine.host_memory_usage_atomic() + tables) as f64
    }

    /// Launches the force computation over the device share of the staged step.
    pub fn dispatch(&mut self, eflag: bool, vflag: bool) -> Result<PendingStep<'_, N, A>, PairError> {
        let tables = self.tables.as_ref().ok_or(PairError::NotInitialized)?;
        let consts = self.consts.ok_or(PairError::NotInitialized)?;
        let kernel = SlaterLongKernel::new(
            Arc::clone(tables.scale()),
            Arc::clone(tables.sp_cl()),
            tables.dim(),
            consts,
            self.shared_types,
        );
        self.engine.launch(kernel, eflag, vflag)
    }

    /// Stages the step and dispatches it.
    pub fn compute(
        &mut self,
        atoms: &AtomData,
        neighbors: &NeighborList,
        eflag: bool,
        vflag: bool,
    ) -> Result<PendingStep<'_, N, A>, PairError> {
        let ntypes = self
            .tables
            .as_ref()
            .ok_or(PairError::NotInitialized)?
            .ntypes();
        atoms.check_types(ntypes)?;
        if let Err(e) = self.engine.stage(atoms, neighbors) {
            if matches!(e, PairError::OutOfMemory { .. }) {
                warn!("Device storage could not grow; releasing the pair style.");
                self.release();
            }
            return Err(e);
        }
        self.dispatch(eflag, vflag)
    }

    pub fn state(&self) -> ExecutionState {
        ExecutionState {
            allocated: self.is_allocated(),
            shared_types: self.shared_types,
            atom_capacity: self.engine.atom_capacity(),
            neighbor_rows: self.engine.neighbor_rows(),
            table_dim: self.tables.as_ref().map_or(0, TypeTables::dim),
        }
    }

    pub fn shared_types(&self) -> bool {
        self.shared_types
    }

    pub fn ntypes(&self) -> Option<usize> {
        self.tables.as_ref().map(TypeTables::ntypes)
    }

    pub fn constants(&self) -> Option<&PhysicalConstants<N>> {
        self.consts.as_ref()
    }

    pub fn special(&self) -> &SpecialCoulomb {
        &self.special
    }

    pub fn stats(&self) -> &RunStats {
        self.engine.stats()
    }

    pub fn engine(&self) -> &ChargeEngine<N, A> {
        &self.engine
    }
}

impl<N: Real, A: Real> Drop for CoulSlaterLong<N, A> {
    fn drop(&mut self) {
        self.clear();
    }
}
