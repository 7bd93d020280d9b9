use super::WorkflowError;
use crate::core::models::system::System;
use crate::core::precision::{PrecisionMode, Real};
use crate::core::reference::{self, HostAnswers, HostParams};
use crate::core::special::SpecialCoulomb;
use crate::core::term::EnergyTerm;
use crate::engine::base::StepAnswers;
use crate::engine::config::PairConfig;
use crate::engine::device::{Device, DeviceInfo};
use crate::engine::pair::{CoulSlaterLong, InitArgs};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::ExecutionState;
use nalgebra::Vector3;
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateConfig {
    pub pair: PairConfig,
    pub device: DeviceInfo,
    pub precision: PrecisionMode,
    pub steps: usize,
    /// Neighbor-list cutoff; the Coulomb cutoff when unset.
    pub neighbor_cutoff: Option<f64>,
    pub eflag: bool,
    pub vflag: bool,
    /// Write the device banner and timing summary to stderr.
    pub diagnostics: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub device_atoms: usize,
    pub host_atoms: usize,
    pub device: EnergyTerm,
    pub host: EnergyTerm,
    pub total: EnergyTerm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub steps: Vec<StepReport>,
    /// Forces on local atoms after the last step.
    pub forces: Vec<Vector3<f64>>,
    /// Per-atom energies after the last step.
    pub energies: Vec<f64>,
    pub state: ExecutionState,
    pub bytes_per_atom: usize,
    pub peak_device_bytes: usize,
}

impl EvaluationResult {
    pub fn final_totals(&self) -> Option<EnergyTerm> {
        self.steps.last().map(|s| s.total)
    }
}

#[instrument(skip_all, name = "evaluate_workflow", fields(precision = ?config.precision, steps = config.steps))]
pub fn run(
    system: &System,
    config: &EvaluateConfig,
    reporter: &ProgressReporter,
) -> Result<EvaluationResult, WorkflowError> {
    match config.precision {
        PrecisionMode::Single => run_with::<f32, f32>(system, config, reporter),
        PrecisionMode::Mixed => run_with::<f32, f64>(system, config, reporter),
        PrecisionMode::Double => run_with::<f64, f64>(system, config, reporter),
    }
}

fn run_with<N: Real, A: Real>(
    system: &System,
    config: &EvaluateConfig,
    reporter: &ProgressReporter,
) -> Result<EvaluationResult, WorkflowError> {
    // === Phase 1: Device, neighbor list and pair-style setup ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let device = Device::open(config.device.clone())?;
    let cutoff = config
        .neighbor_cutoff
        .unwrap_or_else(|| config.pair.constants.cut_coulsq.sqrt());
    let neighbors = system.neighbor_list(cutoff)?;
    let atoms = &system.atoms;
    let nlocal = atoms.nlocal();
    info!(
        nlocal,
        nall = atoms.nall(),
        pairs = neighbors.total_pairs(),
        max_neighbors = neighbors.max_neighbors(),
        "Built neighbor list."
    );

    let mut pair = CoulSlaterLong::<N, A>::with_device(Arc::clone(&device));
    let mut args = InitArgs::from_config(&config.pair, &system.scale, nlocal, atoms.nall());
    if config.diagnostics {
        args = args.with_screen(Box::new(std::io::stderr()));
    }
    pair.init(args)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Timesteps ===
    reporter.report(Progress::PhaseStart { name: "Evaluation" });
    reporter.report(Progress::StepsStart {
        total_steps: config.steps as u64,
    });
    let special = SpecialCoulomb::new(config.pair.special_coul)?;
    let consts = config.pair.constants;
    let mut scale = system.scale.clone();
    let mut adapt = system.adapt.iter().peekable();
    let mut reports = Vec::with_capacity(config.steps);
    let mut last: Option<(StepAnswers<A>, HostAnswers)> = None;

    for step in 0..config.steps {
        while let Some(entry) = adapt.next_if(|a| a.step <= step) {
            let touched = scale.apply(&entry.pair_coeff)?;
            pair.reinit(scale.ntypes(), &scale)?;
            info!(step, pairs = touched.len(), "Adapted scale coefficients.");
            reporter.report(Progress::Message(format!(
                "Step {step}: adapted {} type pair(s)",
                touched.len()
            )));
        }

        let pending = pair.compute(atoms, &neighbors, config.eflag, config.vflag)?;
        let host_start = pending.host_start();
        let host = reference::evaluate_range(
            atoms,
            &neighbors,
            host_start..nlocal,
            HostParams {
                scale: &scale,
                special: &special,
                consts: &consts,
            },
            config.eflag,
            config.vflag,
        );
        let answers = pending.wait()?;

        let report = StepReport {
            step,
            device_atoms: host_start,
            host_atoms: nlocal - host_start,
            device: answers.totals,
            host: host.totals,
            total: answers.totals + host.totals,
        };
        debug!(step, ecoul = report.total.ecoul, "Step complete.");
        reporter.report(Progress::StepFinish {
            step,
            total: report.total,
        });
        reports.push(report);
        last = Some((answers, host));
    }
    reporter.report(Progress::StepsFinish);
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Merge answers and release the device ===
    let (forces, energies) = match &last {
        Some((device_answers, host)) => merge(device_answers, host, nlocal),
        None => (vec![Vector3::zeros(); nlocal], vec![0.0; nlocal]),
    };
    let state = pair.state();
    let bytes_per_atom = pair.bytes_per_atom(config.pair.max_nbors);
    pair.clear();

    info!(
        steps = reports.len(),
        peak_bytes = device.peak_bytes(),
        "Evaluation complete."
    );
    Ok(EvaluationResult {
        steps: reports,
        forces,
        energies,
        state,
        bytes_per_atom,
        peak_device_bytes: device.peak_bytes(),
    })
}

fn merge<A: Real>(
    device: &StepAnswers<A>,
    host: &HostAnswers,
    nlocal: usize,
) -> (Vec<Vector3<f64>>, Vec<f64>) {
    let mut forces = Vec::with_capacity(nlocal);
    let mut energies = Vec::with_capacity(nlocal);
    for (f, e) in device.forces.iter().zip(&device.energies) {
        forces.push(Vector3::new(f[0].as_f64(), f[1].as_f64(), f[2].as_f64()));
        energies.push(e.as_f64());
    }
    forces.extend_from_slice(&host.forces);
    energies.extend_from_slice(&host.energies);
    (forces, energies)
}
