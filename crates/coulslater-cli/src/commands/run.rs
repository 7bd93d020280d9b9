use crate::cli::RunArgs;
use crate::config::build_run_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use coulslater::core::models::system::System;
use coulslater::engine::progress::ProgressReporter;
use coulslater::workflows::evaluate::{self, EvaluationResult};
use nalgebra::Vector3;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize)]
struct ForceRow {
    atom: usize,
    fx: f64,
    fy: f64,
    fz: f64,
    energy: f64,
}

pub fn run(args: RunArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_run_config(&args)?;

    info!("Loading particle system from {:?}", &app.system_path);
    let system = System::load(&app.system_path)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Evaluating {} particles ({} local) over {} step(s) in {}...",
        system.atoms.nall(),
        system.atoms.nlocal(),
        app.core_config.steps,
        app.core_config.precision.label()
    );
    info!("Invoking the evaluation workflow...");
    let result = evaluate::run(&system, &app.core_config, &reporter)?;

    print_summary(&result);

    if let Some(path) = &app.forces_out {
        write_forces_to_path(path, &result.forces, &result.energies)?;
        println!("✓ Forces written to: {}", path.display());
    }

    Ok(())
}

fn print_summary(result: &EvaluationResult) {
    let Some(last) = result.steps.last() else {
        println!("No timesteps were requested.");
        return;
    };
    println!(
        "Step {}: {} atoms on the device, {} on the host",
        last.step, last.device_atoms, last.host_atoms
    );
    println!("  E_coul = {:.6}", last.total.ecoul);
    let v = last.total.virial;
    println!(
        "  Virial = [{:.6}, {:.6}, {:.6}, {:.6}, {:.6}, {:.6}]",
        v[0], v[1], v[2], v[3], v[4], v[5]
    );
    println!(
        "  {} bytes/atom, peak device memory {:.2} MB",
        result.bytes_per_atom,
        result.peak_device_bytes as f64 / (1024.0 * 1024.0)
    );
}

fn write_forces_to_path(path: &Path, forces: &[Vector3<f64>], energies: &[f64]) -> Result<()> {
    info!("Writing {} force rows to {:?}", forces.len(), path);
    write_forces(File::create(path)?, forces, energies)
}

fn write_forces<W: Write>(writer: W, forces: &[Vector3<f64>], energies: &[f64]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (atom, (f, &energy)) in forces.iter().zip(energies).enumerate() {
        csv_writer.serialize(ForceRow {
            atom,
            fx: f.x,
            fy: f.y,
            fz: f.z,
            energy,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
