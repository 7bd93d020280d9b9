use crate::cli::MemoryArgs;
use crate::config::build_memory_config;
use crate::error::Result;
use coulslater::core::models::system::System;
use coulslater::core::precision::{PrecisionMode, Real};
use coulslater::engine::base::{bytes_per_atom, grown};
use coulslater::engine::device::DeviceInfo;
use coulslater::engine::tables::{device_bytes, table_dim};
use tracing::info;

const MODES: [PrecisionMode; 3] = [
    PrecisionMode::Single,
    PrecisionMode::Mixed,
    PrecisionMode::Double,
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct MemoryRow {
    max_nbors: usize,
    precision: PrecisionMode,
    bytes_per_atom: usize,
    projected_bytes: usize,
    fits: bool,
}

pub fn run(args: MemoryArgs) -> Result<()> {
    let app = build_memory_config(&args)?;
    let system = System::load(&app.system_path)?;

    let rows = if args.max_neighbors.is_empty() {
        vec![app.core_config.pair.max_nbors]
    } else {
        args.max_neighbors.clone()
    };
    info!(nall = system.atoms.nall(), ntypes = system.ntypes(), "Tabulating device memory.");

    let table = memory_table(
        &rows,
        system.atoms.nall(),
        system.ntypes(),
        &app.core_config.device,
    );

    println!(
        "{:>10}  {:<18}  {:>10}  {:>14}  {}",
        "max-nbors", "precision", "bytes/atom", "projected (MB)", "fits"
    );
    for row in &table {
        println!(
            "{:>10}  {:<18}  {:>10}  {:>14.3}  {}",
            row.max_nbors,
            row.precision.label(),
            row.bytes_per_atom,
            row.projected_bytes as f64 / (1024.0 * 1024.0),
            if row.fits { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn memory_table(rows: &[usize], nall: usize, ntypes: usize, device: &DeviceInfo) -> Vec<MemoryRow> {
    let (dim, _) = table_dim(ntypes, device);
    rows.iter()
        .flat_map(|&max_nbors| {
            MODES.into_iter().map(move |precision| {
                let (per_atom, tables) = match precision {
                    PrecisionMode::Single => footprint::<f32, f32>(max_nbors, dim),
                    PrecisionMode::Mixed => footprint::<f32, f64>(max_nbors, dim),
                    PrecisionMode::Double => footprint::<f64, f64>(max_nbors, dim),
                };
                let projected_bytes = per_atom * grown(nall) + tables;
                let fits = projected_bytes <= device.global_memory
                    && (!precision.requires_double() || device.double_precision);
                MemoryRow {
                    max_nbors,
                    precision,
                    bytes_per_atom: per_atom,
                    projected_bytes,
                    fits,
                }
            })
        })
        .collect()
}

fn footprint<N: Real, A: Real>(max_nbors: usize, dim: usize) -> (usize, usize) {
    (bytes_per_atom::<N, A>(max_nbors), device_bytes::<N>(dim))
}
