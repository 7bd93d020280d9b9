use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FilePairConfig};
use super::models::AppConfig;
use crate::cli::{MemoryArgs, RunArgs};
use crate::error::{CliError, Result};
use coulslater::core::precision::PrecisionMode;
use coulslater::engine::config::{PairConfig, PairConfigBuilder};
use coulslater::workflows::evaluate::EvaluateConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Default)]
struct Overrides<'a> {
    system: Option<&'a Path>,
    forces_out: Option<&'a Path>,
    steps: Option<usize>,
    precision: Option<PrecisionMode>,
    split: Option<f64>,
    diagnostics: bool,
}

pub fn build_run_config(args: &RunArgs) -> Result<AppConfig> {
    let file_config = FileConfig::from_file(&args.config)?;
    let file_config = apply_set_values(file_config, &args.set_values)?;

    let precision = args
        .precision
        .as_deref()
        .map(PrecisionMode::from_str)
        .transpose()
        .map_err(|e| CliError::Argument(e.to_string()))?;

    assemble(
        file_config,
        &args.config,
        Overrides {
            system: args.system.as_deref(),
            forces_out: args.forces_out.as_deref(),
            steps: args.steps,
            precision,
            split: args.split,
            diagnostics: args.diagnostics,
        },
    )
}

pub fn build_memory_config(args: &MemoryArgs) -> Result<AppConfig> {
    let file_config = FileConfig::from_file(&args.config)?;
    assemble(
        file_config,
        &args.config,
        Overrides {
            system: args.system.as_deref(),
            ..Default::default()
        },
    )
}

fn assemble(
    mut file_config: FileConfig,
    config_path: &Path,
    overrides: Overrides<'_>,
) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let system_path = match (overrides.system, file_config.system.take()) {
        (Some(cli), _) => cli.to_path_buf(),
        (None, Some(file)) => relative_to(base_dir, file),
        (None, None) => {
            return Err(CliError::Config(
                "A `system` file is required either in the config file or via --system."
                    .to_string(),
            ));
        }
    };

    let run_file = file_config.run.take().unwrap_or_default();
    let forces_out = overrides
        .forces_out
        .map(Path::to_path_buf)
        .or_else(|| run_file.forces_out.map(|p| relative_to(base_dir, p)));

    let pair_file = file_config.pair.take().unwrap_or_default();
    let neighbor_cutoff = pair_file.neighbor_cutoff;
    let pair = merge_pair(pair_file, overrides.split, &defaults)?;

    let core_config = EvaluateConfig {
        pair,
        device: file_config.device.take().unwrap_or_default(),
        precision: overrides
            .precision
            .or(run_file.precision)
            .unwrap_or(defaults.precision),
        steps: overrides
            .steps
            .or(run_file.steps)
            .unwrap_or(defaults.steps),
        neighbor_cutoff,
        eflag: run_file.eflag.unwrap_or(defaults.eflag),
        vflag: run_file.vflag.unwrap_or(defaults.vflag),
        diagnostics: overrides.diagnostics,
    };

    Ok(AppConfig {
        system_path,
        forces_out,
        core_config,
    })
}

fn relative_to(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn merge_pair(
    file_val: FilePairConfig,
    cli_split: Option<f64>,
    defaults: &DefaultsConfig,
) -> Result<PairConfig> {
    let mut builder = PairConfigBuilder::new()
        .qqrd2e(file_val.qqrd2e.unwrap_or(defaults.qqrd2e))
        .max_nbors(file_val.max_nbors.unwrap_or(defaults.max_nbors));

    if let Some(cut) = file_val.cut_coul {
        builder = builder.cut_coul(cut);
    }
    if let Some(g) = file_val.g_ewald {
        builder = builder.g_ewald(g);
    }
    if let Some(lamda) = file_val.lamda {
        builder = builder.lamda(lamda);
    }
    if let Some(n) = file_val.maxspecial {
        builder = builder.maxspecial(n);
    }
    if let Some(size) = file_val.cell_size {
        builder = builder.cell_size(size);
    }
    if let Some(split) = cli_split.or(file_val.gpu_split) {
        builder = builder.gpu_split(split);
    }
    if let Some(factors) = file_val.special_coul {
        builder = builder.special_coul(factors);
    }

    builder.build().map_err(|e| CliError::Config(e.to_string()))
}

fn parse_value<T: FromStr>(key: &str, value_str: &str, kind: &str) -> Result<T> {
    value_str.parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value_str))
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };

        match key {
            "system" => config.system = Some(PathBuf::from(value_str)),
            "run.steps" => {
                config.run.get_or_insert_with(Default::default).steps =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "run.precision" => {
                config.run.get_or_insert_with(Default::default).precision = Some(
                    PrecisionMode::from_str(value_str).map_err(|e| CliError::Config(e.to_string()))?,
                );
            }
            "run.eflag" => {
                config.run.get_or_insert_with(Default::default).eflag =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "run.vflag" => {
                config.run.get_or_insert_with(Default::default).vflag =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "pair.cut-coul" => {
                config.pair.get_or_insert_with(Default::default).cut_coul =
                    Some(parse_value(key, value_str, "float")?);
            }
            "pair.qqrd2e" => {
                config.pair.get_or_insert_with(Default::default).qqrd2e =
                    Some(parse_value(key, value_str, "float")?);
            }
            "pair.g-ewald" => {
                config.pair.get_or_insert_with(Default::default).g_ewald =
                    Some(parse_value(key, value_str, "float")?);
            }
            "pair.lamda" => {
                config.pair.get_or_insert_with(Default::default).lamda =
                    Some(parse_value(key, value_str, "float")?);
            }
            "pair.max-nbors" => {
                config.pair.get_or_insert_with(Default::default).max_nbors =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "pair.gpu-split" => {
                config.pair.get_or_insert_with(Default::default).gpu_split =
                    Some(parse_value(key, value_str, "float")?);
            }
            "pair.neighbor-cutoff" => {
                config.pair.get_or_insert_with(Default::default).neighbor_cutoff =
                    Some(parse_value(key, value_str, "float")?);
            }
            "device.compute-units" => {
                config.device.get_or_insert_with(Default::default).compute_units =
                    parse_value(key, value_str, "integer")?;
            }
            "device.global-memory" => {
                config.device.get_or_insert_with(Default::default).global_memory =
                    parse_value(key, value_str, "integer")?;
            }
            "device.double-precision" => {
                config.device.get_or_insert_with(Default::default).double_precision =
                    parse_value(key, value_str, "boolean")?;
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
