use crate::error::{CliError, Result};
use coulslater::core::precision::PrecisionMode;
use coulslater::engine::device::DeviceInfo;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRunConfig {
    pub steps: Option<usize>,
    pub precision: Option<PrecisionMode>,
    pub eflag: Option<bool>,
    pub vflag: Option<bool>,
    pub forces_out: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilePairConfig {
    pub cut_coul: Option<f64>,
    pub qqrd2e: Option<f64>,
    pub g_ewald: Option<f64>,
    pub lamda: Option<f64>,
    pub max_nbors: Option<usize>,
    pub maxspecial: Option<usize>,
    pub cell_size: Option<f64>,
    pub gpu_split: Option<f64>,
    pub special_coul: Option<[f64; 4]>,
    pub neighbor_cutoff: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub system: Option<PathBuf>,
    pub run: Option<FileRunConfig>,
    pub pair: Option<FilePairConfig>,
    pub device: Option<DeviceInfo>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
