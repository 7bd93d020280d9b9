use super::base::AtomicArgs;
use crate::core::params::PhysicalConstants;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

/// Everything `init` needs besides the type data and the particle counts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PairConfig {
    pub max_nbors: usize,
    pub maxspecial: usize,
    pub cell_size: f64,
    /// Fraction of local particles left to the host.
    pub gpu_split: f64,
    pub special_coul: [f64; 4],
    pub constants: PhysicalConstants,
}

impl PairConfig {
    pub fn atomic_args(&self, nlocal: usize, nall: usize) -> AtomicArgs {
        AtomicArgs {
            nlocal,
            nall,
            max_nbors: self.max_nbors,
            maxspecial: self.maxspecial,
            cell_size: self.cell_size,
            gpu_split: self.gpu_split,
        }
    }
}

#[derive(Default)]
pub struct PairConfigBuilder {
    max_nbors: Option<usize>,
    maxspecial: Option<usize>,
    cell_size: Option<f64>,
    gpu_split: Option<f64>,
    special_coul: Option<[f64; 4]>,
    cut_coul: Option<f64>,
    qqrd2e: Option<f64>,
    g_ewald: Option<f64>,
    lamda: Option<f64>,
}

impl PairConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_nbors(mut self, rows: usize) -> Self {
        self.max_nbors = Some(rows);
        self
    }
    pub fn maxspecial(mut self, n: usize) -> Self {
        self.maxspecial = Some(n);
        self
    }
    pub fn cell_size(mut self, size: f64) -> Self {
        self.cell_size = Some(size);
        self
    }
    pub fn gpu_split(mut self, fraction: f64) -> Self {
        self.gpu_split = Some(fraction);
        self
    }
    pub fn special_coul(mut self, factors: [f64; 4]) -> Self {
        self.special_coul = Some(factors);
        self
    }
    /// Coulomb cutoff distance; the squared value is what gets stored.
    pub fn cut_coul(mut self, cutoff: f64) -> Self {
        self.cut_coul = Some(cutoff);
        self
    }
    pub fn qqrd2e(mut self, factor: f64) -> Self {
        self.qqrd2e = Some(factor);
        self
    }
    pub fn g_ewald(mut self, g: f64) -> Self {
        self.g_ewald = Some(g);
        self
    }
    pub fn lamda(mut self, lamda: f64) -> Self {
        self.lamda = Some(lamda);
        self
    }

    /// Optional fields fall back to: no special exclusions, `maxspecial = 0`,
    /// cell size equal to the cutoff, everything on the device.
    pub fn build(self) -> Result<PairConfig, ConfigError> {
        let cut_coul = self
            .cut_coul
            .ok_or(ConfigError::MissingParameter("cut_coul"))?;
        let constants = PhysicalConstants {
            cut_coulsq: cut_coul * cut_coul,
            qqrd2e: self.qqrd2e.ok_or(ConfigError::MissingParameter("qqrd2e"))?,
            g_ewald: self
                .g_ewald
                .ok_or(ConfigError::MissingParameter("g_ewald"))?,
            lamda: self.lamda.ok_or(ConfigError::MissingParameter("lamda"))?,
        };
        Ok(PairConfig {
            max_nbors: self
                .max_nbors
                .ok_or(ConfigError::MissingParameter("max_nbors"))?,
            maxspecial: self.maxspecial.unwrap_or(0),
            cell_size: self.cell_size.unwrap_or(cut_coul),
            gpu_split: self.gpu_split.unwrap_or(0.0),
            special_coul: self.special_coul.unwrap_or([1.0; 4]),
            constants,
        })
    }
}
