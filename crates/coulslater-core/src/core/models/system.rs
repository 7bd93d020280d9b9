use super::ModelError;
use super::atoms::AtomData;
use super::neighbors::{NeighborList, SpecialBonds};
use crate::core::params::{PairCoeff, ParamError, ScaleMatrix};
use nalgebra::Point3;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SystemLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid coefficients: {0}")]
    Params(#[from] ParamError),
    #[error("Invalid particle data: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AtomRecord {
    pub position: [f64; 3],
    #[serde(rename = "type")]
    pub ty: usize,
    pub charge: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecialRecord {
    pub atoms: [usize; 2],
    pub degree: u32,
}

/// Coefficient changes applied before the given step is computed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AdaptRecord {
    pub step: usize,
    pub pair_coeff: Vec<PairCoeff>,
}

/// On-disk description of a standalone particle system.
///
/// The first `nlocal` atoms are owned, the rest are ghosts. Omitting `nlocal`
/// makes every atom local.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SystemFile {
    pub ntypes: usize,
    #[serde(default)]
    pub nlocal: Option<usize>,
    pub pair_coeff: Vec<PairCoeff>,
    #[serde(default)]
    pub atoms: Vec<AtomRecord>,
    #[serde(default)]
    pub special: Vec<SpecialRecord>,
    #[serde(default)]
    pub adapt: Vec<AdaptRecord>,
}

/// A particle system ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    pub atoms: AtomData,
    pub specials: SpecialBonds,
    pub scale: ScaleMatrix,
    pub adapt: Vec<AdaptRecord>,
}

impl System {
    pub fn load(path: &Path) -> Result<Self, SystemLoadError> {
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| SystemLoadError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        let file: SystemFile = toml::from_str(&content).map_err(|e| SystemLoadError::Toml {
            path: path_str,
            source: e,
        })?;
        Self::from_file(file)
    }

    pub fn from_file(file: SystemFile) -> Result<Self, SystemLoadError> {
        let scale = ScaleMatrix::from_coeffs(file.ntypes, &file.pair_coeff)?;
        let nall = file.atoms.len();
        let nlocal = file.nlocal.unwrap_or(nall);
        let atoms = AtomData::new(
            nlocal,
            file.atoms
                .iter()
                .map(|a| Point3::from(a.position))
                .collect(),
            file.atoms.iter().map(|a| a.ty).collect(),
            file.atoms.iter().map(|a| a.charge).collect(),
        )?;
        atoms.check_types(file.ntypes)?;

        let mut specials = SpecialBonds::new(nlocal);
        for record in &file.special {
            let [i, j] = record.atoms;
            if i >= nall || j >= nall {
                return Err(ModelError::BadNeighbor {
                    atom: i,
                    neighbor: j,
                    nall,
                }
                .into());
            }
            specials.add(i, j, record.degree)?;
        }

        let mut adapt = file.adapt;
        adapt.sort_by_key(|a| a.step);
        Ok(Self {
            atoms,
            specials,
            scale,
            adapt,
        })
    }

    pub fn ntypes(&self) -> usize {
        self.scale.ntypes()
    }

    pub fn neighbor_list(&self, cutoff: f64) -> Result<NeighborList, ModelError> {
        NeighborList::build_full(&self.atoms, cutoff, &self.specials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const WATER_PAIR: &str = r#"
        ntypes = 2

        [[pair-coeff]]
        types = ["*", "*"]

        [[pair-coeff]]
        types = ["1", "2"]
        scale = 0.8

        [[atoms]]
        position = [0.0, 0.0, 0.0]
        type = 1
        charge = -0.8

        [[atoms]]
        position = [0.96, 0.0, 0.0]
        type = 2
        charge = 0.4

        [[atoms]]
        position = [-0.24, 0.93, 0.0]
        type = 2
        charge = 0.4

        [[special]]
        atoms = [0, 1]
        degree = 1

        [[adapt]]
        step = 3
        pair-coeff = [{ types = ["2", "2"], scale = 0.5 }]
    "#;

    #[test]
    fn load_parses_atoms_specials_and_adapt_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("system.toml");
        fs::write(&path, WATER_PAIR).unwrap();
        let system = System::load(&path).unwrap();
        assert_eq!(system.atoms.nall(), 3);
        assert_eq!(system.atoms.nlocal(), 3);
        assert_eq!(system.scale.get(2, 1), 0.8);
        assert_eq!(system.specials.degree(1, 0), 1);
        assert_eq!(system.adapt[0].step, 3);

        let list = system.neighbor_list(5.0).unwrap();
        assert_eq!(list.inum(), 3);
        assert_eq!(list.total_pairs(), 6);
    }

    #[test]
    fn from_file_rejects_types_beyond_ntypes() {
        let mut file: SystemFile = toml::from_str(WATER_PAIR).unwrap();
        file.atoms[2].ty = 3;
        assert!(matches!(
            System::from_file(file),
            Err(SystemLoadError::Model(ModelError::BadType { atom: 2, .. }))
        ));
    }

    #[test]
    fn ghosts_follow_local_atoms() {
        let mut file: SystemFile = toml::from_str(WATER_PAIR).unwrap();
        file.nlocal = Some(2);
        let system = System::from_file(file).unwrap();
        assert_eq!(system.atoms.nlocal(), 2);
        assert_eq!(system.neighbor_list(5.0).unwrap().inum(), 2);
    }

    #[test]
    fn load_reports_unknown_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "ntypes = 1\npair-coeff = []\ncolor = 'red'\n").unwrap();
        assert!(matches!(
            System::load(&path),
            Err(SystemLoadError::Toml { .. })
        ));
    }
}
