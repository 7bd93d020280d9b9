use super::ModelError;
use nalgebra::Point3;

/// Per-step particle data: `nlocal` owned atoms followed by ghosts, `nall` in total.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomData {
    positions: Vec<Point3<f64>>,
    types: Vec<usize>,
    charges: Vec<f64>,
    nlocal: usize,
}

impl AtomData {
    pub fn new(
        nlocal: usize,
        positions: Vec<Point3<f64>>,
        types: Vec<usize>,
        charges: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let nall = positions.len();
        for (name, found) in [("types", types.len()), ("charges", charges.len())] {
            if found != nall {
                return Err(ModelError::Length {
                    name,
                    expected: nall,
                    found,
                });
            }
        }
        if nlocal > nall {
            return Err(ModelError::LocalExceedsAll { nlocal, nall });
        }
        Ok(Self {
            positions,
            types,
            charges,
            nlocal,
        })
    }

    pub fn nlocal(&self) -> usize {
        self.nlocal
    }

    pub fn nall(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn types(&self) -> &[usize] {
        &self.types
    }

    pub fn charges(&self) -> &[f64] {
        &self.charges
    }

    /// Checks every type against `1..=ntypes`.
    pub fn check_types(&self, ntypes: usize) -> Result<(), ModelError> {
        match self
            .types
            .iter()
            .enumerate()
            .find(|&(_, &ty)| ty == 0 || ty > ntypes)
        {
            Some((atom, &ty)) => Err(ModelError::BadType { atom, ty, ntypes }),
            None => Ok(()),
        }
    }
}
