use super::ModelError;
use super::atoms::AtomData;
use crate::core::special::{self, decode};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Special-bond partners of each local atom as `(neighbor index, degree)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialBonds {
    partners: Vec<Vec<(usize, u32)>>,
}

impl SpecialBonds {
    pub fn new(nlocal: usize) -> Self {
        Self {
            partners: vec![Vec::new(); nlocal],
        }
    }

    /// Records a special pair of the given degree (1 = 1-2, 2 = 1-3, 3 = 1-4) for
    /// both atoms when they are local.
    pub fn add(&mut self, i: usize, j: usize, degree: u32) -> Result<(), ModelError> {
        special::encode(j, degree)?;
        special::encode(i, degree)?;
        if let Some(list) = self.partners.get_mut(i) {
            list.push((j, degree));
        }
        if let Some(list) = self.partners.get_mut(j) {
            list.push((i, degree));
        }
        Ok(())
    }

    pub fn degree(&self, i: usize, j: usize) -> u32 {
        self.partners
            .get(i)
            .and_then(|list| list.iter().find(|(k, _)| *k == j))
            .map_or(0, |&(_, degree)| degree)
    }
}

/// Full neighbor lists of the local atoms in compressed-row form.
///
/// Entries carry the special-bond degree in their top bits, see [`crate::core::special`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborList {
    offsets: Vec<usize>,
    entries: Vec<u32>,
}

impl NeighborList {
    pub fn from_lists(lists: &[Vec<u32>]) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut entries = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        offsets.push(0);
        for list in lists {
            entries.extend_from_slice(list);
            offsets.push(entries.len());
        }
        Self { offsets, entries }
    }

    /// Brute-force full list: every `j != i` within `cutoff` of local atom `i`.
    pub fn build_full(
        atoms: &AtomData,
        cutoff: f64,
        specials: &SpecialBonds,
    ) -> Result<Self, ModelError> {
        let cutsq = cutoff * cutoff;
        let positions = atoms.positions();

        let build_row = |i: usize| -> Result<Vec<u32>, ModelError> {
            let xi = positions[i];
            let mut row = Vec::new();
            for (j, xj) in positions.iter().enumerate() {
                if j == i || (xi - *xj).norm_squared() >= cutsq {
                    continue;
                }
                row.push(special::encode(j, specials.degree(i, j))?);
            }
            Ok(row)
        };

        #[cfg(not(feature = "parallel"))]
        let rows: Result<Vec<_>, _> = (0..atoms.nlocal()).map(build_row).collect();

        #[cfg(feature = "parallel")]
        let rows: Result<Vec<_>, _> = (0..atoms.nlocal()).into_par_iter().map(build_row).collect();

        Ok(Self::from_lists(&rows?))
    }

    pub fn inum(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn neighbors(&self, i: usize) -> &[u32] {
        &self.entries[self.offsets[i]..self.offsets[i + 1]]
    }

    pub fn max_neighbors(&self) -> usize {
        self.offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }

    pub fn total_pairs(&self) -> usize {
        self.entries.len()
    }

    /// Checks that the list covers exactly `nlocal` atoms and points inside `0..nall`.
    pub fn check(&self, nlocal: usize, nall: usize) -> Result<(), ModelError> {
        if self.inum() != nlocal {
            return Err(ModelError::ListLength {
                expected: nlocal,
                found: self.inum(),
            });
        }
        for atom in 0..self.inum() {
            for &packed in self.neighbors(atom) {
                let (neighbor, _) = decode(packed);
                if neighbor >= nall {
                    return Err(ModelError::BadNeighbor {
                        atom,
                        neighbor,
                        nall,
                    });
                }
            }
        }
        Ok(())
    }
}
