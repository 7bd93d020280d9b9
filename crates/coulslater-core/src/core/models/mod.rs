//! Host-side data as the simulation engine hands it to the pair style each step.
//!
//! - [`atoms`] - positions, types and charges of local and ghost particles
//! - [`neighbors`] - full neighbor lists with special-bond bits, plus a
//!   brute-force builder for standalone use
//! - [`system`] - standalone systems described in TOML

pub mod atoms;
pub mod neighbors;
pub mod system;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Per-atom array '{name}' has {found} entries, expected {expected}")]
    Length {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("nlocal ({nlocal}) exceeds nall ({nall})")]
    LocalExceedsAll { nlocal: usize, nall: usize },
    #[error("Atom {atom} has type {ty}, which is outside 1..={ntypes}")]
    BadType { atom: usize, ty: usize, ntypes: usize },
    #[error("Neighbor {neighbor} of atom {atom} is outside 0..{nall}")]
    BadNeighbor {
        atom: usize,
        neighbor: usize,
        nall: usize,
    },
    #[error("Neighbor list covers {found} atoms, but {expected} local atoms were staged")]
    ListLength { expected: usize, found: usize },
    #[error("Special bond error: {0}")]
    Special(#[from] crate::core::special::SpecialError),
}
