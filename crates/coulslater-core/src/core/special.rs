//! Special-bond Coulomb factors and the neighbor-index encoding that carries them.
//!
//! A neighbor index handed to the device stores the special-bond degree of the
//! pair (0 = ordinary, 1 = 1-2, 2 = 1-3, 3 = 1-4) in its two most significant bits.

use super::precision::Real;
use thiserror::Error;

pub const SBBITS: u32 = 30;
pub const NEIGHMASK: u32 = 0x3FFF_FFFF;
pub const SPECIAL_DEGREES: usize = 4;

#[derive(Debug, Error, PartialEq)]
pub enum SpecialError {
    #[error("Special factor {index} = {value} is not within [0, 1]")]
    OutOfRange { index: usize, value: f64 },
    #[error("Special degree {0} is invalid (expected 0..=3)")]
    BadDegree(u32),
    #[error("Neighbor index {0} does not fit in {SBBITS} bits")]
    IndexTooLarge(usize),
}

#[inline]
pub fn sbmask(j: u32) -> usize {
    (j >> SBBITS) as usize
}

#[inline]
pub fn encode(j: usize, degree: u32) -> Result<u32, SpecialError> {
    if degree as usize >= SPECIAL_DEGREES {
        return Err(SpecialError::BadDegree(degree));
    }
    if j > NEIGHMASK as usize {
        return Err(SpecialError::IndexTooLarge(j));
    }
    Ok((j as u32) | (degree << SBBITS))
}

#[inline]
pub fn decode(j: u32) -> (usize, usize) {
    ((j & NEIGHMASK) as usize, sbmask(j))
}

/// The four special Coulomb factors as supplied by the host.
///
/// Entry 0 is reserved: ordinary neighbors are never scaled, so the device
/// copy of entry 0 is always `1.0` regardless of what the host passed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecialCoulomb {
    factors: [f64; SPECIAL_DEGREES],
}

impl SpecialCoulomb {
    pub fn new(factors: [f64; SPECIAL_DEGREES]) -> Result<Self, SpecialError> {
        for (index, &value) in factors.iter().enumerate().skip(1) {
            if !(0.0..=1.0).contains(&value) {
                return Err(SpecialError::OutOfRange { index, value });
            }
        }
        Ok(Self { factors })
    }

    /// Factors 1-2, 1-3, 1-4 all equal to one (no exclusions).
    pub fn none() -> Self {
        Self { factors: [1.0; 4] }
    }

    pub fn host(&self) -> [f64; SPECIAL_DEGREES] {
        self.factors
    }

    /// Table as uploaded to the device.
    pub fn device_table<N: Real>(&self) -> [N; SPECIAL_DEGREES] {
        [
            N::one(),
            N::of(self.factors[1]),
            N::of(self.factors[2]),
            N::of(self.factors[3]),
        ]
    }
}

impl Default for SpecialCoulomb {
    fn default() -> Self {
        Self::none()
    }
}
