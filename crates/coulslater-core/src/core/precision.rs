use num_traits::Float;
use serde::Deserialize;
use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::AddAssign;
use std::str::FromStr;
use thiserror::Error;

/// Scalar type usable for device storage (`N`) or accumulation (`A`).
///
/// The pair style is generic over a storage precision and an accumulation
/// precision, which may differ (single storage with double accumulation is the
/// usual "mixed" build).
pub trait Real:
    Float + AddAssign + Sum + Default + Debug + Display + Send + Sync + 'static
{
    /// Precision label as it appears in diagnostics.
    const NAME: &'static str;
    /// Whether the type needs double-precision support on the device.
    const IS_DOUBLE: bool;

    fn of(value: f64) -> Self;

    fn as_f64(self) -> f64;

    /// Conversion between storage and accumulation precision.
    #[inline]
    fn cast<T: Real>(self) -> T {
        T::of(self.as_f64())
    }
}

impl Real for f32 {
    const NAME: &'static str = "single";
    const IS_DOUBLE: bool = false;

    #[inline]
    fn of(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    const NAME: &'static str = "double";
    const IS_DOUBLE: bool = true;

    #[inline]
    fn of(value: f64) -> Self {
        value
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

/// The three precision builds of the pair style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrecisionMode {
    /// `f32` storage, `f32` accumulation.
    Single,
    /// `f32` storage, `f64` accumulation.
    #[default]
    Mixed,
    /// `f64` storage, `f64` accumulation.
    Double,
}

impl PrecisionMode {
    pub fn of<N: Real, A: Real>() -> Self {
        match (N::IS_DOUBLE, A::IS_DOUBLE) {
            (false, false) => Self::Single,
            (false, true) => Self::Mixed,
            (true, _) => Self::Double,
        }
    }

    pub fn requires_double(self) -> bool {
        !matches!(self, Self::Single)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Single => "Single Precision",
            Self::Mixed => "Mixed Precision",
            Self::Double => "Double Precision",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown precision mode '{0}' (expected single, mixed or double)")]
pub struct UnknownPrecision(pub String);

impl FromStr for PrecisionMode {
    type Err = UnknownPrecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "float" => Ok(Self::Single),
            "mixed" => Ok(Self::Mixed),
            "double" => Ok(Self::Double),
            _ => Err(UnknownPrecision(s.to_string())),
        }
    }
}
