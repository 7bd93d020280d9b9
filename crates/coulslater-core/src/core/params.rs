use super::precision::Real;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("At least one atom type is required")]
    NoTypes,
    #[error("Scale matrix must have {expected} rows of {expected} entries, found {found} in row {row}")]
    Shape {
        expected: usize,
        row: usize,
        found: usize,
    },
    #[error("Scale matrix has {found} rows, expected {expected}")]
    RowCount { expected: usize, found: usize },
    #[error("Scale coefficient for types ({0}, {1}) is not finite")]
    NonFinite(usize, usize),
    #[error("Scale matrix is not symmetric at types ({0}, {1})")]
    Asymmetric(usize, usize),
    #[error("Atom type {ty} is out of range 1..={ntypes}")]
    TypeOutOfRange { ty: usize, ntypes: usize },
    #[error("Invalid atom type range '{0}'")]
    BadRange(String),
    #[error("Pair coefficients are not set for types ({0}, {1})")]
    UnsetPair(usize, usize),
    #[error("Invalid physical constant {name} = {value}: {reason}")]
    Constant {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
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
    #[error("Invalid coefficients in '{path}': {source}")]
    Invalid { path: String, source: ParamError },
}

/// Host-side per-type-pair Coulomb scale factors.
///
/// Types are 1-based: the matrix has `ntypes + 1` rows and columns, row and
/// column 0 are padding.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleMatrix {
    ntypes: usize,
    values: Vec<f64>,
}

impl ScaleMatrix {
    /// Every real type pair set to `value`, padding left at zero.
    pub fn uniform(ntypes: usize, value: f64) -> Self {
        let dim = ntypes + 1;
        let mut values = vec![0.0; dim * dim];
        for i in 1..dim {
            for j in 1..dim {
                values[i * dim + j] = value;
            }
        }
        Self { ntypes, values }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ParamError> {
        if rows.len() < 2 {
            return Err(ParamError::NoTypes);
        }
        let dim = rows.len();
        let mut values = Vec::with_capacity(dim * dim);
        for (row, entries) in rows.iter().enumerate() {
            if entries.len() != dim {
                return Err(ParamError::Shape {
                    expected: dim,
                    row,
                    found: entries.len(),
                });
            }
            values.extend_from_slice(entries);
        }
        Ok(Self {
            ntypes: dim - 1,
            values,
        })
    }

    /// Builds the matrix from `pair_coeff`-style entries; every real type pair must be covered.
    pub fn from_coeffs(ntypes: usize, coeffs: &[PairCoeff]) -> Result<Self, ParamError> {
        if ntypes == 0 {
            return Err(ParamError::NoTypes);
        }
        let dim = ntypes + 1;
        let mut matrix = Self {
            ntypes,
            values: vec![0.0; dim * dim],
        };
        let mut set = vec![false; dim * dim];
        for (i, j) in matrix.apply(coeffs)? {
            set[i * dim + j] = true;
        }
        for i in 1..dim {
            for j in i..dim {
                if !set[i * dim + j] {
                    return Err(ParamError::UnsetPair(i, j));
                }
            }
        }
        Ok(matrix)
    }

    /// Overwrites the pairs covered by `coeffs`, returning them as `(i, j)` with `i <= j`.
    pub fn apply(&mut self, coeffs: &[PairCoeff]) -> Result<Vec<(usize, usize)>, ParamError> {
        let mut touched = Vec::new();
        for coeff in coeffs {
            let mut first = TypeRange::parse(&coeff.types[0])?.bounds(self.ntypes)?;
            let mut second = TypeRange::parse(&coeff.types[1])?.bounds(self.ntypes)?;
            if first.0 == first.1 && second.0 == second.1 && first.0 > second.0 {
                std::mem::swap(&mut first, &mut second);
            }
            let ((ilo, ihi), (jlo, jhi)) = (first, second);
            let scale = coeff.scale.unwrap_or(1.0);
            for i in ilo..=ihi {
                for j in jlo.max(i)..=jhi {
                    self.set(i, j, scale)?;
                    touched.push((i, j));
                }
            }
        }
        Ok(touched)
    }

    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    pub fn dim(&self) -> usize {
        self.ntypes + 1
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dim() + j]
    }

    /// Sets both `(i, j)` and `(j, i)`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) -> Result<(), ParamError> {
        for ty in [i, j] {
            if ty == 0 || ty > self.ntypes {
                return Err(ParamError::TypeOutOfRange {
                    ty,
                    ntypes: self.ntypes,
                });
            }
        }
        let dim = self.dim();
        self.values[i * dim + j] = value;
        self.values[j * dim + i] = value;
        Ok(())
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.dim())
    }

    /// Checks that every real type pair is finite and symmetric.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.ntypes == 0 {
            return Err(ParamError::NoTypes);
        }
        for i in 1..=self.ntypes {
            for j in i..=self.ntypes {
                let a = self.get(i, j);
                if !a.is_finite() {
                    return Err(ParamError::NonFinite(i, j));
                }
                if a != self.get(j, i) {
                    return Err(ParamError::Asymmetric(i, j));
                }
            }
        }
        Ok(())
    }
}

/// One `pair_coeff` line: a pair of type ranges and an optional scale (default 1.0).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairCoeff {
    pub types: [String; 2],
    pub scale: Option<f64>,
}

/// On-disk coefficient file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoeffFile {
    pub ntypes: usize,
    #[serde(default)]
    pub pair_coeff: Vec<PairCoeff>,
}

impl CoeffFile {
    pub fn load(path: &Path) -> Result<ScaleMatrix, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: CoeffFile = toml::from_str(&content).map_err(|e| ParamLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        ScaleMatrix::from_coeffs(file.ntypes, &file.pair_coeff).map_err(|e| {
            ParamLoadError::Invalid {
                path: path.to_string_lossy().to_string(),
                source: e,
            }
        })
    }
}

/// An atom type range in `pair_coeff` notation: `N`, `*`, `N*`, `*M`, `N*M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRange {
    lo: Option<usize>,
    hi: Option<usize>,
}

impl TypeRange {
    pub fn parse(text: &str) -> Result<Self, ParamError> {
        let bad = || ParamError::BadRange(text.to_string());
        let parse_bound = |s: &str| -> Result<Option<usize>, ParamError> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<usize>().map(Some).map_err(|_| bad())
            }
        };
        match text.trim().split_once('*') {
            None => {
                let ty = parse_bound(text.trim())?.ok_or_else(bad)?;
                Ok(Self {
                    lo: Some(ty),
                    hi: Some(ty),
                })
            }
            Some((lo, hi)) => Ok(Self {
                lo: parse_bound(lo)?,
                hi: parse_bound(hi)?,
            }),
        }
    }

    /// Inclusive bounds clipped to `1..=ntypes`.
    pub fn bounds(self, ntypes: usize) -> Result<(usize, usize), ParamError> {
        let lo = self.lo.unwrap_or(1);
        let hi = self.hi.unwrap_or(ntypes);
        for ty in [lo, hi] {
            if ty == 0 || ty > ntypes {
                return Err(ParamError::TypeOutOfRange { ty, ntypes });
            }
        }
        if lo > hi {
            return Err(ParamError::BadRange(format!("{lo}*{hi}")));
        }
        Ok((lo, hi))
    }
}

/// Global constants of the analytic interaction.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PhysicalConstants<T = f64> {
    /// Squared Coulomb cutoff.
    pub cut_coulsq: T,
    /// Charge-charge energy conversion factor.
    pub qqrd2e: T,
    /// Ewald splitting parameter.
    pub g_ewald: T,
    /// Slater damping length.
    pub lamda: T,
}

impl PhysicalConstants<f64> {
    pub fn validate(&self) -> Result<(), ParamError> {
        let check = |name: &'static str, value: f64, ok: bool, reason: &'static str| {
            if ok {
                Ok(())
            } else {
                Err(ParamError::Constant {
                    name,
                    value,
                    reason,
                })
            }
        };
        check(
            "cut_coulsq",
            self.cut_coulsq,
            self.cut_coulsq.is_finite() && self.cut_coulsq > 0.0,
            "must be positive",
        )?;
        check(
            "qqrd2e",
            self.qqrd2e,
            self.qqrd2e.is_finite(),
            "must be finite",
        )?;
        check(
            "g_ewald",
            self.g_ewald,
            self.g_ewald.is_finite() && self.g_ewald >= 0.0,
            "must be non-negative",
        )?;
        check(
            "lamda",
            self.lamda,
            self.lamda.is_finite() && self.lamda > 0.0,
            "must be positive",
        )
    }

    pub fn cast<N: Real>(&self) -> PhysicalConstants<N> {
        PhysicalConstants {
            cut_coulsq: N::of(self.cut_coulsq),
            qqrd2e: N::of(self.qqrd2e),
            g_ewald: N::of(self.g_ewald),
            lamda: N::of(self.lamda),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn coeff(i: &str, j: &str, scale: Option<f64>) -> PairCoeff {
        PairCoeff {
            types: [i.to_string(), j.to_string()],
            scale,
        }
    }

    #[test]
    fn uniform_matrix_leaves_padding_row_zero() {
        let m = ScaleMatrix::uniform(2, 1.0);
        assert_eq!(m.dim(), 3);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(1, 0), 0.0);
        assert_eq!(m.get(2, 1), 1.0);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let rows = vec![vec![0.0, 0.0], vec![0.0]];
        assert!(matches!(
            ScaleMatrix::from_rows(&rows),
            Err(ParamError::Shape { row: 1, .. })
        ));
    }

    #[test]
    fn validate_detects_asymmetry_and_non_finite_values() {
        let rows = vec![
            vec![0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.5],
            vec![0.0, 0.7, 1.0],
        ];
        let m = ScaleMatrix::from_rows(&rows).unwrap();
        assert_eq!(m.validate(), Err(ParamError::Asymmetric(1, 2)));

        let mut m = ScaleMatrix::uniform(2, 1.0);
        m.set(2, 2, f64::NAN).unwrap();
        assert_eq!(m.validate(), Err(ParamError::NonFinite(2, 2)));
    }

    #[test]
    fn set_writes_both_triangles_and_rejects_padding_type() {
        let mut m = ScaleMatrix::uniform(3, 1.0);
        m.set(1, 3, 0.25).unwrap();
        assert_eq!(m.get(3, 1), 0.25);
        assert!(matches!(
            m.set(0, 1, 2.0),
            Err(ParamError::TypeOutOfRange { ty: 0, .. })
        ));
    }

    #[test]
    fn type_range_parses_all_wildcard_forms() {
        assert_eq!(TypeRange::parse("*").unwrap().bounds(4), Ok((1, 4)));
        assert_eq!(TypeRange::parse("2").unwrap().bounds(4), Ok((2, 2)));
        assert_eq!(TypeRange::parse("2*").unwrap().bounds(4), Ok((2, 4)));
        assert_eq!(TypeRange::parse("*3").unwrap().bounds(4), Ok((1, 3)));
        assert_eq!(TypeRange::parse("2*3").unwrap().bounds(4), Ok((2, 3)));
        assert!(TypeRange::parse("a*").is_err());
        assert!(TypeRange::parse("5").unwrap().bounds(4).is_err());
    }

    #[test]
    fn from_coeffs_applies_later_entries_over_wildcards() {
        let coeffs = vec![coeff("*", "*", None), coeff("1", "2", Some(0.5))];
        let m = ScaleMatrix::from_coeffs(2, &coeffs).unwrap();
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(1, 2), 0.5);
        assert_eq!(m.get(2, 1), 0.5);
    }

    #[test]
    fn from_coeffs_requires_every_pair() {
        let coeffs = vec![coeff("1", "1", None), coeff("2", "2", None)];
        assert_eq!(
            ScaleMatrix::from_coeffs(2, &coeffs),
            Err(ParamError::UnsetPair(1, 2))
        );
    }

    #[test]
    fn apply_touches_only_listed_pairs() {
        let mut m = ScaleMatrix::uniform(3, 1.0);
        let touched = m.apply(&[coeff("2", "*", Some(0.25))]).unwrap();
        assert_eq!(touched, vec![(2, 2), (2, 3)]);
        assert_eq!(m.get(3, 2), 0.25);
        assert_eq!(m.get(1, 2), 1.0);
        assert_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn reversed_single_type_pair_is_applied() {
        let mut m = ScaleMatrix::uniform(2, 1.0);
        let touched = m.apply(&[coeff("2", "1", Some(0.5))]).unwrap();
        assert_eq!(touched, vec![(1, 2)]);
        assert_eq!(m.get(1, 2), 0.5);
        assert_eq!(m.get(2, 1), 0.5);

        let coeffs = vec![
            coeff("1", "1", None),
            coeff("2", "2", None),
            coeff("2", "1", Some(0.5)),
        ];
        let m = ScaleMatrix::from_coeffs(2, &coeffs).unwrap();
        assert_eq!(m.get(1, 2), 0.5);
    }

    #[test]
    fn coeff_file_loads_from_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coeffs.toml");
        fs::write(
            &path,
            r#"
            ntypes = 2
            [[pair-coeff]]
            types = ["*", "*"]
            [[pair-coeff]]
            types = ["2", "2"]
            scale = 0.8
            "#,
        )
        .unwrap();
        let m = CoeffFile::load(&path).unwrap();
        assert_eq!(m.ntypes(), 2);
        assert_eq!(m.get(2, 2), 0.8);
    }

    #[test]
    fn coeff_file_reports_missing_and_malformed_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            CoeffFile::load(&missing),
            Err(ParamLoadError::Io { .. })
        ));
        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "ntypes = ").unwrap();
        assert!(matches!(
            CoeffFile::load(&bad),
            Err(ParamLoadError::Toml { .. })
        ));
    }

    #[test]
    fn constants_validation_rejects_non_positive_cutoff_and_lamda() {
        let ok = PhysicalConstants {
            cut_coulsq: 100.0,
            qqrd2e: 332.06371,
            g_ewald: 0.3,
            lamda: 1.0,
        };
        assert!(ok.validate().is_ok());
        let bad_cut = PhysicalConstants {
            cut_coulsq: 0.0,
            ..ok
        };
        assert!(matches!(
            bad_cut.validate(),
            Err(ParamError::Constant {
                name: "cut_coulsq",
                ..
            })
        ));
        let bad_lamda = PhysicalConstants { lamda: -1.0, ..ok };
        assert!(bad_lamda.validate().is_err());
    }
}
