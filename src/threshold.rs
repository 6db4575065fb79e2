//! Closed-form decision thresholds.
//!
//! Given the dimension `p` and the patience `gamma` (the desired expected number of
//! steps before a false alarm), the thresholds are
//!
//! ```text
//!   th_diag  = ln(24 p gamma log2(4p))
//!   th_off_s = 8 ln(24 p gamma log2(2p))
//!   th_off_d = psi(th_off_s / 4),   psi(t) = (p - 1) + t + sqrt(2 (p - 1) t)
//! ```
//!
//! `psi` is the Laurent–Massart upper deviation bound for a chi-square with `p - 1`
//! degrees of freedom at level `exp(-t / 2)`. All three grow logarithmically in `gamma`;
//! the `p` factors pay for testing every channel and every scale.

use crate::aggregate::Scores;
use crate::{Error, Statistic};

/// `psi(t) = (p - 1) + t + sqrt(2 (p - 1) t)` for dimension `dim`.
pub fn psi(dim: usize, t: f64) -> f64 {
    let df = dim.saturating_sub(1) as f64;
    df + t + (2.0 * df * t.max(0.0)).sqrt()
}

/// Decision thresholds for the three statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Thresholds {
    pub diag: f64,
    pub off_d: f64,
    pub off_s: f64,
}

impl Thresholds {
    /// Explicit thresholds. Each must be non-negative and not NaN; `f64::INFINITY`
    /// disables the corresponding statistic.
    pub fn new(diag: f64, off_d: f64, off_s: f64) -> Result<Self, Error> {
        let t = Self { diag, off_d, off_s };
        t.validate()?;
        Ok(t)
    }

    /// Thresholds calibrated for patience `gamma` (see the module docs).
    ///
    /// `beta` is checked against `dim` but does not enter the closed forms.
    pub fn from_patience(dim: usize, gamma: u64, beta: usize) -> Result<Self, Error> {
        if dim == 0 {
            return Err(Error::InvalidParameter("dim must be at least 1".to_string()));
        }
        if gamma == 0 {
            return Err(Error::InvalidParameter(
                "patience must be at least 1".to_string(),
            ));
        }
        if beta == 0 || beta > dim {
            return Err(Error::InvalidParameter(format!(
                "beta must be in 1..={dim}, got {beta}"
            )));
        }
        let p = dim as f64;
        let base = 24.0 * p * gamma as f64;
        let diag = (base * (4.0 * p).log2()).ln();
        let off_s = 8.0 * (base * (2.0 * p).log2()).ln();
        let off_d = psi(dim, off_s / 4.0);
        Ok(Self { diag, off_d, off_s })
    }

    pub fn get(&self, stat: Statistic) -> f64 {
        match stat {
            Statistic::Diag => self.diag,
            Statistic::OffDense => self.off_d,
            Statistic::OffSparse => self.off_s,
        }
    }

    /// Statistics strictly above their threshold, in [`Statistic::ALL`] order.
    pub fn crossed(&self, scores: &Scores) -> Vec<Statistic> {
        Statistic::ALL
            .into_iter()
            .filter(|&s| scores.get(s).value > self.get(s))
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        for stat in Statistic::ALL {
            let v = self.get(stat);
            if v.is_nan() || v < 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "threshold {stat} must be non-negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScaleScore;

    #[test]
    fn closed_forms_match_reference_values() {
        // p = 39 channels, patience 1.3M: the seismic example configuration.
        let t = Thresholds::from_patience(39, 1_300_000, 1).unwrap();
        let base: f64 = 24.0 * 39.0 * 1.3e6;
        assert!((t.diag - (base * 156f64.log2()).ln()).abs() < 1e-12);
        assert!((t.off_s - 8.0 * (base * 78f64.log2()).ln()).abs() < 1e-12);
        let x = t.off_s / 4.0;
        assert!((t.off_d - (38.0 + x + (76.0 * x).sqrt())).abs() < 1e-12);
        assert!(t.diag > 22.0 && t.diag < 24.0, "diag={}", t.diag);
    }

    #[test]
    fn thresholds_grow_with_patience_and_dimension() {
        let a = Thresholds::from_patience(10, 1_000, 2).unwrap();
        let b = Thresholds::from_patience(10, 1_000_000, 2).unwrap();
        let c = Thresholds::from_patience(100, 1_000, 2).unwrap();
        for s in Statistic::ALL {
            assert!(b.get(s) > a.get(s), "{s}");
            assert!(c.get(s) > a.get(s), "{s}");
        }
    }

    #[test]
    fn psi_degenerates_to_identity_in_one_dimension() {
        assert_eq!(psi(1, 7.5), 7.5);
        assert_eq!(psi(3, 0.0), 2.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Thresholds::from_patience(0, 100, 1).is_err());
        assert!(Thresholds::from_patience(4, 0, 1).is_err());
        assert!(Thresholds::from_patience(4, 100, 0).is_err());
        assert!(Thresholds::from_patience(4, 100, 5).is_err());
        assert!(Thresholds::new(f64::NAN, 1.0, 1.0).is_err());
        assert!(Thresholds::new(1.0, -1.0, 1.0).is_err());
        assert!(Thresholds::new(1.0, 1.0, f64::INFINITY).is_ok());
    }

    #[test]
    fn crossed_is_strict_and_ordered() {
        let t = Thresholds::new(1.0, 2.0, 3.0).unwrap();
        let at = |d: f64, od: f64, os: f64| Scores {
            diag: ScaleScore { value: d, window: 1 },
            off_d: ScaleScore { value: od, window: 1 },
            off_s: ScaleScore { value: os, window: 1 },
        };
        assert!(t.crossed(&at(1.0, 2.0, 3.0)).is_empty());
        assert_eq!(
            t.crossed(&at(5.0, 0.0, 9.0)),
            vec![Statistic::Diag, Statistic::OffSparse]
        );
        let off = Thresholds::new(f64::INFINITY, f64::INFINITY, 0.0).unwrap();
        assert_eq!(off.crossed(&at(1e300, 1e300, 0.1)), vec![Statistic::OffSparse]);
    }
}
