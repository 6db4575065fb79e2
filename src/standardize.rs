//! Z-scoring against a frozen baseline.

use crate::error::check_observation;
use crate::{BaselineStats, Error};

/// Per-channel z-scoring with frozen baseline statistics.
///
/// A channel is *degenerate* when its baseline standard deviation is zero, non-finite
/// or too small to invert, or its mean is non-finite. Degenerate channels always standardize to
/// exactly `0.0`: they carry no signal instead of turning every downstream statistic
/// into `inf`/`NaN`. The set is reported through [`Standardizer::degenerate_channels`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Standardizer {
    baseline: BaselineStats,
    /// `1 / sd`, or `0.0` for degenerate channels.
    inv_sd: Vec<f64>,
    degenerate: Vec<usize>,
}

impl Standardizer {
    pub fn new(baseline: BaselineStats) -> Self {
        let mut inv_sd = Vec::with_capacity(baseline.dim());
        let mut degenerate = Vec::new();
        for (j, (&m, &s)) in baseline.mean().iter().zip(baseline.sd()).enumerate() {
            // A subnormal sd is positive but its reciprocal overflows.
            let inv = 1.0 / s;
            if m.is_finite() && s.is_finite() && s > 0.0 && inv.is_finite() {
                inv_sd.push(inv);
            } else {
                inv_sd.push(0.0);
                degenerate.push(j);
            }
        }
        Self {
            baseline,
            inv_sd,
            degenerate,
        }
    }

    pub fn dim(&self) -> usize {
        self.inv_sd.len()
    }

    pub fn baseline(&self) -> &BaselineStats {
        &self.baseline
    }

    /// Indices of channels whose output is pinned to zero.
    pub fn degenerate_channels(&self) -> &[usize] {
        &self.degenerate
    }

    /// Write the z-scored `x` into `out`. Both slices must have `dim()` entries.
    pub fn standardize_into(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.dim());
        debug_assert_eq!(out.len(), self.dim());
        for (((o, &xi), &m), &inv) in out
            .iter_mut()
            .zip(x)
            .zip(self.baseline.mean())
            .zip(&self.inv_sd)
        {
            *o = if inv == 0.0 { 0.0 } else { (xi - m) * inv };
        }
    }
}

/// Z-score one observation against `baseline`, allocating the result.
///
/// Degenerate channels map to `0.0` (see [`Standardizer`]).
pub fn standardize(x: &[f64], baseline: &BaselineStats) -> Result<Vec<f64>, Error> {
    check_observation(x, baseline.dim())?;
    let s = Standardizer::new(baseline.clone());
    let mut out = vec![0.0; x.len()];
    s.standardize_into(x, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_elementwise() {
        let b = BaselineStats::new(vec![1.0, -2.0], vec![2.0, 0.5]).unwrap();
        let z = standardize(&[5.0, -1.0], &b).unwrap();
        assert_eq!(z, vec![2.0, 2.0]);
    }

    #[test]
    fn zero_and_nonfinite_sd_channels_are_pinned_to_zero() {
        let b = BaselineStats::new(vec![0.0, 3.0, 0.0, f64::NAN], vec![1.0, 0.0, f64::INFINITY, 1.0])
            .unwrap();
        let s = Standardizer::new(b);
        assert_eq!(s.degenerate_channels(), &[1, 2, 3]);

        let mut out = [f64::NAN; 4];
        for x in [[1.0, 3.0, 7.0, 1.0], [-4.0, 1e300, -1e300, 0.0]] {
            s.standardize_into(&x, &mut out);
            assert_eq!(out[0], x[0]);
            assert_eq!(out[1], 0.0);
            assert_eq!(out[2], 0.0);
            assert_eq!(out[3], 0.0);
        }
    }

    #[test]
    fn subnormal_sd_is_degenerate() {
        let b = BaselineStats::new(vec![0.0, 0.0], vec![1.0, 1e-320]).unwrap();
        let s = Standardizer::new(b.clone());
        assert_eq!(s.degenerate_channels(), &[1]);

        let mut out = [f64::NAN; 2];
        for x in [[3.0, 0.0], [3.0, 5.0], [-1.0, -1e-300]] {
            s.standardize_into(&x, &mut out);
            assert_eq!(out, [x[0], 0.0]);
        }
        assert_eq!(standardize(&[3.0, 0.0], &b).unwrap(), vec![3.0, 0.0]);
    }

    #[test]
    fn standardize_rejects_wrong_length() {
        let b = BaselineStats::new(vec![0.0; 3], vec![1.0; 3]).unwrap();
        assert!(matches!(
            standardize(&[0.0, 0.0], &b),
            Err(Error::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }
}
