//! Baseline estimation: per-channel Welford accumulators and the frozen statistics they produce.

use crate::error::check_observation;
use crate::Error;

/// Frozen per-channel baseline mean and standard deviation.
///
/// Produced by [`RunningMoments::freeze`] or supplied directly with [`BaselineStats::new`]
/// when the pre-change distribution is already known.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaselineStats {
    mean: Vec<f64>,
    sd: Vec<f64>,
    samples: u64,
}

impl BaselineStats {
    /// Build baseline statistics from known per-channel means and standard deviations.
    ///
    /// Zero or non-finite standard deviations are accepted: such channels are treated as
    /// degenerate by the [`Standardizer`](crate::Standardizer).
    pub fn new(mean: Vec<f64>, sd: Vec<f64>) -> Result<Self, Error> {
        if mean.is_empty() {
            return Err(Error::InvalidParameter(
                "baseline must have at least one channel".to_string(),
            ));
        }
        if mean.len() != sd.len() {
            return Err(Error::DimensionMismatch {
                expected: mean.len(),
                got: sd.len(),
            });
        }
        if sd.iter().any(|&s| s < 0.0) {
            return Err(Error::InvalidParameter(
                "baseline standard deviations must be non-negative".to_string(),
            ));
        }
        Ok(Self {
            mean,
            sd,
            samples: 0,
        })
    }

    /// Number of channels.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Per-channel baseline means.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-channel baseline standard deviations.
    pub fn sd(&self) -> &[f64] {
        &self.sd
    }

    /// Observations the statistics were estimated from (`0` when supplied directly).
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Per-channel running mean/variance using Welford's update.
///
/// The update keeps a running mean and a running sum of squared deviations (`m2`)
/// per channel, so rounding error does not grow with the sample count the way a
/// naive sum-of-squares accumulator does.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunningMoments {
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningMoments {
    /// Create an empty accumulator for `dim` channels.
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    /// Number of channels.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Fold one observation into every channel.
    pub fn update(&mut self, x: &[f64]) -> Result<(), Error> {
        check_observation(x, self.dim())?;
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &xi) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(x) {
            let delta = xi - *mean;
            *mean += delta / n;
            *m2 += delta * (xi - *mean);
        }
        Ok(())
    }

    /// Observations folded in so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Current per-channel means.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-channel sample variance (`n - 1` denominator); `0.0` with fewer than two samples.
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![0.0; self.dim()];
        }
        let denom = (self.count - 1) as f64;
        self.m2.iter().map(|&m2| (m2 / denom).max(0.0)).collect()
    }

    /// Per-channel sample standard deviation.
    pub fn std_dev(&self) -> Vec<f64> {
        self.variance().into_iter().map(f64::sqrt).collect()
    }

    /// Snapshot the accumulated statistics as an immutable baseline.
    pub fn freeze(&self) -> Result<BaselineStats, Error> {
        if self.count == 0 {
            return Err(Error::InsufficientData);
        }
        Ok(BaselineStats {
            mean: self.mean.clone(),
            sd: self.std_dev(),
            samples: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_without_samples_is_insufficient_data() {
        let m = RunningMoments::new(3);
        assert_eq!(m.freeze().unwrap_err(), Error::InsufficientData);
    }

    #[test]
    fn welford_matches_two_pass_estimates() {
        let rows: Vec<[f64; 2]> = (0..50)
            .map(|i| {
                let t = i as f64;
                [t * 0.5 - 3.0, (t * 0.37).sin() * 4.0 + 10.0]
            })
            .collect();

        let mut m = RunningMoments::new(2);
        for r in &rows {
            m.update(r).unwrap();
        }

        for ch in 0..2 {
            let n = rows.len() as f64;
            let mean = rows.iter().map(|r| r[ch]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[ch] - mean).powi(2)).sum::<f64>() / (n - 1.0);
            assert!((m.mean()[ch] - mean).abs() < 1e-12);
            assert!((m.variance()[ch] - var).abs() < 1e-9, "ch={ch}");
        }
        let b = m.freeze().unwrap();
        assert_eq!(b.samples(), 50);
        assert_eq!(b.dim(), 2);
    }

    #[test]
    fn welford_is_stable_under_large_offset() {
        // Naive sum-of-squares loses all precision here.
        let mut m = RunningMoments::new(1);
        for i in 0..1000 {
            let x = 1e9 + if i % 2 == 0 { 1.0 } else { -1.0 };
            m.update(&[x]).unwrap();
        }
        let var = m.variance()[0];
        assert!((var - 1.001_001).abs() < 1e-3, "var={var}");
    }

    #[test]
    fn single_sample_has_zero_sd() {
        let mut m = RunningMoments::new(2);
        m.update(&[1.0, 2.0]).unwrap();
        let b = m.freeze().unwrap();
        assert_eq!(b.sd(), &[0.0, 0.0]);
        assert_eq!(b.mean(), &[1.0, 2.0]);
    }

    #[test]
    fn rejected_update_leaves_state_untouched() {
        let mut m = RunningMoments::new(2);
        m.update(&[1.0, 1.0]).unwrap();
        assert!(matches!(
            m.update(&[1.0]),
            Err(Error::DimensionMismatch {
                expected: 2,
                got: 1
            })
        ));
        assert!(matches!(
            m.update(&[f64::NAN, 0.0]),
            Err(Error::NonFiniteObservation { channel: 0, .. })
        ));
        assert_eq!(m.count(), 1);
        assert_eq!(m.mean(), &[1.0, 1.0]);
    }

    #[test]
    fn baseline_new_validates_shape() {
        assert!(BaselineStats::new(vec![], vec![]).is_err());
        assert!(matches!(
            BaselineStats::new(vec![0.0, 0.0], vec![1.0]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(BaselineStats::new(vec![0.0], vec![-1.0]).is_err());
        let b = BaselineStats::new(vec![0.0, 1.0], vec![1.0, 0.0]).unwrap();
        assert_eq!(b.samples(), 0);
    }
}
