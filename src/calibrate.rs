//! Empirical threshold calibration from simulated null streams.
//!
//! The closed forms in [`Thresholds::from_patience`](crate::Thresholds::from_patience)
//! are union bounds and tend to be conservative. The alternative here:
//!
//! 1. simulate `reps` null streams `X_t ~ N(0, I_p)` of length `patience` through the
//!    same sketch bank and aggregator the detector uses;
//! 2. record each stream's maximum of every statistic;
//! 3. pick each threshold so that at most `alpha / 3` of the streams exceed it.
//!
//! A stream exceeding a threshold is a false alarm within `patience` steps, so `alpha`
//! bounds the probability of any false alarm before `patience`. If the run length to a
//! false alarm is roughly geometric, `alpha = 1 - 1/e` corresponds to an expected run
//! length near `patience`, which is the default.
//!
//! Simulation needs the `stochastic` feature; [`threshold_from_max_scores`] and
//! [`wilson_bounds`] do not.

use crate::Error;

/// Wilson score interval for a Bernoulli proportion.
///
/// Returns `(lower, upper, half_width)`, with bounds clamped into `[0,1]`.
pub fn wilson_bounds(successes: u64, trials: u64, z: f64) -> (f64, f64, f64) {
    if trials == 0 {
        return (0.0, 1.0, 0.5);
    }
    let n = trials as f64;
    let k = successes.min(trials) as f64;
    let p_hat = k / n;
    let z = if z.is_finite() && z > 0.0 { z } else { 1.96 };
    let z2 = z * z;

    let denom = 1.0 + z2 / n;
    let center = (p_hat + z2 / (2.0 * n)) / denom;
    let rad = (z * ((p_hat * (1.0 - p_hat) / n) + (z2 / (4.0 * n * n))).sqrt()) / denom;
    let lo = (center - rad).clamp(0.0, 1.0);
    let hi = (center + rad).clamp(0.0, 1.0);
    (lo, hi, (hi - lo) / 2.0)
}

/// A threshold chosen from null maxima, with its empirical false-alarm share.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThresholdCalibration {
    pub threshold: f64,
    /// `#{M > threshold} / trials`.
    pub fa_hat: f64,
    /// Wilson upper bound on the false-alarm probability at `threshold`.
    pub fa_wilson_hi: f64,
    pub trials: u64,
}

/// Smallest order statistic of `max_scores` that at most `alpha * n` scores strictly exceed.
///
/// `max_scores` is sorted in place. The result is floored at `0.0`, since every
/// statistic's score is non-negative. Empty input yields `f64::INFINITY`.
#[must_use]
pub fn threshold_from_max_scores(max_scores: &mut [f64], alpha: f64, z: f64) -> ThresholdCalibration {
    let trials = max_scores.len() as u64;
    if max_scores.is_empty() {
        return ThresholdCalibration {
            threshold: f64::INFINITY,
            fa_hat: 0.0,
            fa_wilson_hi: 1.0,
            trials,
        };
    }
    let alpha = if alpha.is_finite() {
        alpha.clamp(0.0, 1.0)
    } else {
        0.0
    };

    max_scores.sort_by(|a, b| a.total_cmp(b));
    let n = max_scores.len();
    let allowed = ((alpha * n as f64).floor() as usize).min(n - 1);
    let threshold = max_scores[n - 1 - allowed].max(0.0);

    let above = n - max_scores.partition_point(|&x| x <= threshold);
    let (_lo, hi, _half) = wilson_bounds(above as u64, trials, z);
    ThresholdCalibration {
        threshold,
        fa_hat: above as f64 / n as f64,
        fa_wilson_hi: hi,
        trials,
    }
}

/// Monte Carlo calibration settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonteCarloConfig {
    pub dim: usize,
    pub beta: usize,
    /// Length of each simulated null stream; also the ladder's largest scale.
    pub patience: u64,
    /// Number of simulated streams.
    pub reps: usize,
    /// Target probability of any false alarm within `patience`, split evenly across
    /// the three statistics.
    pub alpha: f64,
    /// Hard threshold for the sparse statistic (`None`: the detector default).
    pub sparse_cutoff: Option<f64>,
    pub seed: u64,
}

impl MonteCarloConfig {
    pub fn new(dim: usize, beta: usize, patience: u64) -> Self {
        Self {
            dim,
            beta,
            patience,
            reps: 200,
            alpha: 1.0 - (-1.0_f64).exp(),
            sparse_cutoff: None,
            seed: 0x0CD_5EED,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.dim == 0 {
            return Err(Error::InvalidParameter("dim must be at least 1".to_string()));
        }
        if self.beta == 0 || self.beta > self.dim {
            return Err(Error::InvalidParameter(format!(
                "beta must be in 1..={}, got {}",
                self.dim, self.beta
            )));
        }
        if self.patience == 0 || self.reps == 0 {
            return Err(Error::InvalidParameter(
                "patience and reps must be at least 1".to_string(),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Result of [`calibrate_thresholds`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonteCarloCalibration {
    pub thresholds: crate::Thresholds,
    pub diag: ThresholdCalibration,
    pub off_d: ThresholdCalibration,
    pub off_s: ThresholdCalibration,
}

#[cfg(feature = "stochastic")]
mod simulate {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;
    use tracing::debug;

    use super::{threshold_from_max_scores, MonteCarloCalibration, MonteCarloConfig};
    use crate::aggregate::default_sparse_cutoff;
    use crate::{CusumSketchBank, Error, ScaleLadder, Scores, StatisticAggregator, Thresholds};

    /// Per-stream maxima of each statistic over `reps` null streams of length `patience`.
    ///
    /// Deterministic for a fixed `seed`.
    pub fn simulate_null_max_scores(cfg: &MonteCarloConfig) -> Result<Vec<Scores>, Error> {
        cfg.validate()?;
        let ladder = ScaleLadder::new(cfg.patience)?;
        let cutoff = cfg
            .sparse_cutoff
            .unwrap_or_else(|| default_sparse_cutoff(cfg.dim));
        let mut bank = CusumSketchBank::new(cfg.dim, ladder);
        let mut agg = StatisticAggregator::new(cfg.dim, cfg.beta, cutoff);
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut z = vec![0.0; cfg.dim];

        let mut out = Vec::with_capacity(cfg.reps);
        for _ in 0..cfg.reps {
            bank.reset();
            let mut max = Scores::default();
            for _ in 0..cfg.patience {
                for zi in z.iter_mut() {
                    *zi = rng.sample(StandardNormal);
                }
                bank.update(&z);
                max.max_with(&agg.evaluate(&bank));
            }
            out.push(max);
        }
        Ok(out)
    }

    /// Calibrate all three thresholds by simulation (see the module docs).
    pub fn calibrate_thresholds(cfg: &MonteCarloConfig) -> Result<MonteCarloCalibration, Error> {
        let maxima = simulate_null_max_scores(cfg)?;
        let per_stat = cfg.alpha / 3.0;
        let z = 1.96;

        let mut diag: Vec<f64> = maxima.iter().map(|s| s.diag.value).collect();
        let mut off_d: Vec<f64> = maxima.iter().map(|s| s.off_d.value).collect();
        let mut off_s: Vec<f64> = maxima.iter().map(|s| s.off_s.value).collect();

        let diag = threshold_from_max_scores(&mut diag, per_stat, z);
        let off_d = threshold_from_max_scores(&mut off_d, per_stat, z);
        let off_s = threshold_from_max_scores(&mut off_s, per_stat, z);
        let thresholds = Thresholds::new(diag.threshold, off_d.threshold, off_s.threshold)?;

        debug!(
            dim = cfg.dim,
            patience = cfg.patience,
            reps = cfg.reps,
            th_diag = thresholds.diag,
            th_off_d = thresholds.off_d,
            th_off_s = thresholds.off_s,
            "monte carlo thresholds calibrated"
        );
        Ok(MonteCarloCalibration {
            thresholds,
            diag,
            off_d,
            off_s,
        })
    }
}

#[cfg(feature = "stochastic")]
pub use simulate::{calibrate_thresholds, simulate_null_max_scores};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wilson_bounds_are_ordered_and_bounded() {
        let (lo, hi, half) = wilson_bounds(8, 10, 1.96);
        assert!(0.0 <= lo && lo <= hi && hi <= 1.0);
        assert!(half >= 0.0);
        assert_eq!(wilson_bounds(0, 0, 1.96), (0.0, 1.0, 0.5));
    }

    #[test]
    fn threshold_leaves_at_most_alpha_share_above() {
        let mut m = vec![5.0, 1.0, 4.0, 2.0, 3.0, 9.0, 7.0, 8.0, 6.0, 10.0];
        let cal = threshold_from_max_scores(&mut m, 0.2, 1.96);
        assert_eq!(cal.threshold, 8.0);
        assert!((cal.fa_hat - 0.2).abs() < 1e-12);
        assert!(cal.fa_wilson_hi >= cal.fa_hat);
        assert_eq!(cal.trials, 10);
    }

    #[test]
    fn zero_alpha_takes_the_maximum() {
        let mut m = vec![3.0, 1.0, 2.0];
        let cal = threshold_from_max_scores(&mut m, 0.0, 1.96);
        assert_eq!(cal.threshold, 3.0);
        assert_eq!(cal.fa_hat, 0.0);
    }

    #[test]
    fn ties_never_exceed_the_budget() {
        let mut m = vec![4.0; 10];
        let cal = threshold_from_max_scores(&mut m, 0.5, 1.96);
        assert_eq!(cal.threshold, 4.0);
        assert_eq!(cal.fa_hat, 0.0);
    }

    #[test]
    fn empty_scores_disable_the_statistic() {
        let cal = threshold_from_max_scores(&mut [], 0.1, 1.96);
        assert!(cal.threshold.is_infinite());
    }

    #[test]
    fn config_validation() {
        assert!(MonteCarloConfig::new(4, 2, 100).validate().is_ok());
        assert!(MonteCarloConfig::new(0, 1, 100).validate().is_err());
        assert!(MonteCarloConfig::new(4, 5, 100).validate().is_err());
        assert!(MonteCarloConfig { alpha: 1.0, ..MonteCarloConfig::new(4, 2, 100) }
            .validate()
            .is_err());
        assert!(MonteCarloConfig { reps: 0, ..MonteCarloConfig::new(4, 2, 100) }
            .validate()
            .is_err());
    }

    #[cfg(feature = "stochastic")]
    #[test]
    fn simulation_is_deterministic_per_seed() {
        let cfg = MonteCarloConfig {
            reps: 5,
            ..MonteCarloConfig::new(3, 1, 64)
        };
        let a = simulate_null_max_scores(&cfg).unwrap();
        let b = simulate_null_max_scores(&cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        let c = simulate_null_max_scores(&MonteCarloConfig { seed: 1, ..cfg }).unwrap();
        assert_ne!(a, c);
    }
}
