//! The three mean-shift statistics, each maximized over the scale ladder.
//!
//! For a window of length `L` with per-channel sums `S_j`, the standardized CUSUM is
//! `c_j = S_j / sqrt(L)`, which is `N(0, 1)` per channel while the stream matches its
//! baseline. With `s_j = c_j^2`:
//!
//! | statistic | formula | aimed at |
//! |-----------|---------|----------|
//! | `diag`  | `(sum_j s_j - p) / sqrt(2p)` | dense shifts, any direction |
//! | `off_d` | `sum_j s_j - max_j s_j` | dense shifts, whole-vector norm |
//! | `off_s` | sum of the `beta` largest `s_j` with `|c_j| >= a` | sparse shifts |
//!
//! `off_d` drops the leading coordinate, so under the null it is dominated by a
//! chi-square with `p - 1` degrees of freedom. `off_s` ignores the `p - beta` smallest
//! coordinates, which is what keeps it from diluting a shift confined to a few channels.

use std::cmp::Ordering;

use crate::{CusumSketchBank, WindowScratch};

/// Which statistic crossed its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Statistic {
    /// Dense, all-channel standardized sum of squares.
    Diag,
    /// Dense, off-diagonal squared norm.
    OffDense,
    /// Sparse, top-`beta` hard-thresholded squares.
    OffSparse,
}

impl Statistic {
    /// All statistics in reporting order.
    pub const ALL: [Statistic; 3] = [Statistic::Diag, Statistic::OffDense, Statistic::OffSparse];

    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Diag => "diag",
            Statistic::OffDense => "off_d",
            Statistic::OffSparse => "off_s",
        }
    }
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A statistic's value at its most significant scale.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleScore {
    pub value: f64,
    /// Length of the arg-max window (`0` if no scale contributed a positive value).
    pub window: u64,
}

impl ScaleScore {
    fn offer(&mut self, value: f64, window: u64) {
        if value > self.value {
            self.value = value;
            self.window = window;
        }
    }
}

/// The three statistics for one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scores {
    pub diag: ScaleScore,
    pub off_d: ScaleScore,
    pub off_s: ScaleScore,
}

impl Scores {
    pub fn get(&self, stat: Statistic) -> ScaleScore {
        match stat {
            Statistic::Diag => self.diag,
            Statistic::OffDense => self.off_d,
            Statistic::OffSparse => self.off_s,
        }
    }

    /// Component-wise maximum, used to track per-stream maxima.
    pub fn max_with(&mut self, other: &Scores) {
        self.diag.offer(other.diag.value, other.diag.window);
        self.off_d.offer(other.off_d.value, other.off_d.window);
        self.off_s.offer(other.off_s.value, other.off_s.window);
    }
}

/// Default hard-threshold `a = sqrt(2 ln(2p))` for the sparse statistic.
pub fn default_sparse_cutoff(dim: usize) -> f64 {
    (2.0 * (2.0 * dim.max(1) as f64).ln()).sqrt()
}

/// Combines the per-scale sketches into [`Scores`].
///
/// Owns its scratch space, so evaluation never allocates.
#[derive(Debug, Clone)]
pub struct StatisticAggregator {
    dim: usize,
    beta: usize,
    cutoff_sq: f64,
    scratch: WindowScratch,
    squares: Vec<f64>,
}

impl StatisticAggregator {
    /// `beta` is clamped into `1..=dim`; `sparse_cutoff` is the `a` in `|c_j| >= a`.
    pub fn new(dim: usize, beta: usize, sparse_cutoff: f64) -> Self {
        Self {
            dim,
            beta: beta.clamp(1, dim.max(1)),
            cutoff_sq: sparse_cutoff * sparse_cutoff,
            scratch: WindowScratch::new(dim),
            squares: vec![0.0; dim],
        }
    }

    pub fn beta(&self) -> usize {
        self.beta
    }

    pub fn sparse_cutoff(&self) -> f64 {
        self.cutoff_sq.sqrt()
    }

    /// Evaluate all three statistics over every filled scale of `bank`.
    pub fn evaluate(&mut self, bank: &CusumSketchBank) -> Scores {
        debug_assert_eq!(bank.dim(), self.dim);
        let p = self.dim as f64;
        let diag_norm = (2.0 * p).sqrt();
        let beta = self.beta;
        let cutoff_sq = self.cutoff_sq;
        let squares = &mut self.squares;
        let mut scores = Scores::default();

        bank.for_each_window(&mut self.scratch, |w| {
            let inv_len = 1.0 / w.len as f64;
            let mut total = 0.0;
            let mut max = 0.0_f64;
            for (s, &sum) in squares.iter_mut().zip(w.sums) {
                *s = sum * sum * inv_len;
                total += *s;
                max = max.max(*s);
            }

            scores.diag.offer((total - p) / diag_norm, w.len);
            scores.off_d.offer(total - max, w.len);
            scores.off_s.offer(top_k_thresholded(squares, beta, cutoff_sq), w.len);
        });
        scores
    }
}

/// Sum of the `k` largest entries that are `>= cutoff_sq`. Reorders `squares`.
fn top_k_thresholded(squares: &mut [f64], k: usize, cutoff_sq: f64) -> f64 {
    let top = if k < squares.len() {
        let (_, _, upper) =
            squares.select_nth_unstable_by(squares.len() - k - 1, |a, b| {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            });
        &*upper
    } else {
        &*squares
    };
    top.iter().filter(|&&s| s >= cutoff_sq).sum()
}
