//! Multiscale CUSUM sketches maintained with a binary-counter merge.
//!
//! Each level `k` of the [`ScaleLadder`] owns two fixed accumulator slots per channel:
//!
//! - `latest[k]`: the sum of the most recently completed aligned block of `2^k`
//!   observations;
//! - `pending[k]`: a completed level-`k` block still waiting for its sibling. It is
//!   occupied exactly when bit `k` of the step count is set.
//!
//! A new observation completes a level-0 block. Completing a block at level `k`
//! either parks it in the empty `pending[k]` slot (the carry stops) or merges it with
//! the parked sibling into a level-`k+1` block (the carry continues), exactly like
//! incrementing a binary number:
//!
//! ```text
//!   step 5 (0b101)          step 6 (0b110)
//!   pending: [x5, -, x1..4]  pending: [-, x5..6, x1..4]
//!   latest:  [x5, x3..4, x1..4]  latest: [x6, x5..6, x1..4]
//! ```
//!
//! The trailing window of level `k` is `latest[k]` plus every occupied `pending[j]`
//! with `j < k`, which together cover the last `2^k + (n mod 2^k)` observations.
//! Storage is `2 * p * levels` floats regardless of how long the stream runs.

use crate::ScaleLadder;

/// A trailing window reconstructed from the sketch.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    pub level: usize,
    /// Number of observations covered.
    pub len: u64,
    /// Per-channel sums over the window.
    pub sums: &'a [f64],
}

/// Reusable buffers for [`CusumSketchBank::for_each_window`].
#[derive(Debug, Clone, Default)]
pub struct WindowScratch {
    open: Vec<f64>,
    sums: Vec<f64>,
}

impl WindowScratch {
    pub fn new(dim: usize) -> Self {
        Self {
            open: vec![0.0; dim],
            sums: vec![0.0; dim],
        }
    }
}

/// Per-scale, per-channel CUSUM accumulators in `O(p * log(max_scale))` memory.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CusumSketchBank {
    dim: usize,
    ladder: ScaleLadder,
    /// `levels * dim`, level-major.
    latest: Vec<f64>,
    /// `levels * dim`, level-major.
    pending: Vec<f64>,
    occupied: Vec<bool>,
    carry: Vec<f64>,
    steps: u64,
}

impl CusumSketchBank {
    pub fn new(dim: usize, ladder: ScaleLadder) -> Self {
        let slots = dim * ladder.levels();
        Self {
            dim,
            ladder,
            latest: vec![0.0; slots],
            pending: vec![0.0; slots],
            occupied: vec![false; ladder.levels()],
            carry: vec![0.0; dim],
            steps: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn ladder(&self) -> &ScaleLadder {
        &self.ladder
    }

    /// Observations folded in since construction or the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Fold one standardized observation into every level.
    ///
    /// Amortized `O(p)`; at most `O(p * levels)` when a carry ripples to the top.
    pub fn update(&mut self, z: &[f64]) {
        debug_assert_eq!(z.len(), self.dim);
        let d = self.dim;
        self.carry.copy_from_slice(z);
        self.steps += 1;

        let levels = self.ladder.levels();
        for k in 0..levels {
            let slot = k * d..(k + 1) * d;
            self.latest[slot.clone()].copy_from_slice(&self.carry);
            if !self.occupied[k] {
                self.pending[slot].copy_from_slice(&self.carry);
                self.occupied[k] = true;
                return;
            }
            self.occupied[k] = false;
            if k + 1 == levels {
                // The merged block would belong to a level beyond the ladder.
                return;
            }
            for (c, &p) in self.carry.iter_mut().zip(&self.pending[slot]) {
                *c += p;
            }
        }
    }

    /// Visit every filled level, finest first, in `O(p * levels)` total.
    pub fn for_each_window<F>(&self, scratch: &mut WindowScratch, mut visit: F)
    where
        F: FnMut(Window<'_>),
    {
        let d = self.dim;
        scratch.open.clear();
        scratch.open.resize(d, 0.0);
        scratch.sums.resize(d, 0.0);

        for k in 0..self.ladder.levels() {
            let len = self.ladder.window_len(k, self.steps);
            if len == 0 {
                break;
            }
            let slot = k * d..(k + 1) * d;
            for ((s, &l), &o) in scratch
                .sums
                .iter_mut()
                .zip(&self.latest[slot.clone()])
                .zip(&scratch.open)
            {
                *s = l + o;
            }
            visit(Window {
                level: k,
                len,
                sums: &scratch.sums,
            });
            if self.occupied[k] {
                for (o, &p) in scratch.open.iter_mut().zip(&self.pending[slot]) {
                    *o += p;
                }
            }
        }
    }

    /// Clear every accumulator.
    pub fn reset(&mut self) {
        self.latest.fill(0.0);
        self.pending.fill(0.0);
        self.occupied.fill(false);
        self.steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn windows(bank: &CusumSketchBank) -> Vec<(usize, u64, Vec<f64>)> {
        let mut scratch = WindowScratch::new(bank.dim());
        let mut out = Vec::new();
        bank.for_each_window(&mut scratch, |w| out.push((w.level, w.len, w.sums.to_vec())));
        out
    }

    #[test]
    fn empty_bank_has_no_windows() {
        let bank = CusumSketchBank::new(2, ScaleLadder::new(8).unwrap());
        assert!(windows(&bank).is_empty());
    }

    #[test]
    fn occupancy_tracks_binary_digits_of_step_count() {
        let ladder = ScaleLadder::new(16).unwrap();
        let mut bank = CusumSketchBank::new(1, ladder);
        for n in 1..=200u64 {
            bank.update(&[1.0]);
            for k in 0..ladder.levels() {
                assert_eq!(bank.occupied[k], (n >> k) & 1 == 1, "n={n} k={k}");
            }
        }
    }

    #[test]
    fn storage_is_fixed_by_the_ladder() {
        let ladder = ScaleLadder::new(16).unwrap();
        let mut bank = CusumSketchBank::new(3, ladder);
        let slots = 3 * ladder.levels();
        for i in 0..100_000u32 {
            let x = f64::from(i % 7) - 3.0;
            bank.update(&[x, -x, 0.5]);
        }
        assert_eq!(bank.steps(), 100_000);
        assert_eq!(bank.latest.len(), slots);
        assert_eq!(bank.pending.len(), slots);
        assert_eq!(bank.occupied.len(), ladder.levels());
        assert_eq!(bank.carry.len(), 3);

        let w = windows(&bank);
        assert_eq!(w.len(), ladder.levels());
        assert!(w.iter().all(|(_, len, _)| *len < 2 * ladder.max_scale()));
    }

    #[test]
    fn third_step_windows() {
        let mut bank = CusumSketchBank::new(2, ScaleLadder::new(4).unwrap());
        bank.update(&[1.0, 10.0]);
        bank.update(&[2.0, 20.0]);
        bank.update(&[4.0, 40.0]);
        let w = windows(&bank);
        assert_eq!(w.len(), 2);
        assert_eq!(w[0], (0, 1, vec![4.0, 40.0]));
        assert_eq!(w[1], (1, 3, vec![7.0, 70.0]));
    }

    #[test]
    fn reset_clears_everything() {
        let mut bank = CusumSketchBank::new(1, ScaleLadder::new(8).unwrap());
        for _ in 0..11 {
            bank.update(&[3.0]);
        }
        bank.reset();
        assert_eq!(bank.steps(), 0);
        assert!(windows(&bank).is_empty());
        bank.update(&[1.0]);
        assert_eq!(windows(&bank), vec![(0, 1, vec![1.0])]);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
        #[test]
        fn windows_equal_brute_force_trailing_sums(
            xs in prop::collection::vec(-100i32..100, 1..300),
            max_scale in 1u64..80,
        ) {
            // Integer-valued inputs keep the float sums exact.
            let ladder = ScaleLadder::new(max_scale).unwrap();
            let mut bank = CusumSketchBank::new(1, ladder);
            let mut history: Vec<f64> = Vec::new();
            for &x in &xs {
                let x = f64::from(x);
                bank.update(&[x]);
                history.push(x);
                let n = history.len() as u64;
                let seen = windows(&bank);
                let expected_levels = (0..ladder.levels())
                    .filter(|&k| ladder.is_filled(k, n))
                    .count();
                prop_assert_eq!(seen.len(), expected_levels);
                for (k, len, sums) in seen {
                    prop_assert_eq!(len, ladder.window_len(k, n));
                    let start = history.len() - len as usize;
                    let brute: f64 = history[start..].iter().sum();
                    prop_assert_eq!(sums[0], brute, "k={} n={}", k, n);
                }
            }
        }
    }
}
