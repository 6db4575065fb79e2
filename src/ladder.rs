//! Dyadic ladder of window scales.

use crate::Error;

/// Window scales `1, 2, 4, ..., 2^K` with `2^K <= max_scale < 2^(K+1)`.
///
/// Level `k` owns scale `2^k`. After `n` observations the level-`k` window covers the
/// trailing `2^k + (n mod 2^k)` observations: the most recently completed aligned
/// block of `2^k` plus the partial block that follows it. A level is *filled* once
/// its first block has completed (`n >= 2^k`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleLadder {
    levels: usize,
}

impl ScaleLadder {
    /// Largest supported level (`2^62` observations).
    pub const MAX_LEVELS: usize = 63;

    /// Build the ladder spanning `1..=max_scale`.
    pub fn new(max_scale: u64) -> Result<Self, Error> {
        if max_scale == 0 {
            return Err(Error::InvalidParameter(
                "max_scale must be at least 1".to_string(),
            ));
        }
        let levels = ((u64::BITS - max_scale.leading_zeros()) as usize).min(Self::MAX_LEVELS);
        Ok(Self { levels })
    }

    /// Number of levels (`K + 1`).
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Scale owned by `level`.
    pub fn scale(&self, level: usize) -> u64 {
        debug_assert!(level < self.levels);
        1u64 << level
    }

    /// Largest scale, `2^K`.
    pub fn max_scale(&self) -> u64 {
        self.scale(self.levels - 1)
    }

    /// All scales, finest first.
    pub fn scales(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.levels).map(|k| self.scale(k))
    }

    pub fn is_filled(&self, level: usize, steps: u64) -> bool {
        steps >= self.scale(level)
    }

    /// Length of the level-`level` window after `steps` observations, or `0` if unfilled.
    pub fn window_len(&self, level: usize, steps: u64) -> u64 {
        if !self.is_filled(level, steps) {
            return 0;
        }
        let b = self.scale(level);
        b + (steps & (b - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_cover_up_to_max_scale() {
        assert_eq!(ScaleLadder::new(1).unwrap().levels(), 1);
        assert_eq!(ScaleLadder::new(2).unwrap().levels(), 2);
        assert_eq!(ScaleLadder::new(3).unwrap().levels(), 2);
        assert_eq!(ScaleLadder::new(1024).unwrap().levels(), 11);
        let l = ScaleLadder::new(1_300_000).unwrap();
        assert_eq!(l.max_scale(), 1 << 20);
        assert_eq!(
            l.scales().take(4).collect::<Vec<_>>(),
            vec![1, 2, 4, 8]
        );
        assert!(ScaleLadder::new(0).is_err());
        assert_eq!(ScaleLadder::new(u64::MAX).unwrap().levels(), ScaleLadder::MAX_LEVELS);
    }

    #[test]
    fn window_len_stays_within_one_octave() {
        let l = ScaleLadder::new(64).unwrap();
        for steps in 1..500u64 {
            for k in 0..l.levels() {
                let len = l.window_len(k, steps);
                if steps < l.scale(k) {
                    assert_eq!(len, 0);
                } else {
                    assert!(len >= l.scale(k) && len < 2 * l.scale(k), "k={k} steps={steps}");
                    assert!(len <= steps);
                }
            }
        }
    }
}
