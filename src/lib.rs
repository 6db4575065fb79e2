//! `ocdetect`: online, multiscale detection of mean shifts in high-dimensional streams.
//!
//! Designed for "watch many sensors, raise one alarm" problems: you have `p` channels
//! (seismometer components, host metrics, model features) sampled in lockstep, a
//! stretch of data you trust as pre-change, and you want to know the first moment the
//! mean of *some* subset of channels has moved, without knowing in advance how many
//! channels move or by how much.
//!
//! The detector ingests one `p`-vector per call. Memory and per-step work are
//! `O(p log gamma)`, independent of how long the stream has been running.
//!
//! **Goals:**
//! - **Online**: one observation in, one decision out; no batch re-scans.
//! - **Bounded**: a fixed ladder of dyadic windows maintained with a binary-counter
//!   merge, never a raw history buffer.
//! - **Calibrated**: thresholds derived from the patience `gamma`, the desired expected
//!   number of steps before a false alarm.
//! - **Deterministic**: same config + same stream → same decisions.
//!
//! **Non-goals:**
//! - Offline changepoint estimation over a fixed batch.
//! - Variance or trend changes; only mean shifts are targeted.
//! - Estimating the change magnitude.
//!
//! # Lifecycle
//!
//! ```text
//!   Estimating ──start_monitoring()──► Monitoring ──statistic > threshold──► Declared(step)
//!       │                                  │
//!   RunningMoments                 Standardizer → CusumSketchBank → StatisticAggregator
//! ```
//!
//! While estimating, observations feed per-channel Welford accumulators. Starting to
//! monitor freezes them into a [`BaselineStats`]; from then on each observation is
//! z-scored, folded into the sketch bank, and summarized by three statistics:
//!
//! - **diag**: standardized sum of squared per-channel CUSUMs (dense, any direction);
//! - **off_d**: squared CUSUM norm without its leading coordinate (dense);
//! - **off_s**: top-`beta` hard-thresholded squares (sparse).
//!
//! Each is maximized over the window ladder. The first step at which any of them
//! exceeds its threshold is declared; the declaration records which statistics crossed
//! and at what window, which separates dense from sparse changes after the fact.
//!
//! # Example
//!
//! ```rust
//! use ocdetect::{BaselineStats, ChangepointDetector, DetectorConfig, Status};
//!
//! let cfg = DetectorConfig { beta: 2, patience: 10_000, ..DetectorConfig::new(8) };
//! let mut det = ChangepointDetector::new(cfg)?;
//! det.start_monitoring_with(BaselineStats::new(vec![0.0; 8], vec![1.0; 8])?)?;
//!
//! // A persistent shift of 3 sigma on two of eight channels.
//! let mut x = [0.0; 8];
//! x[1] = 3.0;
//! x[6] = -3.0;
//! let rows = vec![x; 200];
//! let decl = det.ingest_all(rows.iter().map(|r| r.as_slice()))?.expect("shift is declared");
//!
//! assert_eq!(det.status(), Status::Declared(decl.step));
//! assert!(decl.step < 20);
//! println!("declared at {} by {}", decl.step, decl.trigger());
//! # Ok::<(), ocdetect::Error>(())
//! ```
//!
//! # Features
//!
//! - `serde`: `Serialize`/`Deserialize` for configs, thresholds, scores and outcomes.
//! - `stochastic`: Monte Carlo threshold calibration ([`calibrate_thresholds`]).
//!
//! Logging goes through `tracing`; the crate never installs a subscriber.

#![forbid(unsafe_code)]

mod error;
pub use error::Error;

mod moments;
pub use moments::*;

mod standardize;
pub use standardize::*;

mod ladder;
pub use ladder::*;

mod sketch;
pub use sketch::*;

mod aggregate;
pub use aggregate::*;

mod threshold;
pub use threshold::*;

pub mod calibrate;
pub use calibrate::{threshold_from_max_scores, wilson_bounds, ThresholdCalibration};
#[cfg(feature = "stochastic")]
pub use calibrate::{calibrate_thresholds, simulate_null_max_scores};

mod detector;
pub use detector::*;
