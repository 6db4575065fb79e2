//! The detector state machine: `Estimating -> Monitoring -> Declared`.

use tracing::{debug, info, warn};

use crate::aggregate::default_sparse_cutoff;
use crate::error::check_observation;
use crate::{
    BaselineStats, CusumSketchBank, Error, RunningMoments, ScaleLadder, Scores, Standardizer,
    Statistic, StatisticAggregator, Thresholds,
};

/// Default patience (expected steps to a false alarm).
pub const DEFAULT_PATIENCE: u64 = 5_000;

/// Detector configuration.
///
/// ```rust
/// use ocdetect::DetectorConfig;
///
/// let cfg = DetectorConfig {
///     beta: 3,
///     patience: 100_000,
///     ..DetectorConfig::new(39)
/// };
/// assert_eq!(cfg.dim, 39);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectorConfig {
    /// Number of channels `p`.
    pub dim: usize,
    /// Assumed number of channels affected by a sparse change (`1..=dim`).
    pub beta: usize,
    /// Expected run length to a false alarm; also the largest window scale.
    pub patience: u64,
    /// Precomputed thresholds. When `None` they are derived from `patience` and `beta`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub thresholds: Option<Thresholds>,
    /// Hard threshold `a` on `|c_j|` for the sparse statistic.
    /// When `None`, `sqrt(2 ln(2p))` is used.
    #[cfg_attr(feature = "serde", serde(default))]
    pub sparse_cutoff: Option<f64>,
}

impl DetectorConfig {
    /// Defaults for `dim` channels: `beta = floor(sqrt(dim))`, patience [`DEFAULT_PATIENCE`].
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            beta: ((dim as f64).sqrt().floor() as usize).max(1),
            patience: DEFAULT_PATIENCE,
            thresholds: None,
            sparse_cutoff: None,
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
        if self.patience == 0 {
            return Err(Error::InvalidParameter(
                "patience must be at least 1".to_string(),
            ));
        }
        if let Some(a) = self.sparse_cutoff {
            if !a.is_finite() || a < 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "sparse_cutoff must be finite and non-negative, got {a}"
                )));
            }
        }
        if let Some(t) = &self.thresholds {
            t.validate()?;
        }
        Ok(())
    }
}

/// Externally visible detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    Estimating,
    Monitoring,
    /// Terminal; carries the 1-based monitoring step of the declaration.
    Declared(u64),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Estimating => f.write_str("estimating"),
            Status::Monitoring => f.write_str("monitoring"),
            Status::Declared(step) => write!(f, "declared({step})"),
        }
    }
}

/// A declared changepoint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Declaration {
    /// 1-based monitoring step at which the first crossing occurred.
    pub step: u64,
    /// Every statistic that crossed on that step, in [`Statistic::ALL`] order. Never empty.
    pub triggers: Vec<Statistic>,
    /// Scores at the declaring step.
    pub scores: Scores,
}

impl Declaration {
    /// The primary trigger (first in [`Statistic::ALL`] order).
    pub fn trigger(&self) -> Statistic {
        self.triggers[0]
    }

    /// First step of the window that maximized the primary statistic.
    ///
    /// A rough retrospective estimate of where the change began.
    pub fn estimated_onset(&self) -> u64 {
        let w = self.scores.get(self.trigger()).window;
        self.step + 1 - w.clamp(1, self.step)
    }
}

/// Result of one [`ChangepointDetector::ingest`] call.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    Continue,
    Declared(Declaration),
}

impl Outcome {
    pub fn is_declared(&self) -> bool {
        matches!(self, Outcome::Declared(_))
    }

    /// The declared step, if any.
    pub fn declared_step(&self) -> Option<u64> {
        match self {
            Outcome::Continue => None,
            Outcome::Declared(d) => Some(d.step),
        }
    }
}

#[derive(Debug, Clone)]
struct Monitor {
    standardizer: Standardizer,
    bank: CusumSketchBank,
    aggregator: StatisticAggregator,
    z: Vec<f64>,
    last: Option<Scores>,
}

/// `Declared` is `Monitoring` with a declaration recorded; the sketches stay readable.
#[derive(Debug, Clone)]
enum State {
    Estimating(RunningMoments),
    Monitoring {
        monitor: Box<Monitor>,
        declaration: Option<Declaration>,
    },
}

/// Online multiscale mean-shift changepoint detector.
///
/// Feed baseline observations while [`Status::Estimating`], switch with
/// [`start_monitoring`](Self::start_monitoring), then ingest until a change is declared.
///
/// ```rust
/// use ocdetect::{ChangepointDetector, DetectorConfig, Outcome, Thresholds};
///
/// let cfg = DetectorConfig {
///     thresholds: Some(Thresholds::new(1.0, 1.0, 1.0)?),
///     ..DetectorConfig::new(2)
/// };
/// let mut det = ChangepointDetector::new(cfg)?;
/// for x in [[0.5, -0.5], [-0.5, 0.5], [0.0, 0.0]] {
///     det.ingest(&x)?;
/// }
/// det.start_monitoring()?;
/// assert_eq!(det.ingest(&[0.0, 0.0])?, Outcome::Continue);
/// let out = det.ingest(&[6.0, 6.0])?;
/// assert_eq!(out.declared_step(), Some(2));
/// # Ok::<(), ocdetect::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ChangepointDetector {
    config: DetectorConfig,
    thresholds: Thresholds,
    ladder: ScaleLadder,
    sparse_cutoff: f64,
    state: State,
}

impl ChangepointDetector {
    /// Validate `config`, derive thresholds if needed, and start in [`Status::Estimating`].
    pub fn new(config: DetectorConfig) -> Result<Self, Error> {
        config.validate()?;
        let thresholds = match config.thresholds {
            Some(t) => t,
            None => Thresholds::from_patience(config.dim, config.patience, config.beta)?,
        };
        let ladder = ScaleLadder::new(config.patience)?;
        let sparse_cutoff = config
            .sparse_cutoff
            .unwrap_or_else(|| default_sparse_cutoff(config.dim));
        debug!(
            dim = config.dim,
            beta = config.beta,
            patience = config.patience,
            levels = ladder.levels(),
            th_diag = thresholds.diag,
            th_off_d = thresholds.off_d,
            th_off_s = thresholds.off_s,
            "changepoint detector created"
        );
        Ok(Self {
            state: State::Estimating(RunningMoments::new(config.dim)),
            config,
            thresholds,
            ladder,
            sparse_cutoff,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn ladder(&self) -> &ScaleLadder {
        &self.ladder
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn status(&self) -> Status {
        match &self.state {
            State::Estimating(_) => Status::Estimating,
            State::Monitoring {
                declaration: None, ..
            } => Status::Monitoring,
            State::Monitoring {
                declaration: Some(d),
                ..
            } => Status::Declared(d.step),
        }
    }

    /// Observations folded into the baseline so far (or that the frozen baseline used).
    pub fn baseline_samples(&self) -> u64 {
        match &self.state {
            State::Estimating(m) => m.count(),
            State::Monitoring { monitor, .. } => monitor.standardizer.baseline().samples(),
        }
    }

    /// Frozen baseline, once monitoring has started.
    pub fn baseline(&self) -> Option<&BaselineStats> {
        self.monitor().map(|m| m.standardizer.baseline())
    }

    /// Channels pinned to zero because their baseline sd is zero, non-finite or subnormal.
    pub fn degenerate_channels(&self) -> &[usize] {
        self.monitor()
            .map(|m| m.standardizer.degenerate_channels())
            .unwrap_or(&[])
    }

    /// Monitoring steps processed so far.
    pub fn monitoring_steps(&self) -> u64 {
        self.monitor().map(|m| m.bank.steps()).unwrap_or(0)
    }

    /// Scores computed by the most recent monitoring step.
    pub fn last_scores(&self) -> Option<&Scores> {
        self.monitor().and_then(|m| m.last.as_ref())
    }

    pub fn declaration(&self) -> Option<&Declaration> {
        match &self.state {
            State::Estimating(_) => None,
            State::Monitoring { declaration, .. } => declaration.as_ref(),
        }
    }

    fn monitor(&self) -> Option<&Monitor> {
        match &self.state {
            State::Estimating(_) => None,
            State::Monitoring { monitor, .. } => Some(&**monitor),
        }
    }

    /// Freeze the baseline accumulated so far and start monitoring.
    pub fn start_monitoring(&mut self) -> Result<(), Error> {
        let baseline = match &self.state {
            State::Estimating(moments) => moments.freeze()?,
            _ => return Err(self.invalid_transition(Status::Monitoring)),
        };
        self.enter_monitoring(baseline);
        Ok(())
    }

    /// Start monitoring against a caller-supplied baseline, discarding any estimate.
    pub fn start_monitoring_with(&mut self, baseline: BaselineStats) -> Result<(), Error> {
        if !matches!(self.state, State::Estimating(_)) {
            return Err(self.invalid_transition(Status::Monitoring));
        }
        if baseline.dim() != self.config.dim {
            return Err(Error::DimensionMismatch {
                expected: self.config.dim,
                got: baseline.dim(),
            });
        }
        self.enter_monitoring(baseline);
        Ok(())
    }

    /// Request a state change. Only `Estimating -> Monitoring` is a legal request;
    /// declarations happen through [`ingest`](Self::ingest).
    pub fn set_status(&mut self, target: Status) -> Result<(), Error> {
        match target {
            Status::Monitoring => self.start_monitoring(),
            other => Err(self.invalid_transition(other)),
        }
    }

    /// Drop all baseline, sketch and declaration state and return to `Estimating`.
    ///
    /// Configuration and thresholds are kept.
    pub fn reset(&mut self) {
        debug!(from = %self.status(), "changepoint detector reset");
        self.state = State::Estimating(RunningMoments::new(self.config.dim));
    }

    /// Process the next observation in time order.
    pub fn ingest(&mut self, x: &[f64]) -> Result<Outcome, Error> {
        let (monitor, declared) = match &mut self.state {
            State::Estimating(moments) => {
                moments.update(x)?;
                return Ok(Outcome::Continue);
            }
            State::Monitoring {
                declaration: Some(d),
                ..
            } => return Err(Error::AlreadyDeclared { step: d.step }),
            State::Monitoring {
                monitor,
                declaration,
            } => (monitor, declaration),
        };

        check_observation(x, self.config.dim)?;
        monitor.standardizer.standardize_into(x, &mut monitor.z);
        monitor.bank.update(&monitor.z);
        let scores = monitor.aggregator.evaluate(&monitor.bank);
        monitor.last = Some(scores);

        let triggers = self.thresholds.crossed(&scores);
        if triggers.is_empty() {
            return Ok(Outcome::Continue);
        }

        let declaration = Declaration {
            step: monitor.bank.steps(),
            triggers,
            scores,
        };
        info!(
            step = declaration.step,
            trigger = %declaration.trigger(),
            crossed = declaration.triggers.len(),
            onset = declaration.estimated_onset(),
            "changepoint declared"
        );
        *declared = Some(declaration.clone());
        Ok(Outcome::Declared(declaration))
    }

    /// Ingest `rows` in order, stopping at the first declaration.
    ///
    /// Returns the declaration if one occurred. Rows after it are not consumed.
    pub fn ingest_all<'a, I>(&mut self, rows: I) -> Result<Option<Declaration>, Error>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        for row in rows {
            if let Outcome::Declared(d) = self.ingest(row)? {
                return Ok(Some(d));
            }
        }
        Ok(None)
    }

    fn enter_monitoring(&mut self, baseline: BaselineStats) {
        let dim = self.config.dim;
        let standardizer = Standardizer::new(baseline);
        debug!(
            dim,
            samples = standardizer.baseline().samples(),
            "baseline frozen, monitoring started"
        );
        if !standardizer.degenerate_channels().is_empty() {
            warn!(
                channels = ?standardizer.degenerate_channels(),
                "degenerate baseline channels will contribute no signal"
            );
        }
        self.state = State::Monitoring {
            monitor: Box::new(Monitor {
                standardizer,
                bank: CusumSketchBank::new(dim, self.ladder),
                aggregator: StatisticAggregator::new(dim, self.config.beta, self.sparse_cutoff),
                z: vec![0.0; dim],
                last: None,
            }),
            declaration: None,
        };
    }

    fn invalid_transition(&self, to: Status) -> Error {
        Error::InvalidTransition {
            from: self.status(),
            to,
        }
    }
}
