//! Error taxonomy shared by every stage of the detector.

use crate::Status;

/// Errors returned by detector construction and ingestion.
///
/// Every variant is local and synchronous: the call that returns it leaves the
/// detector exactly as it was, so the caller can fix the input and retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// `freeze` was called before any baseline observation arrived.
    #[error("insufficient baseline data: at least one observation is required")]
    InsufficientData,

    /// An observation (or baseline) did not have the configured number of channels.
    #[error("dimension mismatch: expected {expected} channels, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The requested state-machine move is not allowed from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },

    /// A changepoint has already been declared; the detector is terminal until reset.
    #[error("changepoint already declared at monitoring step {step}")]
    AlreadyDeclared { step: u64 },

    /// An observation carried a NaN or infinite value.
    #[error("non-finite value {value} in channel {channel}")]
    NonFiniteObservation { channel: usize, value: f64 },

    /// A configuration or threshold value is out of its domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Check that `x` has `expected` finite entries.
pub(crate) fn check_observation(x: &[f64], expected: usize) -> Result<(), Error> {
    if x.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            got: x.len(),
        });
    }
    if let Some((channel, &value)) = x.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(Error::NonFiniteObservation { channel, value });
    }
    Ok(())
}
