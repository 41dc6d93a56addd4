//! Error taxonomy surfaced to the orchestrator (§7). One typed variant per failure kind
//! in the policy table, matched exhaustively rather than sniffed out of strings.

use crate::types::SatelliteId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A subframe's parity check failed. Drop the pipeline and its parameters.
    #[error("satellite {satellite_id}: parity check failed ({detail})")]
    Parity {
        satellite_id: SatelliteId,
        detail: &'static str,
    },

    /// The BitIntegrator scanned all 300 candidate offsets without matching the TLM
    /// preamble in either polarity. Drop the pipeline.
    #[error("satellite {satellite_id}: could not determine bit phase")]
    UnknownBitPhase { satellite_id: SatelliteId },
}

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The file antenna ran out of samples. Not a bug: terminate the process cleanly.
    #[error("end of sample stream")]
    EndOfStream,

    /// A precondition that should be unreachable by construction was violated. Always
    /// fatal; there is no recovery policy for it because there is no theory for why it
    /// happened.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Panics with an `InvariantViolation`-shaped message if `cond` is false. Mirrors the
/// assert-with-message idiom this codebase's antecedents use for preconditions that are
/// bugs, not recoverable failures, rather than returning a `Result` a caller might try to
/// handle.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err($crate::error::ReceiverError::InvariantViolation(format!($($arg)*)));
        }
    };
}
