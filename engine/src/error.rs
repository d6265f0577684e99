//! Race engine error taxonomy.
//!
//! Every operation returns a specific kind rather than a generic failure.
//! All of these are recoverable by the caller: retry, reload state, or
//! surface to the user. None are fatal to the process.

use shared::RaceStatus;
use store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    /// The operation is not legal in the race's current lifecycle state.
    #[error("operation not allowed while race is {status}")]
    InvalidState { status: RaceStatus },

    /// A lifecycle transition outside the fixed waiting → countdown →
    /// started → finished order was attempted. State is left unchanged.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: RaceStatus, to: RaceStatus },

    /// The conflict-safe write underneath this operation exhausted its retry
    /// budget.
    #[error("conflict-safe write gave up: {0}")]
    ContendedWrite(#[from] StoreError),

    /// The session expired or never existed.
    #[error("room '{0}' is closed or does not exist")]
    RoomClosed(String),

    /// A caller-supplied precondition (step range, non-empty roster,
    /// unused room id, membership) was unmet.
    #[error("precondition failed: {0}")]
    Precondition(String),
}
