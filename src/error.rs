//! Error taxonomy for contest operations.
//!
//! Guard rejections carry a specific [`Refusal`] and never mutate state.
//! Store failures on primary writes surface as [`ContestError::Store`].

use crate::types::{ContestCode, MatchId, Username};

/// Result type for contest operations
pub type ContestResult<T> = Result<T, ContestError>;

#[derive(Debug, thiserror::Error)]
pub enum ContestError {
    #[error("No active contest with code {0}")]
    NoActiveContest(ContestCode),

    #[error("Match {0} not found in the current round")]
    MatchNotFound(MatchId),

    #[error("No joker purchase recorded for {0}")]
    NoEntitlement(Username),

    #[error(transparent)]
    Rejected(#[from] Refusal),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl ContestError {
    pub fn refusal(&self) -> Option<&Refusal> {
        match self {
            ContestError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// Why a guarded operation was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("Both confirmations are required to wipe contest data")]
    ConfirmationRequired,

    #[error("Final results are locked")]
    ResultsLocked,

    #[error("Final results are already locked")]
    ResultsAlreadyLocked,

    #[error("Final results must be locked first")]
    ResultsNotLocked,

    #[error("The submission deadline has passed")]
    DeadlinePassed,

    #[error("The match list is locked")]
    MatchesLocked,

    #[error("The round already holds the maximum of {0} matches")]
    RoundFull(usize),

    #[error("Required field '{0}' is blank")]
    MissingField(&'static str),

    #[error("A match that is off cannot take a result")]
    MatchOff,

    #[error("'{0}' is not one of 1, X, 2")]
    InvalidOutcome(String),

    #[error("{0} match(es) that are on still have no result")]
    ResultsMissing(usize),

    #[error("Points for round {0} were already added")]
    RoundAlreadyScored(u32),

    #[error("The contest has started; prize and end date are frozen")]
    ContestStarted,

    #[error("No jokers left")]
    NoJokersLeft,

    #[error("Picks are locked for this round")]
    PicksLocked,

    #[error("The contest started before this account existed")]
    LateJoiner,

    #[error("The joker is applied through the joker toggle, not as a pick")]
    JokerNotAPick,

    #[error("Final week is not active")]
    FinalWeekInactive,

    #[error("Nobody has points yet")]
    EmptyLeaderboard,
}

/// Failure talking to an external store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
