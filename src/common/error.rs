use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("transaction is not tracked by this node")]
    UnknownTransaction,
    #[error("transaction expired before a receipt was produced")]
    Expired,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

/// Why an inbound vote or confirm/challenge message was dropped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("unknown transaction")]
    UnknownTransaction,
    #[error("receipt already produced or transaction expired")]
    Finalized,
    #[error("phase no longer accepts this message")]
    PhaseClosed,
    #[error("signature does not verify for the claimed signer")]
    BadSignature,
    #[error("signer is not eligible for this transaction")]
    Ineligible,
    #[error("message refers to a vote other than the settled best vote")]
    StaleVote,
    #[error("already holding this message")]
    Duplicate,
    #[error("sender does not outrank the stored best")]
    NotBetter,
    #[error("malformed payload")]
    Malformed,
}

/// Why `try_produce_receipt` could not produce a receipt yet.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DeferReason {
    #[error("transaction is not tracked by this node")]
    UnknownTransaction,
    #[error("transaction expired")]
    Expired,
    #[error("confirm/challenge phase has not completed")]
    WaitingPhase,
    #[error("not enough matching votes, confirms or challenges")]
    NotEnoughVotes,
    #[error("robust query did not reach the required redundancy")]
    RobustQueryInconclusive,
    #[error("winning vote hash has no known vote body")]
    WinningVoteUnknown,
    #[error("another receipt attempt is in flight")]
    InProgress,
}
