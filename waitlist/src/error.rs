//! Error types for the waitlist engine.
//!
//! [`LedgerError`] is produced inside the reducer and travels back to the
//! caller inside a `CommandRejected` action, so it is `Clone` and
//! serializable. [`WaitlistError`] is what the service facade returns.

use crate::types::{EntryId, EventId, TicketId};
use fairqueue_runtime::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse class of a ledger failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or missing event/buyer reference
    Validation,
    /// Request conflicts with the current state
    Conflict,
}

impl ErrorKind {
    /// Label used for metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
        }
    }
}

/// Typed failure of a waitlist or ticket operation
///
/// Every variant means nothing was applied.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerError {
    /// Malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The catalog has no such event
    #[error("Event {0} not found")]
    NotFound(EventId),

    /// The event was cancelled
    #[error("Event {0} is cancelled")]
    EventCancelled(EventId),

    /// The buyer already holds a non-expired entry for the event
    #[error("Already in the waitlist for this event")]
    AlreadyQueued,

    /// No live offer behind this entry for this buyer
    #[error("No offer found for entry {0}")]
    OfferNotFound(EntryId),

    /// The offer's deadline has passed
    #[error("Offer for entry {0} has expired")]
    OfferExpired(EntryId),

    /// Unknown ticket
    #[error("Ticket {0} not found")]
    TicketNotFound(TicketId),

    /// The ticket is not `Valid`
    #[error("Ticket {0} has already been used")]
    AlreadyUsed(TicketId),

    /// Transition not allowed from the current status
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl LedgerError {
    /// Validation or conflict
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NotFound(_) | Self::EventCancelled(_) => {
                ErrorKind::Validation
            },
            Self::AlreadyQueued
            | Self::OfferNotFound(_)
            | Self::OfferExpired(_)
            | Self::TicketNotFound(_)
            | Self::AlreadyUsed(_)
            | Self::InvalidState(_) => ErrorKind::Conflict,
        }
    }
}

/// Errors returned by [`crate::WaitlistService`]
#[derive(Error, Debug)]
pub enum WaitlistError {
    /// The operation was rejected by the ledger
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The per-event store failed to answer
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The store answered with a reply of the wrong shape
    #[error("Unexpected outcome: expected {0}")]
    UnexpectedOutcome(&'static str),
}

impl WaitlistError {
    /// The ledger error, if this is one
    #[must_use]
    pub const fn as_ledger(&self) -> Option<&LedgerError> {
        match self {
            Self::Ledger(error) => Some(error),
            Self::Store(_) | Self::UnexpectedOutcome(_) => None,
        }
    }
}
