//! The per-event waitlist reducer.
//!
//! One reducer owns one event's waitlist and ticket ledger. Its command
//! handlers are split by concern:
//! - [`waitlist`]: joining the queue
//! - [`offers`]: arming, expiring, releasing and sweeping offers
//! - [`admission`]: promoting waiting buyers into freed capacity
//! - [`tickets`]: purchase, validation, cancellation and status changes
//!
//! Every command is validated in full before any event is applied, then
//! answered with exactly one reply action (`CommandCompleted` or
//! `CommandRejected`) carrying the caller's `request_id`.

pub mod admission;
pub mod offers;
pub mod tickets;
pub mod waitlist;

use crate::catalog::EventCatalog;
use crate::error::LedgerError;
use crate::types::{
    EntryId, EntryStatus, EventRecord, JoinReceipt, RequestId, Ticket, TicketId, TicketStatus,
    UserId, ValidationOutcome, WaitlistEntry, WaitlistState,
};
use chrono::{DateTime, Duration, Utc};
use fairqueue_core::{async_effect, effect::Effect, environment::Clock, reducer::Reducer, SmallVec};
use fairqueue_macros::Action;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Effects returned by one reducer call
pub type Effects = SmallVec<[Effect<WaitlistAction>; 4]>;

// ============================================================================
// Actions (Commands + Events + Replies)
// ============================================================================

/// Actions for one event's waitlist store
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum WaitlistAction {
    // Commands
    /// Join the waitlist
    #[command]
    JoinWaitlist {
        /// Correlation id
        request_id: RequestId,
        /// Joining buyer
        buyer_id: UserId,
    },

    /// Expire an offer whose deadline has passed
    #[command]
    ExpireOffer {
        /// Correlation id
        request_id: RequestId,
        /// Entry holding the offer
        entry_id: EntryId,
    },

    /// Give an offer back voluntarily
    #[command]
    ReleaseOffer {
        /// Correlation id
        request_id: RequestId,
        /// Entry holding the offer
        entry_id: EntryId,
    },

    /// Expire every lapsed offer
    #[command]
    SweepExpiredOffers {
        /// Correlation id
        request_id: RequestId,
    },

    /// Promote waiting buyers into free capacity
    #[command]
    Reconcile {
        /// Correlation id
        request_id: RequestId,
    },

    /// Turn a live offer into a ticket
    #[command]
    PurchaseTicket {
        /// Correlation id
        request_id: RequestId,
        /// Entry holding the offer
        entry_id: EntryId,
        /// Buyer paying for it
        buyer_id: UserId,
    },

    /// Scan a ticket at the door
    #[command]
    ValidateTicket {
        /// Correlation id
        request_id: RequestId,
        /// Ticket being scanned
        ticket_id: TicketId,
        /// User attempting the scan
        requester_id: UserId,
        /// Owner the requester claims to act for
        event_owner_id: UserId,
    },

    /// Refund every seated ticket of a cancelled event
    #[command]
    CancelAllTickets {
        /// Correlation id
        request_id: RequestId,
    },

    /// Move a ticket to a new status
    #[command]
    UpdateTicketStatus {
        /// Correlation id
        request_id: RequestId,
        /// Ticket to update
        ticket_id: TicketId,
        /// Target status
        status: TicketStatus,
    },

    // Events
    /// A buyer joined
    #[event]
    EntryJoined {
        /// New entry
        entry_id: EntryId,
        /// Joining buyer
        buyer_id: UserId,
        /// `Offered` or `Waiting`
        status: EntryStatus,
        /// Deadline when offered on join
        offer_expires_at: Option<DateTime<Utc>>,
        /// Join time
        joined_at: DateTime<Utc>,
        /// FIFO tie-break
        sequence: u64,
    },

    /// A waiting entry was promoted
    #[event]
    OfferGranted {
        /// Promoted entry
        entry_id: EntryId,
        /// New deadline
        offer_expires_at: DateTime<Utc>,
        /// Promotion time
        granted_at: DateTime<Utc>,
    },

    /// An offer lapsed
    #[event]
    OfferExpired {
        /// Entry that lost its offer
        entry_id: EntryId,
        /// When it was expired
        expired_at: DateTime<Utc>,
    },

    /// An offer was given back
    #[event]
    OfferReleased {
        /// Entry that gave up its offer
        entry_id: EntryId,
        /// When it was released
        released_at: DateTime<Utc>,
    },

    /// An offer was consumed by a purchase
    #[event]
    TicketPurchased {
        /// New ticket
        ticket_id: TicketId,
        /// Entry whose offer was consumed
        entry_id: EntryId,
        /// Ticket holder
        buyer_id: UserId,
        /// Purchase time
        purchased_at: DateTime<Utc>,
    },

    /// A ticket changed status
    #[event]
    TicketStatusChanged {
        /// Ticket
        ticket_id: TicketId,
        /// New status
        status: TicketStatus,
        /// Change time
        changed_at: DateTime<Utc>,
    },

    // Replies
    /// The command with `request_id` succeeded
    #[reply]
    CommandCompleted {
        /// Correlation id
        request_id: RequestId,
        /// What happened
        outcome: CommandOutcome,
    },

    /// The command with `request_id` was rejected; nothing was applied
    #[reply]
    CommandRejected {
        /// Correlation id
        request_id: RequestId,
        /// Why
        error: LedgerError,
    },
}

impl WaitlistAction {
    /// The request a reply answers
    #[must_use]
    pub const fn reply_to(&self) -> Option<RequestId> {
        match self {
            Self::CommandCompleted { request_id, .. } | Self::CommandRejected { request_id, .. } => {
                Some(*request_id)
            },
            _ => None,
        }
    }
}

/// Successful result of a command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// Join accepted
    Joined(JoinReceipt),
    /// Expire processed; `expired` is false when it was a no-op
    OfferExpired {
        /// Whether the entry transitioned
        expired: bool,
        /// Entries promoted into the freed capacity
        promoted: Vec<EntryId>,
    },
    /// Release processed
    OfferReleased {
        /// Entries promoted into the freed capacity
        promoted: Vec<EntryId>,
    },
    /// Sweep processed
    Swept {
        /// Entries that were expired
        expired: Vec<EntryId>,
        /// Entries promoted afterwards
        promoted: Vec<EntryId>,
    },
    /// Reconcile processed
    Reconciled {
        /// Entries promoted
        promoted: Vec<EntryId>,
    },
    /// Ticket issued
    Purchased(Ticket),
    /// Validation attempted
    Validated(ValidationOutcome),
    /// Tickets refunded
    TicketsRefunded {
        /// Tickets moved to `Refunded`
        refunded: Vec<TicketId>,
    },
    /// Ticket status changed
    TicketUpdated {
        /// Ticket after the change
        ticket: Ticket,
        /// Entries promoted into a freed seat
        promoted: Vec<EntryId>,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the waitlist reducer
#[derive(Clone)]
pub struct WaitlistEnvironment {
    /// Clock for deadlines and timestamps
    pub clock: Arc<dyn Clock>,
    /// Event metadata
    pub catalog: Arc<dyn EventCatalog>,
    /// Offer lifetime
    pub offer_ttl: Duration,
}

impl WaitlistEnvironment {
    /// Creates a new `WaitlistEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, catalog: Arc<dyn EventCatalog>, offer_ttl: Duration) -> Self {
        Self {
            clock,
            catalog,
            offer_ttl,
        }
    }

    /// Deadline for an offer granted at `now`, saturating at the latest
    /// representable instant
    #[must_use]
    pub fn offer_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.offer_ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for one event's waitlist and tickets
#[derive(Clone, Debug, Default)]
pub struct WaitlistReducer;

impl WaitlistReducer {
    /// Creates a new `WaitlistReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Catalog record for the state's event, rejecting unknown and cancelled events
    fn live_event(state: &WaitlistState, env: &WaitlistEnvironment) -> Result<EventRecord, LedgerError> {
        let record = env
            .catalog
            .event(&state.event_id)
            .ok_or(LedgerError::NotFound(state.event_id))?;
        if record.is_cancelled {
            return Err(LedgerError::EventCancelled(state.event_id));
        }
        Ok(record)
    }

    /// Applies an event to state
    fn apply_event(state: &mut WaitlistState, action: &WaitlistAction) {
        match action {
            WaitlistAction::EntryJoined {
                entry_id,
                buyer_id,
                status,
                offer_expires_at,
                joined_at,
                sequence,
            } => {
                let entry = WaitlistEntry {
                    entry_id: *entry_id,
                    event_id: state.event_id,
                    buyer_id: buyer_id.clone(),
                    status: *status,
                    offer_expires_at: *offer_expires_at,
                    created_at: *joined_at,
                    sequence: *sequence,
                };
                state.push_entry(entry);
            },

            WaitlistAction::OfferGranted {
                entry_id,
                offer_expires_at,
                ..
            } => {
                if let Some(entry) = state.entry_mut(entry_id) {
                    entry.status = EntryStatus::Offered;
                    entry.offer_expires_at = Some(*offer_expires_at);
                }
            },

            WaitlistAction::OfferExpired { entry_id, .. }
            | WaitlistAction::OfferReleased { entry_id, .. } => {
                if let Some(entry) = state.entry_mut(entry_id) {
                    entry.status = EntryStatus::Expired;
                    entry.offer_expires_at = None;
                }
            },

            WaitlistAction::TicketPurchased {
                ticket_id,
                entry_id,
                buyer_id,
                purchased_at,
            } => {
                if let Some(entry) = state.entry_mut(entry_id) {
                    entry.status = EntryStatus::Purchased;
                    entry.offer_expires_at = None;
                }
                let ticket = Ticket {
                    ticket_id: *ticket_id,
                    event_id: state.event_id,
                    buyer_id: buyer_id.clone(),
                    entry_id: *entry_id,
                    status: TicketStatus::Valid,
                    purchased_at: *purchased_at,
                    updated_at: *purchased_at,
                };
                state.push_ticket(ticket);
            },

            WaitlistAction::TicketStatusChanged {
                ticket_id,
                status,
                changed_at,
            } => {
                if let Some(ticket) = state.ticket_mut(ticket_id) {
                    ticket.status = *status;
                    ticket.updated_at = *changed_at;
                }
            },

            // Commands and replies don't modify state
            WaitlistAction::JoinWaitlist { .. }
            | WaitlistAction::ExpireOffer { .. }
            | WaitlistAction::ReleaseOffer { .. }
            | WaitlistAction::SweepExpiredOffers { .. }
            | WaitlistAction::Reconcile { .. }
            | WaitlistAction::PurchaseTicket { .. }
            | WaitlistAction::ValidateTicket { .. }
            | WaitlistAction::CancelAllTickets { .. }
            | WaitlistAction::UpdateTicketStatus { .. }
            | WaitlistAction::CommandCompleted { .. }
            | WaitlistAction::CommandRejected { .. } => {},
        }
    }

    /// Append the reply for `request_id`
    ///
    /// A rejection discards any effects gathered so far, so a failed command
    /// never arms a timer.
    fn respond(
        command: &'static str,
        request_id: RequestId,
        result: Result<CommandOutcome, LedgerError>,
        mut effects: Effects,
    ) -> Effects {
        let reply = match result {
            Ok(outcome) => WaitlistAction::CommandCompleted { request_id, outcome },
            Err(error) => {
                tracing::debug!(command, %request_id, %error, "Command rejected");
                crate::metrics::record_rejection(command, error.kind());
                effects.clear();
                WaitlistAction::CommandRejected { request_id, error }
            },
        };
        effects.push(async_effect! { Some(reply) });
        effects
    }
}

impl Reducer for WaitlistReducer {
    type State = WaitlistState;
    type Action = WaitlistAction;
    type Environment = WaitlistEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        // Replies are observed by callers; the reducer ignores them
        if action.is_reply() {
            return Effects::new();
        }

        // Events (replayed history)
        if action.is_event() {
            tracing::trace!(event_type = action.event_type(), "Applying event");
            Self::apply_event(state, &action);
            return Effects::new();
        }

        let command = action.name();
        let mut effects = Effects::new();

        let (request_id, result) = match action {
            WaitlistAction::JoinWaitlist { request_id, buyer_id } => (
                request_id,
                Self::join(state, env, buyer_id, &mut effects).map(CommandOutcome::Joined),
            ),

            WaitlistAction::ExpireOffer { request_id, entry_id } => (
                request_id,
                Self::expire(state, env, entry_id, &mut effects),
            ),

            WaitlistAction::ReleaseOffer { request_id, entry_id } => (
                request_id,
                Self::release(state, env, entry_id, &mut effects),
            ),

            WaitlistAction::SweepExpiredOffers { request_id } => {
                (request_id, Ok(Self::sweep(state, env, &mut effects)))
            },

            WaitlistAction::Reconcile { request_id } => {
                let promoted = Self::reconcile(state, env, &mut effects);
                (request_id, Ok(CommandOutcome::Reconciled { promoted }))
            },

            WaitlistAction::PurchaseTicket {
                request_id,
                entry_id,
                buyer_id,
            } => (
                request_id,
                Self::purchase(state, env, entry_id, &buyer_id).map(CommandOutcome::Purchased),
            ),

            WaitlistAction::ValidateTicket {
                request_id,
                ticket_id,
                requester_id,
                event_owner_id,
            } => (
                request_id,
                Self::validate(state, env, ticket_id, &requester_id, &event_owner_id)
                    .map(CommandOutcome::Validated),
            ),

            WaitlistAction::CancelAllTickets { request_id } => {
                let refunded = Self::cancel_all(state, env);
                (request_id, Ok(CommandOutcome::TicketsRefunded { refunded }))
            },

            WaitlistAction::UpdateTicketStatus {
                request_id,
                ticket_id,
                status,
            } => (
                request_id,
                Self::update_ticket_status(state, env, ticket_id, status, &mut effects),
            ),

            // Events and replies returned above
            _ => return Effects::new(),
        };

        Self::respond(command, request_id, result, effects)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::catalog::InMemoryEventCatalog;
    use crate::types::{EventId, EventRecord};
    use fairqueue_testing::{mock_clock, MockClock};

    /// Reducer fixture: one event in a fresh catalog and an advanceable clock
    pub(crate) struct Fixture {
        pub catalog: Arc<InMemoryEventCatalog>,
        pub clock: MockClock,
        pub event_id: EventId,
    }

    impl Fixture {
        pub(crate) fn new(total_tickets: u32) -> Self {
            let catalog = Arc::new(InMemoryEventCatalog::new());
            let record = EventRecord::new(EventId::new(), UserId::from("owner"), "Show", total_tickets);
            let event_id = record.event_id;
            catalog.insert(record);
            Self {
                catalog,
                clock: mock_clock(),
                event_id,
            }
        }

        pub(crate) fn env(&self) -> WaitlistEnvironment {
            WaitlistEnvironment::new(
                Arc::new(self.clock.clone()),
                self.catalog.clone(),
                Duration::minutes(30),
            )
        }

        pub(crate) fn state(&self) -> WaitlistState {
            WaitlistState::new(self.event_id)
        }

        /// Run a command directly and return its reply
        pub(crate) fn run(&self, state: &mut WaitlistState, action: WaitlistAction) -> WaitlistAction {
            let effects = WaitlistReducer::new().reduce(state, action, &self.env());
            reply_of(effects)
        }

        pub(crate) fn join(&self, state: &mut WaitlistState, buyer: &str) -> WaitlistAction {
            self.run(
                state,
                WaitlistAction::JoinWaitlist {
                    request_id: RequestId::new(),
                    buyer_id: UserId::from(buyer),
                },
            )
        }
    }

    /// Resolve the trailing reply future of a reducer call
    #[allow(clippy::panic)]
    pub(crate) fn reply_of(effects: Effects) -> WaitlistAction {
        let Some(Effect::Future(fut)) = effects.into_iter().last() else {
            panic!("reducer must end with a reply future");
        };
        let Some(reply) = futures::executor::block_on(fut) else {
            panic!("reply future produced nothing");
        };
        reply
    }

    #[allow(clippy::panic)]
    pub(crate) fn completed(reply: WaitlistAction) -> CommandOutcome {
        match reply {
            WaitlistAction::CommandCompleted { outcome, .. } => outcome,
            other => panic!("expected CommandCompleted, got {other:?}"),
        }
    }

    #[allow(clippy::panic)]
    pub(crate) fn rejected(reply: WaitlistAction) -> LedgerError {
        match reply {
            WaitlistAction::CommandRejected { error, .. } => error,
            other => panic!("expected CommandRejected, got {other:?}"),
        }
    }

    #[allow(clippy::panic)]
    pub(crate) fn joined_entry(reply: WaitlistAction) -> EntryId {
        match completed(reply) {
            CommandOutcome::Joined(receipt) => receipt.entry_id,
            other => panic!("expected Joined, got {other:?}"),
        }
    }
}
