//! Domain types for the waitlist admission engine.
//!
//! Identifiers, the event record served by the catalog, waitlist entries,
//! tickets, the derived availability view and the per-event state owned by
//! each store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a waitlist entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random `EntryId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EntryId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a command with the reply the store emits for it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque user identity supplied by the auth collaborator
///
/// Used for both buyers and event owners. Only equality is ever checked.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a new `UserId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identity is empty or whitespace only
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event catalog record
// ============================================================================

/// Event metadata owned by the event-management collaborator
///
/// Read-only to the admission engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event identifier
    pub event_id: EventId,
    /// Event owner, the only user allowed to validate tickets
    pub owner_id: UserId,
    /// Display name
    pub name: String,
    /// Fixed ticket pool
    pub total_tickets: u32,
    /// Set once the event is cancelled
    pub is_cancelled: bool,
}

impl EventRecord {
    /// Creates a live (not cancelled) event record
    #[must_use]
    pub fn new(event_id: EventId, owner_id: UserId, name: impl Into<String>, total_tickets: u32) -> Self {
        Self {
            event_id,
            owner_id,
            name: name.into(),
            total_tickets,
            is_cancelled: false,
        }
    }
}

// ============================================================================
// Waitlist entries
// ============================================================================

/// Lifecycle of a waitlist entry
///
/// ```text
/// Waiting ──promote──▶ Offered ──purchase──▶ Purchased
///                         │
///                         └──expire / release──▶ Expired
/// ```
///
/// `Offered` may also be the initial state when the buyer joins with
/// capacity to spare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Queued behind exhausted capacity
    Waiting,
    /// Holding a time-boxed purchase offer
    Offered,
    /// Offer lapsed or was released; terminal
    Expired,
    /// Offer consumed by a ticket purchase; terminal
    Purchased,
}

impl EntryStatus {
    /// Entries that block the buyer from joining again
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Expired)
    }

    /// Entries that count toward queue position
    #[must_use]
    pub const fn is_queued(self) -> bool {
        matches!(self, Self::Waiting | Self::Offered)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Waiting => "waiting",
            Self::Offered => "offered",
            Self::Expired => "expired",
            Self::Purchased => "purchased",
        };
        f.write_str(label)
    }
}

/// One buyer's place in an event's waitlist
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Entry identifier
    pub entry_id: EntryId,
    /// Event this entry queues for
    pub event_id: EventId,
    /// Buyer holding the entry
    pub buyer_id: UserId,
    /// Current status
    pub status: EntryStatus,
    /// Offer deadline, present only while `Offered`
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// When the buyer joined
    pub created_at: DateTime<Utc>,
    /// Per-event join counter, breaks ties between equal `created_at`
    pub sequence: u64,
}

impl WaitlistEntry {
    /// Whether this entry reserves capacity at `now`
    ///
    /// An `Offered` entry whose deadline has passed reserves nothing, even
    /// before its status is flipped to `Expired`. Every capacity decision and
    /// every expiry decision goes through this one predicate.
    #[must_use]
    pub fn holds_capacity(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Offered && self.offer_expires_at.is_some_and(|deadline| deadline > now)
    }

    /// An `Offered` entry whose deadline is at or before `now`
    #[must_use]
    pub fn offer_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Offered && !self.holds_capacity(now)
    }

    /// FIFO ordering key
    #[must_use]
    pub const fn queue_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Ticket lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Purchased, not yet scanned
    Valid,
    /// Scanned at the door
    Used,
    /// Refunded after event cancellation
    Refunded,
    /// Cancelled without refund
    Cancelled,
}

impl TicketStatus {
    /// Tickets that consume one unit of the event's pool
    #[must_use]
    pub const fn occupies_seat(self) -> bool {
        matches!(self, Self::Valid | Self::Used)
    }

    /// Allowed manual transitions
    ///
    /// `Valid → Used`, and `Valid | Used → Refunded | Cancelled`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Valid, Self::Used)
                | (Self::Valid | Self::Used, Self::Refunded | Self::Cancelled)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Valid => "valid",
            Self::Used => "used",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A purchased ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identifier
    pub ticket_id: TicketId,
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Ticket holder
    pub buyer_id: UserId,
    /// Waitlist entry whose offer was consumed
    pub entry_id: EntryId,
    /// Current status
    pub status: TicketStatus,
    /// Purchase time
    pub purchased_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Read models
// ============================================================================

/// Capacity view derived from entries and tickets at a point in time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// Fixed ticket pool
    pub total_tickets: u32,
    /// Tickets in `Valid` or `Used`
    pub purchased: u32,
    /// Offers whose deadline has not passed
    pub active_offers: u32,
    /// `total − (purchased + active_offers)`, floored at zero
    pub remaining: u32,
    /// No capacity left for new offers
    pub is_sold_out: bool,
}

/// Result of a successful join
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReceipt {
    /// The new entry
    pub entry_id: EntryId,
    /// `Offered` or `Waiting`
    pub status: EntryStatus,
    /// Offer deadline when `Offered`
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// Human readable summary
    pub message: String,
}

/// A buyer's active entry and its rank
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    /// The buyer's non-expired entry
    pub entry: WaitlistEntry,
    /// 1-based rank among `Waiting` and `Offered` entries
    pub position: u32,
    /// 1-based rank among `Waiting` entries only, `None` unless waiting
    pub waiting_position: Option<u32>,
}

/// Result of a ticket validation attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the ticket was marked used
    pub success: bool,
    /// Human readable summary
    pub message: String,
}

/// Seller dashboard counters for one event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetrics {
    /// Tickets in `Valid` or `Used`
    pub sold: u32,
    /// Tickets in `Used`
    pub used: u32,
    /// Tickets in `Refunded`
    pub refunded: u32,
    /// Tickets in `Cancelled`
    pub cancelled: u32,
}

// ============================================================================
// Per-event state
// ============================================================================

/// Everything one event's store owns: the waitlist and the ticket ledger
///
/// Entries and tickets are append-only; statuses change in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitlistState {
    /// Event this state belongs to
    pub event_id: EventId,
    /// Entries in join order
    pub entries: Vec<WaitlistEntry>,
    /// Tickets in purchase order
    pub tickets: Vec<Ticket>,
    /// Next entry sequence number
    pub next_sequence: u64,
    entry_index: HashMap<EntryId, usize>,
    ticket_index: HashMap<TicketId, usize>,
}

impl WaitlistState {
    /// Creates an empty state for `event_id`
    #[must_use]
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            entries: Vec::new(),
            tickets: Vec::new(),
            next_sequence: 0,
            entry_index: HashMap::new(),
            ticket_index: HashMap::new(),
        }
    }

    /// Gets an entry by ID
    #[must_use]
    pub fn entry(&self, entry_id: &EntryId) -> Option<&WaitlistEntry> {
        self.entry_index.get(entry_id).and_then(|&idx| self.entries.get(idx))
    }

    /// Gets a mutable entry by ID
    pub fn entry_mut(&mut self, entry_id: &EntryId) -> Option<&mut WaitlistEntry> {
        self.entry_index
            .get(entry_id)
            .copied()
            .and_then(|idx| self.entries.get_mut(idx))
    }

    /// Appends an entry
    pub fn push_entry(&mut self, entry: WaitlistEntry) {
        self.next_sequence = self.next_sequence.max(entry.sequence + 1);
        self.entry_index.insert(entry.entry_id, self.entries.len());
        self.entries.push(entry);
    }

    /// The buyer's non-expired entry, if any
    #[must_use]
    pub fn active_entry_for(&self, buyer_id: &UserId) -> Option<&WaitlistEntry> {
        self.entries
            .iter()
            .find(|e| &e.buyer_id == buyer_id && e.status.is_active())
    }

    /// `Waiting` entries, oldest first
    #[must_use]
    pub fn waiting_in_order(&self) -> Vec<&WaitlistEntry> {
        let mut waiting: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.status == EntryStatus::Waiting)
            .collect();
        waiting.sort_by_key(|e| e.queue_key());
        waiting
    }

    /// Buyer's active entry with its rank
    #[must_use]
    pub fn position_of(&self, buyer_id: &UserId) -> Option<QueuePosition> {
        let entry = self.active_entry_for(buyer_id)?;
        let key = entry.queue_key();

        let ahead = self
            .entries
            .iter()
            .filter(|e| e.status.is_queued() && e.queue_key() < key)
            .count();

        let waiting_position = (entry.status == EntryStatus::Waiting).then(|| {
            let waiting_ahead = self
                .entries
                .iter()
                .filter(|e| e.status == EntryStatus::Waiting && e.queue_key() < key)
                .count();
            rank(waiting_ahead)
        });

        Some(QueuePosition {
            entry: entry.clone(),
            position: rank(ahead),
            waiting_position,
        })
    }

    /// Gets a ticket by ID
    #[must_use]
    pub fn ticket(&self, ticket_id: &TicketId) -> Option<&Ticket> {
        self.ticket_index.get(ticket_id).and_then(|&idx| self.tickets.get(idx))
    }

    /// Gets a mutable ticket by ID
    pub fn ticket_mut(&mut self, ticket_id: &TicketId) -> Option<&mut Ticket> {
        self.ticket_index
            .get(ticket_id)
            .copied()
            .and_then(|idx| self.tickets.get_mut(idx))
    }

    /// Appends a ticket
    pub fn push_ticket(&mut self, ticket: Ticket) {
        self.ticket_index.insert(ticket.ticket_id, self.tickets.len());
        self.tickets.push(ticket);
    }

    /// Tickets in `Valid` or `Used`
    #[must_use]
    pub fn seated_tickets(&self) -> Vec<&Ticket> {
        self.tickets.iter().filter(|t| t.status.occupies_seat()).collect()
    }

    /// The buyer's first ticket for this event
    #[must_use]
    pub fn ticket_for_buyer(&self, buyer_id: &UserId) -> Option<&Ticket> {
        self.tickets.iter().find(|t| &t.buyer_id == buyer_id)
    }

    /// Seller dashboard counters
    #[must_use]
    pub fn metrics(&self) -> EventMetrics {
        self.tickets.iter().fold(EventMetrics::default(), |mut m, t| {
            match t.status {
                TicketStatus::Valid => m.sold += 1,
                TicketStatus::Used => {
                    m.sold += 1;
                    m.used += 1;
                },
                TicketStatus::Refunded => m.refunded += 1,
                TicketStatus::Cancelled => m.cancelled += 1,
            }
            m
        })
    }
}

fn rank(ahead: usize) -> u32 {
    u32::try_from(ahead).map_or(u32::MAX, |n| n.saturating_add(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(state: &WaitlistState, buyer: &str, status: EntryStatus, at: DateTime<Utc>) -> WaitlistEntry {
        WaitlistEntry {
            entry_id: EntryId::new(),
            event_id: state.event_id,
            buyer_id: UserId::from(buyer),
            status,
            offer_expires_at: (status == EntryStatus::Offered).then(|| at + Duration::minutes(30)),
            created_at: at,
            sequence: state.next_sequence,
        }
    }

    #[test]
    fn test_holds_capacity_uses_strict_cutoff() {
        let now = Utc::now();
        let mut offered = WaitlistEntry {
            entry_id: EntryId::new(),
            event_id: EventId::new(),
            buyer_id: UserId::from("buyer"),
            status: EntryStatus::Offered,
            offer_expires_at: Some(now),
            created_at: now - Duration::minutes(30),
            sequence: 0,
        };

        // Deadline equal to now no longer reserves
        assert!(!offered.holds_capacity(now));
        assert!(offered.offer_lapsed(now));

        offered.offer_expires_at = Some(now + Duration::seconds(1));
        assert!(offered.holds_capacity(now));
        assert!(!offered.offer_lapsed(now));
    }

    #[test]
    fn test_ticket_transitions() {
        assert!(TicketStatus::Valid.can_transition_to(TicketStatus::Used));
        assert!(TicketStatus::Used.can_transition_to(TicketStatus::Refunded));
        assert!(TicketStatus::Valid.can_transition_to(TicketStatus::Cancelled));
        assert!(!TicketStatus::Used.can_transition_to(TicketStatus::Valid));
        assert!(!TicketStatus::Refunded.can_transition_to(TicketStatus::Cancelled));
        assert!(!TicketStatus::Valid.can_transition_to(TicketStatus::Valid));
    }

    #[test]
    fn test_position_counts_waiting_and_offered_ahead() {
        let now = Utc::now();
        let mut state = WaitlistState::new(EventId::new());

        let first = entry(&state, "a", EntryStatus::Offered, now);
        state.push_entry(first);
        let expired = entry(&state, "b", EntryStatus::Expired, now + Duration::seconds(1));
        state.push_entry(expired);
        let waiting = entry(&state, "c", EntryStatus::Waiting, now + Duration::seconds(2));
        state.push_entry(waiting);

        let position = state.position_of(&UserId::from("c")).unwrap();
        assert_eq!(position.position, 2);
        assert_eq!(position.waiting_position, Some(1));

        assert!(state.position_of(&UserId::from("b")).is_none());
        assert_eq!(state.position_of(&UserId::from("a")).unwrap().position, 1);
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let now = Utc::now();
        let mut state = WaitlistState::new(EventId::new());
        let first = entry(&state, "a", EntryStatus::Waiting, now);
        state.push_entry(first);
        let second = entry(&state, "b", EntryStatus::Waiting, now);
        state.push_entry(second);

        let order: Vec<_> = state.waiting_in_order().iter().map(|e| e.buyer_id.clone()).collect();
        assert_eq!(order, vec![UserId::from("a"), UserId::from("b")]);
        assert_eq!(state.position_of(&UserId::from("b")).unwrap().position, 2);
    }

    #[test]
    fn test_metrics_fold() {
        let now = Utc::now();
        let mut state = WaitlistState::new(EventId::new());
        for status in [TicketStatus::Valid, TicketStatus::Used, TicketStatus::Refunded] {
            state.push_ticket(Ticket {
                ticket_id: TicketId::new(),
                event_id: state.event_id,
                buyer_id: UserId::from("x"),
                entry_id: EntryId::new(),
                status,
                purchased_at: now,
                updated_at: now,
            });
        }

        let metrics = state.metrics();
        assert_eq!(metrics.sold, 2);
        assert_eq!(metrics.used, 1);
        assert_eq!(metrics.refunded, 1);
        assert_eq!(metrics.cancelled, 0);
        assert_eq!(state.seated_tickets().len(), 2);
    }
}
