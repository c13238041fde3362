//! Inventory accounting.
//!
//! Capacity is never stored. It is recomputed from the ticket ledger and the
//! waitlist every time a decision needs it:
//!
//! ```text
//! purchased     = tickets in {Valid, Used}
//! active_offers = entries Offered with offer_expires_at > now
//! remaining     = total_tickets − (purchased + active_offers)
//! ```
//!
//! An `Offered` entry past its deadline counts as free even before the expiry
//! path flips it to `Expired`.

use crate::types::{Availability, EventRecord, WaitlistState};
use chrono::{DateTime, Utc};

/// Compute the availability view for `record` at `now`
#[must_use]
pub fn availability(record: &EventRecord, state: &WaitlistState, now: DateTime<Utc>) -> Availability {
    let purchased = count(state.tickets.iter().filter(|t| t.status.occupies_seat()));
    let active_offers = count(state.entries.iter().filter(|e| e.holds_capacity(now)));
    let reserved = purchased.saturating_add(active_offers);

    Availability {
        total_tickets: record.total_tickets,
        purchased,
        active_offers,
        remaining: record.total_tickets.saturating_sub(reserved),
        is_sold_out: reserved >= record.total_tickets,
    }
}

fn count<I: Iterator>(iter: I) -> u32 {
    u32::try_from(iter.count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        EntryId, EntryStatus, EventId, Ticket, TicketId, TicketStatus, UserId, WaitlistEntry,
    };
    use chrono::Duration;
    use fairqueue_core::environment::Clock;
    use fairqueue_testing::test_clock;

    fn record(total: u32) -> EventRecord {
        EventRecord::new(EventId::new(), UserId::from("owner"), "Show", total)
    }

    fn offered(state: &mut WaitlistState, buyer: &str, expires_at: DateTime<Utc>) {
        let sequence = state.next_sequence;
        state.push_entry(WaitlistEntry {
            entry_id: EntryId::new(),
            event_id: state.event_id,
            buyer_id: UserId::from(buyer),
            status: EntryStatus::Offered,
            offer_expires_at: Some(expires_at),
            created_at: expires_at - Duration::minutes(30),
            sequence,
        });
    }

    fn ticket(state: &mut WaitlistState, status: TicketStatus, now: DateTime<Utc>) {
        state.push_ticket(Ticket {
            ticket_id: TicketId::new(),
            event_id: state.event_id,
            buyer_id: UserId::from("holder"),
            entry_id: EntryId::new(),
            status,
            purchased_at: now,
            updated_at: now,
        });
    }

    #[test]
    fn test_empty_event_has_full_capacity() {
        let now = test_clock().now();
        let record = record(3);
        let state = WaitlistState::new(record.event_id);

        let view = availability(&record, &state, now);
        assert_eq!(view.remaining, 3);
        assert_eq!(view.purchased, 0);
        assert_eq!(view.active_offers, 0);
        assert!(!view.is_sold_out);
    }

    #[test]
    fn test_lapsed_offer_reserves_nothing() {
        let now = test_clock().now();
        let record = record(2);
        let mut state = WaitlistState::new(record.event_id);
        offered(&mut state, "live", now + Duration::minutes(5));
        offered(&mut state, "stale", now - Duration::seconds(1));
        offered(&mut state, "boundary", now);

        let view = availability(&record, &state, now);
        assert_eq!(view.active_offers, 1);
        assert_eq!(view.remaining, 1);
    }

    #[test]
    fn test_only_seated_tickets_count() {
        let now = test_clock().now();
        let record = record(4);
        let mut state = WaitlistState::new(record.event_id);
        ticket(&mut state, TicketStatus::Valid, now);
        ticket(&mut state, TicketStatus::Used, now);
        ticket(&mut state, TicketStatus::Refunded, now);
        ticket(&mut state, TicketStatus::Cancelled, now);

        let view = availability(&record, &state, now);
        assert_eq!(view.purchased, 2);
        assert_eq!(view.remaining, 2);
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let now = test_clock().now();
        let record = record(1);
        let mut state = WaitlistState::new(record.event_id);
        ticket(&mut state, TicketStatus::Valid, now);
        offered(&mut state, "late", now + Duration::minutes(1));

        let view = availability(&record, &state, now);
        assert_eq!(view.remaining, 0);
        assert!(view.is_sold_out);
    }
}
