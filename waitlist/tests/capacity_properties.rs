//! Property tests for the capacity invariants.
//!
//! Random operation sequences are driven straight through the reducer with a
//! manually advanced clock. After every step:
//! - tickets seated plus live offers never exceed the pool
//! - no buyer holds more than one non-expired entry
//! - `offer_expires_at` is set exactly on offered entries
//!
//! Run with: `cargo test --test capacity_properties`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use fairqueue_core::environment::Clock;
use fairqueue_core::reducer::Reducer;
use fairqueue_testing::{mock_clock, MockClock};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use waitlist::availability::availability;
use waitlist::{
    EntryStatus, EventCatalog, EventId, EventRecord, InMemoryEventCatalog, RequestId,
    TicketStatus, UserId, WaitlistAction, WaitlistEnvironment, WaitlistReducer, WaitlistState,
};

const BUYERS: usize = 6;

#[derive(Clone, Debug)]
enum Op {
    Join(usize),
    Advance(i64),
    Expire(usize),
    Release(usize),
    Purchase(usize),
    Sweep,
    Reconcile,
    Refund(usize),
    Validate(usize),
    CancelAll,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..BUYERS).prop_map(Op::Join),
        2 => (1i64..45).prop_map(Op::Advance),
        1 => any::<usize>().prop_map(Op::Expire),
        1 => any::<usize>().prop_map(Op::Release),
        3 => any::<usize>().prop_map(Op::Purchase),
        1 => Just(Op::Sweep),
        1 => Just(Op::Reconcile),
        1 => any::<usize>().prop_map(Op::Refund),
        1 => any::<usize>().prop_map(Op::Validate),
        1 => Just(Op::CancelAll),
    ]
}

struct Model {
    catalog: Arc<InMemoryEventCatalog>,
    clock: MockClock,
    env: WaitlistEnvironment,
    state: WaitlistState,
}

impl Model {
    fn new(total_tickets: u32) -> Self {
        let catalog = Arc::new(InMemoryEventCatalog::new());
        let record = EventRecord::new(EventId::new(), UserId::from("venue"), "Show", total_tickets);
        let event_id = record.event_id;
        catalog.insert(record);
        let clock = mock_clock();
        let env = WaitlistEnvironment::new(
            Arc::new(clock.clone()),
            catalog.clone(),
            chrono::Duration::minutes(30),
        );
        Self {
            catalog,
            clock,
            env,
            state: WaitlistState::new(event_id),
        }
    }

    /// Run one command; effects (timers, replies) are dropped
    fn send(&mut self, action: WaitlistAction) {
        let _effects = WaitlistReducer::new().reduce(&mut self.state, action, &self.env);
    }

    fn pick_entry(&self, index: usize) -> Option<waitlist::EntryId> {
        if self.state.entries.is_empty() {
            return None;
        }
        Some(self.state.entries[index % self.state.entries.len()].entry_id)
    }

    fn pick_ticket(&self, index: usize) -> Option<waitlist::TicketId> {
        if self.state.tickets.is_empty() {
            return None;
        }
        Some(self.state.tickets[index % self.state.tickets.len()].ticket_id)
    }

    fn apply(&mut self, op: &Op) {
        let request_id = RequestId::new();
        match *op {
            Op::Join(buyer) => self.send(WaitlistAction::JoinWaitlist {
                request_id,
                buyer_id: UserId::new(format!("buyer-{buyer}")),
            }),
            Op::Advance(minutes) => self.clock.advance(chrono::Duration::minutes(minutes)),
            Op::Expire(index) => {
                if let Some(entry_id) = self.pick_entry(index) {
                    self.send(WaitlistAction::ExpireOffer { request_id, entry_id });
                }
            },
            Op::Release(index) => {
                if let Some(entry_id) = self.pick_entry(index) {
                    self.send(WaitlistAction::ReleaseOffer { request_id, entry_id });
                }
            },
            Op::Purchase(index) => {
                if let Some(entry_id) = self.pick_entry(index) {
                    let buyer_id = self.state.entry(&entry_id).map(|e| e.buyer_id.clone()).unwrap();
                    self.send(WaitlistAction::PurchaseTicket {
                        request_id,
                        entry_id,
                        buyer_id,
                    });
                }
            },
            Op::Sweep => self.send(WaitlistAction::SweepExpiredOffers { request_id }),
            Op::Reconcile => self.send(WaitlistAction::Reconcile { request_id }),
            Op::Refund(index) => {
                if let Some(ticket_id) = self.pick_ticket(index) {
                    self.send(WaitlistAction::UpdateTicketStatus {
                        request_id,
                        ticket_id,
                        status: TicketStatus::Refunded,
                    });
                }
            },
            Op::Validate(index) => {
                if let Some(ticket_id) = self.pick_ticket(index) {
                    self.send(WaitlistAction::ValidateTicket {
                        request_id,
                        ticket_id,
                        requester_id: UserId::from("venue"),
                        event_owner_id: UserId::from("venue"),
                    });
                }
            },
            Op::CancelAll => self.send(WaitlistAction::CancelAllTickets { request_id }),
        }
    }

    fn check(&self) -> Result<(), TestCaseError> {
        let record = self.catalog.event(&self.state.event_id).unwrap();
        let now = self.clock.now();
        let view = availability(&record, &self.state, now);

        prop_assert!(
            view.purchased + view.active_offers <= record.total_tickets,
            "oversold: {view:?}"
        );

        let mut active_buyers = HashSet::new();
        for entry in &self.state.entries {
            if entry.status.is_active() {
                prop_assert!(
                    active_buyers.insert(entry.buyer_id.clone()),
                    "buyer {} has two active entries",
                    entry.buyer_id
                );
            }
            prop_assert_eq!(
                entry.offer_expires_at.is_some(),
                entry.status == EntryStatus::Offered
            );
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_never_oversells(
        total_tickets in 0u32..4,
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let mut model = Model::new(total_tickets);
        for op in &ops {
            model.apply(op);
            model.check()?;
        }
    }

    #[test]
    fn prop_waiting_entries_promoted_in_join_order(
        joins in 2usize..BUYERS,
        releases in 1usize..3,
    ) {
        let mut model = Model::new(1);
        for buyer in 0..joins {
            model.apply(&Op::Join(buyer));
        }

        for _ in 0..releases {
            let offered = model
                .state
                .entries
                .iter()
                .find(|e| e.status == EntryStatus::Offered)
                .map(|e| e.entry_id);
            if let Some(entry_id) = offered {
                model.send(WaitlistAction::ReleaseOffer { request_id: RequestId::new(), entry_id });
            }
        }

        // Exactly the entries up to the current offer have been reached, in order
        let reached: Vec<bool> = model
            .state
            .entries
            .iter()
            .map(|e| e.status != EntryStatus::Waiting)
            .collect();
        let first_waiting = reached.iter().position(|r| !r).unwrap_or(reached.len());
        prop_assert!(reached[first_waiting..].iter().all(|r| !r));
        model.check()?;
    }
}
