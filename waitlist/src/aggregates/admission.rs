//! Queue admission: promoting waiting buyers into free capacity.
//!
//! Runs inside the store's write lock, after whatever freed the capacity, so
//! the remaining count it reads is the one it writes against. A second
//! reconcile with nothing new to fill is a no-op.

use super::{Effects, WaitlistAction, WaitlistEnvironment, WaitlistReducer};
use crate::availability::availability;
use crate::types::{EntryId, WaitlistState};

impl WaitlistReducer {
    /// Promote up to `remaining` waiting entries, oldest first
    ///
    /// Returns the promoted entry ids. Does nothing for unknown or cancelled
    /// events.
    pub(super) fn reconcile(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        effects: &mut Effects,
    ) -> Vec<EntryId> {
        let record = match Self::live_event(state, env) {
            Ok(record) => record,
            Err(reason) => {
                tracing::debug!(event_id = %state.event_id, %reason, "Reconcile skipped");
                return Vec::new();
            },
        };

        let now = env.clock.now();
        let remaining = usize::try_from(availability(&record, state, now).remaining).unwrap_or(usize::MAX);
        if remaining == 0 {
            return Vec::new();
        }

        let promoted: Vec<EntryId> = state
            .waiting_in_order()
            .into_iter()
            .take(remaining)
            .map(|e| e.entry_id)
            .collect();

        let deadline = env.offer_deadline(now);
        for entry_id in &promoted {
            Self::apply_event(
                state,
                &WaitlistAction::OfferGranted {
                    entry_id: *entry_id,
                    offer_expires_at: deadline,
                    granted_at: now,
                },
            );
            effects.push(Self::arm(*entry_id, deadline, now));
            crate::metrics::record_offer("promotion");
            tracing::info!(event_id = %state.event_id, %entry_id, %deadline, "Waiting entry promoted");
        }

        promoted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::*;
    use super::super::{CommandOutcome, WaitlistAction, WaitlistReducer};
    use crate::types::{EntryStatus, RequestId, TicketStatus, UserId};
    use chrono::Duration;
    use fairqueue_testing::{assertions, ReducerTest};

    fn reconcile() -> WaitlistAction {
        WaitlistAction::Reconcile {
            request_id: RequestId::new(),
        }
    }

    #[test]
    fn test_reconcile_without_capacity_is_noop() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        fixture.join(&mut state, "alice");
        fixture.join(&mut state, "bob");

        ReducerTest::new(WaitlistReducer::new())
            .with_env(fixture.env())
            .given_state(state)
            .when_action(reconcile())
            .then_state(|state| {
                let bob = state.active_entry_for(&UserId::from("bob")).unwrap();
                assert_eq!(bob.status, EntryStatus::Waiting);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_promotion_is_fifo_and_bounded() {
        let fixture = Fixture::new(2);
        let mut state = fixture.state();
        let alice = joined_entry(fixture.join(&mut state, "alice"));
        let bob = joined_entry(fixture.join(&mut state, "bob"));
        let carol = joined_entry(fixture.join(&mut state, "carol"));
        fixture.clock.advance(Duration::seconds(1));
        let dave = joined_entry(fixture.join(&mut state, "dave"));
        let erin = joined_entry(fixture.join(&mut state, "erin"));

        // Free both seats at once
        fixture.run(
            &mut state,
            WaitlistAction::ReleaseOffer {
                request_id: RequestId::new(),
                entry_id: alice,
            },
        );
        let outcome = completed(fixture.run(
            &mut state,
            WaitlistAction::ReleaseOffer {
                request_id: RequestId::new(),
                entry_id: bob,
            },
        ));

        assert_eq!(outcome, CommandOutcome::OfferReleased { promoted: vec![dave] });
        assert_eq!(state.entry(&carol).unwrap().status, EntryStatus::Offered);
        assert_eq!(state.entry(&erin).unwrap().status, EntryStatus::Waiting);
    }

    #[test]
    fn test_second_reconcile_is_noop() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let alice = joined_entry(fixture.join(&mut state, "alice"));
        fixture.join(&mut state, "bob");

        // Lapsed but not yet expired: reconcile sees the free seat
        fixture.clock.advance(Duration::minutes(31));
        let first = completed(fixture.run(&mut state, reconcile()));
        let second = completed(fixture.run(&mut state, reconcile()));

        assert!(matches!(first, CommandOutcome::Reconciled { ref promoted } if promoted.len() == 1));
        assert_eq!(second, CommandOutcome::Reconciled { promoted: vec![] });
        assert_eq!(state.entry(&alice).unwrap().status, EntryStatus::Offered);
    }

    #[test]
    fn test_cancelled_event_promotes_nobody() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let alice = joined_entry(fixture.join(&mut state, "alice"));
        let bob = joined_entry(fixture.join(&mut state, "bob"));

        fixture.catalog.cancel(&fixture.event_id);
        fixture.run(
            &mut state,
            WaitlistAction::ReleaseOffer {
                request_id: RequestId::new(),
                entry_id: alice,
            },
        );

        assert_eq!(state.entry(&bob).unwrap().status, EntryStatus::Waiting);
    }

    #[test]
    fn test_refund_on_live_event_promotes() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let alice = joined_entry(fixture.join(&mut state, "alice"));
        let bob = joined_entry(fixture.join(&mut state, "bob"));
        let ticket = match completed(fixture.run(
            &mut state,
            WaitlistAction::PurchaseTicket {
                request_id: RequestId::new(),
                entry_id: alice,
                buyer_id: UserId::from("alice"),
            },
        )) {
            CommandOutcome::Purchased(ticket) => ticket,
            other => unreachable!("unexpected outcome {other:?}"),
        };

        let outcome = completed(fixture.run(
            &mut state,
            WaitlistAction::UpdateTicketStatus {
                request_id: RequestId::new(),
                ticket_id: ticket.ticket_id,
                status: TicketStatus::Refunded,
            },
        ));

        assert!(matches!(outcome, CommandOutcome::TicketUpdated { ref promoted, .. } if promoted == &vec![bob]));
    }
}
