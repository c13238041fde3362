//! Joining the waitlist.
//!
//! A join either lands directly on an offer, when the event still has
//! unreserved capacity, or queues as `Waiting`. Either way exactly one entry
//! is appended.

use super::{Effects, WaitlistAction, WaitlistEnvironment, WaitlistReducer};
use crate::availability::availability;
use crate::error::LedgerError;
use crate::types::{EntryId, EntryStatus, JoinReceipt, UserId, WaitlistState};

impl WaitlistReducer {
    /// Validates `JoinWaitlist` command
    fn validate_join(state: &WaitlistState, buyer_id: &UserId) -> Result<(), LedgerError> {
        if buyer_id.is_blank() {
            return Err(LedgerError::Validation("Buyer id must not be empty".to_string()));
        }

        if state.active_entry_for(buyer_id).is_some() {
            return Err(LedgerError::AlreadyQueued);
        }

        Ok(())
    }

    /// Handle `JoinWaitlist`
    pub(super) fn join(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        buyer_id: UserId,
        effects: &mut Effects,
    ) -> Result<JoinReceipt, LedgerError> {
        Self::validate_join(state, &buyer_id)?;
        let record = Self::live_event(state, env)?;

        let now = env.clock.now();
        let remaining = availability(&record, state, now).remaining;

        let entry_id = EntryId::new();
        let (status, offer_expires_at) = if remaining > 0 {
            (EntryStatus::Offered, Some(env.offer_deadline(now)))
        } else {
            (EntryStatus::Waiting, None)
        };

        let event = WaitlistAction::EntryJoined {
            entry_id,
            buyer_id: buyer_id.clone(),
            status,
            offer_expires_at,
            joined_at: now,
            sequence: state.next_sequence,
        };
        Self::apply_event(state, &event);
        crate::metrics::record_join(status);

        let message = if let Some(deadline) = offer_expires_at {
            effects.push(Self::arm(entry_id, deadline, now));
            crate::metrics::record_offer("join");
            tracing::info!(
                event_id = %state.event_id,
                %entry_id,
                buyer_id = %buyer_id,
                %deadline,
                "Offer granted on join"
            );
            format!("Ticket offered! You have until {} to purchase", deadline.to_rfc3339())
        } else {
            tracing::debug!(event_id = %state.event_id, %entry_id, buyer_id = %buyer_id, "Joined as waiting");
            "Added to waiting list - you'll be notified when a ticket becomes available".to_string()
        };

        Ok(JoinReceipt {
            entry_id,
            status,
            offer_expires_at,
            message,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::*;
    use super::super::{CommandOutcome, WaitlistAction, WaitlistReducer};
    use crate::error::LedgerError;
    use crate::types::{EntryStatus, RequestId, UserId};
    use chrono::Duration;
    use fairqueue_core::environment::Clock;
    use fairqueue_testing::{assertions, ReducerTest};

    #[test]
    fn test_join_with_capacity_is_offered_and_armed() {
        let fixture = Fixture::new(1);
        let now = fixture.clock.now();

        ReducerTest::new(WaitlistReducer::new())
            .with_env(fixture.env())
            .given_state(fixture.state())
            .when_action(WaitlistAction::JoinWaitlist {
                request_id: RequestId::new(),
                buyer_id: UserId::from("alice"),
            })
            .then_state(move |state| {
                assert_eq!(state.entries.len(), 1);
                let entry = &state.entries[0];
                assert_eq!(entry.status, EntryStatus::Offered);
                assert_eq!(entry.offer_expires_at, Some(now + Duration::minutes(30)));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_delay_effect(effects);
                let armed = assertions::delayed_actions(effects);
                assert!(matches!(armed[..], [WaitlistAction::ExpireOffer { .. }]));
                let (duration, _) = effects[0].delayed_action().unwrap();
                assert_eq!(*duration, std::time::Duration::from_secs(30 * 60));
            })
            .run();
    }

    #[test]
    fn test_join_without_capacity_waits_unarmed() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        fixture.join(&mut state, "alice");

        ReducerTest::new(WaitlistReducer::new())
            .with_env(fixture.env())
            .given_state(state)
            .when_action(WaitlistAction::JoinWaitlist {
                request_id: RequestId::new(),
                buyer_id: UserId::from("bob"),
            })
            .then_state(|state| {
                let bob = state.active_entry_for(&UserId::from("bob")).unwrap();
                assert_eq!(bob.status, EntryStatus::Waiting);
                assert!(bob.offer_expires_at.is_none());
            })
            .then_effects(|effects| {
                assert!(assertions::delayed_actions(effects).is_empty());
            })
            .run();
    }

    #[test]
    fn test_join_twice_is_already_queued() {
        let fixture = Fixture::new(5);
        let mut state = fixture.state();
        fixture.join(&mut state, "alice");

        let error = rejected(fixture.join(&mut state, "alice"));
        assert_eq!(error, LedgerError::AlreadyQueued);
        assert_eq!(state.entries.len(), 1);
    }

    #[test]
    fn test_rejoin_after_expiry_creates_new_entry() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let first = joined_entry(fixture.join(&mut state, "alice"));

        fixture.clock.advance(Duration::minutes(31));
        fixture.run(
            &mut state,
            WaitlistAction::ExpireOffer {
                request_id: RequestId::new(),
                entry_id: first,
            },
        );

        let second = joined_entry(fixture.join(&mut state, "alice"));
        assert_ne!(first, second);
        assert_eq!(state.entries.len(), 2);
        assert_eq!(state.entry(&second).unwrap().status, EntryStatus::Offered);
    }

    #[test]
    fn test_lapsed_offer_frees_capacity_for_join() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        fixture.join(&mut state, "alice");

        // Deadline passed but the expiry has not been processed yet
        fixture.clock.advance(Duration::minutes(30));

        match completed(fixture.join(&mut state, "bob")) {
            CommandOutcome::Joined(receipt) => assert_eq!(receipt.status, EntryStatus::Offered),
            other => unreachable!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_blank_buyer_is_validation_error() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();

        let error = rejected(fixture.join(&mut state, "   "));
        assert!(matches!(error, LedgerError::Validation(_)));
        assert!(state.entries.is_empty());
    }

    #[test]
    fn test_cancelled_event_rejects_join() {
        let fixture = Fixture::new(1);
        fixture.catalog.cancel(&fixture.event_id);
        let mut state = fixture.state();

        let error = rejected(fixture.join(&mut state, "alice"));
        assert_eq!(error, LedgerError::EventCancelled(fixture.event_id));
    }

    #[test]
    fn test_purchased_buyer_cannot_rejoin() {
        let fixture = Fixture::new(2);
        let mut state = fixture.state();
        let entry_id = joined_entry(fixture.join(&mut state, "alice"));
        fixture.run(
            &mut state,
            WaitlistAction::PurchaseTicket {
                request_id: RequestId::new(),
                entry_id,
                buyer_id: UserId::from("alice"),
            },
        );

        let error = rejected(fixture.join(&mut state, "alice"));
        assert_eq!(error, LedgerError::AlreadyQueued);
    }
}
