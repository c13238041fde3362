//! Offer scheduling: arming, expiring, releasing and sweeping offers.
//!
//! An offer's deadline lives on the entry. The `Effect::Delay` armed with
//! every offer is the fast path; [`crate::sweeper::OfferSweeper`] re-derives
//! expiry from the stored deadlines for offers whose timer was lost.
//!
//! Expiry uses the same cutoff as [`crate::availability`]: an offer is live
//! while `offer_expires_at > now`. A timer that fires before the deadline
//! (clock skew between the tokio timer and the wall clock) is a no-op.

use super::{CommandOutcome, Effects, WaitlistAction, WaitlistEnvironment, WaitlistReducer};
use crate::error::LedgerError;
use crate::types::{EntryId, EntryStatus, RequestId, WaitlistState};
use chrono::{DateTime, Utc};
use fairqueue_core::{delay, effect::Effect};

impl WaitlistReducer {
    /// Schedule `ExpireOffer` for `entry_id` at `deadline`
    pub(super) fn arm(entry_id: EntryId, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Effect<WaitlistAction> {
        let duration = (deadline - now).to_std().unwrap_or_default();
        delay! {
            duration: duration,
            action: WaitlistAction::ExpireOffer {
                request_id: RequestId::new(),
                entry_id,
            }
        }
    }

    /// Handle `ExpireOffer`
    ///
    /// No-op unless the entry is `Offered` and past its deadline, so repeated
    /// or early deliveries are harmless.
    pub(super) fn expire(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        entry_id: EntryId,
        effects: &mut Effects,
    ) -> Result<CommandOutcome, LedgerError> {
        let now = env.clock.now();

        if !state.entry(&entry_id).is_some_and(|e| e.offer_lapsed(now)) {
            tracing::debug!(event_id = %state.event_id, %entry_id, "Expire skipped: no lapsed offer");
            return Ok(CommandOutcome::OfferExpired {
                expired: false,
                promoted: Vec::new(),
            });
        }

        Self::apply_event(
            state,
            &WaitlistAction::OfferExpired {
                entry_id,
                expired_at: now,
            },
        );
        crate::metrics::record_offer_expired("timer");
        tracing::info!(event_id = %state.event_id, %entry_id, "Offer expired");

        let promoted = Self::reconcile(state, env, effects);
        Ok(CommandOutcome::OfferExpired {
            expired: true,
            promoted,
        })
    }

    /// Handle `ReleaseOffer`
    pub(super) fn release(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        entry_id: EntryId,
        effects: &mut Effects,
    ) -> Result<CommandOutcome, LedgerError> {
        let entry = state.entry(&entry_id).ok_or(LedgerError::OfferNotFound(entry_id))?;
        if entry.status != EntryStatus::Offered {
            return Err(LedgerError::InvalidState(format!(
                "Entry {entry_id} is {}, only offered entries can be released",
                entry.status
            )));
        }

        Self::apply_event(
            state,
            &WaitlistAction::OfferReleased {
                entry_id,
                released_at: env.clock.now(),
            },
        );
        crate::metrics::record_offer_expired("release");
        tracing::info!(event_id = %state.event_id, %entry_id, "Offer released");

        let promoted = Self::reconcile(state, env, effects);
        Ok(CommandOutcome::OfferReleased { promoted })
    }

    /// Handle `SweepExpiredOffers`
    ///
    /// Expires every lapsed offer, then reconciles once.
    pub(super) fn sweep(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        effects: &mut Effects,
    ) -> CommandOutcome {
        let now = env.clock.now();
        let lapsed: Vec<EntryId> = state
            .entries
            .iter()
            .filter(|e| e.offer_lapsed(now))
            .map(|e| e.entry_id)
            .collect();

        for entry_id in &lapsed {
            Self::apply_event(
                state,
                &WaitlistAction::OfferExpired {
                    entry_id: *entry_id,
                    expired_at: now,
                },
            );
            crate::metrics::record_offer_expired("sweep");
        }

        if !lapsed.is_empty() {
            tracing::info!(event_id = %state.event_id, expired = lapsed.len(), "Sweep expired lapsed offers");
        }

        let promoted = Self::reconcile(state, env, effects);
        CommandOutcome::Swept {
            expired: lapsed,
            promoted,
        }
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
    use fairqueue_testing::{assertions, ReducerTest};

    fn expire(entry_id: crate::types::EntryId) -> WaitlistAction {
        WaitlistAction::ExpireOffer {
            request_id: RequestId::new(),
            entry_id,
        }
    }

    #[test]
    fn test_expire_before_deadline_is_noop() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let entry_id = joined_entry(fixture.join(&mut state, "alice"));

        fixture.clock.advance(Duration::minutes(29));
        let outcome = completed(fixture.run(&mut state, expire(entry_id)));

        assert_eq!(
            outcome,
            CommandOutcome::OfferExpired {
                expired: false,
                promoted: vec![]
            }
        );
        assert_eq!(state.entry(&entry_id).unwrap().status, EntryStatus::Offered);
    }

    #[test]
    fn test_expire_at_deadline_promotes_next_waiting() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let alice = joined_entry(fixture.join(&mut state, "alice"));
        let bob = joined_entry(fixture.join(&mut state, "bob"));

        fixture.clock.advance(Duration::minutes(30));

        ReducerTest::new(WaitlistReducer::new())
            .with_env(fixture.env())
            .given_state(state)
            .when_action(expire(alice))
            .then_state(move |state| {
                let expired = state.entry(&alice).unwrap();
                assert_eq!(expired.status, EntryStatus::Expired);
                assert!(expired.offer_expires_at.is_none());
                assert_eq!(state.entry(&bob).unwrap().status, EntryStatus::Offered);
            })
            .then_effects(move |effects| {
                // New timer for bob, then the reply
                let armed = assertions::delayed_actions(effects);
                assert!(
                    matches!(armed[..], [WaitlistAction::ExpireOffer { entry_id, .. }] if *entry_id == bob)
                );
            })
            .run();
    }

    #[test]
    fn test_expire_is_idempotent() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let entry_id = joined_entry(fixture.join(&mut state, "alice"));
        fixture.clock.advance(Duration::minutes(31));

        let first = completed(fixture.run(&mut state, expire(entry_id)));
        let snapshot = state.entries.clone();
        let second = completed(fixture.run(&mut state, expire(entry_id)));

        assert!(matches!(first, CommandOutcome::OfferExpired { expired: true, .. }));
        assert!(matches!(second, CommandOutcome::OfferExpired { expired: false, .. }));
        assert_eq!(state.entries, snapshot);
    }

    #[test]
    fn test_expire_after_purchase_is_noop() {
        let fixture = Fixture::new(1);
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

        fixture.clock.advance(Duration::hours(1));
        fixture.run(&mut state, expire(entry_id));

        assert_eq!(state.entry(&entry_id).unwrap().status, EntryStatus::Purchased);
        assert_eq!(state.tickets.len(), 1);
    }

    #[test]
    fn test_release_frees_capacity_immediately() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        let alice = joined_entry(fixture.join(&mut state, "alice"));
        let bob = joined_entry(fixture.join(&mut state, "bob"));

        let outcome = completed(fixture.run(
            &mut state,
            WaitlistAction::ReleaseOffer {
                request_id: RequestId::new(),
                entry_id: alice,
            },
        ));

        assert_eq!(outcome, CommandOutcome::OfferReleased { promoted: vec![bob] });
        assert_eq!(state.entry(&alice).unwrap().status, EntryStatus::Expired);
    }

    #[test]
    fn test_release_requires_offered_status() {
        let fixture = Fixture::new(1);
        let mut state = fixture.state();
        fixture.join(&mut state, "alice");
        let bob = joined_entry(fixture.join(&mut state, "bob"));

        let error = rejected(fixture.run(
            &mut state,
            WaitlistAction::ReleaseOffer {
                request_id: RequestId::new(),
                entry_id: bob,
            },
        ));
        assert!(matches!(error, LedgerError::InvalidState(_)));

        let missing = crate::types::EntryId::new();
        let error = rejected(fixture.run(
            &mut state,
            WaitlistAction::ReleaseOffer {
                request_id: RequestId::new(),
                entry_id: missing,
            },
        ));
        assert_eq!(error, LedgerError::OfferNotFound(missing));
    }

    #[test]
    fn test_sweep_expires_all_lapsed_offers() {
        let fixture = Fixture::new(2);
        let mut state = fixture.state();
        let alice = joined_entry(fixture.join(&mut state, "alice"));
        let bob = joined_entry(fixture.join(&mut state, "bob"));
        let carol = joined_entry(fixture.join(&mut state, "carol"));

        fixture.clock.advance(Duration::minutes(45));
        let outcome = completed(fixture.run(
            &mut state,
            WaitlistAction::SweepExpiredOffers {
                request_id: RequestId::new(),
            },
        ));

        let CommandOutcome::Swept { expired, promoted } = outcome else {
            unreachable!("sweep must answer with Swept");
        };
        assert_eq!(expired, vec![alice, bob]);
        assert_eq!(promoted, vec![carol]);
    }
}
