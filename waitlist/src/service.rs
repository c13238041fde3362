//! Public facade over the per-event stores.
//!
//! Each event gets its own [`Store`], created lazily the first time the event
//! is touched. Commands for one event go through that store's write lock and
//! never interleave; different events run in parallel.
//!
//! Commands are request/response: the service tags each command with a fresh
//! [`RequestId`] and waits on the store's action broadcast for the reply that
//! carries it.

use crate::aggregates::{CommandOutcome, WaitlistAction, WaitlistEnvironment, WaitlistReducer};
use crate::availability::availability;
use crate::catalog::EventCatalog;
use crate::config::Config;
use crate::error::{LedgerError, WaitlistError};
use crate::types::{
    Availability, EntryId, EventId, EventMetrics, JoinReceipt, QueuePosition, RequestId, Ticket,
    TicketId, TicketStatus, UserId, ValidationOutcome, WaitlistEntry, WaitlistState,
};
use fairqueue_core::environment::Clock;
use fairqueue_runtime::{Store, StoreConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Store owning one event's waitlist and tickets
pub type EventStore = Store<WaitlistState, WaitlistAction, WaitlistEnvironment, WaitlistReducer>;

/// Result of one [`WaitlistService::sweep`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries whose offers were expired
    pub expired: Vec<EntryId>,
    /// Entries promoted afterwards
    pub promoted: Vec<EntryId>,
}

/// Admission-control engine for every event in a catalog
pub struct WaitlistService {
    catalog: Arc<dyn EventCatalog>,
    clock: Arc<dyn Clock>,
    config: Config,
    stores: RwLock<HashMap<EventId, EventStore>>,
    ticket_events: RwLock<HashMap<TicketId, EventId>>,
}

impl WaitlistService {
    /// Creates a service with no open stores
    #[must_use]
    pub fn new(catalog: Arc<dyn EventCatalog>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            catalog,
            clock,
            config,
            stores: RwLock::new(HashMap::new()),
            ticket_events: RwLock::new(HashMap::new()),
        }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Waitlist Ledger
    // ========================================================================

    /// Join the waitlist for an event
    ///
    /// # Errors
    ///
    /// `Validation` for a blank buyer, `NotFound` / `EventCancelled` for an
    /// unusable event, `AlreadyQueued` if the buyer has an active entry.
    #[tracing::instrument(skip_all, fields(%event_id, %buyer_id))]
    pub async fn join(&self, event_id: EventId, buyer_id: UserId) -> Result<JoinReceipt, WaitlistError> {
        match self
            .dispatch(event_id, |request_id| WaitlistAction::JoinWaitlist { request_id, buyer_id })
            .await?
        {
            CommandOutcome::Joined(receipt) => Ok(receipt),
            _ => Err(WaitlistError::UnexpectedOutcome("Joined")),
        }
    }

    /// The buyer's active entry and rank, `None` if not queued
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    #[tracing::instrument(skip_all, fields(%event_id, %buyer_id))]
    pub async fn position(
        &self,
        event_id: EventId,
        buyer_id: &UserId,
    ) -> Result<Option<QueuePosition>, WaitlistError> {
        let store = self.store_for(event_id).await?;
        Ok(store.state(|s| s.position_of(buyer_id)).await)
    }

    /// Every entry ever created for the event, in join order
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    pub async fn entries(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let store = self.store_for(event_id).await?;
        Ok(store.state(|s| s.entries.clone()).await)
    }

    // ========================================================================
    // Inventory Accountant
    // ========================================================================

    /// Capacity view at the current instant
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    #[tracing::instrument(skip_all, fields(%event_id))]
    pub async fn availability(&self, event_id: EventId) -> Result<Availability, WaitlistError> {
        let record = self.catalog.event(&event_id).ok_or(LedgerError::NotFound(event_id))?;
        let store = self.store_for(event_id).await?;
        let now = self.clock.now();
        Ok(store.state(|s| availability(&record, s, now)).await)
    }

    // ========================================================================
    // Offer Scheduler / Queue Admission
    // ========================================================================

    /// Give an offer back before its deadline
    ///
    /// Returns the entries promoted into the freed seat.
    ///
    /// # Errors
    ///
    /// `OfferNotFound` for an unknown entry, `InvalidState` if not offered.
    #[tracing::instrument(skip_all, fields(%event_id, %entry_id))]
    pub async fn release(&self, event_id: EventId, entry_id: EntryId) -> Result<Vec<EntryId>, WaitlistError> {
        match self
            .dispatch(event_id, |request_id| WaitlistAction::ReleaseOffer { request_id, entry_id })
            .await?
        {
            CommandOutcome::OfferReleased { promoted } => Ok(promoted),
            _ => Err(WaitlistError::UnexpectedOutcome("OfferReleased")),
        }
    }

    /// Expire an offer if its deadline has passed
    ///
    /// Returns whether the entry transitioned. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    #[tracing::instrument(skip_all, fields(%event_id, %entry_id))]
    pub async fn expire(&self, event_id: EventId, entry_id: EntryId) -> Result<bool, WaitlistError> {
        match self
            .dispatch(event_id, |request_id| WaitlistAction::ExpireOffer { request_id, entry_id })
            .await?
        {
            CommandOutcome::OfferExpired { expired, .. } => Ok(expired),
            _ => Err(WaitlistError::UnexpectedOutcome("OfferExpired")),
        }
    }

    /// Promote waiting buyers into any free capacity
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    #[tracing::instrument(skip_all, fields(%event_id))]
    pub async fn reconcile(&self, event_id: EventId) -> Result<Vec<EntryId>, WaitlistError> {
        match self
            .dispatch(event_id, |request_id| WaitlistAction::Reconcile { request_id })
            .await?
        {
            CommandOutcome::Reconciled { promoted } => Ok(promoted),
            _ => Err(WaitlistError::UnexpectedOutcome("Reconciled")),
        }
    }

    /// Expire every lapsed offer of one event, then reconcile
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    #[tracing::instrument(skip_all, fields(%event_id))]
    pub async fn sweep(&self, event_id: EventId) -> Result<SweepReport, WaitlistError> {
        match self
            .dispatch(event_id, |request_id| WaitlistAction::SweepExpiredOffers { request_id })
            .await?
        {
            CommandOutcome::Swept { expired, promoted } => Ok(SweepReport { expired, promoted }),
            _ => Err(WaitlistError::UnexpectedOutcome("Swept")),
        }
    }

    /// Sweep every open store concurrently
    ///
    /// Failures are logged and skipped. Returns the number of offers expired.
    pub async fn sweep_all(&self) -> usize {
        let event_ids: Vec<EventId> = self.stores.read().await.keys().copied().collect();

        let results = futures::future::join_all(event_ids.iter().map(|&id| self.sweep(id))).await;

        results
            .into_iter()
            .zip(event_ids)
            .map(|(result, event_id)| match result {
                Ok(report) => report.expired.len(),
                Err(error) => {
                    tracing::warn!(%event_id, %error, "Sweep failed");
                    0
                },
            })
            .sum()
    }

    // ========================================================================
    // Ticket Ledger
    // ========================================================================

    /// Turn a live offer into a ticket
    ///
    /// # Errors
    ///
    /// `OfferNotFound` if the entry is missing, not the buyer's, or not
    /// offered; `OfferExpired` past the deadline; `EventCancelled`.
    #[tracing::instrument(skip_all, fields(%event_id, %entry_id, %buyer_id))]
    pub async fn purchase(
        &self,
        event_id: EventId,
        entry_id: EntryId,
        buyer_id: UserId,
    ) -> Result<Ticket, WaitlistError> {
        let outcome = self
            .dispatch(event_id, |request_id| WaitlistAction::PurchaseTicket {
                request_id,
                entry_id,
                buyer_id,
            })
            .await?;

        let CommandOutcome::Purchased(ticket) = outcome else {
            return Err(WaitlistError::UnexpectedOutcome("Purchased"));
        };
        self.ticket_events.write().await.insert(ticket.ticket_id, event_id);
        Ok(ticket)
    }

    /// Scan a ticket at the door
    ///
    /// An unauthorized requester gets `success: false`, not an error.
    ///
    /// # Errors
    ///
    /// `TicketNotFound` for an unknown ticket, `AlreadyUsed` unless valid.
    #[tracing::instrument(skip_all, fields(%ticket_id, %requester_id))]
    pub async fn validate(
        &self,
        ticket_id: TicketId,
        requester_id: UserId,
        event_owner_id: UserId,
    ) -> Result<ValidationOutcome, WaitlistError> {
        let event_id = self.event_of(ticket_id).await?;
        match self
            .dispatch(event_id, |request_id| WaitlistAction::ValidateTicket {
                request_id,
                ticket_id,
                requester_id,
                event_owner_id,
            })
            .await?
        {
            CommandOutcome::Validated(outcome) => Ok(outcome),
            _ => Err(WaitlistError::UnexpectedOutcome("Validated")),
        }
    }

    /// Refund every seated ticket of an event
    ///
    /// Does not promote anyone. Returns the number of refunded tickets.
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    #[tracing::instrument(skip_all, fields(%event_id))]
    pub async fn cancel_all(&self, event_id: EventId) -> Result<usize, WaitlistError> {
        match self
            .dispatch(event_id, |request_id| WaitlistAction::CancelAllTickets { request_id })
            .await?
        {
            CommandOutcome::TicketsRefunded { refunded } => Ok(refunded.len()),
            _ => Err(WaitlistError::UnexpectedOutcome("TicketsRefunded")),
        }
    }

    /// Move a ticket to `status`
    ///
    /// # Errors
    ///
    /// `TicketNotFound` for an unknown ticket, `InvalidState` for a
    /// disallowed transition.
    #[tracing::instrument(skip_all, fields(%ticket_id, %status))]
    pub async fn update_ticket_status(
        &self,
        ticket_id: TicketId,
        status: TicketStatus,
    ) -> Result<Ticket, WaitlistError> {
        let event_id = self.event_of(ticket_id).await?;
        match self
            .dispatch(event_id, |request_id| WaitlistAction::UpdateTicketStatus {
                request_id,
                ticket_id,
                status,
            })
            .await?
        {
            CommandOutcome::TicketUpdated { ticket, .. } => Ok(ticket),
            _ => Err(WaitlistError::UnexpectedOutcome("TicketUpdated")),
        }
    }

    /// Seated (`Valid` or `Used`) tickets of an event
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    pub async fn tickets_for_event(&self, event_id: EventId) -> Result<Vec<Ticket>, WaitlistError> {
        let store = self.store_for(event_id).await?;
        Ok(store
            .state(|s| s.seated_tickets().into_iter().cloned().collect())
            .await)
    }

    /// The buyer's ticket for an event, in any status
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    pub async fn ticket_for_buyer(
        &self,
        event_id: EventId,
        buyer_id: &UserId,
    ) -> Result<Option<Ticket>, WaitlistError> {
        let store = self.store_for(event_id).await?;
        Ok(store.state(|s| s.ticket_for_buyer(buyer_id).cloned()).await)
    }

    /// Look up a ticket by id
    ///
    /// # Errors
    ///
    /// `TicketNotFound` for an unknown ticket.
    pub async fn ticket(&self, ticket_id: TicketId) -> Result<Ticket, WaitlistError> {
        let event_id = self.event_of(ticket_id).await?;
        let store = self.store_for(event_id).await?;
        store
            .state(|s| s.ticket(&ticket_id).cloned())
            .await
            .ok_or_else(|| LedgerError::TicketNotFound(ticket_id).into())
    }

    /// Seller dashboard counters
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no such event.
    pub async fn event_metrics(&self, event_id: EventId) -> Result<EventMetrics, WaitlistError> {
        let store = self.store_for(event_id).await?;
        Ok(store.state(WaitlistState::metrics).await)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Number of open per-event stores
    pub async fn open_stores(&self) -> usize {
        self.stores.read().await.len()
    }

    /// Shut down every store, abandoning armed offer timers
    ///
    /// Deadlines stay in state; a sweep after restart expires what the timers
    /// would have.
    ///
    /// # Errors
    ///
    /// The first store error encountered; every store is still asked to stop.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), WaitlistError> {
        let stores: Vec<(EventId, EventStore)> = self
            .stores
            .read()
            .await
            .iter()
            .map(|(id, store)| (*id, store.clone()))
            .collect();

        tracing::info!(stores = stores.len(), "Shutting down event stores");

        let results = futures::future::join_all(stores.iter().map(|(_, store)| store.shutdown(timeout))).await;

        let mut first_error = None;
        for ((event_id, _), result) in stores.iter().zip(results) {
            if let Err(error) = result {
                tracing::warn!(%event_id, %error, "Store shutdown failed");
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), |error| Err(error.into()))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Send a command to the event's store and wait for its reply
    async fn dispatch<F>(&self, event_id: EventId, command: F) -> Result<CommandOutcome, WaitlistError>
    where
        F: FnOnce(RequestId) -> WaitlistAction,
    {
        let store = self.store_for(event_id).await?;
        let request_id = RequestId::new();

        let reply = store
            .send_and_wait_for(
                command(request_id),
                |action| action.reply_to() == Some(request_id),
                self.config.request_timeout(),
            )
            .await?;

        match reply {
            WaitlistAction::CommandCompleted { outcome, .. } => Ok(outcome),
            WaitlistAction::CommandRejected { error, .. } => Err(error.into()),
            _ => Err(WaitlistError::UnexpectedOutcome("a reply action")),
        }
    }

    /// The event's store, opened on first use
    async fn store_for(&self, event_id: EventId) -> Result<EventStore, WaitlistError> {
        if let Some(store) = self.stores.read().await.get(&event_id) {
            return Ok(store.clone());
        }

        if self.catalog.event(&event_id).is_none() {
            return Err(LedgerError::NotFound(event_id).into());
        }

        let mut stores = self.stores.write().await;
        let store = stores
            .entry(event_id)
            .or_insert_with(|| {
                tracing::debug!(%event_id, "Opening event store");
                let env = WaitlistEnvironment::new(
                    Arc::clone(&self.clock),
                    Arc::clone(&self.catalog),
                    self.config.offer_ttl(),
                );
                let config = StoreConfig::default()
                    .with_broadcast_capacity(self.config.store.action_broadcast_capacity)
                    .with_shutdown_timeout(self.config.shutdown_timeout());
                Store::with_config(WaitlistState::new(event_id), WaitlistReducer::new(), env, config)
            })
            .clone();
        crate::metrics::update_active_stores(stores.len());

        Ok(store)
    }

    /// Event a ticket belongs to
    ///
    /// Falls back to scanning open stores for tickets issued before this
    /// service instance indexed them.
    async fn event_of(&self, ticket_id: TicketId) -> Result<EventId, WaitlistError> {
        if let Some(event_id) = self.ticket_events.read().await.get(&ticket_id) {
            return Ok(*event_id);
        }

        let stores: Vec<(EventId, EventStore)> = self
            .stores
            .read()
            .await
            .iter()
            .map(|(id, store)| (*id, store.clone()))
            .collect();

        for (event_id, store) in stores {
            if store.state(|s| s.ticket(&ticket_id).is_some()).await {
                self.ticket_events.write().await.insert(ticket_id, event_id);
                return Ok(event_id);
            }
        }

        Err(LedgerError::TicketNotFound(ticket_id).into())
    }
}
