//! Ticket ledger: purchase, door validation, bulk refund and status changes.

use super::{CommandOutcome, Effects, WaitlistAction, WaitlistEnvironment, WaitlistReducer};
use crate::error::LedgerError;
use crate::types::{
    EntryId, EntryStatus, Ticket, TicketId, TicketStatus, UserId, ValidationOutcome, WaitlistState,
};

impl WaitlistReducer {
    /// Handle `PurchaseTicket`
    ///
    /// The offer must belong to `buyer_id`, still be `Offered`, and not be
    /// past its deadline. The entry is consumed; no capacity is freed, so no
    /// reconcile runs.
    pub(super) fn purchase(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        entry_id: EntryId,
        buyer_id: &UserId,
    ) -> Result<Ticket, LedgerError> {
        let now = env.clock.now();

        let entry = state
            .entry(&entry_id)
            .filter(|e| &e.buyer_id == buyer_id && e.status == EntryStatus::Offered)
            .ok_or(LedgerError::OfferNotFound(entry_id))?;
        if !entry.holds_capacity(now) {
            return Err(LedgerError::OfferExpired(entry_id));
        }
        Self::live_event(state, env)?;

        let ticket = Ticket {
            ticket_id: TicketId::new(),
            event_id: state.event_id,
            buyer_id: buyer_id.clone(),
            entry_id,
            status: TicketStatus::Valid,
            purchased_at: now,
            updated_at: now,
        };

        Self::apply_event(
            state,
            &WaitlistAction::TicketPurchased {
                ticket_id: ticket.ticket_id,
                entry_id,
                buyer_id: buyer_id.clone(),
                purchased_at: now,
            },
        );
        crate::metrics::record_ticket(TicketStatus::Valid);
        tracing::info!(
            event_id = %state.event_id,
            %entry_id,
            ticket_id = %ticket.ticket_id,
            buyer_id = %buyer_id,
            "Ticket purchased"
        );

        Ok(ticket)
    }

    /// Handle `ValidateTicket`
    ///
    /// A requester who is not the event owner gets `success: false`, not an
    /// error. The supplied owner id must also match the catalog's owner.
    pub(super) fn validate(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        ticket_id: TicketId,
        requester_id: &UserId,
        event_owner_id: &UserId,
    ) -> Result<ValidationOutcome, LedgerError> {
        let ticket = state.ticket(&ticket_id).ok_or(LedgerError::TicketNotFound(ticket_id))?;
        let record = env
            .catalog
            .event(&state.event_id)
            .ok_or(LedgerError::NotFound(state.event_id))?;

        if requester_id != event_owner_id || event_owner_id != &record.owner_id {
            tracing::debug!(%ticket_id, requester_id = %requester_id, "Validation refused: not the event owner");
            return Ok(ValidationOutcome {
                success: false,
                message: "Only the event owner can validate tickets".to_string(),
            });
        }

        if ticket.status != TicketStatus::Valid {
            return Err(LedgerError::AlreadyUsed(ticket_id));
        }

        Self::apply_event(
            state,
            &WaitlistAction::TicketStatusChanged {
                ticket_id,
                status: TicketStatus::Used,
                changed_at: env.clock.now(),
            },
        );
        crate::metrics::record_ticket(TicketStatus::Used);
        tracing::info!(event_id = %state.event_id, %ticket_id, "Ticket validated");

        Ok(ValidationOutcome {
            success: true,
            message: "Ticket validated".to_string(),
        })
    }

    /// Handle `CancelAllTickets`
    ///
    /// Refunds every `Valid` or `Used` ticket. The event is closing, so the
    /// freed seats are not offered to anyone.
    pub(super) fn cancel_all(state: &mut WaitlistState, env: &WaitlistEnvironment) -> Vec<TicketId> {
        let now = env.clock.now();
        let refunded: Vec<TicketId> = state
            .seated_tickets()
            .iter()
            .map(|t| t.ticket_id)
            .collect();

        for ticket_id in &refunded {
            Self::apply_event(
                state,
                &WaitlistAction::TicketStatusChanged {
                    ticket_id: *ticket_id,
                    status: TicketStatus::Refunded,
                    changed_at: now,
                },
            );
            crate::metrics::record_ticket(TicketStatus::Refunded);
        }

        tracing::info!(event_id = %state.event_id, refunded = refunded.len(), "Tickets refunded");
        refunded
    }

    /// Handle `UpdateTicketStatus`
    ///
    /// A ticket leaving `Valid | Used` frees a seat, which is offered to the
    /// queue unless the event is cancelled.
    pub(super) fn update_ticket_status(
        state: &mut WaitlistState,
        env: &WaitlistEnvironment,
        ticket_id: TicketId,
        status: TicketStatus,
        effects: &mut Effects,
    ) -> Result<CommandOutcome, LedgerError> {
        let ticket = state.ticket(&ticket_id).ok_or(LedgerError::TicketNotFound(ticket_id))?;
        let from = ticket.status;
        if !from.can_transition_to(status) {
            return Err(LedgerError::InvalidState(format!(
                "Ticket {ticket_id} cannot move from {from} to {status}"
            )));
        }

        let now = env.clock.now();
        let mut updated = ticket.clone();
        updated.status = status;
        updated.updated_at = now;

        Self::apply_event(
            state,
            &WaitlistAction::TicketStatusChanged {
                ticket_id,
                status,
                changed_at: now,
            },
        );
        crate::metrics::record_ticket(status);
        tracing::info!(event_id = %state.event_id, %ticket_id, %from, to = %status, "Ticket status changed");

        let promoted = if from.occupies_seat() && !status.occupies_seat() {
            Self::reconcile(state, env, effects)
        } else {
            Vec::new()
        };

        Ok(CommandOutcome::TicketUpdated {
            ticket: updated,
            promoted,
        })
    }
}
