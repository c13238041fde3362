//! Fair waitlist admission engine.
//!
//! Allocates a fixed, non-negative pool of tickets per event among competing
//! buyers through short-lived purchase offers. Buyers join a FIFO waitlist;
//! when capacity is free they receive an offer with a deadline; unclaimed
//! offers expire and the next waiting buyer is promoted.
//!
//! # Architecture
//!
//! ```text
//!   WaitlistService ──► Store (one per event, write lock per command)
//!                          │
//!                          ▼
//!                    WaitlistReducer
//!        ┌───────────┬─────┴──────┬────────────┐
//!        ▼           ▼            ▼            ▼
//!    waitlist     offers      admission     tickets
//!     (join)   (expire/...)  (reconcile)  (purchase/...)
//!        │           │            │            │
//!        └───────────┴─────┬──────┴────────────┘
//!                          ▼
//!                availability (derived)
//!
//!   OfferSweeper ──► sweep_all (periodic, re-derives expiry from deadlines)
//! ```
//!
//! # Guarantees
//!
//! ```text
//! purchased + active_offers <= total_tickets       (never oversell)
//! active_offers = Offered entries with offer_expires_at > now
//! ```
//!
//! Every read-modify-write for an event runs inside one reducer call under the
//! store's write lock, so availability checks and the writes they justify
//! cannot interleave with another command for the same event.
//!
//! # Usage
//!
//! See [`service::WaitlistService`] for the public operations and the
//! [`aggregates`] module for the reducer and its tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod availability;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod sweeper;
pub mod types;

pub use aggregates::{CommandOutcome, WaitlistAction, WaitlistEnvironment, WaitlistReducer};
pub use catalog::{EventCatalog, InMemoryEventCatalog};
pub use config::Config;
pub use error::{ErrorKind, LedgerError, WaitlistError};
pub use service::{SweepReport, WaitlistService};
pub use sweeper::OfferSweeper;
pub use types::*;
