//! Periodic expiry sweep.
//!
//! Offer timers live in memory and die with the store. The sweeper walks
//! every open event store on a fixed interval and expires whatever offers
//! the stored deadlines say have lapsed, so an expiry is never lost.
//!
//! # Example
//!
//! ```rust,ignore
//! let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//! let handle = OfferSweeper::new(service.clone(), config.sweep_interval(), shutdown_rx).spawn();
//!
//! // Later
//! let _ = shutdown_tx.send(());
//! handle.await?;
//! ```

use crate::service::WaitlistService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Background task that sweeps lapsed offers
pub struct OfferSweeper {
    service: Arc<WaitlistService>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl OfferSweeper {
    /// Create a sweeper.
    ///
    /// # Arguments
    ///
    /// * `service` - Service whose open stores are swept
    /// * `interval` - Time between sweeps
    /// * `shutdown` - Broadcast receiver for graceful shutdown
    #[must_use]
    pub fn new(service: Arc<WaitlistService>, interval: Duration, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            service,
            interval,
            shutdown,
        }
    }

    /// Spawn the sweeper as a background task.
    ///
    /// The task runs until a shutdown signal is received or the sender is
    /// dropped.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(interval = ?self.interval, "Offer sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Offer sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = self.service.sweep_all().await;
                    if expired > 0 {
                        info!(expired, "Sweep expired lapsed offers");
                    } else {
                        debug!("Sweep found nothing to expire");
                    }
                }
            }
        }

        info!("Offer sweeper stopped");
    }
}
