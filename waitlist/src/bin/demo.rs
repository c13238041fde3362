//! Waitlist Engine Demo
//!
//! Walks through a single-ticket event with two buyers:
//! - Alice joins and receives the only offer
//! - Bob joins and waits
//! - Alice's offer lapses; the sweep expires it and promotes Bob
//! - Bob buys; the owner scans his ticket at the door
//!
//! Offer lifetime defaults to 30 minutes. Set `OFFER_TTL_SECS=2` to watch the
//! hand-over happen in real time.
//!
//! # Usage
//!
//! ```bash
//! OFFER_TTL_SECS=2 cargo run --bin demo
//! ```

use anyhow::Context;
use fairqueue_core::environment::SystemClock;
use fairqueue_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waitlist::{
    Config, EventId, EventRecord, InMemoryEventCatalog, OfferSweeper, UserId, WaitlistService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.observability.log_level)
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        offer_ttl_secs = config.offers.ttl_secs,
        log_level = %config.observability.log_level,
        sweep_interval_secs = config.offers.sweep_interval_secs,
        "Configuration loaded"
    );

    let mut metrics_server = None;
    if config.observability.metrics_enabled {
        let addr = config.metrics_addr().parse().context("invalid metrics address")?;
        let mut server = MetricsServer::new(addr);
        server.start()?;
        waitlist::metrics::register_business_metrics();
        metrics_server = Some(server);
    }

    println!("\n🎫 ============================================");
    println!("   Waitlist Engine - Live Demo");
    println!("============================================\n");

    let catalog = Arc::new(InMemoryEventCatalog::new());
    let event = EventRecord::new(EventId::new(), UserId::from("venue"), "Single Seat Recital", 1);
    let event_id = event.event_id;
    catalog.insert(event);

    let service = Arc::new(WaitlistService::new(catalog, Arc::new(SystemClock), config.clone()));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = OfferSweeper::new(Arc::clone(&service), config.sweep_interval(), shutdown_rx).spawn();

    // ========== Demo Scenario ==========

    println!("📋 Event {event_id}: 1 ticket\n");

    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    let receipt = service.join(event_id, alice.clone()).await?;
    println!("👤 Alice joins → {}", serde_json::to_string_pretty(&receipt)?);

    let receipt = service.join(event_id, bob.clone()).await?;
    println!("👤 Bob joins → {}", serde_json::to_string_pretty(&receipt)?);

    let availability = service.availability(event_id).await?;
    println!("📊 Availability → {}", serde_json::to_string(&availability)?);

    if let Some(position) = service.position(event_id, &bob).await? {
        println!(
            "🔢 Bob's position: {} (waiting rank {:?})",
            position.position, position.waiting_position
        );
    }

    // ========== Offer Hand-over ==========

    let wait = config.offer_ttl().to_std().unwrap_or_default() + config.sweep_interval();
    println!("\n⏳ Waiting {wait:?} for Alice's offer to lapse...");
    tokio::time::sleep(wait).await;

    match service.position(event_id, &bob).await? {
        Some(position) => println!("✓ Bob is now {}", position.entry.status),
        None => println!("⚠️  Bob has no active entry"),
    }

    // ========== Purchase & Validation ==========

    if let Some(position) = service.position(event_id, &bob).await? {
        let ticket = service.purchase(event_id, position.entry.entry_id, bob.clone()).await?;
        println!("\n🎟️  Bob bought ticket {}", ticket.ticket_id);

        let outcome = service
            .validate(ticket.ticket_id, UserId::from("venue"), UserId::from("venue"))
            .await?;
        println!("🚪 Door scan → {}", outcome.message);

        match service
            .validate(ticket.ticket_id, UserId::from("venue"), UserId::from("venue"))
            .await
        {
            Ok(outcome) => println!("🚪 Second scan → {}", outcome.message),
            Err(error) => println!("🚪 Second scan rejected → {error}"),
        }
    }

    let metrics = service.event_metrics(event_id).await?;
    println!("\n📈 Event metrics → {}", serde_json::to_string(&metrics)?);

    // ========== Shutdown ==========

    let _ = shutdown_tx.send(());
    if let Err(error) = sweeper.await {
        tracing::warn!(%error, "Sweeper task failed");
    }
    service.shutdown(config.shutdown_timeout()).await?;

    if let Some(rendered) = metrics_server.as_ref().and_then(MetricsServer::render) {
        println!("\n📡 Metrics scrape:\n{rendered}");
    }

    println!("\n✓ Demo complete");
    Ok(())
}
