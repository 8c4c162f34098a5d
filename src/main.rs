//! sslv-watch: announces new ss.lv listings to Telegram subscribers.
//!
//! ## Architecture overview
//!
//! ```text
//!                 fetch (concurrent)          new listings
//! ┌───────────┐ ◄──────────────────┌─────────┐ ───────────► ┌───────────┐
//! │ source/   │                    │ poll.rs │              │ notify.rs │
//! │ (RSS/HTTP)│ ──────────────────►│ (task)  │              │ (fan-out) │
//! └───────────┘    raw listings    └─────────┘              └───────────┘
//!                                   │      ▲                      │
//!                        diff/replace│      │categories     filter│ send
//!                                   ▼      │                      ▼
//!                             ┌─────────┐ ┌──────────────────┐ ┌────────────┐
//!                             │ seen.rs │ │ subscriptions.rs │ │ transport/ │
//!                             └─────────┘ └──────────────────┘ └────────────┘
//!                                              ▲
//!                                              │ /monitor /stop /price
//!                                        ┌─────────────┐
//!                                        │ commands.rs │ (task)
//!                                        └─────────────┘
//! ```
//!
//! * **`source/`** — the `FeedSource` trait, the HTTP feed client and
//!   category path handling.
//! * **`extract/`** — pulls labelled attributes, image and price out of a
//!   listing's HTML description.
//! * **`poll`** — the poll loop: fetch, diff against the seen set, hand new
//!   listings to the notifier.
//! * **`notify`** — per-subscriber price filtering and message formatting.
//! * **`seen`** / **`subscriptions`** — the two persisted documents, each
//!   behind its own lock.
//! * **`store`** — JSON-file persistence.
//! * **`transport/`** — Telegram Bot API client.
//! * **`commands`** — chat commands and the inbound update loop.
//! * **`main`** — wires everything together: logging, config, tasks and
//!   graceful shutdown.

mod commands;
mod config;
mod error;
mod extract;
mod notify;
mod poll;
mod seen;
mod source;
mod store;
mod subscriptions;
mod transport;

#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use commands::CommandHandler;
use config::{Config, DEFAULT_CONFIG_PATH};
use extract::AttributeExtractor;
use notify::Notifier;
use poll::PollEngine;
use seen::SeenStore;
use source::FeedClient;
use store::{JsonFileStore, KvStore};
use subscriptions::SubscriptionStore;
use transport::TelegramClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // -- configuration -------------------------------------------------------
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    let config = Config::load(Path::new(&config_path))?;
    tracing::info!(
        interval_secs = config.interval,
        data_dir = %config.data_dir.display(),
        admins = config.admins.len(),
        channel_preferences = config.channel_preferences.len(),
        "configuration loaded"
    );

    // -- state ---------------------------------------------------------------
    let kv: Arc<dyn KvStore> = Arc::new(JsonFileStore::new(&config.data_dir));
    let seen = Arc::new(SeenStore::load(kv.clone())?);
    let subscriptions = Arc::new(SubscriptionStore::load(kv)?);

    // -- components ----------------------------------------------------------
    let http = reqwest::Client::builder()
        .timeout(config.fetch_timeout())
        .build()?;
    let feeds = Arc::new(FeedClient::new(http.clone(), seen.feed_root().await));
    let telegram = Arc::new(TelegramClient::new(http, &config.token));

    let engine = Arc::new(PollEngine::new(
        feeds,
        seen,
        subscriptions.clone(),
        AttributeExtractor::new(&config.price_field),
    ));
    let notifier = Arc::new(Notifier::new(subscriptions.clone(), telegram.clone()));
    let handler = Arc::new(CommandHandler::new(engine.clone(), subscriptions));

    // -- tasks ---------------------------------------------------------------
    let shutdown = CancellationToken::new();
    let poller = tokio::spawn(engine.run(notifier, config.interval(), shutdown.clone()));
    let bot = tokio::spawn(commands::run(telegram, handler, shutdown.clone()));

    shutdown_signal().await;
    tracing::info!("shutdown requested, waiting for the current poll cycle");
    shutdown.cancel();

    // The poll task only exits between cycles, so awaiting it guarantees the
    // seen set of the last cycle has been written.
    let (poller, bot) = tokio::join!(poller, bot);
    for result in [poller, bot] {
        if let Err(e) = result {
            tracing::error!("task ended abnormally: {e}");
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
