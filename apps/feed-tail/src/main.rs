//! feed-tail: subscribes to feed topics and logs everything that arrives.
//!
//! Usage: `feed-tail [config.json]`

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use feedwire_auth::TokenResolver;
use feedwire_session::{SessionEvent, SessionManager, WsTransport};

use crate::config::TailConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,feedwire=debug")),
        )
        .init();

    let config = TailConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;
    if config.topics.is_empty() {
        bail!("no topics configured");
    }
    info!(url = %config.url, topics = ?config.topics, "starting feed-tail");

    let transport = Arc::new(WsTransport::new(config.transport_config()));
    let session = SessionManager::new(
        transport,
        config.session_config(),
        TokenResolver::default(),
    )?;
    let mut events = session.subscribe();

    session
        .listen(config.topics.clone(), config.token.clone(), None)
        .await
        .context("registering topics")?;
    session.connect().await.context("connecting to the feed")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                log_event(event);
            }
        }
    }

    if let Err(e) = session.disconnect().await {
        warn!(error = %e, "disconnect failed");
    }
    session.shutdown();
    Ok(())
}

fn log_event(event: SessionEvent) {
    match event {
        SessionEvent::Connected => info!("connected, topics replayed"),
        SessionEvent::Disconnected { manual: true, .. } => info!("disconnected"),
        SessionEvent::Disconnected {
            manual: false,
            reason,
        } => match reason {
            Some(reason) => error!(%reason, "connection lost"),
            None => warn!("connection lost"),
        },
        SessionEvent::Message { topic, payload } => {
            println!("{topic}\t{payload}");
        }
        SessionEvent::Pong { latency, sent_at } => {
            info!(latency_ms = latency.as_millis() as u64, %sent_at, "pong");
        }
    }
}
