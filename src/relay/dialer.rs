//! Outbound links to upstream relays
//!
//! Each configured upstream gets a `Dialer` that connects, runs a normal
//! peer session over the link, and reconnects with exponential backoff
//! when the link drops.

use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};
use url::Url;

use crate::config::PeerSettings;
use crate::error::{Error, Result};

use super::{run_session, RelayBroadcaster};

/// Settings for one upstream link
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// `ws://` or `wss://` URL of the upstream relay
    pub url: String,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum consecutive failed attempts (0 = infinite)
    pub max_reconnect_attempts: u32,

    /// Initial reconnect delay
    pub initial_reconnect_delay: Duration,

    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,

    /// Outbound queue depth for the session
    pub queue_size: usize,
}

impl DialerConfig {
    pub fn from_settings(url: impl Into<String>, peers: &PeerSettings, queue_size: usize) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_millis(peers.connect_timeout_ms),
            max_reconnect_attempts: peers.max_reconnect_attempts,
            initial_reconnect_delay: Duration::from_millis(peers.reconnect_interval_ms),
            max_reconnect_delay: Duration::from_millis(peers.max_reconnect_delay_ms),
            queue_size,
        }
    }
}

/// Maintains one upstream link
pub struct Dialer {
    config: DialerConfig,
    broadcaster: Arc<RelayBroadcaster>,
}

impl Dialer {
    pub fn new(config: DialerConfig, broadcaster: Arc<RelayBroadcaster>) -> Self {
        Self { config, broadcaster }
    }

    /// Connect and reconnect until shutdown or the attempt limit
    ///
    /// Returns an error when the URL is unusable, when a connect error is
    /// not retryable, or when the attempt limit is exhausted.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let url = Url::parse(&self.config.url)
            .map_err(|e| Error::connection_failed(&self.config.url, format!("Invalid URL: {}", e)))?;

        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_reconnect_delay,
            max_interval: self.config.max_reconnect_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            info!(url = %url, "Connecting to upstream relay");

            match tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str())).await {
                Ok(Ok((ws, _response))) => {
                    backoff.reset();
                    failures = 0;

                    let _ = run_session(
                        ws,
                        url.to_string(),
                        Arc::clone(&self.broadcaster),
                        self.config.queue_size,
                        shutdown.clone(),
                    )
                    .await;
                }
                Ok(Err(e)) => {
                    let err = Error::from(e);
                    if !err.is_retryable() {
                        error!(url = %url, error = %err.format_for_log(), "Upstream connection cannot succeed");
                        return Err(err);
                    }
                    warn!(url = %url, error = %err.format_for_log(), "Upstream connection failed");
                    failures += 1;
                }
                Err(_) => {
                    let err = Error::ConnectionTimeout {
                        url: url.to_string(),
                        timeout_ms: self.config.connect_timeout.as_millis() as u64,
                    };
                    warn!(error = %err.format_for_log(), "Upstream connection timed out");
                    failures += 1;
                }
            }

            if *shutdown.borrow() {
                break;
            }

            if self.config.max_reconnect_attempts > 0 && failures >= self.config.max_reconnect_attempts {
                error!(
                    url = %url,
                    attempts = failures,
                    "Max reconnection attempts reached"
                );
                return Err(Error::connection_failed(
                    url.as_str(),
                    format!("gave up after {} attempts", failures),
                ));
            }

            let delay = backoff.next_backoff().unwrap_or(self.config.max_reconnect_delay);
            info!(url = %url, delay_ms = delay.as_millis() as u64, "Waiting before reconnection");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(url = %url, "Upstream dialer stopped");
        Ok(())
    }
}
