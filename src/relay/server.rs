//! Inbound WebSocket listener
//!
//! Accepts TCP connections, upgrades them to WebSocket, and hands each one
//! to a peer session. Connections beyond `max_connections` are refused
//! before the handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerSettings;
use crate::error::{Error, Result};

use super::{run_session, RelayBroadcaster};

/// Listening relay endpoint
pub struct RelayServer {
    listener: TcpListener,
    broadcaster: Arc<RelayBroadcaster>,
    slots: Arc<Semaphore>,
    max_connections: usize,
    queue_size: usize,
}

impl RelayServer {
    /// Bind the listener
    pub async fn bind(addr: SocketAddr, broadcaster: Arc<RelayBroadcaster>, settings: &ServerSettings) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::BindFailed {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Self {
            listener,
            broadcaster,
            slots: Arc::new(Semaphore::new(settings.max_connections)),
            max_connections: settings.max_connections,
            queue_size: settings.outbound_queue_size,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept peers until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let local = self.local_addr()?;
        info!(addr = %local, max_connections = self.max_connections, "Relay listening");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Relay listener stopping");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => self.admit(stream, peer_addr, shutdown.clone()),
                        Err(e) => {
                            // Usually fd exhaustion; keep serving
                            error!(error = %e, "Accept failed");
                        }
                    }
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer_addr: SocketAddr, shutdown: watch::Receiver<bool>) {
        let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
            let err = Error::ConnectionLimit {
                max: self.max_connections,
            };
            warn!(peer = %peer_addr, error = %err, "Refusing connection");
            return;
        };

        let broadcaster = Arc::clone(&self.broadcaster);
        let queue_size = self.queue_size;

        tokio::spawn(async move {
            let _permit = permit;

            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!(peer = %peer_addr, error = %e, "WebSocket handshake failed");
                    return;
                }
            };

            // Errors are logged by the session
            let _ = run_session(ws, peer_addr.to_string(), broadcaster, queue_size, shutdown).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{MockBackend, Operands};
    use crate::protocol::OutboundMessage;
    use crate::relay::{ConnectionRegistry, Dialer, DialerConfig};
    use crate::validator::MessageValidator;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn settings(max_connections: usize) -> ServerSettings {
        ServerSettings {
            listen_addr: "127.0.0.1:0".to_string(),
            max_connections,
            ..Default::default()
        }
    }

    async fn start(max_connections: usize) -> (SocketAddr, Arc<ConnectionRegistry>, watch::Sender<bool>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(RelayBroadcaster::new(
            Arc::clone(&registry),
            Arc::new(MessageValidator::default()),
            Arc::new(MockBackend::new()),
            Operands::new(vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0]),
        ));

        let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), broadcaster, &settings(max_connections))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(server.run(shutdown_rx));
        (addr, registry, shutdown_tx)
    }

    async fn wait_for_len(registry: &ConnectionRegistry, len: usize) {
        for _ in 0..400 {
            if registry.len() == len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never reached {} connections", len);
    }

    #[tokio::test]
    async fn test_server_relays_results_to_other_peers() {
        let (addr, registry, _shutdown) = start(8).await;
        let url = format!("ws://{}", addr);

        let (mut sender, _) = connect_async(url.as_str()).await.unwrap();
        let (mut receiver, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_len(&registry, 2).await;

        sender
            .send(WsMessage::Text(r#"{"type":"COMPUTE","a":[5,5],"b":[2,7]}"#.into()))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), receiver.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = frame.into_text().unwrap();
        let OutboundMessage::ComputeResult { values, .. } = serde_json::from_str::<OutboundMessage>(&text).unwrap();
        assert_eq!(values, vec![3.0, -2.0]);

        assert!(tokio::time::timeout(Duration::from_millis(100), sender.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_server_refuses_beyond_limit() {
        let (addr, registry, _shutdown) = start(1).await;
        let url = format!("ws://{}", addr);

        let (_first, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_len(&registry, 1).await;

        assert!(connect_async(url.as_str()).await.is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_links_do_not_use_inbound_slots() {
        let (upstream_addr, upstream_registry, _upstream_shutdown) = start(8).await;

        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(RelayBroadcaster::new(
            Arc::clone(&registry),
            Arc::new(MessageValidator::default()),
            Arc::new(MockBackend::new()),
            Operands::new(vec![1.0], vec![1.0]),
        ));
        let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&broadcaster), &settings(1))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(server.run(shutdown_rx.clone()));

        let dialer = Dialer::new(
            DialerConfig {
                url: format!("ws://{}", upstream_addr),
                connect_timeout: Duration::from_secs(1),
                max_reconnect_attempts: 0,
                initial_reconnect_delay: Duration::from_millis(10),
                max_reconnect_delay: Duration::from_millis(20),
                queue_size: 8,
            },
            Arc::clone(&broadcaster),
        );
        tokio::spawn(dialer.run(shutdown_rx));
        wait_for_len(&upstream_registry, 1).await;
        wait_for_len(&registry, 1).await;

        // The single inbound slot is still free
        let (_client, _) = connect_async(format!("ws://{}", addr).as_str()).await.unwrap();
        wait_for_len(&registry, 2).await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let (addr, _registry, _shutdown) = start(1).await;
        let broadcaster = Arc::new(RelayBroadcaster::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(MessageValidator::default()),
            Arc::new(MockBackend::new()),
            Operands::new(vec![1.0], vec![1.0]),
        ));

        let err = RelayServer::bind(addr, broadcaster, &settings(1)).await.err().unwrap();
        assert!(matches!(err, Error::BindFailed { .. }));
    }
}
