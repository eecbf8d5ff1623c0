//! WebSocket session driving one peer connection
//!
//! Used by both the inbound server and the upstream dialer. The session
//! registers a `ChannelConnection`, feeds every data frame to the
//! broadcaster, and deregisters when the peer goes away.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{InboundMessage, OutboundFrame};

use super::{ChannelConnection, Connection, Dispatch, RelayBroadcaster, SharedConnection};

/// How long the writer may take to flush a close frame
const WRITER_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Run a peer session until the socket closes or shutdown is signalled
pub async fn run_session<S>(
    stream: WebSocketStream<S>,
    remote: String,
    broadcaster: Arc<RelayBroadcaster>,
    queue_size: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (write, mut read) = stream.split();
    let (conn, outbound_rx) = ChannelConnection::new(remote, queue_size);
    let id = conn.id();

    let (stop_tx, stop_rx) = oneshot::channel();
    let mut writer = tokio::spawn(write_loop(write, outbound_rx, stop_rx));

    broadcaster.registry().register(Arc::clone(&conn) as SharedConnection);
    info!(connection = %id, remote = conn.remote(), "Peer connected");

    let mut tally = SessionTally::default();

    let result = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                conn.mark_closing();
                break Ok(());
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        tally.record(broadcaster.on_message(InboundMessage::text(id, text)));
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        tally.record(broadcaster.on_message(InboundMessage::binary(id, data)));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(connection = %id, frame = ?frame, "Received close frame");
                        break Ok(());
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite
                    }
                    Some(Err(e)) => {
                        break Err(Error::from(e));
                    }
                    None => {
                        break Ok(());
                    }
                }
            }
        }
    };

    conn.close();
    broadcaster.registry().remove(id);

    let _ = stop_tx.send(());
    if tokio::time::timeout(WRITER_CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    match &result {
        Ok(()) => info!(
            connection = %id,
            rejected = tally.rejected,
            tasks_spawned = tally.tasks_spawned,
            "Peer disconnected"
        ),
        Err(e) => warn!(
            connection = %id,
            rejected = tally.rejected,
            tasks_spawned = tally.tasks_spawned,
            error = %e,
            "Peer session ended with error"
        ),
    }
    result
}

/// What this peer's messages caused over the session
#[derive(Debug, Default)]
struct SessionTally {
    rejected: u64,
    tasks_spawned: usize,
}

impl SessionTally {
    fn record(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Rejected => self.rejected += 1,
            Dispatch::FannedOut(fan_out) => self.tasks_spawned += fan_out.detach(),
        }
    }
}

/// Drain the connection's outbound queue into the socket
async fn write_loop<W>(mut write: W, mut outbound: mpsc::Receiver<OutboundFrame>, mut stop: oneshot::Receiver<()>)
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            _ = &mut stop => break,

            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let OutboundFrame::Text(text) = frame;
                if let Err(e) = write.send(WsMessage::Text(text)).await {
                    debug!(error = %e, "Socket write failed");
                    return;
                }
            }
        }
    }

    let _ = write.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{MockBackend, Operands};
    use crate::protocol::OutboundMessage;
    use crate::relay::ConnectionRegistry;
    use crate::validator::MessageValidator;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (server, client)
    }

    async fn wait_for_len(registry: &ConnectionRegistry, len: usize) {
        for _ in 0..200 {
            if registry.len() == len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never reached {} connections", len);
    }

    fn relay() -> (Arc<RelayBroadcaster>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(RelayBroadcaster::new(
            Arc::clone(&registry),
            Arc::new(MessageValidator::default()),
            Arc::new(MockBackend::new()),
            Operands::new(vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0]),
        ));
        (broadcaster, registry)
    }

    #[tokio::test]
    async fn test_sessions_relay_between_peers() {
        let (broadcaster, registry) = relay();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (server_a, mut client_a) = ws_pair().await;
        let (server_b, mut client_b) = ws_pair().await;
        tokio::spawn(run_session(server_a, "a".into(), broadcaster.clone(), 8, shutdown_rx.clone()));
        tokio::spawn(run_session(server_b, "b".into(), broadcaster.clone(), 8, shutdown_rx.clone()));
        wait_for_len(&registry, 2).await;

        client_a.send(WsMessage::Text("hello".into())).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), client_b.next())
            .await
            .expect("peer b should receive a result")
            .unwrap()
            .unwrap();
        let WsMessage::Text(json) = reply else {
            panic!("Expected text frame, got {:?}", reply);
        };
        let OutboundMessage::ComputeResult { values, .. } = serde_json::from_str::<OutboundMessage>(&json).unwrap();
        assert_eq!(values, vec![-2.0, 0.0, 2.0]);

        // The sender gets nothing back
        let nothing = tokio::time::timeout(Duration::from_millis(100), client_a.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_session_deregisters_on_close() {
        let (broadcaster, registry) = relay();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (server, mut client) = ws_pair().await;
        let session = tokio::spawn(run_session(server, "peer".into(), broadcaster, 8, shutdown_rx));
        wait_for_len(&registry, 1).await;

        client.close(None).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), session).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_session_ends_on_shutdown() {
        let (broadcaster, registry) = relay();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (server, _client) = ws_pair().await;
        let session = tokio::spawn(run_session(server, "peer".into(), broadcaster, 8, shutdown_rx));
        wait_for_len(&registry, 1).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), session).await.unwrap().unwrap().unwrap();
        assert!(registry.is_empty());
    }
}
