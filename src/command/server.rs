//! Vehicle-side command server
//!
//! Accepts any number of ground peers over WebSocket, one JSON text frame
//! per command. A well-formed envelope is dispatched to the handler
//! registered for its type and then rebroadcast verbatim to every connected
//! peer, the sender included, so every console sees every peer's commands.
//! A frame that fails validation is answered with a notice to the offender
//! plus a distinct notice broadcast to all peers; the connection stays open.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as HookLock};

use anyhow::{Context, Result};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

use skylink_shared::{CommandType, Envelope, ProtocolError};

/// Per-type command handler. Invoked with the envelope body on the dispatch
/// task; anything slow must be spawned onto its own task.
pub type CommandHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Peer lifecycle hook, informational only
pub type PeerHook = Arc<dyn Fn(SocketAddr) + Send + Sync>;

type PeerSink = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

struct Peer {
    addr: SocketAddr,
    sink: PeerSink,
}

/// Multi-peer command endpoint on the vehicle
pub struct CommandServer {
    handlers: HookLock<HashMap<CommandType, CommandHandler>>,
    peers: RwLock<HashMap<u64, Peer>>,
    next_peer_id: AtomicU64,
    on_peer_connected: HookLock<Option<PeerHook>>,
    on_peer_disconnected: HookLock<Option<PeerHook>>,
}

impl CommandServer {
    pub fn new() -> Self {
        Self {
            handlers: HookLock::new(HashMap::new()),
            peers: RwLock::new(HashMap::new()),
            next_peer_id: AtomicU64::new(1),
            on_peer_connected: HookLock::new(None),
            on_peer_disconnected: HookLock::new(None),
        }
    }

    /// Associate a handler with a command type. One handler per type; the
    /// last registration wins.
    pub fn register_handler<F>(&self, kind: CommandType, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .expect("handler table poisoned")
            .insert(kind, Arc::new(handler));
    }

    pub fn set_on_peer_connected<F>(&self, hook: F)
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        *self.on_peer_connected.write().expect("hook slot poisoned") = Some(Arc::new(hook));
    }

    pub fn set_on_peer_disconnected<F>(&self, hook: F)
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        *self.on_peer_disconnected.write().expect("hook slot poisoned") = Some(Arc::new(hook));
    }

    /// Number of currently connected peers
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Accept peers forever. Each peer gets its own read task; this only
    /// returns if the listener itself fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("command listener address")?;
        info!("Command server listening on {local}");

        loop {
            let (stream, addr) = listener
                .accept()
                .await
                .context("accepting command peer")?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.handle_peer(stream, addr).await;
            });
        }
    }

    /// Send a text frame to every connected peer
    pub async fn broadcast(&self, payload: &str) {
        let sinks: Vec<(SocketAddr, PeerSink)> = {
            let peers = self.peers.read().await;
            peers.values().map(|p| (p.addr, p.sink.clone())).collect()
        };
        for (addr, sink) in sinks {
            if let Err(e) = sink
                .lock()
                .await
                .send(Message::Text(payload.to_owned()))
                .await
            {
                // The peer's own read task notices the dead socket and
                // unregisters it
                warn!("Broadcast to {addr} failed: {e}");
            }
        }
    }

    async fn send_to(&self, peer_id: u64, payload: &str) {
        let sink = {
            let peers = self.peers.read().await;
            peers.get(&peer_id).map(|p| p.sink.clone())
        };
        let Some(sink) = sink else { return };
        let mut sink = sink.lock().await;
        if let Err(e) = sink.send(Message::Text(payload.to_owned())).await {
            warn!("Reply to peer {peer_id} failed: {e}");
        }
    }

    async fn handle_peer(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake with {addr} failed: {e}");
                return;
            }
        };
        let (sink, mut frames) = ws.split();

        let peer_id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        self.peers.write().await.insert(
            peer_id,
            Peer {
                addr,
                sink: Arc::new(Mutex::new(sink)),
            },
        );
        info!("Peer {addr} connected");
        let hook = self
            .on_peer_connected
            .read()
            .expect("hook slot poisoned")
            .clone();
        if let Some(hook) = hook {
            hook(addr);
        }

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Err(e) = self.process_frame(peer_id, &text).await {
                        // Fatal to the message only; the connection stays open
                        warn!("Rejected frame from {addr}: {e}");
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // binary/ping/pong frames carry no commands
                Err(e) => {
                    warn!("Read from {addr} failed: {e}");
                    break;
                }
            }
        }

        self.peers.write().await.remove(&peer_id);
        info!("Peer {addr} disconnected");
        let hook = self
            .on_peer_disconnected
            .read()
            .expect("hook slot poisoned")
            .clone();
        if let Some(hook) = hook {
            hook(addr);
        }
    }

    /// Validate, dispatch and rebroadcast one received frame.
    ///
    /// Invalid frames trigger the dual notification: a notice to the
    /// originating peer and a distinct notice to all peers. Well-formed
    /// envelopes are rebroadcast verbatim exactly once, whether or not a
    /// handler is registered for their type.
    async fn process_frame(&self, sender: u64, text: &str) -> Result<(), ProtocolError> {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.send_to(sender, &format!("Message is not a valid command: {text}"))
                    .await;
                self.broadcast(&format!("Error parsing command: {text}")).await;
                return Err(e);
            }
        };

        let handler = self
            .handlers
            .read()
            .expect("handler table poisoned")
            .get(&envelope.kind)
            .cloned();
        match handler {
            Some(handler) => handler(envelope.body),
            None => debug!("No handler registered for {}", envelope.kind),
        }

        self.broadcast(text).await;
        Ok(())
    }
}

impl Default for CommandServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream::{SplitStream, SplitSink as ClientSink};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::*;

    type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(server: Arc<CommandServer>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(server.serve(listener));
        addr
    }

    async fn peer(addr: SocketAddr) -> (ClientSink<ClientWs, Message>, SplitStream<ClientWs>) {
        let (ws, _) = connect_async(format!("ws://{addr}"))
            .await
            .expect("connect");
        ws.split()
    }

    async fn wait_for_peers(server: &CommandServer, count: usize) {
        for _ in 0..100 {
            if server.peer_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never saw {count} registered peers");
    }

    async fn next_text(frames: &mut SplitStream<ClientWs>) -> String {
        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("frame timeout")
            .expect("stream ended")
            .expect("frame error");
        match frame {
            Message::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_well_formed_envelope_dispatches_and_rebroadcasts_to_all() {
        let server = Arc::new(CommandServer::new());
        let (dispatched_tx, mut dispatched_rx) = mpsc::unbounded_channel();
        server.register_handler(CommandType::Ping, move |body| {
            dispatched_tx.send(body).expect("record dispatch");
        });
        let addr = start(server.clone()).await;

        let (mut sender_sink, mut sender_frames) = peer(addr).await;
        let (_observer_sink, mut observer_frames) = peer(addr).await;
        wait_for_peers(&server, 2).await;

        let wire = r#"{"type": "PING", "body": null}"#;
        sender_sink
            .send(Message::Text(wire.into()))
            .await
            .expect("send");

        assert!(dispatched_rx.recv().await.expect("handler fired").is_null());
        // Verbatim rebroadcast reaches the sender and the observer
        assert_eq!(next_text(&mut sender_frames).await, wire);
        assert_eq!(next_text(&mut observer_frames).await, wire);
    }

    #[tokio::test]
    async fn test_unhandled_type_is_still_rebroadcast() {
        let server = Arc::new(CommandServer::new());
        let addr = start(server.clone()).await;

        let (mut sink, mut frames) = peer(addr).await;
        wait_for_peers(&server, 1).await;

        // GO_TO_GPS is a registry member with no vehicle-side handler
        let wire = r#"{"type": "GO_TO_GPS", "body": {"lat": 1.0, "lon": 2.0, "alt": 3.0}}"#;
        sink.send(Message::Text(wire.into())).await.expect("send");

        assert_eq!(next_text(&mut frames).await, wire);
    }

    #[tokio::test]
    async fn test_invalid_json_gets_dual_notice_and_no_dispatch() {
        let server = Arc::new(CommandServer::new());
        let (dispatched_tx, mut dispatched_rx) = mpsc::unbounded_channel();
        server.register_handler(CommandType::Ping, move |body| {
            dispatched_tx.send(body).expect("record dispatch");
        });
        let addr = start(server.clone()).await;

        let (mut sink, mut frames) = peer(addr).await;
        let (_observer_sink, mut observer_frames) = peer(addr).await;
        wait_for_peers(&server, 2).await;

        sink.send(Message::Text("{oops".into())).await.expect("send");

        // The offender sees its private notice and then the broadcast one
        assert_eq!(
            next_text(&mut frames).await,
            "Message is not a valid command: {oops"
        );
        assert_eq!(next_text(&mut frames).await, "Error parsing command: {oops");
        // Other peers see only the broadcast notice
        assert_eq!(
            next_text(&mut observer_frames).await,
            "Error parsing command: {oops"
        );
        assert!(dispatched_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connection_survives_a_malformed_command() {
        let server = Arc::new(CommandServer::new());
        let addr = start(server.clone()).await;

        let (mut sink, mut frames) = peer(addr).await;
        wait_for_peers(&server, 1).await;

        sink.send(Message::Text(r#"{"type": "WARP_DRIVE", "body": null}"#.into()))
            .await
            .expect("send");
        assert!(next_text(&mut frames).await.starts_with("Message is not a valid command"));
        assert!(next_text(&mut frames).await.starts_with("Error parsing command"));

        // Same connection keeps working
        let wire = r#"{"type": "PING", "body": null}"#;
        sink.send(Message::Text(wire.into())).await.expect("send");
        assert_eq!(next_text(&mut frames).await, wire);
    }

    #[tokio::test]
    async fn test_last_handler_registration_wins() {
        let server = Arc::new(CommandServer::new());
        let (first_tx, mut first_rx) = mpsc::unbounded_channel::<()>();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel::<()>();
        server.register_handler(CommandType::Ping, move |_| {
            first_tx.send(()).expect("record");
        });
        server.register_handler(CommandType::Ping, move |_| {
            second_tx.send(()).expect("record");
        });
        let addr = start(server.clone()).await;

        let (mut sink, mut frames) = peer(addr).await;
        wait_for_peers(&server, 1).await;
        sink.send(Message::Text(r#"{"type": "PING", "body": null}"#.into()))
            .await
            .expect("send");
        let _ = next_text(&mut frames).await;

        assert!(second_rx.recv().await.is_some());
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_fire_on_connect_and_disconnect() {
        let server = Arc::new(CommandServer::new());
        let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
        let (disconnected_tx, mut disconnected_rx) = mpsc::unbounded_channel();
        server.set_on_peer_connected(move |peer| {
            connected_tx.send(peer).expect("record connect");
        });
        server.set_on_peer_disconnected(move |peer| {
            disconnected_tx.send(peer).expect("record disconnect");
        });
        let addr = start(server.clone()).await;

        let (sink, frames) = peer(addr).await;
        let peer_addr = connected_rx.recv().await.expect("connect hook");
        assert_eq!(peer_addr.ip(), addr.ip());

        drop(sink);
        drop(frames);
        let gone = disconnected_rx.recv().await.expect("disconnect hook");
        assert_eq!(gone, peer_addr);
        wait_for_peers(&server, 0).await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer() {
        let server = Arc::new(CommandServer::new());
        let addr = start(server.clone()).await;

        let (_sink_a, mut frames_a) = peer(addr).await;
        let (_sink_b, mut frames_b) = peer(addr).await;
        wait_for_peers(&server, 2).await;

        server.broadcast("vehicle status: holding").await;
        assert_eq!(next_text(&mut frames_a).await, "vehicle status: holding");
        assert_eq!(next_text(&mut frames_b).await, "vehicle status: holding");
    }
}
