//! Ground-side command client
//!
//! One persistent WebSocket connection to the vehicle's command server. The
//! transport event loop runs on its own task; the client object tracks the
//! tristate connection state and holds at most one callback per event kind.
//! A blocking connect awaits a single-resolution signal from the event loop
//! rather than spinning on the state.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use skylink_shared::{ConnectionState, Envelope, ProtocolError};

/// The four client-side event kinds a callback may be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Open,
    Message,
    Error,
    Close,
}

/// Strict kind lookup; anything else is a [`ProtocolError::RemoveHandler`]
impl FromStr for EventKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventKind::Open),
            "message" => Ok(EventKind::Message),
            "error" => Ok(EventKind::Error),
            "close" => Ok(EventKind::Close),
            other => Err(ProtocolError::RemoveHandler(other.into())),
        }
    }
}

type OpenHandler = Arc<dyn Fn() + Send + Sync>;
type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;
type CloseHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct HandlerSlots {
    on_open: Option<OpenHandler>,
    on_message: Option<MessageHandler>,
    on_error: Option<ErrorHandler>,
    on_close: Option<CloseHandler>,
}

/// Command channel endpoint on the ground side
pub struct CommandClient {
    url: String,
    state: Arc<Mutex<ConnectionState>>,
    handlers: Arc<Mutex<HandlerSlots>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl CommandClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            url: format!("ws://{host}:{port}"),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            handlers: Arc::new(Mutex::new(HandlerSlots::default())),
            outbound: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Open the connection and start the transport event loop on its own
    /// task.
    ///
    /// With `blocking`, awaits the open/failure resolution and fails with
    /// [`ProtocolError::Communication`] when the connection did not come up.
    /// Without it, the outcome is reported through the `open`/`error`
    /// callbacks instead.
    pub async fn connect(&self, blocking: bool) -> Result<(), ProtocolError> {
        *self.state.lock().expect("state lock poisoned") = ConnectionState::Connecting;

        let (resolved_tx, resolved_rx) = oneshot::channel::<bool>();
        tokio::spawn(event_loop(
            self.url.clone(),
            self.state.clone(),
            self.handlers.clone(),
            self.outbound.clone(),
            resolved_tx,
        ));

        if blocking {
            match resolved_rx.await {
                Ok(true) => {}
                _ => {
                    return Err(ProtocolError::Communication(format!(
                        "cannot connect to command server at {}",
                        self.url
                    )))
                }
            }
        }
        Ok(())
    }

    /// Serialize and transmit a validated envelope
    pub fn send(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        if self.state() != ConnectionState::Connected {
            return Err(ProtocolError::SendCommand(
                "client is not connected to the command server".into(),
            ));
        }
        self.transmit(envelope.to_text())
    }

    /// Validate a raw text frame through the shared wire rules, then
    /// transmit its canonical form. Any validation failure is a send error.
    pub fn send_raw(&self, text: &str) -> Result<(), ProtocolError> {
        let envelope =
            Envelope::parse(text).map_err(|e| ProtocolError::SendCommand(e.to_string()))?;
        self.send(&envelope)
    }

    fn transmit(&self, text: String) -> Result<(), ProtocolError> {
        let outbound = self.outbound.lock().expect("outbound lock poisoned");
        let Some(tx) = outbound.as_ref() else {
            return Err(ProtocolError::SendCommand("transport is not open".into()));
        };
        tx.send(text)
            .map_err(|_| ProtocolError::SendCommand("transport task is gone".into()))
    }

    pub fn set_on_open<F: Fn() + Send + Sync + 'static>(&self, handler: F) {
        self.handlers.lock().expect("handler lock poisoned").on_open = Some(Arc::new(handler));
    }

    pub fn set_on_message<F: Fn(&str) + Send + Sync + 'static>(&self, handler: F) {
        self.handlers
            .lock()
            .expect("handler lock poisoned")
            .on_message = Some(Arc::new(handler));
    }

    pub fn set_on_error<F: Fn(&str) + Send + Sync + 'static>(&self, handler: F) {
        self.handlers.lock().expect("handler lock poisoned").on_error = Some(Arc::new(handler));
    }

    pub fn set_on_close<F: Fn() + Send + Sync + 'static>(&self, handler: F) {
        self.handlers.lock().expect("handler lock poisoned").on_close = Some(Arc::new(handler));
    }

    /// Unregister the callback for an event kind, named by its wire-ish
    /// lowercase name. Unknown kinds fail; removing an empty slot does not.
    pub fn remove_handler(&self, kind: &str) -> Result<(), ProtocolError> {
        let kind: EventKind = kind.parse()?;
        let mut slots = self.handlers.lock().expect("handler lock poisoned");
        match kind {
            EventKind::Open => slots.on_open = None,
            EventKind::Message => slots.on_message = None,
            EventKind::Error => slots.on_error = None,
            EventKind::Close => slots.on_close = None,
        }
        Ok(())
    }

    /// Explicitly close the connection. The event loop notices the dropped
    /// outbound channel, sends a close frame and invokes the close callback.
    pub fn close(&self) {
        *self.state.lock().expect("state lock poisoned") = ConnectionState::Disconnected;
        self.outbound.lock().expect("outbound lock poisoned").take();
    }
}

/// Transport event loop, one per (re)connect call
async fn event_loop(
    url: String,
    state: Arc<Mutex<ConnectionState>>,
    handlers: Arc<Mutex<HandlerSlots>>,
    outbound_slot: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    resolved: oneshot::Sender<bool>,
) {
    let ws = match connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            *state.lock().expect("state lock poisoned") = ConnectionState::Disconnected;
            let _ = resolved.send(false);
            let on_error = handlers.lock().expect("handler lock poisoned").on_error.clone();
            if let Some(on_error) = on_error {
                on_error(&e.to_string());
            }
            return;
        }
    };
    let (mut sink, mut frames) = ws.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    *outbound_slot.lock().expect("outbound lock poisoned") = Some(outbound_tx);
    *state.lock().expect("state lock poisoned") = ConnectionState::Connected;
    let _ = resolved.send(true);
    info!("Connected to command server at {url}");
    let on_open = handlers.lock().expect("handler lock poisoned").on_open.clone();
    if let Some(on_open) = on_open {
        on_open();
    }

    // Puts the client into DISCONNECTED and releases the outbound channel;
    // runs before any error/close callback fires
    let tear_down = || {
        *state.lock().expect("state lock poisoned") = ConnectionState::Disconnected;
        outbound_slot.lock().expect("outbound lock poisoned").take();
    };

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => match outgoing {
                Some(text) => {
                    debug!("-> {text}");
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!("Transport write failed: {e}");
                        tear_down();
                        let on_error =
                            handlers.lock().expect("handler lock poisoned").on_error.clone();
                        if let Some(on_error) = on_error {
                            on_error(&e.to_string());
                        }
                        return;
                    }
                }
                // close() dropped the channel
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let on_close =
                        handlers.lock().expect("handler lock poisoned").on_close.clone();
                    if let Some(on_close) = on_close {
                        on_close();
                    }
                    return;
                }
            },
            incoming = frames.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let on_message =
                        handlers.lock().expect("handler lock poisoned").on_message.clone();
                    if let Some(on_message) = on_message {
                        on_message(&text);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Command server closed the connection");
                    tear_down();
                    let on_close =
                        handlers.lock().expect("handler lock poisoned").on_close.clone();
                    if let Some(on_close) = on_close {
                        on_close();
                    }
                    return;
                }
                Some(Ok(_)) => {} // ping/pong/binary carry no commands
                Some(Err(e)) => {
                    warn!("Transport read failed: {e}");
                    tear_down();
                    let on_error =
                        handlers.lock().expect("handler lock poisoned").on_error.clone();
                    if let Some(on_error) = on_error {
                        on_error(&e.to_string());
                    }
                    return;
                }
            }
        }
    }
}
