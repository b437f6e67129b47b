//! Session connection.
//!
//! A [`SessionConnection`] owns at most one duplex transport bound to one
//! session id. It knows nothing about the protocol: inbound frames are decoded
//! to raw JSON values and forwarded, tagged with the connection's generation,
//! into the single event sink handed in at construction.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{SessionConfig, SessionId};
use crate::message::OutboundMessage;

/// Close code for "protocol error".
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Close code for "unsupported data".
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
/// Reported when the transport went away without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Reported when a close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Whether a close code calls for an immediate automatic reconnect.
pub fn is_auto_reconnect_code(code: u16) -> bool {
    matches!(code, CLOSE_PROTOCOL_ERROR | CLOSE_UNSUPPORTED_DATA)
}

/// What a transport reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One decoded inbound JSON value
    Message(serde_json::Value),
    /// The transport closed
    Closed { code: u16, reason: String },
}

/// A transport event stamped with the connection that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Write side of the single inbound channel, bound to one generation.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward an event. Returns false once the owner has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(ConnectionEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Decode a text frame and forward it; undecodable frames are dropped.
    pub fn emit_text(&self, text: &str) -> bool {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => self.emit(TransportEvent::Message(value)),
            Err(e) => {
                debug!(generation = self.generation, "dropping non-JSON frame: {}", e);
                true
            }
        }
    }
}

/// Errors opening a transport.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no authentication token configured")]
    MissingToken,

    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failed to open: {0}")]
    Transport(String),
}

/// Errors sending on a transport.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("session is not connected")]
    NotConnected,

    #[error("nothing to send")]
    Empty,

    #[error("cannot send while the session is {0}")]
    Busy(crate::status::SessionStatus),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// An open duplex transport.
pub trait Transport: Send {
    /// Queue one text frame. Must not block.
    fn send_text(&mut self, text: String) -> Result<(), SendError>;

    /// Whether frames can currently be sent.
    fn is_open(&self) -> bool;

    /// Close the transport. Safe to call more than once.
    fn close(&mut self);
}

/// Opens transports.
pub trait Connector: Send + Sync {
    type Transport: Transport;

    /// Open a transport to `url`; inbound events go to `sink`.
    fn open(
        &self,
        url: Url,
        sink: EventSink,
    ) -> impl Future<Output = Result<Self::Transport, ConnectError>> + Send;
}

/// One session's connection.
pub struct SessionConnection<T: Transport> {
    session_id: SessionId,
    sink: EventSink,
    transport: Option<T>,
}

impl<T: Transport> SessionConnection<T> {
    pub fn new(session_id: SessionId, sink: EventSink) -> Self {
        Self {
            session_id,
            sink,
            transport: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    /// Open the transport, bounded by the configured connect timeout.
    ///
    /// Any transport this connection already holds is closed first.
    pub async fn connect<C>(
        &mut self,
        connector: &C,
        config: &SessionConfig,
    ) -> Result<(), ConnectError>
    where
        C: Connector<Transport = T>,
    {
        self.disconnect();

        let Some(token) = config.token.as_deref() else {
            error!(session_id = %self.session_id, "No authentication token found");
            return Err(ConnectError::MissingToken);
        };

        let url = config.session_endpoint(&self.session_id, token);
        info!(
            session_id = %self.session_id,
            generation = self.generation(),
            "opening session transport"
        );

        let opened = tokio::time::timeout(
            config.connect_timeout,
            connector.open(url, self.sink.clone()),
        )
        .await;

        match opened {
            Ok(Ok(transport)) => {
                self.transport = Some(transport);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(session_id = %self.session_id, "connect failed: {}", e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    session_id = %self.session_id,
                    "connect timed out after {:?}", config.connect_timeout
                );
                Err(ConnectError::Timeout(config.connect_timeout))
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// Send one outbound message; only succeeds while the transport is open.
    pub fn send(&mut self, message: &OutboundMessage) -> Result<(), SendError> {
        let Some(transport) = self.transport.as_mut().filter(|t| t.is_open()) else {
            error!(session_id = %self.session_id, "session transport is not connected");
            return Err(SendError::NotConnected);
        };
        let json =
            serde_json::to_string(message).map_err(|e| SendError::Encode(e.to_string()))?;
        transport.send_text(json)
    }

    /// Close and drop the transport. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            debug!(
                session_id = %self.session_id,
                generation = self.generation(),
                "closing session transport"
            );
            transport.close();
        }
    }
}

impl<T: Transport> Drop for SessionConnection<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
