//! Session controller.
//!
//! The only owner of mutable session state. It holds the connection, the
//! status machine, the message list and the preview metadata, and it mutates
//! them only from [`SessionController::handle_event`] and the imperative
//! surface (`attach`, `detach`, `reconnect`, `send_user_message`). Everything
//! runs on the caller's task; the transport's own tasks only forward frames
//! into the event channel.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::assembler;
use crate::config::{SessionConfig, SessionId};
use crate::connection::{
    ConnectionEvent, Connector, EventSink, SendError, SessionConnection, TransportEvent,
    is_auto_reconnect_code,
};
use crate::message::{Message, OutboundMessage};
use crate::preview::PreviewMetadata;
use crate::protocol::{ChatUpdateEvent, SessionEvent, StatusEvent};
use crate::status::{SessionStatus, StatusSignal};

/// Suggestions offered before the first prompt of a new chat.
pub const STARTER_PROMPTS: [&str; 3] = [
    "Build a 90s themed cat facts app with catfact.ninja API",
    "Build a modern control panel for a spaceship",
    "Build a unique p5.js asteroid game",
];

/// Conversations longer than this tend to degrade; the UI warns about them.
pub const LONG_CONVERSATION_THRESHOLD: usize = 40;

const DEFAULT_PLACEHOLDER: &str = "What would you like to build?";

/// What an event changed, so the view can redraw selectively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub status: bool,
    pub messages: bool,
    pub preview: bool,
    pub follow_ups: bool,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        !(self.status || self.messages || self.preview || self.follow_ups)
    }

    fn merge(&mut self, other: Changes) {
        self.status |= other.status;
        self.messages |= other.messages;
        self.preview |= other.preview;
        self.follow_ups |= other.follow_ups;
    }
}

/// Counters for connection churn and dropped input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Transport opens started, of any kind
    pub connect_attempts: u64,
    /// Opens started by the close-code policy
    pub auto_reconnects: u64,
    /// Inbound events that failed to decode
    pub malformed_events: u64,
    /// Events from connections that are no longer current
    pub stale_events: u64,
}

pub struct SessionController<C: Connector> {
    connector: C,
    config: SessionConfig,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    next_generation: u64,

    session: Option<SessionId>,
    connection: Option<SessionConnection<C::Transport>>,
    status: SessionStatus,
    messages: Vec<Message>,
    preview: PreviewMetadata,
    follow_ups: Vec<String>,
    /// First prompt of a new chat, sent once the environment is ready
    seed: Option<OutboundMessage>,
    stats: ControllerStats,
}

impl<C: Connector> SessionController<C> {
    pub fn new(connector: C, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            config,
            events_tx,
            events_rx,
            next_generation: 0,
            session: None,
            connection: None,
            status: SessionStatus::NewChat,
            messages: Vec::new(),
            preview: PreviewMetadata::default(),
            follow_ups: Vec::new(),
            seed: None,
            stats: ControllerStats::default(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn preview(&self) -> &PreviewMetadata {
        &self.preview
    }

    pub fn follow_ups(&self) -> &[String] {
        &self.follow_ups
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_open())
    }

    /// Prompts to offer as one-click suggestions.
    pub fn suggestions(&self) -> Vec<&str> {
        if !self.follow_ups.is_empty() {
            self.follow_ups.iter().map(String::as_str).collect()
        } else if self.messages.is_empty() {
            STARTER_PROMPTS.to_vec()
        } else {
            Vec::new()
        }
    }

    /// Placeholder text for the prompt input.
    pub fn placeholder(&self) -> &str {
        match self.follow_ups.first() {
            Some(first) if !self.messages.is_empty() => first.as_str(),
            _ => DEFAULT_PLACEHOLDER,
        }
    }

    pub fn is_long_conversation(&self) -> bool {
        self.messages.len() > LONG_CONVERSATION_THRESHOLD
    }

    /// Whether the message at `index` is still streaming and should be
    /// transcoded in partial mode.
    pub fn is_streaming(&self, index: usize) -> bool {
        self.status == SessionStatus::Working
            && index + 1 == self.messages.len()
            && self.messages[index].is_assistant()
    }

    /// The user navigated the preview.
    pub fn set_preview_path(&mut self, path: impl Into<String>) {
        self.preview.preview_path = path.into();
    }

    /// Bind the controller to a session and open its connection.
    ///
    /// Attaching to the session that is already attached and connected is a
    /// no-op. Attaching to a different session closes the old connection
    /// before the new one is opened and discards the old session's view. A
    /// new-chat draft (a prompt sent before any session existed) is carried
    /// over into the first session attached.
    pub async fn attach(&mut self, session_id: SessionId) -> Changes {
        if self.session.as_ref() == Some(&session_id) && self.is_connected() {
            debug!(session_id = %session_id, "already attached");
            return Changes::default();
        }

        let mut changes = Changes::default();
        self.close_connection();
        if let Some(previous) = self.session.take() {
            if previous != session_id {
                info!(from = %previous, to = %session_id, "switching session");
                changes.merge(self.reset_view());
            }
        }
        self.session = Some(session_id);
        changes.merge(self.open_connection().await);
        changes
    }

    /// Close the connection and forget the session. Idempotent.
    pub fn detach(&mut self) -> Option<SessionId> {
        self.close_connection();
        let previous = self.session.take();
        if let Some(id) = &previous {
            info!(session_id = %id, "detached");
        }
        self.reset_view();
        self.set_status(self.status.next(StatusSignal::Detached));
        previous
    }

    /// Explicit user reconnect: close whatever is left and open anew.
    pub async fn reconnect(&mut self) -> Changes {
        if self.session.is_none() {
            warn!("reconnect requested with no attached session");
            return Changes::default();
        }
        self.open_connection().await
    }

    /// Send a prompt.
    ///
    /// Only allowed while the status accepts input. Before any session
    /// exists the prompt becomes the new chat's seed and is delivered once
    /// the environment reports ready. The optimistic local copy is appended
    /// and the status moves to `WORKING` only if the send went out.
    pub fn send_user_message(
        &mut self,
        content: impl Into<String>,
        images: Vec<String>,
    ) -> Result<(), SendError> {
        let outbound = OutboundMessage::user(content, images);
        if outbound.is_blank() {
            return Err(SendError::Empty);
        }
        if !self.status.accepts_input() {
            warn!(status = ?self.status, "prompt rejected");
            return Err(SendError::Busy(self.status));
        }

        if self.session.is_none() {
            debug!("holding prompt as new chat seed");
            self.seed = Some(outbound.clone());
        } else {
            let Some(connection) = self.connection.as_mut() else {
                warn!("prompt rejected: session transport is not connected");
                return Err(SendError::NotConnected);
            };
            connection.send(&outbound)?;
        }

        self.messages.push(outbound.to_message());
        self.set_status(self.status.next(StatusSignal::UserMessageSent));
        Ok(())
    }

    /// Wait for the next event from the current (or a stale) connection.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_next_event(&mut self) -> Option<ConnectionEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Apply one connection event.
    pub async fn handle_event(&mut self, event: ConnectionEvent) -> Changes {
        if !self.is_current(event.generation) {
            self.stats.stale_events += 1;
            debug!(generation = event.generation, "dropping event from stale connection");
            return Changes::default();
        }

        match event.event {
            TransportEvent::Message(value) => match SessionEvent::decode(value) {
                Ok(decoded) => self.apply_event(decoded),
                Err(e) => {
                    self.stats.malformed_events += 1;
                    warn!("dropping malformed session event: {}", e);
                    Changes::default()
                }
            },
            TransportEvent::Closed { code, reason } => self.on_closed(code, &reason).await,
        }
    }

    /// Apply one decoded session event.
    pub fn apply_event(&mut self, event: SessionEvent) -> Changes {
        debug!(kind = event.kind(), "session event");
        match event {
            SessionEvent::Status(status) => self.apply_status(status),
            SessionEvent::ChatUpdate(update) => self.apply_update(update),
            SessionEvent::ChatChunk(chunk) => {
                let messages = std::mem::take(&mut self.messages);
                self.messages = assembler::apply_chunk(messages, &chunk);
                Changes {
                    messages: true,
                    ..Default::default()
                }
            }
            SessionEvent::Unknown => Changes::default(),
        }
    }

    fn apply_status(&mut self, event: StatusEvent) -> Changes {
        let mut changes = Changes::default();

        if let Some(env) = event.environment() {
            changes.status = self.set_status(self.status.next(StatusSignal::Environment(env)));
        } else if let Some(raw) = &event.sandbox_status {
            debug!(sandbox_status = %raw, "ignoring unrecognized environment status");
        }

        if let Some(url) = event.preview_url() {
            self.preview.preview_url = url;
            changes.preview = true;
        }
        if let Some(paths) = event.file_paths {
            self.preview.file_tree = paths;
            changes.preview = true;
        }

        if self.status == SessionStatus::Ready {
            changes.merge(self.flush_seed());
        }
        changes
    }

    fn apply_update(&mut self, update: ChatUpdateEvent) -> Changes {
        let messages = std::mem::take(&mut self.messages);
        let (messages, placement, effects) = assembler::apply_update(messages, &update);
        self.messages = messages;
        debug!(?placement, "applied full update");

        let mut changes = Changes {
            messages: true,
            ..Default::default()
        };
        if let Some(follow_ups) = effects.follow_ups {
            self.follow_ups = follow_ups;
            changes.follow_ups = true;
        }
        if let Some(path) = effects.navigate_to {
            self.preview.preview_path = path;
            changes.preview = true;
        }
        if effects.bump_preview {
            self.preview.preview_hash += 1;
            changes.preview = true;
        }
        changes
    }

    /// Deliver the new chat's first prompt.
    fn flush_seed(&mut self) -> Changes {
        let Some(seed) = self.seed.take() else {
            return Changes::default();
        };
        let sent = match self.connection.as_mut() {
            Some(connection) => connection.send(&seed),
            None => Err(SendError::NotConnected),
        };
        match sent {
            Ok(()) => {
                info!("sent new chat seed prompt");
                Changes {
                    status: self.set_status(self.status.next(StatusSignal::UserMessageSent)),
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!("seed prompt not sent yet: {}", e);
                self.seed = Some(seed);
                Changes::default()
            }
        }
    }

    async fn on_closed(&mut self, code: u16, reason: &str) -> Changes {
        info!(code, reason, "session transport closed");
        self.close_connection();
        let mut changes = Changes {
            status: self.set_status(self.status.next(StatusSignal::TransportClosed)),
            ..Default::default()
        };

        if is_auto_reconnect_code(code) {
            self.stats.auto_reconnects += 1;
            info!(code, "reconnecting after protocol-level close");
            changes.merge(self.open_connection().await);
        }
        changes
    }

    async fn open_connection(&mut self) -> Changes {
        let Some(session_id) = self.session.clone() else {
            return Changes::default();
        };
        self.close_connection();

        self.next_generation += 1;
        let sink = EventSink::new(self.next_generation, self.events_tx.clone());
        let mut connection = SessionConnection::new(session_id, sink);

        self.stats.connect_attempts += 1;
        let mut changes = Changes {
            status: self.set_status(self.status.next(StatusSignal::ConnectStarted)),
            ..Default::default()
        };

        match connection.connect(&self.connector, &self.config).await {
            Ok(()) => self.connection = Some(connection),
            Err(_) => {
                changes.status |= self.set_status(self.status.next(StatusSignal::ConnectFailed));
            }
        }
        changes
    }

    fn close_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.disconnect();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.generation() == generation)
    }

    fn reset_view(&mut self) -> Changes {
        self.messages.clear();
        self.preview = PreviewMetadata::default();
        self.follow_ups.clear();
        self.seed = None;
        Changes {
            messages: true,
            preview: true,
            follow_ups: true,
            ..Default::default()
        }
    }

    fn set_status(&mut self, next: SessionStatus) -> bool {
        if next == self.status {
            return false;
        }
        debug!(from = ?self.status, to = ?next, "status transition");
        self.status = next;
        true
    }
}
