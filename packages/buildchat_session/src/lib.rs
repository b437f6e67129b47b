//! # Build Session Client
//!
//! Client-side core for realtime build sessions: a user chats with a remote
//! agent that writes code into a sandboxed environment, and the client keeps
//! a live view of the conversation, the environment's status and its preview.
//!
//! ## Overview
//!
//! - [`SessionConnection`] owns one duplex transport for one session and
//!   forwards inbound frames, stamped with a generation, into a single channel
//! - [`SessionController`] is the only owner of session state; it drives the
//!   [`SessionStatus`] machine, applies the close-code reconnect policy and
//!   discards events from stale connections
//! - [`assembler`] merges streamed chunks and authoritative full updates into
//!   one ordered message list
//! - [`transcode`] turns filename-tagged code blocks in a message into compact
//!   file-update tokens for display
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use buildchat_session::{SessionConfig, SessionController, SessionId, WsConnector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new("https://api.example.com".parse()?).with_token("secret");
//! let mut controller = SessionController::new(WsConnector, config);
//!
//! controller.attach(SessionId::from(42)).await;
//! while let Some(event) = controller.next_event().await {
//!     controller.handle_event(event).await;
//!     println!("{}", controller.status());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Rendering Messages
//!
//! ```rust
//! use buildchat_session::transcode::{render_message, segments, Segment};
//!
//! let text = "Done:\n```js\n// index.js\nconsole.log(1)\n```";
//! let rendered = render_message(text, false);
//! for segment in segments(&rendered) {
//!     if let Segment::FileUpdate(update) = segment {
//!         assert_eq!(update.filename, "index.js");
//!     }
//! }
//! ```

pub mod assembler;
pub mod config;
pub mod connection;
pub mod controller;
pub mod message;
pub mod preview;
pub mod protocol;
pub mod status;
pub mod transcode;
pub mod ws;

pub use config::{DEFAULT_CONNECT_TIMEOUT, SessionConfig, SessionId};
pub use connection::{
    ConnectError, ConnectionEvent, Connector, EventSink, SendError, SessionConnection, Transport,
    TransportEvent,
};
pub use controller::{Changes, ControllerStats, SessionController, STARTER_PROMPTS};
pub use message::{Message, MessageId, OutboundMessage, Role};
pub use preview::PreviewMetadata;
pub use protocol::{ChatChunkEvent, ChatUpdateEvent, SessionEvent, StatusEvent};
pub use status::{EnvironmentStatus, SessionStatus, StatusSignal};
pub use transcode::{FileUpdate, Segment, TranscodeError};
pub use ws::{WsConnector, WsTransport};
