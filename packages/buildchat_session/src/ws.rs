//! WebSocket transport over tokio-tungstenite.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};
use url::Url;

use crate::connection::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, ConnectError, Connector, EventSink, SendError, Transport,
    TransportEvent,
};

/// Opens [`WsTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

/// An open WebSocket. Reading and writing happen on two spawned tasks that
/// only shuttle frames; all interpretation is left to the event sink's owner.
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn open(&self, url: Url, sink: EventSink) -> Result<WsTransport, ConnectError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        let (mut ws_write, mut ws_read) = stream.split();

        let open = Arc::new(AtomicBool::new(true));
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_write.send(msg).await {
                    debug!("websocket write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_open = open.clone();
        let reader = tokio::spawn(async move {
            let (code, reason) = loop {
                match ws_read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if !sink.emit_text(text.as_str()) {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            if !sink.emit_text(text) {
                                return;
                            }
                        }
                        Err(_) => debug!("dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                            None => (CLOSE_NO_STATUS, String::new()),
                        };
                    }
                    // Ping/pong are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("websocket read failed: {}", e);
                        break (CLOSE_ABNORMAL, e.to_string());
                    }
                    None => break (CLOSE_ABNORMAL, String::new()),
                }
            };
            reader_open.store(false, Ordering::SeqCst);
            debug!(code, %reason, "websocket closed by peer");
            sink.emit(TransportEvent::Closed { code, reason });
        });

        Ok(WsTransport {
            outbound,
            open,
            reader,
        })
    }
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotConnected);
        }
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| SendError::NotConnected)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        // A locally requested close is not reported back as an event.
        self.reader.abort();
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            })));
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}
