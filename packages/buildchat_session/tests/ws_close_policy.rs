//! End-to-end checks of the session transport against a real WebSocket
//! server on a loopback port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use buildchat_session::{SessionConfig, SessionController, SessionId, SessionStatus, WsConnector};

/// What the server does with one accepted connection after announcing READY.
#[derive(Clone, Copy)]
enum Script {
    CloseWith(CloseCode),
    Echo,
}

struct TestServer {
    url: Url,
    accepted: Arc<AtomicUsize>,
    uris: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<Value>>>,
}

/// Serve connections in order; the nth connection follows `scripts[n]`,
/// later ones echo.
async fn spawn_server(scripts: Vec<Script>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let uris = Arc::new(Mutex::new(Vec::new()));
    let received = Arc::new(Mutex::new(Vec::new()));

    let server = TestServer {
        url: Url::parse(&format!("http://{addr}")).unwrap(),
        accepted: accepted.clone(),
        uris: uris.clone(),
        received: received.clone(),
    };

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = accepted.fetch_add(1, Ordering::SeqCst);
            let script = scripts.get(index).copied().unwrap_or(Script::Echo);
            let uris = uris.clone();
            let received = received.clone();

            tokio::spawn(async move {
                let callback = move |req: &Request, resp: Response| {
                    uris.lock().unwrap().push(req.uri().to_string());
                    Ok::<_, ErrorResponse>(resp)
                };
                let mut ws = accept_hdr_async(stream, callback).await.unwrap();

                let ready = json!({"for_type": "status", "sandbox_status": "READY"});
                ws.send(WsMessage::text(ready.to_string())).await.unwrap();

                match script {
                    Script::CloseWith(code) => {
                        let frame = CloseFrame {
                            code,
                            reason: "bye".into(),
                        };
                        let _ = ws.send(WsMessage::Close(Some(frame))).await;
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                    Script::Echo => {
                        while let Some(Ok(msg)) = ws.next().await {
                            let WsMessage::Text(text) = msg else {
                                continue;
                            };
                            let value: Value = serde_json::from_str(text.as_str()).unwrap();
                            received.lock().unwrap().push(value.clone());
                            let echo = json!({
                                "for_type": "chat_update",
                                "message": {"role": "user", "content": value["content"], "id": 1},
                            });
                            if ws.send(WsMessage::text(echo.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    server
}

fn controller(server: &TestServer) -> SessionController<WsConnector> {
    let config = SessionConfig::new(server.url.clone()).with_token("secret");
    SessionController::new(WsConnector, config)
}

/// Handle events until `done` holds.
async fn pump_until(
    ctrl: &mut SessionController<WsConnector>,
    done: impl Fn(&SessionController<WsConnector>) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(ctrl) {
            let event = ctrl.next_event().await.unwrap();
            ctrl.handle_event(event).await;
        }
    })
    .await
    .expect("session reached expected state");
}

/// Handle whatever else arrives within a short grace period.
async fn drain(ctrl: &mut SessionController<WsConnector>) {
    let _ = tokio::time::timeout(Duration::from_millis(200), async {
        while let Some(event) = ctrl.next_event().await {
            ctrl.handle_event(event).await;
        }
    })
    .await;
}

#[tokio::test]
async fn unsupported_data_close_reconnects_once() {
    let server = spawn_server(vec![Script::CloseWith(CloseCode::Unsupported)]).await;
    let mut ctrl = controller(&server);

    ctrl.attach(SessionId::from(1)).await;
    pump_until(&mut ctrl, |c| {
        c.stats().auto_reconnects == 1 && c.status() == SessionStatus::Ready
    })
    .await;
    drain(&mut ctrl).await;

    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);
    assert_eq!(ctrl.stats().auto_reconnects, 1);
    assert_eq!(ctrl.stats().connect_attempts, 2);
    assert_eq!(ctrl.status(), SessionStatus::Ready);
    assert!(ctrl.is_connected());
}

#[tokio::test]
async fn protocol_error_close_reconnects_once() {
    let server = spawn_server(vec![Script::CloseWith(CloseCode::Protocol)]).await;
    let mut ctrl = controller(&server);

    ctrl.attach(SessionId::from(1)).await;
    pump_until(&mut ctrl, |c| c.stats().auto_reconnects == 1 && c.is_connected()).await;
    drain(&mut ctrl).await;

    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn normal_close_stays_disconnected() {
    let server = spawn_server(vec![Script::CloseWith(CloseCode::Normal)]).await;
    let mut ctrl = controller(&server);

    ctrl.attach(SessionId::from(1)).await;
    pump_until(&mut ctrl, |c| c.status() == SessionStatus::Disconnected).await;
    drain(&mut ctrl).await;

    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(ctrl.stats().auto_reconnects, 0);
    assert_eq!(ctrl.status(), SessionStatus::Disconnected);
    assert!(!ctrl.is_connected());

    ctrl.reconnect().await;
    pump_until(&mut ctrl, |c| c.status() == SessionStatus::Ready).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn prompt_round_trip() {
    let server = spawn_server(vec![Script::Echo]).await;
    let mut ctrl = controller(&server);

    ctrl.attach(SessionId::from(1)).await;
    pump_until(&mut ctrl, |c| c.status() == SessionStatus::Ready).await;

    ctrl.send_user_message("make it blue", Vec::new()).unwrap();
    assert_eq!(ctrl.status(), SessionStatus::Working);
    pump_until(&mut ctrl, |c| c.messages().first().is_some_and(|m| m.id == Some(1))).await;

    assert_eq!(ctrl.messages().len(), 1);
    assert_eq!(ctrl.messages()[0].content, "make it blue");
    assert_eq!(
        server.received.lock().unwrap().clone(),
        vec![json!({"role": "user", "content": "make it blue", "images": []})]
    );
    assert_eq!(
        server.uris.lock().unwrap().clone(),
        vec!["/api/ws/chat/1?token=secret".to_string()]
    );
}

#[tokio::test]
async fn switching_sessions_closes_the_old_socket() {
    let server = spawn_server(vec![Script::Echo, Script::Echo]).await;
    let mut ctrl = controller(&server);

    ctrl.attach(SessionId::from(1)).await;
    pump_until(&mut ctrl, |c| c.status() == SessionStatus::Ready).await;
    ctrl.attach(SessionId::from(2)).await;
    pump_until(&mut ctrl, |c| c.status() == SessionStatus::Ready).await;
    drain(&mut ctrl).await;

    assert_eq!(ctrl.session_id(), Some(&SessionId::from(2)));
    assert_eq!(ctrl.stats().auto_reconnects, 0);
    let uris = server.uris.lock().unwrap().clone();
    assert_eq!(uris.len(), 2);
    assert!(uris[1].starts_with("/api/ws/chat/2"));
}
