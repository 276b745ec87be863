//! End-to-end tests over a real WebSocket on the loopback interface.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use xpalm_core::{ButtonId, TrustState};
use xpalm_host::application::authorize::{
    AuthProtocol, ChallengeAnswer, ChallengePrompt, ConnectRequest, Notice, OperatorNotifier,
};
use xpalm_host::application::relay_input::EventRelay;
use xpalm_host::application::sessions::SessionTable;
use xpalm_host::application::trust::TrustRegistry;
use xpalm_host::infrastructure::gamepad::mock::MockGamepadBackend;
use xpalm_host::infrastructure::network::ws_server::{
    bind_listener, run_server, ServerContext, PIN_HEADER,
};

type Phone = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Answers every challenge the same way and remembers the PINs it saw.
/// Without an answer it leaves every challenge open.
struct FixedOperator {
    answer: Option<ChallengeAnswer>,
    pins: Mutex<Vec<String>>,
}

#[async_trait]
impl ChallengePrompt for FixedOperator {
    async fn ask(&self, request: &ConnectRequest) -> ChallengeAnswer {
        self.pins.lock().unwrap().push(request.pin.clone());
        match self.answer {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl OperatorNotifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

struct Harness {
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
    backend: Arc<MockGamepadBackend>,
    trust: Arc<TrustRegistry>,
    operator: Arc<FixedOperator>,
    notifier: Arc<RecordingNotifier>,
}

async fn start_host(answer: ChallengeAnswer) -> Harness {
    start_host_with(Some(answer), Duration::from_secs(2)).await
}

async fn start_host_with(answer: Option<ChallengeAnswer>, handshake_timeout: Duration) -> Harness {
    let backend = Arc::new(MockGamepadBackend::new());
    let trust = Arc::new(TrustRegistry::new());
    let sessions = Arc::new(SessionTable::new(backend.clone()));
    let operator = Arc::new(FixedOperator {
        answer,
        pins: Mutex::new(Vec::new()),
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = Arc::new(ServerContext {
        sessions: Arc::clone(&sessions),
        auth: Arc::new(AuthProtocol::new(
            Arc::clone(&trust),
            Arc::clone(&sessions),
            operator.clone(),
            notifier.clone(),
            Duration::from_secs(2),
        )),
        relay: Arc::new(EventRelay::new(Arc::clone(&sessions))),
        notifier: notifier.clone(),
        handshake_timeout,
    });

    let listener = bind_listener("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(run_server(listener, Arc::clone(&ctx), Arc::clone(&running)));

    Harness {
        addr,
        ctx,
        running,
        backend,
        trust,
        operator,
        notifier,
    }
}

async fn connect(addr: SocketAddr, pin: &'static str) -> Phone {
    let mut request = format!("ws://{addr}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert(PIN_HEADER, HeaderValue::from_static(pin));
    let (ws, _) = connect_async(request).await.unwrap();
    ws
}

async fn next_text(phone: &mut Phone) -> Option<String> {
    let frame = tokio::time::timeout(Duration::from_secs(2), phone.next())
        .await
        .ok()??;
    match frame {
        Ok(Message::Text(text)) => Some(text),
        _ => None,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_accepted_phone_drives_gamepad_until_it_hangs_up() {
    // Arrange
    let host = start_host(ChallengeAnswer::Accept).await;
    let mut phone = connect(host.addr, "4711").await;

    // Act
    let authorized = next_text(&mut phone).await;
    phone.send(Message::Text(r#"{"type":"PI"}"#.into())).await.unwrap();
    let pong = next_text(&mut phone).await;
    let press = format!(r#"{{"type":"K","pressed":true,"key":{}}}"#, ButtonId::A.bit());
    phone.send(Message::Text(press)).await.unwrap();
    phone.send(Message::Text("not json".into())).await.unwrap();
    phone.send(Message::Text(r#"{"type":"reset"}"#.into())).await.unwrap();
    phone.close(None).await.unwrap();

    // Assert
    assert_eq!(authorized.as_deref(), Some(r#"{"type":"authorized"}"#));
    assert_eq!(pong.as_deref(), Some(r#"{"type":"PO"}"#));
    assert_eq!(*host.operator.pins.lock().unwrap(), vec!["4711".to_string()]);
    let unplugged =
        eventually(|| host.backend.device_count() == 1 && host.backend.dispose_count(0) == 1);
    assert!(unplugged.await);

    let commits = host.backend.commits(0);
    assert!(commits[0].is_pressed(ButtonId::A));
    assert!(commits.last().unwrap().is_neutral());
    assert!(eventually(|| {
        host.notifier
            .notices
            .lock()
            .unwrap()
            .iter()
            .any(|n| matches!(n, Notice::Disconnected(_)))
    })
    .await);

    host.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_declined_phone_is_closed_without_a_gamepad() {
    // Arrange
    let host = start_host(ChallengeAnswer::Decline).await;
    let mut phone = connect(host.addr, "0000").await;

    // Act
    let first = next_text(&mut phone).await;

    // Assert
    assert_eq!(first, None);
    assert_eq!(host.backend.device_count(), 0);
    let loopback = "127.0.0.1".parse().unwrap();
    assert_eq!(host.trust.state(loopback).await, TrustState::Warned);
    assert!(host.notifier.notices.lock().unwrap().is_empty());

    host.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_hanging_up_during_the_challenge_escalates_trust() {
    // Arrange: the operator never answers.
    let host = start_host_with(None, Duration::from_secs(2)).await;
    let loopback = "127.0.0.1".parse().unwrap();
    let mut states = Vec::new();

    // Act
    for (round, expected) in [(1, TrustState::Warned), (2, TrustState::Blacklisted)] {
        let mut phone = connect(host.addr, "1111").await;
        assert!(eventually(|| host.operator.pins.lock().unwrap().len() == round).await);
        phone.close(None).await.unwrap();
        for _ in 0..100 {
            if host.trust.state(loopback).await == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        states.push(host.trust.state(loopback).await);
    }

    // Assert
    assert_eq!(states, vec![TrustState::Warned, TrustState::Blacklisted]);
    assert_eq!(host.backend.device_count(), 0);

    host.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_silent_client_is_dropped_after_handshake_timeout() {
    // Arrange
    let host = start_host_with(Some(ChallengeAnswer::Accept), Duration::from_millis(100)).await;
    let mut silent = TcpStream::connect(host.addr).await.unwrap();
    let mut buf = [0u8; 16];

    // Act: send nothing and wait for the host to hang up.
    let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf)).await;

    // Assert
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))), "still open: {read:?}");
    assert!(host.operator.pins.lock().unwrap().is_empty());

    host.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_disconnect_all_unplugs_and_notifies_each_phone() {
    // Arrange
    let host = start_host(ChallengeAnswer::Accept).await;
    let mut phone = connect(host.addr, "2222").await;
    assert_eq!(next_text(&mut phone).await.as_deref(), Some(r#"{"type":"authorized"}"#));

    // Act
    let disposed = host.ctx.disconnect_all().await;

    // Assert
    assert_eq!(disposed, 1);
    assert_eq!(host.backend.dispose_count(0), 1);
    let loopback = "127.0.0.1".parse().unwrap();
    assert!(host
        .notifier
        .notices
        .lock()
        .unwrap()
        .contains(&Notice::Disconnected(loopback)));

    host.running.store(false, Ordering::Relaxed);
}
