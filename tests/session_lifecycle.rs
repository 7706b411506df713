use rsshmgr::config::{Credentials, SessionConfig, TerminalSize};
use rsshmgr::error::SessionError;
use rsshmgr::session::{
    ChannelSink, ConnectOutcome, ConnectionEvent, ConnectionState, Session, SessionEvent,
    SimpleSession,
};
use rsshmgr::transport::{
    ShellEvent, ShellStream, ShellWriter, Transport, TransportHandle, TransportOptions,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Counters and switches shared between a test and its in-memory transport.
#[derive(Default)]
struct Fixture {
    connects: AtomicUsize,
    live_handles: AtomicUsize,
    live_writers: AtomicUsize,
    fail_handshake: AtomicBool,
    fail_shell: AtomicBool,
    transport_dead: AtomicBool,
    writer_broken: AtomicBool,
    handshake_delay_ms: AtomicU64,
    write_delay_ms: AtomicU64,
    last_target: Mutex<Option<String>>,
    password_answer: Mutex<Option<String>>,
    feed: Mutex<Option<mpsc::Sender<ShellEvent>>>,
    written: Mutex<Vec<String>>,
    next_write_error: Mutex<Option<SessionError>>,
}

impl Fixture {
    async fn push(&self, event: ShellEvent) {
        let feed = self.feed.lock().unwrap().clone().expect("shell opened");
        feed.send(event).await.expect("reader alive");
    }

    fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    fn assert_released(&self) {
        assert_eq!(self.live_handles.load(Ordering::SeqCst), 0, "transport leaked");
        assert_eq!(self.live_writers.load(Ordering::SeqCst), 0, "stream leaked");
    }
}

struct StubTransport {
    fixture: Arc<Fixture>,
}

impl Transport for StubTransport {
    type Handle = StubHandle;

    async fn connect(
        &self,
        credentials: &Credentials,
        options: &TransportOptions,
    ) -> Result<StubHandle, SessionError> {
        let fixture = self.fixture.clone();
        fixture.connects.fetch_add(1, Ordering::SeqCst);
        *fixture.last_target.lock().unwrap() = Some(credentials.target());
        *fixture.password_answer.lock().unwrap() =
            options.responder.respond(["Password: "]).pop().flatten();

        let delay = fixture.handshake_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if fixture.fail_handshake.load(Ordering::SeqCst) {
            return Err(SessionError::Handshake("connection refused".to_string()));
        }

        fixture.transport_dead.store(false, Ordering::SeqCst);
        fixture.live_handles.fetch_add(1, Ordering::SeqCst);
        Ok(StubHandle { fixture, open: true })
    }
}

struct StubHandle {
    fixture: Arc<Fixture>,
    open: bool,
}

impl Drop for StubHandle {
    fn drop(&mut self) {
        self.fixture.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TransportHandle for StubHandle {
    type Writer = StubWriter;

    fn is_connected(&self) -> bool {
        self.open && !self.fixture.transport_dead.load(Ordering::SeqCst)
    }

    async fn open_shell(
        &mut self,
        _terminal: &TerminalSize,
    ) -> Result<ShellStream<StubWriter>, SessionError> {
        if self.fixture.fail_shell.load(Ordering::SeqCst) {
            return Err(SessionError::StreamCreation("pty refused".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        *self.fixture.feed.lock().unwrap() = Some(tx);
        self.fixture.writer_broken.store(false, Ordering::SeqCst);
        self.fixture.live_writers.fetch_add(1, Ordering::SeqCst);
        Ok(ShellStream {
            writer: StubWriter {
                fixture: self.fixture.clone(),
            },
            events: rx,
        })
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.open = false;
        Ok(())
    }
}

struct StubWriter {
    fixture: Arc<Fixture>,
}

impl Drop for StubWriter {
    fn drop(&mut self) {
        self.fixture.live_writers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ShellWriter for StubWriter {
    fn can_write(&self) -> bool {
        !self.fixture.writer_broken.load(Ordering::SeqCst)
    }

    async fn write(&mut self, data: Vec<u8>) -> Result<(), SessionError> {
        let delay = self.fixture.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(err) = self.fixture.next_write_error.lock().unwrap().take() {
            return Err(err);
        }
        let line = String::from_utf8(data).expect("utf-8 command");
        self.fixture.written.lock().unwrap().push(line);
        Ok(())
    }
}

type Events = mpsc::UnboundedReceiver<SessionEvent>;

fn scenario_config() -> SessionConfig {
    SessionConfig::new("10.0.0.5", 22, "op", "s3cr3t").with_label("rack-1")
}

fn new_session() -> (Session<StubTransport>, Arc<Fixture>, Events) {
    let fixture = Arc::new(Fixture::default());
    let (sink, events) = ChannelSink::new();
    let session = Session::new(
        StubTransport {
            fixture: fixture.clone(),
        },
        Arc::new(sink),
    );
    (session, fixture, events)
}

async fn next_event(events: &mut Events) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event within timeout")
        .expect("sink open")
}

async fn assert_quiet(events: &mut Events) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err(), "unexpected event");
}

/// Initialized and connected, with both notifications already consumed.
async fn connected_session() -> (Session<StubTransport>, Arc<Fixture>, Events) {
    let (session, fixture, mut events) = new_session();
    session.initialize(scenario_config()).await.expect("initialize");
    assert_eq!(next_event(&mut events).await, SessionEvent::Initialized(true));

    let outcome = session.connect().await.expect("connect");
    assert_eq!(outcome, ConnectOutcome::NewlyConnected);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Connected)
    );
    (session, fixture, events)
}

async fn collect_data(events: &mut Events, expected_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut seen = 0;
    while seen < expected_chars {
        match next_event(events).await {
            SessionEvent::Data(chunk) => {
                seen += chunk.chars().count();
                chunks.push(chunk);
            }
            other => panic!("expected data, got {other:?}"),
        }
    }
    chunks
}

#[tokio::test]
async fn connects_with_initialized_credentials() {
    let (session, fixture, _events) = connected_session().await;

    assert_eq!(session.state().await, ConnectionState::Connected);
    assert!(session.is_connected().await);
    assert_eq!(session.label(), "rack-1");
    assert_eq!(
        fixture.last_target.lock().unwrap().as_deref(),
        Some("op@10.0.0.5:22")
    );
    assert_eq!(
        fixture.password_answer.lock().unwrap().as_deref(),
        Some("s3cr3t")
    );
}

#[tokio::test]
async fn second_connect_reuses_live_connection() {
    let (session, fixture, mut events) = connected_session().await;

    let outcome = session.connect().await.expect("connect again");
    assert_eq!(outcome, ConnectOutcome::AlreadyConnected);
    assert_eq!(fixture.connects.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.live_handles.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.live_writers.load(Ordering::SeqCst), 1);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (session, fixture, mut events) = connected_session().await;

    assert!(session.disconnect().await);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    fixture.assert_released();

    assert!(session.disconnect().await);
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn disconnect_before_any_connect_is_silent() {
    let (session, _fixture, mut events) = new_session();
    assert!(session.disconnect().await);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn long_output_is_delivered_in_bounded_chunks() {
    let (_session, fixture, mut events) = connected_session().await;
    let output: String = (0..600)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();

    fixture.push(ShellEvent::Data(output.clone().into_bytes())).await;

    let chunks = collect_data(&mut events, 600).await;
    let sizes: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
    assert_eq!(sizes, vec![250, 250, 100]);
    assert_eq!(chunks.concat(), output);
}

#[tokio::test]
async fn empty_reads_produce_no_chunks() {
    let (_session, fixture, mut events) = connected_session().await;

    fixture.push(ShellEvent::Data(Vec::new())).await;
    assert_quiet(&mut events).await;

    fixture.push(ShellEvent::Data(b"router#".to_vec())).await;
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Data("router#".to_string())
    );
}

#[tokio::test]
async fn transport_error_tears_down_then_send_reconnects() {
    let (session, fixture, mut events) = connected_session().await;

    fixture
        .push(ShellEvent::TransportError("connection reset".to_string()))
        .await;
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    fixture.assert_released();
    assert_quiet(&mut events).await;

    session.send("show status").await.expect("send reconnects");
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Connected)
    );
    assert_eq!(fixture.connects.load(Ordering::SeqCst), 2);
    assert_eq!(fixture.written(), vec!["show status\n".to_string()]);
}

#[tokio::test]
async fn stream_error_tears_down() {
    let (session, fixture, mut events) = connected_session().await;

    fixture
        .push(ShellEvent::StreamError("channel failure".to_string()))
        .await;
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    fixture.assert_released();
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn truncated_character_at_close_is_replaced() {
    let (_session, fixture, mut events) = connected_session().await;

    fixture.push(ShellEvent::Data(b"ok\xC3".to_vec())).await;
    fixture.push(ShellEvent::Closed).await;

    assert_eq!(next_event(&mut events).await, SessionEvent::Data("ok".to_string()));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Data("\u{fffd}".to_string())
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn data_before_close_is_delivered_before_disconnect() {
    let (_session, fixture, mut events) = connected_session().await;

    fixture.push(ShellEvent::Data(b"bye".to_vec())).await;
    fixture.push(ShellEvent::Closed).await;

    assert_eq!(next_event(&mut events).await, SessionEvent::Data("bye".to_string()));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    fixture.assert_released();
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn no_chunks_follow_the_disconnect_event() {
    let (session, fixture, mut events) = connected_session().await;

    fixture.push(ShellEvent::Data(b"late output".to_vec())).await;
    session.disconnect().await;

    loop {
        match next_event(&mut events).await {
            SessionEvent::Data(_) => continue,
            SessionEvent::Connection(ConnectionEvent::Disconnected) => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn send_appends_configured_terminator() {
    let (session, fixture, mut events) = new_session();
    let mut config = scenario_config();
    config.line_terminator = "\r\n".to_string();
    session.initialize(config).await.expect("initialize");
    next_event(&mut events).await;

    session.send("terminal length 0").await.expect("send");
    assert_eq!(fixture.written(), vec!["terminal length 0\r\n".to_string()]);
}

#[tokio::test]
async fn unwritable_stream_tears_down() {
    let (session, fixture, mut events) = connected_session().await;
    fixture.writer_broken.store(true, Ordering::SeqCst);

    let err = session.send("show version").await.unwrap_err();
    assert!(matches!(err, SessionError::StreamNotWritable));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    fixture.assert_released();
    assert!(fixture.written().is_empty());
}

#[tokio::test]
async fn connection_loss_during_write_tears_down() {
    let (session, fixture, mut events) = connected_session().await;
    *fixture.next_write_error.lock().unwrap() =
        Some(SessionError::Write("broken pipe".to_string()));

    let err = session.send("show version").await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectionLost(_)));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    fixture.assert_released();
}

#[tokio::test]
async fn stalled_write_is_bounded_and_tears_down() {
    let (session, fixture, mut events) = new_session();
    let mut config = scenario_config();
    config.connect_timeout_secs = 1;
    session.initialize(config).await.expect("initialize");
    next_event(&mut events).await;
    session.connect().await.expect("connect");
    next_event(&mut events).await;
    fixture.write_delay_ms.store(5_000, Ordering::SeqCst);

    let err = tokio::time::timeout(Duration::from_secs(3), session.send("show tech"))
        .await
        .expect("write is bounded")
        .unwrap_err();
    assert!(matches!(err, SessionError::ConnectionLost(_)));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    fixture.assert_released();
    assert!(fixture.written().is_empty());
}

#[tokio::test]
async fn transient_write_error_keeps_session() {
    let (session, fixture, mut events) = connected_session().await;
    *fixture.next_write_error.lock().unwrap() =
        Some(SessionError::Write("resource temporarily unavailable".to_string()));

    let err = session.send("show version").await.unwrap_err();
    assert!(matches!(err, SessionError::Write(_)));
    assert!(session.is_connected().await);
    assert_quiet(&mut events).await;

    session.send("show version").await.expect("retry");
    assert_eq!(fixture.written(), vec!["show version\n".to_string()]);
}

#[tokio::test]
async fn silently_dead_transport_is_replaced_on_send() {
    let (session, fixture, mut events) = connected_session().await;
    fixture.transport_dead.store(true, Ordering::SeqCst);

    session.send("show clock").await.expect("send reconnects");
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Disconnected)
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Connected)
    );
    assert_eq!(fixture.connects.load(Ordering::SeqCst), 2);
    assert_eq!(fixture.live_handles.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.written(), vec!["show clock\n".to_string()]);
}

#[tokio::test]
async fn send_without_reconnect_reports_not_connected() {
    let (session, fixture, mut events) = new_session();
    let mut config = scenario_config();
    config.reconnect_on_send = false;
    session.initialize(config).await.expect("initialize");
    next_event(&mut events).await;

    let err = session.send("show version").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    assert_eq!(fixture.connects.load(Ordering::SeqCst), 0);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn uninitialized_session_refuses_to_connect() {
    let (session, fixture, mut events) = new_session();

    assert!(matches!(
        session.connect().await,
        Err(SessionError::NotInitialized)
    ));
    assert!(matches!(
        session.send("show version").await,
        Err(SessionError::NotInitialized)
    ));
    assert_eq!(fixture.connects.load(Ordering::SeqCst), 0);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn invalid_configuration_is_reported() {
    let (session, _fixture, mut events) = new_session();

    let err = session
        .initialize(SessionConfig::new("", 22, "op", "s3cr3t"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidConfig(_)));
    assert_eq!(next_event(&mut events).await, SessionEvent::Initialized(false));
    assert!(!session.is_initialized().await);
}

#[tokio::test]
async fn handshake_failure_leaves_session_disconnected() {
    let (session, fixture, mut events) = new_session();
    session.initialize(scenario_config()).await.expect("initialize");
    next_event(&mut events).await;
    fixture.fail_handshake.store(true, Ordering::SeqCst);

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Handshake(_)));
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    fixture.assert_released();
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn shell_failure_releases_transport() {
    let (session, fixture, mut events) = new_session();
    session.initialize(scenario_config()).await.expect("initialize");
    next_event(&mut events).await;
    fixture.fail_shell.store(true, Ordering::SeqCst);

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::StreamCreation(_)));
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    fixture.assert_released();
    assert_quiet(&mut events).await;

    fixture.fail_shell.store(false, Ordering::SeqCst);
    session.connect().await.expect("retry succeeds");
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Connection(ConnectionEvent::Connected)
    );
}

#[tokio::test]
async fn disconnect_cancels_inflight_connect() {
    let (session, fixture, mut events) = new_session();
    session.initialize(scenario_config()).await.expect("initialize");
    next_event(&mut events).await;
    fixture.handshake_delay_ms.store(500, Ordering::SeqCst);

    let connecting = session.clone();
    let attempt = tokio::spawn(async move { connecting.connect().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state().await, ConnectionState::Connecting);

    assert!(matches!(
        session.connect().await,
        Err(SessionError::ConnectInProgress)
    ));
    assert!(session.disconnect().await);

    let result = attempt.await.expect("connect task");
    assert!(matches!(result, Err(SessionError::ConnectCancelled)));
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    fixture.assert_released();
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn reinitialize_while_connected() {
    let (session, _fixture, _events) = connected_session().await;

    session
        .initialize(scenario_config())
        .await
        .expect("identical parameters are accepted");

    let err = session
        .initialize(SessionConfig::new("10.0.0.6", 22, "op", "s3cr3t"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SessionActive));
    assert!(session.is_connected().await);
}

#[tokio::test]
async fn simple_session_reports_through_integers() {
    let (session, fixture, mut events) = new_session();
    let mut simple = SimpleSession::new(session);
    simple.set_hostname("10.0.0.5");
    simple.set_port(22);
    simple.set_username("op");
    simple.set_password("s3cr3t");
    simple.set_trace_enabled(7);
    assert_eq!(simple.trace_enabled(), 1);

    simple.initialize().await;
    assert_eq!(next_event(&mut events).await, SessionEvent::Initialized(true));
    assert_eq!(simple.connected().await, 0);

    simple.connect().await;
    assert_eq!(simple.connected().await, 1);
    simple.send("show version").await;
    assert_eq!(fixture.written(), vec!["show version\n".to_string()]);

    simple.disconnect().await;
    assert_eq!(simple.connected().await, 0);
    fixture.assert_released();

    simple.set_trace_enabled(0);
    assert_eq!(simple.trace_enabled(), 0);
    assert!(!simple.session().trace_enabled());
}

#[tokio::test]
async fn simple_session_swallows_failures() {
    let (session, fixture, mut events) = new_session();
    let simple = SimpleSession::new(session);

    simple.connect().await;
    simple.send("show version").await;
    assert_eq!(simple.connected().await, 0);
    assert_eq!(fixture.connects.load(Ordering::SeqCst), 0);
    assert_quiet(&mut events).await;
}
