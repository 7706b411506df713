use super::*;

/// Narrow wrapper around [`Session`] for control systems that speak in
/// integers and fire-and-forget commands.
///
/// Connection parameters are set one by one, then committed with
/// [`SimpleSession::initialize`]. Command methods return nothing; failures
/// only surface through diagnostics and the event sink.
pub struct SimpleSession<T: Transport> {
    session: Session<T>,
    hostname: String,
    port: u16,
    username: String,
    password: String,
    trace_enabled: bool,
}

impl<T: Transport> SimpleSession<T> {
    pub fn new(session: Session<T>) -> Self {
        Self {
            session,
            hostname: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            trace_enabled: false,
        }
    }

    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.hostname = hostname.into();
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    /// `0` disables diagnostics, anything else enables them.
    pub fn set_trace_enabled(&mut self, value: u16) {
        self.trace_enabled = value > 0;
        self.session.set_trace(self.trace_enabled);
    }

    pub fn trace_enabled(&self) -> u16 {
        u16::from(self.trace_enabled)
    }

    /// Commits the parameters set so far; the outcome is reported through
    /// the sink's `on_initialized`.
    pub async fn initialize(&self) {
        let config = SessionConfig::new(
            self.hostname.clone(),
            self.port,
            self.username.clone(),
            self.password.clone(),
        )
        .with_trace(self.trace_enabled);
        if let Err(e) = self.session.initialize(config).await {
            debug!("[{}] initialize failed: {}", self.session.label(), e);
        }
    }

    pub async fn connect(&self) {
        if let Err(e) = self.session.connect().await {
            debug!("[{}] connect failed: {}", self.session.label(), e);
        }
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub async fn send(&self, line: &str) {
        if let Err(e) = self.session.send(line).await {
            debug!("[{}] send failed: {}", self.session.label(), e);
        }
    }

    /// `1` when connected, `0` otherwise.
    pub async fn connected(&self) -> u16 {
        u16::from(self.session.is_connected().await)
    }

    /// The wrapped session, for callers that need the full interface.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }
}
