use super::*;

/// Write bound used before any configuration is stored.
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;

impl<T: Transport> SessionBuilder<T> {
    /// Overrides the host trust policy (default: accept every host key).
    pub fn trust_policy(mut self, policy: HostTrustPolicy) -> Self {
        self.trust = policy;
        self
    }

    /// Overrides the maximum chunk size (default: [`MAX_CHUNK_SIZE`]).
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn build(self) -> Result<Session<T>, SessionError> {
        if self.chunk_size == 0 {
            return Err(SessionError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if matches!(self.trust, HostTrustPolicy::AcceptAll) {
            debug!("Session built with host key verification disabled");
        }
        Ok(Session::from_parts(
            self.transport,
            self.sink,
            self.trust,
            self.chunk_size,
        ))
    }
}

impl<T: Transport> Session<T> {
    /// Creates a disconnected, unconfigured session with default policies.
    pub fn new(transport: T, sink: Arc<dyn EventSink>) -> Self {
        Self::from_parts(transport, sink, HostTrustPolicy::default(), MAX_CHUNK_SIZE)
    }

    fn from_parts(
        transport: T,
        sink: Arc<dyn EventSink>,
        trust: HostTrustPolicy,
        chunk_size: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                sink,
                trust,
                chunk_size,
                label: StdRwLock::new(DEFAULT_LABEL.to_string()),
                trace: AtomicBool::new(false),
                cancel: Notify::new(),
                delivery: StdMutex::new(None),
                inner: Mutex::new(SessionInner {
                    config: None,
                    credentials: None,
                    state: ConnectionState::Disconnected,
                    epoch: 0,
                    transport: None,
                    stream: None,
                }),
            }),
        }
    }

    pub fn builder(transport: T, sink: Arc<dyn EventSink>) -> SessionBuilder<T> {
        SessionBuilder {
            transport,
            sink,
            trust: HostTrustPolicy::default(),
            chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// Validates and stores the configuration used by every later connect.
    ///
    /// Only allowed while disconnected. Re-supplying identical credentials
    /// to an active session is accepted as a no-op; anything else is
    /// rejected with [`SessionError::SessionActive`].
    pub async fn initialize(&self, config: SessionConfig) -> Result<(), SessionError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        if inner.state != ConnectionState::Disconnected {
            let same = config
                .validate()
                .ok()
                .zip(inner.credentials.as_ref())
                .is_some_and(|(new, current)| current.matches(&new));
            if same {
                shared.status(format_args!("initialize() parameters unchanged."));
                return Ok(());
            }
            shared.status(format_args!(
                "initialize() rejected, session is {}.",
                inner.state
            ));
            return Err(SessionError::SessionActive);
        }

        shared.set_label(config.label());
        shared.trace.store(config.trace, Ordering::Relaxed);

        match config.validate() {
            Ok(credentials) => {
                shared.status(format_args!(
                    "initialize() initialized {} successfully.",
                    credentials.target()
                ));
                inner.credentials = Some(credentials);
                inner.config = Some(config);
                shared.sink.on_initialized(true);
                Ok(())
            }
            Err(err) => {
                shared.status(format_args!("initialize() error validating parameters: {err}"));
                inner.credentials = None;
                inner.config = None;
                shared.sink.on_initialized(false);
                Err(err)
            }
        }
    }

    /// Establishes the transport and opens the shell stream.
    ///
    /// Calling this while a live connection exists does nothing and returns
    /// [`ConnectOutcome::AlreadyConnected`]. On failure every partially
    /// created resource is released and the session stays disconnected.
    pub async fn connect(&self) -> Result<ConnectOutcome, SessionError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        match inner.state {
            ConnectionState::Connected => {
                if inner.transport.as_ref().is_some_and(|t| t.is_connected()) {
                    shared.status(format_args!("connect() called, but already connected."));
                    return Ok(ConnectOutcome::AlreadyConnected);
                }
                shared
                    .teardown_locked(&mut inner, "transport no longer connected")
                    .await;
            }
            ConnectionState::Connecting => {
                shared.status(format_args!("connect() called, but a connect is in progress."));
                return Err(SessionError::ConnectInProgress);
            }
            ConnectionState::Disconnected => {}
        }

        let Some((config, credentials)) = inner.config.clone().zip(inner.credentials.clone())
        else {
            shared.status(format_args!("connect() called but data is not initialized."));
            return Err(SessionError::NotInitialized);
        };

        inner.state = ConnectionState::Connecting;
        inner.epoch += 1;
        let epoch = inner.epoch;

        // Registered before the lock is released so a disconnect cannot slip in unseen.
        let cancelled = shared.cancel.notified();
        drop(inner);

        shared.status(format_args!(
            "connect() attempting connection to {} on port {}.",
            credentials.host(),
            credentials.port()
        ));
        let attempt = tokio::select! {
            result = shared.establish(&config, &credentials) => Some(result),
            _ = cancelled => None,
        };

        let mut inner = shared.inner.lock().await;
        if inner.epoch != epoch || inner.state != ConnectionState::Connecting {
            if let Some(Ok((mut handle, shell))) = attempt {
                drop(shell);
                if let Err(e) = handle.disconnect().await {
                    debug!("[{}] disconnect after cancelled connect: {}", shared.label(), e);
                }
            }
            shared.status(format_args!("connect() cancelled by disconnect."));
            return Err(SessionError::ConnectCancelled);
        }

        let (handle, shell) = match attempt {
            Some(Ok(established)) => established,
            Some(Err(err)) => {
                inner.state = ConnectionState::Disconnected;
                shared.status(format_args!("connect() connection exception: {err}"));
                return Err(err);
            }
            None => {
                inner.state = ConnectionState::Disconnected;
                return Err(SessionError::ConnectCancelled);
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        inner.transport = Some(handle);
        inner.stream = Some(ShellHandle {
            writer: shell.writer,
            stop: Some(stop_tx),
        });
        inner.state = ConnectionState::Connected;
        *shared.delivery.lock().unwrap_or_else(PoisonError::into_inner) = Some(epoch);

        shared.status(format_args!("connect() connection successful."));
        shared.sink.on_connection_state(true);

        tokio::spawn(Shared::run_reader(
            Arc::downgrade(shared),
            epoch,
            shell.events,
            stop_rx,
        ));

        Ok(ConnectOutcome::NewlyConnected)
    }

    /// Tears the session down. Safe to call in any state, any number of times.
    ///
    /// Always returns `true`: teardown cannot fail, secondary errors are
    /// only logged.
    pub async fn disconnect(&self) -> bool {
        let mut inner = self.shared.inner.lock().await;
        self.shared
            .teardown_locked(&mut inner, "disconnect requested")
            .await;
        true
    }

    /// Writes `line` plus the configured terminator to the shell.
    ///
    /// When not connected, reconnects once with the stored credentials
    /// (unless `reconnect_on_send` is off). Write failures that indicate a
    /// dead connection tear the session down; other failures are returned
    /// and leave the session as it is.
    pub async fn send(&self, line: &str) -> Result<(), SessionError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        let live = inner.state == ConnectionState::Connected
            && inner.transport.as_ref().is_some_and(|t| t.is_connected());
        if !live {
            if inner.state == ConnectionState::Connected {
                shared
                    .teardown_locked(&mut inner, "transport no longer connected")
                    .await;
            }
            let Some(reconnect) = inner.config.as_ref().map(|c| c.reconnect_on_send) else {
                shared.status(format_args!("send() called but data is not initialized."));
                return Err(SessionError::NotInitialized);
            };
            if !reconnect {
                shared.status(format_args!("send() not connected, dropping command."));
                return Err(SessionError::NotConnected);
            }
            drop(inner);

            shared.status(format_args!("send() not connected, will attempt connection..."));
            if let Err(err) = self.connect().await {
                shared.status(format_args!("send() error, could not connect: {err}"));
                return Err(err);
            }

            inner = shared.inner.lock().await;
            if inner.state != ConnectionState::Connected {
                return Err(SessionError::NotConnected);
            }
        }

        let (terminator, write_timeout) = inner.config.as_ref().map_or(
            ("\n".to_string(), DEFAULT_WRITE_TIMEOUT_SECS),
            |c| (c.line_terminator.clone(), c.connect_timeout_secs),
        );

        // The session lock is held across the write; a stalled write counts as a dead peer.
        let result = match inner.stream.as_mut() {
            Some(stream) if stream.writer.can_write() => {
                shared.status(format_args!("send() sending: {}", line.trim()));
                let write = stream.writer.write(format!("{line}{terminator}").into_bytes());
                tokio::time::timeout(Duration::from_secs(write_timeout), write)
                    .await
                    .unwrap_or_else(|_| {
                        Err(SessionError::ConnectionLost(format!(
                            "write stalled for {write_timeout}s"
                        )))
                    })
            }
            _ => Err(SessionError::StreamNotWritable),
        };

        match result {
            Ok(()) => Ok(()),
            Err(SessionError::StreamNotWritable) => {
                shared.status(format_args!("send() stream is missing or not writable."));
                shared
                    .teardown_locked(&mut inner, "shell stream not writable")
                    .await;
                Err(SessionError::StreamNotWritable)
            }
            Err(err) if err.is_connection_lost() => {
                shared.status(format_args!("send() connection lost: {err}"));
                shared.teardown_locked(&mut inner, "write failed").await;
                Err(match err {
                    SessionError::ConnectionLost(_) => err,
                    other => SessionError::ConnectionLost(other.to_string()),
                })
            }
            Err(err) => {
                shared.status(format_args!("send() exception occurred: {err}"));
                Err(err)
            }
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.inner.lock().await.state
    }

    /// Whether a live transport and shell stream exist.
    pub async fn is_connected(&self) -> bool {
        let inner = self.shared.inner.lock().await;
        inner.state == ConnectionState::Connected
            && inner.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    pub async fn is_initialized(&self) -> bool {
        self.shared.inner.lock().await.credentials.is_some()
    }

    pub fn label(&self) -> String {
        self.shared.label()
    }

    pub fn trace_enabled(&self) -> bool {
        self.shared.trace.load(Ordering::Relaxed)
    }

    /// Toggles info-level lifecycle diagnostics at runtime.
    pub fn set_trace(&self, enabled: bool) {
        self.shared.trace.store(enabled, Ordering::Relaxed);
    }
}

impl<T: Transport> Shared<T> {
    pub(super) fn label(&self) -> String {
        self.label
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_label(&self, label: &str) {
        *self.label.write().unwrap_or_else(PoisonError::into_inner) = label.to_string();
    }

    /// Emits one diagnostic status line.
    pub(super) fn status(&self, message: fmt::Arguments<'_>) {
        if self.trace.load(Ordering::Relaxed) {
            info!("[{}] {}", self.label(), message);
        } else {
            debug!("[{}] {}", self.label(), message);
        }
    }

    /// Handshake, authentication and shell creation, with no shared state
    /// touched. A shell failure disconnects the fresh transport.
    async fn establish(
        &self,
        config: &SessionConfig,
        credentials: &Credentials,
    ) -> Result<(T::Handle, ShellStream<WriterOf<T>>), SessionError> {
        let options = TransportOptions {
            responder: PasswordPromptResponder::new(credentials.secret()),
            trust: self.trust.clone(),
            security_level: config.security_level,
            timeout: Duration::from_secs(config.connect_timeout_secs),
            label: self.label(),
        };

        let mut handle = tokio::time::timeout(
            options.timeout,
            self.transport.connect(credentials, &options),
        )
        .await
        .map_err(|_| SessionError::Timeout(config.connect_timeout_secs))??;

        self.status(format_args!("Creating stream..."));
        match handle.open_shell(&config.terminal).await {
            Ok(shell) => Ok((handle, shell)),
            Err(err) => {
                self.status(format_args!("Exception creating stream: {err}"));
                if let Err(e) = handle.disconnect().await {
                    debug!("[{}] disconnect after stream failure: {}", self.label(), e);
                }
                Err(match err {
                    SessionError::StreamCreation(_) => err,
                    other => SessionError::StreamCreation(other.to_string()),
                })
            }
        }
    }

    /// Teardown requested by the reader of connection `epoch`.
    pub(super) async fn teardown_if_current(&self, epoch: u64, reason: &str) {
        let mut inner = self.inner.lock().await;
        if inner.epoch == epoch && inner.state == ConnectionState::Connected {
            self.teardown_locked(&mut inner, reason).await;
        } else {
            trace!(
                "[{}] stale teardown request ignored: {}",
                self.label(),
                reason
            );
        }
    }

    /// Releases the stream and transport together and reports the
    /// transition. A no-op when already disconnected.
    async fn teardown_locked(&self, inner: &mut SessionInner<T>, reason: &str) {
        match inner.state {
            ConnectionState::Disconnected => return,
            ConnectionState::Connecting => {
                // Nothing is published yet; the in-flight connect cleans up.
                inner.state = ConnectionState::Disconnected;
                inner.epoch += 1;
                self.cancel.notify_waiters();
                self.status(format_args!("reset() cancelling connect: {reason}"));
                return;
            }
            ConnectionState::Connected => {}
        }

        self.status(format_args!("reset() resetting all objects: {reason}"));
        inner.epoch += 1;
        *self.delivery.lock().unwrap_or_else(PoisonError::into_inner) = None;

        if let Some(stream) = inner.stream.take() {
            stream.close();
            self.status(format_args!("reset() stream reset."));
        }
        if let Some(mut transport) = inner.transport.take() {
            if transport.is_connected() {
                if let Err(e) = transport.disconnect().await {
                    warn!("[{}] reset() disconnect error: {}", self.label(), e);
                }
            }
            drop(transport);
            self.status(format_args!("reset() client reset."));
        }

        inner.state = ConnectionState::Disconnected;
        self.sink.on_connection_state(false);
    }
}
