use log::debug;
use russh::client::{self, Handle, KeyboardInteractiveAuthResponse};
use russh::keys::{HashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use super::security::preferred;
use super::{ShellEvent, ShellStream, ShellWriter, Transport, TransportHandle, TransportOptions};
use crate::config::{Credentials, TerminalSize};
use crate::error::SessionError;
use crate::session::{HostTrustPolicy, PasswordPromptResponder};

/// Upper bound on keyboard-interactive rounds before giving up.
const MAX_PROMPT_ROUNDS: usize = 8;

/// Capacity of the shell input and output queues.
const SHELL_QUEUE_DEPTH: usize = 256;

/// Transport backed by the russh client.
#[derive(Debug, Clone, Default)]
pub struct RusshTransport;

impl RusshTransport {
    pub fn new() -> Self {
        Self
    }
}

/// russh callback handler consulting the session's host trust policy.
struct TrustHandler {
    host: String,
    port: u16,
    policy: HostTrustPolicy,

    /// Fingerprint of a key the policy refused, for error reporting.
    rejected: Arc<Mutex<Option<String>>>,
}

impl client::Handler for TrustHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        let trusted = self.policy.evaluate(&self.host, self.port, &fingerprint);
        if !trusted {
            *self.rejected.lock().unwrap_or_else(PoisonError::into_inner) = Some(fingerprint);
        }
        Ok(trusted)
    }
}

impl Transport for RusshTransport {
    type Handle = RusshHandle;

    async fn connect(
        &self,
        credentials: &Credentials,
        options: &TransportOptions,
    ) -> Result<RusshHandle, SessionError> {
        let label = &options.label;
        let config = client::Config {
            preferred: preferred(options.security_level),
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let rejected = Arc::new(Mutex::new(None));
        let handler = TrustHandler {
            host: credentials.host().to_string(),
            port: credentials.port(),
            policy: options.trust.clone(),
            rejected: rejected.clone(),
        };

        debug!(
            "[{}] Connecting to {}:{}",
            label,
            credentials.host(),
            credentials.port()
        );
        let mut handle = client::connect(
            Arc::new(config),
            (credentials.host().to_string(), credentials.port()),
            handler,
        )
        .await
        .map_err(|e| {
            match rejected.lock().unwrap_or_else(PoisonError::into_inner).take() {
                Some(fingerprint) => SessionError::HostKeyRejected {
                    host: credentials.host().to_string(),
                    fingerprint,
                },
                None => SessionError::Handshake(e.to_string()),
            }
        })?;
        debug!("[{}] {} handshake completed", label, credentials.target());

        if !authenticate(&mut handle, credentials, &options.responder, label).await? {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(SessionError::AuthenticationFailed(credentials.target()));
        }
        debug!("[{}] {} authenticated", label, credentials.target());

        Ok(RusshHandle {
            handle,
            label: label.clone(),
        })
    }
}

/// Keyboard-interactive first, password as fallback.
async fn authenticate(
    handle: &mut Handle<TrustHandler>,
    credentials: &Credentials,
    responder: &PasswordPromptResponder,
    label: &str,
) -> Result<bool, SessionError> {
    match keyboard_interactive(handle, credentials.username(), responder, label).await {
        Ok(true) => return Ok(true),
        Ok(false) => debug!(
            "[{}] keyboard-interactive rejected, trying password",
            label
        ),
        Err(e) => debug!(
            "[{}] keyboard-interactive failed: {}, trying password",
            label, e
        ),
    }
    if handle.is_closed() {
        return Err(SessionError::ConnectionLost(
            "closed during authentication".to_string(),
        ));
    }

    let result = handle
        .authenticate_password(credentials.username(), credentials.secret())
        .await?;
    Ok(result.success())
}

async fn keyboard_interactive(
    handle: &mut Handle<TrustHandler>,
    username: &str,
    responder: &PasswordPromptResponder,
    label: &str,
) -> Result<bool, SessionError> {
    let mut reply = handle
        .authenticate_keyboard_interactive_start(username, None::<String>)
        .await?;

    for _ in 0..MAX_PROMPT_ROUNDS {
        match reply {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                debug!("[{}] answering {} auth prompt(s)", label, prompts.len());
                let responses = responder
                    .respond(prompts.iter().map(|p| p.prompt.as_str()))
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect();
                reply = handle
                    .authenticate_keyboard_interactive_respond(responses)
                    .await?;
            }
        }
    }
    Ok(false)
}

/// Authenticated russh connection.
pub struct RusshHandle {
    handle: Handle<TrustHandler>,
    label: String,
}

impl TransportHandle for RusshHandle {
    type Writer = RusshWriter;

    fn is_connected(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn open_shell(
        &mut self,
        terminal: &TerminalSize,
    ) -> Result<ShellStream<RusshWriter>, SessionError> {
        let stream_error = |e: russh::Error| SessionError::StreamCreation(e.to_string());

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(stream_error)?;
        channel
            .request_pty(
                false,
                &terminal.term,
                terminal.columns,
                terminal.rows,
                terminal.width_px,
                terminal.height_px,
                &[],
            )
            .await
            .map_err(stream_error)?;
        channel.request_shell(false).await.map_err(stream_error)?;
        debug!("[{}] Shell request successful", self.label);

        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(SHELL_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::channel::<ShellEvent>(SHELL_QUEUE_DEPTH);

        let io_label = self.label.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    input = input_rx.recv() => match input {
                        Some(data) => {
                            if let Err(e) = channel.data(&data[..]).await {
                                debug!("[{}] Failed to send data to shell: {:?}", io_label, e);
                                let _ = event_tx.send(ShellEvent::StreamError(e.to_string())).await;
                                break;
                            }
                        }
                        None => {
                            let _ = channel.eof().await;
                            break;
                        }
                    },
                    msg = channel.wait() => match msg {
                        Some(ChannelMsg::Data { ref data })
                        | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                            if event_tx.send(ShellEvent::Data(data.to_vec())).await.is_err() {
                                debug!("[{}] Shell output receiver dropped. Closing task.", io_label);
                                break;
                            }
                        }
                        Some(ChannelMsg::ExitStatus { exit_status }) => {
                            debug!("[{}] Shell exited with status code: {}", io_label, exit_status);
                            let _ = channel.eof().await;
                            let _ = event_tx.send(ShellEvent::Closed).await;
                            break;
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => {
                            debug!("[{}] Shell sent EOF.", io_label);
                            let _ = event_tx.send(ShellEvent::Closed).await;
                            break;
                        }
                        Some(_) => {}
                        None => {
                            let _ = event_tx
                                .send(ShellEvent::TransportError("connection closed".to_string()))
                                .await;
                            break;
                        }
                    }
                }
            }
            debug!("[{}] SSH I/O task ended.", io_label);
        });

        Ok(ShellStream {
            writer: RusshWriter { input: input_tx },
            events: event_rx,
        })
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Queues command input for the shell I/O task.
pub struct RusshWriter {
    input: mpsc::Sender<Vec<u8>>,
}

impl ShellWriter for RusshWriter {
    fn can_write(&self) -> bool {
        !self.input.is_closed()
    }

    async fn write(&mut self, data: Vec<u8>) -> Result<(), SessionError> {
        self.input
            .send(data)
            .await
            .map_err(|_| SessionError::Write("shell channel closed".to_string()))
    }
}
