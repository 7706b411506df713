//! Error types for SSH session lifecycle management.
//!
//! This module defines every error a session can report: configuration
//! problems, handshake and authentication failures, shell stream creation
//! failures, runtime I/O errors and send-time failures.

use thiserror::Error;

/// Errors that can occur while configuring, connecting or driving a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A configuration field is missing or out of range.
    ///
    /// Reported synchronously from `initialize`/`connect` and never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `connect` was called before the session received a valid configuration.
    #[error("session not initialized")]
    NotInitialized,

    /// A new configuration was supplied while the session is not disconnected.
    #[error("session is active, disconnect before reconfiguring")]
    SessionActive,

    /// The transport could not establish a connection to the host.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server rejected every authentication attempt.
    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    /// The host trust policy refused the presented host key.
    #[error("host key rejected for {host}: {fingerprint}")]
    HostKeyRejected { host: String, fingerprint: String },

    /// The transport connected but no interactive shell could be opened.
    #[error("shell stream creation failed: {0}")]
    StreamCreation(String),

    /// Another `connect` call is currently negotiating the handshake.
    #[error("connect already in progress")]
    ConnectInProgress,

    /// `disconnect` was requested while this `connect` was in flight.
    #[error("connect cancelled by disconnect")]
    ConnectCancelled,

    /// No live transport exists and reconnecting was not permitted.
    #[error("not connected")]
    NotConnected,

    /// The transport reports connected but the shell stream refuses writes.
    #[error("shell stream is not writable")]
    StreamNotWritable,

    /// The connection went away underneath the session.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Writing a command line to the shell stream failed.
    #[error("write failed: {0}")]
    Write(String),

    /// The handshake did not complete within the configured timeout.
    #[error("connect timeout after {0}s")]
    Timeout(u64),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Configuration JSON could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether this error means the underlying connection is gone.
    ///
    /// Send-time failures for which this returns `true` tear the session
    /// down; everything else is reported to the caller as transient.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            SessionError::NotConnected
            | SessionError::ConnectionLost(_)
            | SessionError::StreamNotWritable => true,
            SessionError::RusshError(err) => matches!(
                err,
                russh::Error::Disconnect
                    | russh::Error::SendError
                    | russh::Error::HUP
                    | russh::Error::IO(_)
            ),
            SessionError::Write(message) => message_indicates_dead_connection(message),
            _ => false,
        }
    }
}

fn message_indicates_dead_connection(message: &str) -> bool {
    let message = message.to_lowercase();
    ["not connected", "closed", "broken pipe", "reset"]
        .iter()
        .any(|cue| message.contains(cue))
}
