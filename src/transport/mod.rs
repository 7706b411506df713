//! SSH transport seam.
//!
//! The session engine never speaks the SSH wire protocol itself. It drives a
//! [`Transport`] that performs the handshake and authentication, and a
//! [`TransportHandle`] that opens the single interactive shell stream. The
//! production implementation is [`RusshTransport`]; tests plug in in-memory
//! transports through the same traits.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{Credentials, SecurityLevel, TerminalSize};
use crate::error::SessionError;
use crate::session::{HostTrustPolicy, PasswordPromptResponder};

pub use ssh::{RusshHandle, RusshTransport, RusshWriter};

/// Notification produced by a live shell stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// Terminal output became available.
    Data(Vec<u8>),
    /// The shell channel reported an error.
    StreamError(String),
    /// The underlying connection reported an error.
    TransportError(String),
    /// The remote side closed the shell.
    Closed,
}

/// An opened interactive shell: its write half and its notification queue.
pub struct ShellStream<W> {
    pub writer: W,
    pub events: mpsc::Receiver<ShellEvent>,
}

/// Everything a transport needs besides the credentials.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Answers keyboard-interactive prompts.
    pub responder: PasswordPromptResponder,
    /// Decides whether the presented host key is accepted.
    pub trust: HostTrustPolicy,
    pub security_level: SecurityLevel,
    pub timeout: Duration,
    /// Diagnostic label of the owning session.
    pub label: String,
}

/// Establishes authenticated connections.
pub trait Transport: Send + Sync + 'static {
    type Handle: TransportHandle;

    /// Performs the handshake, host key check and authentication.
    fn connect(
        &self,
        credentials: &Credentials,
        options: &TransportOptions,
    ) -> impl Future<Output = Result<Self::Handle, SessionError>> + Send;
}

/// An authenticated connection owned by exactly one session.
pub trait TransportHandle: Send + 'static {
    type Writer: ShellWriter;

    fn is_connected(&self) -> bool;

    /// Requests a PTY and an interactive shell on a new channel.
    fn open_shell(
        &mut self,
        terminal: &TerminalSize,
    ) -> impl Future<Output = Result<ShellStream<Self::Writer>, SessionError>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Write half of a shell stream.
pub trait ShellWriter: Send + 'static {
    fn can_write(&self) -> bool;

    fn write(&mut self, data: Vec<u8>) -> impl Future<Output = Result<(), SessionError>> + Send;
}

mod ssh;
mod security;
