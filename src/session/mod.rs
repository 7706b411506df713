//! Interactive SSH shell session lifecycle.
//!
//! This module owns the connection state machine of a single session: it
//! establishes the transport, opens the one interactive shell stream,
//! drains inbound output into bounded chunks for the embedding application,
//! writes command lines, and tears everything down on any failure.
//!
//! # Main Components
//!
//! - [`Session`] - State machine owning the transport and shell stream
//! - [`EventSink`] - Outbound connection-state and data-chunk interface
//! - [`PasswordPromptResponder`] - Answers keyboard-interactive prompts
//! - [`HostTrustPolicy`] - Decides whether a host key is accepted
//! - [`SimpleSession`] - Narrowed facade for integer-oriented control systems

use log::{debug, info, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};

use crate::config::{Credentials, DEFAULT_LABEL, MAX_CHUNK_SIZE, SessionConfig};
use crate::error::SessionError;
use crate::transport::{
    ShellEvent, ShellStream, ShellWriter, Transport, TransportHandle, TransportOptions,
};

pub use auth::PasswordPromptResponder;
pub use events::{ChannelSink, ConnectionEvent, EventSink, SessionEvent};
pub use facade::SimpleSession;
pub use segment::{Chunks, chunks};
pub use trust::{HostTrustPolicy, KnownHostStore};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and no shell stream exist.
    Disconnected,
    /// A handshake is in flight; nothing is published yet.
    Connecting,
    /// Transport and shell stream are both live.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Successful result of [`Session::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A live connection already existed; nothing was allocated.
    AlreadyConnected,
    /// A new transport and shell stream were established.
    NewlyConnected,
}

/// A managed SSH session with one interactive shell stream.
///
/// Cloning a `Session` yields another reference to the same session.
pub struct Session<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Builder for [`Session`] with non-default trust policy or chunk size.
pub struct SessionBuilder<T: Transport> {
    transport: T,
    sink: Arc<dyn EventSink>,
    trust: HostTrustPolicy,
    chunk_size: usize,
}

struct Shared<T: Transport> {
    transport: T,
    sink: Arc<dyn EventSink>,
    trust: HostTrustPolicy,
    chunk_size: usize,
    label: StdRwLock<String>,
    trace: AtomicBool,

    /// Woken when a disconnect interrupts an in-flight connect.
    cancel: Notify,

    /// Epoch whose reader may deliver chunks; `None` once teardown begins.
    delivery: StdMutex<Option<u64>>,

    inner: Mutex<SessionInner<T>>,
}

/// State and handles, always locked together.
struct SessionInner<T: Transport> {
    config: Option<SessionConfig>,
    credentials: Option<Credentials>,
    state: ConnectionState,

    /// Bumped on every connect attempt and every teardown.
    epoch: u64,

    transport: Option<T::Handle>,
    stream: Option<ShellHandle<WriterOf<T>>>,
}

type WriterOf<T> = <<T as Transport>::Handle as TransportHandle>::Writer;

/// Write half of the shell stream plus the stop signal of its reader task.
struct ShellHandle<W> {
    writer: W,
    stop: Option<oneshot::Sender<()>>,
}

impl<W> ShellHandle<W> {
    fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

mod auth;
mod client;
mod events;
mod facade;
mod reader;
mod segment;
mod trust;
