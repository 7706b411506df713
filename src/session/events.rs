use super::*;

/// Receives connection-state transitions and inbound data from a session.
///
/// Methods are called synchronously from the session's I/O path and must
/// not block. Chunks arrive in production order and are each at most the
/// session's chunk size.
pub trait EventSink: Send + Sync {
    /// `true` once the session is connected, `false` once it is torn down.
    fn on_connection_state(&self, connected: bool);

    /// One bounded slice of shell output.
    fn on_data_chunk(&self, chunk: &str);

    /// Result of validating a configuration passed to `initialize`.
    fn on_initialized(&self, _ok: bool) {}
}

/// A connection-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// Everything a [`ChannelSink`] forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Initialized(bool),
    Connection(ConnectionEvent),
    Data(String),
}

/// Event sink that forwards into an unbounded channel.
///
/// Sending never blocks, so a slow consumer cannot stall the session's
/// reader. Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event receiver dropped, discarding event");
        }
    }
}

impl EventSink for ChannelSink {
    fn on_connection_state(&self, connected: bool) {
        let event = if connected {
            ConnectionEvent::Connected
        } else {
            ConnectionEvent::Disconnected
        };
        self.forward(SessionEvent::Connection(event));
    }

    fn on_data_chunk(&self, chunk: &str) {
        self.forward(SessionEvent::Data(chunk.to_string()));
    }

    fn on_initialized(&self, ok: bool) {
        self.forward(SessionEvent::Initialized(ok));
    }
}
