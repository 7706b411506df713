use super::*;
use tokio::sync::mpsc::error::TryRecvError;

/// Why the shell stream stopped producing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum StreamFault {
    Stream(String),
    Transport(String),
    Closed,
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFault::Stream(msg) => write!(f, "shell stream error: {msg}"),
            StreamFault::Transport(msg) => write!(f, "transport error: {msg}"),
            StreamFault::Closed => f.write_str("shell stream closed"),
        }
    }
}

/// Everything one notification made available.
#[derive(Debug, Default)]
pub(super) struct Drained {
    pub data: Vec<u8>,
    pub fault: Option<StreamFault>,
}

/// Coalesces `first` with every event already queued behind it.
///
/// Never waits for more input: it stops as soon as the queue is empty or a
/// fault is reached. Events queued after a fault are left unread.
pub(super) fn drain(first: ShellEvent, events: &mut mpsc::Receiver<ShellEvent>) -> Drained {
    let mut drained = Drained::default();
    let mut next = Some(first);

    while let Some(event) = next.take() {
        match event {
            ShellEvent::Data(bytes) => drained.data.extend_from_slice(&bytes),
            ShellEvent::StreamError(msg) => {
                drained.fault = Some(StreamFault::Stream(msg));
                break;
            }
            ShellEvent::TransportError(msg) => {
                drained.fault = Some(StreamFault::Transport(msg));
                break;
            }
            ShellEvent::Closed => {
                drained.fault = Some(StreamFault::Closed);
                break;
            }
        }
        next = match events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                drained.fault = Some(StreamFault::Closed);
                None
            }
        };
    }

    drained
}

/// UTF-8 decoder that carries incomplete trailing sequences over to the
/// next call, so characters split across reads survive intact.
#[derive(Debug, Default)]
pub(super) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes `bytes`; invalid sequences become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a truncated trailing sequence as U+FFFD once the stream ends.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

impl<T: Transport> Shared<T> {
    /// Reader task body: one iteration per "data available" notification.
    pub(super) async fn run_reader(
        shared: Weak<Shared<T>>,
        epoch: u64,
        mut events: mpsc::Receiver<ShellEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut decoder = Utf8Decoder::default();
        loop {
            let first = tokio::select! {
                biased;
                _ = &mut stop => return,
                event = events.recv() => event,
            };
            let drained = match first {
                Some(event) => drain(event, &mut events),
                None => Drained {
                    data: Vec::new(),
                    fault: Some(StreamFault::Closed),
                },
            };

            let Some(session) = shared.upgrade() else {
                return;
            };
            if !drained.data.is_empty() {
                let text = decoder.decode(&drained.data);
                if !text.is_empty() && !session.deliver(epoch, &text) {
                    return;
                }
            }
            if let Some(fault) = drained.fault {
                let tail = decoder.finish();
                if !tail.is_empty() && !session.deliver(epoch, &tail) {
                    return;
                }
                session.teardown_if_current(epoch, &fault.to_string()).await;
                return;
            }
        }
    }

    /// Segments `text` and hands every chunk to the sink, in order.
    ///
    /// Returns `false` when the session has moved past `epoch`.
    fn deliver(&self, epoch: u64, text: &str) -> bool {
        let live = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        if *live != Some(epoch) {
            return false;
        }
        trace!("[{}] {:?}", self.label(), text);
        for chunk in chunks(text, self.chunk_size) {
            self.sink.on_data_chunk(chunk);
        }
        true
    }
}
