use super::*;
use std::collections::HashMap;

/// In-memory store of host key fingerprints learned on first use.
///
/// Clones share the same entries, so one store can back several sessions.
#[derive(Debug, Clone, Default)]
pub struct KnownHostStore {
    entries: Arc<StdMutex<HashMap<String, String>>>,
}

impl KnownHostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup key for `host:port`, OpenSSH style.
    fn make_key(host: &str, port: u16) -> String {
        let host = host.to_lowercase();
        if port == 22 {
            host
        } else {
            format!("[{}]:{}", host, port)
        }
    }

    /// Remembers `fingerprint` for `host:port`, replacing any previous entry.
    pub fn insert(&self, host: &str, port: u16, fingerprint: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(Self::make_key(host, port), fingerprint.into());
    }

    pub fn get(&self, host: &str, port: u16) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&Self::make_key(host, port)).cloned()
    }

    pub fn remove(&self, host: &str, port: u16) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&Self::make_key(host, port))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decides whether a host identity presented during the handshake is trusted.
///
/// [`HostTrustPolicy::AcceptAll`] is the default and disables host
/// verification entirely: any machine answering on the target address,
/// including a man in the middle, is accepted. It exists for closed control
/// networks; use [`HostTrustPolicy::TrustOnFirstUse`] or
/// [`HostTrustPolicy::Fingerprint`] anywhere else.
#[derive(Debug, Clone, Default)]
pub enum HostTrustPolicy {
    /// Trust every host key without checking.
    #[default]
    AcceptAll,
    /// Trust the first key seen per host, then require the same key.
    TrustOnFirstUse(KnownHostStore),
    /// Require exactly this fingerprint (`SHA256:...`).
    Fingerprint(String),
}

impl HostTrustPolicy {
    /// Evaluates the presented key's `fingerprint` for `host:port`.
    pub fn evaluate(&self, host: &str, port: u16, fingerprint: &str) -> bool {
        match self {
            HostTrustPolicy::AcceptAll => {
                warn!(
                    "Host key verification disabled, trusting {}:{} ({})",
                    host, port, fingerprint
                );
                true
            }
            HostTrustPolicy::TrustOnFirstUse(store) => match store.get(host, port) {
                Some(known) if known == fingerprint => {
                    debug!("Host key verified for {}:{}", host, port);
                    true
                }
                Some(known) => {
                    warn!(
                        "HOST KEY CHANGED for {}:{}! Expected {}, got {}",
                        host, port, known, fingerprint
                    );
                    false
                }
                None => {
                    debug!(
                        "Trusting first host key for {}:{} ({})",
                        host, port, fingerprint
                    );
                    store.insert(host, port, fingerprint);
                    true
                }
            },
            HostTrustPolicy::Fingerprint(expected) => {
                let trusted = expected == fingerprint;
                if !trusted {
                    warn!(
                        "Host key mismatch for {}:{}: expected {}, got {}",
                        host, port, expected, fingerprint
                    );
                }
                trusted
            }
        }
    }
}
