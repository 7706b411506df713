//! Session configuration and SSH algorithm tables.
//!
//! [`SessionConfig`] is what an embedding application supplies before the
//! first connect. Validating it yields immutable [`Credentials`], which the
//! session keeps for its whole lifetime, including reconnects triggered by
//! sends. The algorithm tables at the bottom feed the transport's
//! `Preferred` lists for each [`SecurityLevel`].

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::SessionError;

/// Maximum number of characters delivered in a single inbound chunk.
pub const MAX_CHUNK_SIZE: usize = 250;

/// Label used in diagnostics when the configuration does not name the session.
pub const DEFAULT_LABEL: &str = "SshSession";

/// Security level used for SSH algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SecurityLevel {
    /// Strict modern algorithms (default).
    #[default]
    Secure,
    /// Good security with broader compatibility.
    Balanced,
    /// Maximum compatibility with legacy devices.
    LegacyCompatible,
}

/// PTY geometry requested when the shell stream is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TerminalSize {
    /// Terminal type announced to the server.
    pub term: String,
    pub columns: u32,
    pub rows: u32,
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            term: "terminal".to_string(),
            columns: 80,
            rows: 24,
            width_px: 800,
            height_px: 600,
        }
    }
}

/// Configuration supplied by the embedding application.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionConfig {
    /// Target host name or address
    pub host: String,

    /// Target SSH port - defaults to 22
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user name
    pub username: String,

    /// Password, also used to answer keyboard-interactive password prompts
    pub secret: String,

    /// Human-readable name prefixed to every diagnostic line
    #[serde(default)]
    pub label: Option<String>,

    /// Raise lifecycle diagnostics from debug to info level
    #[serde(default)]
    pub trace: bool,

    /// Reconnect once with the stored credentials when sending while disconnected
    #[serde(default = "default_true")]
    pub reconnect_on_send: bool,

    /// Appended to every command line written to the shell
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,

    /// Handshake plus authentication timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// SSH algorithm policy
    #[serde(default)]
    pub security_level: SecurityLevel,

    /// PTY geometry for the interactive shell
    #[serde(default)]
    pub terminal: TerminalSize,
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

impl SessionConfig {
    /// Creates a configuration with default options for the given target.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            secret: secret.into(),
            label: None,
            trace: false,
            reconnect_on_send: true,
            line_terminator: default_line_terminator(),
            connect_timeout_secs: default_connect_timeout(),
            security_level: SecurityLevel::default(),
            terminal: TerminalSize::default(),
        }
    }

    /// Sets the diagnostic label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Enables or disables trace-level diagnostics.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates the configuration and freezes it into [`Credentials`].
    pub fn validate(&self) -> Result<Credentials, SessionError> {
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidConfig("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(SessionError::InvalidConfig("port must be 1-65535".to_string()));
        }
        if self.username.is_empty() {
            return Err(SessionError::InvalidConfig("username is empty".to_string()));
        }
        if self.secret.is_empty() {
            return Err(SessionError::InvalidConfig("secret is empty".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(SessionError::InvalidConfig(
                "connect timeout must be positive".to_string(),
            ));
        }

        Ok(Credentials {
            host: self.host.trim().to_string(),
            port: self.port,
            username: self.username.clone(),
            secret_hash: Credentials::calculate_secret_hash(&self.secret),
            secret: self.secret.clone(),
        })
    }

    /// Effective diagnostic label.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_LABEL)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("label", &self.label)
            .field("trace", &self.trace)
            .field("reconnect_on_send", &self.reconnect_on_send)
            .field("line_terminator", &self.line_terminator)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("security_level", &self.security_level)
            .field("terminal", &self.terminal)
            .finish()
    }
}

/// Validated, immutable connection target and secret.
#[derive(Clone)]
pub struct Credentials {
    host: String,
    port: u16,
    username: String,
    secret: String,

    /// SHA-256 hash of the secret. [`Credentials::matches`] compares these
    /// fixed-size digests, so the plaintext is only ever read by the
    /// transport when it authenticates.
    secret_hash: [u8; 32],
}

impl Credentials {
    fn calculate_secret_hash(secret: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().into()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// `user@host:port`, used in diagnostics.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// Checks whether `other` describes the same target with the same secret.
    pub fn matches(&self, other: &Credentials) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && self.secret_hash == other.secret_hash
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Modern key exchange algorithms.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::EXTENSION_SUPPORT_AS_CLIENT,
    kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
];

/// Modern key exchange plus SHA-1 group exchange for older servers.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA1,
    kex::EXTENSION_SUPPORT_AS_CLIENT,
    kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
];

/// Every key exchange algorithm russh can speak.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::NONE,
];

pub const SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub const BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_128_CBC,
];

/// Includes CBC and unencrypted ciphers for legacy devices.
pub const LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CLEAR,
    cipher::NONE,
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::NONE,
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] =
    &[compression::NONE, compression::ZLIB, compression::ZLIB_LEGACY];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

/// Includes DSA and SHA-1 RSA for legacy devices.
pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::SkEcdsaSha2NistP256,
    Algorithm::SkEd25519,
];
