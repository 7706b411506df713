use russh::Preferred;
use std::borrow::Cow;

use crate::config::{self, SecurityLevel};

/// Algorithm preferences for `level`.
pub(super) fn preferred(level: SecurityLevel) -> Preferred {
    match level {
        SecurityLevel::Secure => Preferred {
            kex: Cow::Borrowed(config::SECURE_KEX_ORDER),
            key: Cow::Borrowed(config::SECURE_KEY_TYPES),
            cipher: Cow::Borrowed(config::SECURE_CIPHERS),
            mac: Cow::Borrowed(config::SECURE_MAC_ALGORITHMS),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        },
        SecurityLevel::Balanced => Preferred {
            kex: Cow::Borrowed(config::BALANCED_KEX_ORDER),
            key: Cow::Borrowed(config::BALANCED_KEY_TYPES),
            cipher: Cow::Borrowed(config::BALANCED_CIPHERS),
            mac: Cow::Borrowed(config::BALANCED_MAC_ALGORITHMS),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        },
        SecurityLevel::LegacyCompatible => Preferred {
            kex: Cow::Borrowed(config::LEGACY_KEX_ORDER),
            key: Cow::Borrowed(config::LEGACY_KEY_TYPES),
            cipher: Cow::Borrowed(config::LEGACY_CIPHERS),
            mac: Cow::Borrowed(config::LEGACY_MAC_ALGORITHMS),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        },
    }
}
