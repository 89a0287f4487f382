use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

/// Default lifetime of a key package: 12 weeks.
pub const DEFAULT_KEY_PACKAGE_LIFETIME_SECONDS: u64 = 60 * 60 * 24 * 7 * 12;

/// Clock skew tolerance. `not_before` is set this far in the past.
pub const DEFAULT_KEY_PACKAGE_LIFETIME_MARGIN_SECONDS: u64 = 60 * 60;

/// The lifetime of a key package in seconds since the UNIX epoch.
///
/// ```c
/// struct {
///     uint64 not_before;
///     uint64 not_after;
/// } Lifetime;
/// ```
#[derive(
    PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct Lifetime {
    not_before: u64,
    not_after: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

impl Lifetime {
    /// Create a new lifetime that is valid for `t` seconds from now.
    pub fn new(t: u64) -> Self {
        let now = now();
        Self {
            not_before: now.saturating_sub(DEFAULT_KEY_PACKAGE_LIFETIME_MARGIN_SECONDS),
            not_after: now.saturating_add(t),
        }
    }

    /// A lifetime with explicit bounds.
    pub fn from_bounds(not_before: u64, not_after: u64) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    /// Returns `true` if the current time lies within the lifetime.
    pub fn is_valid(&self) -> bool {
        let now = now();
        self.not_before <= now && now <= self.not_after
    }

    /// Returns `true` if the lifetime spans no more than `max_lifetime`
    /// seconds, not counting the clock skew margin.
    pub fn has_acceptable_range(&self, max_lifetime: u64) -> bool {
        self.not_after.saturating_sub(self.not_before)
            <= max_lifetime.saturating_add(DEFAULT_KEY_PACKAGE_LIFETIME_MARGIN_SECONDS)
    }

    pub fn not_before(&self) -> u64 {
        self.not_before
    }

    pub fn not_after(&self) -> u64 {
        self.not_after
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Lifetime::new(DEFAULT_KEY_PACKAGE_LIFETIME_SECONDS)
    }
}
