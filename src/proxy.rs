//! Per-proxy bookkeeping and status.

use std::time::{Duration, Instant};

/// Status of a proxy as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    /// The proxy can be handed out right now.
    Available,
    /// The proxy is in a temporary cooldown.
    CoolingDown,
    /// The proxy has been banned and stays out until unbanned.
    Banned,
    /// The proxy reached its use or timeout ceiling.
    Exhausted,
}

/// Bookkeeping for one proxy known to the pool.
///
/// A `ProxyState` has no synchronisation of its own. The pool only mutates it
/// while holding its registry write lock; callers get cloned snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyState {
    /// The proxy identifier (e.g. "socks5://127.0.0.1:1080").
    pub url: String,
    /// End of the current cooldown, if one was ever imposed.
    pub timeout_until: Option<Instant>,
    /// Whether the proxy is banned.
    pub banned: bool,
    /// Number of live handles currently holding this proxy.
    pub outstanding_count: usize,
    /// Number of cooldowns imposed so far.
    pub timeout_count: usize,
    /// Number of requests made through this proxy.
    pub use_count: usize,
}

impl ProxyState {
    /// Create fresh bookkeeping for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_until: None,
            banned: false,
            outstanding_count: 0,
            timeout_count: 0,
            use_count: 0,
        }
    }

    /// Whether the proxy is cooling down at `now`.
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        self.timeout_until.is_some_and(|until| until > now)
    }

    /// Whether either ceiling has been reached. A ceiling of 0 means unlimited.
    pub fn is_exhausted(&self, max_timeouts: usize, max_uses: usize) -> bool {
        (max_timeouts > 0 && self.timeout_count >= max_timeouts)
            || (max_uses > 0 && self.use_count >= max_uses)
    }

    pub(crate) fn impose_cooldown(&mut self, duration: Duration) {
        self.timeout_until = Some(Instant::now() + duration);
        self.timeout_count += 1;
    }

    pub(crate) fn mark_used(&mut self, cooldown_on_use: Duration) {
        self.use_count += 1;
        if !cooldown_on_use.is_zero() {
            self.impose_cooldown(cooldown_on_use);
        }
    }

    /// Compute the status under the given ceilings.
    ///
    /// Bans take precedence over exhaustion, which takes precedence over cooldown.
    pub fn status(&self, max_timeouts: usize, max_uses: usize, now: Instant) -> ProxyStatus {
        if self.banned {
            ProxyStatus::Banned
        } else if self.is_exhausted(max_timeouts, max_uses) {
            ProxyStatus::Exhausted
        } else if self.is_cooling_down(now) {
            ProxyStatus::CoolingDown
        } else {
            ProxyStatus::Available
        }
    }
}
