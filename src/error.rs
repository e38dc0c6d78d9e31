//! Error types for the leasing-proxy-pool crate.

use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors returned by [`ProxyPool`](crate::ProxyPool) and [`ProxyHandle`](crate::ProxyHandle).
#[derive(Debug, Error)]
pub enum ProxyPoolError {
    /// The identifier is not registered in the pool.
    #[error("Unknown proxy: {0}")]
    UnknownProxy(String),

    /// The best candidate is still cooling down.
    ///
    /// Every other queued proxy becomes available no earlier than
    /// `next_available_at`, so retrying before then is pointless.
    #[error("All proxies are cooling down, next one available in {:?}", .next_available_at.saturating_duration_since(Instant::now()))]
    ProxiesInCooldown {
        /// When the front of the availability queue leaves cooldown.
        next_available_at: Instant,
    },

    /// The pool is empty and replenishment did not produce a candidate.
    #[error("No valid proxies available")]
    NoValidProxies,

    /// The replenishment callback failed.
    #[error(transparent)]
    Replenish(anyhow::Error),
}

impl ProxyPoolError {
    /// How long to wait before retrying, for [`ProxyPoolError::ProxiesInCooldown`].
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ProxiesInCooldown { next_available_at } => {
                Some(next_available_at.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProxyPoolError>;
