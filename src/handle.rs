//! Scoped lease on a pooled proxy.

use crate::error::Result;
use crate::pool::ProxyPool;

use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// A lease on one proxy from a [`ProxyPool`].
///
/// The proxy is returned to the pool when the handle is dropped or
/// [`release`](Self::release)d, including on early returns and unwinding.
pub struct ProxyHandle {
    pool: Arc<ProxyPool>,
    /// `None` only once the lease has been given back.
    url: Option<String>,
}

impl ProxyHandle {
    /// Lease the proxy the pool picks.
    pub fn acquire(pool: &Arc<ProxyPool>) -> Result<Self> {
        let url = pool.acquire(None)?;
        Ok(Self {
            pool: Arc::clone(pool),
            url: Some(url),
        })
    }

    /// Lease a specific proxy, registering it first if the pool does not know it.
    pub fn for_proxy(pool: &Arc<ProxyPool>, url: &str) -> Result<Self> {
        pool.claim(url)?;
        Ok(Self {
            pool: Arc::clone(pool),
            url: Some(url.to_string()),
        })
    }

    /// The currently held proxy.
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    /// Record a request through the held proxy and return it.
    ///
    /// If the held proxy is banned, exhausted, cooling down or no longer
    /// registered, it is first swapped for a fresh one. When no replacement is
    /// available the error is returned and the old proxy stays leased.
    pub fn use_proxy(&mut self) -> Result<&str> {
        let current = self.url().to_string();
        if !self.pool.valid_to_use(&current).unwrap_or(false) {
            let fresh = self.pool.acquire(Some(&current))?;
            debug!("Swapped proxy {} for {}", current, fresh);
            self.url = Some(fresh);
        }
        self.pool.mark_used(self.url())?;
        Ok(self.url())
    }

    /// Put the held proxy in cooldown.
    pub fn mark_cooldown(&self, duration: Duration) -> Result<()> {
        self.pool.impose_cooldown(self.url(), duration)
    }

    /// Ban the held proxy.
    pub fn ban(&self) -> Result<()> {
        self.pool.ban(self.url())
    }

    /// Return the proxy to the pool now.
    pub fn release(mut self) -> Result<()> {
        match self.url.take() {
            Some(url) => self.pool.release(&url),
            None => Ok(()),
        }
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if let Some(url) = self.url.take() {
            if let Err(err) = self.pool.release(&url) {
                debug!("Dropped handle could not return {}: {}", url, err);
            }
        }
    }
}

impl std::fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandle").field("url", &self.url).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyPoolConfig;
    use crate::error::ProxyPoolError;

    #[test]
    fn drop_returns_proxy() {
        let pool = ProxyPool::new(["a"], ProxyPoolConfig::default());
        {
            let handle = ProxyHandle::acquire(&pool).unwrap();
            assert_eq!(handle.url(), "a");
            assert_eq!(pool.stats().queued, 0);
        }
        assert_eq!(pool.stats().queued, 1);
        assert_eq!(pool.get("a").unwrap().outstanding_count, 0);
    }

    #[test]
    fn explicit_release_happens_once() {
        let pool = ProxyPool::new(["a"], ProxyPoolConfig::default());
        let handle = ProxyHandle::acquire(&pool).unwrap();
        handle.release().unwrap();
        assert_eq!(pool.get("a").unwrap().outstanding_count, 0);
        assert_eq!(pool.stats().queued, 1);
    }

    #[test]
    fn use_swaps_exhausted_proxy() {
        let pool = ProxyPool::new(["a", "b"], ProxyPoolConfig::builder().max_uses(1).build());
        let mut handle = ProxyHandle::acquire(&pool).unwrap();
        assert_eq!(handle.use_proxy().unwrap(), "a");
        assert_eq!(handle.use_proxy().unwrap(), "b");

        let a = pool.get("a").unwrap();
        assert_eq!((a.use_count, a.outstanding_count), (1, 0));
        drop(handle);
        assert_eq!(pool.get("b").unwrap().outstanding_count, 0);
        assert_eq!(pool.count_available(), 0);
    }

    #[test]
    fn failed_swap_keeps_lease() {
        let pool = ProxyPool::new(["a"], ProxyPoolConfig::default());
        let mut handle = ProxyHandle::acquire(&pool).unwrap();
        handle.ban().unwrap();
        assert!(matches!(handle.use_proxy(), Err(ProxyPoolError::NoValidProxies)));
        assert_eq!(handle.url(), "a");
        assert_eq!(pool.get("a").unwrap().outstanding_count, 1);
        drop(handle);
        assert_eq!(pool.get("a").unwrap().outstanding_count, 0);
    }

    #[test]
    fn cooldown_via_handle() {
        let pool = ProxyPool::new(["a", "b"], ProxyPoolConfig::default());
        let mut handle = ProxyHandle::acquire(&pool).unwrap();
        handle.mark_cooldown(Duration::from_secs(60)).unwrap();
        assert_eq!(handle.use_proxy().unwrap(), "b");
        assert_eq!(pool.get("a").unwrap().timeout_count, 1);
    }

    #[test]
    fn specific_proxy_is_registered() {
        let pool = ProxyPool::new(Vec::<String>::new(), ProxyPoolConfig::default());
        let handle = ProxyHandle::for_proxy(&pool, "socks5://9.9.9.9:1080").unwrap();
        assert!(pool.contains("socks5://9.9.9.9:1080"));
        assert_eq!(pool.get(handle.url()).unwrap().outstanding_count, 1);
        drop(handle);
        assert_eq!(pool.get("socks5://9.9.9.9:1080").unwrap().outstanding_count, 0);
    }

    #[test]
    fn handle_survives_removed_proxy() {
        let pool = ProxyPool::new(["a", "b"], ProxyPoolConfig::default());
        let mut handle = ProxyHandle::acquire(&pool).unwrap();
        pool.remove("a").unwrap();
        assert_eq!(handle.use_proxy().unwrap(), "b");
        drop(handle);
        assert_eq!(pool.stats().outstanding, 0);
    }
}
