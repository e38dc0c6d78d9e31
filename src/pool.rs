//! Core proxy pool implementation.

use crate::config::{ProxyPoolConfig, ReplenishFn};
use crate::error::{ProxyPoolError, Result};
use crate::proxy::{ProxyState, ProxyStatus};
use crate::queue::AvailabilityQueue;
use crate::registry::ProxyRegistry;

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of the pool's composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Proxies registered in the pool.
    pub total: usize,
    /// Proxies that can be handed out right now.
    pub available: usize,
    /// Proxies in a temporary cooldown.
    pub cooling_down: usize,
    /// Banned proxies.
    pub banned: usize,
    /// Proxies past their use or timeout ceiling.
    pub exhausted: usize,
    /// Live handles across all proxies.
    pub outstanding: usize,
    /// Entries in the availability queue.
    pub queued: usize,
}

/// Outcome of one pass over the availability queue.
enum Checkout {
    Leased(String),
    /// The queue ran dry after `generation` replenishment cycles had completed.
    Empty { generation: u64 },
}

#[derive(Debug, Default)]
struct ReplenishState {
    in_progress: bool,
    /// Completed replenishment cycles.
    generation: u64,
}

/// A pool of proxies leased out to concurrent callers.
///
/// Lock order is `registry`, then `queue`, then `replenish_state`. Nothing
/// else is taken while `replenish_state` is held.
pub struct ProxyPool {
    /// Every proxy known to the pool.
    registry: RwLock<ProxyRegistry>,
    /// Proxies in circulation, soonest-available first.
    queue: Mutex<AvailabilityQueue>,
    /// Configuration for the pool.
    config: ProxyPoolConfig,
    replenish_state: Mutex<ReplenishState>,
    /// Signalled whenever a replenishment cycle ends.
    replenish_done: Condvar,
}

/// Clears the in-progress flag and wakes waiters however the callback exits.
struct ReplenishGuard<'a> {
    pool: &'a ProxyPool,
}

impl Drop for ReplenishGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.pool.replenish_state.lock();
        state.in_progress = false;
        state.generation += 1;
        self.pool.replenish_done.notify_all();
    }
}

impl ProxyPool {
    /// Create a new proxy pool holding the given proxies, handed out in order.
    pub fn new<I, S>(proxies: I, config: ProxyPoolConfig) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = ProxyRegistry::default();
        let mut added = Vec::new();
        for url in proxies {
            let url = url.into();
            if registry.add(&url) {
                added.push(url);
            }
        }

        // `put` places a proxy ahead of equal timeouts, so insert back to front.
        let mut queue = AvailabilityQueue::default();
        for url in added.iter().rev() {
            queue.put(url, &registry);
        }

        info!(
            "Proxy pool created with {} proxies (max_uses={}, max_timeouts={}, cooldown_on_use={:?})",
            registry.len(),
            config.max_uses,
            config.max_timeouts,
            config.cooldown_on_use
        );

        Arc::new(Self {
            registry: RwLock::new(registry),
            queue: Mutex::new(queue),
            config,
            replenish_state: Mutex::new(ReplenishState::default()),
            replenish_done: Condvar::new(),
        })
    }

    /// The pool's configuration.
    pub fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    /// Register a proxy and put it into circulation.
    ///
    /// Returns `false` without touching its state if the proxy is already known.
    pub fn add(&self, url: &str) -> bool {
        let mut registry = self.registry.write();
        if !registry.add(url) {
            return false;
        }
        self.queue.lock().put(url, &registry);
        debug!("Proxy {} added to pool", url);
        true
    }

    /// Register several proxies. Returns how many were new.
    pub fn add_many<I, S>(&self, proxies: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        proxies
            .into_iter()
            .filter(|url| self.add(url.as_ref()))
            .count()
    }

    /// Forget a proxy entirely. Handles still holding it keep their lease but
    /// their release becomes a no-op.
    pub fn remove(&self, url: &str) -> Result<()> {
        let mut registry = self.registry.write();
        registry.remove(url)?;
        self.queue.lock().remove(url);
        debug!("Proxy {} removed from pool", url);
        Ok(())
    }

    /// Forget several proxies, stopping at the first unknown one.
    pub fn remove_many<I, S>(&self, proxies: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        proxies
            .into_iter()
            .try_for_each(|url| self.remove(url.as_ref()))
    }

    /// Whether the proxy is registered.
    pub fn contains(&self, url: &str) -> bool {
        self.registry.read().contains(url)
    }

    /// Snapshot of a proxy's bookkeeping.
    pub fn get(&self, url: &str) -> Result<ProxyState> {
        self.registry.read().get(url).cloned()
    }

    /// Current status of a proxy.
    pub fn status(&self, url: &str) -> Result<ProxyStatus> {
        let registry = self.registry.read();
        let state = registry.get(url)?;
        Ok(state.status(self.config.max_timeouts, self.config.max_uses, Instant::now()))
    }

    /// Number of proxies that could be handed out right now.
    pub fn count_available(&self) -> usize {
        let now = Instant::now();
        self.registry
            .read()
            .states()
            .filter(|state| self.is_valid(state, false, now))
            .count()
    }

    /// Get statistics about the proxy pool.
    pub fn stats(&self) -> PoolStats {
        let registry = self.registry.read();
        let queued = self.queue.lock().len();
        let now = Instant::now();

        let mut stats = PoolStats {
            total: registry.len(),
            queued,
            ..PoolStats::default()
        };
        for state in registry.states() {
            stats.outstanding += state.outstanding_count;
            match state.status(self.config.max_timeouts, self.config.max_uses, now) {
                ProxyStatus::Available => stats.available += 1,
                ProxyStatus::CoolingDown => stats.cooling_down += 1,
                ProxyStatus::Banned => stats.banned += 1,
                ProxyStatus::Exhausted => stats.exhausted += 1,
            }
        }
        stats
    }

    /// Whether the proxy may be handed out: not banned, under both ceilings and,
    /// unless `ignore_cooldown` is set, not cooling down.
    pub fn valid_to_give(&self, url: &str, ignore_cooldown: bool) -> Result<bool> {
        let registry = self.registry.read();
        Ok(self.is_valid(registry.get(url)?, ignore_cooldown, Instant::now()))
    }

    /// Whether a handle holding the proxy may use it for a request.
    pub fn valid_to_use(&self, url: &str) -> Result<bool> {
        self.valid_to_give(url, false)
    }

    /// Check out the soonest-available proxy.
    ///
    /// When `previous` is given it is released in the same critical section,
    /// letting a handle swap a stale proxy for a fresh one. It stays leased if
    /// this call fails.
    ///
    /// Blocks while a replenishment cycle is running. If the queue is empty and
    /// a replenishment callback is configured, runs it once and retries once.
    /// The callback must not call `acquire` itself.
    pub fn acquire(&self, previous: Option<&str>) -> Result<String> {
        self.wait_for_replenish();
        let generation = match self.checkout(previous)? {
            Checkout::Leased(url) => return Ok(url),
            Checkout::Empty { generation } => generation,
        };

        let Some(callback) = self.config.replenish.clone() else {
            return Err(ProxyPoolError::NoValidProxies);
        };
        self.replenish(&callback, generation)?;

        self.wait_for_replenish();
        match self.checkout(previous)? {
            Checkout::Leased(url) => Ok(url),
            Checkout::Empty { .. } => Err(ProxyPoolError::NoValidProxies),
        }
    }

    /// Return a leased proxy. It goes back into circulation unless it is banned
    /// or past a ceiling; a proxy still cooling down is re-queued by its expiry.
    pub fn release(&self, url: &str) -> Result<()> {
        let mut registry = self.registry.write();
        let mut queue = self.queue.lock();
        self.release_locked(&mut registry, &mut queue, url)
    }

    /// Record a request made through the proxy, applying `cooldown_on_use`.
    pub fn mark_used(&self, url: &str) -> Result<()> {
        let mut registry = self.registry.write();
        let state = registry.get_mut(url)?;
        state.mark_used(self.config.cooldown_on_use);
        if self.is_retired(state) {
            debug!("Proxy {} exhausted after {} uses", url, state.use_count);
        }
        Ok(())
    }

    /// Take the proxy out of rotation for `duration`.
    pub fn impose_cooldown(&self, url: &str, duration: Duration) -> Result<()> {
        let mut registry = self.registry.write();
        let state = registry.get_mut(url)?;
        state.impose_cooldown(duration);
        debug!(
            "Proxy {} cooling down for {:?} (timeout #{})",
            url, duration, state.timeout_count
        );
        Ok(())
    }

    /// Ban the proxy until [`unban`](Self::unban) is called.
    pub fn ban(&self, url: &str) -> Result<()> {
        let mut registry = self.registry.write();
        registry.get_mut(url)?.banned = true;
        self.queue.lock().remove(url);
        warn!("Proxy {} banned", url);
        Ok(())
    }

    /// Lift a ban, putting an idle proxy back into circulation if it is otherwise eligible.
    pub fn unban(&self, url: &str) -> Result<()> {
        let mut registry = self.registry.write();
        let state = registry.get_mut(url)?;
        state.banned = false;
        // A leased proxy goes back into circulation on release.
        if !self.is_retired(state) && state.outstanding_count == 0 {
            self.queue.lock().put(url, &registry);
        }
        info!("Proxy {} unbanned", url);
        Ok(())
    }

    /// Register `url` if needed and count a lease on it without going through the queue.
    pub(crate) fn claim(&self, url: &str) -> Result<()> {
        let mut registry = self.registry.write();
        if registry.add(url) {
            self.queue.lock().put(url, &registry);
            debug!("Proxy {} added to pool", url);
        }
        registry.get_mut(url)?.outstanding_count += 1;
        Ok(())
    }

    /// Pop the queue until an eligible proxy turns up.
    fn checkout(&self, previous: Option<&str>) -> Result<Checkout> {
        let mut registry = self.registry.write();
        let mut queue = self.queue.lock();
        let now = Instant::now();

        while let Some(url) = queue.pop_front() {
            let Ok(state) = registry.get(&url) else {
                continue;
            };
            if self.is_retired(state) {
                debug!("Dropping retired proxy {} from circulation", url);
                continue;
            }
            if let Some(until) = state.timeout_until.filter(|until| *until > now) {
                queue.put(&url, &registry);
                return Err(ProxyPoolError::ProxiesInCooldown {
                    next_available_at: until,
                });
            }

            if let Some(previous) = previous {
                if let Err(err) = self.release_locked(&mut registry, &mut queue, previous) {
                    debug!("Skipping release of previous proxy: {}", err);
                }
            }

            registry.get_mut(&url)?.outstanding_count += 1;
            return Ok(Checkout::Leased(url));
        }

        // Read while the queue is still locked, so only cycles finishing after
        // this drought was seen count as having replenished it.
        let generation = self.replenish_state.lock().generation;
        Ok(Checkout::Empty { generation })
    }

    fn release_locked(
        &self,
        registry: &mut ProxyRegistry,
        queue: &mut AvailabilityQueue,
        url: &str,
    ) -> Result<()> {
        let state = registry.get_mut(url)?;
        state.outstanding_count = state.outstanding_count.saturating_sub(1);
        if self.is_retired(state) {
            debug!("Proxy {} returned but retired", url);
        } else {
            queue.put(url, registry);
        }
        Ok(())
    }

    /// Wait out any running replenishment.
    fn wait_for_replenish(&self) {
        let mut state = self.replenish_state.lock();
        while state.in_progress {
            self.replenish_done.wait(&mut state);
        }
    }

    /// Run the callback unless another caller already replenished since
    /// `observed` was read.
    fn replenish(&self, callback: &ReplenishFn, observed: u64) -> Result<()> {
        {
            let mut state = self.replenish_state.lock();
            while state.in_progress {
                self.replenish_done.wait(&mut state);
            }
            if state.generation != observed {
                debug!("Pool already replenished by another caller");
                return Ok(());
            }
            state.in_progress = true;
        }
        let _guard = ReplenishGuard { pool: self };

        info!("Proxy pool is empty, replenishing");
        callback(self).map_err(|err| {
            warn!("Proxy replenishment failed: {:#}", err);
            ProxyPoolError::Replenish(err)
        })?;
        info!(
            "Replenishment finished, {} proxies available",
            self.count_available()
        );
        Ok(())
    }

    fn is_retired(&self, state: &ProxyState) -> bool {
        state.banned || state.is_exhausted(self.config.max_timeouts, self.config.max_uses)
    }

    fn is_valid(&self, state: &ProxyState, ignore_cooldown: bool, now: Instant) -> bool {
        !self.is_retired(state) && (ignore_cooldown || !state.is_cooling_down(now))
    }
}
