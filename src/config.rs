//! Configuration for the proxy pool.

use crate::pool::ProxyPool;
use crate::utils;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked when the pool runs dry. It is expected to call
/// [`ProxyPool::add`] or [`ProxyPool::add_many`]; an error is returned to the
/// caller that triggered the replenishment.
pub type ReplenishFn = Arc<dyn Fn(&ProxyPool) -> anyhow::Result<()> + Send + Sync>;

/// Configuration for the proxy pool.
#[derive(Clone)]
pub struct ProxyPoolConfig {
    /// Cooldowns a proxy may receive before it is retired. 0 means unlimited.
    pub max_timeouts: usize,
    /// Uses a proxy may serve before it is retired. 0 means unlimited.
    pub max_uses: usize,
    /// Cooldown imposed automatically after every use.
    pub cooldown_on_use: Duration,
    /// Source of new proxies when the pool runs dry.
    pub replenish: Option<ReplenishFn>,
    /// Number of times the middleware retries a request with different proxies.
    pub retry_count: usize,
    /// Timeout applied to each proxied request.
    pub request_timeout: Duration,
    /// Cooldown the middleware imposes on a proxy whose request failed.
    pub failure_cooldown: Duration,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        ProxyPoolConfigBuilder::new().build()
    }
}

impl fmt::Debug for ProxyPoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPoolConfig")
            .field("max_timeouts", &self.max_timeouts)
            .field("max_uses", &self.max_uses)
            .field("cooldown_on_use", &self.cooldown_on_use)
            .field("replenish", &self.replenish.is_some())
            .field("retry_count", &self.retry_count)
            .field("request_timeout", &self.request_timeout)
            .field("failure_cooldown", &self.failure_cooldown)
            .finish()
    }
}

/// Builder for `ProxyPoolConfig`.
pub struct ProxyPoolConfigBuilder {
    max_timeouts: Option<usize>,
    max_uses: Option<usize>,
    cooldown_on_use: Option<Duration>,
    replenish: Option<ReplenishFn>,
    retry_count: Option<usize>,
    request_timeout: Option<Duration>,
    failure_cooldown: Option<Duration>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_timeouts: None,
            max_uses: None,
            cooldown_on_use: None,
            replenish: None,
            retry_count: None,
            request_timeout: None,
            failure_cooldown: None,
        }
    }

    /// Set how many cooldowns a proxy may receive before it is retired.
    pub fn max_timeouts(mut self, count: usize) -> Self {
        self.max_timeouts = Some(count);
        self
    }

    /// Set how many uses a proxy may serve before it is retired.
    pub fn max_uses(mut self, count: usize) -> Self {
        self.max_uses = Some(count);
        self
    }

    /// Set the cooldown imposed after every use.
    pub fn cooldown_on_use(mut self, cooldown: Duration) -> Self {
        self.cooldown_on_use = Some(cooldown);
        self
    }

    /// Set the callback used to refill an empty pool.
    pub fn replenish<F>(mut self, replenish: F) -> Self
    where
        F: Fn(&ProxyPool) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.replenish = Some(Arc::new(replenish));
        self
    }

    /// Refill an empty pool from a proxy list file, adding the entries the pool
    /// does not know yet. See [`parse_proxy_list`](crate::parse_proxy_list) for the format.
    pub fn replenish_from_file(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.replenish(move |pool| utils::replenish_from_file(pool, &path))
    }

    /// Set the number of times to retry a request with different proxies.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set the timeout for each proxied request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the cooldown imposed on a proxy after a failed request.
    pub fn failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = Some(cooldown);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            max_timeouts: self.max_timeouts.unwrap_or(0),
            max_uses: self.max_uses.unwrap_or(0),
            cooldown_on_use: self.cooldown_on_use.unwrap_or(Duration::ZERO),
            replenish: self.replenish,
            retry_count: self.retry_count.unwrap_or(3),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(10)),
            failure_cooldown: self.failure_cooldown.unwrap_or(Duration::from_secs(30)),
        }
    }
}

impl Default for ProxyPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
