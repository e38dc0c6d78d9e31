//! Middleware implementation for reqwest.

use crate::error::ProxyPoolError;
use crate::handle::ProxyHandle;
use crate::pool::ProxyPool;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

type Lease = std::result::Result<(ProxyHandle, String), ProxyPoolError>;

/// Middleware that sends each request through a proxy leased from a pool.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    /// The proxy pool.
    pool: Arc<ProxyPool>,
}

impl ProxyPoolMiddleware {
    /// Create a middleware drawing proxies from `pool`.
    pub fn new(pool: Arc<ProxyPool>) -> Self {
        let stats = pool.stats();
        info!(
            "Proxy pool middleware using {}/{} available proxies",
            stats.available, stats.total
        );
        if stats.available == 0 {
            warn!("No proxies currently available in pool");
        }
        Self { pool }
    }

    /// The pool backing this middleware.
    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Lease a proxy and record a use on it. Runs on a blocking thread since
    /// acquiring may wait for replenishment.
    async fn lease(&self) -> Result<Lease> {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || -> Lease {
            let mut handle = ProxyHandle::acquire(&pool)?;
            let url = handle.use_proxy()?.to_string();
            Ok((handle, url))
        })
        .await
        .map_err(|e| Error::Middleware(anyhow!("proxy lease task failed: {}", e)))
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let config = self.pool.config();
        let max_retries = config.retry_count;
        let mut retry_count = 0;

        loop {
            let (handle, proxy_url) = match self.lease().await? {
                Ok(leased) => leased,
                Err(ProxyPoolError::ProxiesInCooldown { next_available_at }) => {
                    retry_count += 1;
                    if retry_count > max_retries {
                        let err = ProxyPoolError::ProxiesInCooldown { next_available_at };
                        return Err(Error::Middleware(anyhow!(err)));
                    }
                    info!(
                        "All proxies cooling down, waiting before attempt {}",
                        retry_count + 1
                    );
                    tokio::time::sleep_until(next_available_at.into()).await;
                    continue;
                }
                Err(e) => {
                    let stats = self.pool.stats();
                    warn!(
                        "No proxy available ({}). Total: {}, Available: {}",
                        e, stats.total, stats.available
                    );
                    return Err(Error::Middleware(anyhow!(e)));
                }
            };

            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                        .to_string()
                ))
            })?;

            info!("Using proxy: {} (attempt {})", proxy_url, retry_count + 1);

            let client = match reqwest::Proxy::all(&proxy_url).and_then(|proxy| {
                reqwest::Client::builder()
                    .proxy(proxy)
                    .timeout(config.request_timeout)
                    .build()
            }) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to build client with proxy {}: {}", proxy_url, e);
                    // An unparseable proxy will never work.
                    if let Err(err) = handle.ban() {
                        debug!("Could not ban {}: {}", proxy_url, err);
                    }
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(e));
                    }
                    continue;
                }
            };

            match client.execute(proxied_request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        proxy_url,
                        retry_count + 1,
                        err
                    );
                    if !config.failure_cooldown.is_zero() {
                        if let Err(err) = handle.mark_cooldown(config.failure_cooldown) {
                            debug!("Could not cool down {}: {}", proxy_url, err);
                        }
                    }

                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(err));
                    }
                    // Loop will continue with another lease
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyPoolConfig;
    use reqwest_middleware::ClientBuilder;

    #[tokio::test]
    async fn empty_pool_fails_without_network() {
        let pool = ProxyPool::new(Vec::<String>::new(), ProxyPoolConfig::default());
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(ProxyPoolMiddleware::new(pool))
            .build();

        let err = client.get("http://127.0.0.1:9/").send().await.unwrap_err();
        assert!(matches!(err, Error::Middleware(_)));
        assert!(err.to_string().contains("No valid proxies"));
    }

    #[tokio::test]
    async fn cooling_pool_gives_up_after_retries() {
        let config = ProxyPoolConfig::builder().retry_count(0).build();
        let pool = ProxyPool::new(["socks5://127.0.0.1:1"], config);
        pool.impose_cooldown("socks5://127.0.0.1:1", std::time::Duration::from_secs(60))
            .unwrap();
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(ProxyPoolMiddleware::new(Arc::clone(&pool)))
            .build();

        let err = client.get("http://127.0.0.1:9/").send().await.unwrap_err();
        assert!(err.to_string().contains("cooling down"));
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[tokio::test]
    async fn unparseable_proxy_is_banned_and_skipped() {
        let config = ProxyPoolConfig::builder().retry_count(1).build();
        let pool = ProxyPool::new(["not a proxy"], config);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(ProxyPoolMiddleware::new(Arc::clone(&pool)))
            .build();

        let err = client.get("http://127.0.0.1:9/").send().await.unwrap_err();
        assert!(err.to_string().contains("No valid proxies"));
        assert_eq!(pool.status("not a proxy").unwrap(), crate::ProxyStatus::Banned);
        assert_eq!(pool.stats().outstanding, 0);
    }
}
