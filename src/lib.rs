//! # leasing-proxy-pool
//!
//! A thread-safe pool of proxies leased out to concurrent callers.
//!
//! The pool tracks cooldowns, bans and usage counts per proxy, hands out the
//! soonest-available valid proxy, and refills itself through a user callback
//! when it runs dry. [`ProxyHandle`] returns its proxy to the pool when dropped,
//! and [`ProxyPoolMiddleware`] plugs the pool into a reqwest client.

pub mod config;
pub mod error;
pub mod handle;
pub mod middleware;
pub mod pool;
pub mod proxy;
mod queue;
mod registry;
mod utils;

pub use config::{ProxyPoolConfig, ProxyPoolConfigBuilder, ReplenishFn};
pub use error::{ProxyPoolError, Result};
pub use handle::ProxyHandle;
pub use middleware::ProxyPoolMiddleware;
pub use pool::{PoolStats, ProxyPool};
pub use proxy::{ProxyState, ProxyStatus};
pub use utils::parse_proxy_list;
