//! Simple example of using leasing-proxy-pool.

use leasing_proxy_pool::{ProxyPool, ProxyPoolConfig, ProxyPoolMiddleware};
use reqwest_middleware::ClientBuilder;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Initializing proxy pool...");

    let config = ProxyPoolConfig::builder()
        // one proxy per line, `host:port` entries are treated as socks5
        .replenish_from_file("proxies.txt")
        // retire a proxy after three failures
        .max_timeouts(3)
        // give each proxy a breather between requests to avoid bans
        .cooldown_on_use(Duration::from_secs(2))
        .failure_cooldown(Duration::from_secs(60))
        .request_timeout(Duration::from_secs(5))
        .retry_count(2)
        .build();

    let pool = ProxyPool::new(Vec::<String>::new(), config);

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(ProxyPoolMiddleware::new(pool.clone()))
        .build();

    println!("Sending request...");
    let response = client.get("https://httpbin.org/ip").send().await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);
    println!("Pool: {:?}", pool.stats());

    Ok(())
}
