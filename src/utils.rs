//! Utility functions for the proxy pool.

use crate::pool::ProxyPool;

use anyhow::Context;
use log::info;
use std::path::Path;

/// Read a proxy list file and add the proxies the pool does not know yet.
pub(crate) fn replenish_from_file(pool: &ProxyPool, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read proxy list {}", path.display()))?;

    let fresh: Vec<String> = parse_proxy_list(&content)
        .into_iter()
        .filter(|url| !pool.contains(url))
        .collect();
    info!("Replenishing {} proxies from {}", fresh.len(), path.display());
    pool.add_many(fresh);
    Ok(())
}

/// Parse a plain-text proxy list, one proxy per line.
///
/// Blank lines and `#` comments are skipped. Lines carrying a scheme are kept
/// as-is and bare `host:port` entries are assumed to be SOCKS5.
pub fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else if line.contains("://") {
                Some(line.to_string())
            } else if line.contains(':') {
                Some(format!("socks5://{}", line))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyPoolConfig;

    #[test]
    fn parses_mixed_list() {
        let content = "\
# free list
socks5://1.2.3.4:1080
  5.6.7.8:9050

http://proxy.local:3128
garbage
";
        assert_eq!(
            parse_proxy_list(content),
            [
                "socks5://1.2.3.4:1080",
                "socks5://5.6.7.8:9050",
                "http://proxy.local:3128",
            ]
        );
    }

    #[test]
    fn file_replenish_skips_known_proxies() {
        let path = std::env::temp_dir().join(format!("proxy-list-{}.txt", std::process::id()));
        std::fs::write(&path, "1.1.1.1:1080\n2.2.2.2:1080\n").unwrap();

        let pool = ProxyPool::new(["socks5://1.1.1.1:1080"], ProxyPoolConfig::default());
        replenish_from_file(&pool, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(pool.contains("socks5://2.2.2.2:1080"));
        assert_eq!(pool.stats().total, 2);
    }

    #[test]
    fn missing_file_is_an_error() {
        let pool = ProxyPool::new(Vec::<String>::new(), ProxyPoolConfig::default());
        let err = replenish_from_file(&pool, Path::new("/nonexistent/proxies.txt")).unwrap_err();
        assert!(err.to_string().contains("failed to read proxy list"));
    }
}
