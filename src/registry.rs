//! Identifier to state mapping.

use crate::error::{ProxyPoolError, Result};
use crate::proxy::ProxyState;

use std::collections::HashMap;

/// The authoritative set of proxies known to a pool.
///
/// No locking of its own: [`ProxyPool`](crate::ProxyPool) serialises access.
#[derive(Debug, Default)]
pub(crate) struct ProxyRegistry {
    proxies: HashMap<String, ProxyState>,
}

impl ProxyRegistry {
    /// Register a proxy with fresh state. Returns `false` and leaves the
    /// existing state untouched when the proxy is already known.
    pub(crate) fn add(&mut self, url: &str) -> bool {
        if self.proxies.contains_key(url) {
            return false;
        }
        self.proxies.insert(url.to_string(), ProxyState::new(url));
        true
    }

    pub(crate) fn remove(&mut self, url: &str) -> Result<ProxyState> {
        self.proxies
            .remove(url)
            .ok_or_else(|| ProxyPoolError::UnknownProxy(url.to_string()))
    }

    pub(crate) fn get(&self, url: &str) -> Result<&ProxyState> {
        self.proxies
            .get(url)
            .ok_or_else(|| ProxyPoolError::UnknownProxy(url.to_string()))
    }

    pub(crate) fn get_mut(&mut self, url: &str) -> Result<&mut ProxyState> {
        self.proxies
            .get_mut(url)
            .ok_or_else(|| ProxyPoolError::UnknownProxy(url.to_string()))
    }

    pub(crate) fn contains(&self, url: &str) -> bool {
        self.proxies.contains_key(url)
    }

    pub(crate) fn len(&self) -> usize {
        self.proxies.len()
    }

    pub(crate) fn states(&self) -> impl Iterator<Item = &ProxyState> {
        self.proxies.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_set_tracks_adds_and_removes() {
        let mut registry = ProxyRegistry::default();
        for url in ["a", "b", "c", "d"] {
            assert!(registry.add(url));
        }
        registry.remove("b").unwrap();
        registry.remove("d").unwrap();
        assert!(registry.add("e"));

        let keys: HashSet<&str> = registry.states().map(|s| s.url.as_str()).collect();
        assert_eq!(keys, HashSet::from(["a", "c", "e"]));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn unknown_lookups_fail() {
        let mut registry = ProxyRegistry::default();
        assert!(matches!(registry.get("x"), Err(ProxyPoolError::UnknownProxy(u)) if u == "x"));
        assert!(matches!(registry.get_mut("x"), Err(ProxyPoolError::UnknownProxy(_))));
        assert!(matches!(registry.remove("x"), Err(ProxyPoolError::UnknownProxy(_))));
    }

    #[test]
    fn re_adding_keeps_state() {
        let mut registry = ProxyRegistry::default();
        registry.add("a");
        registry.get_mut("a").unwrap().use_count = 7;
        assert!(!registry.add("a"));
        assert_eq!(registry.get("a").unwrap().use_count, 7);
    }
}
