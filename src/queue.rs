//! Availability queue ordered by cooldown expiry.

use crate::registry::ProxyRegistry;

use std::collections::VecDeque;

/// Proxies currently in circulation, soonest-available first.
///
/// Ordering is by each proxy's `timeout_until` as observed when it is `put`.
/// A queued proxy whose cooldown changes afterwards keeps its position until
/// it is `put` again, so "earliest first" is only as fresh as the last `put`.
#[derive(Debug, Default)]
pub(crate) struct AvailabilityQueue {
    urls: VecDeque<String>,
}

impl AvailabilityQueue {
    /// Insert `url`, replacing any existing entry, before the first queued proxy
    /// whose cooldown ends no earlier than its own.
    pub(crate) fn put(&mut self, url: &str, registry: &ProxyRegistry) {
        self.remove(url);

        let timeout_of = |url: &str| registry.get(url).ok().and_then(|s| s.timeout_until);
        let timeout = timeout_of(url);

        let position = self
            .urls
            .iter()
            .position(|queued| timeout <= timeout_of(queued.as_str()))
            .unwrap_or(self.urls.len());
        self.urls.insert(position, url.to_string());
    }

    pub(crate) fn pop_front(&mut self) -> Option<String> {
        self.urls.pop_front()
    }

    /// Remove `url` if queued.
    pub(crate) fn remove(&mut self, url: &str) {
        if let Some(position) = self.urls.iter().position(|queued| queued == url) {
            self.urls.remove(position);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.urls.len()
    }

    #[cfg(test)]
    fn urls(&self) -> Vec<&str> {
        self.urls.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn registry_with(timeouts: &[(&str, Option<u64>)]) -> ProxyRegistry {
        let base = Instant::now();
        let mut registry = ProxyRegistry::default();
        for (url, secs) in timeouts {
            registry.add(url);
            registry.get_mut(url).unwrap().timeout_until =
                secs.map(|s| base + Duration::from_secs(s));
        }
        registry
    }

    #[test]
    fn orders_by_timeout() {
        let registry = registry_with(&[("late", Some(30)), ("never", None), ("soon", Some(5))]);
        let mut queue = AvailabilityQueue::default();
        queue.put("late", &registry);
        queue.put("never", &registry);
        queue.put("soon", &registry);
        assert_eq!(queue.urls(), ["never", "soon", "late"]);
    }

    #[test]
    fn equal_timeouts_go_before_existing() {
        let registry = registry_with(&[("a", None), ("b", None)]);
        let mut queue = AvailabilityQueue::default();
        queue.put("a", &registry);
        queue.put("b", &registry);
        assert_eq!(queue.urls(), ["b", "a"]);
    }

    #[test]
    fn put_is_idempotent() {
        let registry = registry_with(&[("a", Some(1)), ("b", Some(2))]);
        let mut queue = AvailabilityQueue::default();
        queue.put("a", &registry);
        queue.put("b", &registry);
        queue.put("b", &registry);
        queue.put("a", &registry);
        assert_eq!(queue.urls(), ["a", "b"]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn queued_entries_are_not_reordered_until_put() {
        let mut registry = registry_with(&[("a", Some(1)), ("b", Some(2))]);
        let mut queue = AvailabilityQueue::default();
        queue.put("a", &registry);
        queue.put("b", &registry);

        let later = Instant::now() + Duration::from_secs(60);
        registry.get_mut("a").unwrap().timeout_until = Some(later);
        assert_eq!(queue.urls(), ["a", "b"]);

        queue.put("a", &registry);
        assert_eq!(queue.urls(), ["b", "a"]);
    }

    #[test]
    fn pop_and_remove() {
        let registry = registry_with(&[("a", Some(1)), ("b", Some(2)), ("c", Some(3))]);
        let mut queue = AvailabilityQueue::default();
        for url in ["a", "b", "c"] {
            queue.put(url, &registry);
        }
        queue.remove("b");
        queue.remove("missing");
        assert_eq!(queue.pop_front().as_deref(), Some("a"));
        assert_eq!(queue.pop_front().as_deref(), Some("c"));
        assert_eq!(queue.pop_front(), None);
    }
}
