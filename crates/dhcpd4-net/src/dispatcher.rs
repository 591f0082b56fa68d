/*  Timer registration, spec.md §5.
 *
 *  The readiness loop itself (epoll/kqueue over listening sockets) is the
 *  platform's job; what belongs to the core is the timer contract:
 *  `add_timeout` dedupes on its key (re-adding supersedes a pending entry
 *  for the same key), `cancel_timeout` removes it, and firing is one-shot.
 *  Most of the complexity lives in what the caller does when a timer comes
 *  due (the lease state machine's timeout handlers), not in here.
 */
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

pub struct Dispatcher<K, V> {
    pending: HashMap<K, (Instant, V)>,
}

impl<K, V> Default for Dispatcher<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Dispatcher<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Dispatcher {
            pending: HashMap::new(),
        }
    }

    /// Registers `key` to fire at `when`. A prior pending timer for the
    /// same key is silently replaced — this is the dedup contract spec.md
    /// invariant 5 requires.
    pub fn add_timeout(&mut self, when: Instant, key: K, payload: V) {
        self.pending.insert(key, (when, payload));
    }

    /// Removes a pending timer, if any was registered. Returns whether one
    /// was actually cancelled.
    pub fn cancel_timeout(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// The earliest deadline across all pending timers, if any — what the
    /// readiness loop should sleep until.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(when, _)| *when).min()
    }

    /// Removes and returns every timer whose deadline has passed as of
    /// `now`. Firing is one-shot: a fired key must be re-added by the
    /// caller to fire again.
    pub fn poll(&mut self, now: Instant) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, (when, _))| *when <= now)
            .map(|(key, _)| key.clone())
            .collect();
        due.into_iter()
            .map(|key| {
                let (_, payload) = self.pending.remove(&key).expect("key just observed pending");
                (key, payload)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn readd_supersedes_pending_timer() {
        let mut d: Dispatcher<&str, ()> = Dispatcher::new();
        let t0 = Instant::now();
        d.add_timeout(t0 + Duration::from_secs(1), "lease-a", ());
        d.add_timeout(t0 + Duration::from_secs(5), "lease-a", ());
        assert_eq!(d.len(), 1);
        let fired = d.poll(t0 + Duration::from_secs(6));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "lease-a");
    }

    #[test]
    fn cancel_removes_pending_timer() {
        let mut d: Dispatcher<&str, ()> = Dispatcher::new();
        let t0 = Instant::now();
        d.add_timeout(t0 + Duration::from_secs(1), "lease-a", ());
        assert!(d.cancel_timeout(&"lease-a"));
        assert!(d.poll(t0 + Duration::from_secs(2)).is_empty());
    }

    #[test]
    fn poll_only_returns_due_timers() {
        let mut d: Dispatcher<u32, ()> = Dispatcher::new();
        let t0 = Instant::now();
        d.add_timeout(t0 + Duration::from_secs(10), 1, ());
        d.add_timeout(t0 + Duration::from_secs(1), 2, ());
        let fired = d.poll(t0 + Duration::from_secs(2));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 2);
        assert_eq!(d.len(), 1);
    }
}
