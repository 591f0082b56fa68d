/*  Per-class lease billing, spec.md §3/§4.4 step 6. A class with a
 *  `lease limit N` holds at most N concurrently active leases; billed
 *  clients are tracked in a small fixed-capacity ring so eviction (the
 *  oldest billed client is dropped to make room) is O(1) and doesn't
 *  need a full scan of the lease table, the same tradeoff
 *  `original_source/`'s class billing array makes.
 */
use crate::config::model::ClassHandle;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Ring {
    capacity: usize,
    entries: Vec<Vec<u8>>,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Ring { capacity, entries: Vec::with_capacity(capacity) }
    }

    fn contains(&self, client_id: &[u8]) -> bool {
        self.entries.iter().any(|e| e == client_id)
    }

    fn try_bill(&mut self, client_id: &[u8]) -> bool {
        if self.contains(client_id) {
            return true;
        }
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push(client_id.to_vec());
        true
    }

    fn unbill(&mut self, client_id: &[u8]) {
        self.entries.retain(|e| e != client_id);
    }
}

#[derive(Debug, Clone, Default)]
pub struct BillingTable {
    rings: HashMap<ClassHandle, Ring>,
}

impl BillingTable {
    pub fn new() -> Self {
        BillingTable::default()
    }

    pub fn set_limit(&mut self, class: ClassHandle, limit: u32) {
        self.rings.insert(class, Ring::new(limit as usize));
    }

    /// Attempts to bill `client_id` against `class`'s limit. Returns
    /// `true` if the client is within budget (already billed, or the
    /// ring had room); `false` means the allocation engine must refuse
    /// this pool for the client.
    pub fn try_bill(&mut self, class: ClassHandle, client_id: &[u8]) -> bool {
        match self.rings.get_mut(&class) {
            Some(ring) => ring.try_bill(client_id),
            None => true,
        }
    }

    pub fn unbill(&mut self, class: ClassHandle, client_id: &[u8]) {
        if let Some(ring) = self.rings.get_mut(&class) {
            ring.unbill(client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_once_limit_is_reached() {
        let mut t = BillingTable::new();
        let class = ClassHandle(0);
        t.set_limit(class, 1);
        assert!(t.try_bill(class, b"client-a"));
        assert!(!t.try_bill(class, b"client-b"));
    }

    #[test]
    fn unbilling_frees_a_slot() {
        let mut t = BillingTable::new();
        let class = ClassHandle(0);
        t.set_limit(class, 1);
        assert!(t.try_bill(class, b"client-a"));
        t.unbill(class, b"client-a");
        assert!(t.try_bill(class, b"client-b"));
    }

    #[test]
    fn reentering_the_same_client_does_not_consume_extra_budget() {
        let mut t = BillingTable::new();
        let class = ClassHandle(0);
        t.set_limit(class, 1);
        assert!(t.try_bill(class, b"client-a"));
        assert!(t.try_bill(class, b"client-a"));
    }
}
