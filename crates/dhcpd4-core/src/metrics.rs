/*  Process metrics, exported the same way the teacher's own ambient
 *  stack does it: a handful of `prometheus` counters behind a
 *  `lazy_static` registry, scraped by whatever exporter the binary crate
 *  wires up. Counting belongs next to the handlers that know what
 *  happened, not sprinkled through the allocation engine.
 */
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref DISCOVERS_TOTAL: IntCounter =
        IntCounter::new("dhcpd4_discovers_total", "DHCPDISCOVER packets received").unwrap();
    pub static ref OFFERS_TOTAL: IntCounter =
        IntCounter::new("dhcpd4_offers_total", "DHCPOFFER packets sent").unwrap();
    pub static ref ACKS_TOTAL: IntCounter = IntCounter::new("dhcpd4_acks_total", "DHCPACK packets sent").unwrap();
    pub static ref NAKS_TOTAL: IntCounter = IntCounter::new("dhcpd4_naks_total", "DHCPNAK packets sent").unwrap();
    pub static ref DECLINES_TOTAL: IntCounter =
        IntCounter::new("dhcpd4_declines_total", "DHCPDECLINE packets received").unwrap();
    pub static ref RELEASES_TOTAL: IntCounter =
        IntCounter::new("dhcpd4_releases_total", "DHCPRELEASE packets received").unwrap();
    pub static ref ACTIVE_LEASES: IntGauge =
        IntGauge::new("dhcpd4_active_leases", "Leases currently in the Active state").unwrap();
}

/// Registers every collector with `REGISTRY`. Call once at startup before
/// exposing the scrape endpoint; safe to call more than once only the
/// first time (`Registry::register` errors on duplicate registration).
pub fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(DISCOVERS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OFFERS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NAKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DECLINES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RELEASES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_LEASES.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incrementing_a_counter_is_reflected_immediately() {
        let before = OFFERS_TOTAL.get();
        OFFERS_TOTAL.inc();
        assert_eq!(OFFERS_TOTAL.get(), before + 1);
    }
}
