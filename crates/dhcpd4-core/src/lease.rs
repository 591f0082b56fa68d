/*  Lease record and state machine, spec.md §3/§4.5. States and their
 *  legal transitions are confirmed against `original_source/` (the
 *  `FTS_*` constants and `supersede_lease`/`release_lease`/
 *  `decline_lease` family) — every transition here is journaled
 *  (spec.md §4.6) and idempotent: replaying the same transition twice
 *  must not change the outcome, since the journal is replayed on startup.
 */
use dhcpd4_net::HwAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Free,
    Offered,
    Active,
    Expired,
    Released,
    Abandoned,
    Reset,
    Bootp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub address: Ipv4Addr,
    pub state: LeaseState,
    pub hardware: Option<HwAddr>,
    pub client_id: Option<Vec<u8>>,
    pub hostname: Option<String>,
    pub starts: Option<SystemTime>,
    pub ends: Option<SystemTime>,
    /// Monotonically increasing: bumped on every committed transition so
    /// the journal's most recent record for an address always wins on
    /// replay, even if two records share a timestamp.
    pub serial: u64,
    /// Per-lease variable scope written by `set var = expr;` inside an
    /// `on commit|expiry|release` hook (spec.md §4.5/§4.6). Not persisted
    /// to the journal: replaying a lease's history always starts empty,
    /// since bindings are derived from config, not lease identity.
    pub bindings: HashMap<String, Vec<u8>>,
}

impl Lease {
    pub fn free(address: Ipv4Addr) -> Self {
        Lease {
            address,
            state: LeaseState::Free,
            hardware: None,
            client_id: None,
            hostname: None,
            starts: None,
            ends: None,
            serial: 0,
            bindings: HashMap::new(),
        }
    }

    fn bump(&mut self) {
        self.serial += 1;
    }

    pub fn is_available(&self, now: SystemTime) -> bool {
        match self.state {
            LeaseState::Free | LeaseState::Released | LeaseState::Reset => true,
            LeaseState::Expired => true,
            LeaseState::Active | LeaseState::Offered | LeaseState::Bootp => {
                self.ends.map(|e| e <= now).unwrap_or(false)
            }
            LeaseState::Abandoned => false,
        }
    }

    /// `Free -> Offered`: a DHCPOFFER was sent but not yet confirmed.
    /// Idempotent: re-offering the same client just refreshes `ends`.
    pub fn offer(&mut self, hardware: HwAddr, client_id: Option<Vec<u8>>, now: SystemTime, offer_ttl: std::time::Duration) {
        self.state = LeaseState::Offered;
        self.hardware = Some(hardware);
        self.client_id = client_id;
        self.starts = Some(now);
        self.ends = Some(now + offer_ttl);
        self.bump();
    }

    /// `Offered|Active|Expired|Free -> Active`: a DHCPREQUEST was ACKed.
    pub fn commit(
        &mut self,
        hardware: HwAddr,
        client_id: Option<Vec<u8>>,
        hostname: Option<String>,
        now: SystemTime,
        lease_time: std::time::Duration,
    ) {
        self.state = LeaseState::Active;
        self.hardware = Some(hardware);
        self.client_id = client_id;
        self.hostname = hostname;
        self.starts = Some(now);
        self.ends = Some(now + lease_time);
        self.bump();
    }

    /// `Active -> Released`: client sent DHCPRELEASE.
    pub fn release(&mut self, now: SystemTime) {
        if self.state == LeaseState::Released {
            return;
        }
        self.state = LeaseState::Released;
        self.ends = Some(now);
        self.bump();
    }

    /// `Active|Offered -> Abandoned`: client declined the address (e.g.
    /// ARP probe conflict). Abandoned addresses are withheld from the
    /// pool until an operator resets them (`reset`).
    pub fn decline(&mut self, now: SystemTime, quarantine: std::time::Duration) {
        self.state = LeaseState::Abandoned;
        self.ends = Some(now + quarantine);
        self.bump();
    }

    /// A due timer fires and the lease naturally lapses.
    pub fn expire(&mut self) {
        if matches!(self.state, LeaseState::Active | LeaseState::Offered | LeaseState::Bootp) {
            self.state = LeaseState::Expired;
            self.bump();
        }
    }

    /// Operator- or journal-compaction-driven return to `Free`.
    pub fn reset(&mut self) {
        self.state = LeaseState::Free;
        self.hardware = None;
        self.client_id = None;
        self.hostname = None;
        self.starts = None;
        self.ends = None;
        self.bindings.clear();
        self.bump();
    }

    /// BOOTP clients never release or renew; their lease simply persists
    /// until an operator reclaims the address (spec.md's BOOTP handling,
    /// confirmed against `original_source/bootp.c`: `ends = MAX_TIME`
    /// unless `dynamic-bootp-lease-length` applies).
    pub fn commit_bootp(&mut self, hardware: HwAddr, now: SystemTime, ends: Option<SystemTime>) {
        self.state = LeaseState::Bootp;
        self.hardware = Some(hardware);
        self.starts = Some(now);
        self.ends = ends;
        self.bump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn expired_lease_is_available_for_reallocation() {
        let mut l = Lease::free("10.0.0.5".parse().unwrap());
        let t0 = SystemTime::UNIX_EPOCH;
        l.commit(HwAddr::ethernet([0; 6]), None, None, t0, Duration::from_secs(60));
        assert!(!l.is_available(t0));
        assert!(l.is_available(t0 + Duration::from_secs(120)));
    }

    #[test]
    fn release_is_idempotent() {
        let mut l = Lease::free("10.0.0.5".parse().unwrap());
        let t0 = SystemTime::UNIX_EPOCH;
        l.commit(HwAddr::ethernet([0; 6]), None, None, t0, Duration::from_secs(60));
        l.release(t0 + Duration::from_secs(10));
        let serial_after_first = l.serial;
        l.release(t0 + Duration::from_secs(20));
        assert_eq!(l.serial, serial_after_first);
        assert_eq!(l.state, LeaseState::Released);
    }

    #[test]
    fn abandoned_lease_is_never_available() {
        let mut l = Lease::free("10.0.0.5".parse().unwrap());
        let t0 = SystemTime::UNIX_EPOCH;
        l.decline(t0, Duration::from_secs(3600));
        assert!(!l.is_available(t0 + Duration::from_secs(7200)));
    }
}
