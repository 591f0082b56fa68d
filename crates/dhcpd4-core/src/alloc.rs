/*  Allocation engine, spec.md §4.4. Order of operations: resolve the
 *  requesting network, check for a `host` declaration with a
 *  `fixed-address` (bypasses pool search entirely), prefer the client's
 *  requested address if it's still in the pool and free, then walk the
 *  subnet's pools in declaration order applying permit/prohibit rules
 *  and per-class billing before handing out the first free address in a
 *  range.
 */
use crate::billing::BillingTable;
use crate::config::model::{Model, PoolRule, SubnetHandle};
use crate::lease::{Lease, LeaseState};
use dhcpd4_net::HwAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::SystemTime;

#[derive(Debug, Clone, Default)]
pub struct LeaseTable {
    pub leases: HashMap<Ipv4Addr, Lease>,
}

impl LeaseTable {
    pub fn new() -> Self {
        LeaseTable::default()
    }

    pub fn entry(&mut self, addr: Ipv4Addr) -> &mut Lease {
        self.leases.entry(addr).or_insert_with(|| Lease::free(addr))
    }

    pub fn get(&self, addr: &Ipv4Addr) -> Option<&Lease> {
        self.leases.get(addr)
    }
}

pub struct Request<'a> {
    pub hardware: &'a HwAddr,
    pub client_id: Option<&'a [u8]>,
    pub requested_address: Option<Ipv4Addr>,
    pub known: bool,
    pub matched_classes: &'a [crate::config::model::ClassHandle],
}

/// Outcome of a successful allocation: the address plus which pool (if
/// any — fixed-address leases aren't drawn from a pool) granted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub address: Ipv4Addr,
    pub fixed: bool,
    pub pool: Option<crate::config::model::PoolHandle>,
}

pub fn allocate(
    model: &Model,
    leases: &mut LeaseTable,
    billing: &mut BillingTable,
    subnet: SubnetHandle,
    req: &Request,
    now: SystemTime,
) -> Option<Allocation> {
    let host = model
        .host_by_hardware(req.hardware)
        .or_else(|| req.client_id.and_then(|id| model.host_by_client_id(id)));
    if let Some(host) = host {
        if let Some(addr) = host.fixed_address {
            return Some(Allocation { address: addr, fixed: true, pool: None });
        }
    }

    if let Some(addr) = req.requested_address {
        if let Some(pool_handle) = pool_owning_address(model, subnet, addr) {
            let pool = model.pool(pool_handle);
            if address_is_free(leases, addr, now) && pool_permits(model, pool, req) && bill_for_pool(pool, billing, req) {
                return Some(Allocation { address: addr, fixed: false, pool: Some(pool_handle) });
            }
        }
    }

    for &pool_handle in &model.subnet(subnet).pools {
        let pool = model.pool(pool_handle);
        if !pool_permits(model, pool, req) {
            continue;
        }
        for &(lo, hi) in &pool.ranges {
            let mut candidate = u32::from(lo);
            let end = u32::from(hi);
            while candidate <= end {
                let addr = Ipv4Addr::from(candidate);
                if address_is_free(leases, addr, now) && bill_for_pool(pool, billing, req) {
                    return Some(Allocation { address: addr, fixed: false, pool: Some(pool_handle) });
                }
                candidate += 1;
            }
        }
    }
    None
}

fn address_is_free(leases: &LeaseTable, addr: Ipv4Addr, now: SystemTime) -> bool {
    leases.leases.get(&addr).map(|l| l.is_available(now)).unwrap_or(true)
}

pub(crate) fn pool_owning_address(model: &Model, subnet: SubnetHandle, addr: Ipv4Addr) -> Option<crate::config::model::PoolHandle> {
    model
        .subnet(subnet)
        .pools
        .iter()
        .copied()
        .find(|&p| model.pool(p).ranges.iter().any(|&(lo, hi)| u32::from(lo) <= u32::from(addr) && u32::from(addr) <= u32::from(hi)))
}

fn bill_for_pool(pool: &crate::config::model::Pool, billing: &mut BillingTable, req: &Request) -> bool {
    let client_id = req.client_id.unwrap_or(&req.hardware.addr);
    req.matched_classes.iter().all(|class| billing.try_bill(*class, client_id))
        && pool_class_rules_allow(pool, req)
}

fn pool_class_rules_allow(pool: &crate::config::model::Pool, req: &Request) -> bool {
    for rule in &pool.rules {
        if let PoolRule::IgnoreClass(c) = rule {
            if req.matched_classes.contains(c) {
                return false;
            }
        }
    }
    true
}

/// Evaluates a pool's `allow`/`deny` rules (spec.md §4.4 step 5): a
/// `deny` always wins over an `allow` for the same subject, and an empty
/// rule set permits everyone.
fn pool_permits(model: &Model, pool: &crate::config::model::Pool, req: &Request) -> bool {
    let _ = model;
    let mut allow_known = None;
    let mut allow_unknown = None;
    for rule in &pool.rules {
        match rule {
            PoolRule::AllowKnownClients => allow_known = Some(true),
            PoolRule::DenyKnownClients => allow_known = Some(false),
            PoolRule::AllowUnknownClients => allow_unknown = Some(true),
            PoolRule::DenyUnknownClients => allow_unknown = Some(false),
            PoolRule::DenyClass(c) if req.matched_classes.contains(c) => return false,
            PoolRule::DenyClass(_) | PoolRule::AllowClass(_) | PoolRule::IgnoreClass(_) => {}
        }
    }
    if req.known {
        allow_known.unwrap_or(true)
    } else {
        allow_unknown.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeaseStateKind {
    Free,
    Offered,
    Active,
}

impl From<LeaseState> for LeaseStateKind {
    fn from(s: LeaseState) -> Self {
        match s {
            LeaseState::Free | LeaseState::Released | LeaseState::Reset | LeaseState::Expired => LeaseStateKind::Free,
            LeaseState::Offered => LeaseStateKind::Offered,
            LeaseState::Active | LeaseState::Abandoned | LeaseState::Bootp => LeaseStateKind::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Pool, Scope, Subnet};
    use dhcpd4_net::Ipv4Subnet;

    fn sample_model() -> (Model, SubnetHandle) {
        let mut model = Model::new();
        let sh = model.add_subnet(Subnet {
            net: Ipv4Subnet::new("10.0.0.0".parse().unwrap(), 24).unwrap(),
            shared_network: None,
            pools: vec![],
            scope: Scope::default(),
        });
        model.add_pool(Pool {
            subnet: sh,
            ranges: vec![("10.0.0.10".parse().unwrap(), "10.0.0.12".parse().unwrap())],
            rules: vec![],
            scope: Scope::default(),
        });
        (model, sh)
    }

    #[test]
    fn allocates_first_free_address_in_range() {
        let (model, sh) = sample_model();
        let mut leases = LeaseTable::new();
        let mut billing = BillingTable::new();
        let hw = HwAddr::ethernet([1, 2, 3, 4, 5, 6]);
        let req = Request { hardware: &hw, client_id: None, requested_address: None, known: false, matched_classes: &[] };
        let alloc = allocate(&model, &mut leases, &mut billing, sh, &req, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(alloc.address, "10.0.0.10".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn skips_addresses_already_leased() {
        let (model, sh) = sample_model();
        let mut leases = LeaseTable::new();
        leases.entry("10.0.0.10".parse().unwrap()).commit(
            HwAddr::ethernet([9; 6]),
            None,
            None,
            SystemTime::UNIX_EPOCH,
            std::time::Duration::from_secs(600),
        );
        let mut billing = BillingTable::new();
        let hw = HwAddr::ethernet([1, 2, 3, 4, 5, 6]);
        let req = Request { hardware: &hw, client_id: None, requested_address: None, known: false, matched_classes: &[] };
        let alloc = allocate(&model, &mut leases, &mut billing, sh, &req, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(alloc.address, "10.0.0.11".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn denies_unknown_clients_when_pool_requires_known() {
        let mut model = Model::new();
        let sh = model.add_subnet(Subnet {
            net: Ipv4Subnet::new("10.0.0.0".parse().unwrap(), 24).unwrap(),
            shared_network: None,
            pools: vec![],
            scope: Scope::default(),
        });
        model.add_pool(Pool {
            subnet: sh,
            ranges: vec![("10.0.0.10".parse().unwrap(), "10.0.0.10".parse().unwrap())],
            rules: vec![PoolRule::DenyUnknownClients],
            scope: Scope::default(),
        });
        let mut leases = LeaseTable::new();
        let mut billing = BillingTable::new();
        let hw = HwAddr::ethernet([1, 2, 3, 4, 5, 6]);
        let req = Request { hardware: &hw, client_id: None, requested_address: None, known: false, matched_classes: &[] };
        assert!(allocate(&model, &mut leases, &mut billing, sh, &req, SystemTime::UNIX_EPOCH).is_none());
    }
}
