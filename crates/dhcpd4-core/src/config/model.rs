/*  Configuration data model, spec.md §3/§9. Declarations form a tree
 *  (shared-network contains subnets, subnets contain pools, any scope can
 *  nest a group) but are stored flat in per-kind arenas and addressed by
 *  index, per spec.md's Design Notes: handles are `Copy` integers, not
 *  `Rc<RefCell<_>>`, so the allocation engine can walk "this pool's
 *  enclosing subnet's enclosing shared-network" without borrow-checker
 *  fights over shared mutable ownership. Parent links are non-owning
 *  back-edges (plain `Handle`, never a strong reference cycle).
 */
use crate::config::ast::Stmt;
use crate::dhcp::dhcppkt::DhcpOption;
use dhcpd4_net::{HwAddr, Ipv4Subnet};
use std::net::Ipv4Addr;

macro_rules! handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);
    };
}

handle!(GroupHandle);
handle!(SharedNetworkHandle);
handle!(SubnetHandle);
handle!(PoolHandle);
handle!(HostHandle);
handle!(ClassHandle);

/// Parameters and option statements common to every scope, applied in
/// least-specific-to-most-specific order when resolving a client's reply
/// (spec.md §4.3's scope-stack precedence).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub statements: Vec<Stmt>,
    pub default_lease_time: Option<u32>,
    pub max_lease_time: Option<u32>,
    pub min_lease_time: Option<u32>,
    pub parent: Option<GroupHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: Option<String>,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharedNetwork {
    pub name: String,
    pub subnets: Vec<SubnetHandle>,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub net: Ipv4Subnet,
    pub shared_network: Option<SharedNetworkHandle>,
    pub pools: Vec<PoolHandle>,
    pub scope: Scope,
}

/// A permit/prohibit rule attached to a pool (spec.md §4.4 step 5).
#[derive(Debug, Clone, PartialEq)]
pub enum PoolRule {
    AllowKnownClients,
    DenyKnownClients,
    AllowUnknownClients,
    DenyUnknownClients,
    AllowClass(ClassHandle),
    DenyClass(ClassHandle),
    IgnoreClass(ClassHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub subnet: SubnetHandle,
    pub ranges: Vec<(Ipv4Addr, Ipv4Addr)>,
    pub rules: Vec<PoolRule>,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub name: String,
    pub hardware: Option<HwAddr>,
    pub client_id: Option<Vec<u8>>,
    pub fixed_address: Option<Ipv4Addr>,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub matches: Option<crate::config::ast::Expr>,
    /// `spawn with <expr>`: subclasses are keyed by this expression's
    /// value at match time rather than declared individually.
    pub spawn_with: Option<crate::config::ast::Expr>,
    /// `lease limit N`: bound enforced through `crate::billing`.
    pub lease_limit: Option<u32>,
    pub scope: Scope,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub groups: Vec<Group>,
    pub shared_networks: Vec<SharedNetwork>,
    pub subnets: Vec<Subnet>,
    pub pools: Vec<Pool>,
    pub hosts: Vec<Host>,
    pub classes: Vec<Class>,
    pub top: Scope,
    /// User-declared `option NAME code N = TYPE;` definitions, keyed by
    /// name, layered on top of the built-in DHCP option table.
    pub option_defs: Vec<(String, DhcpOption)>,
}

impl Model {
    pub fn new() -> Self {
        Model::default()
    }

    pub fn add_group(&mut self, g: Group) -> GroupHandle {
        self.groups.push(g);
        GroupHandle(self.groups.len() - 1)
    }

    pub fn add_shared_network(&mut self, s: SharedNetwork) -> SharedNetworkHandle {
        self.shared_networks.push(s);
        SharedNetworkHandle(self.shared_networks.len() - 1)
    }

    pub fn add_subnet(&mut self, s: Subnet) -> SubnetHandle {
        self.subnets.push(s);
        SubnetHandle(self.subnets.len() - 1)
    }

    pub fn add_pool(&mut self, p: Pool) -> PoolHandle {
        self.pools.push(p);
        let h = PoolHandle(self.pools.len() - 1);
        self.subnets[self.pools[h.0].subnet.0].pools.push(h);
        h
    }

    pub fn add_host(&mut self, h: Host) -> HostHandle {
        self.hosts.push(h);
        HostHandle(self.hosts.len() - 1)
    }

    pub fn add_class(&mut self, c: Class) -> ClassHandle {
        self.classes.push(c);
        ClassHandle(self.classes.len() - 1)
    }

    pub fn subnet(&self, h: SubnetHandle) -> &Subnet {
        &self.subnets[h.0]
    }

    pub fn pool(&self, h: PoolHandle) -> &Pool {
        &self.pools[h.0]
    }

    pub fn host_by_hardware(&self, hw: &HwAddr) -> Option<&Host> {
        self.hosts.iter().find(|h| h.hardware.as_ref() == Some(hw))
    }

    pub fn host_by_client_id(&self, id: &[u8]) -> Option<&Host> {
        self.hosts.iter().find(|h| h.client_id.as_deref() == Some(id))
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassHandle> {
        self.classes.iter().position(|c| c.name == name).map(ClassHandle)
    }

    /// Finds the subnet whose network contains `addr` — the lookup used
    /// when a relay's `giaddr` or a directly-attached interface address
    /// needs to be mapped onto configuration (spec.md §4.4 step 1/2).
    pub fn subnet_for_addr(&self, addr: Ipv4Addr) -> Option<SubnetHandle> {
        self.subnets
            .iter()
            .enumerate()
            .filter(|(_, s)| s.net.contains(addr))
            .max_by_key(|(_, s)| s.net.prefixlen)
            .map(|(i, _)| SubnetHandle(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_for_addr_prefers_most_specific() {
        let mut m = Model::new();
        m.add_subnet(Subnet {
            net: Ipv4Subnet::new("10.0.0.0".parse().unwrap(), 8).unwrap(),
            shared_network: None,
            pools: vec![],
            scope: Scope::default(),
        });
        m.add_subnet(Subnet {
            net: Ipv4Subnet::new("10.0.5.0".parse().unwrap(), 24).unwrap(),
            shared_network: None,
            pools: vec![],
            scope: Scope::default(),
        });
        let found = m.subnet_for_addr("10.0.5.12".parse().unwrap()).unwrap();
        assert_eq!(m.subnet(found).net.prefixlen, 24);
    }

    #[test]
    fn add_pool_links_back_to_subnet() {
        let mut m = Model::new();
        let sh = m.add_subnet(Subnet {
            net: Ipv4Subnet::new("10.0.0.0".parse().unwrap(), 24).unwrap(),
            shared_network: None,
            pools: vec![],
            scope: Scope::default(),
        });
        let ph = m.add_pool(Pool {
            subnet: sh,
            ranges: vec![],
            rules: vec![],
            scope: Scope::default(),
        });
        assert_eq!(m.subnet(sh).pools, vec![ph]);
    }
}
