/*  Protocol handlers, spec.md §4.7. Each handler takes an inbound
 *  request plus the pieces of mutable state it's allowed to touch (the
 *  lease table, the billing table, the journal) and returns the reply to
 *  send, if any — DHCPDECLINE and DHCPRELEASE have no reply, matching
 *  RFC 2131 §4.3.3/§4.3.4.
 */
use crate::alloc::{self, LeaseTable, Request as AllocRequest};
use crate::billing::BillingTable;
use crate::config::ast::HookEvent;
use crate::config::model::{ClassHandle, Host, Model, SubnetHandle};
use crate::dhcp::dhcppkt::{self, Dhcp, DhcpOptions, MessageType, OP_BOOTREPLY};
use crate::eval::{self, EvalEnv};
use crate::journal::Journal;
use crate::lease::Lease;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

pub struct ServerContext<'a> {
    pub model: &'a Model,
    pub leases: &'a mut LeaseTable,
    pub billing: &'a mut BillingTable,
    pub journal: &'a mut Journal,
    pub server_id: Ipv4Addr,
    pub default_lease_time: Duration,
    pub max_lease_time: Duration,
    pub offer_ttl: Duration,
}

/// Resolves which subnet a request belongs to: a relay's `giaddr` when
/// present, otherwise the address of the interface the packet arrived on
/// (spec.md §4.4 step 1).
pub fn resolve_subnet(model: &Model, request: &Dhcp, local_addr: Ipv4Addr) -> Option<SubnetHandle> {
    let addr = if request.giaddr != Ipv4Addr::UNSPECIFIED { request.giaddr } else { local_addr };
    model.subnet_for_addr(addr)
}

pub(crate) fn matching_classes(model: &Model, env: &EvalEnv) -> Vec<ClassHandle> {
    model
        .classes
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.matches
                .as_ref()
                .map(|expr| eval::eval(expr, env, crate::config::ast::EvalContext::Boolean).map(|v| v == eval::Value::Bool(true)).unwrap_or(false))
                .unwrap_or(false)
        })
        .map(|(i, _)| ClassHandle(i))
        .collect()
}

pub(crate) fn lookup_host<'m>(model: &'m Model, hardware: &dhcpd4_net::HwAddr, client_id: Option<&[u8]>) -> Option<&'m Host> {
    model.host_by_hardware(hardware).or_else(|| client_id.and_then(|id| model.host_by_client_id(id)))
}

fn build_reply_options(
    model: &Model,
    subnet: SubnetHandle,
    pool: Option<crate::config::model::PoolHandle>,
    host: Option<&Host>,
    classes: &[ClassHandle],
    env: &EvalEnv,
    reply: &mut DhcpOptions,
) {
    eval::apply_statements(&model.top.statements, env, reply);
    let subnet_ref = model.subnet(subnet);
    if let Some(sn) = subnet_ref.shared_network {
        eval::apply_statements(&model.shared_networks[sn.0].scope.statements, env, reply);
    }
    eval::apply_statements(&subnet_ref.scope.statements, env, reply);
    if let Some(pool_handle) = pool {
        eval::apply_statements(&model.pool(pool_handle).scope.statements, env, reply);
    }
    for &class in classes {
        eval::apply_statements(&model.classes[class.0].scope.statements, env, reply);
    }
    if let Some(host) = host {
        eval::apply_statements(&host.scope.statements, env, reply);
    }
}

/// Walks the same scope chain as `build_reply_options`, but looks for
/// `on <event> { ... }` hooks instead of option statements, writing into
/// `lease`'s binding scope (spec.md §4.5/§4.6).
pub(crate) fn fire_lease_hooks(
    model: &Model,
    subnet: SubnetHandle,
    pool: Option<crate::config::model::PoolHandle>,
    host: Option<&Host>,
    classes: &[ClassHandle],
    event: HookEvent,
    env: &EvalEnv,
    lease: &mut Lease,
) {
    eval::fire_hooks(&model.top.statements, event, env, lease);
    let subnet_ref = model.subnet(subnet);
    if let Some(sn) = subnet_ref.shared_network {
        eval::fire_hooks(&model.shared_networks[sn.0].scope.statements, event, env, lease);
    }
    eval::fire_hooks(&subnet_ref.scope.statements, event, env, lease);
    if let Some(pool_handle) = pool {
        eval::fire_hooks(&model.pool(pool_handle).scope.statements, event, env, lease);
    }
    for &class in classes {
        eval::fire_hooks(&model.classes[class.0].scope.statements, event, env, lease);
    }
    if let Some(host) = host {
        eval::fire_hooks(&host.scope.statements, event, env, lease);
    }
}

fn lease_time_for(subnet: &crate::config::model::Subnet, ctx: &ServerContext) -> Duration {
    subnet
        .scope
        .default_lease_time
        .map(|s| Duration::from_secs(s as u64))
        .unwrap_or(ctx.default_lease_time)
        .min(subnet.scope.max_lease_time.map(|s| Duration::from_secs(s as u64)).unwrap_or(ctx.max_lease_time))
}

fn base_reply(request: &Dhcp, msgtype: MessageType, yiaddr: Ipv4Addr, server_id: Ipv4Addr) -> Dhcp {
    Dhcp {
        op: OP_BOOTREPLY,
        htype: request.htype,
        hlen: request.hlen,
        hops: 0,
        xid: request.xid,
        secs: 0,
        flags: request.flags,
        ciaddr: Ipv4Addr::UNSPECIFIED,
        yiaddr,
        siaddr: Ipv4Addr::UNSPECIFIED,
        giaddr: request.giaddr,
        chaddr: request.chaddr.clone(),
        sname: vec![],
        file: vec![],
        options: DhcpOptions::default()
            .set_option(&dhcppkt::OPTION_MSGTYPE, &msgtype)
            .set_option(&dhcppkt::OPTION_SERVERID, &server_id),
    }
}

/// DHCPDISCOVER -> DHCPOFFER. No lease is committed yet; the address is
/// merely tentatively offered (spec.md §4.5's `Free -> Offered`).
pub fn handle_discover(ctx: &mut ServerContext, request: &Dhcp, now: SystemTime) -> Option<Dhcp> {
    crate::metrics::DISCOVERS_TOTAL.inc();
    let hardware = dhcpd4_net::HwAddr::ethernet(request.chaddr.get(..6)?.try_into().ok()?);
    let client_id = request.options.get_clientid();
    let host = lookup_host(ctx.model, &hardware, client_id.as_deref());
    let known = host.is_some();
    let env = EvalEnv { request: Some(request), known };
    let classes = matching_classes(ctx.model, &env);
    let subnet_handle = resolve_subnet(ctx.model, request, ctx.server_id)?;

    let alloc_req = AllocRequest {
        hardware: &hardware,
        client_id: client_id.as_deref(),
        requested_address: request.options.get_address_request(),
        known,
        matched_classes: &classes,
    };
    let allocation = alloc::allocate(ctx.model, ctx.leases, ctx.billing, subnet_handle, &alloc_req, now)?;

    if !allocation.fixed {
        let lease = ctx.leases.entry(allocation.address);
        lease.offer(hardware, client_id.clone(), now, ctx.offer_ttl);
        ctx.journal.append(lease).ok();
    }

    let mut reply = base_reply(request, dhcppkt::DHCPOFFER, allocation.address, ctx.server_id);
    build_reply_options(ctx.model, subnet_handle, allocation.pool, host, &classes, &env, &mut reply.options);
    let lease_time = lease_time_for(ctx.model.subnet(subnet_handle), ctx);
    reply.options = reply.options.set_option(&dhcppkt::OPTION_LEASETIME, &(lease_time.as_secs() as u32));
    crate::metrics::OFFERS_TOTAL.inc();
    Some(reply)
}

/// DHCPREQUEST -> DHCPACK/DHCPNAK. Commits the lease if the requested
/// address is still consistent with what the server would allocate; an
/// address a client asked for that no longer fits its subnet draws a NAK
/// (spec.md §4.7's DHCPREQUEST edge cases).
pub fn handle_request(ctx: &mut ServerContext, request: &Dhcp, now: SystemTime) -> Option<Dhcp> {
    let hardware = dhcpd4_net::HwAddr::ethernet(request.chaddr.get(..6)?.try_into().ok()?);
    let client_id = request.options.get_clientid();
    let host = lookup_host(ctx.model, &hardware, client_id.as_deref());
    let known = host.is_some();
    let env = EvalEnv { request: Some(request), known };
    let classes = matching_classes(ctx.model, &env);
    let subnet_handle = resolve_subnet(ctx.model, request, ctx.server_id)?;

    let requested = request.options.get_address_request().filter(|a| *a != Ipv4Addr::UNSPECIFIED).or({
        if request.ciaddr != Ipv4Addr::UNSPECIFIED { Some(request.ciaddr) } else { None }
    })?;

    let still_valid = match ctx.leases.get(&requested) {
        Some(existing) => existing.client_id == client_id || existing.hardware.as_ref() == Some(&hardware) || existing.is_available(now),
        None => true,
    };

    if !still_valid {
        return Some(nak(request, ctx.server_id));
    }

    let alloc_req = AllocRequest {
        hardware: &hardware,
        client_id: client_id.as_deref(),
        requested_address: Some(requested),
        known,
        matched_classes: &classes,
    };
    let allocation = match alloc::allocate(ctx.model, ctx.leases, ctx.billing, subnet_handle, &alloc_req, now) {
        Some(a) if a.address == requested => a,
        _ => return Some(nak(request, ctx.server_id)),
    };

    let subnet = ctx.model.subnet(subnet_handle);
    let lease_time = lease_time_for(subnet, ctx);
    if !allocation.fixed {
        let hostname = request.options.get_hostname();
        let lease = ctx.leases.entry(allocation.address);
        let was_active = lease.state == crate::lease::LeaseState::Active;
        lease.commit(hardware, client_id, hostname, now, lease_time);
        fire_lease_hooks(ctx.model, subnet_handle, allocation.pool, host, &classes, HookEvent::Commit, &env, lease);
        ctx.journal.append(lease).ok();
        if !was_active {
            crate::metrics::ACTIVE_LEASES.inc();
        }
    }

    let mut reply = base_reply(request, dhcppkt::DHCPACK, allocation.address, ctx.server_id);
    build_reply_options(ctx.model, subnet_handle, allocation.pool, host, &classes, &env, &mut reply.options);
    reply.options = reply.options.set_option(&dhcppkt::OPTION_LEASETIME, &(lease_time.as_secs() as u32));
    crate::metrics::ACKS_TOTAL.inc();
    Some(reply)
}

fn nak(request: &Dhcp, server_id: Ipv4Addr) -> Dhcp {
    crate::metrics::NAKS_TOTAL.inc();
    let mut reply = base_reply(request, dhcppkt::DHCPNAK, Ipv4Addr::UNSPECIFIED, server_id);
    reply.flags |= dhcppkt::FLAG_BROADCAST;
    reply
}

/// DHCPDECLINE: a client found the offered/assigned address already in
/// use (ARP probe conflict). No reply is sent; the address is withheld
/// from the pool until reset (spec.md §4.5's `-> Abandoned`).
pub fn handle_decline(ctx: &mut ServerContext, request: &Dhcp, now: SystemTime, quarantine: Duration) {
    let Some(addr) = request.options.get_address_request() else { return };
    let lease = ctx.leases.entry(addr);
    lease.decline(now, quarantine);
    ctx.journal.append(lease).ok();
    if let Some(client_id) = request.options.get_clientid() {
        for class in 0..ctx.model.classes.len() {
            ctx.billing.unbill(ClassHandle(class), &client_id);
        }
    }
}

/// DHCPRELEASE: client gives up its lease early. No reply is sent.
pub fn handle_release(ctx: &mut ServerContext, request: &Dhcp, now: SystemTime) {
    if request.ciaddr == Ipv4Addr::UNSPECIFIED {
        return;
    }
    let client_id = request.options.get_clientid();
    if client_id.is_some() && ctx.leases.get(&request.ciaddr).map(|l| &l.client_id) != Some(&client_id) {
        return;
    }

    let hardware = request.chaddr.get(..6).and_then(|b| b.try_into().ok()).map(dhcpd4_net::HwAddr::ethernet);
    let host = hardware.as_ref().and_then(|hw| lookup_host(ctx.model, hw, client_id.as_deref()));
    let known = host.is_some();
    let env = EvalEnv { request: Some(request), known };
    let classes = matching_classes(ctx.model, &env);
    let subnet_handle = resolve_subnet(ctx.model, request, ctx.server_id);
    let pool = subnet_handle.and_then(|s| alloc::pool_owning_address(ctx.model, s, request.ciaddr));

    let lease = ctx.leases.entry(request.ciaddr);
    lease.release(now);
    if let Some(subnet_handle) = subnet_handle {
        fire_lease_hooks(ctx.model, subnet_handle, pool, host, &classes, HookEvent::Release, &env, lease);
    }
    ctx.journal.append(lease).ok();
    if let Some(client_id) = client_id {
        for class in 0..ctx.model.classes.len() {
            ctx.billing.unbill(ClassHandle(class), &client_id);
        }
    }
}

/// DHCPINFORM: client already has an address (statically configured) and
/// just wants configuration options. No lease bookkeeping happens.
pub fn handle_inform(ctx: &ServerContext, request: &Dhcp) -> Option<Dhcp> {
    let hardware = dhcpd4_net::HwAddr::ethernet(request.chaddr.get(..6)?.try_into().ok()?);
    let client_id = request.options.get_clientid();
    let host = lookup_host(ctx.model, &hardware, client_id.as_deref());
    let known = host.is_some();
    let env = EvalEnv { request: Some(request), known };
    let classes = matching_classes(ctx.model, &env);
    let subnet_handle = resolve_subnet(ctx.model, request, ctx.server_id)?;

    let mut reply = base_reply(request, dhcppkt::DHCPACK, request.ciaddr, ctx.server_id);
    build_reply_options(ctx.model, subnet_handle, None, host, &classes, &env, &mut reply.options);
    Some(reply)
}

/// Plain BOOTP (RFC 951/1542): no message-type option at all. Leases are
/// allocated the same way but never expire on their own (spec.md §4.5's
/// `Bootp` state, confirmed against `original_source/bootp.c`).
pub fn handle_bootrequest(ctx: &mut ServerContext, request: &Dhcp, now: SystemTime) -> Option<Dhcp> {
    let hardware = dhcpd4_net::HwAddr::ethernet(request.chaddr.get(..6)?.try_into().ok()?);
    let host = lookup_host(ctx.model, &hardware, None)?;
    let addr = host.fixed_address?;
    let subnet_handle = resolve_subnet(ctx.model, request, ctx.server_id)?;

    let env = EvalEnv { request: Some(request), known: true };
    let classes = matching_classes(ctx.model, &env);
    let lease = ctx.leases.entry(addr);
    lease.commit_bootp(hardware, now, None);
    fire_lease_hooks(ctx.model, subnet_handle, None, Some(host), &classes, HookEvent::Commit, &env, lease);
    ctx.journal.append(lease).ok();

    let mut reply = Dhcp {
        op: OP_BOOTREPLY,
        htype: request.htype,
        hlen: request.hlen,
        hops: 0,
        xid: request.xid,
        secs: 0,
        flags: request.flags,
        ciaddr: Ipv4Addr::UNSPECIFIED,
        yiaddr: addr,
        siaddr: Ipv4Addr::UNSPECIFIED,
        giaddr: request.giaddr,
        chaddr: request.chaddr.clone(),
        sname: vec![],
        file: vec![],
        options: DhcpOptions::default(),
    };
    build_reply_options(ctx.model, subnet_handle, None, Some(host), &classes, &env, &mut reply.options);
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ast::{Expr, Stmt};
    use crate::config::model::{Pool, Scope, Subnet};
    use dhcpd4_net::Ipv4Subnet;

    fn sample_ctx() -> (Model, LeaseTable, BillingTable, Journal) {
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
        let dir = std::env::temp_dir().join(format!("dhcpd4-handlers-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let journal = Journal::open(dir.join("leases.txt")).unwrap();
        (model, LeaseTable::new(), BillingTable::new(), journal)
    }

    fn discover_packet() -> Dhcp {
        Dhcp {
            op: dhcppkt::OP_BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 42,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: vec![1, 2, 3, 4, 5, 6],
            sname: vec![],
            file: vec![],
            options: DhcpOptions::default().set_option(&dhcppkt::OPTION_MSGTYPE, &dhcppkt::DHCPDISCOVER),
        }
    }

    #[test]
    fn discover_offers_first_free_address() {
        let (model, mut leases, mut billing, mut journal) = sample_ctx();
        let mut ctx = ServerContext {
            model: &model,
            leases: &mut leases,
            billing: &mut billing,
            journal: &mut journal,
            server_id: "10.0.0.1".parse().unwrap(),
            default_lease_time: Duration::from_secs(3600),
            max_lease_time: Duration::from_secs(86400),
            offer_ttl: Duration::from_secs(60),
        };
        let reply = handle_discover(&mut ctx, &discover_packet(), SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(reply.yiaddr, "10.0.0.10".parse::<Ipv4Addr>().unwrap());
        assert_eq!(reply.options.get_messagetype(), Some(dhcppkt::DHCPOFFER));
    }

    #[test]
    fn request_commits_the_offered_address() {
        let (model, mut leases, mut billing, mut journal) = sample_ctx();
        let mut ctx = ServerContext {
            model: &model,
            leases: &mut leases,
            billing: &mut billing,
            journal: &mut journal,
            server_id: "10.0.0.1".parse().unwrap(),
            default_lease_time: Duration::from_secs(3600),
            max_lease_time: Duration::from_secs(86400),
            offer_ttl: Duration::from_secs(60),
        };
        handle_discover(&mut ctx, &discover_packet(), SystemTime::UNIX_EPOCH).unwrap();
        let mut request = discover_packet();
        request.options = DhcpOptions::default()
            .set_option(&dhcppkt::OPTION_MSGTYPE, &dhcppkt::DHCPREQUEST)
            .set_option(&dhcppkt::OPTION_ADDRESSREQUEST, &"10.0.0.10".parse::<Ipv4Addr>().unwrap());
        let reply = handle_request(&mut ctx, &request, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(reply.options.get_messagetype(), Some(dhcppkt::DHCPACK));
        assert_eq!(leases.get(&"10.0.0.10".parse().unwrap()).unwrap().state, crate::lease::LeaseState::Active);
    }

    #[test]
    fn release_frees_the_address() {
        let (model, mut leases, mut billing, mut journal) = sample_ctx();
        leases.entry("10.0.0.10".parse().unwrap()).commit(
            dhcpd4_net::HwAddr::ethernet([1, 2, 3, 4, 5, 6]),
            None,
            None,
            SystemTime::UNIX_EPOCH,
            Duration::from_secs(600),
        );
        let mut ctx = ServerContext {
            model: &model,
            leases: &mut leases,
            billing: &mut billing,
            journal: &mut journal,
            server_id: "10.0.0.1".parse().unwrap(),
            default_lease_time: Duration::from_secs(3600),
            max_lease_time: Duration::from_secs(86400),
            offer_ttl: Duration::from_secs(60),
        };
        let mut request = discover_packet();
        request.ciaddr = "10.0.0.10".parse().unwrap();
        request.options = DhcpOptions::default().set_option(&dhcppkt::OPTION_MSGTYPE, &dhcppkt::DHCPRELEASE);
        handle_release(&mut ctx, &request, SystemTime::UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(leases.get(&"10.0.0.10".parse().unwrap()).unwrap().state, crate::lease::LeaseState::Released);
    }

    #[test]
    fn fixed_address_leases_are_never_journaled() {
        let (mut model, mut leases, mut billing, mut journal) = sample_ctx();
        let hw = dhcpd4_net::HwAddr::ethernet([1, 2, 3, 4, 5, 6]);
        model.add_host(crate::config::model::Host {
            name: "pinned".into(),
            hardware: Some(hw.clone()),
            client_id: None,
            fixed_address: Some("10.0.0.50".parse().unwrap()),
            scope: Scope::default(),
        });
        let mut ctx = ServerContext {
            model: &model,
            leases: &mut leases,
            billing: &mut billing,
            journal: &mut journal,
            server_id: "10.0.0.1".parse().unwrap(),
            default_lease_time: Duration::from_secs(3600),
            max_lease_time: Duration::from_secs(86400),
            offer_ttl: Duration::from_secs(60),
        };
        let reply = handle_discover(&mut ctx, &discover_packet(), SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(reply.yiaddr, "10.0.0.50".parse::<Ipv4Addr>().unwrap());
        assert!(leases.get(&"10.0.0.50".parse().unwrap()).is_none());

        let mut request = discover_packet();
        request.options = DhcpOptions::default()
            .set_option(&dhcppkt::OPTION_MSGTYPE, &dhcppkt::DHCPREQUEST)
            .set_option(&dhcppkt::OPTION_ADDRESSREQUEST, &"10.0.0.50".parse::<Ipv4Addr>().unwrap());
        let mut ctx = ServerContext {
            model: &model,
            leases: &mut leases,
            billing: &mut billing,
            journal: &mut journal,
            server_id: "10.0.0.1".parse().unwrap(),
            default_lease_time: Duration::from_secs(3600),
            max_lease_time: Duration::from_secs(86400),
            offer_ttl: Duration::from_secs(60),
        };
        let reply = handle_request(&mut ctx, &request, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(reply.options.get_messagetype(), Some(dhcppkt::DHCPACK));
        assert!(leases.get(&"10.0.0.50".parse().unwrap()).is_none());
    }

    #[test]
    fn commit_fires_on_commit_hook_into_lease_bindings() {
        let (mut model, mut leases, mut billing, mut journal) = sample_ctx();
        model.top.statements.push(Stmt::On {
            events: vec![HookEvent::Commit],
            body: vec![Stmt::Set { var: "welcomed".into(), value: Expr::ConstString("yes".into()) }],
        });
        let mut ctx = ServerContext {
            model: &model,
            leases: &mut leases,
            billing: &mut billing,
            journal: &mut journal,
            server_id: "10.0.0.1".parse().unwrap(),
            default_lease_time: Duration::from_secs(3600),
            max_lease_time: Duration::from_secs(86400),
            offer_ttl: Duration::from_secs(60),
        };
        handle_discover(&mut ctx, &discover_packet(), SystemTime::UNIX_EPOCH).unwrap();
        let mut request = discover_packet();
        request.options = DhcpOptions::default()
            .set_option(&dhcppkt::OPTION_MSGTYPE, &dhcppkt::DHCPREQUEST)
            .set_option(&dhcppkt::OPTION_ADDRESSREQUEST, &"10.0.0.10".parse::<Ipv4Addr>().unwrap());
        handle_request(&mut ctx, &request, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(
            leases.get(&"10.0.0.10".parse().unwrap()).unwrap().bindings.get("welcomed"),
            Some(&b"yes".to_vec())
        );
    }
}
