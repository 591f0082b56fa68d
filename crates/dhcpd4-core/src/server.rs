/*  Single-threaded cooperative event loop, spec.md §5. One task owns the
 *  model, lease table, billing table and journal; there is no
 *  `tokio::spawn` per packet the way a raw-socket server might do it —
 *  everything here runs to completion before the next `select!` branch is
 *  considered, so the allocation engine and lease state machine never
 *  need synchronization of their own. Timers are driven through
 *  `dhcpd4_net::Dispatcher`, the same contract the fallback socket's
 *  caller uses for retransmits.
 */
use crate::alloc::{self, LeaseTable};
use crate::billing::BillingTable;
use crate::config::ast::HookEvent;
use crate::config::model::Model;
use crate::dns_hook::{self, DnsUpdater};
use crate::eval::EvalEnv;
use crate::handlers::{self, ServerContext};
use crate::journal::Journal;
use dhcpd4_net::{Dispatcher, PacketSocket};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKey {
    /// Periodic sweep that moves due leases into `Expired`.
    Housekeeping,
}

pub struct ServerConfig {
    pub server_id: Ipv4Addr,
    pub default_lease_time: Duration,
    pub max_lease_time: Duration,
    pub offer_ttl: Duration,
    pub decline_quarantine: Duration,
    pub housekeeping_interval: Duration,
}

pub struct Server {
    model: Model,
    leases: LeaseTable,
    billing: BillingTable,
    journal: Journal,
    dns: Box<dyn DnsUpdater>,
    config: ServerConfig,
    dispatcher: Dispatcher<TimerKey, ()>,
}

impl Server {
    pub fn new(model: Model, leases: LeaseTable, journal: Journal, dns: Box<dyn DnsUpdater>, config: ServerConfig) -> Self {
        let mut billing = BillingTable::new();
        for (i, class) in model.classes.iter().enumerate() {
            if let Some(limit) = class.lease_limit {
                billing.set_limit(crate::config::model::ClassHandle(i), limit);
            }
        }
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_timeout(Instant::now() + config.housekeeping_interval, TimerKey::Housekeeping, ());
        Server { model, leases, billing, journal, dns, config, dispatcher }
    }

    /// Sweeps every lease whose `ends` has passed into `Expired`,
    /// matching spec.md §4.5's "due timer fires and the lease naturally
    /// lapses". Runs on `housekeeping_interval`, not per-packet.
    fn run_housekeeping(&mut self, now: SystemTime) {
        let addresses: Vec<Ipv4Addr> = self.leases.leases.keys().copied().collect();
        for addr in addresses {
            let was = self.leases.leases.get(&addr).unwrap().state;
            let hardware = self.leases.leases.get(&addr).unwrap().hardware.clone();
            let client_id = self.leases.leases.get(&addr).unwrap().client_id.clone();
            let host = match (&hardware, client_id.as_deref()) {
                (Some(hw), cid) => handlers::lookup_host(&self.model, hw, cid),
                (None, Some(cid)) => self.model.host_by_client_id(cid),
                (None, None) => None,
            };
            let known = host.is_some();
            let env = EvalEnv { request: None, known };
            let classes = handlers::matching_classes(&self.model, &env);
            let subnet_handle = self.model.subnet_for_addr(addr);
            let pool = subnet_handle.and_then(|s| alloc::pool_owning_address(&self.model, s, addr));

            let lease = self.leases.leases.get_mut(&addr).unwrap();
            lease.expire();
            if lease.state != was {
                if let Some(subnet_handle) = subnet_handle {
                    handlers::fire_lease_hooks(&self.model, subnet_handle, pool, host, &classes, HookEvent::Expiry, &env, lease);
                }
                self.journal.append(lease).ok();
            }
        }
        let _ = now;
    }

    async fn dispatch(&mut self, data: &[u8], reply_port: u16) -> Option<(Vec<u8>, SocketAddrV4, Option<Vec<u8>>)> {
        let request = crate::dhcp::dhcppkt::parse(data).ok()?;
        let now = dhcpd4_net::socket::now();
        let decline_quarantine = self.config.decline_quarantine;
        let mut ctx = ServerContext {
            model: &self.model,
            leases: &mut self.leases,
            billing: &mut self.billing,
            journal: &mut self.journal,
            server_id: self.config.server_id,
            default_lease_time: self.config.default_lease_time,
            max_lease_time: self.config.max_lease_time,
            offer_ttl: self.config.offer_ttl,
        };
        let reply = match request.options.get_messagetype() {
            Some(m) if m == crate::dhcp::dhcppkt::DHCPDISCOVER => handlers::handle_discover(&mut ctx, &request, now),
            Some(m) if m == crate::dhcp::dhcppkt::DHCPREQUEST => handlers::handle_request(&mut ctx, &request, now),
            Some(m) if m == crate::dhcp::dhcppkt::DHCPDECLINE => {
                handlers::handle_decline(&mut ctx, &request, now, decline_quarantine);
                None
            }
            Some(m) if m == crate::dhcp::dhcppkt::DHCPRELEASE => {
                handlers::handle_release(&mut ctx, &request, now);
                None
            }
            Some(m) if m == crate::dhcp::dhcppkt::DHCPINFORM => handlers::handle_inform(&ctx, &request),
            Some(other) => {
                log::warn!("unhandled message type {:?}", other);
                None
            }
            None if request.op == crate::dhcp::dhcppkt::OP_BOOTREQUEST => handlers::handle_bootrequest(&mut ctx, &request, now),
            None => None,
        };

        if let Some(lease) = self.leases.get(&reply.as_ref()?.yiaddr) {
            if let Some(update) = dns_hook::update_for_commit(lease) {
                if let Err(e) = self.dns.apply(&update).await {
                    log::warn!("DNS update failed: {}", e);
                }
            }
        }

        let reply = reply?;
        let dest = if reply.giaddr != Ipv4Addr::UNSPECIFIED {
            SocketAddrV4::new(reply.giaddr, 67)
        } else if reply.broadcast_requested() || reply.ciaddr == Ipv4Addr::UNSPECIFIED {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, reply_port)
        } else {
            SocketAddrV4::new(reply.ciaddr, reply_port)
        };
        Some((reply.serialise(), dest, None))
    }

    /// Runs forever, servicing inbound packets and the housekeeping
    /// timer. Returns only on a socket I/O error.
    pub async fn run(&mut self, socket: &dyn PacketSocket, client_port: u16) -> std::io::Result<()> {
        loop {
            let next_wake = self.dispatcher.next_deadline();
            let recv_fut = socket.recv();
            let timer_fut = async {
                match next_wake {
                    Some(when) => tokio::time::sleep_until(when.into()).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                pkt = recv_fut => {
                    let pkt = pkt?;
                    if let Some((buf, dest, link)) = self.dispatch(&pkt.data, client_port).await {
                        if let Err(e) = socket.send_to(&buf, dest, link.as_deref()).await {
                            log::warn!("failed to send reply to {}: {}", dest, e);
                        }
                    }
                }
                _ = timer_fut => {
                    let now = Instant::now();
                    for (key, ()) in self.dispatcher.poll(now) {
                        match key {
                            TimerKey::Housekeeping => {
                                self.run_housekeeping(dhcpd4_net::socket::now());
                                self.dispatcher.add_timeout(now + self.config.housekeeping_interval, TimerKey::Housekeeping, ());
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Pool, Scope, Subnet};
    use dhcpd4_net::Ipv4Subnet;

    fn sample_model() -> Model {
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
            rules: vec![],
            scope: Scope::default(),
        });
        model
    }

    fn sample_config() -> ServerConfig {
        ServerConfig {
            server_id: "10.0.0.1".parse().unwrap(),
            default_lease_time: Duration::from_secs(3600),
            max_lease_time: Duration::from_secs(86400),
            offer_ttl: Duration::from_secs(60),
            decline_quarantine: Duration::from_secs(3600),
            housekeeping_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn housekeeping_expires_due_leases() {
        let dir = std::env::temp_dir().join(format!("dhcpd4-server-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let journal = Journal::open(dir.join("leases.txt")).unwrap();
        let mut leases = LeaseTable::new();
        leases.entry("10.0.0.10".parse().unwrap()).commit(
            dhcpd4_net::HwAddr::ethernet([1; 6]),
            None,
            None,
            SystemTime::UNIX_EPOCH,
            Duration::from_secs(1),
        );
        let mut server = Server::new(sample_model(), leases, journal, Box::new(dns_hook::NullDnsUpdater), sample_config());
        server.run_housekeeping(SystemTime::UNIX_EPOCH + Duration::from_secs(10));
        assert_eq!(
            server.leases.get(&"10.0.0.10".parse().unwrap()).unwrap().state,
            crate::lease::LeaseState::Expired
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
