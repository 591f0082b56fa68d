/*  The packet I/O ABI the core depends on (spec.md §6): `receive`, `send`,
 *  `now`. Raw sockets / BPF are a platform concern and out of scope here;
 *  `FallbackSocket` gives the workspace a real, runnable implementation
 *  backed by an ordinary UDP socket — spec.md's "Fallback interface".
 */
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::SystemTime;
use tokio::net::UdpSocket;

#[derive(Debug, Clone)]
pub struct RecvPacket {
    pub data: Vec<u8>,
    pub from_addr: SocketAddrV4,
    /// Link-layer source, when the transport can report one. The fallback
    /// UDP socket never can; a raw-socket implementation would fill this
    /// in from the Ethernet header.
    pub from_link: Option<Vec<u8>>,
}

#[async_trait::async_trait]
pub trait PacketSocket: Send + Sync {
    async fn recv(&self) -> std::io::Result<RecvPacket>;

    async fn send_to(
        &self,
        buf: &[u8],
        to_addr: SocketAddrV4,
        to_link: Option<&[u8]>,
    ) -> std::io::Result<()>;

    fn interface_name(&self) -> &str;
}

pub fn now() -> SystemTime {
    SystemTime::now()
}

/// A virtual interface backed by an ordinary UDP socket, bound to the
/// given port on all addresses with broadcast enabled. Used when raw
/// packet I/O cannot reach a destination (no privilege, no interface
/// support), per spec.md §6/glossary.
pub struct FallbackSocket {
    name: String,
    sock: UdpSocket,
}

impl FallbackSocket {
    pub async fn bind(name: &str, port: u16) -> std::io::Result<Self> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        sock.set_broadcast(true)?;
        Ok(FallbackSocket {
            name: name.to_string(),
            sock,
        })
    }
}

#[async_trait::async_trait]
impl PacketSocket for FallbackSocket {
    async fn recv(&self) -> std::io::Result<RecvPacket> {
        let mut buf = vec![0u8; 1500];
        let (len, from) = self.sock.recv_from(&mut buf).await?;
        buf.truncate(len);
        let from_addr = match from {
            std::net::SocketAddr::V4(v4) => v4,
            std::net::SocketAddr::V6(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "DHCPv4 socket received an IPv6 datagram",
                ))
            }
        };
        Ok(RecvPacket {
            data: buf,
            from_addr,
            from_link: None,
        })
    }

    async fn send_to(
        &self,
        buf: &[u8],
        to_addr: SocketAddrV4,
        _to_link: Option<&[u8]>,
    ) -> std::io::Result<()> {
        self.sock.send_to(buf, to_addr).await?;
        Ok(())
    }

    fn interface_name(&self) -> &str {
        &self.name
    }
}
