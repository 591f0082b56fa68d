/*   Copyright 2021 Perry Lorier
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 *  SPDX-License-Identifier: Apache-2.0
 *
 *  Parsing/serialisation for a DHCP/BOOTP packet: the fixed BOOTP header,
 *  the magic cookie, and the TLV option stream (spec.md §6).
 */

use crate::dhcp::pktparser;
use dhcpd4_net::Ipv4Subnet;
use std::collections;
use std::fmt;
use std::net;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    UnexpectedEndOfInput,
    WrongMagic,
    InvalidPacket,
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedEndOfInput => write!(f, "unexpected end of input"),
            ParseError::WrongMagic => write!(f, "wrong magic cookie"),
            ParseError::InvalidPacket => write!(f, "invalid packet"),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
pub struct DhcpOp(pub u8);
pub const OP_BOOTREQUEST: DhcpOp = DhcpOp(1);
pub const OP_BOOTREPLY: DhcpOp = DhcpOp(2);

impl fmt::Debug for DhcpOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OP_BOOTREQUEST => write!(f, "BOOTREQUEST"),
            OP_BOOTREPLY => write!(f, "BOOTREPLY"),
            DhcpOp(x) => write!(f, "#{}", x),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct MessageType(pub u8);
pub const DHCPDISCOVER: MessageType = MessageType(1);
pub const DHCPOFFER: MessageType = MessageType(2);
pub const DHCPREQUEST: MessageType = MessageType(3);
pub const DHCPDECLINE: MessageType = MessageType(4);
pub const DHCPACK: MessageType = MessageType(5);
pub const DHCPNAK: MessageType = MessageType(6);
pub const DHCPRELEASE: MessageType = MessageType(7);
pub const DHCPINFORM: MessageType = MessageType(8);
pub const DHCPFORCERENEW: MessageType = MessageType(9);

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DHCPDISCOVER => write!(f, "DHCPDISCOVER"),
            DHCPOFFER => write!(f, "DHCPOFFER"),
            DHCPREQUEST => write!(f, "DHCPREQUEST"),
            DHCPDECLINE => write!(f, "DHCPDECLINE"),
            DHCPACK => write!(f, "DHCPACK"),
            DHCPNAK => write!(f, "DHCPNAK"),
            DHCPRELEASE => write!(f, "DHCPRELEASE"),
            DHCPINFORM => write!(f, "DHCPINFORM"),
            DHCPFORCERENEW => write!(f, "DHCPFORCERENEW"),
            MessageType(x) => write!(f, "#{}", x),
        }
    }
}

/// Option namespace identity (spec.md §3 "Universe"). Only the DHCP
/// universe has wire encode/decode support here; server-config and
/// vendor universes share the numeric-code space but never cross the
/// wire, so their definitions live in `crate::options`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Universe {
    Dhcp,
    Agent,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct DhcpOption(pub u8);

pub const OPTION_NETMASK: DhcpOption = DhcpOption(1);
pub const OPTION_ROUTERADDR: DhcpOption = DhcpOption(3);
pub const OPTION_NAMESERVER: DhcpOption = DhcpOption(5);
pub const OPTION_DOMAINSERVER: DhcpOption = DhcpOption(6);
pub const OPTION_HOSTNAME: DhcpOption = DhcpOption(12);
pub const OPTION_DOMAINNAME: DhcpOption = DhcpOption(15);
pub const OPTION_ROOTPATH: DhcpOption = DhcpOption(17);
pub const OPTION_BROADCAST: DhcpOption = DhcpOption(28);
pub const OPTION_STATICROUTE: DhcpOption = DhcpOption(33);
pub const OPTION_NTPSERVERS: DhcpOption = DhcpOption(42);
pub const OPTION_ADDRESSREQUEST: DhcpOption = DhcpOption(50);
pub const OPTION_LEASETIME: DhcpOption = DhcpOption(51);
pub const OPTION_OVERLOAD: DhcpOption = DhcpOption(52);
pub const OPTION_MSGTYPE: DhcpOption = DhcpOption(53);
pub const OPTION_SERVERID: DhcpOption = DhcpOption(54);
pub const OPTION_PARAMLIST: DhcpOption = DhcpOption(55);
pub const OPTION_MESSAGE: DhcpOption = DhcpOption(56);
pub const OPTION_MAXMSGSIZE: DhcpOption = DhcpOption(57);
pub const OPTION_RENEWALTIME: DhcpOption = DhcpOption(58);
pub const OPTION_REBINDTIME: DhcpOption = DhcpOption(59);
pub const OPTION_VENDOR_CLASS: DhcpOption = DhcpOption(60);
pub const OPTION_CLIENTID: DhcpOption = DhcpOption(61);
pub const OPTION_USERCLASS: DhcpOption = DhcpOption(77);
pub const OPTION_FQDN: DhcpOption = DhcpOption(81);
pub const OPTION_RELAYAGENT: DhcpOption = DhcpOption(82);
pub const OPTION_AUTHENTICATION: DhcpOption = DhcpOption(90);
pub const OPTION_SUBNETSELECT: DhcpOption = DhcpOption(104);
pub const OPTION_DOMAINSEARCH: DhcpOption = DhcpOption(119);
pub const OPTION_CIDRROUTE: DhcpOption = DhcpOption(121);

const OPT_INFO: &[(&str, DhcpOption, DhcpOptionType)] = &[
    ("subnet-mask", OPTION_NETMASK, DhcpOptionType::Ip),
    ("routers", OPTION_ROUTERADDR, DhcpOptionType::IpList),
    ("name-servers", OPTION_NAMESERVER, DhcpOptionType::IpList),
    ("domain-name-servers", OPTION_DOMAINSERVER, DhcpOptionType::IpList),
    ("host-name", OPTION_HOSTNAME, DhcpOptionType::String),
    ("domain-name", OPTION_DOMAINNAME, DhcpOptionType::String),
    ("root-path", OPTION_ROOTPATH, DhcpOptionType::String),
    ("broadcast-address", OPTION_BROADCAST, DhcpOptionType::Ip),
    ("static-routes", OPTION_STATICROUTE, DhcpOptionType::Unknown),
    ("ntp-servers", OPTION_NTPSERVERS, DhcpOptionType::IpList),
    ("dhcp-requested-address", OPTION_ADDRESSREQUEST, DhcpOptionType::Ip),
    ("dhcp-lease-time", OPTION_LEASETIME, DhcpOptionType::Seconds32),
    ("dhcp-option-overload", OPTION_OVERLOAD, DhcpOptionType::U8),
    ("dhcp-message-type", OPTION_MSGTYPE, DhcpOptionType::U8),
    ("dhcp-server-identifier", OPTION_SERVERID, DhcpOptionType::Ip),
    ("dhcp-parameter-request-list", OPTION_PARAMLIST, DhcpOptionType::Unknown),
    ("dhcp-message", OPTION_MESSAGE, DhcpOptionType::String),
    ("dhcp-max-message-size", OPTION_MAXMSGSIZE, DhcpOptionType::U16),
    ("dhcp-renewal-time", OPTION_RENEWALTIME, DhcpOptionType::Seconds32),
    ("dhcp-rebinding-time", OPTION_REBINDTIME, DhcpOptionType::Seconds32),
    ("vendor-class-identifier", OPTION_VENDOR_CLASS, DhcpOptionType::String),
    ("dhcp-client-identifier", OPTION_CLIENTID, DhcpOptionType::HwAddr),
    ("user-class", OPTION_USERCLASS, DhcpOptionType::String),
    ("fqdn", OPTION_FQDN, DhcpOptionType::String),
    ("relay-agent-information", OPTION_RELAYAGENT, DhcpOptionType::Unknown),
    ("authentication", OPTION_AUTHENTICATION, DhcpOptionType::Unknown),
    ("subnet-selection", OPTION_SUBNETSELECT, DhcpOptionType::Ip),
    ("domain-search", OPTION_DOMAINSEARCH, DhcpOptionType::DomainList),
    ("classless-static-routes", OPTION_CIDRROUTE, DhcpOptionType::Routes),
];

#[derive(Copy, Clone)]
pub enum DhcpOptionType {
    String,
    Ip,
    IpList,
    U8,
    U16,
    U32,
    Seconds32,
    HwAddr,
    Routes,
    DomainList,
    Unknown,
}

type IpList = Vec<net::Ipv4Addr>;
type U8Str = Vec<u8>;

impl DhcpOptionType {
    pub fn decode(&self, v: &[u8]) -> Option<DhcpOptionTypeValue> {
        match *self {
            DhcpOptionType::String => U8Str::parse_into(v)
                .map(|x| DhcpOptionTypeValue::String(String::from_utf8_lossy(&x).to_string())),
            DhcpOptionType::Ip => net::Ipv4Addr::parse_into(v).map(DhcpOptionTypeValue::Ip),
            DhcpOptionType::IpList => IpList::parse_into(v).map(DhcpOptionTypeValue::IpList),
            DhcpOptionType::U8 => u8::parse_into(v).map(DhcpOptionTypeValue::U8),
            DhcpOptionType::U16 => u16::parse_into(v).map(DhcpOptionTypeValue::U16),
            DhcpOptionType::U32 => u32::parse_into(v).map(DhcpOptionTypeValue::U32),
            DhcpOptionType::Seconds32 => u32::parse_into(v).map(DhcpOptionTypeValue::U32),
            DhcpOptionType::HwAddr => U8Str::parse_into(v).map(DhcpOptionTypeValue::HwAddr),
            DhcpOptionType::Routes => Vec::<Route>::parse_into(v).map(DhcpOptionTypeValue::Routes),
            DhcpOptionType::DomainList => {
                Vec::<String>::parse_into(v).map(DhcpOptionTypeValue::DomainList)
            }
            DhcpOptionType::Unknown => U8Str::parse_into(v).map(DhcpOptionTypeValue::Unknown),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DhcpOptionTypeValue {
    String(String),
    IpList(IpList),
    Ip(net::Ipv4Addr),
    U8(u8),
    U16(u16),
    U32(u32),
    HwAddr(Vec<u8>),
    Routes(Vec<Route>),
    DomainList(Vec<String>),
    Unknown(Vec<u8>),
}

impl DhcpOptionTypeValue {
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            DhcpOptionTypeValue::String(s) => s.as_bytes().to_vec(),
            DhcpOptionTypeValue::IpList(v) => v.iter().flat_map(|x| x.octets()).collect(),
            DhcpOptionTypeValue::Ip(i) => i.octets().to_vec(),
            DhcpOptionTypeValue::U8(x) => vec![*x],
            DhcpOptionTypeValue::U16(x) => x.to_be_bytes().to_vec(),
            DhcpOptionTypeValue::U32(x) => x.to_be_bytes().to_vec(),
            DhcpOptionTypeValue::HwAddr(x) => x.clone(),
            DhcpOptionTypeValue::Routes(v) => {
                let mut o = vec![];
                for i in v {
                    o.push(i.prefix.prefixlen);
                    o.extend(i.prefix.addr.octets());
                    o.extend(i.nexthop.octets());
                }
                o
            }
            DhcpOptionTypeValue::Unknown(v) => v.clone(),
            DhcpOptionTypeValue::DomainList(l) => {
                let mut o = vec![];
                for domain in l {
                    for label in domain.split('.') {
                        o.push(label.len() as u8);
                        o.extend(label.as_bytes());
                    }
                    o.push(0u8);
                }
                o
            }
        }
    }
}

impl fmt::Display for DhcpOptionTypeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhcpOptionTypeValue::String(s) => write!(f, "{}", s),
            DhcpOptionTypeValue::Ip(i) => i.fmt(f),
            DhcpOptionTypeValue::U8(i) => i.fmt(f),
            DhcpOptionTypeValue::U16(i) => i.fmt(f),
            DhcpOptionTypeValue::U32(i) => i.fmt(f),
            DhcpOptionTypeValue::IpList(l) => write!(
                f,
                "{}",
                l.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
            ),
            DhcpOptionTypeValue::HwAddr(x) => write!(
                f,
                "{}",
                x.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
            ),
            DhcpOptionTypeValue::Routes(l) => write!(
                f,
                "{}",
                l.iter()
                    .map(|i| format!("{}->{}", i.prefix, i.nexthop))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            DhcpOptionTypeValue::Unknown(v) => {
                write!(f, "{}", v.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(""))
            }
            DhcpOptionTypeValue::DomainList(v) => write!(f, "{}", v.join(",")),
        }
    }
}

impl DhcpOption {
    pub const fn new(opt: u8) -> Self {
        DhcpOption(opt)
    }

    pub fn get_type(&self) -> Option<DhcpOptionType> {
        OPT_INFO.iter().find(|(_, o, _)| o == self).map(|(_, _, t)| *t)
    }
}

pub fn name_to_option(lookup_name: &str) -> Option<DhcpOption> {
    OPT_INFO.iter().find(|(n, _, _)| *n == lookup_name).map(|(_, o, _)| *o)
}

impl fmt::Debug for DhcpOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match OPT_INFO.iter().find(|(_, o, _)| o == self) {
            Some((name, _, _)) => write!(f, "{}", name),
            None => write!(f, "#{}", self.0),
        }
    }
}

pub trait DhcpParse {
    type Item;
    fn parse_into(v: &[u8]) -> Option<Self::Item>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub prefix: Ipv4Subnet,
    pub nexthop: net::Ipv4Addr,
}

fn parse_ip_from_iter<I: Iterator<Item = u8>>(it: &mut I) -> Option<net::Ipv4Addr> {
    Some(net::Ipv4Addr::new(it.next()?, it.next()?, it.next()?, it.next()?))
}

impl DhcpParse for Vec<Route> {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self::Item> {
        let mut it = v.iter().copied();
        let mut ret = vec![];
        while let Some(prefixlen) = it.next() {
            let addr = parse_ip_from_iter(&mut it)?;
            let prefix = Ipv4Subnet::containing(addr, prefixlen).ok()?;
            let nexthop = parse_ip_from_iter(&mut it)?;
            ret.push(Route { prefix, nexthop });
        }
        Some(ret)
    }
}

impl DhcpParse for net::Ipv4Addr {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self::Item> {
        if v.len() != 4 {
            None
        } else {
            Some(net::Ipv4Addr::new(v[0], v[1], v[2], v[3]))
        }
    }
}

impl DhcpParse for IpList {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self::Item> {
        if v.len() % 4 != 0 {
            return None;
        }
        Some(v.chunks_exact(4).map(|c| net::Ipv4Addr::new(c[0], c[1], c[2], c[3])).collect())
    }
}

impl DhcpParse for Vec<u8> {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self> {
        Some(v.to_vec())
    }
}

impl DhcpParse for u32 {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self> {
        Some(v.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }
}

impl DhcpParse for u16 {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self> {
        Some(v.iter().fold(0u16, |acc, &b| (acc << 8) | b as u16))
    }
}

impl DhcpParse for u8 {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self> {
        if v.len() != 1 {
            None
        } else {
            v.first().copied()
        }
    }
}

impl DhcpParse for MessageType {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self> {
        if v.len() != 1 {
            None
        } else {
            Some(MessageType(v[0]))
        }
    }
}

impl DhcpParse for Vec<String> {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self> {
        let mut buf = pktparser::Buffer::new(v);
        Some(buf.get_domains()?.iter().map(|d| d.join(".")).collect())
    }
}

impl DhcpParse for String {
    type Item = Self;
    fn parse_into(v: &[u8]) -> Option<Self> {
        Some(String::from_utf8_lossy(v).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Eq)]
pub struct DhcpOptions {
    pub other: collections::HashMap<DhcpOption, Vec<u8>>,
}

impl DhcpOptions {
    pub fn get_raw_option(&self, option: &DhcpOption) -> Option<&[u8]> {
        self.other.get(option).map(|x| x.as_slice())
    }

    pub fn get_option<T: DhcpParse>(&self, option: &DhcpOption) -> Option<T::Item> {
        self.get_raw_option(option).and_then(T::parse_into)
    }

    pub fn get_serverid(&self) -> Option<net::Ipv4Addr> {
        self.get_option::<net::Ipv4Addr>(&OPTION_SERVERID)
    }

    pub fn get_clientid(&self) -> Option<Vec<u8>> {
        self.get_option::<Vec<u8>>(&OPTION_CLIENTID)
    }

    pub fn get_address_request(&self) -> Option<net::Ipv4Addr> {
        self.get_option::<net::Ipv4Addr>(&OPTION_ADDRESSREQUEST)
    }

    pub fn get_messagetype(&self) -> Option<MessageType> {
        self.get_option::<MessageType>(&OPTION_MSGTYPE)
    }

    pub fn get_hostname(&self) -> Option<String> {
        self.get_option::<String>(&OPTION_HOSTNAME)
    }

    pub fn get_parameter_request_list(&self) -> Vec<DhcpOption> {
        self.get_raw_option(&OPTION_PARAMLIST)
            .map(|v| v.iter().map(|&b| DhcpOption(b)).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn set_raw_option(mut self, option: &DhcpOption, value: &[u8]) -> Self {
        self.other.insert(*option, value.to_vec());
        self
    }

    #[must_use]
    pub fn set_option<T: Serialise>(self, option: &DhcpOption, value: &T) -> Self {
        let mut v = Vec::new();
        value.serialise(&mut v);
        self.set_raw_option(option, &v)
    }

    pub fn mutate_option_value(&mut self, option: &DhcpOption, value: &DhcpOptionTypeValue) {
        self.other.insert(*option, value.as_bytes());
    }

    #[must_use]
    pub fn remove_option(mut self, option: &DhcpOption) -> Self {
        self.other.remove(option);
        self
    }
}

#[derive(PartialEq, Eq, Clone)]
pub struct Dhcp {
    pub op: DhcpOp,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: net::Ipv4Addr,
    pub yiaddr: net::Ipv4Addr,
    pub siaddr: net::Ipv4Addr,
    pub giaddr: net::Ipv4Addr,
    pub chaddr: Vec<u8>,
    pub sname: Vec<u8>,
    pub file: Vec<u8>,
    pub options: DhcpOptions,
}

/// RFC 1542/2131 §4.1: the BROADCAST flag bit in the `flags` field.
pub const FLAG_BROADCAST: u16 = 0x8000;

impl Dhcp {
    pub fn broadcast_requested(&self) -> bool {
        self.flags & FLAG_BROADCAST != 0
    }

    pub fn get_client_id(&self) -> Vec<u8> {
        self.options.get_clientid().unwrap_or_else(|| self.chaddr.clone())
    }
}

impl fmt::Debug for Dhcp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dhcp")
            .field("op", &self.op)
            .field("xid", &format_args!("{:#010x}", self.xid))
            .field("ciaddr", &self.ciaddr)
            .field("yiaddr", &self.yiaddr)
            .field("giaddr", &self.giaddr)
            .field("chaddr", &self.chaddr.iter().map(|b| format!("{:02x}", b)).collect::<String>())
            .field("options", &self.options)
            .finish()
    }
}

fn null_terminated(mut v: Vec<u8>) -> Vec<u8> {
    if let Some(i) = v.iter().position(|&b| b == 0) {
        v.truncate(i);
    }
    v
}

pub fn parse_options(mut buf: pktparser::Buffer) -> Result<DhcpOptions, ParseError> {
    let mut raw_options: collections::HashMap<DhcpOption, Vec<u8>> = collections::HashMap::new();
    loop {
        match buf.get_u8() {
            Some(0) => (),
            Some(255) => break,
            Some(x) => {
                let l = buf.get_u8().ok_or(ParseError::UnexpectedEndOfInput)?;
                raw_options
                    .entry(DhcpOption(x))
                    .or_insert_with(Vec::new)
                    .extend(buf.get_bytes(l as usize).ok_or(ParseError::UnexpectedEndOfInput)?);
            }
            None => return Err(ParseError::UnexpectedEndOfInput),
        }
    }
    Ok(DhcpOptions { other: raw_options })
}

pub fn parse(pkt: &[u8]) -> Result<Dhcp, ParseError> {
    let mut buf = pktparser::Buffer::new(pkt);
    let op = buf.get_u8().ok_or(ParseError::UnexpectedEndOfInput)?;
    let htype = buf.get_u8().ok_or(ParseError::UnexpectedEndOfInput)?;
    let hlen = buf.get_u8().ok_or(ParseError::UnexpectedEndOfInput)?;
    let hops = buf.get_u8().ok_or(ParseError::UnexpectedEndOfInput)?;
    let xid = buf.get_be32().ok_or(ParseError::UnexpectedEndOfInput)?;
    let secs = buf.get_be16().ok_or(ParseError::UnexpectedEndOfInput)?;
    let flags = buf.get_be16().ok_or(ParseError::UnexpectedEndOfInput)?;
    let ciaddr = buf.get_ipv4().ok_or(ParseError::UnexpectedEndOfInput)?;
    let yiaddr = buf.get_ipv4().ok_or(ParseError::UnexpectedEndOfInput)?;
    let siaddr = buf.get_ipv4().ok_or(ParseError::UnexpectedEndOfInput)?;
    let giaddr = buf.get_ipv4().ok_or(ParseError::UnexpectedEndOfInput)?;
    let chaddr = buf.get_vec(16).ok_or(ParseError::UnexpectedEndOfInput)?;
    if hlen as usize > chaddr.len() {
        return Err(ParseError::InvalidPacket);
    }
    let sname = null_terminated(buf.get_vec(64).ok_or(ParseError::UnexpectedEndOfInput)?);
    let file = null_terminated(buf.get_vec(128).ok_or(ParseError::UnexpectedEndOfInput)?);
    let magic = buf.get_be32().ok_or(ParseError::UnexpectedEndOfInput)?;
    if magic != 0x6382_5363 {
        return Err(ParseError::WrongMagic);
    }
    let options = parse_options(buf)?;

    Ok(Dhcp {
        op: DhcpOp(op),
        htype,
        hlen,
        hops,
        xid,
        secs,
        flags,
        ciaddr,
        yiaddr,
        siaddr,
        giaddr,
        chaddr: chaddr[0..hlen as usize].to_vec(),
        sname,
        file,
        options,
    })
}

pub trait Serialise {
    fn serialise(&self, v: &mut Vec<u8>);
}

impl Serialise for u8 {
    fn serialise(&self, v: &mut Vec<u8>) {
        v.push(*self);
    }
}
impl Serialise for u16 {
    fn serialise(&self, v: &mut Vec<u8>) {
        v.extend(self.to_be_bytes());
    }
}
impl Serialise for u32 {
    fn serialise(&self, v: &mut Vec<u8>) {
        v.extend(self.to_be_bytes());
    }
}
impl Serialise for net::Ipv4Addr {
    fn serialise(&self, v: &mut Vec<u8>) {
        v.extend(self.octets());
    }
}
impl Serialise for DhcpOption {
    fn serialise(&self, v: &mut Vec<u8>) {
        self.0.serialise(v);
    }
}
impl Serialise for MessageType {
    fn serialise(&self, v: &mut Vec<u8>) {
        self.0.serialise(v);
    }
}
impl Serialise for String {
    fn serialise(&self, v: &mut Vec<u8>) {
        v.extend(self.as_bytes());
    }
}
impl Serialise for DhcpOptionTypeValue {
    fn serialise(&self, v: &mut Vec<u8>) {
        v.extend(self.as_bytes());
    }
}

fn serialise_option(option: DhcpOption, bytes: &[u8], v: &mut Vec<u8>) {
    option.serialise(v);
    (bytes.len() as u8).serialise(v);
    v.extend(bytes);
}

impl Serialise for DhcpOptions {
    fn serialise(&self, v: &mut Vec<u8>) {
        // DHCPMSGTYPE first, by convention, so a client that stops parsing
        // early still sees the reply type.
        if let Some(bytes) = self.other.get(&OPTION_MSGTYPE) {
            serialise_option(OPTION_MSGTYPE, bytes, v);
        }
        for (o, p) in self.other.iter().filter(|(o, _)| **o != OPTION_MSGTYPE) {
            serialise_option(*o, p, v);
        }
        255u8.serialise(v);
    }
}

fn serialise_fixed(out: &[u8], l: usize, v: &mut Vec<u8>) {
    let mut bytes = out.to_vec();
    bytes.resize(l, 0);
    v.extend(bytes);
}

impl Dhcp {
    pub fn serialise(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.op.0.serialise(&mut v);
        self.htype.serialise(&mut v);
        self.hlen.serialise(&mut v);
        self.hops.serialise(&mut v);
        self.xid.serialise(&mut v);
        self.secs.serialise(&mut v);
        self.flags.serialise(&mut v);
        self.ciaddr.serialise(&mut v);
        self.yiaddr.serialise(&mut v);
        self.siaddr.serialise(&mut v);
        self.giaddr.serialise(&mut v);
        serialise_fixed(&self.chaddr, 16, &mut v);
        serialise_fixed(&self.sname, 64, &mut v);
        serialise_fixed(&self.file, 128, &mut v);
        0x6382_5363u32.serialise(&mut v);
        self.options.serialise(&mut v);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_discover() {
        let pkt = Dhcp {
            op: OP_BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0xCAFE_BABE,
            secs: 0,
            flags: 0,
            ciaddr: net::Ipv4Addr::UNSPECIFIED,
            yiaddr: net::Ipv4Addr::UNSPECIFIED,
            siaddr: net::Ipv4Addr::UNSPECIFIED,
            giaddr: net::Ipv4Addr::UNSPECIFIED,
            chaddr: vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            sname: vec![],
            file: vec![],
            options: DhcpOptions::default().set_option(&OPTION_MSGTYPE, &DHCPDISCOVER),
        };
        let bytes = pkt.serialise();
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed.xid, 0xCAFE_BABE);
        assert_eq!(reparsed.options.get_messagetype(), Some(DHCPDISCOVER));
    }

    #[test]
    fn decode_ip_list() {
        assert_eq!(
            format!("{}", DhcpOptionType::IpList.decode(&[192, 0, 2, 12, 192, 0, 2, 17]).unwrap()),
            "192.0.2.12,192.0.2.17"
        );
    }

    #[test]
    fn decode_routes() {
        assert_eq!(
            format!(
                "{}",
                DhcpOptionType::Routes
                    .decode(&[24, 192, 0, 2, 0, 192, 0, 2, 254])
                    .unwrap()
            ),
            "192.0.2.0/24->192.0.2.254"
        );
    }
}
