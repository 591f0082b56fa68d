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
 *  Low level networking abstractions shared between the dhcpd4 core and
 *  binary: address types, the timer dispatcher, and the packet socket
 *  abstraction that stands in for raw/BPF I/O on the platform.
 */

pub mod addr;
pub mod dispatcher;
pub mod iface;
pub mod socket;

pub use addr::{HwAddr, Ipv4Subnet, SubnetError, HWTYPE_ETHERNET, HWTYPE_FDDI, HWTYPE_TOKEN_RING};
pub use dispatcher::Dispatcher;
pub use iface::{local_interface_addrs, InterfaceAddr};
pub use socket::{PacketSocket, RecvPacket};
