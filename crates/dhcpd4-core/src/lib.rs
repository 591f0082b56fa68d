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
 *  Configuration parser, allocation engine, lease state machine and
 *  protocol handlers for an IPv4 DHCP/BOOTP server. `dhcpd4` (the binary
 *  crate) is a thin CLI shell around what's here.
 */

pub mod alloc;
pub mod billing;
pub mod config;
pub mod dhcp;
pub mod dns_hook;
pub mod error;
pub mod eval;
pub mod handlers;
pub mod journal;
pub mod lease;
pub mod metrics;
pub mod options;
pub mod server;

pub use config::{Model, ParseWarning, Parser};
pub use error::StartupError;
pub use server::{Server, ServerConfig};
