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
 *  CLI shell: load the configuration, replay the lease journal, bind a
 *  socket and hand both to `dhcpd4_core::Server`. Everything that knows
 *  about DHCP semantics lives in the core crate; this file only knows
 *  about processes, files and exit codes.
 */
use clap::Parser as ClapParser;
use dhcpd4_core::error::StartupError;
use dhcpd4_core::{Model, Parser, Server, ServerConfig};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(ClapParser, Debug)]
#[command(name = "dhcpd4", about = "IPv4 DHCP/BOOTP server", version)]
struct Args {
    /// Path to the configuration file.
    #[arg(short = 'c', long, default_value = "/etc/dhcpd4/dhcpd4.conf")]
    config: PathBuf,

    /// Path to the lease journal.
    #[arg(short = 'l', long, default_value = "/var/lib/dhcpd4/leases.txt")]
    lease_file: PathBuf,

    /// Address to identify this server with in replies (OPTION_SERVERID).
    #[arg(long)]
    server_id: Ipv4Addr,

    /// Parse the configuration and exit without binding a socket.
    #[arg(short = 't', long)]
    check_only: bool,

    /// UDP port to listen for client requests on.
    #[arg(long, default_value_t = 67)]
    port: u16,

    /// UDP port replies are addressed to.
    #[arg(long, default_value_t = 68)]
    client_port: u16,

    #[arg(long, default_value_t = 3600)]
    default_lease_time: u64,

    #[arg(long, default_value_t = 86400)]
    max_lease_time: u64,
}

fn load_model(path: &std::path::Path) -> Result<Model, StartupError> {
    let src = std::fs::read_to_string(path).map_err(|source| StartupError::ConfigOpen { path: path.to_path_buf(), source })?;
    let (model, warnings) = Parser::new(&src).parse();
    for w in &warnings {
        log::warn!("{}: {}", path.display(), w.message);
    }
    if !warnings.is_empty() {
        return Err(StartupError::ConfigParse { warnings: warnings.len() });
    }
    Ok(model)
}

async fn run(args: Args) -> Result<(), StartupError> {
    let model = load_model(&args.config)?;
    log::info!("{}: {} subnet(s), {} host(s), {} class(es)", args.config.display(), model.subnets.len(), model.hosts.len(), model.classes.len());

    if args.check_only {
        return Ok(());
    }

    let leases = dhcpd4_core::journal::Journal::load(&args.lease_file)
        .map_err(|source| StartupError::ConfigOpen { path: args.lease_file.clone(), source })?;
    let journal = dhcpd4_core::journal::Journal::open(&args.lease_file)
        .map_err(|source| StartupError::ConfigOpen { path: args.lease_file.clone(), source })?;
    let mut lease_table = dhcpd4_core::alloc::LeaseTable::new();
    lease_table.leases = leases;

    let config = ServerConfig {
        server_id: args.server_id,
        default_lease_time: Duration::from_secs(args.default_lease_time),
        max_lease_time: Duration::from_secs(args.max_lease_time),
        offer_ttl: Duration::from_secs(10),
        decline_quarantine: Duration::from_secs(600),
        housekeeping_interval: Duration::from_secs(30),
    };

    let socket = dhcpd4_net::socket::FallbackSocket::bind("dhcpd4", args.port)
        .await
        .map_err(|source| StartupError::SocketBind { interface: "0.0.0.0".into(), source })?;

    let mut server = Server::new(model, lease_table, journal, Box::new(dhcpd4_core::dns_hook::NullDnsUpdater), config);
    log::info!("listening on port {}", args.port);
    server.run(&socket, args.client_port).await.map_err(|source| StartupError::SocketBind { interface: "0.0.0.0".into(), source })
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
