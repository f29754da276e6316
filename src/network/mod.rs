//! Host network identity resolution
//!
//! Works out which interface, address, prefix length and default gateway the
//! node uses, without talking to the cluster. Everything here reads local
//! kernel state; a failure means the host network namespace is not what the
//! agent expects and the run is aborted.
//!
//! # vhost0
//!
//! On vrouter nodes the address has already been moved to `vhost0`, a virtual
//! device stacked on the physical NIC. The physical NIC keeps the same
//! hardware address, so when `vhost0` exists the interface reported is the
//! sibling sharing its MAC rather than the one carrying the IP.

pub mod route;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Name of the vrouter overlay interface
pub const VHOST_INTERFACE: &str = "vhost0";

/// Network identity of the node, built once per run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Node hostname
    pub hostname: String,
    /// Address the pod was scheduled with
    pub primary_ip: Ipv4Addr,
    /// Prefix length of `primary_ip`
    pub subnet_prefix_len: u8,
    /// Next hop of the default route
    pub default_gateway: Ipv4Addr,
    /// Physical interface carrying the node traffic
    pub interface_name: String,
}

/// A local interface and the IPv4 addresses assigned to it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetInterface {
    /// Interface name
    pub name: String,
    /// Hardware address, if the interface has one
    pub mac: Option<[u8; 6]>,
    /// Assigned addresses with their prefix lengths
    pub addresses: Vec<(Ipv4Addr, u8)>,
}

impl NetInterface {
    /// Whether `ip` is assigned to this interface
    pub fn has_address(&self, ip: Ipv4Addr) -> bool {
        self.addresses.iter().any(|(addr, _)| *addr == ip)
    }
}

/// Source of local interface information
#[cfg_attr(test, automock)]
pub trait InterfaceSource: Send + Sync {
    /// List local interfaces in kernel order
    fn interfaces(&self) -> Result<Vec<NetInterface>>;
}

/// Interfaces read with `getifaddrs(3)`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Result<Vec<NetInterface>> {
        let mut interfaces: Vec<NetInterface> = Vec::new();

        for ifaddr in nix::ifaddrs::getifaddrs().map_err(std::io::Error::from)? {
            let position = match interfaces
                .iter()
                .position(|i| i.name == ifaddr.interface_name)
            {
                Some(position) => position,
                None => {
                    interfaces.push(NetInterface {
                        name: ifaddr.interface_name.clone(),
                        ..Default::default()
                    });
                    interfaces.len() - 1
                }
            };
            let entry = &mut interfaces[position];

            let Some(address) = ifaddr.address else {
                continue;
            };
            if let Some(link) = address.as_link_addr() {
                if let Some(mac) = link.addr() {
                    entry.mac = Some(mac);
                }
            } else if let Some(sin) = address.as_sockaddr_in() {
                let ip = *SocketAddrV4::from(*sin).ip();
                let prefix = ifaddr
                    .netmask
                    .as_ref()
                    .and_then(|mask| mask.as_sockaddr_in())
                    .map(|mask| prefix_len(*SocketAddrV4::from(*mask).ip()))
                    .unwrap_or(32);
                entry.addresses.push((ip, prefix));
            }
        }

        Ok(interfaces)
    }
}

fn prefix_len(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Resolves the node [`Identity`] from local kernel state
pub struct NetworkIdentityResolver<S: InterfaceSource> {
    source: S,
    route_table: PathBuf,
    gateway_override: Option<Ipv4Addr>,
}

impl NetworkIdentityResolver<SystemInterfaces> {
    /// Resolver over the host's interfaces and `/proc/net/route`
    pub fn system() -> Self {
        Self::new(SystemInterfaces)
    }
}

impl<S: InterfaceSource> NetworkIdentityResolver<S> {
    /// Create a resolver reading interfaces from `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            route_table: PathBuf::from(route::PROC_NET_ROUTE),
            gateway_override: None,
        }
    }

    /// Read the routing table from another path
    pub fn with_route_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.route_table = path.into();
        self
    }

    /// Use an explicit gateway instead of the routing table
    pub fn with_gateway_override(mut self, gateway: Option<Ipv4Addr>) -> Self {
        self.gateway_override = gateway;
        self
    }

    /// Name of the physical interface for `target_ip`
    pub fn resolve_interface(&self, target_ip: Ipv4Addr) -> Result<String> {
        let interfaces = self.source.interfaces()?;

        if let Some(vhost) = interfaces.iter().find(|i| i.name == VHOST_INTERFACE) {
            let mac = vhost.mac.ok_or_else(|| {
                Error::resolution(format!("{} has no hardware address", VHOST_INTERFACE))
            })?;
            let sibling = interfaces
                .iter()
                .find(|i| i.name != VHOST_INTERFACE && i.mac == Some(mac))
                .ok_or_else(|| {
                    Error::resolution(format!(
                        "no interface shares hardware address {} with {}",
                        format_mac(&mac),
                        VHOST_INTERFACE
                    ))
                })?;
            debug!(interface = %sibling.name, mac = %format_mac(&mac), "resolved vhost0 sibling");
            return Ok(sibling.name.clone());
        }

        interfaces
            .iter()
            .find(|i| i.has_address(target_ip))
            .map(|i| i.name.clone())
            .ok_or_else(|| {
                Error::resolution(format!("no interface carries address {}", target_ip))
            })
    }

    /// Prefix length of `target_ip` on whichever interface holds it
    pub fn resolve_subnet_length(&self, target_ip: Ipv4Addr) -> Result<u8> {
        self.source
            .interfaces()?
            .iter()
            .flat_map(|i| i.addresses.iter())
            .find(|(addr, _)| *addr == target_ip)
            .map(|(_, prefix)| *prefix)
            .ok_or_else(|| Error::resolution(format!("address {} is not assigned locally", target_ip)))
    }

    /// Default gateway, from the override or the routing table
    pub fn resolve_default_gateway(&self) -> Result<Ipv4Addr> {
        if let Some(gateway) = self.gateway_override {
            debug!(%gateway, "using gateway override");
            return Ok(gateway);
        }
        let table = std::fs::read_to_string(&self.route_table).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", self.route_table.display(), e),
            )
        })?;
        route::default_gateway(&table)
    }

    /// Resolve the complete identity for `hostname` at `primary_ip`
    pub fn resolve(&self, hostname: &str, primary_ip: Ipv4Addr) -> Result<Identity> {
        let identity = Identity {
            hostname: hostname.to_string(),
            primary_ip,
            subnet_prefix_len: self.resolve_subnet_length(primary_ip)?,
            default_gateway: self.resolve_default_gateway()?,
            interface_name: self.resolve_interface(primary_ip)?,
        };
        info!(
            hostname = %identity.hostname,
            ip = %identity.primary_ip,
            prefix = identity.subnet_prefix_len,
            gateway = %identity.default_gateway,
            interface = %identity.interface_name,
            "resolved network identity"
        );
        Ok(identity)
    }
}

/// Kernel hostname of this node
pub fn local_hostname() -> Result<String> {
    let name = nix::unistd::gethostname().map_err(std::io::Error::from)?;
    name.into_string()
        .map_err(|raw| Error::resolution(format!("hostname {:?} is not valid UTF-8", raw)))
}
