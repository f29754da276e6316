//! Shared fixtures

use std::io::Write;
use std::net::Ipv4Addr;

use tempfile::NamedTempFile;

use contrail_init::network::{Identity, InterfaceSource, NetInterface};
use contrail_init::Result;

/// Routing table with a default route through 10.1.1.254 on eth0
pub const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t00000000\tFE01010A\t0003\t0\t0\t100\t00000000\t0\t0\t0
eth0\t0001010A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
";

/// Interface list served from memory
pub struct StaticInterfaces(pub Vec<NetInterface>);

impl InterfaceSource for StaticInterfaces {
    fn interfaces(&self) -> Result<Vec<NetInterface>> {
        Ok(self.0.clone())
    }
}

/// Build an interface entry
pub fn iface(name: &str, mac: Option<[u8; 6]>, addresses: &[(Ipv4Addr, u8)]) -> NetInterface {
    NetInterface {
        name: name.to_string(),
        mac,
        addresses: addresses.to_vec(),
    }
}

/// Route table file that is removed when dropped
pub fn route_table_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

/// A typical worker node identity
pub fn worker_identity() -> Identity {
    Identity {
        hostname: "worker-1".to_string(),
        primary_ip: Ipv4Addr::new(10, 1, 1, 5),
        subnet_prefix_len: 24,
        default_gateway: Ipv4Addr::new(10, 1, 1, 254),
        interface_name: "eth0".to_string(),
    }
}
