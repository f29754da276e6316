//! Kernel routing table parsing
//!
//! `/proc/net/route` lists one route per line after a header. Destination and
//! gateway are printed as 8 hex digits in host byte order, so on little-endian
//! hosts `10.1.1.254` appears as `FE01010A`.

use std::net::Ipv4Addr;

use crate::{Error, Result};

/// Default location of the IPv4 routing table
pub const PROC_NET_ROUTE: &str = "/proc/net/route";

/// A single row of the routing table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// Outgoing interface name
    pub interface: String,
    /// Destination network
    pub destination: Ipv4Addr,
    /// Next hop
    pub gateway: Ipv4Addr,
}

impl Route {
    /// Whether this row is a default route
    pub fn is_default(&self) -> bool {
        self.destination.is_unspecified()
    }
}

/// Decode an 8 hex digit field into an address, reversing the byte order.
pub fn decode_hex_ipv4(field: &str) -> Result<Ipv4Addr> {
    let bytes = hex::decode(field)
        .map_err(|e| Error::malformed(format!("invalid hex address {:?}: {}", field, e)))?;
    let octets: [u8; 4] = bytes.try_into().map_err(|b: Vec<u8>| {
        Error::malformed(format!(
            "address {:?} is {} bytes, only IPv4 is supported",
            field,
            b.len()
        ))
    })?;
    Ok(Ipv4Addr::new(octets[3], octets[2], octets[1], octets[0]))
}

/// Parse the routing table text. The first line is a header and is skipped.
pub fn parse_routes(table: &str) -> Result<Vec<Route>> {
    let mut routes = Vec::new();

    for (index, line) in table.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(Error::malformed(format!(
                "route table line {} has {} fields, expected at least 3: {:?}",
                index + 1,
                fields.len(),
                line
            )));
        }
        routes.push(Route {
            interface: fields[0].to_string(),
            destination: decode_hex_ipv4(fields[1])?,
            gateway: decode_hex_ipv4(fields[2])?,
        });
    }

    Ok(routes)
}

/// Gateway of the default route in the given table.
///
/// With several default rows the last one listed wins; metrics are not
/// compared.
pub fn default_gateway(table: &str) -> Result<Ipv4Addr> {
    parse_routes(table)?
        .into_iter()
        .filter(Route::is_default)
        .last()
        .map(|route| route.gateway)
        .ok_or_else(|| Error::resolution("routing table has no default route"))
}
