//! Stories about reading the default gateway from the kernel routing table

use std::net::Ipv4Addr;

use contrail_init::network::route::{decode_hex_ipv4, default_gateway, parse_routes};
use contrail_init::network::NetworkIdentityResolver;
use contrail_init::Error;

use super::helpers::{route_table_file, StaticInterfaces, ROUTE_TABLE};

#[test]
fn story_gateway_comes_from_the_default_route() {
    assert_eq!(
        default_gateway(ROUTE_TABLE).unwrap(),
        Ipv4Addr::new(10, 1, 1, 254)
    );
}

#[test]
fn addresses_are_little_endian_hex() {
    assert_eq!(decode_hex_ipv4("0101010A").unwrap(), Ipv4Addr::new(10, 1, 1, 1));
    assert_eq!(decode_hex_ipv4("FE01010A").unwrap(), Ipv4Addr::new(10, 1, 1, 254));
    assert!(matches!(decode_hex_ipv4("0101"), Err(Error::MalformedInput(_))));
    assert!(matches!(decode_hex_ipv4("ZZ01010A"), Err(Error::MalformedInput(_))));
}

/// Story: a host with a second default route uses the last one listed
#[test]
fn story_last_default_route_wins() {
    let table = format!(
        "{}eth1\t00000000\t0102010A\t0003\t0\t0\t200\t00000000\t0\t0\t0\n",
        ROUTE_TABLE
    );
    assert_eq!(default_gateway(&table).unwrap(), Ipv4Addr::new(10, 1, 2, 1));
}

#[test]
fn truncated_rows_are_rejected() {
    let table = "Iface\tDestination\tGateway\neth0\t00000000\n";
    assert!(matches!(parse_routes(table), Err(Error::MalformedInput(_))));
}

#[test]
fn table_without_default_route_is_a_resolution_error() {
    let table = "Iface\tDestination\tGateway\neth0\t0001010A\t00000000\n";
    assert!(matches!(default_gateway(table), Err(Error::Resolution(_))));
}

#[test]
fn story_resolver_reads_the_configured_table_file() {
    let table = route_table_file(ROUTE_TABLE);
    let resolver =
        NetworkIdentityResolver::new(StaticInterfaces(vec![])).with_route_table(table.path());

    assert_eq!(
        resolver.resolve_default_gateway().unwrap(),
        Ipv4Addr::new(10, 1, 1, 254)
    );
}

#[test]
fn missing_table_file_names_the_path() {
    let resolver = NetworkIdentityResolver::new(StaticInterfaces(vec![]))
        .with_route_table("/nonexistent/contrail/route");

    match resolver.resolve_default_gateway() {
        Err(Error::Io(e)) => assert!(e.to_string().contains("/nonexistent/contrail/route")),
        other => panic!("Expected Io error, got {:?}", other),
    }
}
