//! Stories about resolving the node identity

use std::net::Ipv4Addr;

use contrail_init::network::{Identity, NetworkIdentityResolver};
use contrail_init::Error;

use super::helpers::{iface, route_table_file, StaticInterfaces, ROUTE_TABLE};

const NIC_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0xab, 0xcd, 0xef];

/// Story: a vrouter node has moved its address onto vhost0
#[test]
fn story_vrouter_node_reports_the_physical_nic() {
    let ip = Ipv4Addr::new(10, 1, 1, 5);
    let source = StaticInterfaces(vec![
        iface("lo", None, &[(Ipv4Addr::LOCALHOST, 8)]),
        iface("eth1", Some(NIC_MAC), &[]),
        iface("vhost0", Some(NIC_MAC), &[(ip, 24)]),
    ]);
    let table = route_table_file(ROUTE_TABLE);
    let resolver = NetworkIdentityResolver::new(source).with_route_table(table.path());

    let identity = resolver.resolve("worker-1", ip).unwrap();

    assert_eq!(
        identity,
        Identity {
            hostname: "worker-1".to_string(),
            primary_ip: ip,
            subnet_prefix_len: 24,
            default_gateway: Ipv4Addr::new(10, 1, 1, 254),
            interface_name: "eth1".to_string(),
        }
    );
}

/// Story: a control node without vrouter uses the interface holding its IP
#[test]
fn story_control_node_uses_the_addressed_interface() {
    let ip = Ipv4Addr::new(172, 16, 0, 10);
    let source = StaticInterfaces(vec![
        iface("eth0", Some(NIC_MAC), &[(ip, 16)]),
        iface("eth1", Some([0, 0, 0, 0, 0, 1]), &[(Ipv4Addr::new(192, 168, 1, 2), 24)]),
    ]);
    let resolver = NetworkIdentityResolver::new(source)
        .with_gateway_override(Some(Ipv4Addr::new(172, 16, 0, 1)));

    let identity = resolver.resolve("control-1", ip).unwrap();

    assert_eq!(identity.interface_name, "eth0");
    assert_eq!(identity.subnet_prefix_len, 16);
    assert_eq!(identity.default_gateway, Ipv4Addr::new(172, 16, 0, 1));
}

#[test]
fn address_not_on_this_host_is_a_resolution_error() {
    let source = StaticInterfaces(vec![iface(
        "eth0",
        Some(NIC_MAC),
        &[(Ipv4Addr::new(10, 0, 0, 2), 24)],
    )]);
    let resolver = NetworkIdentityResolver::new(source)
        .with_gateway_override(Some(Ipv4Addr::new(10, 0, 0, 1)));

    assert!(matches!(
        resolver.resolve("node", Ipv4Addr::new(10, 9, 9, 9)),
        Err(Error::Resolution(_))
    ));
}

#[test]
fn identity_json_uses_camel_case() {
    let identity = super::helpers::worker_identity();
    let json = serde_json::to_value(&identity).unwrap();

    assert_eq!(json["primaryIp"], "10.1.1.5");
    assert_eq!(json["subnetPrefixLen"], 24);
    assert_eq!(json["defaultGateway"], "10.1.1.254");
    assert_eq!(json["interfaceName"], "eth0");
}
