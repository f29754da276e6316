//! Stories about configuring a run from flags

use std::net::Ipv4Addr;
use std::time::Duration;

use clap::Parser;
use contrail_init::bootstrap::ServiceKind;
use contrail_init::config::BootstrapArgs;
use contrail_init::issuer::DEFAULT_SIGNER_NAME;
use contrail_init::Error;

/// Story: the daemonset passes only the required values
#[test]
fn story_minimal_flags_use_defaults() {
    let args = BootstrapArgs::try_parse_from([
        "contrail-init",
        "--hostname",
        "worker-1",
        "--pod-ip",
        "10.1.1.5",
        "--owner-name",
        "cni1",
        "--service-kind",
        "cni",
        "--signer-name",
        DEFAULT_SIGNER_NAME,
    ])
    .unwrap();

    let config = args.bootstrap_config().unwrap();
    assert_eq!(config.kind, ServiceKind::Cni);
    assert_eq!(config.pod_ip, Ipv4Addr::new(10, 1, 1, 5));
    assert_eq!(config.issuer.signer_name, DEFAULT_SIGNER_NAME);
    assert_eq!(config.issuer.conflict_retry.max_attempts, 5);
    assert_eq!(config.issuer.poll.interval, Duration::from_secs(2));
    assert_eq!(config.issuer.poll.deadline, Some(Duration::from_secs(600)));
    assert_eq!(
        config.kind.config_file_name(&config.hostname),
        "10-contrail.conf"
    );
}

#[test]
fn malformed_pod_ip_is_a_usage_error() {
    let result = BootstrapArgs::try_parse_from([
        "contrail-init",
        "--pod-ip",
        "not-an-ip",
        "--owner-name",
        "o",
        "--service-kind",
        "vrouter",
    ]);
    assert!(result.is_err());
}

#[test]
fn unsupported_kind_is_a_configuration_error() {
    let args = BootstrapArgs::try_parse_from([
        "contrail-init",
        "--hostname",
        "worker-1",
        "--pod-ip",
        "10.1.1.5",
        "--owner-name",
        "o",
        "--service-kind",
        "webui",
    ])
    .unwrap();

    assert!(matches!(args.service_kind(), Err(Error::Configuration(_))));
}
