//! Command line and environment configuration
//!
//! Every flag can also be set through the environment variable named next to
//! it, which is how the pod spec passes the downward API values in.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::bootstrap::{BootstrapConfig, ServiceKind};
use crate::issuer::{IssuerConfig, DEFAULT_SIGNER_NAME};
use crate::network::{local_hostname, route::PROC_NET_ROUTE};
use crate::pki::SubjectTemplate;
use crate::retry::RetryConfig;
use crate::telemetry::LogFormat;
use crate::wait::PollPolicy;
use crate::{Error, Result};

/// Resolve the node identity and obtain a signed node certificate
#[derive(Parser, Debug, Clone)]
#[command(name = "contrail-init", version, about, long_about = None, args_override_self = true)]
pub struct BootstrapArgs {
    /// Node hostname (defaults to the kernel hostname)
    #[arg(long, env = "HOSTNAME")]
    pub hostname: Option<String>,

    /// Namespace for the secret and config map
    #[arg(long, env = "NAMESPACE", default_value = "contrail")]
    pub namespace: String,

    /// Address the pod was scheduled with
    #[arg(long = "pod-ip", env = "PODIP")]
    pub pod_ip: Ipv4Addr,

    /// Name of the owning resource, used as prefix for every object
    #[arg(long, env = "OWNER_NAME")]
    pub owner_name: String,

    /// Service kind label of the owner (control, vrouter or cni)
    #[arg(long, env = "SERVICE_KIND")]
    pub service_kind: String,

    /// Default gateway override; read from the routing table when unset
    #[arg(long, env = "GATEWAY")]
    pub gateway: Option<Ipv4Addr>,

    /// Signer name placed on the certificate signing request
    #[arg(long, env = "SIGNER_NAME", default_value = DEFAULT_SIGNER_NAME)]
    pub signer_name: String,

    /// Path of the kernel IPv4 routing table
    #[arg(long, env = "ROUTE_TABLE_PATH", default_value = PROC_NET_ROUTE)]
    pub route_table: PathBuf,

    /// Seconds between polls of the signing request
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 2)]
    pub poll_interval_secs: u64,

    /// Deadline in seconds for each wait (0 waits forever)
    #[arg(long = "timeout-secs", env = "ISSUANCE_TIMEOUT_SECS", default_value_t = 600)]
    pub timeout_secs: u64,

    /// Attempts at a write that conflicts with an existing object
    #[arg(
        long,
        env = "CONFLICT_RETRIES",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub conflict_retries: u32,

    /// Do not publish the identity config map
    #[arg(long)]
    pub skip_identity_config: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl BootstrapArgs {
    /// Configured hostname, else the kernel hostname
    pub fn hostname(&self) -> Result<String> {
        match self.hostname.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => local_hostname(),
        }
    }

    /// Parsed service kind
    pub fn service_kind(&self) -> Result<ServiceKind> {
        self.service_kind.parse()
    }

    /// Poll interval and optional deadline
    pub fn poll_policy(&self) -> Result<PollPolicy> {
        if self.poll_interval_secs == 0 {
            return Err(Error::configuration("poll interval must be at least 1 second"));
        }
        Ok(PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            deadline: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        })
    }

    /// Backoff for conflicting writes
    pub fn conflict_retry(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(self.conflict_retries)
    }

    /// Issuer settings derived from the flags
    pub fn issuer_config(&self) -> Result<IssuerConfig> {
        let owner_name = self.owner_name.trim();
        if owner_name.is_empty() {
            return Err(Error::configuration("owner name must not be empty"));
        }
        if self.signer_name.trim().is_empty() {
            return Err(Error::configuration("signer name must not be empty"));
        }
        Ok(IssuerConfig {
            owner_name: owner_name.to_string(),
            signer_name: self.signer_name.clone(),
            subject: SubjectTemplate::default(),
            poll: self.poll_policy()?,
            conflict_retry: self.conflict_retry(),
        })
    }

    /// Full bootstrap settings
    pub fn bootstrap_config(&self) -> Result<BootstrapConfig> {
        Ok(BootstrapConfig {
            kind: self.service_kind()?,
            hostname: self.hostname()?,
            pod_ip: self.pod_ip,
            publish_identity: !self.skip_identity_config,
            issuer: self.issuer_config()?,
        })
    }
}
