//! One bootstrap run for a node service pod
//!
//! The service kind is resolved once from configuration and decides which
//! config file key the node's identity is published under. Every kind then
//! runs the same two steps:
//!
//! 1. resolve the host network identity and obtain a signed certificate
//! 2. publish the identity into the owner's config map
//!
//! Identity publication can be turned off for deployments that render the
//! config file some other way.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::{upsert_config_map, ClusterApi};
use crate::issuer::{CertificateIssuer, IssuedCredentials, IssuerConfig};
use crate::network::{Identity, InterfaceSource, NetworkIdentityResolver};
use crate::{Error, Result};

/// Config file key used by the CNI plugin regardless of host
pub const CNI_CONFIG_FILE: &str = "10-contrail.conf";

/// Node service the pod belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Control plane node service
    Control,
    /// Forwarding plane agent
    Vrouter,
    /// Container network plugin
    Cni,
}

impl ServiceKind {
    /// Label value naming this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Vrouter => "vrouter",
            Self::Cni => "cni",
        }
    }

    /// Config map key the identity of `hostname` is written under
    pub fn config_file_name(&self, hostname: &str) -> String {
        match self {
            Self::Cni => CNI_CONFIG_FILE.to_string(),
            kind => format!("{}-{}.conf", kind.as_str(), hostname),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "control" => Ok(Self::Control),
            "vrouter" => Ok(Self::Vrouter),
            "cni" => Ok(Self::Cni),
            other => Err(Error::configuration(format!(
                "unknown service kind {:?}, expected one of control, vrouter, cni",
                other
            ))),
        }
    }
}

/// Name of the config map holding identities for `owner`
pub fn config_map_name(owner: &str) -> String {
    format!("{}-configmap", owner)
}

/// Everything the bootstrapper needs besides cluster access
#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    /// Service the pod runs
    pub kind: ServiceKind,
    /// Node hostname
    pub hostname: String,
    /// Address the pod was scheduled with
    pub pod_ip: Ipv4Addr,
    /// Write the identity config map after issuance
    pub publish_identity: bool,
    /// Issuer settings
    pub issuer: IssuerConfig,
}

/// Outcome of a successful run
#[derive(Debug)]
pub struct BootstrapReport {
    /// Resolved identity
    pub identity: Identity,
    /// Issued and stored credentials
    pub credentials: IssuedCredentials,
    /// Config map the identity was written to, if published
    pub config_map: Option<String>,
}

/// Runs the bootstrap steps for one pod
pub struct Bootstrapper {
    api: Arc<dyn ClusterApi>,
    config: BootstrapConfig,
}

impl Bootstrapper {
    /// Create a bootstrapper over `api`
    pub fn new(api: Arc<dyn ClusterApi>, config: BootstrapConfig) -> Self {
        Self { api, config }
    }

    /// Resolve identity, issue the certificate and publish the identity
    pub async fn run<S: InterfaceSource>(
        &self,
        resolver: &NetworkIdentityResolver<S>,
        cancel: &CancellationToken,
    ) -> Result<BootstrapReport> {
        let cfg = &self.config;
        info!(
            kind = %cfg.kind,
            host = %cfg.hostname,
            pod_ip = %cfg.pod_ip,
            "starting bootstrap"
        );

        let identity = resolver.resolve(&cfg.hostname, cfg.pod_ip)?;

        let issuer = CertificateIssuer::new(self.api.clone(), cfg.issuer.clone());
        let credentials = issuer.issue(&identity, cancel).await?;

        let config_map = if cfg.publish_identity {
            Some(self.publish_identity(&identity, cancel).await?)
        } else {
            info!("identity publication disabled");
            None
        };

        info!(
            kind = %cfg.kind,
            host = %identity.hostname,
            secret = %credentials.secret_name,
            "bootstrap complete"
        );

        Ok(BootstrapReport {
            identity,
            credentials,
            config_map,
        })
    }

    /// Write `identity` as JSON under the kind's config file key
    pub async fn publish_identity(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let name = config_map_name(&self.config.issuer.owner_name);
        let key = self.config.kind.config_file_name(&identity.hostname);
        let body = serde_json::to_string_pretty(identity)
            .map_err(|e| Error::serialization(format!("failed to encode identity: {}", e)))?;

        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.clone(), body)])),
            ..Default::default()
        };

        upsert_config_map(
            self.api.as_ref(),
            &config_map,
            &self.config.issuer.conflict_retry,
            cancel,
        )
        .await?;
        info!(config_map = %name, key = %key, "published node identity");
        Ok(name)
    }
}
