//! Kubernetes objects the agent reads and writes
//!
//! [`ClusterApi`] is the narrow surface the issuer and bootstrapper need from
//! the API server. [`KubeClusterApi`] implements it with kube-rs; tests use the
//! generated `MockClusterApi`.
//!
//! Response codes are mapped once here: 404 on reads becomes `None`, 409 on
//! create or replace becomes [`Error::Conflict`]. Everything else surfaces as
//! [`Error::Kube`].

use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::Error;

/// Trait abstracting the cluster API calls made during bootstrap
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a certificate signing request, `None` if it does not exist
    async fn get_request(&self, name: &str) -> Result<Option<CertificateSigningRequest>, Error>;

    /// Create a certificate signing request
    async fn create_request(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error>;

    /// Replace the approval subresource with the conditions carried by `csr`
    async fn approve_request(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error>;

    /// Delete a certificate signing request
    async fn delete_request(&self, name: &str) -> Result<(), Error>;

    /// Fetch a secret, `None` if it does not exist
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, Error>;

    /// Create a secret
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, Error>;

    /// Replace an existing secret
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, Error>;

    /// Fetch a config map, `None` if it does not exist
    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, Error>;

    /// Create a config map
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;

    /// Replace an existing config map
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;
}

/// Real Kubernetes client implementation
///
/// Secrets and config maps live in `namespace`; signing requests are cluster
/// scoped.
pub struct KubeClusterApi {
    client: Client,
    namespace: String,
}

impl KubeClusterApi {
    /// Create a new KubeClusterApi wrapping the given kube Client
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn requests(&self) -> Api<CertificateSigningRequest> {
        Api::all(self.client.clone())
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

fn object_name(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Result<&str, Error> {
    meta.name
        .as_deref()
        .ok_or_else(|| Error::configuration("object has no metadata.name"))
}

fn map_conflict(kind: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => {
            Error::conflict(format!("{} {} conflicts with an existing object", kind, name))
        }
        e => Error::Kube(e),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_request(&self, name: &str) -> Result<Option<CertificateSigningRequest>, Error> {
        Ok(self.requests().get_opt(name).await?)
    }

    async fn create_request(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error> {
        let name = object_name(&csr.metadata)?;
        debug!(csr = %name, "creating certificate signing request");
        self.requests()
            .create(&PostParams::default(), csr)
            .await
            .map_err(|e| map_conflict("CertificateSigningRequest", name, e))
    }

    async fn approve_request(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error> {
        let name = object_name(&csr.metadata)?;
        let body = serde_json::to_vec(csr).map_err(|e| Error::serialization(e.to_string()))?;
        Ok(self
            .requests()
            .replace_subresource("approval", name, &PostParams::default(), body)
            .await?)
    }

    async fn delete_request(&self, name: &str) -> Result<(), Error> {
        self.requests().delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self.secrets().get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, Error> {
        let name = object_name(&secret.metadata)?;
        self.secrets()
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| map_conflict("Secret", name, e))
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, Error> {
        let name = object_name(&secret.metadata)?;
        self.secrets()
            .replace(name, &PostParams::default(), secret)
            .await
            .map_err(|e| map_conflict("Secret", name, e))
    }

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, Error> {
        Ok(self.config_maps().get_opt(name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let name = object_name(&config_map.metadata)?;
        self.config_maps()
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|e| map_conflict("ConfigMap", name, e))
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        let name = object_name(&config_map.metadata)?;
        self.config_maps()
            .replace(name, &PostParams::default(), config_map)
            .await
            .map_err(|e| map_conflict("ConfigMap", name, e))
    }
}

/// Create `secret`, or merge its entries into the existing one.
///
/// Entries already present under other keys are kept, so hosts sharing one
/// secret do not erase each other's bundles. The existing object's
/// `resourceVersion` is sent back, making the replace conditional. When a
/// concurrent writer wins (409 on create or replace), the object is read
/// again and the merge repeated with `retry`'s backoff.
pub async fn upsert_secret(
    api: &dyn ClusterApi,
    secret: &Secret,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let name = object_name(&secret.metadata)?;
    retry_with_backoff(retry, "upsert_secret", cancel, Error::is_retryable, || {
        merge_secret(api, name, secret)
    })
    .await
}

async fn merge_secret(api: &dyn ClusterApi, name: &str, secret: &Secret) -> Result<(), Error> {
    match api.get_secret(name).await? {
        Some(mut existing) => {
            debug!(secret = %name, "updating secret");
            if let Some(data) = &secret.data {
                existing
                    .data
                    .get_or_insert_with(Default::default)
                    .extend(data.clone());
            }
            api.update_secret(&existing).await?;
        }
        None => {
            debug!(secret = %name, "creating secret");
            api.create_secret(secret).await?;
        }
    }
    Ok(())
}

/// Create `config_map`, or merge its entries into the existing one.
///
/// Conflicts are retried the same way as [`upsert_secret`].
pub async fn upsert_config_map(
    api: &dyn ClusterApi,
    config_map: &ConfigMap,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let name = object_name(&config_map.metadata)?;
    retry_with_backoff(retry, "upsert_config_map", cancel, Error::is_retryable, || {
        merge_config_map(api, name, config_map)
    })
    .await
}

async fn merge_config_map(
    api: &dyn ClusterApi,
    name: &str,
    config_map: &ConfigMap,
) -> Result<(), Error> {
    match api.get_config_map(name).await? {
        Some(mut existing) => {
            debug!(config_map = %name, "updating config map");
            if let Some(data) = &config_map.data {
                existing
                    .data
                    .get_or_insert_with(Default::default)
                    .extend(data.clone());
            }
            api.update_config_map(&existing).await?;
        }
        None => {
            debug!(config_map = %name, "creating config map");
            api.create_config_map(config_map).await?;
        }
    }
    Ok(())
}
