//! Certificate issuance through the Kubernetes certificates API
//!
//! The node generates its own key, files a `CertificateSigningRequest`,
//! approves it itself and waits for the configured signer to attach a
//! certificate. The signed chain and the key are then written to a Secret
//! under deterministic names so re-running on the same host overwrites the
//! previous bundle instead of accumulating new ones.
//!
//! The request object is released on every path once it has been created.

mod state;

pub use state::{Issuance, IssuanceState};

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestSpec,
    CertificateSigningRequestStatus,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{upsert_secret, ClusterApi};
use crate::network::Identity;
use crate::pki::{
    validate_certificate_pem, CertificateRequest, CredentialBundle, KeyMaterial, SubjectTemplate,
};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::wait::{wait_for, PollPolicy};
use crate::{Error, Result};

/// Signer the request is addressed to unless configured otherwise
pub const DEFAULT_SIGNER_NAME: &str = "contrail.juniper.net/node-signer";

/// Group recorded on every request
pub const REQUEST_GROUP: &str = "system:authenticated";

/// Key usages requested for the node certificate
pub const REQUEST_USAGES: [&str; 4] = [
    "digital signature",
    "key encipherment",
    "server auth",
    "client auth",
];

/// Condition reason written on approval
pub const APPROVAL_REASON: &str = "ContrailApprove";

/// Condition message written on approval
pub const APPROVAL_MESSAGE: &str = "This Certificate was approved by operator approve.";

/// Name of the request object for `hostname`
pub fn request_name(owner: &str, hostname: &str) -> String {
    format!("{}-csr-{}", owner, hostname)
}

/// Name of the Secret holding every host's bundle for `owner`
pub fn secret_name(owner: &str) -> String {
    format!("{}-secret", owner)
}

/// Secret key holding the private key alone
pub fn key_entry(owner: &str, hostname: &str) -> String {
    format!("{}-key-{}.pem", owner, hostname)
}

/// Secret key holding certificate followed by key
pub fn bundle_entry(owner: &str, hostname: &str) -> String {
    format!("{}-pem-{}.pem", owner, hostname)
}

/// Issuer settings
#[derive(Clone, Debug)]
pub struct IssuerConfig {
    /// Name of the owning resource, prefix of every object name
    pub owner_name: String,
    /// `spec.signerName` of the request
    pub signer_name: String,
    /// Fixed subject attributes
    pub subject: SubjectTemplate,
    /// Polling for both waits
    pub poll: PollPolicy,
    /// Backoff while a request with the same name still exists
    pub conflict_retry: RetryConfig,
}

impl IssuerConfig {
    /// Defaults for `owner_name`
    pub fn new(owner_name: impl Into<String>) -> Self {
        Self {
            owner_name: owner_name.into(),
            signer_name: DEFAULT_SIGNER_NAME.to_string(),
            subject: SubjectTemplate::default(),
            poll: PollPolicy::default(),
            conflict_retry: RetryConfig::default(),
        }
    }
}

/// Result of a successful run
#[derive(Debug)]
pub struct IssuedCredentials {
    /// Stored bundle
    pub bundle: CredentialBundle,
    /// Secret the bundle was written to
    pub secret_name: String,
    /// States the run passed through
    pub history: Vec<IssuanceState>,
}

/// Drives one issuance per call to [`CertificateIssuer::issue`]
pub struct CertificateIssuer {
    api: Arc<dyn ClusterApi>,
    config: IssuerConfig,
}

impl CertificateIssuer {
    /// Create an issuer over `api`
    pub fn new(api: Arc<dyn ClusterApi>, config: IssuerConfig) -> Self {
        Self { api, config }
    }

    /// Obtain and store a signed certificate for `identity`
    pub async fn issue(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<IssuedCredentials> {
        let mut issuance = Issuance::new(request_name(&self.config.owner_name, &identity.hostname));
        let bundle = self.run(identity, cancel, &mut issuance).await?;
        Ok(IssuedCredentials {
            bundle,
            secret_name: secret_name(&self.config.owner_name),
            history: issuance.history().to_vec(),
        })
    }

    /// Run the lifecycle, recording every transition in `issuance`.
    ///
    /// On error `issuance` ends in `Failed` unless the certificate had
    /// already been signed.
    pub async fn run(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
        issuance: &mut Issuance,
    ) -> Result<CredentialBundle> {
        let result = self.run_inner(identity, cancel, issuance).await;
        if let Err(e) = &result {
            issuance.fail(e);
        }
        result
    }

    async fn run_inner(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
        issuance: &mut Issuance,
    ) -> Result<CredentialBundle> {
        let name = request_name(&self.config.owner_name, &identity.hostname);

        let key = KeyMaterial::generate()?;
        let request = CertificateRequest::build(identity, &self.config.subject, &key)?;
        let csr = self.signing_request(&name, &request);

        self.submit(&name, &csr, cancel).await?;
        issuance.advance(IssuanceState::Submitted)?;

        let outcome = self
            .complete(&name, identity, &key, cancel, issuance)
            .await;

        match (outcome, self.api.delete_request(&name).await) {
            (Ok(bundle), Ok(())) => {
                debug!(csr = %name, "released certificate signing request");
                Ok(bundle)
            }
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!(csr = %name, error = %cleanup, "failed to release certificate signing request");
                Err(e)
            }
        }
    }

    /// Everything between creating the request and deleting it
    async fn complete(
        &self,
        name: &str,
        identity: &Identity,
        key: &KeyMaterial,
        cancel: &CancellationToken,
        issuance: &mut Issuance,
    ) -> Result<CredentialBundle> {
        let observed = self.wait_until_visible(name, cancel).await?;
        self.approve(observed).await?;
        issuance.advance(IssuanceState::Approved)?;

        let certificate = self.wait_until_signed(name, cancel).await?;
        let chain_len = validate_certificate_pem(&certificate)?;
        issuance.advance(IssuanceState::Signed {
            certificate: certificate.clone(),
        })?;
        info!(csr = %name, chain_len, "certificate signed");

        let bundle = CredentialBundle::new(certificate, key.private_key_pem().as_bytes());
        self.store(identity, &bundle, cancel).await?;
        Ok(bundle)
    }

    fn signing_request(&self, name: &str, request: &CertificateRequest) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                request: ByteString(request.request_pem.as_bytes().to_vec()),
                signer_name: self.config.signer_name.clone(),
                groups: Some(vec![REQUEST_GROUP.to_string()]),
                usages: Some(REQUEST_USAGES.iter().map(|u| u.to_string()).collect()),
                ..Default::default()
            },
            status: None,
        }
    }

    async fn submit(
        &self,
        name: &str,
        csr: &CertificateSigningRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let api = &self.api;
        retry_with_backoff(
            &self.config.conflict_retry,
            "create_request",
            cancel,
            Error::is_retryable,
            || async move { api.create_request(csr).await },
        )
        .await?;
        info!(csr = %name, signer = %self.config.signer_name, "submitted certificate signing request");
        Ok(())
    }

    async fn wait_until_visible(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CertificateSigningRequest> {
        let api = &self.api;
        wait_for(
            &format!("certificate signing request {}", name),
            &self.config.poll,
            cancel,
            || async move { api.get_request(name).await },
        )
        .await
    }

    async fn approve(&self, mut csr: CertificateSigningRequest) -> Result<()> {
        let status = csr
            .status
            .get_or_insert_with(CertificateSigningRequestStatus::default);
        status
            .conditions
            .get_or_insert_with(Vec::new)
            .push(CertificateSigningRequestCondition {
                type_: "Approved".to_string(),
                status: "True".to_string(),
                reason: Some(APPROVAL_REASON.to_string()),
                message: Some(APPROVAL_MESSAGE.to_string()),
                ..Default::default()
            });

        self.api.approve_request(&csr).await?;
        Ok(())
    }

    async fn wait_until_signed(&self, name: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let api = &self.api;
        wait_for(
            &format!("signature on {}", name),
            &self.config.poll,
            cancel,
            || async move {
                let csr = api.get_request(name).await?.ok_or_else(|| {
                    Error::not_found(format!("certificate signing request {} was deleted", name))
                })?;
                Ok(csr
                    .status
                    .and_then(|s| s.certificate)
                    .map(|c| c.0)
                    .filter(|c| !c.is_empty()))
            },
        )
        .await
    }

    async fn store(
        &self,
        identity: &Identity,
        bundle: &CredentialBundle,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let owner = &self.config.owner_name;
        let name = secret_name(owner);

        let mut data = BTreeMap::new();
        data.insert(
            key_entry(owner, &identity.hostname),
            ByteString(bundle.private_key_pem().to_vec()),
        );
        data.insert(
            bundle_entry(owner, &identity.hostname),
            ByteString(bundle.combined()),
        );

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        upsert_secret(
            self.api.as_ref(),
            &secret,
            &self.config.conflict_retry,
            cancel,
        )
        .await?;
        info!(secret = %name, host = %identity.hostname, "stored credential bundle");
        Ok(())
    }
}
