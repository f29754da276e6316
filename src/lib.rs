//! contrail-init - node bootstrap agent for Contrail service pods
//!
//! Runs once at pod start on every node that hosts a Contrail node service
//! (control, vrouter or the CNI plugin). It works out the node's network
//! identity from local kernel state, obtains a certificate for that identity
//! through the Kubernetes certificates API, stores the key and certificate in
//! a Secret and publishes the identity for the service's config renderer.
//!
//! # Issuance Flow
//!
//! 1. Generate an RSA key and a PKCS#10 request for the node address
//! 2. Create a `CertificateSigningRequest` (retrying while an older one with
//!    the same name still exists)
//! 3. Wait until the request is visible, then approve it
//! 4. Wait until the signer attaches a certificate
//! 5. Write key and certificate into `{owner}-secret`
//! 6. Delete the request
//!
//! # Modules
//!
//! - [`network`] - Host network identity (interface, prefix, gateway)
//! - [`issuer`] - Certificate issuance state machine
//! - [`bootstrap`] - Service kinds and the end to end run
//! - [`cluster`] - Kubernetes API surface used by the agent
//! - [`pki`] - Key and certificate request generation
//! - [`config`] - Command line and environment configuration
//! - [`telemetry`] - Logging setup
//! - [`wait`] - Polling with deadline and cancellation
//! - [`retry`] - Exponential backoff with jitter
//! - [`error`] - Error types for the agent

#![deny(missing_docs)]

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod error;
pub mod issuer;
pub mod network;
pub mod pki;
pub mod retry;
pub mod telemetry;
pub mod wait;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
