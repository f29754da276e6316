//! Stories about keys, requests and the stored credential bundle

use contrail_init::pki::{
    validate_certificate_pem, CertificateRequest, CredentialBundle, KeyMaterial, SubjectTemplate,
};
use contrail_init::Error;
use rcgen::{CertificateParams, KeyPair};
use x509_parser::prelude::*;

use super::helpers::worker_identity;

fn self_signed_pem() -> String {
    let key = KeyPair::generate().unwrap();
    CertificateParams::new(vec!["worker-1".to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap()
        .pem()
}

/// Story: the request a node files names it by address and hostname
#[test]
fn story_request_identifies_the_node() {
    let key = KeyMaterial::generate().unwrap();
    let request =
        CertificateRequest::build(&worker_identity(), &SubjectTemplate::default(), &key).unwrap();

    let block = ::pem::parse(request.request_pem.as_bytes()).unwrap();
    let (_, csr) = X509CertificationRequest::from_der(block.contents()).unwrap();
    csr.verify_signature().unwrap();

    let subject = csr.certification_request_info.subject.to_string();
    assert!(subject.contains("CN=10.1.1.5"));
    assert!(subject.contains("O=Juniper Networks"));
    assert!(subject.contains("OU=Contrail"));
    assert_eq!(request.dns_names, vec!["worker-1".to_string()]);
}

/// Story: the combined secret entry splits back into what was stored
#[test]
fn story_bundle_split_is_byte_identical() {
    let key = KeyMaterial::generate().unwrap();
    let certificate = self_signed_pem();
    let bundle = CredentialBundle::new(
        certificate.clone().into_bytes(),
        key.private_key_pem().as_bytes(),
    );

    let split = CredentialBundle::split(&bundle.combined()).unwrap();

    assert_eq!(split.certificate_pem(), certificate.as_bytes());
    assert_eq!(split.private_key_pem(), key.private_key_pem().as_bytes());
}

#[test]
fn chains_are_counted_and_garbage_is_rejected() {
    let chain = format!("{}{}", self_signed_pem(), self_signed_pem());
    assert_eq!(validate_certificate_pem(chain.as_bytes()).unwrap(), 2);

    assert!(matches!(
        validate_certificate_pem(b""),
        Err(Error::MalformedInput(_))
    ));
    assert!(matches!(
        validate_certificate_pem(b"hello"),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn bundle_without_key_cannot_be_split() {
    assert!(matches!(
        CredentialBundle::split(self_signed_pem().as_bytes()),
        Err(Error::MalformedInput(_))
    ));
}
