mod util;

use entitlekit::model::{Consumer, ContentAccessMode};
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::X509;

fn common_name(name: &openssl::x509::X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap()
        .to_string()
}

#[test]
fn test_openssl_crate_validate_content_access_cert() {
    let harness = util::harness();
    harness
        .catalog
        .add_owner("acme", ContentAccessMode::OrgEnvironment);
    harness
        .catalog
        .set_owner_content("acme", vec![util::content("content-1")]);

    let issued = harness
        .manager
        .get_certificate(&Consumer::new("consumer-1", "acme"))
        .unwrap();

    // Use the openssl crate to parse and validate the certificate
    let x509 = X509::from_pem(issued.certificate_pem.as_bytes()).expect("Failed to parse PEM");
    let ca = X509::from_pem(util::test_ca().certificate_pem().unwrap().as_bytes())
        .expect("Failed to parse CA PEM");

    assert_eq!(common_name(x509.subject_name()), "consumer-1", "Subject CN mismatch");
    assert_eq!(common_name(x509.issuer_name()), "Test CA", "Issuer CN mismatch");
    assert_eq!(x509.version(), 2, "X509 version should be 3 (0-based index)");

    let serial = x509.serial_number().to_bn().unwrap().to_dec_str().unwrap();
    assert_eq!(serial.to_string(), issued.serial.id.to_string());

    assert_eq!(
        x509.signature_algorithm().object().nid(),
        Nid::SHA256WITHRSAENCRYPTION,
        "Signature algorithm should be sha256WithRSAEncryption"
    );

    assert!(x509.verify(&ca.public_key().unwrap()).unwrap());
    assert_eq!(
        x509.authority_key_id().unwrap().as_slice(),
        ca.subject_key_id().unwrap().as_slice()
    );

    // The private key handed out belongs to the certificate.
    let private = PKey::private_key_from_pem(issued.private_key_pem.as_bytes()).unwrap();
    assert!(x509.public_key().unwrap().public_eq(&private));
}

#[test]
fn test_openssl_crate_validate_ca_cert() {
    let ca = X509::from_pem(util::test_ca().certificate_pem().unwrap().as_bytes())
        .expect("Failed to parse CA PEM");

    assert_eq!(common_name(ca.subject_name()), "Test CA");
    assert!(ca.verify(&ca.public_key().unwrap()).unwrap());
    assert_eq!(ca.public_key().unwrap().bits(), util::TEST_KEY_BITS as u32);
}
