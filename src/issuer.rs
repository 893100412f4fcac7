use der::Encode;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::AuthorityKeyIdentifier;
use crate::error::Result;
use crate::key::KeyPair;
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and sign
/// certificates with SHA256withRSA.
pub trait Issuer {
    /// Returns the name placed in the issuer field of issued certificates.
    fn issuer_name(&self) -> Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Returns the AKI extension value identifying this issuer.
    fn authority_key_identifier(&self) -> Result<AuthorityKeyIdentifier>;

    /// Signs `tbs` and assembles the final certificate.
    ///
    /// The issuer name and signature algorithm of `tbs` are overwritten with
    /// this issuer's.
    fn sign(&self, mut tbs: TbsCertificate) -> Result<Certificate> {
        tbs.issuer = self.issuer_name();
        tbs.signature_algorithm = SignatureAlgorithm::Sha256WithRSA;

        let tbs_cert_inner = tbs.to_tbs_certificate_inner()?;
        let signature = self.signing_key().sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: SignatureAlgorithm::Sha256WithRSA.try_into()?,
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}
