use std::collections::HashSet;

use der::Encode;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use time::OffsetDateTime;
use tracing::debug;
use x509_cert::name::Name;

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsages, NetscapeCertType, NetscapeCertTypes, SubjectAltName, SubjectKeyIdentifier,
    ToAndFromX509Extension, key_identifier,
};
use crate::cert::params::{CertificateRequest, DistinguishedName, ExtensionParam, Validity};
use crate::cert::{Certificate, SignatureAlgorithm, X509CertificateRecord};
use crate::error::{PkiError, Result};
use crate::issuer::Issuer;
use crate::key::KeyPair;
use crate::tbs_certificate::{TbsCertificate, serial_to_bytes};

/// The certificate authority that signs identity and content access
/// certificates.
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    cert: Certificate,
    key: KeyPair,
}

impl CertificateAuthority {
    /// Pairs an existing CA certificate with its private key.
    pub fn new(cert: Certificate, key: KeyPair) -> Result<Self> {
        let cert_key = RsaPublicKey::from_public_key_der(
            &cert.inner.tbs_certificate.subject_public_key_info.to_der()?,
        )?;
        if &cert_key != key.public_key() {
            return Err(PkiError::InvalidInput(
                "CA certificate was not issued for the supplied key".to_string(),
            ));
        }
        Ok(Self { cert, key })
    }

    /// Loads a CA from a PEM certificate and a PKCS#8 or PKCS#1 PEM private key.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let cert = Certificate::from_pem(cert_pem)?;
        let private = RsaPrivateKey::from_pkcs8_pem(key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(key_pem))
            .map_err(|e| PkiError::DecodingError(format!("unreadable CA private key: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Self::new(cert, KeyPair::from_parts(public, private)?)
    }

    /// Generates a fresh key and a self-signed CA certificate for it.
    pub fn generate(subject: &DistinguishedName, validity: Validity, bits: usize) -> Result<Self> {
        if subject.common_name.trim().is_empty() {
            return Err(PkiError::InvalidInput("CA subject has no common name".to_string()));
        }
        if validity.is_empty() {
            return Err(PkiError::InvalidInput("CA validity window is empty".to_string()));
        }

        let key = KeyPair::generate_rsa(bits)?;
        let spki = key.as_spki()?;
        let serial = serial_to_bytes(rand::random::<u64>() >> 1);

        let self_issuer = SelfIssuer {
            name: subject.as_x509_name()?,
            key: &key,
        };

        let extensions = vec![
            ExtensionParam::from_extension(
                BasicConstraints {
                    is_ca: true,
                    max_path_length: None,
                },
                true,
            )?,
            ExtensionParam::from_extension(
                KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign | KeyUsages::DigitalSignature),
                true,
            )?,
            ExtensionParam::from_extension(SubjectKeyIdentifier::from_spki(&spki), false)?,
            ExtensionParam::from_extension(self_issuer.authority_key_identifier()?, false)?,
        ];

        let tbs = TbsCertificate {
            serial_number: serial,
            signature_algorithm: SignatureAlgorithm::Sha256WithRSA,
            issuer: self_issuer.issuer_name(),
            not_before: validity.not_before,
            not_after: validity.not_after,
            subject: self_issuer.issuer_name(),
            subject_public_key: key.public_key().clone(),
            extensions,
        };

        let cert = self_issuer.sign(tbs)?;
        debug!(subject = %subject, "generated self-signed CA certificate");
        Ok(Self { cert, key })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    pub fn certificate_pem(&self) -> Result<String> {
        self.cert.to_pem()
    }

    /// Builds and signs a client certificate.
    ///
    /// The standard extension set (key usage, Netscape cert type, extended
    /// key usage, basic constraints, SKI, AKI and, when requested, a
    /// directory-name SAN) comes first; caller extensions follow in the
    /// order given. The result is re-parsed before it is returned.
    pub fn create_certificate(&self, request: &CertificateRequest) -> Result<X509CertificateRecord> {
        if request.subject.is_empty() || request.subject.common_name.trim().is_empty() {
            return Err(PkiError::InvalidInput("subject DN is empty".to_string()));
        }
        if request.validity.is_empty() {
            return Err(PkiError::InvalidInput(format!(
                "notAfter {} is not after notBefore {}",
                request.validity.not_after, request.validity.not_before
            )));
        }
        let key_pair = request
            .key_pair
            .as_ref()
            .ok_or_else(|| PkiError::InvalidInput("no key pair supplied".to_string()))?;
        if !key_pair.is_consistent() {
            return Err(PkiError::InvalidInput(
                "public key does not pair with the private key".to_string(),
            ));
        }

        let mut extensions = self.standard_extensions(key_pair, request.subject_alt_name.as_deref())?;
        let mut seen: HashSet<_> = extensions.iter().map(|ext| ext.oid).collect();
        for extension in &request.extensions {
            if !seen.insert(extension.oid) {
                return Err(PkiError::InvalidInput(format!(
                    "duplicate extension OID {}",
                    extension.oid
                )));
            }
            extensions.push(extension.to_param()?);
        }

        let tbs = TbsCertificate {
            serial_number: serial_to_bytes(request.serial),
            signature_algorithm: SignatureAlgorithm::Sha256WithRSA,
            issuer: self.issuer_name(),
            not_before: request.validity.not_before,
            not_after: request.validity.not_after,
            subject: request.subject.as_x509_name()?,
            subject_public_key: key_pair.public_key().clone(),
            extensions,
        };

        let der = self.sign(tbs)?.to_der()?;
        let record = X509CertificateRecord::from_der(&der)
            .map_err(|e| PkiError::CertificateError(format!("issued certificate does not parse: {e}")))?;
        if record.serial != request.serial {
            return Err(PkiError::CertificateError(format!(
                "issued serial {} differs from requested serial {}",
                record.serial, request.serial
            )));
        }

        debug!(serial = record.serial, subject = %record.subject, "signed certificate");
        Ok(record)
    }

    /// Checks the signature of `record` against this authority's key.
    pub fn verify(&self, record: &X509CertificateRecord) -> Result<bool> {
        let cert = record.certificate()?;
        Ok(self.key.verify_data(&cert.tbs_der()?, cert.signature_bytes()))
    }

    /// Moment after which the CA certificate itself is no longer valid.
    pub fn not_after(&self) -> Result<OffsetDateTime> {
        let tbs = TbsCertificate::from_tbs_certificate_inner(self.cert.inner.tbs_certificate.clone())?;
        Ok(tbs.not_after)
    }

    fn standard_extensions(
        &self,
        key_pair: &KeyPair,
        subject_alt_name: Option<&str>,
    ) -> Result<Vec<ExtensionParam>> {
        let mut extensions = vec![
            ExtensionParam::from_extension(
                KeyUsage(
                    KeyUsages::DigitalSignature
                        | KeyUsages::KeyEncipherment
                        | KeyUsages::DataEncipherment,
                ),
                false,
            )?,
            ExtensionParam::from_extension(
                NetscapeCertType(NetscapeCertTypes::SslClient | NetscapeCertTypes::Smime),
                false,
            )?,
            ExtensionParam::from_extension(
                ExtendedKeyUsage {
                    usage: vec![ExtendedKeyUsageOption::ClientAuth],
                },
                false,
            )?,
            ExtensionParam::from_extension(BasicConstraints::default(), false)?,
            ExtensionParam::from_extension(SubjectKeyIdentifier::from_spki(&key_pair.as_spki()?), false)?,
            ExtensionParam::from_extension(self.authority_key_identifier()?, false)?,
        ];

        if let Some(alt_name) = subject_alt_name {
            let name = DistinguishedName::new(alt_name).as_x509_name()?;
            extensions.push(ExtensionParam::from_extension(
                SubjectAltName { names: vec![name] },
                false,
            )?);
        }

        Ok(extensions)
    }
}

impl Issuer for CertificateAuthority {
    // Issued certificates name the CA by its own subject.
    fn issuer_name(&self) -> Name {
        self.cert.inner.tbs_certificate.subject.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    // The CA's own SKI wins; the SHA-1 of its key is the fallback for CA
    // certificates without one.
    fn authority_key_identifier(&self) -> Result<AuthorityKeyIdentifier> {
        let tbs = &self.cert.inner.tbs_certificate;
        let own_ski = tbs
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID)
            .map(|ext| SubjectKeyIdentifier::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()?;
        Ok(AuthorityKeyIdentifier {
            key_identifier: match own_ski {
                Some(ski) => ski.key_identifier,
                None => key_identifier(&tbs.subject_public_key_info),
            },
            authority_cert_issuer: Some(tbs.issuer.clone()),
            authority_cert_serial_number: tbs.serial_number.as_bytes().to_vec(),
        })
    }
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }

    fn authority_key_identifier(&self) -> Result<AuthorityKeyIdentifier> {
        Ok(AuthorityKeyIdentifier {
            key_identifier: key_identifier(&self.key.as_spki()?),
            authority_cert_issuer: None,
            authority_cert_serial_number: Vec::new(),
        })
    }
}
