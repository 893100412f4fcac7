pub mod extensions;
pub mod params;

use der::asn1::Any;
use der::{Decode, DecodePem, Encode, EncodePem, Tag};
use params::{DistinguishedName, ExtensionParam};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;

use crate::error::{PkiError, Result};
use crate::tbs_certificate::{TbsCertificate, serial_from_bytes};

/// Represents the supported signature algorithms for certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
}

impl SignatureAlgorithm {
    /// Conventional display name, as printed by Java and OpenSSL tooling.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha256WithRSA => "SHA256withRSA",
        }
    }
}

impl TryFrom<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    type Error = PkiError;

    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA algorithm identifiers carry explicit NULL parameters (RFC 4055).
    fn try_from(value: SignatureAlgorithm) -> Result<Self> {
        match value {
            SignatureAlgorithm::Sha256WithRSA => Ok(x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
            }),
        }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into DER or PEM formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_pem(pem)?,
        })
    }

    /// DER bytes of the to-be-signed portion, the input of the signature.
    pub fn tbs_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.tbs_certificate.to_der()?)
    }

    pub fn signature_bytes(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    pub fn serial_number_bytes(&self) -> Vec<u8> {
        self.inner.tbs_certificate.serial_number.as_bytes().to_vec()
    }
}

/// An issued certificate together with its decoded fields.
///
/// Only ever built by re-parsing DER, so every record is known to round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509CertificateRecord {
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub serial: u64,
    pub signature_algorithm: SignatureAlgorithm,
    pub extensions: Vec<ExtensionParam>,
    pub der: Vec<u8>,
}

impl X509CertificateRecord {
    /// Parses DER into a record, failing on anything a conforming parser
    /// would reject.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let certificate = Certificate::from_der(der)?;
        if certificate.to_der()? != der {
            return Err(PkiError::CertificateError(
                "certificate does not re-encode to the same DER".to_string(),
            ));
        }

        let outer_algorithm = certificate.inner.signature_algorithm.oid;
        let tbs = TbsCertificate::from_tbs_certificate_inner(certificate.inner.tbs_certificate)?;
        if outer_algorithm != const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION {
            return Err(PkiError::CertificateError(format!(
                "unexpected outer signature algorithm {outer_algorithm}"
            )));
        }

        Ok(Self {
            subject: DistinguishedName::from_x509_name(&tbs.subject)?,
            issuer: DistinguishedName::from_x509_name(&tbs.issuer)?,
            not_before: tbs.not_before,
            not_after: tbs.not_after,
            serial: serial_from_bytes(&tbs.serial_number)?,
            signature_algorithm: tbs.signature_algorithm,
            extensions: tbs.extensions,
            der: der.to_vec(),
        })
    }

    /// Looks up an extension by OID.
    pub fn extension(&self, oid: &const_oid::ObjectIdentifier) -> Option<&ExtensionParam> {
        self.extensions.iter().find(|ext| ext.oid == *oid)
    }

    pub fn to_pem(&self) -> String {
        crate::pem_utils::der_to_pem(&self.der, "CERTIFICATE")
    }

    pub fn certificate(&self) -> Result<Certificate> {
        Certificate::from_der(&self.der)
    }
}
