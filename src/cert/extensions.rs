use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{OctetString, Utf8StringRef},
    oid::ObjectIdentifier,
};
use sha1::{Digest, Sha1};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use super::params::ExtensionParam;
use crate::error::PkiError;

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use entitlekit::cert::extensions::BasicConstraints;
/// use entitlekit::cert::extensions::ToAndFromX509Extension;
/// let bc = BasicConstraints { is_ca: false, max_path_length: None };
/// let encoded = bc.to_x509_extension_value().unwrap();
/// let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
/// assert!(!decoded.is_ca);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError>
    where
        Self: Sized;
}

/// Represents the Subject Alternative Name (SAN) extension.
///
/// Names are carried as directory names, each with a single CN attribute.
#[derive(Debug, Clone)]
pub struct SubjectAltName {
    pub names: Vec<Name>,
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .cloned()
                .map(GeneralName::DirectoryName)
                .collect(),
        );

        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .into_iter()
            .map(|name| match name {
                GeneralName::DirectoryName(dn) => Ok(dn),
                _ => Err(PkiError::InvalidInput(
                    "Unsupported general name type".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { names })
    }
}

/// Represents the Basic Constraints extension.
///
/// This extension indicates whether the certificate is a CA certificate and its path length.
///
/// # Fields
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `max_path_length` - The maximum number of intermediate CAs allowed.
#[derive(Debug, Default)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: self.max_path_length,
        };

        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self, PkiError> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes)?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint,
        })
    }
}

pub use der::flagset::FlagSet;
use der::flagset::flags;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Represents the Key Usage extension.
///
/// This extension defines the purpose of the key contained in the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let ku = X509KeyUsage::from(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let ku = X509KeyUsage::from_der(extension)?;
        Ok(Self(ku.0))
    }
}

/// Represents the Extended Key Usage extension.
///
/// This extension indicates purposes for which the public key may be used.
#[derive(Debug, Clone, Default)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let oids: Vec<ObjectIdentifier> = self.usage.iter().map(|v| (*v).into()).collect();
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(oids);
        Ok(eku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)?;
        let usage = eku
            .0
            .iter()
            .map(|v| match *v {
                const_oid::db::rfc5912::ID_KP_SERVER_AUTH => Ok(ExtendedKeyUsageOption::ServerAuth),
                const_oid::db::rfc5912::ID_KP_CLIENT_AUTH => Ok(ExtendedKeyUsageOption::ClientAuth),
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION => {
                    Ok(ExtendedKeyUsageOption::EmailProtection)
                }
                _ => Err(PkiError::InvalidInput(
                    "Unsupported extended key usage option".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { usage })
    }
}

/// Represents an option for the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    EmailProtection,
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
        }
    }
}

/// SHA-1 over the subjectPublicKey bits (RFC 5280 section 4.2.1.2, method 1).
pub fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec()
}

/// Represents the Subject Key Identifier (SKI) extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl SubjectKeyIdentifier {
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Self {
        Self {
            key_identifier: key_identifier(spki),
        }
    }
}

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(
            self.key_identifier.as_slice(),
        )?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension)?;
        Ok(Self {
            key_identifier: ski.0.as_bytes().to_vec(),
        })
    }
}

/// Represents the Authority Key Identifier (AKI) extension.
///
/// This extension identifies the public key corresponding to the private key used to sign the certificate.
///
/// # Fields
/// * `key_identifier` - The key identifier.
/// * `authority_cert_issuer` - The issuer name of the authority's own certificate.
/// * `authority_cert_serial_number` - The authority certificate's serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Vec<u8>,
    pub authority_cert_issuer: Option<Name>,
    pub authority_cert_serial_number: Vec<u8>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let general_names = self
            .authority_cert_issuer
            .clone()
            .map(|name| vec![GeneralName::DirectoryName(name)]);

        let serial_number = if self.authority_cert_serial_number.is_empty() {
            None
        } else {
            Some(x509_cert::serial_number::SerialNumber::new(
                self.authority_cert_serial_number.as_slice(),
            )?)
        };

        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(self.key_identifier.as_slice())?),
            authority_cert_issuer: general_names,
            authority_cert_serial_number: serial_number,
        };

        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension)?;

        let authority_cert_issuer = aki.authority_cert_issuer.as_ref().and_then(|names| {
            names.iter().find_map(|name| match name {
                GeneralName::DirectoryName(dn) => Some(dn.clone()),
                _ => None,
            })
        });

        Ok(Self {
            key_identifier: aki
                .key_identifier
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
            authority_cert_issuer,
            authority_cert_serial_number: aki
                .authority_cert_serial_number
                .map(|sn| sn.as_bytes().to_vec())
                .unwrap_or_default(),
        })
    }
}

flags! {
    /// Bits of the legacy Netscape certificate type extension.
    pub enum NetscapeCertTypes: u8 {
        SslClient = 1 << 0,
        SslServer = 1 << 1,
        Smime = 1 << 2,
        ObjectSigning = 1 << 3,
        Reserved = 1 << 4,
        SslCa = 1 << 5,
        SmimeCa = 1 << 6,
        ObjectSigningCa = 1 << 7,
    }
}

/// Netscape certificate type (2.16.840.1.113730.1.1), still read by some
/// older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetscapeCertType(pub FlagSet<NetscapeCertTypes>);

impl ToAndFromX509Extension for NetscapeCertType {
    const OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.113730.1.1");

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        Ok(self.0.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        Ok(Self(FlagSet::<NetscapeCertTypes>::from_der(extension)?))
    }
}

/// Payload of a caller-supplied extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtensionPayload {
    /// Encoded as a DER UTF8String.
    Utf8(String),
    /// Encoded as a DER OCTET STRING.
    Bytes(Vec<u8>),
}

/// A custom extension carrying either a string or a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct X509Extension {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    pub payload: ExtensionPayload,
}

impl X509Extension {
    pub fn string(oid: ObjectIdentifier, value: impl Into<String>) -> Self {
        Self {
            oid,
            critical: false,
            payload: ExtensionPayload::Utf8(value.into()),
        }
    }

    pub fn bytes(oid: ObjectIdentifier, value: impl Into<Vec<u8>>) -> Self {
        Self {
            oid,
            critical: false,
            payload: ExtensionPayload::Bytes(value.into()),
        }
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn to_param(&self) -> Result<ExtensionParam, PkiError> {
        let value = match &self.payload {
            ExtensionPayload::Utf8(s) => Utf8StringRef::new(s)?.to_der()?,
            ExtensionPayload::Bytes(b) => OctetString::new(b.as_slice())?.to_der()?,
        };
        Ok(ExtensionParam {
            oid: self.oid,
            critical: self.critical,
            value,
        })
    }

    /// Reads a string payload back out of an encoded extension.
    pub fn decode_string(param: &ExtensionParam) -> Result<String, PkiError> {
        Ok(Utf8StringRef::from_der(&param.value)?.as_str().to_string())
    }

    /// Reads a byte payload back out of an encoded extension.
    pub fn decode_bytes(param: &ExtensionParam) -> Result<Vec<u8>, PkiError> {
        Ok(OctetString::from_der(&param.value)?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::DistinguishedName;

    #[test]
    fn test_basic_constraints_encoding_decoding() {
        let original = BasicConstraints {
            is_ca: true,
            max_path_length: Some(3),
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.is_ca, decoded.is_ca);
        assert_eq!(original.max_path_length, decoded.max_path_length);
    }

    #[test]
    fn test_non_ca_basic_constraints_omit_default() {
        let encoded = BasicConstraints::default().to_x509_extension_value().unwrap();
        // Empty SEQUENCE: cA defaults to FALSE and is not encoded.
        assert_eq!(encoded, vec![0x30, 0x00]);
    }

    #[test]
    fn test_authority_key_identifier_encoding_decoding() {
        let issuer = DistinguishedName::builder()
            .common_name("Test CA")
            .organization("Test Org".to_string())
            .build();
        let original = AuthorityKeyIdentifier {
            key_identifier: vec![1, 2, 3, 4, 5],
            authority_cert_issuer: Some(issuer.as_x509_name().unwrap()),
            authority_cert_serial_number: vec![6, 7, 8, 9, 10],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = AuthorityKeyIdentifier::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
        let decoded_issuer =
            DistinguishedName::from_x509_name(&decoded.authority_cert_issuer.unwrap()).unwrap();
        assert_eq!(decoded_issuer, issuer);
    }

    #[test]
    fn test_key_usage_encoding_decoding() {
        let original = KeyUsage(
            KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment | KeyUsages::DataEncipherment,
        );
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = KeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_netscape_cert_type_matches_named_bit_layout() {
        let original = NetscapeCertType(NetscapeCertTypes::SslClient | NetscapeCertTypes::Smime);
        let encoded = original.to_x509_extension_value().unwrap();
        // BIT STRING, 5 unused bits, sslClient (bit 0) and smime (bit 2) set.
        assert_eq!(encoded, vec![0x03, 0x02, 0x05, 0xA0]);
        let decoded = NetscapeCertType::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_string_extension_payload() {
        let oid = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.2312.9.8");
        let param = X509Extension::string(oid, "OrgLevel").to_param().unwrap();
        assert_eq!(param.value[0], 0x0C);
        assert_eq!(X509Extension::decode_string(&param).unwrap(), "OrgLevel");
    }

    #[test]
    fn test_byte_extension_payload() {
        let oid = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.2312.9.7");
        let bytes = vec![0xd, 0xe, 0xf, 0xa, 0xc, 0xe, 0xa, 0xc, 0xe];
        let param = X509Extension::bytes(oid, bytes.clone()).to_param().unwrap();
        assert_eq!(param.value[0], 0x04);
        assert_eq!(X509Extension::decode_bytes(&param).unwrap(), bytes);
    }

    #[test]
    fn test_subject_alt_name_directory_name() {
        let name = DistinguishedName::new("altName").as_x509_name().unwrap();
        let original = SubjectAltName {
            names: vec![name.clone()],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(decoded.names, vec![name]);
    }

    #[test]
    fn test_extended_key_usage_encoding_decoding() {
        let original = ExtendedKeyUsage {
            usage: vec![ExtendedKeyUsageOption::ClientAuth],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = ExtendedKeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.usage, decoded.usage);
    }
}
