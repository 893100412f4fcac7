use std::fmt;

use bon::Builder;
use const_oid::ObjectIdentifier;
use const_oid::db::rfc4519;
use der::{Tag, Tagged};
use der::asn1::{Any, SetOfVec};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::{ToAndFromX509Extension, X509Extension};
use crate::error::{PkiError, Result};
use crate::key::KeyPair;

/// Parameters of a certificate to be signed by a
/// [`CertificateAuthority`](crate::authority::CertificateAuthority).
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `extensions` - Caller-supplied extensions, appended after the standard set.
/// * `validity` - The `[not_before, not_after)` window.
/// * `key_pair` - The subject's key pair; required.
/// * `serial` - Serial number, allocated by the caller.
/// * `subject_alt_name` - Optional alternate name, encoded as a directory name.
#[derive(Clone, Debug, Builder)]
pub struct CertificateRequest {
    pub subject: DistinguishedName,
    #[builder(default)]
    pub extensions: Vec<X509Extension>,
    pub validity: Validity,
    pub key_pair: Option<KeyPair>,
    pub serial: u64,
    pub subject_alt_name: Option<String>,
}

/// Distinguished name parameters for building an X.509 certificate.
///
/// Renders to a single canonical string with attributes in the fixed order
/// CN, OU, O, L, ST, C; absent attributes are skipped.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq, Hash)]
pub struct DistinguishedName {
    #[builder(into)]
    pub common_name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    /// True when no attribute carries a non-blank value.
    pub fn is_empty(&self) -> bool {
        self.attributes()
            .iter()
            .all(|(_, _, value)| value.trim().is_empty())
    }

    // Canonical order, most specific first.
    fn attributes(&self) -> Vec<(&'static str, ObjectIdentifier, &str)> {
        let mut attrs = vec![("CN", rfc4519::CN, self.common_name.as_str())];
        let optional = [
            ("OU", rfc4519::OU, &self.organization_unit),
            ("O", rfc4519::O, &self.organization),
            ("L", rfc4519::L, &self.locality),
            ("ST", rfc4519::ST, &self.state),
            ("C", rfc4519::C, &self.country),
        ];
        for (label, oid, value) in optional {
            if let Some(value) = value {
                attrs.push((label, oid, value.as_str()));
            }
        }
        attrs
    }

    /// Converts the distinguished name to an X.509-compatible format.
    ///
    /// RDNs are written most general first, so CN ends up last in DER order.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::DistinguishedName> {
        let mut rdns = Vec::new();
        for (_, oid, value) in self.attributes().into_iter().rev() {
            if value.is_empty() {
                continue;
            }
            let atv = AttributeTypeAndValue {
                oid,
                value: Any::new(Tag::Utf8String, value.as_bytes())?,
            };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 name, keeping the
    /// attributes this type knows about.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Result<Self> {
        let mut dn = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let value = decode_directory_string(&attr.value)?;
                match attr.oid {
                    rfc4519::CN => dn.common_name = value,
                    rfc4519::OU => dn.organization_unit = Some(value),
                    rfc4519::O => dn.organization = Some(value),
                    rfc4519::L => dn.locality = Some(value),
                    rfc4519::ST => dn.state = Some(value),
                    rfc4519::C => dn.country = Some(value),
                    _ => {}
                }
            }
        }

        Ok(dn)
    }
}

fn decode_directory_string(value: &Any) -> Result<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            String::from_utf8(value.value().to_vec())
                .map_err(|e| PkiError::DecodingError(e.to_string()))
        }
        tag => Err(PkiError::DecodingError(format!(
            "unsupported directory string tag {tag}"
        ))),
    }
}

fn escape_rfc4514(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i + 1 == value.chars().count() && c == ' ';
        if leading || trailing || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .attributes()
            .into_iter()
            .filter(|(_, _, value)| !value.is_empty())
            .map(|(label, _, value)| format!("{label}={}", escape_rfc4514(value)))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

/// Certificate validity period.
///
/// This struct represents the `notBefore` and `notAfter` fields in a certificate.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// # Arguments
    /// * `days` - The number of days for the validity period.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// A window starting `backdate` before `now` and lasting until
    /// `now + lifetime`.
    pub fn backdated(now: OffsetDateTime, backdate: Duration, lifetime: Duration) -> Result<Self> {
        let out_of_range = || PkiError::InvalidInput("validity window is out of range".to_string());
        Ok(Self {
            not_before: now.checked_sub(backdate).ok_or_else(out_of_range)?,
            not_after: now.checked_add(lifetime).ok_or_else(out_of_range)?,
        })
    }

    /// True when the window is empty at the one-second resolution of X.509
    /// time.
    pub fn is_empty(&self) -> bool {
        self.not_after.unix_timestamp() <= self.not_before.unix_timestamp()
    }
}

/// Represents an X.509 extension.
///
/// This struct contains the OID, criticality, and value of an extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    ///
    /// # Arguments
    /// * `extension` - The extension to encode.
    /// * `critical` - Indicates if the extension is critical.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        if self.oid != E::OID {
            return Err(PkiError::InvalidInput(format!(
                "extension {} is not {}",
                self.oid,
                E::OID
            )));
        }
        E::from_x509_extension_value(&self.value)
    }
}
