//! Content grants and the custom extensions that carry them.
//!
//! A grant is encoded into three extensions under the entitlement arc
//! `1.3.6.1.4.1.2312.9`: the payload version, the grant type and the grant
//! itself as zlib-compressed JSON. Encoding is deterministic, so identical
//! grants always produce identical extension bytes.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use const_oid::ObjectIdentifier;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::cert::X509CertificateRecord;
use crate::cert::extensions::X509Extension;
use crate::error::{PkiError, Result};
use crate::model::{Content, ContentAccessMode};

/// `1.3.6.1.4.1.2312.9.6`, payload format version.
pub const ENTITLEMENT_VERSION_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.2312.9.6");
/// `1.3.6.1.4.1.2312.9.7`, compressed grant payload.
pub const ENTITLEMENT_DATA_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.2312.9.7");
/// `1.3.6.1.4.1.2312.9.8`, grant type.
pub const ENTITLEMENT_TYPE_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.2312.9.8");

pub const ENTITLEMENT_VERSION: &str = "3.4";

/// One content item as it appears in a grant payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedContent {
    pub id: String,
    pub label: String,
    pub name: String,
    pub path: String,
    pub enabled: bool,
}

impl From<Content> for GrantedContent {
    fn from(content: Content) -> Self {
        Self {
            id: content.id,
            label: content.label,
            name: content.name,
            path: content.content_url,
            enabled: content.enabled,
        }
    }
}

/// The content a certificate grants access to.
///
/// Environments and content are kept sorted and free of duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGrant {
    pub owner: String,
    pub mode: ContentAccessMode,
    pub environments: Vec<String>,
    pub content: Vec<GrantedContent>,
}

impl ContentGrant {
    /// Builds a grant, deduplicating content by id. When two items share an
    /// id the first one seen wins.
    pub fn new(
        owner: impl Into<String>,
        mode: ContentAccessMode,
        environments: impl IntoIterator<Item = String>,
        content: impl IntoIterator<Item = Content>,
    ) -> Self {
        let mut environments: Vec<String> = environments.into_iter().collect();
        environments.sort();
        environments.dedup();

        let mut by_id = BTreeMap::new();
        for item in content {
            by_id
                .entry(item.id.clone())
                .or_insert_with(|| GrantedContent::from(item));
        }

        Self {
            owner: owner.into(),
            mode,
            environments,
            content: by_id.into_values().collect(),
        }
    }

    pub fn content_ids(&self) -> impl Iterator<Item = &str> {
        self.content.iter().map(|c| c.id.as_str())
    }

    pub fn contains_content(&self, id: &str) -> bool {
        self.content.binary_search_by(|c| c.id.as_str().cmp(id)).is_ok()
    }

    /// Grant type recorded in the type extension.
    pub fn entitlement_type(&self) -> &'static str {
        match self.mode {
            ContentAccessMode::OrgEnvironment => "OrgLevel",
            ContentAccessMode::Entitlement => "Basic",
        }
    }
}

/// Builds the entitlement extensions for a grant, and reads them back.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionBuilder {
    compression: Compression,
}

impl Default for ExtensionBuilder {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
        }
    }
}

impl ExtensionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression_level(level: u32) -> Self {
        Self {
            compression: Compression::new(level),
        }
    }

    /// Version, type and data extensions for `grant`, in that order.
    pub fn build(&self, grant: &ContentGrant) -> Result<Vec<X509Extension>> {
        Ok(vec![
            X509Extension::string(ENTITLEMENT_VERSION_OID, ENTITLEMENT_VERSION),
            X509Extension::string(ENTITLEMENT_TYPE_OID, grant.entitlement_type()),
            X509Extension::bytes(ENTITLEMENT_DATA_OID, self.payload(grant)?),
        ])
    }

    /// Compressed JSON encoding of `grant`.
    pub fn payload(&self, grant: &ContentGrant) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(grant)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), self.compression);
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// Inverse of [`payload`](Self::payload).
    pub fn decode_payload(payload: &[u8]) -> Result<ContentGrant> {
        let mut json = Vec::new();
        ZlibDecoder::new(payload).read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Reads the grant back out of an issued certificate.
    pub fn decode_grant(record: &X509CertificateRecord) -> Result<ContentGrant> {
        let param = record.extension(&ENTITLEMENT_DATA_OID).ok_or_else(|| {
            PkiError::DecodingError("certificate carries no entitlement data".to_string())
        })?;
        Self::decode_payload(&X509Extension::decode_bytes(param)?)
    }

    pub fn decode_type(record: &X509CertificateRecord) -> Result<String> {
        let param = record.extension(&ENTITLEMENT_TYPE_OID).ok_or_else(|| {
            PkiError::DecodingError("certificate carries no entitlement type".to_string())
        })?;
        X509Extension::decode_string(param)
    }
}
