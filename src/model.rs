//! Logical entities the certificate lifecycle reads and writes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::cert::X509CertificateRecord;
use crate::error::PkiError;
use crate::grant::ContentGrant;

/// Creation and last-update instants of a persisted record.
///
/// The persistence adapter stamps these explicitly through
/// [`on_create`](Self::on_create) and [`on_update`](Self::on_update).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuditTimestamps {
    pub created: Option<OffsetDateTime>,
    pub updated: Option<OffsetDateTime>,
}

impl AuditTimestamps {
    pub fn on_create(&mut self, now: OffsetDateTime) {
        self.created = Some(now);
        self.updated = Some(now);
    }

    /// Marks an update; records never created are treated as created now.
    pub fn on_update(&mut self, now: OffsetDateTime) {
        if self.created.is_none() {
            self.created = Some(now);
        }
        self.updated = Some(now);
    }
}

/// How an owner exposes content to its consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentAccessMode {
    /// Content follows the consumer's active entitlements.
    Entitlement,
    /// Simple content access: content follows the organization and the
    /// consumer's environments.
    OrgEnvironment,
}

impl ContentAccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentAccessMode::Entitlement => "entitlement",
            ContentAccessMode::OrgEnvironment => "org_environment",
        }
    }
}

impl fmt::Display for ContentAccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentAccessMode {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "entitlement" => Ok(ContentAccessMode::Entitlement),
            "org_environment" => Ok(ContentAccessMode::OrgEnvironment),
            other => Err(PkiError::InvalidInput(format!(
                "unknown content access mode: {other}"
            ))),
        }
    }
}

/// Owner (organization) summary as seen by the issuing flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub key: String,
    pub content_access_mode: ContentAccessMode,
}

/// A registered, durable consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Consumer {
    pub uuid: String,
    pub name: String,
    pub owner_key: String,
    /// Assigned environments, highest priority first.
    pub environment_ids: Vec<String>,
}

impl Consumer {
    pub fn new(uuid: impl Into<String>, owner_key: impl Into<String>) -> Self {
        let uuid = uuid.into();
        Self {
            name: uuid.clone(),
            uuid,
            owner_key: owner_key.into(),
            environment_ids: Vec::new(),
        }
    }

    /// Assigns an environment; assigning the same environment twice is a no-op.
    pub fn add_environment(&mut self, environment_id: impl Into<String>) {
        let environment_id = environment_id.into();
        if !self.environment_ids.contains(&environment_id) {
            self.environment_ids.push(environment_id);
        }
    }
}

/// A consumer without a durable registration, e.g. a cloud instance that has
/// not yet been claimed by an owner account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnonymousConsumer {
    pub uuid: String,
    pub owner_key: String,
}

/// A unit of content a certificate may grant access to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub label: String,
    pub name: String,
    pub content_url: String,
    pub enabled: bool,
}

/// A consumer's grant to a product over a validity window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entitlement {
    pub id: String,
    pub product_id: String,
    pub start_date: OffsetDateTime,
    pub end_date: OffsetDateTime,
}

impl Entitlement {
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.start_date <= now && now < self.end_date
    }
}

/// Serial number record of one issued certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateSerial {
    pub id: u64,
    pub expiration: OffsetDateTime,
    pub revoked: bool,
    pub timestamps: AuditTimestamps,
}

impl CertificateSerial {
    pub fn new(id: u64, expiration: OffsetDateTime) -> Self {
        Self {
            id,
            expiration,
            revoked: false,
            timestamps: AuditTimestamps::default(),
        }
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiration <= now
    }

    pub fn revoke(&mut self) {
        self.revoked = true;
    }
}

/// A content access certificate issued to one consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentAccessCertificate {
    pub consumer_id: String,
    pub serial: CertificateSerial,
    pub certificate: X509CertificateRecord,
    /// Entity id under which the subject key pair is stored.
    pub key_pair_ref: String,
    pub grant: ContentGrant,
    pub certificate_pem: String,
    pub private_key_pem: String,
    /// `ENTITLEMENT DATA` PEM block carrying the compressed grant payload.
    pub entitlement_data_pem: String,
    pub timestamps: AuditTimestamps,
}

impl ContentAccessCertificate {
    pub fn der(&self) -> &[u8] {
        &self.certificate.der
    }

    /// Certificate PEM followed by the entitlement data block, the form
    /// handed to clients.
    pub fn cert(&self) -> String {
        format!("{}{}", self.certificate_pem, self.entitlement_data_pem)
    }
}
