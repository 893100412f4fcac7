//! Collaborators the certificate lifecycle depends on.
//!
//! Durable state lives behind these traits; [`memory::MemoryStore`] is a
//! complete in-process implementation of the storage side.

pub mod memory;

use crate::error::Result;
use crate::keystore::KeyPairData;
use crate::model::{
    CertificateSerial, Consumer, Content, ContentAccessCertificate, ContentAccessMode, Entitlement,
};

/// Persistence of per-entity key material.
pub trait KeyPairDataStore: Send + Sync {
    fn key_pair_for(&self, entity_id: &str) -> Result<Option<KeyPairData>>;

    /// Creates or wholesale replaces the record of `data.entity_id`.
    fn save_key_pair(&self, data: KeyPairData) -> Result<KeyPairData>;
}

/// Persistence of serials and issued certificates.
pub trait CertificateStore: Send + Sync {
    fn serial(&self, id: u64) -> Result<Option<CertificateSerial>>;

    /// Creates the record of a serial issued outside a consumer's history,
    /// such as a shared anonymous certificate's.
    fn record_serial(&self, serial: CertificateSerial) -> Result<CertificateSerial>;

    /// Updates an existing serial record (expiration, revocation).
    fn merge_serial(&self, serial: CertificateSerial) -> Result<CertificateSerial>;

    /// The consumer's current certificate, joined with the latest state of
    /// its serial record.
    fn current_certificate(&self, consumer_id: &str) -> Result<Option<ContentAccessCertificate>>;

    /// Superseded certificates of the consumer, oldest first.
    fn certificate_history(&self, consumer_id: &str) -> Result<Vec<ContentAccessCertificate>>;

    /// Stores the serial, the certificate and its key pair reference as one
    /// unit, making the certificate current.
    fn commit_issuance(&self, certificate: ContentAccessCertificate) -> Result<ContentAccessCertificate>;
}

/// Source of globally unique serial numbers.
pub trait SerialAllocator: Send + Sync {
    fn next_serial(&self) -> Result<u64>;
}

/// Entitlement and content lookups.
///
/// `None` means the requested record does not exist upstream.
pub trait ContentSource: Send + Sync {
    fn entitlements(&self, consumer: &Consumer) -> Result<Vec<Entitlement>>;

    fn product_content(&self, product_id: &str) -> Result<Option<Vec<Content>>>;

    fn environment_content(&self, environment_id: &str) -> Result<Option<Vec<Content>>>;

    /// Content visible at the organization level.
    fn owner_content(&self, owner_key: &str) -> Result<Option<Vec<Content>>>;

    /// Changes whenever the owner's content set changes.
    fn content_version(&self, owner_key: &str) -> Result<Option<u64>>;
}

pub trait OwnerDirectory: Send + Sync {
    fn content_access_mode(&self, owner_key: &str) -> Result<Option<ContentAccessMode>>;
}
