//! Content access certificate issuance.
//!
//! Every consumer has at most one current certificate. It is reused until
//! its serial expires and then replaced by a certificate under a new serial;
//! the replaced certificate stays in the history. Anonymous consumers are
//! served from a bounded cache keyed by owner and content version.

pub mod cache;

use std::sync::{Arc, Mutex, PoisonError};

use bon::bon;
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::authority::CertificateAuthority;
use crate::cert::params::{CertificateRequest, DistinguishedName, Validity};
use crate::config::PkiConfig;
use crate::error::{PkiError, Result};
use crate::grant::{ContentGrant, ExtensionBuilder};
use crate::key::KeyPair;
use crate::keystore::KeyPairService;
use crate::model::{
    AnonymousConsumer, AuditTimestamps, CertificateSerial, Consumer, ContentAccessCertificate,
    ContentAccessMode,
};
use crate::pem_utils::{ENTITLEMENT_DATA_LABEL, der_to_pem};
use crate::store::{CertificateStore, ContentSource, OwnerDirectory, SerialAllocator};
use cache::{AnonymousCertificateCache, CacheFingerprint, CacheStats};

/// Issues and maintains the content access certificates of consumers.
pub struct ContentAccessCertificateManager {
    authority: Arc<CertificateAuthority>,
    key_pairs: KeyPairService,
    certificates: Arc<dyn CertificateStore>,
    serials: Arc<dyn SerialAllocator>,
    content: Arc<dyn ContentSource>,
    owners: Arc<dyn OwnerDirectory>,
    extensions: ExtensionBuilder,
    config: PkiConfig,
    anonymous_cache: AnonymousCertificateCache,
    consumer_locks: DashMap<String, Arc<Mutex<()>>>,
}

#[bon]
impl ContentAccessCertificateManager {
    #[builder]
    pub fn new(
        authority: Arc<CertificateAuthority>,
        key_pairs: KeyPairService,
        certificate_store: Arc<dyn CertificateStore>,
        serial_allocator: Arc<dyn SerialAllocator>,
        content_source: Arc<dyn ContentSource>,
        owner_directory: Arc<dyn OwnerDirectory>,
        #[builder(default)] config: PkiConfig,
        #[builder(default)] extension_builder: ExtensionBuilder,
    ) -> Result<Self> {
        config.validate()?;
        if key_pairs.key_size_bits() != config.key_size_bits {
            return Err(PkiError::InvalidInput(format!(
                "key pair service generates {}-bit keys but the configuration asks for {}",
                key_pairs.key_size_bits(),
                config.key_size_bits
            )));
        }
        let anonymous_cache =
            AnonymousCertificateCache::new(config.anonymous_cache_capacity, config.anonymous_cache_ttl());
        Ok(Self {
            authority,
            key_pairs,
            certificates: certificate_store,
            serials: serial_allocator,
            content: content_source,
            owners: owner_directory,
            extensions: extension_builder,
            config,
            anonymous_cache,
            consumer_locks: DashMap::new(),
        })
    }
}

impl ContentAccessCertificateManager {
    /// Returns the consumer's current certificate, issuing a new one when the
    /// consumer has none or its serial has expired.
    ///
    /// Upstream lookups happen before anything is written, so an
    /// [`PkiError::UpstreamData`] failure leaves the stored state untouched.
    pub fn get_certificate(&self, consumer: &Consumer) -> Result<ContentAccessCertificate> {
        let result = {
            let lock = self
                .consumer_locks
                .entry(consumer.uuid.clone())
                .or_default()
                .clone();
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.current_or_issue(consumer)
        };
        self.consumer_locks
            .remove_if(&consumer.uuid, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of consumers whose issuance lock is currently held or awaited.
    pub fn locked_consumer_count(&self) -> usize {
        self.consumer_locks.len()
    }

    fn current_or_issue(&self, consumer: &Consumer) -> Result<ContentAccessCertificate> {
        let now = OffsetDateTime::now_utc();
        if let Some(existing) = self.certificates.current_certificate(&consumer.uuid)? {
            if !existing.serial.is_expired_at(now) {
                debug!(
                    consumer_id = %consumer.uuid,
                    serial = existing.serial.id,
                    "reusing content access certificate"
                );
                return Ok(existing);
            }
            info!(
                consumer_id = %consumer.uuid,
                serial = existing.serial.id,
                "content access certificate expired; regenerating"
            );
        }

        let grant = self.resolve_grant(consumer, now)?;
        let key_pair = self.key_pairs.get_or_create_key_pair(&consumer.uuid)?;
        let subject = DistinguishedName::builder()
            .common_name(consumer.uuid.clone())
            .organization(consumer.owner_key.clone())
            .build();

        let issued = self.issue(IssueParams {
            consumer_id: &consumer.uuid,
            key_pair_ref: &consumer.uuid,
            key_pair,
            subject,
            grant,
            lifetime: self.config.certificate_lifetime(),
            now,
        })?;
        let committed = self.certificates.commit_issuance(issued)?;
        info!(
            consumer_id = %consumer.uuid,
            serial = committed.serial.id,
            "issued content access certificate"
        );
        Ok(committed)
    }

    /// Returns a certificate granting the owner-level content of the
    /// anonymous consumer's owner.
    ///
    /// Certificates are shared by all anonymous consumers of an owner while
    /// the owner's content version is unchanged; a cache hit performs no
    /// key or signing work. The returned copy names the caller in
    /// `consumer_id`.
    pub fn get_anonymous_certificate(&self, consumer: &AnonymousConsumer) -> Result<ContentAccessCertificate> {
        let version = self
            .content
            .content_version(&consumer.owner_key)?
            .ok_or_else(|| upstream(format!("no content version for owner {}", consumer.owner_key)))?;
        let fingerprint = CacheFingerprint::new(&consumer.owner_key, version);

        let mut certificate = match self.anonymous_cache.get(&fingerprint, OffsetDateTime::now_utc()) {
            Some(cached) => {
                debug!(%fingerprint, "anonymous certificate cache hit");
                cached
            }
            None => {
                let issued = {
                    let fill_lock = self.anonymous_cache.fill_lock(&fingerprint);
                    let _guard = fill_lock.lock().unwrap_or_else(PoisonError::into_inner);
                    // Another caller may have filled the entry while we waited.
                    match self.anonymous_cache.peek(&fingerprint, OffsetDateTime::now_utc()) {
                        Some(cached) => Ok(cached),
                        None => self.fill_anonymous(consumer, version, &fingerprint),
                    }
                };
                self.anonymous_cache.release_fill_lock(&fingerprint);
                issued?
            }
        };
        certificate.consumer_id = consumer.uuid.clone();
        Ok(certificate)
    }

    fn fill_anonymous(
        &self,
        consumer: &AnonymousConsumer,
        version: u64,
        fingerprint: &CacheFingerprint,
    ) -> Result<ContentAccessCertificate> {
        debug!(%fingerprint, "anonymous certificate cache miss");
        let now = OffsetDateTime::now_utc();
        let content = self
            .content
            .owner_content(&consumer.owner_key)?
            .ok_or_else(|| upstream(format!("no content for owner {}", consumer.owner_key)))?;
        let grant = ContentGrant::new(
            consumer.owner_key.clone(),
            ContentAccessMode::OrgEnvironment,
            Vec::new(),
            content,
        );

        let key_pair_ref = format!("anonymous:{fingerprint}");
        let key_pair = self.key_pairs.get_or_create_key_pair(&key_pair_ref)?;
        let subject = DistinguishedName::builder()
            .common_name(format!("anonymous-{}", &fingerprint.as_str()[..16]))
            .organization(consumer.owner_key.clone())
            .build();

        let mut issued = self.issue(IssueParams {
            consumer_id: &consumer.uuid,
            key_pair_ref: &key_pair_ref,
            key_pair,
            subject,
            grant,
            lifetime: self.config.anonymous_certificate_lifetime(),
            now,
        })?;
        issued.serial = self.certificates.record_serial(issued.serial)?;
        debug!(%fingerprint, serial = issued.serial.id, "issued anonymous certificate");

        self.anonymous_cache.insert(
            fingerprint.clone(),
            &consumer.owner_key,
            version,
            issued.clone(),
            now,
        );
        Ok(issued)
    }

    /// Drops cached anonymous certificates of an owner whose content set
    /// changed. Returns how many entries were removed.
    pub fn invalidate_owner_content(&self, owner_key: &str) -> usize {
        let removed = self.anonymous_cache.invalidate_owner(owner_key);
        debug!(owner_key, removed, "invalidated anonymous certificates");
        removed
    }

    pub fn certificate_history(&self, consumer_id: &str) -> Result<Vec<ContentAccessCertificate>> {
        self.certificates.certificate_history(consumer_id)
    }

    pub fn anonymous_cache_stats(&self) -> CacheStats {
        self.anonymous_cache.stats()
    }

    pub fn authority(&self) -> &CertificateAuthority {
        &self.authority
    }

    /// Computes the content the consumer is entitled to at `now`.
    pub fn resolve_grant(&self, consumer: &Consumer, now: OffsetDateTime) -> Result<ContentGrant> {
        let mode = self
            .owners
            .content_access_mode(&consumer.owner_key)?
            .ok_or_else(|| upstream(format!("unknown owner {}", consumer.owner_key)))?;

        let content = match mode {
            ContentAccessMode::Entitlement => {
                let mut content = Vec::new();
                for entitlement in self.content.entitlements(consumer)? {
                    if !entitlement.is_active_at(now) {
                        continue;
                    }
                    let items = self.content.product_content(&entitlement.product_id)?.ok_or_else(|| {
                        upstream(format!(
                            "product {} of entitlement {} not found",
                            entitlement.product_id, entitlement.id
                        ))
                    })?;
                    content.extend(items);
                }
                content
            }
            ContentAccessMode::OrgEnvironment if consumer.environment_ids.is_empty() => self
                .content
                .owner_content(&consumer.owner_key)?
                .ok_or_else(|| upstream(format!("no content for owner {}", consumer.owner_key)))?,
            ContentAccessMode::OrgEnvironment => {
                let mut content = Vec::new();
                for environment_id in &consumer.environment_ids {
                    let items = self
                        .content
                        .environment_content(environment_id)?
                        .ok_or_else(|| upstream(format!("environment {environment_id} not found")))?;
                    content.extend(items);
                }
                content
            }
        };

        Ok(ContentGrant::new(
            consumer.owner_key.clone(),
            mode,
            consumer.environment_ids.iter().cloned(),
            content,
        ))
    }

    fn issue(&self, params: IssueParams<'_>) -> Result<ContentAccessCertificate> {
        let serial = self.serials.next_serial()?;
        let validity = Validity::backdated(params.now, self.config.backdate(), params.lifetime)?;
        let extensions = self.extensions.build(&params.grant)?;
        let payload = self.extensions.payload(&params.grant)?;
        let private_key_pem = params.key_pair.private_key_pem()?;

        let request = CertificateRequest::builder()
            .subject(params.subject)
            .extensions(extensions)
            .validity(validity)
            .key_pair(params.key_pair)
            .serial(serial)
            .build();
        let record = self.authority.create_certificate(&request)?;

        Ok(ContentAccessCertificate {
            consumer_id: params.consumer_id.to_string(),
            serial: CertificateSerial::new(serial, record.not_after),
            certificate_pem: record.to_pem(),
            certificate: record,
            key_pair_ref: params.key_pair_ref.to_string(),
            grant: params.grant,
            private_key_pem,
            entitlement_data_pem: der_to_pem(&payload, ENTITLEMENT_DATA_LABEL),
            timestamps: AuditTimestamps::default(),
        })
    }
}

struct IssueParams<'a> {
    consumer_id: &'a str,
    key_pair_ref: &'a str,
    key_pair: KeyPair,
    subject: DistinguishedName,
    grant: ContentGrant,
    lifetime: Duration,
    now: OffsetDateTime,
}

fn upstream(message: String) -> PkiError {
    warn!(%message, "upstream data could not be resolved");
    PkiError::UpstreamData(message)
}
