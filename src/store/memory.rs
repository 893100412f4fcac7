use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use rand::Rng;
use time::OffsetDateTime;
use tracing::debug;

use super::{CertificateStore, KeyPairDataStore, SerialAllocator};
use crate::error::{PkiError, Result};
use crate::keystore::KeyPairData;
use crate::model::{CertificateSerial, ContentAccessCertificate};

#[derive(Default)]
struct MemoryState {
    key_pairs: HashMap<String, KeyPairData>,
    serials: HashMap<u64, CertificateSerial>,
    allocated: HashSet<u64>,
    // Per consumer, oldest first; the last entry is current.
    certificates: HashMap<String, Vec<ContentAccessCertificate>>,
}

/// In-memory key pair, serial and certificate storage.
///
/// All writes go through one lock, so an issuance is visible in full or not
/// at all.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| PkiError::Storage("memory store lock poisoned".to_string()))
    }

    /// Number of serial records written.
    pub fn serial_count(&self) -> Result<usize> {
        Ok(self.state()?.serials.len())
    }

    /// Number of serials handed out by the allocator.
    pub fn allocated_serial_count(&self) -> Result<usize> {
        Ok(self.state()?.allocated.len())
    }

    /// Number of certificates stored for the consumer, current included.
    pub fn certificate_count(&self, consumer_id: &str) -> Result<usize> {
        Ok(self
            .state()?
            .certificates
            .get(consumer_id)
            .map_or(0, Vec::len))
    }

    fn joined(state: &MemoryState, certificate: &ContentAccessCertificate) -> ContentAccessCertificate {
        let mut certificate = certificate.clone();
        if let Some(serial) = state.serials.get(&certificate.serial.id) {
            certificate.serial = serial.clone();
        }
        certificate
    }
}

impl KeyPairDataStore for MemoryStore {
    fn key_pair_for(&self, entity_id: &str) -> Result<Option<KeyPairData>> {
        Ok(self.state()?.key_pairs.get(entity_id).cloned())
    }

    fn save_key_pair(&self, mut data: KeyPairData) -> Result<KeyPairData> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state()?;
        if state.key_pairs.contains_key(&data.entity_id) {
            data.timestamps.on_update(now);
        } else {
            data.timestamps.on_create(now);
        }
        state.key_pairs.insert(data.entity_id.clone(), data.clone());
        Ok(data)
    }
}

impl CertificateStore for MemoryStore {
    fn serial(&self, id: u64) -> Result<Option<CertificateSerial>> {
        Ok(self.state()?.serials.get(&id).cloned())
    }

    fn record_serial(&self, mut serial: CertificateSerial) -> Result<CertificateSerial> {
        let mut state = self.state()?;
        if state.serials.contains_key(&serial.id) {
            return Err(PkiError::Storage(format!("serial {} is already recorded", serial.id)));
        }
        serial.timestamps.on_create(OffsetDateTime::now_utc());
        state.serials.insert(serial.id, serial.clone());
        Ok(serial)
    }

    fn merge_serial(&self, mut serial: CertificateSerial) -> Result<CertificateSerial> {
        let mut state = self.state()?;
        let Some(existing) = state.serials.get(&serial.id) else {
            return Err(PkiError::Storage(format!("no serial record {}", serial.id)));
        };
        serial.timestamps = existing.timestamps;
        serial.timestamps.on_update(OffsetDateTime::now_utc());
        state.serials.insert(serial.id, serial.clone());
        Ok(serial)
    }

    fn current_certificate(&self, consumer_id: &str) -> Result<Option<ContentAccessCertificate>> {
        let state = self.state()?;
        Ok(state
            .certificates
            .get(consumer_id)
            .and_then(|history| history.last())
            .map(|certificate| Self::joined(&state, certificate)))
    }

    fn certificate_history(&self, consumer_id: &str) -> Result<Vec<ContentAccessCertificate>> {
        let state = self.state()?;
        let Some(history) = state.certificates.get(consumer_id) else {
            return Ok(Vec::new());
        };
        let superseded = history.len().saturating_sub(1);
        Ok(history[..superseded]
            .iter()
            .map(|certificate| Self::joined(&state, certificate))
            .collect())
    }

    fn commit_issuance(
        &self,
        mut certificate: ContentAccessCertificate,
    ) -> Result<ContentAccessCertificate> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state()?;

        if state.serials.contains_key(&certificate.serial.id) {
            return Err(PkiError::Storage(format!(
                "serial {} is already recorded",
                certificate.serial.id
            )));
        }
        if !state.key_pairs.contains_key(&certificate.key_pair_ref) {
            return Err(PkiError::Storage(format!(
                "certificate references unknown key pair {}",
                certificate.key_pair_ref
            )));
        }

        certificate.serial.timestamps.on_create(now);
        certificate.timestamps.on_create(now);
        state
            .serials
            .insert(certificate.serial.id, certificate.serial.clone());
        state
            .certificates
            .entry(certificate.consumer_id.clone())
            .or_default()
            .push(certificate.clone());

        debug!(
            consumer_id = %certificate.consumer_id,
            serial = certificate.serial.id,
            "committed certificate"
        );
        Ok(certificate)
    }
}

impl SerialAllocator for MemoryStore {
    /// Random positive serials, never repeated within this store.
    fn next_serial(&self) -> Result<u64> {
        let mut state = self.state()?;
        let mut rng = rand::rng();
        loop {
            let candidate = rng.random_range(1..=i64::MAX as u64);
            if !state.serials.contains_key(&candidate) && state.allocated.insert(candidate) {
                return Ok(candidate);
            }
        }
    }
}
