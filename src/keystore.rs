//! Per-entity key pair storage, recovery and generation.
//!
//! Stored key material goes through three decode attempts, in order: the
//! canonical SPKI/PKCS#8 DER encoding, each registered legacy decoder, and
//! finally regeneration. Whatever path is taken, the stored record ends up
//! holding the canonical encoding of the returned key pair.

use std::sync::Arc;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info, warn};

use crate::error::{PkiError, Result};
use crate::key::{KeyPair, MIN_RSA_BITS};
use crate::model::AuditTimestamps;
use crate::store::KeyPairDataStore;

/// Stored key material of one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPairData {
    /// Identifier of the owning entity (consumer uuid, cache fingerprint, ...).
    pub entity_id: String,
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
    pub timestamps: AuditTimestamps,
}

impl KeyPairData {
    /// Canonical encoding of `key_pair` for `entity_id`.
    pub fn encode(entity_id: &str, key_pair: &KeyPair) -> Result<Self> {
        Ok(Self {
            entity_id: entity_id.to_string(),
            public_key: key_pair.public_key_der()?,
            private_key: key_pair.private_key_der()?,
            timestamps: AuditTimestamps::default(),
        })
    }

    /// Decodes the canonical encoding.
    pub fn decode(&self) -> Result<KeyPair> {
        KeyPair::from_canonical_der(&self.public_key, &self.private_key)
    }
}

/// Decoder for a non-canonical key encoding found in older records.
///
/// Implementations must return key material identical to what the blob
/// encodes, or an error; they must never substitute a different key.
pub trait LegacyKeyDecoder: Send + Sync {
    /// Short label used in log output.
    fn name(&self) -> &'static str;

    fn decode(&self, public_key: &[u8], private_key: &[u8]) -> Result<KeyPair>;
}

/// Bare PKCS#1 `RSAPublicKey` / `RSAPrivateKey` DER.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pkcs1DerDecoder;

impl LegacyKeyDecoder for Pkcs1DerDecoder {
    fn name(&self) -> &'static str {
        "pkcs1-der"
    }

    fn decode(&self, public_key: &[u8], private_key: &[u8]) -> Result<KeyPair> {
        let public = RsaPublicKey::from_pkcs1_der(public_key)?;
        let private = RsaPrivateKey::from_pkcs1_der(private_key)?;
        KeyPair::from_parts(public, private)
    }
}

/// PEM-armoured keys, PKCS#1 or PKCS#8/SPKI.
#[derive(Debug, Default, Clone, Copy)]
pub struct PemKeyDecoder;

impl PemKeyDecoder {
    fn public(bytes: &[u8]) -> Result<RsaPublicKey> {
        let block = pem::parse(bytes).map_err(|e| PkiError::DecodingError(e.to_string()))?;
        match block.tag() {
            "PUBLIC KEY" => Ok(RsaPublicKey::from_public_key_der(block.contents())?),
            "RSA PUBLIC KEY" => Ok(RsaPublicKey::from_pkcs1_der(block.contents())?),
            other => Err(PkiError::DecodingError(format!(
                "unexpected PEM label for a public key: {other}"
            ))),
        }
    }

    fn private(bytes: &[u8]) -> Result<RsaPrivateKey> {
        let block = pem::parse(bytes).map_err(|e| PkiError::DecodingError(e.to_string()))?;
        match block.tag() {
            "PRIVATE KEY" => Ok(RsaPrivateKey::from_pkcs8_der(block.contents())?),
            "RSA PRIVATE KEY" => Ok(RsaPrivateKey::from_pkcs1_der(block.contents())?),
            other => Err(PkiError::DecodingError(format!(
                "unexpected PEM label for a private key: {other}"
            ))),
        }
    }
}

impl LegacyKeyDecoder for PemKeyDecoder {
    fn name(&self) -> &'static str {
        "pem"
    }

    fn decode(&self, public_key: &[u8], private_key: &[u8]) -> Result<KeyPair> {
        KeyPair::from_parts(Self::public(public_key)?, Self::private(private_key)?)
    }
}

/// How a key pair request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPairResolution {
    /// Nothing was stored; a new key pair was generated.
    Generated,
    /// The stored canonical encoding was decoded as-is.
    Loaded,
    /// A legacy encoding was decoded and rewritten canonically.
    Converted,
    /// The stored data was unreadable and has been replaced.
    Regenerated,
}

/// Hands out the key pair of an entity, creating or repairing it on demand.
pub struct KeyPairService {
    store: Arc<dyn KeyPairDataStore>,
    key_size_bits: usize,
    legacy_decoders: Vec<Box<dyn LegacyKeyDecoder>>,
}

impl KeyPairService {
    /// Creates a service with the built-in PKCS#1 and PEM legacy decoders.
    ///
    /// Fails with [`PkiError::InvalidInput`] when `key_size_bits` is below
    /// [`MIN_RSA_BITS`].
    pub fn new(store: Arc<dyn KeyPairDataStore>, key_size_bits: usize) -> Result<Self> {
        if key_size_bits < MIN_RSA_BITS {
            return Err(PkiError::InvalidInput(format!(
                "RSA keys must be at least {MIN_RSA_BITS} bits, got {key_size_bits}"
            )));
        }
        Ok(Self {
            store,
            key_size_bits,
            legacy_decoders: vec![Box::new(Pkcs1DerDecoder), Box::new(PemKeyDecoder)],
        })
    }

    /// Registers an additional legacy decoder, tried after the existing ones.
    pub fn with_legacy_decoder(mut self, decoder: impl LegacyKeyDecoder + 'static) -> Self {
        self.legacy_decoders.push(Box::new(decoder));
        self
    }

    pub fn key_size_bits(&self) -> usize {
        self.key_size_bits
    }

    /// Returns the key pair of `entity_id`, generating, converting or
    /// repairing the stored record as needed.
    pub fn get_or_create_key_pair(&self, entity_id: &str) -> Result<KeyPair> {
        self.resolve_key_pair(entity_id).map(|(key_pair, _)| key_pair)
    }

    /// Like [`get_or_create_key_pair`](Self::get_or_create_key_pair), also
    /// reporting which path was taken.
    pub fn resolve_key_pair(&self, entity_id: &str) -> Result<(KeyPair, KeyPairResolution)> {
        let Some(stored) = self.store.key_pair_for(entity_id)? else {
            let key_pair = self.generate(entity_id)?;
            self.persist(entity_id, &key_pair, None)?;
            return Ok((key_pair, KeyPairResolution::Generated));
        };

        match stored.decode() {
            Ok(key_pair) => return Ok((key_pair, KeyPairResolution::Loaded)),
            Err(err) => debug!(entity_id, error = %err, "stored key pair is not canonical"),
        }

        for decoder in &self.legacy_decoders {
            match decoder.decode(&stored.public_key, &stored.private_key) {
                Ok(key_pair) => {
                    info!(
                        entity_id,
                        decoder = decoder.name(),
                        "converting legacy key pair encoding"
                    );
                    self.persist(entity_id, &key_pair, Some(&stored))?;
                    return Ok((key_pair, KeyPairResolution::Converted));
                }
                Err(err) => debug!(entity_id, decoder = decoder.name(), error = %err, "legacy decode failed"),
            }
        }

        warn!(entity_id, "stored key pair is unreadable; generating a replacement");
        let key_pair = self.generate(entity_id)?;
        self.persist(entity_id, &key_pair, Some(&stored))?;
        Ok((key_pair, KeyPairResolution::Regenerated))
    }

    fn generate(&self, entity_id: &str) -> Result<KeyPair> {
        debug!(entity_id, bits = self.key_size_bits, "generating RSA key pair");
        KeyPair::generate_rsa(self.key_size_bits)
    }

    // The record is encoded completely before the store sees it, so a
    // failure leaves the previous record untouched.
    fn persist(
        &self,
        entity_id: &str,
        key_pair: &KeyPair,
        previous: Option<&KeyPairData>,
    ) -> Result<KeyPairData> {
        let mut data = KeyPairData::encode(entity_id, key_pair)?;
        if let Some(previous) = previous {
            data.timestamps = previous.timestamps;
        }
        self.store.save_key_pair(data)
    }
}
