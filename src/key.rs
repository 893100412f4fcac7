use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    signature::{SignatureEncoding, Signer, Verifier},
};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{PkiError, Result};

/// Smallest modulus accepted for generated key pairs.
pub const MIN_RSA_BITS: usize = 2048;

/// An RSA key pair.
///
/// The canonical storage encoding is SubjectPublicKeyInfo DER for the public
/// half and PKCS#8 DER for the private half.
#[derive(Clone, Debug)]
pub struct KeyPair {
    private: Box<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && self.private == other.private
    }
}

impl Eq for KeyPair {}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        if bits < MIN_RSA_BITS {
            return Err(PkiError::InvalidInput(format!(
                "RSA keys must be at least {MIN_RSA_BITS} bits, got {bits}"
            )));
        }

        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| PkiError::KeyGenerationError(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair {
            private: Box::new(private),
            public,
        })
    }

    /// Assembles a key pair from independently decoded halves, refusing
    /// halves that do not belong together.
    pub fn from_parts(public: RsaPublicKey, private: RsaPrivateKey) -> Result<Self> {
        if RsaPublicKey::from(&private) != public {
            return Err(PkiError::InvalidInput(
                "public key does not pair with the private key".to_string(),
            ));
        }
        Ok(KeyPair {
            private: Box::new(private),
            public,
        })
    }

    /// Decodes the canonical (SPKI + PKCS#8 DER) encoding.
    pub fn from_canonical_der(public_der: &[u8], private_der: &[u8]) -> Result<Self> {
        let public = RsaPublicKey::from_public_key_der(public_der)?;
        let private = RsaPrivateKey::from_pkcs8_der(private_der)?;
        Self::from_parts(public, private)
    }

    /// True when the public half is the one derived from the private half
    /// and the private key passes RSA consistency checks.
    pub fn is_consistent(&self) -> bool {
        RsaPublicKey::from(self.private.as_ref()) == self.public && self.private.validate().is_ok()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.public.n().bits()
    }

    /// SubjectPublicKeyInfo DER of the public half.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        Ok(self.public.to_public_key_der()?.into_vec())
    }

    /// PKCS#8 DER of the private half.
    pub fn private_key_der(&self) -> Result<Vec<u8>> {
        Ok(self.private.to_pkcs8_der()?.as_bytes().to_vec())
    }

    /// PKCS#8 PEM of the private half.
    pub fn private_key_pem(&self) -> Result<String> {
        let pem = self.private.to_pkcs8_pem(LineEnding::LF)?;
        Ok(pem.as_str().to_string())
    }

    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_key(self.public.clone())?)
    }

    /// Signs `data` with SHA256withRSA (PKCS#1 v1.5 padding).
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::<Sha256>::new(*self.private.clone());
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| PkiError::RsaError(e.to_string()))?;
        Ok(signature.to_vec())
    }

    /// Checks a SHA256withRSA signature over `data` made by this key.
    pub fn verify_data(&self, data: &[u8], signature: &[u8]) -> bool {
        verify_sha256_with_rsa(&self.public, data, signature)
    }
}

/// Checks a SHA256withRSA signature against a bare public key.
pub fn verify_sha256_with_rsa(public: &RsaPublicKey, data: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public.clone())
        .verify(data, &signature)
        .is_ok()
}
