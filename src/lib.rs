//! # EntitleKit - Content Access Certificates in Pure Rust
//!
//! EntitleKit issues the cryptographic identity of consumers of a
//! subscription service: per-consumer RSA key pairs and X.509 client
//! certificates that carry the consumer's content grant in custom
//! extensions. It is built entirely with rustcrypto libraries, without
//! dependencies on ring or openssl (except for testing).
//!
//! ## Key Features
//!
//! - **Key pair lifecycle**: lazily generated RSA keys, transparent
//!   conversion of legacy encodings and repair of corrupted records
//! - **Certificate authority**: SHA256withRSA client certificates with a
//!   fixed standard extension profile plus caller-supplied extensions
//! - **Content grants**: deterministic, compressed grant payloads under the
//!   entitlement OID arc
//! - **Expiration-driven regeneration**: certificates are reused until their
//!   serial expires, with a bounded cache for anonymous consumers
//!
//! ## Quick Start
//!
//! ### Signing a Certificate
//!
//! ```rust,no_run
//! use entitlekit::{
//!     authority::CertificateAuthority,
//!     cert::extensions::X509Extension,
//!     cert::params::{CertificateRequest, DistinguishedName, Validity},
//!     key::KeyPair,
//! };
//!
//! # fn main() -> Result<(), entitlekit::error::PkiError> {
//! let ca_subject = DistinguishedName::builder()
//!     .common_name("Example CA")
//!     .organization("Example Corp".to_string())
//!     .build();
//! let ca = CertificateAuthority::generate(&ca_subject, Validity::for_days(3650), 4096)?;
//!
//! let request = CertificateRequest::builder()
//!     .subject(DistinguishedName::new("consumer-uuid"))
//!     .extensions(vec![X509Extension::string(
//!         "1.3.6.1.4.1.2312.9.8".parse().expect("valid OID"),
//!         "OrgLevel",
//!     )])
//!     .validity(Validity::for_days(365))
//!     .key_pair(KeyPair::generate_rsa(4096)?)
//!     .serial(1999)
//!     .build();
//!
//! let record = ca.create_certificate(&request)?;
//! println!("{}", record.to_pem());
//! # Ok(())
//! # }
//! ```
//!
//! ### Issuing Content Access Certificates
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use entitlekit::{
//!     authority::CertificateAuthority,
//!     cert::params::{DistinguishedName, Validity},
//!     content_access::ContentAccessCertificateManager,
//!     keystore::KeyPairService,
//!     model::Consumer,
//!     store::{ContentSource, OwnerDirectory, memory::MemoryStore},
//! };
//!
//! # fn run(
//! #     content: Arc<dyn ContentSource>,
//! #     owners: Arc<dyn OwnerDirectory>,
//! # ) -> Result<(), entitlekit::error::PkiError> {
//! let store = Arc::new(MemoryStore::new());
//! let ca = CertificateAuthority::generate(&DistinguishedName::new("Example CA"), Validity::for_days(3650), 4096)?;
//!
//! let manager = ContentAccessCertificateManager::builder()
//!     .authority(Arc::new(ca))
//!     .key_pairs(KeyPairService::new(store.clone(), 4096)?)
//!     .certificate_store(store.clone())
//!     .serial_allocator(store)
//!     .content_source(content)
//!     .owner_directory(owners)
//!     .build()?;
//!
//! let certificate = manager.get_certificate(&Consumer::new("consumer-uuid", "acme"))?;
//! println!("{}", certificate.cert());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`error::PkiError`]:
//!
//! ```rust
//! use entitlekit::{key::KeyPair, error::PkiError};
//!
//! match KeyPair::generate_rsa(1024) {
//!     Ok(_) => println!("Key generated"),
//!     Err(PkiError::InvalidInput(msg)) => println!("Invalid input: {}", msg),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: RSA key pairs, canonical encodings and signatures
//! - [`keystore`]: Per-entity key storage, legacy conversion and repair
//! - [`cert`]: Certificate encoding, decoding and extensions
//! - [`authority`]: The signing certificate authority
//! - [`grant`]: Content grants and the entitlement extensions
//! - [`content_access`]: Per-consumer issuance policy and the anonymous cache
//! - [`store`]: Storage and lookup collaborators
//! - [`config`]: Issuance settings
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod authority;
pub mod cert;
pub mod config;
pub mod content_access;
pub mod error;
pub mod grant;
pub mod issuer;
pub mod key;
pub mod keystore;
pub mod model;
pub mod pem_utils;
pub mod store;
pub mod tbs_certificate;
