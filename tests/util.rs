#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use entitlekit::authority::CertificateAuthority;
use entitlekit::cert::params::{DistinguishedName, Validity};
use entitlekit::config::PkiConfig;
use entitlekit::content_access::ContentAccessCertificateManager;
use entitlekit::error::Result;
use entitlekit::keystore::{KeyPairData, KeyPairService};
use entitlekit::model::{Consumer, Content, ContentAccessMode, Entitlement};
use entitlekit::store::memory::MemoryStore;
use entitlekit::store::{ContentSource, KeyPairDataStore, OwnerDirectory};

pub const TEST_KEY_BITS: usize = 2048;

/// One CA shared by every test in a binary; RSA generation is slow.
pub fn test_ca() -> Arc<CertificateAuthority> {
    static CA: OnceLock<Arc<CertificateAuthority>> = OnceLock::new();
    CA.get_or_init(|| {
        let subject = DistinguishedName::builder()
            .common_name("Test CA")
            .organization("Test Org".to_string())
            .build();
        Arc::new(
            CertificateAuthority::generate(&subject, Validity::for_days(3650), TEST_KEY_BITS)
                .expect("test CA"),
        )
    })
    .clone()
}

pub fn test_config() -> PkiConfig {
    PkiConfig {
        key_size_bits: TEST_KEY_BITS,
        ..PkiConfig::default()
    }
}

pub fn content(id: &str) -> Content {
    Content {
        id: id.to_string(),
        label: format!("{id}-label"),
        name: format!("{id} name"),
        content_url: format!("/content/dist/{id}"),
        enabled: true,
    }
}

#[derive(Default)]
struct CatalogState {
    owners: HashMap<String, ContentAccessMode>,
    owner_content: HashMap<String, Vec<Content>>,
    versions: HashMap<String, u64>,
    environments: HashMap<String, Vec<Content>>,
    products: HashMap<String, Vec<Content>>,
    entitlements: HashMap<String, Vec<Entitlement>>,
}

/// Owners, products, environments and entitlements held in memory.
#[derive(Default)]
pub struct TestCatalog {
    state: Mutex<CatalogState>,
}

impl TestCatalog {
    pub fn add_owner(&self, owner_key: &str, mode: ContentAccessMode) {
        self.state.lock().unwrap().owners.insert(owner_key.to_string(), mode);
    }

    /// Replaces the owner-level content and bumps the content version.
    pub fn set_owner_content(&self, owner_key: &str, content: Vec<Content>) {
        let mut state = self.state.lock().unwrap();
        state.owner_content.insert(owner_key.to_string(), content);
        *state.versions.entry(owner_key.to_string()).or_insert(0) += 1;
    }

    pub fn add_environment(&self, environment_id: &str, content: Vec<Content>) {
        self.state
            .lock()
            .unwrap()
            .environments
            .insert(environment_id.to_string(), content);
    }

    pub fn add_product(&self, product_id: &str, content: Vec<Content>) {
        self.state
            .lock()
            .unwrap()
            .products
            .insert(product_id.to_string(), content);
    }

    pub fn add_entitlement(&self, consumer_id: &str, entitlement: Entitlement) {
        self.state
            .lock()
            .unwrap()
            .entitlements
            .entry(consumer_id.to_string())
            .or_default()
            .push(entitlement);
    }
}

impl ContentSource for TestCatalog {
    fn entitlements(&self, consumer: &Consumer) -> Result<Vec<Entitlement>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .entitlements
            .get(&consumer.uuid)
            .cloned()
            .unwrap_or_default())
    }

    fn product_content(&self, product_id: &str) -> Result<Option<Vec<Content>>> {
        Ok(self.state.lock().unwrap().products.get(product_id).cloned())
    }

    fn environment_content(&self, environment_id: &str) -> Result<Option<Vec<Content>>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .environments
            .get(environment_id)
            .cloned())
    }

    fn owner_content(&self, owner_key: &str) -> Result<Option<Vec<Content>>> {
        Ok(self.state.lock().unwrap().owner_content.get(owner_key).cloned())
    }

    fn content_version(&self, owner_key: &str) -> Result<Option<u64>> {
        Ok(self.state.lock().unwrap().versions.get(owner_key).copied())
    }
}

impl OwnerDirectory for TestCatalog {
    fn content_access_mode(&self, owner_key: &str) -> Result<Option<ContentAccessMode>> {
        Ok(self.state.lock().unwrap().owners.get(owner_key).copied())
    }
}

/// Key pair storage that counts how often records are read.
pub struct CountingKeyStore {
    inner: Arc<MemoryStore>,
    lookups: AtomicUsize,
}

impl CountingKeyStore {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl KeyPairDataStore for CountingKeyStore {
    fn key_pair_for(&self, entity_id: &str) -> Result<Option<KeyPairData>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.key_pair_for(entity_id)
    }

    fn save_key_pair(&self, data: KeyPairData) -> Result<KeyPairData> {
        self.inner.save_key_pair(data)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub keys: Arc<CountingKeyStore>,
    pub catalog: Arc<TestCatalog>,
    pub manager: ContentAccessCertificateManager,
}

pub fn harness() -> Harness {
    harness_with_config(test_config())
}

pub fn harness_with_config(config: PkiConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(TestCatalog::default());
    let keys = Arc::new(CountingKeyStore {
        inner: store.clone(),
        lookups: AtomicUsize::new(0),
    });
    let manager = ContentAccessCertificateManager::builder()
        .authority(test_ca())
        .key_pairs(KeyPairService::new(keys.clone(), config.key_size_bits).expect("key pair service"))
        .certificate_store(store.clone())
        .serial_allocator(store.clone())
        .content_source(catalog.clone())
        .owner_directory(catalog.clone())
        .config(config)
        .build()
        .expect("manager");
    Harness {
        store,
        keys,
        catalog,
        manager,
    }
}
