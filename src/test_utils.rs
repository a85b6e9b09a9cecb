//! Test utilities: in-memory store fakes and a ready-made test server.

use crate::config::Config;
use crate::staging::Staging;
use crate::store::{BlobStore, DocumentStore, Result, StoreError, TreeDocument, TreePatch};
use crate::trees::TreeService;
use crate::{AppState, build_router};
use async_trait::async_trait;
use axum_test::TestServer;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// In-memory [`DocumentStore`] with sequential ids.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<BTreeMap<String, TreeDocument>>,
    next_id: AtomicU64,
    fail: AtomicBool,
}

impl MemoryDocumentStore {
    /// Make every subsequent operation fail, for 500-path tests
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub async fn count(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn get_raw(&self, id: &str) -> Option<TreeDocument> {
        self.docs.lock().await.get(id).cloned()
    }

    fn check_fail(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                operation: "fake store",
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add(&self, doc: &TreeDocument) -> Result<String> {
        self.check_fail()?;
        let id = format!("tree-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.docs.lock().await.insert(id.clone(), doc.clone());
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<(String, TreeDocument)>> {
        self.check_fail()?;
        Ok(self
            .docs
            .lock()
            .await
            .iter()
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<TreeDocument>> {
        self.check_fail()?;
        Ok(self.docs.lock().await.get(id).cloned())
    }

    async fn update(&self, id: &str, patch: &TreePatch) -> Result<()> {
        self.check_fail()?;
        let mut docs = self.docs.lock().await;
        let doc = docs.get_mut(id).ok_or(StoreError::NotFound)?;
        doc.name = patch.name.clone();
        doc.description = patch.description.clone();
        if let Some(url) = &patch.image_url {
            doc.image_url = url.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_fail()?;
        self.docs.lock().await.remove(id);
        Ok(())
    }
}

/// In-memory [`BlobStore`] tracking object contents and public flags.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    public: Mutex<HashSet<String>>,
}

impl MemoryBlobStore {
    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.objects.lock().await.contains_key(name)
    }

    pub async fn is_public(&self, name: &str) -> bool {
        self.public.lock().await.contains(name)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, name: &str, _content_type: &str, data: Vec<u8>) -> Result<()> {
        self.objects.lock().await.insert(name.to_string(), data);
        Ok(())
    }

    async fn make_public(&self, name: &str) -> Result<()> {
        if !self.objects.lock().await.contains_key(name) {
            return Err(StoreError::NotFound);
        }
        self.public.lock().await.insert(name.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if self.objects.lock().await.remove(name).is_none() {
            return Err(StoreError::NotFound);
        }
        self.public.lock().await.remove(name);
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!("https://storage.googleapis.com/test-bucket.appspot.com/{name}")
    }
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }
}

/// A running test server plus handles on its fake stores.
pub struct TestApp {
    pub server: TestServer,
    pub documents: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    _staging_dir: tempfile::TempDir,
}

pub async fn create_test_app() -> TestApp {
    let documents = Arc::new(MemoryDocumentStore::default());
    let blobs = Arc::new(MemoryBlobStore::default());

    let staging_dir = tempfile::tempdir().expect("Failed to create staging dir");
    let staging = Staging::init(staging_dir.path()).await.expect("Failed to init staging");

    let trees = TreeService::new(documents.clone(), blobs.clone(), staging);
    let state = AppState::builder().config(create_test_config()).trees(trees).build();

    let router = build_router(&state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to start test server");

    TestApp {
        server,
        documents,
        blobs,
        _staging_dir: staging_dir,
    }
}
