//! External storage collaborators.
//!
//! Tree records live in a schemaless cloud document store and their images in
//! an object store. Both are reached over REST and authenticated with a
//! service-account access token (see [`token`]).
//!
//! Handlers never talk to these clients directly; the [`crate::trees`]
//! service receives them as `Arc<dyn DocumentStore>` / `Arc<dyn BlobStore>`
//! so tests can substitute in-memory fakes.

pub mod firestore;
pub mod gcs;
pub mod token;

pub use firestore::FirestoreStore;
pub use gcs::GcsStore;
pub use token::TokenSource;

use async_trait::async_trait;
use thiserror::Error as ThisError;

/// Failure from a storage collaborator.
#[derive(Debug, ThisError)]
pub enum StoreError {
    /// The requested document does not exist
    #[error("document not found")]
    NotFound,

    /// The remote API answered with a non-success status
    #[error("{operation}: remote API returned {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect, TLS, timeout)
    #[error("{operation}: request failed")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Service-account credentials are missing or unusable
    #[error("credential error: {0}")]
    Credentials(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The persisted shape of a tree record, minus its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDocument {
    pub name: String,
    pub description: String,
    pub image_url: String,
}

/// Partial overwrite of a tree document. `image_url: None` leaves the stored
/// image reference untouched.
#[derive(Debug, Clone)]
pub struct TreePatch {
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
}

/// Schemaless document storage keyed by store-generated ids.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new document, returning the generated id.
    async fn add(&self, doc: &TreeDocument) -> Result<String>;

    /// All documents with their ids, in the store's natural order.
    async fn list(&self) -> Result<Vec<(String, TreeDocument)>>;

    /// Fetch one document. `Ok(None)` when the id is unknown.
    async fn get(&self, id: &str) -> Result<Option<TreeDocument>>;

    /// Overwrite the fields named by the patch.
    async fn update(&self, id: &str, patch: &TreePatch) -> Result<()>;

    /// Remove the document. Callers check existence first; removal of an
    /// already-absent id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Object storage for uploaded images, addressable by object name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object under `name`.
    async fn upload(&self, name: &str, content_type: &str, data: Vec<u8>) -> Result<()>;

    /// Mark an existing object publicly readable.
    async fn make_public(&self, name: &str) -> Result<()>;

    /// Delete the object named `name`.
    async fn delete(&self, name: &str) -> Result<()>;

    /// The public URL an object is reachable at once made public. The object
    /// name is recoverable as the last path segment of this URL.
    fn public_url(&self, name: &str) -> String;
}
