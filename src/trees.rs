//! Tree record service.
//!
//! Orchestrates the four CRUD operations over the injected document and blob
//! stores. Image transfer is sequenced strictly before the document write:
//! the blob store only guarantees a valid public URL once the upload has been
//! acknowledged, so create and update-with-file run as
//! stage -> upload -> make public -> persist reference.
//!
//! Partial-failure semantics are deliberately weak. A blob uploaded before a
//! failed document write is left behind, and a failed old-blob deletion does
//! not abort the document mutation; document-store consistency wins over
//! storage-leak prevention.

use crate::errors::{Error, Result};
use crate::staging::Staging;
use crate::store::{BlobStore, DocumentStore, TreeDocument, TreePatch};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A complete tree record as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
}

/// An uploaded image, as extracted from a multipart request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Fields for creating a tree. The image is optional here so the HTTP layer
/// can stay a plain parser; its absence is rejected by [`TreeService::create`].
#[derive(Debug, Default)]
pub struct CreateTree {
    pub name: String,
    pub description: String,
    pub image: Option<Upload>,
}

/// Fields for updating a tree. Without an image only the text fields change.
#[derive(Debug, Default)]
pub struct UpdateTree {
    pub name: String,
    pub description: String,
    pub image: Option<Upload>,
}

#[derive(Clone)]
pub struct TreeService {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    staging: Staging,
}

impl TreeService {
    pub fn new(documents: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>, staging: Staging) -> Self {
        Self {
            documents,
            blobs,
            staging,
        }
    }

    /// Stage an upload locally, transfer it to the blob store, and mark it
    /// public. Returns the public URL. The staged file is unlinked when the
    /// guard inside [`crate::staging::StagedUpload`] drops, on every path.
    async fn transfer_image(&self, upload: &Upload) -> Result<String> {
        let staged = self.staging.stage(&upload.file_name, &upload.data).await?;
        let data = staged.read().await?;

        self.blobs
            .upload(staged.object_name(), staged.content_type(), data)
            .await?;
        self.blobs.make_public(staged.object_name()).await?;

        Ok(self.blobs.public_url(staged.object_name()))
    }

    #[instrument(skip_all, fields(name = %req.name))]
    pub async fn create(&self, req: CreateTree) -> Result<Tree> {
        if req.name.trim().is_empty() || req.description.trim().is_empty() {
            return Err(Error::Validation {
                message: "Name and description are required.".to_string(),
            });
        }
        let image = req.image.ok_or_else(|| Error::Validation {
            message: "No file uploaded.".to_string(),
        })?;

        let image_url = self.transfer_image(&image).await?;

        let doc = TreeDocument {
            name: req.name,
            description: req.description,
            image_url,
        };
        let id = self.documents.add(&doc).await?;

        info!(%id, "Created tree");

        Ok(Tree {
            id,
            name: doc.name,
            description: doc.description,
            image_url: doc.image_url,
        })
    }

    pub async fn list(&self) -> Result<Vec<Tree>> {
        let trees = self
            .documents
            .list()
            .await?
            .into_iter()
            .map(|(id, doc)| Tree {
                id,
                name: doc.name,
                description: doc.description,
                image_url: doc.image_url,
            })
            .collect();
        Ok(trees)
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn update(&self, id: &str, req: UpdateTree) -> Result<Tree> {
        let existing = self.documents.get(id).await?.ok_or_else(|| Error::NotFound {
            resource: "Tree".to_string(),
            id: id.to_string(),
        })?;

        let image_url = match &req.image {
            Some(upload) => {
                let new_url = self.transfer_image(upload).await?;
                self.delete_blob_for(&existing.image_url).await;
                Some(new_url)
            }
            None => None,
        };

        let patch = TreePatch {
            name: req.name,
            description: req.description,
            image_url: image_url.clone(),
        };
        self.documents.update(id, &patch).await?;

        info!(replaced_image = image_url.is_some(), "Updated tree");

        Ok(Tree {
            id: id.to_string(),
            name: patch.name,
            description: patch.description,
            image_url: image_url.unwrap_or(existing.image_url),
        })
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let existing = self.documents.get(id).await?.ok_or_else(|| Error::NotFound {
            resource: "Tree".to_string(),
            id: id.to_string(),
        })?;

        self.delete_blob_for(&existing.image_url).await;
        self.documents.delete(id).await?;

        info!("Deleted tree");
        Ok(())
    }

    /// Best-effort removal of the blob a document's image URL points at. A
    /// failure is logged and swallowed: the document mutation takes priority
    /// over reclaiming the object.
    async fn delete_blob_for(&self, image_url: &str) {
        let Some(object) = object_name_from_url(image_url) else {
            return;
        };
        if let Err(e) = self.blobs.delete(object).await {
            warn!(object, error = %e, "Failed to delete blob, leaving orphan");
        }
    }
}

/// The storage key of a blob is the last path segment of its public URL.
fn object_name_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_is_last_url_segment() {
        assert_eq!(
            object_name_from_url("https://storage.googleapis.com/bucket/f.png"),
            Some("f.png")
        );
        assert_eq!(object_name_from_url(""), None);
        assert_eq!(object_name_from_url("https://storage.googleapis.com/bucket/"), None);
    }
}
