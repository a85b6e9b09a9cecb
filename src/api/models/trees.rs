use crate::trees::Tree;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A complete tree record
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TreeResponse {
    /// Document-store-assigned identifier
    pub id: String,
    pub name: String,
    pub description: String,
    /// Public URL of the tree's image in the blob store
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

impl From<Tree> for TreeResponse {
    fn from(tree: Tree) -> Self {
        Self {
            id: tree.id,
            name: tree.name,
            description: tree.description,
            image_url: tree.image_url,
        }
    }
}

/// Confirmation plus the full current record after an update
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TreeUpdateResponse {
    pub message: String,
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

impl TreeUpdateResponse {
    pub fn updated(tree: Tree) -> Self {
        Self {
            message: "Tree updated successfully".to_string(),
            id: tree.id,
            name: tree.name,
            description: tree.description,
            image_url: tree.image_url,
        }
    }
}
