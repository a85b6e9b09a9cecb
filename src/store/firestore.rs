//! Firestore-backed document store.
//!
//! Tree records live as schemaless documents in the `trees` collection,
//! reached through the Firestore REST API. Firestore assigns document ids on
//! creation; the id is the last path segment of the returned resource name.

use crate::config::GoogleConfig;
use crate::store::{DocumentStore, Result, StoreError, TokenSource, TreeDocument, TreePatch};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const COLLECTION: &str = "trees";

/// A Firestore typed string field.
#[derive(Debug, Serialize, Deserialize)]
struct StringValue {
    #[serde(rename = "stringValue")]
    value: String,
}

impl StringValue {
    fn new(value: impl Into<String>) -> Option<Self> {
        Some(Self { value: value.into() })
    }
}

/// The `fields` map of a tree document in Firestore's typed-value encoding.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TreeFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<StringValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<StringValue>,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    image_url: Option<StringValue>,
}

#[derive(Debug, Serialize)]
struct DocumentBody {
    fields: TreeFields,
}

#[derive(Debug, Deserialize)]
struct Document {
    /// Full resource name, `projects/.../documents/trees/{id}`
    name: String,
    #[serde(default)]
    fields: TreeFields,
}

impl Document {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn into_tree(self) -> TreeDocument {
        TreeDocument {
            name: self.fields.name.map(|v| v.value).unwrap_or_default(),
            description: self.fields.description.map(|v| v.value).unwrap_or_default(),
            image_url: self.fields.image_url.map(|v| v.value).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

/// Document store client for one Firestore database.
pub struct FirestoreStore {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    /// `{endpoint}/projects/{project}/databases/(default)/documents`
    documents_base: String,
}

impl FirestoreStore {
    pub fn new(google: &GoogleConfig, tokens: Arc<TokenSource>, http: reqwest::Client) -> Self {
        let documents_base = format!(
            "{}/projects/{}/databases/(default)/documents",
            google.firestore_endpoint.trim_end_matches('/'),
            google.project_id
        );
        Self {
            http,
            tokens,
            documents_base,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.documents_base, COLLECTION)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.documents_base, COLLECTION, id)
    }

    async fn bearer(&self) -> Result<String> {
        self.tokens.token().await
    }
}

fn fields_from_patch(patch: &TreePatch) -> TreeFields {
    TreeFields {
        name: StringValue::new(patch.name.clone()),
        description: StringValue::new(patch.description.clone()),
        image_url: patch.image_url.clone().and_then(StringValue::new),
    }
}

async fn into_store_error(operation: &'static str, response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Api { operation, status, body }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn add(&self, doc: &TreeDocument) -> Result<String> {
        const OP: &str = "add document";
        let body = DocumentBody {
            fields: TreeFields {
                name: StringValue::new(doc.name.clone()),
                description: StringValue::new(doc.description.clone()),
                image_url: StringValue::new(doc.image_url.clone()),
            },
        };

        let response = self
            .http
            .post(self.collection_url())
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        if !response.status().is_success() {
            return Err(into_store_error(OP, response).await);
        }

        let created: Document = response
            .json()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        Ok(created.id().to_string())
    }

    async fn list(&self) -> Result<Vec<(String, TreeDocument)>> {
        const OP: &str = "list documents";
        let response = self
            .http
            .get(self.collection_url())
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        if !response.status().is_success() {
            return Err(into_store_error(OP, response).await);
        }

        let listed: ListDocumentsResponse = response
            .json()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        Ok(listed
            .documents
            .into_iter()
            .map(|doc| (doc.id().to_string(), doc.into_tree()))
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<TreeDocument>> {
        const OP: &str = "get document";
        let response = self
            .http
            .get(self.document_url(id))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(into_store_error(OP, response).await);
        }

        let doc: Document = response
            .json()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        Ok(Some(doc.into_tree()))
    }

    async fn update(&self, id: &str, patch: &TreePatch) -> Result<()> {
        const OP: &str = "update document";

        // Firestore PATCH replaces the whole document unless an update mask
        // restricts it to the named fields.
        let mut mask: Vec<(&str, &str)> = vec![
            ("updateMask.fieldPaths", "name"),
            ("updateMask.fieldPaths", "description"),
        ];
        if patch.image_url.is_some() {
            mask.push(("updateMask.fieldPaths", "imageUrl"));
        }

        let body = DocumentBody {
            fields: fields_from_patch(patch),
        };

        let response = self
            .http
            .patch(self.document_url(id))
            .query(&mask)
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !response.status().is_success() {
            return Err(into_store_error(OP, response).await);
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        const OP: &str = "delete document";
        let response = self
            .http
            .delete(self.document_url(id))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        // Firestore deletes are idempotent: a missing document still succeeds
        if !response.status().is_success() {
            return Err(into_store_error(OP, response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store(server: &MockServer) -> FirestoreStore {
        let google = GoogleConfig {
            project_id: "tree-shop".to_string(),
            firestore_endpoint: server.uri(),
            ..GoogleConfig::default()
        };
        FirestoreStore::new(&google, Arc::new(TokenSource::fixed("test-token")), reqwest::Client::new())
    }

    fn firestore_doc(id: &str, name: &str, description: &str, image_url: &str) -> serde_json::Value {
        json!({
            "name": format!("projects/tree-shop/databases/(default)/documents/trees/{id}"),
            "fields": {
                "name": { "stringValue": name },
                "description": { "stringValue": description },
                "imageUrl": { "stringValue": image_url }
            },
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn add_returns_generated_document_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/tree-shop/databases/(default)/documents/trees"))
            .and(body_partial_json(json!({
                "fields": { "name": { "stringValue": "Oak" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(firestore_doc(
                "abc123",
                "Oak",
                "Tall tree",
                "https://storage.googleapis.com/b/f.png",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let store = test_store(&server);
        let id = store
            .add(&TreeDocument {
                name: "Oak".to_string(),
                description: "Tall tree".to_string(),
                image_url: "https://storage.googleapis.com/b/f.png".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(id, "abc123");
    }

    #[tokio::test]
    async fn get_missing_document_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/tree-shop/databases/(default)/documents/trees/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "status": "NOT_FOUND" }
            })))
            .mount(&server)
            .await;

        let store = test_store(&server);
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_decodes_typed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/tree-shop/databases/(default)/documents/trees/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(firestore_doc(
                "abc123",
                "Oak",
                "Tall tree",
                "https://storage.googleapis.com/b/f.png",
            )))
            .mount(&server)
            .await;

        let store = test_store(&server);
        let doc = store.get("abc123").await.unwrap().unwrap();
        assert_eq!(doc.name, "Oak");
        assert_eq!(doc.description, "Tall tree");
        assert_eq!(doc.image_url, "https://storage.googleapis.com/b/f.png");
    }

    #[tokio::test]
    async fn list_with_empty_collection_is_empty() {
        let server = MockServer::start().await;
        // Firestore omits the documents array entirely for empty collections
        Mock::given(method("GET"))
            .and(path("/projects/tree-shop/databases/(default)/documents/trees"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let store = test_store(&server);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_without_image_masks_text_fields_only() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/projects/tree-shop/databases/(default)/documents/trees/abc123"))
            .and(query_param("updateMask.fieldPaths", "name"))
            .respond_with(ResponseTemplate::new(200).set_body_json(firestore_doc("abc123", "Birch", "Short tree", "")))
            .expect(1)
            .mount(&server)
            .await;

        let store = test_store(&server);
        store
            .update(
                "abc123",
                &TreePatch {
                    name: "Birch".to_string(),
                    description: "Short tree".to_string(),
                    image_url: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/projects/tree-shop/databases/(default)/documents/trees/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "status": "NOT_FOUND" }
            })))
            .mount(&server)
            .await;

        let store = test_store(&server);
        let err = store
            .update(
                "nope",
                &TreePatch {
                    name: "Birch".to_string(),
                    description: "Short tree".to_string(),
                    image_url: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn server_errors_surface_as_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/tree-shop/databases/(default)/documents/trees"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = test_store(&server);
        let err = store.list().await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 500, .. }));
    }
}
