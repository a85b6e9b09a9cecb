//! Cloud Storage-backed blob store.
//!
//! Uploaded images are written to a single bucket through the JSON API, made
//! publicly readable with an `allUsers` ACL entry, and served from the public
//! `https://storage.googleapis.com/{bucket}/{object}` scheme.

use crate::config::GoogleConfig;
use crate::store::{BlobStore, Result, StoreError, TokenSource};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

/// Blob store client for one bucket.
pub struct GcsStore {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    bucket: String,
    /// `{endpoint}`, no trailing slash
    endpoint: String,
}

impl GcsStore {
    pub fn new(google: &GoogleConfig, tokens: Arc<TokenSource>, http: reqwest::Client) -> Self {
        Self {
            http,
            tokens,
            bucket: google.bucket(),
            endpoint: google.storage_endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn upload_url(&self, name: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint, self.bucket, name
        )
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/storage/v1/b/{}/o/{}", self.endpoint, self.bucket, name)
    }
}

#[async_trait]
impl BlobStore for GcsStore {
    async fn upload(&self, name: &str, content_type: &str, data: Vec<u8>) -> Result<()> {
        const OP: &str = "upload object";
        let response = self
            .http
            .post(self.upload_url(name))
            .bearer_auth(self.tokens.token().await?)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                operation: OP,
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(object = name, "Uploaded object");
        Ok(())
    }

    async fn make_public(&self, name: &str) -> Result<()> {
        const OP: &str = "make object public";
        let response = self
            .http
            .post(format!("{}/acl", self.object_url(name)))
            .bearer_auth(self.tokens.token().await?)
            .json(&json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                operation: OP,
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        const OP: &str = "delete object";
        let response = self
            .http
            .delete(self.object_url(name))
            .bearer_auth(self.tokens.token().await?)
            .send()
            .await
            .map_err(|source| StoreError::Transport { operation: OP, source })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                operation: OP,
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(object = name, "Deleted object");
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleConfig;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store(server: &MockServer) -> GcsStore {
        let google = GoogleConfig {
            project_id: "tree-shop".to_string(),
            storage_endpoint: server.uri(),
            ..GoogleConfig::default()
        };
        GcsStore::new(&google, Arc::new(TokenSource::fixed("test-token")), reqwest::Client::new())
    }

    #[test]
    fn bucket_is_derived_from_project_id() {
        let google = GoogleConfig {
            project_id: "tree-shop".to_string(),
            ..GoogleConfig::default()
        };
        let store = GcsStore::new(
            &google,
            Arc::new(TokenSource::fixed("test-token")),
            reqwest::Client::new(),
        );
        assert_eq!(
            store.public_url("f.png"),
            "https://storage.googleapis.com/tree-shop.appspot.com/f.png"
        );
    }

    #[tokio::test]
    async fn upload_sends_media_with_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/tree-shop.appspot.com/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "f.png"))
            .and(header("content-type", "image/png"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "f.png" })))
            .expect(1)
            .mount(&server)
            .await;

        let store = test_store(&server);
        store.upload("f.png", "image/png", vec![1, 2, 3]).await.unwrap();
    }

    #[tokio::test]
    async fn make_public_inserts_all_users_acl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/b/tree-shop.appspot.com/o/f.png/acl"))
            .and(body_json(serde_json::json!({ "entity": "allUsers", "role": "READER" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entity": "allUsers",
                "role": "READER"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = test_store(&server);
        store.make_public("f.png").await.unwrap();
    }

    #[tokio::test]
    async fn delete_missing_object_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/b/tree-shop.appspot.com/o/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = test_store(&server);
        let err = store.delete("missing.png").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/b/tree-shop.appspot.com/o/f.png"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = test_store(&server);
        store.delete("f.png").await.unwrap();
    }

    #[tokio::test]
    async fn failed_upload_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/tree-shop.appspot.com/o"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let store = test_store(&server);
        let err = store.upload("f.png", "image/png", vec![]).await.unwrap_err();
        match err {
            StoreError::Api { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
