//! HTTP request handlers.
//!
//! Handlers are limited to decoding the request (multipart vs path params),
//! invoking [`crate::trees::TreeService`], and translating outcomes into
//! status codes and payloads. Business logic lives in the service.
//!
//! - [`trees`]: CRUD operations on tree records
//! - [`static_assets`]: embedded frontend serving

pub mod static_assets;
pub mod trees;
