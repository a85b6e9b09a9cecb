//! # grove: tree inventory service
//!
//! `grove` is a small inventory web application for "tree" records. It
//! exposes CRUD endpoints over records consisting of a name, a description
//! and an image, persists the records as schemaless documents in Google
//! Firestore, keeps the images as publicly readable objects in Cloud
//! Storage, and serves an embedded form/list frontend from the same binary.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer. There is no local database: both persistence concerns are
//! delegated to managed cloud services reached over REST with a cached
//! service-account access token.
//!
//! ### Request flow
//!
//! A create or update request arrives as a multipart form. The handler
//! ([`api::handlers::trees`]) parses it and hands the fields to the
//! [`trees::TreeService`], which runs a strictly sequential pipeline: stage
//! the file locally ([`staging`]), upload it to the blob store, mark it
//! public, then persist the document referencing the resulting public URL.
//! The document write is sequenced after blob availability on purpose; the
//! public URL is only guaranteed valid once the upload is acknowledged.
//!
//! Failure semantics are deliberately weak and documented rather than
//! patched over: a blob uploaded before a failed document write is an
//! accepted orphan, and a failed deletion of a replaced image never aborts
//! the document mutation. There are no retries; every failure surfaces to
//! the caller immediately as a plain message with the appropriate status.
//!
//! ### Core components
//!
//! - [`store`]: `DocumentStore` and `BlobStore` traits plus the Firestore
//!   and Cloud Storage clients and the token source they share
//! - [`trees`]: CRUD orchestration over the injected stores
//! - [`staging`]: local upload staging with guaranteed cleanup
//! - [`api`]: route handlers and wire models
//! - [`config`]: YAML + environment configuration
//!
//! ## Quick start
//!
//! ```no_run
//! use clap::Parser;
//! use grove::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = grove::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     grove::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod staging;
mod static_assets;
pub mod store;
pub mod telemetry;
pub mod trees;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod test;

use crate::openapi::ApiDoc;
use crate::staging::Staging;
use crate::store::{FirestoreStore, GcsStore, TokenSource};
use crate::trees::TreeService;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::{
    Json, Router,
    routing::{get, put},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// Store clients are injected into the [`TreeService`] rather than living as
/// process-wide singletons, so tests can swap in fakes.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub trees: TreeService,
}

/// Create CORS layer from configuration: one fixed origin, the four CRUD
/// methods, all headers.
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origin = config.cors_origin.parse::<HeaderValue>()?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}

/// Build the application router: the four tree routes, a health check,
/// OpenAPI docs, and the embedded frontend as the fallback.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let max_body = state.config.max_upload_bytes as usize;

    let api_routes = Router::new()
        .route(
            "/trees",
            get(api::handlers::trees::list_trees).post(api::handlers::trees::create_tree),
        )
        .route(
            "/trees/{id}",
            put(api::handlers::trees::update_tree).delete(api::handlers::trees::delete_tree),
        )
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .merge(api_routes)
        .fallback(api::handlers::static_assets::serve_embedded_asset);

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] builds the store clients from the
///    service-account credentials and prepares the staging directory
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting grove with configuration: {:#?}", config);

        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenSource::service_account(&config.google, http.clone())?);

        let documents = Arc::new(FirestoreStore::new(&config.google, tokens.clone(), http.clone()));
        let blobs = Arc::new(GcsStore::new(&config.google, tokens, http));
        let staging = Staging::init(&config.staging_dir).await?;

        let trees = TreeService::new(documents, blobs, staging);

        let state = AppState::builder().config(config.clone()).trees(trees).build();
        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Bind and serve until the shutdown future resolves
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!("Server is running on {}", listener.local_addr()?);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        Ok(())
    }
}
