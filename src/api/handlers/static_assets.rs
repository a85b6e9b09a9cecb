//! HTTP handlers for the embedded frontend.

use axum::{
    body::Body,
    http::{Response, StatusCode, Uri},
    response::IntoResponse,
};
use tracing::instrument;

use crate::static_assets::Assets;

/// Serve embedded static assets, falling back to index.html
#[instrument]
pub async fn serve_embedded_asset(uri: Uri) -> impl IntoResponse {
    let mut path = uri.path().trim_start_matches('/');

    if path.is_empty() || path.ends_with('/') {
        path = "index.html";
    }

    if let Some(content) = Assets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        return Response::builder()
            .header(axum::http::header::CONTENT_TYPE, mime.as_ref())
            .header(axum::http::header::CACHE_CONTROL, "no-cache")
            .body(Body::from(content.data.into_owned()))
            .unwrap();
    }

    // Unmatched paths get the index page so a bookmarked URL still loads the app
    if let Some(index) = Assets::get("index.html") {
        return Response::builder()
            .header(axum::http::header::CONTENT_TYPE, "text/html")
            .header(axum::http::header::CACHE_CONTROL, "no-cache")
            .body(Body::from(index.data.into_owned()))
            .unwrap();
    }

    Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()).unwrap()
}
