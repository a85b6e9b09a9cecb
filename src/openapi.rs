//! OpenAPI documentation for the tree API, rendered at `/docs`.

use crate::api::models::trees::{TreeResponse, TreeUpdateResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "grove",
        description = "Tree inventory API: CRUD over tree records with images in object storage"
    ),
    paths(
        crate::api::handlers::trees::create_tree,
        crate::api::handlers::trees::list_trees,
        crate::api::handlers::trees::update_tree,
        crate::api::handlers::trees::delete_tree,
    ),
    components(schemas(TreeResponse, TreeUpdateResponse)),
    tags((name = "trees", description = "Tree record management"))
)]
pub struct ApiDoc;
