use crate::AppState;
use crate::api::models::trees::{TreeResponse, TreeUpdateResponse};
use crate::errors::{Error, Result};
use crate::trees::{CreateTree, UpdateTree, Upload};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};

/// The fields of a tree multipart form, shared by create and update.
#[derive(Debug, Default)]
struct TreeForm {
    name: String,
    description: String,
    image: Option<Upload>,
}

/// Pull `name`, `description` and the optional `image` file out of a
/// multipart body. Unknown fields are ignored; an image part with no bytes
/// (a file input left empty) counts as absent.
async fn read_tree_form(mut multipart: Multipart) -> Result<TreeForm> {
    let mut form = TreeForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::Validation {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "name" => {
                form.name = field.text().await.map_err(|e| Error::Validation {
                    message: format!("Failed to read name: {e}"),
                })?;
            }
            "description" => {
                form.description = field.text().await.map_err(|e| Error::Validation {
                    message: format!("Failed to read description: {e}"),
                })?;
            }
            "image" => {
                let file_name = field.file_name().map(|s| s.to_string()).unwrap_or_default();
                let data = field.bytes().await.map_err(|e| Error::Validation {
                    message: format!("Failed to read image: {e}"),
                })?;
                if !data.is_empty() {
                    form.image = Some(Upload {
                        file_name,
                        data: data.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

#[utoipa::path(
    post,
    path = "/trees",
    tag = "trees",
    summary = "Create tree",
    request_body(
        content_type = "multipart/form-data",
        description = "Fields `name`, `description` and an `image` file"
    ),
    responses(
        (status = 201, description = "Tree created", body = TreeResponse),
        (status = 400, description = "Missing file or blank fields"),
        (status = 500, description = "Document or blob store failure")
    )
)]
pub async fn create_tree(State(state): State<AppState>, multipart: Multipart) -> Result<(StatusCode, Json<TreeResponse>)> {
    let form = read_tree_form(multipart).await?;

    let tree = state
        .trees
        .create(CreateTree {
            name: form.name,
            description: form.description,
            image: form.image,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(tree.into())))
}

#[utoipa::path(
    get,
    path = "/trees",
    tag = "trees",
    summary = "List trees",
    responses(
        (status = 200, description = "All tree records", body = [TreeResponse]),
        (status = 500, description = "Document store failure")
    )
)]
pub async fn list_trees(State(state): State<AppState>) -> Result<Json<Vec<TreeResponse>>> {
    let trees = state.trees.list().await?;
    Ok(Json(trees.into_iter().map(TreeResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/trees/{id}",
    tag = "trees",
    summary = "Update tree",
    request_body(
        content_type = "multipart/form-data",
        description = "Fields `name`, `description` and an optional replacement `image`"
    ),
    params(("id" = String, Path, description = "Tree document id")),
    responses(
        (status = 200, description = "Tree updated; returns the full current record", body = TreeUpdateResponse),
        (status = 404, description = "Unknown tree id"),
        (status = 500, description = "Document or blob store failure")
    )
)]
pub async fn update_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<TreeUpdateResponse>> {
    let form = read_tree_form(multipart).await?;

    let tree = state
        .trees
        .update(
            &id,
            UpdateTree {
                name: form.name,
                description: form.description,
                image: form.image,
            },
        )
        .await?;

    Ok(Json(TreeUpdateResponse::updated(tree)))
}

#[utoipa::path(
    delete,
    path = "/trees/{id}",
    tag = "trees",
    summary = "Delete tree",
    params(("id" = String, Path, description = "Tree document id")),
    responses(
        (status = 200, description = "Tree and its image deleted"),
        (status = 404, description = "Unknown tree id"),
        (status = 500, description = "Document or blob store failure")
    )
)]
pub async fn delete_tree(State(state): State<AppState>, Path(id): Path<String>) -> Result<&'static str> {
    state.trees.delete(&id).await?;
    Ok("Tree deleted successfully")
}
