use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    categories::{
        dto::{CategoryResponse, CreateCategoryRequest},
        repo,
    },
    error::{validation, ApiError},
    state::AppState,
};

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", delete(delete_category))
}

/// Checks a category name the same way for the direct and the nested
/// creation paths; `field` names the offending field in the 400 body.
pub(crate) fn clean_name(name: Option<&str>, field: &str) -> Result<String, ApiError> {
    let name = match name {
        None => return Err(validation(field, "This field is required.")),
        Some(name) => name.trim(),
    };
    if name.is_empty() {
        return Err(validation(field, "This field may not be blank."));
    }
    if name.chars().count() > 30 {
        return Err(validation(
            field,
            "Ensure this field has no more than 30 characters.",
        ));
    }
    Ok(name.to_string())
}

#[instrument(skip(state))]
async fn list_categories(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = repo::list(&state.db).await?;
    Ok(Json(
        categories.into_iter().map(CategoryResponse::from).collect(),
    ))
}

#[instrument(skip(state, payload))]
async fn create_category(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let name = clean_name(payload.name.as_deref(), "name")?;
    let category = repo::insert(&state.db, &name).await?;
    info!(category_id = %category.id, "category created");
    Ok((StatusCode::CREATED, Json(category.into())))
}

#[instrument(skip(state))]
async fn delete_category(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = repo::delete(&state.db, id).await.map_err(|err| {
        match ApiError::from(err) {
            ApiError::Conflict(_) => {
                warn!(category_id = %id, "category still referenced");
                ApiError::Conflict("Category is referenced by existing records.".into())
            }
            other => other,
        }
    })?;
    if deleted == 0 {
        return Err(ApiError::NotFound);
    }
    info!(category_id = %id, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}
