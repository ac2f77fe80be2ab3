use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use axum_extra::extract::Query;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    records::{
        dto::{CreateRecordRequest, RecordListQuery, RecordResponse, UpdateRecordRequest},
        repo, services,
    },
    state::AppState,
};

pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_records).post(create_record))
        .route(
            "/records/:id",
            get(get_record).patch(update_record).delete(delete_record),
        )
}

#[instrument(skip(state))]
async fn list_records(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<RecordListQuery>,
) -> Result<Json<Vec<RecordResponse>>, ApiError> {
    let records =
        repo::list_for_user(&state.db, user_id, query.budget, &query.category).await?;
    let responses = services::to_responses(&state.db, records).await?;
    Ok(Json(responses))
}

#[instrument(skip(state))]
async fn get_record(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record = repo::find_for_user(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(services::to_response(&state.db, record).await?))
}

#[instrument(skip(state, payload))]
async fn create_record(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(payload): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<RecordResponse>), ApiError> {
    let input = payload.validate()?;
    let record = services::create_record(&state.db, input).await?;
    info!(record_id = %record.id, budget_id = %record.budget_id, "record created");
    let response = services::to_response(&state.db, record).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state, payload))]
async fn update_record(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRecordRequest>,
) -> Result<Json<RecordResponse>, ApiError> {
    let changes = payload.validate()?;
    let record = services::update_record(&state.db, user_id, id, changes).await?;
    info!(record_id = %record.id, "record updated");
    Ok(Json(services::to_response(&state.db, record).await?))
}

#[instrument(skip(state))]
async fn delete_record(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = repo::delete_owned(&state.db, user_id, id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound);
    }
    info!(record_id = %id, "record deleted");
    Ok(StatusCode::NO_CONTENT)
}
