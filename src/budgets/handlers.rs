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
    budgets::{
        dto::{BudgetListQuery, BudgetResponse, CreateBudgetRequest, UpdateBudgetRequest},
        repo, services,
    },
    error::ApiError,
    state::AppState,
};

pub fn budget_routes() -> Router<AppState> {
    Router::new()
        .route("/budgets", get(list_budgets).post(create_budget))
        .route(
            "/budgets/:id",
            get(get_budget).patch(update_budget).delete(delete_budget),
        )
}

#[instrument(skip(state))]
async fn list_budgets(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<BudgetListQuery>,
) -> Result<Json<Vec<BudgetResponse>>, ApiError> {
    let budgets = repo::list_for_user(&state.db, user_id, &query.category).await?;
    let responses = services::budget_responses(&state.db, budgets).await?;
    Ok(Json(responses))
}

#[instrument(skip(state))]
async fn get_budget(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BudgetResponse>, ApiError> {
    let budget = repo::find_for_user(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(services::budget_response(&state.db, budget).await?))
}

#[instrument(skip(state, payload))]
async fn create_budget(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(payload): Json<CreateBudgetRequest>,
) -> Result<(StatusCode, Json<BudgetResponse>), ApiError> {
    let input = payload.validate()?;
    let budget = services::create_budget(&state.db, input).await?;
    info!(budget_id = %budget.id, "budget created");
    let response = services::budget_response(&state.db, budget).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state, payload))]
async fn update_budget(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBudgetRequest>,
) -> Result<Json<BudgetResponse>, ApiError> {
    let changes = payload.validate()?;
    let budget = services::update_budget(&state.db, user_id, id, changes).await?;
    info!(budget_id = %budget.id, "budget updated");
    Ok(Json(services::budget_response(&state.db, budget).await?))
}

#[instrument(skip(state))]
async fn delete_budget(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = repo::delete_owned(&state.db, user_id, id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound);
    }
    info!(budget_id = %id, "budget deleted");
    Ok(StatusCode::NO_CONTENT)
}
