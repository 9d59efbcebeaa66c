//! Task polling endpoint

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::error::ApiResult;
use crate::models::Task;
use crate::AppState;

/// GET /task/{id}
///
/// Current record. `result` is present iff the task completed, `error` iff it
/// failed. Unknown and expired ids are 404.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = state.store.get(&task_id).await?;
    Ok(Json(task))
}

pub fn task_routes() -> Router<AppState> {
    Router::new().route("/task/:task_id", get(get_task))
}
