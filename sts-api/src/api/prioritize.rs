//! Prioritization endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{PrioritizationMethod, PrioritizationPlan};
use crate::services::PrioritizationRequest;
use crate::AppState;

pub const MAX_SPRINT_DAYS: u32 = 90;

fn default_method() -> String {
    "MoSCoW".to_string()
}

fn default_duration() -> u32 {
    14
}

fn default_budget() -> f64 {
    160.0
}

/// POST /prioritize request
#[derive(Debug, Clone, Deserialize)]
pub struct PrioritizeBody {
    pub task_id: String,
    /// MoSCoW or Lean, case-insensitive
    #[serde(default = "default_method")]
    pub method: String,
    /// Sprint length in days
    #[serde(default = "default_duration")]
    pub duration: u32,
    /// Developer hours available
    #[serde(default = "default_budget")]
    pub budget: f64,
    pub business_goal: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrioritizeResponse {
    pub task_id: String,
    pub plan: PrioritizationPlan,
}

impl PrioritizeBody {
    pub fn validate(self) -> ApiResult<PrioritizationRequest> {
        let task_id = self.task_id.trim().to_string();
        if task_id.is_empty() {
            return Err(ApiError::BadRequest("task_id must not be empty".to_string()));
        }
        let method: PrioritizationMethod = self.method.parse().map_err(ApiError::BadRequest)?;
        if !(1..=MAX_SPRINT_DAYS).contains(&self.duration) {
            return Err(ApiError::BadRequest(format!(
                "duration must be between 1 and {} days",
                MAX_SPRINT_DAYS
            )));
        }
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(ApiError::BadRequest(
                "budget must be a non-negative number of hours".to_string(),
            ));
        }
        let business_goal = self.business_goal.trim().to_string();
        if business_goal.is_empty() {
            return Err(ApiError::BadRequest("business_goal must not be empty".to_string()));
        }

        Ok(PrioritizationRequest {
            task_id,
            method,
            sprint_duration_days: self.duration,
            budget_hours: self.budget,
            business_goal,
        })
    }
}

/// POST /prioritize
pub async fn prioritize(
    State(state): State<AppState>,
    Json(body): Json<PrioritizeBody>,
) -> ApiResult<Json<PrioritizeResponse>> {
    let request = body.validate()?;
    let plan = state.prioritizer.prioritize(&request).await?;

    Ok(Json(PrioritizeResponse {
        task_id: request.task_id,
        plan,
    }))
}

pub fn prioritize_routes() -> Router<AppState> {
    Router::new().route("/prioritize", post(prioritize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(method: &str, duration: u32, goal: &str) -> PrioritizeBody {
        PrioritizeBody {
            task_id: "t".to_string(),
            method: method.to_string(),
            duration,
            budget: 40.0,
            business_goal: goal.to_string(),
        }
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(body("moscow", 14, "g").validate().unwrap().method, PrioritizationMethod::MoSCoW);
        assert_eq!(
            body("Lean Prioritization", 14, "g").validate().unwrap().method,
            PrioritizationMethod::Lean
        );
        assert!(body("RICE", 14, "g").validate().is_err());
    }

    #[test]
    fn test_bounds() {
        assert!(body("Lean", 0, "g").validate().is_err());
        assert!(body("Lean", 91, "g").validate().is_err());
        assert!(body("Lean", 90, "g").validate().is_ok());
        assert!(body("Lean", 14, "   ").validate().is_err());
    }
}
