// src/server.rs
//
// Hook surface for the HR application: the person-update path calls
// `/persons/{id}/residence-check` after an expiry date is edited.

use axum::http::StatusCode;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::model::PersonId;
use crate::sweep::{PersonOutcome, ResidenceExpiryService, SweepError, SweepReport};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ResidenceExpiryService>,
}

pub struct ApiError(SweepError);

impl From<SweepError> for ApiError {
    fn from(e: SweepError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SweepError::PersonNotFound(_) => StatusCode::NOT_FOUND,
            SweepError::LoadPeople(_) | SweepError::LoadOversight(_) | SweepError::LoadPerson { .. } => {
                error!("Residence check failed: {}", self.0);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sweep", post(run_sweep))
        .route("/persons/{id}/residence-check", post(check_person))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    Ok(Json(state.service.run_sweep().await?))
}

async fn check_person(
    State(state): State<AppState>,
    Path(id): Path<PersonId>,
) -> Result<Json<PersonOutcome>, ApiError> {
    Ok(Json(state.service.run_sweep_for_person(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{Person, Role};
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_router() -> (Router, MemoryStore) {
        let store = MemoryStore::with_people([
            Person::new(1, "Ahmed", Role::Engineer)
                .with_expiry(NaiveDate::from_ymd_opt(2025, 7, 8).unwrap()),
            Person::new(2, "Huda", Role::HrManager),
        ])
        .await;
        let clock = FixedClock::new("2025-07-01 09:00:00");
        let service = Arc::new(ResidenceExpiryService::new(
            Arc::new(store.clone()),
            Arc::new(clock),
        ));
        (router(AppState { service }), store)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = test_router().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn person_check_dispatches_and_reports_tiers() {
        let (app, store) = test_router().await;
        let response = app
            .oneshot(
                Request::post("/persons/1/residence-check")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["person_id"], 1);
        assert_eq!(body["state"], "evaluated");
        assert_eq!(body["days"], 7);
        assert_eq!(body["tiers"].as_array().map(|t| t.len()), Some(2));
        // 7-day and daily, each to the holder and the HR manager.
        assert_eq!(store.notifications().await.len(), 4);
    }

    #[tokio::test]
    async fn unknown_person_is_not_found() {
        let (app, _) = test_router().await;
        let response = app
            .oneshot(
                Request::post("/persons/99/residence-check")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sweep_endpoint_returns_the_report() {
        let (app, _) = test_router().await;
        let response = app
            .oneshot(Request::post("/sweep").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcomes"].as_array().map(|o| o.len()), Some(1));
    }
}
