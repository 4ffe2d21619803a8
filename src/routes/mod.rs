//! HTTP routes for the lectern service

mod catalog;
mod payments;
mod progress;

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::state::AppState;

/// Header set by the upstream authentication layer once it has resolved the
/// request to a user. The core never inspects credentials itself.
pub const USER_HEADER: &str = "x-user-id";

/// Identity resolved upstream, if any. Absence is reported by the operation
/// that needs an identity, not by the extractor.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<String>);

impl Caller {
    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(Caller(id))
    }
}

/// JSON body whose decode failures surface as `InvalidRequest` in the
/// standard error body instead of axum's plain-text rejection.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| CoreError::InvalidRequest(rejection.body_text()))?;
        Ok(ValidJson(value))
    }
}

async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/courses", get(catalog::list_courses).post(catalog::create_course))
        .route("/courses/:course_id", get(catalog::get_course))
        .route("/courses/:course_id/lectures", post(catalog::add_lecture))
        .route(
            "/courses/:course_id/lectures/:lecture_id",
            delete(catalog::remove_lecture),
        )
        .route("/courses/:course_id/publish", post(catalog::set_published))
        .route("/progress/:course_id", get(progress::get_progress))
        .route(
            "/progress/:course_id/lectures/:lecture_id/viewed",
            post(progress::record_lecture_viewed),
        )
        .route("/progress/:course_id/complete", post(progress::mark_completed))
        .route("/progress/:course_id/incomplete", post(progress::mark_incomplete))
        .route("/progress/:course_id/certificate", get(progress::certificate))
        .route("/enrollments", get(payments::list_enrollments))
        .route("/purchases", get(payments::list_purchases))
        .route("/payments/verify", post(payments::verify_payment))
        .route("/admin/enrollments", post(payments::grant_enrollment))
        .with_state(state)
}
