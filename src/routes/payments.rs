//! Payment and enrollment endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{Caller, ValidJson};
use crate::enrollment;
use crate::error::CoreError;
use crate::model::Purchase;
use crate::purchase::{self, PaymentVerification};
use crate::state::AppState;

#[derive(Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub purchase: Purchase,
}

#[derive(Serialize)]
pub struct EnrollmentsResponse {
    pub courses: Vec<String>,
}

#[derive(Serialize)]
pub struct PurchasesResponse {
    pub purchases: Vec<Purchase>,
}

#[derive(Deserialize)]
pub struct GrantRequest {
    pub user_id: Option<String>,
    pub course_id: Option<String>,
}

/// POST /payments/verify
///
/// The paying user is always the caller; a `user_id` in the body is ignored.
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidJson(mut req): ValidJson<PaymentVerification>,
) -> Result<Json<PurchaseResponse>, CoreError> {
    let user_id = caller.0.ok_or(CoreError::Unauthenticated)?;
    req.user_id = Some(user_id);
    let purchase = purchase::verify_payment(&state.pool, &state.verifier, &req).await?;
    Ok(Json(PurchaseResponse {
        success: true,
        purchase,
    }))
}

/// GET /enrollments
pub async fn list_enrollments(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<EnrollmentsResponse>, CoreError> {
    let courses = enrollment::list_for_caller(&state.pool, caller.id()).await?;
    Ok(Json(EnrollmentsResponse { courses }))
}

/// GET /purchases
pub async fn list_purchases(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<PurchasesResponse>, CoreError> {
    let purchases = purchase::list_for_caller(&state.pool, caller.id()).await?;
    Ok(Json(PurchasesResponse { purchases }))
}

/// POST /admin/enrollments
pub async fn grant_enrollment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidJson(req): ValidJson<GrantRequest>,
) -> Result<Json<PurchaseResponse>, CoreError> {
    let purchase = purchase::grant_enrollment(
        &state.pool,
        caller.id(),
        req.user_id.as_deref().unwrap_or_default(),
        req.course_id.as_deref().unwrap_or_default(),
    )
    .await?;
    Ok(Json(PurchaseResponse {
        success: true,
        purchase,
    }))
}
