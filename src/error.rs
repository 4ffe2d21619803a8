//! Boundary error taxonomy for the progress and enrollment core.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Not enrolled in course {course_id}")]
    NotEnrolled { course_id: String },

    #[error("Not allowed to modify this resource")]
    Forbidden,

    #[error("Course {0} not found")]
    CourseNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Payment signature invalid")]
    SignatureInvalid,

    #[error("Duplicate payment {order_id}/{payment_id}")]
    Conflict { order_id: String, payment_id: String },

    #[error("Course {0} not completed")]
    NotCompleted(String),

    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Unauthenticated => "unauthenticated",
            CoreError::NotEnrolled { .. } => "not_enrolled",
            CoreError::Forbidden => "forbidden",
            CoreError::CourseNotFound(_) => "course_not_found",
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::SignatureInvalid => "signature_invalid",
            CoreError::Conflict { .. } => "conflict",
            CoreError::NotCompleted(_) => "not_completed",
            CoreError::Internal(_) => "internal",
        }
    }
}

/// Converts a storage failure into `Internal`, logging the operation context
/// here so the client response never carries storage details.
pub(crate) fn storage<'a>(
    op: &'static str,
    user_id: &'a str,
    course_id: &'a str,
) -> impl FnOnce(anyhow::Error) -> CoreError + 'a {
    move |err| {
        error!(?err, op, user_id, course_id, "storage failure");
        CoreError::Internal(err)
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            CoreError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Not authenticated".to_string()),
            CoreError::NotEnrolled { .. } => (
                StatusCode::FORBIDDEN,
                "Enroll in this course to access its content".to_string(),
            ),
            CoreError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Not allowed to modify this resource".to_string(),
            ),
            CoreError::CourseNotFound(_) => (StatusCode::NOT_FOUND, "Course not found".to_string()),
            CoreError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CoreError::SignatureInvalid => (
                StatusCode::BAD_REQUEST,
                "Payment verification failed".to_string(),
            ),
            CoreError::Conflict { .. } => (
                StatusCode::CONFLICT,
                "Payment already recorded".to_string(),
            ),
            CoreError::NotCompleted(_) => (
                StatusCode::CONFLICT,
                "Complete the course to request a certificate".to_string(),
            ),
            CoreError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = json!({ "success": false, "error": self.kind(), "reason": message });
        (status, axum::Json(body)).into_response()
    }
}
