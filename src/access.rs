//! Access gate: identity and entitlement checks run before any progress or
//! catalog mutation.

use crate::db::{self, Pool};
use crate::error::{storage, CoreError, CoreResult};
use crate::model::{Course, Role, User};
use tracing::{debug, instrument};

fn caller_id(caller: Option<&str>) -> CoreResult<&str> {
    caller
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(CoreError::Unauthenticated)
}

/// Pass only when the caller is identified and enrolled in `course_id`.
/// Course existence is not consulted.
#[instrument(skip_all)]
pub async fn require_enrollment(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
) -> CoreResult<String> {
    let user_id = caller_id(caller)?;
    let enrolled = db::is_enrolled(pool, user_id, course_id)
        .await
        .map_err(storage("require_enrollment", user_id, course_id))?;
    if !enrolled {
        debug!(user_id, course_id, "access denied: not enrolled");
        return Err(CoreError::NotEnrolled {
            course_id: course_id.to_string(),
        });
    }
    Ok(user_id.to_string())
}

/// Resolve the caller to a known user. Unknown ids count as unauthenticated.
#[instrument(skip_all)]
pub async fn require_user(pool: &Pool, caller: Option<&str>) -> CoreResult<User> {
    let user_id = caller_id(caller)?;
    db::get_user(pool, user_id)
        .await
        .map_err(storage("require_user", user_id, ""))?
        .ok_or(CoreError::Unauthenticated)
}

pub async fn require_role(pool: &Pool, caller: Option<&str>, roles: &[Role]) -> CoreResult<User> {
    let user = require_user(pool, caller).await?;
    if !roles.contains(&user.role) {
        debug!(user_id = %user.id, role = user.role.as_str(), "access denied: role");
        return Err(CoreError::Forbidden);
    }
    Ok(user)
}

/// Catalog mutations belong to the course's instructor or any admin.
pub fn require_owner(user: &User, course: &Course) -> CoreResult<()> {
    if user.role == Role::Admin || user.id == course.instructor_id {
        Ok(())
    } else {
        Err(CoreError::Forbidden)
    }
}
