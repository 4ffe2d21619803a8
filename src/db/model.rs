//! Records passed into repositories and view models returned by them.
//!
//! Keep these structs focused on the data crossing the SQL boundary. Policy
//! lives in the `access`, `progress` and `purchase` modules.

use crate::model::Purchase;

/// Catalog entry to insert. The id is chosen by the caller.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub id: String,
    pub title: String,
    pub category: String,
    pub instructor_id: String,
    pub price: i64,
}

#[derive(Debug, Clone)]
pub struct NewLecture {
    pub id: String,
    pub title: String,
    pub video_url: Option<String>,
    pub free_preview: bool,
}

/// A verified payment about to be recorded as a completed purchase.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: String,
    pub course_id: String,
    pub amount: i64,
    pub order_id: String,
    pub payment_id: String,
}

/// Outcome of recording a purchase under the (order_id, payment_id) constraint.
#[derive(Debug, Clone)]
pub enum PurchaseInsert {
    Recorded(Purchase),
    Duplicate,
}

/// A (user, course) pair where purchases and enrollments disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentGap {
    pub user_id: String,
    pub course_id: String,
}
