use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }

    pub fn parse_role(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "instructor" => Some(Role::Instructor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PurchaseStatus::Pending),
            "completed" => Some(PurchaseStatus::Completed),
            "failed" => Some(PurchaseStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutboxKind {
    CourseUpdated,
    ProgressUpdated,
    EnrollmentAdded,
}

impl OutboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::CourseUpdated => "course_updated",
            OutboxKind::ProgressUpdated => "progress_updated",
            OutboxKind::EnrollmentAdded => "enrollment_added",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "course_updated" => Some(OutboxKind::CourseUpdated),
            "progress_updated" => Some(OutboxKind::ProgressUpdated),
            "enrollment_added" => Some(OutboxKind::EnrollmentAdded),
            _ => None,
        }
    }
}

/// Where a (user, course) pair sits in the progress lifecycle.
///
/// `NoRecord` is never persisted: it is the absence of a `course_progress` row
/// and behaves exactly like an all-unviewed record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    NoRecord,
    InProgress,
    Completed,
}

impl ProgressState {
    pub fn of(record: Option<&CourseProgress>) -> Self {
        match record {
            None => ProgressState::NoRecord,
            Some(p) if p.completed => ProgressState::Completed,
            Some(_) => ProgressState::InProgress,
        }
    }
}

/// Completion relative to the course's lecture set at the time of the write:
/// every current lecture viewed, and the course has at least one lecture.
pub fn covers_all_lectures(course_lectures: &[String], viewed: &HashSet<String>) -> bool {
    !course_lectures.is_empty() && course_lectures.iter().all(|id| viewed.contains(id))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lecture {
    pub id: String,
    pub title: String,
    pub video_url: Option<String>,
    pub free_preview: bool,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub category: String,
    pub instructor_id: String,
    pub price: i64,
    pub published: bool,
    pub lectures: Vec<Lecture>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn lecture_ids(&self) -> Vec<String> {
        self.lectures.iter().map(|l| l.id.clone()).collect()
    }

    pub fn has_lecture(&self, lecture_id: &str) -> bool {
        self.lectures.iter().any(|l| l.id == lecture_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LectureProgress {
    pub lecture_id: String,
    pub viewed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseProgress {
    pub user_id: String,
    pub course_id: String,
    pub lecture_progress: Vec<LectureProgress>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub amount: i64,
    pub status: PurchaseStatus,
    pub order_id: String,
    pub payment_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxTask {
    pub id: i64,
    pub kind: OutboxKind,
    pub course_id: String,
    pub payload: serde_json::Value,
    pub attempt: i32,
}
