//! lectern: course progress tracking and enrollment-gated access.
//!
//! Instructors publish courses, students purchase them through a payment
//! provider, and the tracker records which lectures each enrolled student has
//! viewed. Completion is derived from the course's current lecture list and
//! gates certificate issuance.

pub mod access;
pub mod catalog;
pub mod config;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod model;
pub mod notify;
pub mod outbox;
pub mod progress;
pub mod purchase;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use purchase::SignatureVerifier;
pub use state::AppState;
