//! Database module: entity models and SQL repositories.
//!
//! - `model`: input records and view models passed to and returned by repositories.
//! - `repo`: pool setup, migrations, users and the event outbox.
//! - `catalog`, `enrollment`, `progress`, `purchase`: SQL for each aggregate.
//!
//! Callers import from `lectern::db`; every repository function is re-exported here.

pub mod catalog;
pub mod enrollment;
pub mod model;
pub mod progress;
pub mod purchase;
pub mod repo;

pub use catalog::*;
pub use enrollment::*;
pub use progress::*;
pub use purchase::*;
pub use repo::*;

pub use model::{EnrollmentGap, NewCourse, NewLecture, NewPurchase, PurchaseInsert};
