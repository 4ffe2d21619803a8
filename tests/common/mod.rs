//! Shared helpers for lectern integration tests

#![allow(dead_code)]

use lectern::db::{self, NewCourse, NewLecture, Pool};
use lectern::purchase::{self, PaymentVerification};
use lectern::SignatureVerifier;

pub const SECRET: &str = "test-payment-secret";

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(SECRET)
}

/// Create a course with the given lecture ids, in order.
pub async fn seed_course(pool: &Pool, course_id: &str, price: i64, lectures: &[&str]) {
    db::create_course(
        pool,
        &NewCourse {
            id: course_id.into(),
            title: format!("Course {}", course_id),
            category: "programming".into(),
            instructor_id: "I1".into(),
            price,
        },
    )
    .await
    .unwrap();
    for id in lectures {
        db::add_lecture(
            pool,
            course_id,
            &NewLecture {
                id: id.to_string(),
                title: format!("Lecture {}", id),
                video_url: Some(format!("https://media.example/{}.mp4", id)),
                free_preview: false,
            },
        )
        .await
        .unwrap();
    }
}

pub fn signed_payment(
    order_id: &str,
    payment_id: &str,
    user_id: &str,
    course_id: &str,
    amount: i64,
) -> PaymentVerification {
    PaymentVerification {
        order_id: Some(order_id.into()),
        payment_id: Some(payment_id.into()),
        signature: verifier().sign(order_id, payment_id),
        course_id: Some(course_id.into()),
        user_id: Some(user_id.into()),
        amount: Some(amount),
    }
}

/// Enroll through the real purchase path so the enrollment is backed.
pub async fn enroll(pool: &Pool, user_id: &str, course_id: &str) {
    let order = format!("order_{}_{}", user_id, course_id);
    let pay = format!("pay_{}_{}", user_id, course_id);
    purchase::verify_payment(
        pool,
        &verifier(),
        &signed_payment(&order, &pay, user_id, course_id, 1499),
    )
    .await
    .unwrap();
}

pub async fn count(pool: &Pool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
