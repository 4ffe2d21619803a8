mod common;

use common::{enroll, seed_course, setup_pool};
use lectern::model::{LectureProgress, ProgressState};
use lectern::{progress, CoreError};

fn entry(id: &str, viewed: bool) -> LectureProgress {
    LectureProgress {
        lecture_id: id.into(),
        viewed,
    }
}

#[tokio::test]
async fn two_lecture_walkthrough() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1", "L2"]).await;
    enroll(&pool, "U", "C").await;

    let view = progress::get_progress(&pool, Some("U"), "C").await.unwrap();
    assert!(view.progress.is_empty());
    assert!(!view.completed);
    assert_eq!(view.state, ProgressState::NoRecord);
    assert_eq!(view.course.lecture_ids(), vec!["L1".to_string(), "L2".to_string()]);

    let view = progress::record_lecture_viewed(&pool, Some("U"), "C", "L1")
        .await
        .unwrap();
    assert_eq!(view.progress, vec![entry("L1", true)]);
    assert!(!view.completed);
    assert_eq!(view.state, ProgressState::InProgress);

    let view = progress::record_lecture_viewed(&pool, Some("U"), "C", "L2")
        .await
        .unwrap();
    assert_eq!(view.progress, vec![entry("L1", true), entry("L2", true)]);
    assert!(view.completed);
    assert_eq!(view.state, ProgressState::Completed);

    let view = progress::mark_incomplete(&pool, Some("U"), "C").await.unwrap();
    assert_eq!(view.progress, vec![entry("L1", false), entry("L2", false)]);
    assert!(!view.completed);
    assert_eq!(view.state, ProgressState::InProgress);
}

#[tokio::test]
async fn viewing_twice_is_a_no_op() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1", "L2", "L3"]).await;
    enroll(&pool, "U", "C").await;

    let once = progress::record_lecture_viewed(&pool, Some("U"), "C", "L2")
        .await
        .unwrap();
    let twice = progress::record_lecture_viewed(&pool, Some("U"), "C", "L2")
        .await
        .unwrap();
    assert_eq!(once.progress, twice.progress);
    assert_eq!(once.completed, twice.completed);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lecture_progress")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn mark_completed_without_viewing() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1", "L2", "L3"]).await;
    enroll(&pool, "U", "C").await;

    progress::record_lecture_viewed(&pool, Some("U"), "C", "L1")
        .await
        .unwrap();
    let view = progress::mark_completed(&pool, Some("U"), "C").await.unwrap();
    assert!(view.completed);
    assert_eq!(
        view.progress,
        vec![entry("L1", true), entry("L2", true), entry("L3", true)]
    );

    // A later view recomputes from the lecture set and agrees.
    let view = progress::record_lecture_viewed(&pool, Some("U"), "C", "L3")
        .await
        .unwrap();
    assert!(view.completed);
}

#[tokio::test]
async fn mark_incomplete_after_full_coverage() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1"]).await;
    enroll(&pool, "U", "C").await;

    let view = progress::record_lecture_viewed(&pool, Some("U"), "C", "L1")
        .await
        .unwrap();
    assert!(view.completed);
    let view = progress::mark_incomplete(&pool, Some("U"), "C").await.unwrap();
    assert!(!view.completed);
}

#[tokio::test]
async fn overrides_on_untouched_record() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1"]).await;
    enroll(&pool, "U", "C").await;

    let view = progress::mark_incomplete(&pool, Some("U"), "C").await.unwrap();
    assert!(view.progress.is_empty());
    assert!(!view.completed);
    assert_eq!(view.state, ProgressState::InProgress);
}

#[tokio::test]
async fn course_without_lectures_never_completes_by_viewing() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 0, &[]).await;
    enroll(&pool, "U", "C").await;

    let view = progress::get_progress(&pool, Some("U"), "C").await.unwrap();
    assert!(!view.completed);
    let view = progress::mark_completed(&pool, Some("U"), "C").await.unwrap();
    assert!(view.completed);
}

#[tokio::test]
async fn every_operation_requires_enrollment() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1"]).await;

    let results = vec![
        progress::get_progress(&pool, Some("U"), "C").await.err(),
        progress::record_lecture_viewed(&pool, Some("U"), "C", "L1").await.err(),
        progress::mark_completed(&pool, Some("U"), "C").await.err(),
        progress::mark_incomplete(&pool, Some("U"), "C").await.err(),
        progress::get_progress(&pool, Some("U"), "missing").await.err(),
    ];
    for err in results {
        assert!(matches!(err, Some(CoreError::NotEnrolled { .. })), "{:?}", err);
    }
    assert!(matches!(
        progress::certificate_for(&pool, Some("U"), "C").await,
        Err(CoreError::NotEnrolled { .. })
    ));

    let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_progress")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(records, 0);
}

#[tokio::test]
async fn anonymous_caller_is_unauthenticated() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1"]).await;
    assert!(matches!(
        progress::get_progress(&pool, None, "C").await,
        Err(CoreError::Unauthenticated)
    ));
}

#[tokio::test]
async fn unknown_lecture_is_rejected_without_a_write() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1"]).await;
    enroll(&pool, "U", "C").await;

    let err = progress::record_lecture_viewed(&pool, Some("U"), "C", "L9")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRequest(_)));
    let view = progress::get_progress(&pool, Some("U"), "C").await.unwrap();
    assert_eq!(view.state, ProgressState::NoRecord);
}

#[tokio::test]
async fn deleted_course_reports_not_found_to_enrolled_user() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1"]).await;
    enroll(&pool, "U", "C").await;
    sqlx::query("DELETE FROM courses WHERE id = 'C'")
        .execute(&pool)
        .await
        .unwrap();

    assert!(matches!(
        progress::get_progress(&pool, Some("U"), "C").await,
        Err(CoreError::CourseNotFound(_))
    ));
    assert!(matches!(
        progress::mark_completed(&pool, Some("U"), "C").await,
        Err(CoreError::CourseNotFound(_))
    ));
}

#[tokio::test]
async fn certificate_only_after_completion() {
    let pool = setup_pool().await;
    seed_course(&pool, "C", 1499, &["L1", "L2"]).await;
    enroll(&pool, "U", "C").await;
    lectern::db::upsert_user(&pool, "U", "Grace Hopper", lectern::model::Role::Student)
        .await
        .unwrap();

    assert!(matches!(
        progress::certificate_for(&pool, Some("U"), "C").await,
        Err(CoreError::NotCompleted(_))
    ));
    progress::record_lecture_viewed(&pool, Some("U"), "C", "L1")
        .await
        .unwrap();
    assert!(matches!(
        progress::certificate_for(&pool, Some("U"), "C").await,
        Err(CoreError::NotCompleted(_))
    ));

    progress::record_lecture_viewed(&pool, Some("U"), "C", "L2")
        .await
        .unwrap();
    let cert = progress::certificate_for(&pool, Some("U"), "C").await.unwrap();
    assert_eq!(cert.user_name, "Grace Hopper");
    assert_eq!(cert.course_title, "Course C");

    progress::mark_incomplete(&pool, Some("U"), "C").await.unwrap();
    assert!(matches!(
        progress::certificate_for(&pool, Some("U"), "C").await,
        Err(CoreError::NotCompleted(_))
    ));
}
