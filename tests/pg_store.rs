use gradeflow::core::time::primitive_now_utc;
use gradeflow::db::models::{Grade, GRADE_MAX_SCORE, GRADE_SOURCE_ASSIGNMENT};
use gradeflow::db::types::SubmissionState;
use gradeflow::repositories::{
    GradeRepository, GradingCommit, PgStore, StateChange, SubmissionRepository,
};
use gradeflow::services::state_machine::GradingStep;
use gradeflow::GradingError;
use sqlx::PgPool;

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();

    std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

async fn connect() -> anyhow::Result<Option<PgPool>> {
    let Some(database_url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping Postgres store test");
        return Ok(None);
    };

    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&database_url).await?;
    gradeflow::db::run_migrations(&pool).await?;
    Ok(Some(pool))
}

/// Seeds a graded submission with two essay answers whose question order is
/// the reverse of their ids. Returns the submission id.
async fn seed_graded(pool: &PgPool) -> anyhow::Result<String> {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    let assignment = format!("a-{tag}");
    let submission = format!("s-{tag}");

    sqlx::query(
        "INSERT INTO assignments (id, course_id, title, created_by, created_at)
         VALUES ($1, 'c-pg', 'Essay set', 'instructor', NOW()::timestamp)",
    )
    .bind(&assignment)
    .execute(pool)
    .await?;

    for (question, order) in [("qa", 2), ("qb", 1)] {
        sqlx::query(
            "INSERT INTO questions (id, assignment_id, question_type, max_score, order_index)
             VALUES ($1, $2, 'essay', 10, $3)",
        )
        .bind(format!("{question}-{tag}"))
        .bind(&assignment)
        .bind(order)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO submissions (id, assignment_id, user_id, state, score, submitted_at, updated_at)
         VALUES ($1, $2, 'student', 'graded', 90, NOW()::timestamp, NOW()::timestamp)",
    )
    .bind(&submission)
    .bind(&assignment)
    .execute(pool)
    .await?;

    for question in ["qa", "qb"] {
        sqlx::query("INSERT INTO answers (id, submission_id, question_id) VALUES ($1, $2, $3)")
            .bind(format!("ans-{question}-{tag}"))
            .bind(&submission)
            .bind(format!("{question}-{tag}"))
            .execute(pool)
            .await?;
    }

    Ok(submission)
}

fn final_grade(submission_id: &str, score: f64) -> Grade {
    let now = primitive_now_utc();
    Grade {
        id: format!("g-{submission_id}"),
        submission_id: submission_id.to_string(),
        source_type: GRADE_SOURCE_ASSIGNMENT.to_string(),
        source_id: "unused".to_string(),
        score: Some(score),
        max_score: GRADE_MAX_SCORE,
        is_draft: false,
        feedback: None,
        graded_by: Some("instructor".to_string()),
        graded_at: Some(now),
        released_at: None,
        override_reason: None,
        overridden_by: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn answers_follow_question_order() -> anyhow::Result<()> {
    let Some(pool) = connect().await? else {
        return Ok(());
    };
    let store = PgStore::new(pool.clone());
    let submission = seed_graded(&pool).await?;

    let loaded = store.find_with_answers(&submission).await?.expect("submission");
    let order: Vec<&str> = loaded
        .answers
        .iter()
        .map(|answer| answer.question_id.split('-').next().unwrap_or_default())
        .collect();
    assert_eq!(order, ["qb", "qa"]);

    Ok(())
}

#[tokio::test]
async fn auto_grade_commit_cannot_reopen_graded_submission() -> anyhow::Result<()> {
    let Some(pool) = connect().await? else {
        return Ok(());
    };
    let store = PgStore::new(pool.clone());
    let submission = seed_graded(&pool).await?;

    let mut commit = GradingCommit::new(&submission);
    commit.score = Some(10.0);
    commit.transition = Some(StateChange::new(GradingStep::AutoGrade { needs_manual: true }, None));
    let err = store.commit_grading(commit).await.expect_err("graded work is final");
    assert!(matches!(err, GradingError::State(_)));

    let stored = store.find(&submission).await?.expect("submission");
    assert_eq!(stored.state, SubmissionState::Graded);
    assert_eq!(stored.score, Some(90.0));

    let mut back = GradingCommit::new(&submission);
    back.transition = Some(StateChange::new(GradingStep::ReturnToQueue, Some("instructor")));
    store.commit_grading(back).await?;
    let stored = store.find(&submission).await?.expect("submission");
    assert_eq!(stored.state, SubmissionState::PendingManualGrading);

    store.transition_to(&submission, SubmissionState::Graded, Some("instructor")).await?;
    let err = store
        .transition_to(&submission, SubmissionState::AutoGraded, None)
        .await
        .expect_err("graded to auto graded");
    assert!(matches!(err, GradingError::State(_)));

    Ok(())
}

#[tokio::test]
async fn grade_upsert_keeps_one_row_per_submission() -> anyhow::Result<()> {
    let Some(pool) = connect().await? else {
        return Ok(());
    };
    let store = PgStore::new(pool.clone());
    let submission = seed_graded(&pool).await?;

    let first = store.upsert_by_submission(&final_grade(&submission, 70.0)).await?;
    let mut second = first.clone();
    second.score = Some(85.0);
    second.feedback = Some("regraded".to_string());
    let stored = store.upsert_by_submission(&second).await?;

    assert_eq!(stored.id, first.id);
    assert_eq!(stored.score, Some(85.0));
    let grades = store.find_by_submissions(&[submission.clone()]).await?;
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0].feedback.as_deref(), Some("regraded"));

    Ok(())
}
