mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value as JsonValue};
use trade_exam_portal::models::question::PaperType;

fn question_ids(exam: &JsonValue) -> Vec<i64> {
    exam["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["question_id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn secondary_only_trade_sits_one_exam_per_slot() {
    let Some(t) = common::setup().await else { return };
    let admin = t.admin_token().await;
    let trade = t.trade("Hair Dresser").await;
    t.activate(&trade, PaperType::Secondary, 'A').await;
    t.seed_questions(&trade, PaperType::Secondary, 'A').await;
    let (candidate_id, token) = t.candidate(&trade).await;

    // No slot yet.
    let (status, _) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .request(
            Method::POST,
            &format!("/api/admin/candidates/{}/slot/assign", candidate_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, exam) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", exam);
    assert_eq!(exam["paper_type"], "SECONDARY");
    assert_eq!(exam["question_set"], "A");
    assert_eq!(exam["duration_minutes"], 60);
    let ids = question_ids(&exam);
    assert_eq!(ids.len(), 43);

    // Reloading resumes the same session.
    let (_, again) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(again["session_id"], exam["session_id"]);
    assert_eq!(question_ids(&again), ids);

    let (status, _) = t
        .request(
            Method::PUT,
            "/api/exam/answers",
            Some(&token),
            Some(json!({ "question_id": ids[0], "answer": "right" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, progress) = t.request(Method::GET, "/api/exam/status", Some(&token), None).await;
    assert_eq!(progress["session"]["answered"], 1);
    assert!(progress["slot_status"].as_str().unwrap().starts_with("Attempting"));

    let answers: Vec<JsonValue> = ids
        .iter()
        .skip(1)
        .take(2)
        .map(|id| json!({ "question_id": id, "answer": "right" }))
        .collect();
    let (status, result) = t
        .request(Method::POST, "/api/exam/submit", Some(&token), Some(json!({ "answers": answers })))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", result);
    assert_eq!(result["slot_consumed"], true);
    assert_eq!(result["answered"], 3);

    let (_, after) = t.request(Method::GET, "/api/exam/status", Some(&token), None).await;
    assert_eq!(after["can_start_exam"], false);
    assert_eq!(after["is_secondary_completed"], true);
    assert!(after["slot_status"].as_str().unwrap().starts_with("Consumed"));
    assert!(after["session"].is_null());

    let (status, _) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reassigning_after_primary_opens_secondary() {
    let Some(t) = common::setup().await else { return };
    let admin = t.admin_token().await;
    let trade = t.trade("Plumber").await;
    t.activate(&trade, PaperType::Primary, 'A').await;
    t.activate(&trade, PaperType::Secondary, 'A').await;
    t.seed_questions(&trade, PaperType::Primary, 'A').await;
    t.seed_questions(&trade, PaperType::Secondary, 'A').await;
    let (candidate_id, token) = t.candidate(&trade).await;

    let (status, _) = t
        .request(
            Method::POST,
            &format!("/api/admin/candidates/{}/slot/assign", candidate_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, exam) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(exam["paper_type"], "PRIMARY");
    let (status, _) = t
        .request(Method::POST, "/api/exam/submit", Some(&token), Some(json!({ "answers": [] })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, consumed) = t.request(Method::GET, "/api/exam/status", Some(&token), None).await;
    assert_eq!(consumed["can_start_exam"], false);
    assert_eq!(consumed["is_primary_completed"], true);

    let (status, body) = t
        .request(
            Method::POST,
            &format!("/api/admin/candidates/{}/slot/reassign", candidate_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (_, reopened) = t.request(Method::GET, "/api/exam/status", Some(&token), None).await;
    assert_eq!(reopened["can_start_exam"], true);
    assert_eq!(reopened["next_exam_type"], "SECONDARY");
    assert_eq!(reopened["is_primary_completed"], true);

    let (_, exam) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(exam["paper_type"], "SECONDARY");
}

#[tokio::test]
async fn new_session_draws_only_from_the_activated_set() {
    let Some(t) = common::setup().await else { return };
    let admin = t.admin_token().await;
    let trade = t.trade("Hair Dresser").await;
    t.activate(&trade, PaperType::Secondary, 'A').await;
    t.seed_questions(&trade, PaperType::Secondary, 'A').await;
    t.seed_questions(&trade, PaperType::Secondary, 'B').await;
    let (candidate_id, token) = t.candidate(&trade).await;
    let assign = format!("/api/admin/candidates/{}/slot/assign", candidate_id);

    t.request(Method::POST, &assign, Some(&admin), None).await;
    let (_, first) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(first["question_set"], "A");

    let (status, body) = t
        .request(
            Method::PUT,
            "/api/admin/activations",
            Some(&admin),
            Some(json!({
                "trade_id": trade.id,
                "paper_type": "SECONDARY",
                "is_active": true,
                "question_set": "B"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    // Resetting discards the set A session; the next one follows the activation.
    let (status, _) = t
        .request(
            Method::POST,
            &format!("/api/admin/candidates/{}/slot/reset", candidate_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    t.request(Method::POST, &assign, Some(&admin), None).await;

    let (status, second) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", second);
    assert_eq!(second["question_set"], "B");
    assert_ne!(second["session_id"], first["session_id"]);

    let ids = question_ids(&second);
    let sets: Vec<String> = sqlx::query_scalar("SELECT DISTINCT question_set FROM questions WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(&t.pool)
        .await
        .unwrap();
    assert_eq!(sets, vec!["B".to_string()]);
}

#[tokio::test]
async fn shortened_duration_applies_to_timer_and_autosave() {
    let Some(t) = common::setup().await else { return };
    let admin = t.admin_token().await;
    let trade = t.trade("Hair Dresser").await;
    t.activate(&trade, PaperType::Secondary, 'A').await;
    t.seed_questions(&trade, PaperType::Secondary, 'A').await;
    let (candidate_id, token) = t.candidate(&trade).await;

    t.request(
        Method::POST,
        &format!("/api/admin/candidates/{}/slot/assign", candidate_id),
        Some(&admin),
        None,
    )
    .await;
    let (_, exam) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    let first = question_ids(&exam)[0];

    // Started five minutes ago; the override drops to two minutes mid-exam.
    sqlx::query("UPDATE exam_sessions SET started_at = NOW() - INTERVAL '5 minutes' WHERE id = $1")
        .bind(exam["session_id"].as_i64().unwrap())
        .execute(&t.pool)
        .await
        .unwrap();
    let (status, _) = t
        .request(
            Method::PUT,
            "/api/admin/activations",
            Some(&admin),
            Some(json!({
                "trade_id": trade.id,
                "paper_type": "SECONDARY",
                "is_active": true,
                "question_set": "A",
                "exam_duration_minutes": 2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, progress) = t.request(Method::GET, "/api/exam/status", Some(&token), None).await;
    assert_eq!(progress["session"]["remaining_seconds"], 0);
    let (_, view) = t.request(Method::GET, "/api/exam", Some(&token), None).await;
    assert_eq!(view["duration_minutes"], 2);
    assert_eq!(view["remaining_seconds"], 0);

    let (status, _) = t
        .request(
            Method::PUT,
            "/api/exam/answers",
            Some(&token),
            Some(json!({ "question_id": first, "answer": "right" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
