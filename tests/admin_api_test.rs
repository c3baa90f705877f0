mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use trade_exam_portal::{
    models::{candidate::MarksEntry, question::PaperType, user::Role},
    services::{auth_service::AuthService, candidate_service::CandidateService},
};

#[tokio::test]
async fn role_guards_separate_candidates_po_and_oic() {
    let Some(t) = common::setup().await else { return };
    let trade = t.trade("Plumber").await;
    let (_, candidate) = t.candidate(&trade).await;

    let po_name = format!("po_{}", t.tag);
    AuthService::new(t.pool.clone())
        .create_admin(&po_name, common::PASSWORD, Role::PoAdmin)
        .await
        .unwrap();
    let po = t.login(&po_name).await;

    let (status, _) = t.request(Method::GET, "/api/admin/candidates", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.request(Method::GET, "/api/admin/candidates", Some(&candidate), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.request(Method::GET, "/api/admin/candidates", Some(&po), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .request(
            Method::POST,
            "/api/admin/maintenance/cleanup",
            Some(&po),
            Some(json!({ "level": "questions", "dry_run": true })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins cannot sit exams.
    let (status, _) = t.request(Method::GET, "/api/exam", Some(&po), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dry_run_cleanup_counts_without_deleting() {
    let Some(t) = common::setup().await else { return };
    let admin = t.admin_token().await;
    t.trade("Plumber").await;

    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades")
        .fetch_one(&t.pool)
        .await
        .unwrap();
    let (status, report) = t
        .request(
            Method::POST,
            "/api/admin/maintenance/cleanup",
            Some(&admin),
            Some(json!({ "level": "everything", "dry_run": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["dry_run"], true);
    assert!(report["counts"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["target"] == "trades" && c["rows"].as_i64().unwrap() >= 1));

    let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades")
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert!(after >= before);

    let (status, _) = t
        .request(
            Method::POST,
            "/api/admin/maintenance/cleanup",
            Some(&admin),
            Some(json!({ "level": "nonsense", "dry_run": true })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn results_export_is_an_xlsx_attachment() {
    let Some(t) = common::setup().await else { return };
    let admin = t.admin_token().await;
    let trade = t.trade("Plumber").await;
    t.candidate(&trade).await;

    let req = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/admin/export/results.xlsx?trade_id={}", trade.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(Body::empty())
        .unwrap();
    let res = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("exam_results_"));
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[tokio::test]
async fn concurrent_marks_for_both_papers_are_kept() {
    let Some(t) = common::setup().await else { return };
    let trade = t.trade("Plumber").await;
    let (candidate_id, _) = t.candidate(&trade).await;

    let candidates = CandidateService::new(t.pool.clone());
    let primary = MarksEntry { practical: Some(25), viva: Some(8) };
    let secondary = MarksEntry { practical: Some(28), viva: Some(9) };
    let (a, b) = tokio::join!(
        candidates.update_marks(candidate_id, PaperType::Primary, primary),
        candidates.update_marks(candidate_id, PaperType::Secondary, secondary),
    );
    a.unwrap();
    b.unwrap();

    let profile = candidates.get(candidate_id).await.unwrap();
    assert_eq!(profile.primary_practical_marks, Some(25));
    assert_eq!(profile.primary_viva_marks, Some(8));
    assert_eq!(profile.secondary_practical_marks, Some(28));
    assert_eq!(profile.secondary_viva_marks, Some(9));
    assert!(profile.is_primary_completed);
    assert!(profile.is_secondary_completed);
}
