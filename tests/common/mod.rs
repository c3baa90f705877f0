#![allow(dead_code)]

use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use tower::ServiceExt;
use trade_exam_portal::{
    models::{
        question::{NewQuestion, PaperType, Part, QuestionSet},
        trade::Trade,
        user::Role,
    },
    services::{
        auth_service::AuthService,
        paper_service::{ActivationUpdate, PaperService},
        question_service::QuestionService,
        trade_service::TradeService,
    },
    AppState,
};

pub const PASSWORD: &str = "secret-pass";

/// Per-session counts of the common table.
pub const COMMON_PARTS: [(Part, usize); 5] = [(Part::A, 15), (Part::C, 5), (Part::D, 10), (Part::E, 3), (Part::F, 10)];

pub struct TestApp {
    pub pool: PgPool,
    pub app: Router,
    pub tag: String,
}

/// Builds the app against `DATABASE_URL`. Returns `None` when no database is
/// configured so the suite can run without Postgres.
pub async fn setup() -> Option<TestApp> {
    dotenvy::dotenv().ok();
    if env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL not set; skipping");
        return None;
    }
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("JWT_SECRET", "test_secret_key");
    env::set_var("CONVERTER_PASSPHRASE", "test-passphrase");
    env::set_var("PUBLIC_RPS", "1000");
    env::set_var("ADMIN_RPS", "1000");

    // Several tests share the process-wide config.
    trade_exam_portal::config::init_config().ok();
    let pool = trade_exam_portal::database::pool::create_pool()
        .await
        .expect("pool");
    trade_exam_portal::database::pool::run_migrations(&pool)
        .await
        .expect("migrations");

    let app = trade_exam_portal::routes::router(AppState::new(pool.clone()));
    let tag = format!("{:08x}", rand::random::<u32>());
    Some(TestApp { pool, app, tag })
}

impl TestApp {
    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, JsonValue) {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, json)
    }

    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        let username = format!("oic_{}", self.tag);
        AuthService::new(self.pool.clone())
            .create_admin(&username, PASSWORD, Role::OicAdmin)
            .await
            .expect("seed admin");
        self.login(&username).await
    }

    pub async fn trade(&self, name: &str) -> Trade {
        TradeService::new(self.pool.clone())
            .create(&format!("T{}", self.tag), &format!("{} {}", name, self.tag))
            .await
            .expect("seed trade")
    }

    pub async fn activate(&self, trade: &Trade, paper_type: PaperType, set: char) {
        PaperService::new(self.pool.clone())
            .upsert_activation(&ActivationUpdate {
                trade_id: trade.id,
                paper_type,
                is_active: true,
                question_set: QuestionSet::new(set),
                exam_duration_minutes: Some(60),
            })
            .await
            .expect("activate paper");
    }

    /// Seeds one full common-table pool. PRIMARY questions belong to
    /// `trade`; SECONDARY ones are common.
    pub async fn seed_questions(&self, trade: &Trade, paper_type: PaperType, set: char) {
        let questions = QuestionService::new(self.pool.clone());
        let is_common = paper_type == PaperType::Secondary;
        for (part, count) in COMMON_PARTS {
            for i in 0..count {
                questions
                    .create(&NewQuestion {
                        text: format!("{} {} {} {} q{}", self.tag, paper_type, set, part, i),
                        part,
                        marks: Decimal::ONE,
                        option_a: Some("right".into()),
                        option_b: Some("wrong".into()),
                        option_c: Some("other".into()),
                        option_d: Some("none".into()),
                        correct_answer: Some("right".into()),
                        trade_id: (!is_common).then_some(trade.id),
                        paper_type,
                        question_set: QuestionSet::new(set).unwrap(),
                        is_common,
                        is_active: true,
                    })
                    .await
                    .expect("seed question");
            }
        }
    }

    /// Registers a candidate through the public endpoint and logs in.
    /// Returns (candidate id, token).
    pub async fn candidate(&self, trade: &Trade) -> (i64, String) {
        let username = format!("cand_{}", self.tag);
        let (status, body) = self
            .request(
                Method::POST,
                "/api/candidate/register",
                None,
                Some(json!({
                    "username": username,
                    "password": PASSWORD,
                    "army_no": format!("JC{}", self.tag),
                    "rank": "Hav",
                    "name": "Test Candidate",
                    "father_name": "Test Father",
                    "trade_id": trade.id,
                    "dob": "01-01-1990",
                    "doe": "2010-06-01",
                    "aadhar_number": "123456789012",
                    "apaar_id": "210987654321",
                    "state": "Punjab",
                    "district": "Amritsar"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let id = body["id"].as_i64().unwrap();
        (id, self.login(&username).await)
    }
}
