//! End-to-end runs against a small in-process backend that answers the way
//! the real service does: JSON bodies with an `error_code`, bearer tokens on
//! `protected/` routes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use serde_json::Value;
use serde_json::json;
use url::Url;

use crate::asserter::Asserter;
use crate::asserter::ProbeReport;
use crate::auth::Authenticator;
use crate::auth::Credentials;
use crate::outputter::OutPutter;
use crate::parser::ProbeFile;
use crate::probe::ApiProbe;
use crate::probe::ProbeError;
use crate::probe::ProbeSpec;
use crate::probe::RESULT_CODE_ABSENT;
use crate::runner::RunnerResult;
use crate::runner::resolve_token;
use crate::runner::run_probes;
use crate::transport::ReqwestTransport;
use crate::transport::TransportError;
use crate::validator::Validator;

const TOKEN: &str = "test-token";

async fn gen_otp(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    match params.get("email") {
        Some(email) if email.contains('@') => (StatusCode::OK, Json(json!({ "error_code": 0 }))),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "Invalid email", "error_code": 1 })),
        ),
    }
}

async fn login(body: String) -> (StatusCode, Json<Value>) {
    let Ok(body) = serde_json::from_str::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error_code": 1 })));
    };

    if body["email"] == "admin@example.com" && body["pass"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({ "success": true, "error_code": 0, "token": TOKEN })),
        )
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "error_code": 5 })))
    }
}

// Mirrors a framework that answers unparsable bodies with plain text.
async fn register(body: String) -> (StatusCode, String) {
    match serde_json::from_str::<Value>(&body) {
        Ok(_) => (StatusCode::OK, json!({ "error_code": 0 }).to_string()),
        Err(e) => (StatusCode::BAD_REQUEST, format!("Unprocessable body: {e}")),
    }
}

async fn cleanup_otp(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));

    if authorized {
        (StatusCode::OK, Json(json!({ "error_code": 0 })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error_code": 1 })))
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "error_code": 0 }))
}

async fn start_backend() -> SocketAddr {
    let app = Router::new()
        .route("/api/gen-otp-for-register", get(gen_otp))
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/protected/cleanup-otp-code", post(cleanup_otp))
        .route("/api/slow", get(slow));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

fn root(addr: SocketAddr) -> Url {
    Url::parse(&format!("http://{addr}/api/")).unwrap()
}

async fn live_probe() -> ApiProbe<ReqwestTransport> {
    let addr = start_backend().await;
    ApiProbe::new(
        root(addr),
        ReqwestTransport::new(Duration::from_secs(5)).unwrap(),
    )
}

#[tokio::test]
async fn valid_query_parameter_passes() {
    let probe = live_probe().await;
    let spec = ProbeSpec::get("gen-otp-for-register?email=someone@example.com")
        .with_description("gen OTP with a valid email");

    assert!(probe.evaluate(&spec, 0).await);
}

#[tokio::test]
async fn invalid_query_parameter_reports_its_code() {
    let probe = live_probe().await;
    let spec = ProbeSpec::get("gen-otp-for-register?email=kuuun");

    assert!(!probe.evaluate(&spec, 0).await);
    assert!(probe.evaluate(&spec, 1).await);

    let result = probe.execute(&spec).await.unwrap();
    assert_eq!(result.status, StatusCode::BAD_REQUEST);
    assert!(result.body.contains("Invalid email"));
}

#[tokio::test]
async fn malformed_payload_yields_sentinel() {
    let probe = live_probe().await;
    let spec = ProbeSpec::post("register").with_raw(r#"{"name": "#);

    let result = probe.execute(&spec).await.unwrap();
    assert_eq!(result.status, StatusCode::BAD_REQUEST);
    assert_eq!(result.result_code, RESULT_CODE_ABSENT);
    assert!(!probe.evaluate(&spec, 3).await);
}

#[tokio::test]
async fn protected_path_needs_bearer_token() {
    let probe = live_probe().await;
    let creds = Credentials {
        path: "login".into(),
        email: "admin@example.com".into(),
        pass: "secret".into(),
        token_field: "token".into(),
    };

    let anonymous = ProbeSpec::post("protected/cleanup-otp-code");
    assert!(probe.evaluate(&anonymous, 1).await);

    let token = Authenticator::Login(creds)
        .bearer_token(&probe)
        .await
        .unwrap();
    let authorized = ProbeSpec::post("protected/cleanup-otp-code").with_bearer(&token);
    assert!(probe.evaluate(&authorized, 0).await);
}

#[tokio::test]
async fn timeout_is_a_transport_failure() {
    let addr = start_backend().await;
    let probe = ApiProbe::new(
        root(addr),
        ReqwestTransport::new(Duration::from_millis(200)).unwrap(),
    );
    let spec = ProbeSpec::get("slow");

    assert!(matches!(
        probe.execute(&spec).await,
        Err(ProbeError::Transport(TransportError::Timeout(_)))
    ));
    assert!(!probe.evaluate(&spec, 0).await);
}

#[tokio::test]
async fn refused_connection_is_a_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = ApiProbe::new(
        root(addr),
        ReqwestTransport::new(Duration::from_secs(2)).unwrap(),
    );
    let spec = ProbeSpec::get("gen-otp-for-register?email=a@b.com");

    assert!(matches!(
        probe.execute(&spec).await,
        Err(ProbeError::Transport(_))
    ));
    assert!(!probe.evaluate(&spec, 0).await);
    assert!(probe.evaluate(&spec, RESULT_CODE_ABSENT).await);
}

#[tokio::test]
async fn probe_file_runs_through_the_pipeline() {
    let addr = start_backend().await;
    let src = format!(
        r#"
        [setup]
        base_url = "http://{addr}/api/"
        timeout_secs = 5

        [auth]
        login = {{ email = "admin@example.com", pass = "secret" }}

        [[suites]]
        name = "otp"

        [[suites.probes]]
        desc = "valid email"
        method = "GET"
        path = "gen-otp-for-register?email=someone@example.com"
        expect = 0

        [[suites.probes]]
        desc = "typo in the method"
        method = "PSOT"
        path = "protected/cleanup-otp-code"
        expect = 0

        [[suites.probes]]
        desc = "invalid email"
        method = "get"
        path = "gen-otp-for-register?email="
        expect = 1

        [[suites.probes]]
        desc = "cleanup as admin"
        method = "POST"
        path = "protected/cleanup-otp-code"
        protected = true
        expect = 0

        [[suites.probes]]
        desc = "cleanup without token"
        method = "POST"
        path = "protected/cleanup-otp-code"
        expect = 1
        "#
    );

    let file: ProbeFile = toml::from_str(&src).unwrap();
    let (suites, setup) = Validator::new(&file, &src, "apiprobe.toml")
        .validate(&[])
        .unwrap();

    let probe = ApiProbe::new(setup.root, ReqwestTransport::new(setup.timeout).unwrap());
    let (runner_tx, asserter_rx) = flume::unbounded::<RunnerResult>();
    let (asserter_tx, outputter_rx) = flume::unbounded::<ProbeReport>();

    let asserter = tokio::spawn(Asserter::run(asserter_rx, asserter_tx));
    let outputter = tokio::spawn(async move {
        OutPutter::start(outputter_rx, "apiprobe.toml", 5, false).await
    });

    let token = resolve_token(setup.auth.as_ref(), &probe).await;
    assert_eq!(token.as_deref(), Some(TOKEN));
    run_probes(suites, &probe, token.as_deref(), runner_tx)
        .await
        .unwrap();

    asserter.await.unwrap().unwrap();
    let summary = outputter.await.unwrap();
    assert_eq!(summary.passed, 4);
    assert_eq!(summary.failed, 1);
}
