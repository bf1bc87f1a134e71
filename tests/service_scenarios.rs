//! End-to-end scenarios against a mock vendor API

use powerlink::{
    CommandOutcome, OutputPower, PowerService, ServiceConfig, ServiceError, Submission,
};
use std::time::Duration;
use wiremock::matchers::{body_string, header, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const LOGIN: &str = "/v1/user/login";
const SET_OUTPUT: &str = "/v1/manage/setOnGridInverterParam";

fn config(server: &MockServer) -> ServiceConfig {
    let mut config = ServiceConfig::new("owner@example.com", "secret", "INV0001");
    config.base_url = server.uri();
    config.eager_login = false;
    config.request_timeout_ms = 500;
    config.retry_backoff_ms = 10;
    config
}

fn power(p: i64) -> OutputPower {
    OutputPower::new(p).unwrap()
}

fn login_ok(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Set-Cookie", format!("JSESSIONID={}; Path=/; HttpOnly", token).as_str())
        .set_body_string(r#"{"result":0,"msg":"success"}"#)
}

fn result(code: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(r#"{{"result":{},"msg":"x"}}"#, code))
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(login_ok(token))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, target: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == target)
        .collect()
}

async fn paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test]
async fn test_unauthenticated_set_output_logs_in_then_applies() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path(SET_OUTPUT))
        .and(header("Cookie", "JSESSIONID=tok-1"))
        .and(header_exists("sign"))
        .and(header_exists("time"))
        .and(body_string("deviceSn=INV0001&outputPower=50"))
        .respond_with(result(0))
        .expect(1)
        .mount(&server)
        .await;

    let service = PowerService::start(config(&server)).unwrap();
    let submission = service.set_output(50, true).await.unwrap();

    assert_eq!(submission, Submission::Completed(CommandOutcome::Applied(power(50))));
    assert_eq!(service.last_confirmed_output().await, Some(power(50)));

    let stats = service.status().await.stats;
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);

    // Exactly one login, before the control call
    assert_eq!(paths(&server).await, vec![LOGIN, SET_OUTPUT]);

    service.shutdown().await;
}

#[tokio::test]
async fn test_out_of_range_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;

    let service = PowerService::start(config(&server)).unwrap();
    let before = service.status().await;

    for value in [150, 101, -1] {
        let err = service.set_output(value, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "{} accepted", value);
    }

    service.shutdown().await;
    assert_eq!(service.status().await, before);
    assert!(paths(&server).await.is_empty());
}

#[tokio::test]
async fn test_session_expiry_triggers_one_relogin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(login_ok("tok-1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_login(&server, "tok-2").await;
    Mock::given(method("POST"))
        .and(path(SET_OUTPUT))
        .respond_with(result(10000))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SET_OUTPUT))
        .and(header("Cookie", "JSESSIONID=tok-2"))
        .respond_with(result(0))
        .mount(&server)
        .await;

    let service = PowerService::start(config(&server)).unwrap();
    let submission = service.set_output(70, true).await.unwrap();
    assert_eq!(submission, Submission::Completed(CommandOutcome::Applied(power(70))));

    assert_eq!(paths(&server).await, vec![LOGIN, SET_OUTPUT, LOGIN, SET_OUTPUT]);

    let stats = service.status().await.stats;
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.session_refreshes, 2);

    service.shutdown().await;
}

#[tokio::test]
async fn test_timeouts_exhaust_retries_and_fail_once() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path(SET_OUTPUT))
        .respond_with(result(0).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.request_timeout_ms = 100;
    config.max_retry_count = 3;
    let service = PowerService::start(config).unwrap();

    let err = service.set_output(40, true).await.unwrap_err();
    assert!(matches!(err, ServiceError::Transport(_)));

    assert_eq!(requests_to(&server, SET_OUTPUT).await.len(), 4);
    let stats = service.status().await.stats;
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(service.last_confirmed_output().await, None);

    service.shutdown().await;
}

#[tokio::test]
async fn test_device_offline_completes_without_confirming() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path(SET_OUTPUT))
        .respond_with(result(2))
        .mount(&server)
        .await;

    let service = PowerService::start(config(&server)).unwrap();
    let submission = service.set_output(80, true).await.unwrap();

    assert_eq!(
        submission,
        Submission::Completed(CommandOutcome::DeviceOffline(power(80)))
    );
    assert_eq!(service.last_confirmed_output().await, None);
    assert_eq!(requests_to(&server, SET_OUTPUT).await.len(), 1);
    assert_eq!(service.status().await.stats.failed_requests, 0);

    service.shutdown().await;
}

#[tokio::test]
async fn test_unexpected_status_is_not_retried() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path(SET_OUTPUT))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = PowerService::start(config(&server)).unwrap();
    let err = service.set_output(20, true).await.unwrap_err();

    assert_eq!(err, ServiceError::Protocol("HTTP status 500".into()));
    assert_eq!(requests_to(&server, SET_OUTPUT).await.len(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_rejected_login_fails_command() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result":1}"#))
        .mount(&server)
        .await;

    let service = PowerService::start(config(&server)).unwrap();
    let err = service.set_output(20, true).await.unwrap_err();

    assert!(matches!(err, ServiceError::Auth(_)));
    assert!(!service.is_ready().await);
    assert!(requests_to(&server, SET_OUTPUT).await.is_empty());
    assert_eq!(service.status().await.stats.failed_requests, 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_submissions_keep_submission_order() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path(SET_OUTPUT))
        .respond_with(result(0))
        .mount(&server)
        .await;

    let service = PowerService::start(config(&server)).unwrap();
    for value in [5, 15, 25, 35] {
        assert_eq!(service.set_output(value, false).await.unwrap(), Submission::Queued);
    }
    service.shutdown().await;

    let bodies: Vec<String> = requests_to(&server, SET_OUTPUT)
        .await
        .into_iter()
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect();
    assert_eq!(
        bodies,
        vec![
            "deviceSn=INV0001&outputPower=5",
            "deviceSn=INV0001&outputPower=15",
            "deviceSn=INV0001&outputPower=25",
            "deviceSn=INV0001&outputPower=35",
        ]
    );
    assert_eq!(service.last_confirmed_output().await, Some(power(35)));
}

#[tokio::test]
async fn test_status_never_exposes_token() {
    let server = MockServer::start().await;
    mount_login(&server, "very-secret-token").await;

    let service = PowerService::start(config(&server)).unwrap();
    service.force_relogin().await.unwrap();

    let status = service.status().await;
    assert!(status.authenticated);
    let json = serde_json::to_string(&status).unwrap();
    assert!(!json.contains("very-secret-token"));
    assert!(!format!("{:?}", status).contains("very-secret-token"));

    service.shutdown().await;
}
