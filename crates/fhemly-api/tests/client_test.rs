#![allow(clippy::unwrap_used)]
// Integration tests for `FhemClient` using wiremock.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fhemly_api::{
    ClientConfig, Error, ErrorKind, FhemClient, FnArg, FunctionCall, Logger, Reply, Scalar,
    TransportConfig,
};

const TOKEN_HEADER: &str = "X-FHEM-csrfToken";

// ── Helpers ─────────────────────────────────────────────────────────

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}/fhem", server.uri()))
}

async fn setup() -> (MockServer, FhemClient) {
    let server = MockServer::start().await;
    let client = FhemClient::new(config_for(&server)).unwrap();
    (server, client)
}

/// Mount the token probe (`GET /fhem?XHR=1` without `cmd`).
async fn mount_probe(server: &MockServer, token: Option<&str>, times: u64) {
    let mut response = ResponseTemplate::new(200);
    if let Some(token) = token {
        response = response.insert_header(TOKEN_HEADER, token);
    }
    Mock::given(method("GET"))
        .and(path("/fhem"))
        .and(query_param("XHR", "1"))
        .and(query_param_is_missing("cmd"))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn command_mock(cmd: &str) -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path("/fhem"))
        .and(query_param("XHR", "1"))
        .and(query_param("cmd", cmd))
}

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl Logger for RecordingLogger {
    fn log(&self, level: tracing::Level, args: fmt::Arguments<'_>) {
        self.lines.lock().unwrap().push(format!("{level} {args}"));
    }
}

// ── Token handshake ─────────────────────────────────────────────────

#[tokio::test]
async fn test_first_command_probes_token_and_attaches_it() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_123"), 1).await;

    command_mock("{ 40 + 2 }")
        .and(query_param("fwcsrf", "csrf_123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("42\n"))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client.execute_command("{ 40 + 2 }").await.unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::Number(42.0)));
}

#[tokio::test]
async fn test_known_token_is_not_probed_again() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_123"), 1).await;

    command_mock("list")
        .and(query_param("fwcsrf", "csrf_123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("lamp\n"))
        .expect(2)
        .mount(&server)
        .await;

    client.execute_command("list").await.unwrap();
    let reply = client.execute_command("list").await.unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::from("lamp")));
}

#[tokio::test]
async fn test_gateway_without_token_is_remembered() {
    let (server, mut client) = setup().await;
    mount_probe(&server, None, 1).await;

    command_mock("set lamp on")
        .and(query_param_is_missing("fwcsrf"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\n"))
        .expect(2)
        .mount(&server)
        .await;

    assert!(client.execute_command("set lamp on").await.unwrap().is_none());
    assert!(client.execute_command("set lamp on").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_token_is_refreshed_and_command_reissued() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("old"), 1).await;

    command_mock("set lamp off")
        .and(query_param("fwcsrf", "old"))
        .respond_with(ResponseTemplate::new(400).insert_header(TOKEN_HEADER, "new"))
        .expect(1)
        .mount(&server)
        .await;

    command_mock("set lamp off")
        .and(query_param("fwcsrf", "new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done\n"))
        .expect(1)
        .mount(&server)
        .await;

    // Retries are disabled (expiration 0); the token refresh still reissues.
    let reply = client.execute_command("set lamp off").await.unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::from("done")));
}

#[tokio::test]
async fn test_rejection_without_fresh_token_is_fatal() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("old"), 1).await;
    client.set_expiration(Duration::from_secs(5));

    command_mock("set lamp off")
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.execute_command("set lamp off").await;

    assert!(
        matches!(result, Err(Error::TokenMissing)),
        "expected TokenMissing, got: {result:?}"
    );
}

// ── Status policy ───────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_is_auth_failure() {
    let (server, mut client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/fhem"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.execute_command("list").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthFailed);
}

#[tokio::test]
async fn test_redirect_means_wrong_base_path() {
    let (server, mut client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/fhem"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/fhem/"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.execute_command("list").await.unwrap_err();

    match err {
        Error::WrongBasePath { location } => assert_eq!(location, "/fhem/"),
        other => panic!("expected WrongBasePath, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unexpected_status_is_not_retried() {
    let (server, mut client) = setup().await;
    mount_probe(&server, None, 1).await;
    client.set_expiration(Duration::from_secs(5));

    command_mock("list")
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.execute_command("list").await.unwrap_err();

    match err {
        Error::UnexpectedStatus { status, reason } => {
            assert_eq!(status, 503);
            assert_eq!(reason, "Service Unavailable");
        }
        other => panic!("expected UnexpectedStatus, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let server = MockServer::start().await;
    let config = config_for(&server).with_credentials("admin", "secret".to_string().into());
    let mut client = FhemClient::new(config).unwrap();

    Mock::given(method("GET"))
        .and(path("/fhem"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(2)
        .mount(&server)
        .await;

    let reply = client.execute_command("list").await.unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::from("ok")));
}

// ── Snippets ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_snippet_is_brace_scoped() {
    let (server, mut client) = setup().await;
    mount_probe(&server, None, 1).await;

    command_mock("{ReadingsVal('lamp','state','')}")
        .respond_with(ResponseTemplate::new(200).set_body_string("on\n"))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client
        .execute_snippet("ReadingsVal('lamp','state','')")
        .await
        .unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::from("on")));
}

// ── Function invocation ─────────────────────────────────────────────

async fn mount_any_command(server: &MockServer, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/fhem"))
        .and(query_param("XHR", "1"))
        .and(query_param("fwcsrf", "csrf_fn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_single_value_is_a_number() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "[42]\n", 1).await;

    let call = FunctionCall::new("lamp", "getState");
    let reply = client.invoke_function(&call).await.unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::Number(42.0)));

    let requests = server.received_requests().await.unwrap();
    let cmd = requests
        .last()
        .unwrap()
        .url
        .query_pairs()
        .find(|(k, _)| k == "cmd")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert!(cmd.starts_with("{my @a = ('lamp');; my @r = getState(@a);;"), "{cmd}");
    assert!(cmd.ends_with('}'), "{cmd}");
}

#[tokio::test]
async fn test_single_value_never_becomes_a_mapping() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "[\"on\"]", 1).await;

    let call = FunctionCall::new("lamp", "getState").as_mapping(true);
    let reply = client.invoke_function(&call).await.unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::from("on")));
}

#[tokio::test]
async fn test_even_list_becomes_mapping() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "[\"state\",\"on\",\"pct\",40]", 1).await;

    let call = FunctionCall::new("lamp", "getAll").as_mapping(true);
    let reply = client.invoke_function(&call).await.unwrap();

    let Reply::Map(map) = reply else {
        panic!("expected a mapping, got: {reply:?}");
    };
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["state", "pct"]);
    assert_eq!(map["pct"], Scalar::Number(40.0));
}

#[tokio::test]
async fn test_list_without_mapping_keeps_order() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "[3,\"b\",1]", 1).await;

    let call = FunctionCall::new("lamp", "getAll");
    let reply = client.invoke_function(&call).await.unwrap();

    assert_eq!(
        reply,
        Reply::List(vec![Scalar::Number(3.0), Scalar::from("b"), Scalar::Number(1.0)])
    );
}

#[tokio::test]
async fn test_odd_list_for_mapping_fails_without_retry() {
    let (server, mut client) = setup().await;
    client.set_expiration(Duration::from_secs(5));
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "[\"a\",\"b\",\"c\"]", 1).await;

    let call = FunctionCall::new("lamp", "getAll").as_mapping(true);
    let err = client.invoke_function(&call).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OddLengthListForMapping);
}

#[tokio::test]
async fn test_undef_result_is_none() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "undef", 1).await;

    let call = FunctionCall::new("lamp", "getNothing").arg(FnArg::Undefined);
    let reply = client.invoke_function(&call).await.unwrap();

    assert!(reply.is_none());
}

#[tokio::test]
async fn test_remote_error_text_is_surfaced() {
    let (server, mut client) = setup().await;
    client.set_expiration(Duration::from_secs(5));
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(
        &server,
        "Undefined subroutine &main::nope called at (eval 9) line 1.\n",
        1,
    )
    .await;

    let call = FunctionCall::new("lamp", "nope");
    let err = client.invoke_function(&call).await.unwrap_err();

    match err {
        Error::RemoteInvocation { message } => {
            assert!(message.starts_with("Undefined subroutine"), "{message}");
        }
        other => panic!("expected RemoteInvocation, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_function_name_sends_nothing() {
    let (server, mut client) = setup().await;
    mount_probe(&server, Some("csrf_fn"), 0).await;

    let call = FunctionCall::new("lamp", "bad name");
    let err = client.invoke_function(&call).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_invocation_log_hides_device_hash() {
    let server = MockServer::start().await;
    let logger = Arc::new(RecordingLogger::default());
    let mut client = FhemClient::new(config_for(&server))
        .unwrap()
        .with_logger(logger.clone());
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "[1]", 1).await;

    let call = FunctionCall::new("lamp", "setLevel")
        .pass_handle(true)
        .arg(50)
        .arg("fast");
    client.invoke_function(&call).await.unwrap();

    let lines = logger.lines.lock().unwrap();
    assert!(
        lines
            .iter()
            .any(|l| l == "INFO invoking setLevel(<device hash>, 50, 'fast') on lamp"),
        "log lines: {lines:?}"
    );
}

#[tokio::test]
async fn test_connection_log_reports_only_client_side_state() {
    let server = MockServer::start().await;
    let logger = Arc::new(RecordingLogger::default());
    let mut client = FhemClient::new(config_for(&server))
        .unwrap()
        .with_logger(logger.clone());
    mount_probe(&server, Some("csrf_fn"), 1).await;
    mount_any_command(&server, "[1]", 1).await;

    client
        .invoke_function(&FunctionCall::new("lamp", "getState"))
        .await
        .unwrap();

    let sends: Vec<String> = logger
        .lines
        .lock()
        .unwrap()
        .iter()
        .filter(|l| l.starts_with("DEBUG sending to "))
        .cloned()
        .collect();
    assert_eq!(sends.len(), 2, "{sends:?}");
    assert!(sends[0].ends_with("on a fresh connection"), "{sends:?}");
    assert!(sends[1].ends_with("over kept-alive client"), "{sends:?}");
}

// ── Retry ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_timeout_is_retried_until_success() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        timeout: Some(Duration::from_millis(200)),
        ..TransportConfig::default()
    };
    let config = config_for(&server)
        .with_transport(transport)
        .with_retry_delay(ErrorKind::ConnectTimeout, Duration::from_millis(50))
        .with_expiration(Duration::from_secs(5));
    let mut client = FhemClient::new(config).unwrap();
    mount_probe(&server, None, 1).await;

    command_mock("list")
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    command_mock("list")
        .respond_with(ResponseTemplate::new(200).set_body_string("fast"))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client.execute_command("list").await.unwrap();

    assert_eq!(reply, Reply::Scalar(Scalar::from("fast")));
}

#[tokio::test]
async fn test_timeout_without_expiration_is_surfaced() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        timeout: Some(Duration::from_millis(100)),
        ..TransportConfig::default()
    };
    let mut client = FhemClient::new(config_for(&server).with_transport(transport)).unwrap();

    Mock::given(method("GET"))
        .and(path("/fhem"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.execute_command("list").await.unwrap_err();

    assert!(
        matches!(err, Error::ConnectTimeout { timeout_ms: 100 }),
        "expected ConnectTimeout, got: {err:?}"
    );
}

/// A URL on a local port nothing listens on.
fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/fhem")
}

#[tokio::test(start_paused = true)]
async fn test_connection_refused_retries_until_deadline() {
    // No request timeout so the paused clock only moves through retry delays.
    let transport = TransportConfig {
        timeout: None,
        ..TransportConfig::default()
    };
    let config = ClientConfig::new(refused_url())
        .with_transport(transport)
        .with_retry_delay(ErrorKind::ConnectionRefused, Duration::from_millis(100))
        .with_expiration(Duration::from_millis(350));
    let logger = Arc::new(RecordingLogger::default());
    let mut client = FhemClient::new(config)
        .unwrap()
        .with_logger(logger.clone());

    let started = tokio::time::Instant::now();
    let err = client.execute_command("list").await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    // Failures at 0, 100 and 200ms resume before 350ms; the one at 300ms
    // would resume at 400ms and is final.
    let retries = logger
        .lines
        .lock()
        .unwrap()
        .iter()
        .filter(|l| l.starts_with("WARN"))
        .count();
    assert_eq!(retries, 3);
    assert!(
        elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(400),
        "took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_connection_refused_without_expiration_fails_fast() {
    let mut client = FhemClient::new(ClientConfig::new(refused_url())).unwrap();

    let started = Instant::now();
    let err = client.execute_command("list").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_peer_reset_after_earlier_timeout_is_a_reset() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // The first connection is held open and never answered.
        let (_silent, _) = listener.accept().await.unwrap();
        let (mut reset, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = reset.read(&mut buf).await;
        reset.set_linger(Some(Duration::ZERO)).unwrap();
        drop(reset);
    });

    let transport = TransportConfig {
        timeout: Some(Duration::from_millis(200)),
        ..TransportConfig::default()
    };
    let config = ClientConfig::new(format!("http://{addr}/fhem")).with_transport(transport);
    let mut client = FhemClient::new(config).unwrap();

    let first = client.execute_command("list").await.unwrap_err();
    assert_eq!(first.kind(), ErrorKind::ConnectTimeout);

    let second = client.execute_command("list").await.unwrap_err();
    assert_eq!(
        second.kind(),
        ErrorKind::ConnectionReset,
        "got {second:?}"
    );
}
