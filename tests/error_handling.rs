//! Behavior-driven tests for error handling.
//!
//! These tests verify that every failure reaches the analyst as a typed error
//! with a stable code, and that bad input never panics.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use idxlens_core::http_client::StaticHttpClient;
use idxlens_core::{
    fund_metrics, read_code_file, AnalysisError, AppConfig, AppState, CoreError, DateRange, EnvelopeError,
    FixtureSource, FormSubmission, GatewayAdapter, HttpResponse, InstrumentCode, SessionState,
    SnapshotRequest, SourceErrorKind, TerminalSource, Throttle, UploadError,
};

fn code(raw: &str) -> InstrumentCode {
    InstrumentCode::parse(raw).expect("valid code")
}

fn range() -> DateRange {
    DateRange::parse("2023-01-01", "2024-01-01").expect("valid range")
}

fn upload(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write upload");
    file
}

// =============================================================================
// Errors: Terminal Connection
// =============================================================================

#[tokio::test]
async fn when_terminal_is_unreachable_system_reports_a_connection_error() {
    // Given: a terminal that cannot be reached
    let app = AppState::new(AppConfig::default(), Arc::new(FixtureSource::new().unreachable()));
    let mut session = SessionState::new();

    // When: the analyst submits valid codes
    let error = session
        .submit(FormSubmission::text("000300", range()), &app)
        .await
        .expect_err("unreachable terminal");

    // Then: the reason is surfaced and flagged retryable
    assert_eq!(error.code(), "analysis.connection");
    let payload = EnvelopeError::from(&error);
    assert_eq!(payload.retryable, Some(true));
    assert!(session.error.as_deref().is_some_and(|m| m.contains("unreachable")));
}

#[tokio::test]
async fn when_gateway_answers_with_http_error_system_maps_it_to_unavailable() {
    let client = StaticHttpClient::new().with_route(
        "wss",
        HttpResponse {
            status: 503,
            body: String::from("maintenance"),
        },
    );
    let adapter = GatewayAdapter::with_http_client("http://gateway.test", Arc::new(client));
    let request = SnapshotRequest::new(vec![code("000300.SH")], ["sec_type"]).expect("valid request");

    let error = adapter.snapshot(request).await.expect_err("503 must fail");

    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert_eq!(error.code(), "source.unavailable");
    assert!(error.message().contains("503"));
}

#[tokio::test]
async fn when_gateway_body_is_not_json_system_reports_an_internal_error() {
    let client = StaticHttpClient::new().with_route("wss", HttpResponse::ok_json("<html>"));
    let adapter = GatewayAdapter::with_http_client("http://gateway.test", Arc::new(client));
    let request = SnapshotRequest::new(vec![code("000300.SH")], ["sec_type"]).expect("valid request");

    let error = adapter.snapshot(request).await.expect_err("undecodable body");

    assert_eq!(error.kind(), SourceErrorKind::Internal);
    assert!(!error.retryable());
}

#[tokio::test]
async fn when_fund_batch_exceeds_request_budget_system_waits_and_completes() {
    // Given: six funds behind a gateway that allows three requests per 150ms
    let funds: Vec<InstrumentCode> = (0..6).map(|i| code(&format!("{:06}.OF", 110000 + i))).collect();
    let column = |value: serde_json::Value| serde_json::Value::Array(vec![value; funds.len()]);
    let snapshot = serde_json::json!({
        "ErrorCode": 0,
        "Fields": [
            "fund_info_name",
            "risk_trackerror_trackindex",
            "risk_navoverbenchannualreturn",
            "netasset_total_cc"
        ],
        "Data": [column("指数基金".into()), column(1.2.into()), column(0.8.into()), column(3e9.into())]
    });
    let shares = r#"{"ErrorCode":0,"Times":["2024-01-02","2024-01-03","2024-01-04","2024-01-05"],
        "Data":[[100.0,101.0,100.0,102.0]]}"#;
    let client = StaticHttpClient::new()
        .with_route("wss", HttpResponse::ok_json(snapshot.to_string()))
        .with_route("wsd", HttpResponse::ok_json(shares));
    let adapter = GatewayAdapter::with_http_client("http://gateway.test", Arc::new(client.clone()))
        .with_throttle(Throttle::new(Duration::from_millis(150), 3));

    // When: one snapshot plus one share series per fund is requested
    let metrics = fund_metrics(&adapter, &funds, range())
        .await
        .expect("every call waits for budget");

    // Then
    assert_eq!(metrics.table.len(), 6);
    assert!(metrics.dropped.is_empty());
    assert_eq!(client.requests().len(), 7);
}

// =============================================================================
// Errors: Uploads
// =============================================================================

#[test]
fn when_upload_has_unsupported_extension_system_names_it() {
    let file = upload(".pdf", "code\n510300.OF\n");

    let error = read_code_file(file.path()).expect_err("pdf is not supported");

    assert!(matches!(error, UploadError::UnsupportedFormat { ref extension } if extension == "pdf"));
}

#[test]
fn when_spreadsheet_upload_is_corrupt_system_reports_it() {
    let file = upload(".xlsx", "not a zip archive");

    let error = read_code_file(file.path()).expect_err("corrupt workbook");

    assert!(matches!(error, UploadError::Spreadsheet { .. }));
}

#[test]
fn when_upload_lacks_a_code_column_system_lists_accepted_headers() {
    let file = upload(".csv", "name,weight\nA,1\n");

    let error = read_code_file(file.path()).expect_err("no code column");

    assert!(error.to_string().contains("security_code"));
}

#[test]
fn when_upload_contains_a_malformed_code_system_reports_the_line() {
    let file = upload(".csv", "code\n510300.OF\nnot-a-code\n");

    let error = read_code_file(file.path()).expect_err("bad code");

    assert!(matches!(error, UploadError::MalformedRecord { line: 3, .. }));
}

#[test]
fn when_upload_is_tab_separated_with_bom_system_reads_it() {
    let file = upload(".tsv", "\u{feff}证券代码\t证券简称\n510300.OF\t沪深300ETF\n");

    let uploaded = read_code_file(file.path()).expect("valid upload");

    assert_eq!(uploaded.codes, vec![code("510300.OF")]);
    assert_eq!(uploaded.path, file.path());
}

// =============================================================================
// Errors: Configuration
// =============================================================================

#[test]
fn when_environment_holds_a_bad_number_system_names_the_variable() {
    let error = AppConfig::load_with(|name| {
        (name == "IDXLENS_MAX_CODES").then(|| String::from("eight"))
    })
    .expect_err("bad number");

    assert!(matches!(error, CoreError::Config(ref message) if message.contains("IDXLENS_MAX_CODES")));
}

#[test]
fn when_no_gateway_is_configured_system_refuses_to_build_the_app() {
    let error = AppState::from_config(AppConfig::default()).expect_err("gateway required");

    assert!(matches!(error, CoreError::Config(_)));
}

#[test]
fn when_fixture_file_is_not_json_system_returns_a_serialization_error() {
    let error = FixtureSource::from_json_str("{ not json").expect_err("bad fixture");

    assert!(matches!(error, CoreError::Serialization(_)));
}

// =============================================================================
// Errors: Stable Codes
// =============================================================================

#[test]
fn every_analysis_error_has_a_namespaced_code() {
    let errors = [
        AnalysisError::Format {
            tokens: vec![String::from("x")],
        },
        AnalysisError::NoCodes,
        AnalysisError::Verification {
            codes: vec![String::from("000300.SH")],
            reason: None,
        },
        AnalysisError::data_unavailable("nothing left"),
    ];

    for error in &errors {
        assert!(error.code().starts_with("analysis."), "{error}");
        let payload = EnvelopeError::from(error);
        payload.validate().expect("envelope error is well formed");
        assert_eq!(payload.retryable, None);
    }
}
