//! Both terminal source implementations must honour the same contract: the
//! same answers normalize to the same tables, a batch failure surfaces as a
//! non-zero status, and an unreachable terminal is a retryable error.

use std::sync::Arc;

use idxlens_core::data_source::cell_number;
use idxlens_core::http_client::StaticHttpClient;
use idxlens_core::{
    DatasetRequest, DateRange, FixtureSource, GatewayAdapter, HttpResponse, InstrumentCode,
    IsoDate, SeriesRequest, SnapshotRequest, SourceErrorKind, SourceId, TerminalSource,
};
use serde_json::json;

struct SourceCase {
    id: SourceId,
    source: Arc<dyn TerminalSource>,
}

fn code(raw: &str) -> InstrumentCode {
    InstrumentCode::parse(raw).expect("valid code")
}

fn date(raw: &str) -> IsoDate {
    IsoDate::parse(raw).expect("valid date")
}

fn healthy_cases() -> Vec<SourceCase> {
    let client = StaticHttpClient::new()
        .with_route(
            "wss",
            HttpResponse::ok_json(
                r#"{"ErrorCode":0,"Codes":["000300.SH","000905.SH"],"Fields":["SEC_NAME","BETA"],
                    "Data":[["沪深300","中证500"],[1.0,null]]}"#,
            ),
        )
        .with_route(
            "wsd",
            HttpResponse::ok_json(
                r#"{"ErrorCode":0,"Codes":["000300.SH"],"Fields":["CLOSE"],
                    "Times":["2024-01-02","2024-01-03","2024-01-04"],"Data":[[3386.35,null,3370.0]]}"#,
            ),
        )
        .with_route(
            "wset",
            HttpResponse::ok_json(
                r#"{"ErrorCode":0,"Fields":["wind_code","i_weight"],
                    "Data":[["600519.SH","601318.SH"],[5.1,3.2]]}"#,
            ),
        );
    let gateway = GatewayAdapter::with_http_client("http://gateway.test", Arc::new(client));

    let fixture = FixtureSource::new()
        .with_value("000300.SH", "sec_name", "沪深300")
        .with_value("000905.SH", "sec_name", "中证500")
        .with_value("000300.SH", "beta", 1.0)
        .with_series(
            "000300.SH",
            "close",
            [(date("2024-01-02"), 3386.35), (date("2024-01-04"), 3370.0)],
        )
        .with_series("000300.SH", "close", [(date("2024-01-03"), f64::NAN)])
        .with_dataset(
            "indexconstituent",
            "000300.SH",
            &["wind_code", "i_weight"],
            vec![vec![json!("600519.SH"), json!(5.1)], vec![json!("601318.SH"), json!(3.2)]],
        );

    vec![
        SourceCase {
            id: SourceId::Gateway,
            source: Arc::new(gateway),
        },
        SourceCase {
            id: SourceId::Fixture,
            source: Arc::new(fixture),
        },
    ]
}

#[tokio::test]
async fn snapshot_returns_code_major_cells_for_all_sources() {
    let request = SnapshotRequest::new(vec![code("000300.SH"), code("000905.SH")], ["sec_name", "beta"])
        .expect("valid request");

    for case in healthy_cases() {
        assert_eq!(case.source.id(), case.id);
        let table = case
            .source
            .snapshot(request.clone())
            .await
            .unwrap_or_else(|error| panic!("source '{}' snapshot failed: {error}", case.id));

        assert!(table.is_ok(), "source '{}': status", case.id);
        assert_eq!(table.text(&code("000300.SH"), "sec_name"), Some("沪深300"), "source '{}'", case.id);
        assert_eq!(table.number(&code("000300.SH"), "beta"), Some(1.0), "source '{}'", case.id);
        assert_eq!(table.number(&code("000905.SH"), "beta"), None, "source '{}'", case.id);
    }
}

#[tokio::test]
async fn series_skips_gaps_for_all_sources() {
    let range = DateRange::parse("2024-01-01", "2024-01-31").expect("valid range");
    let request = SeriesRequest::new(vec![code("000300.SH")], "close", range).expect("valid request");

    for case in healthy_cases() {
        let table = case
            .source
            .series(request.clone())
            .await
            .unwrap_or_else(|error| panic!("source '{}' series failed: {error}", case.id));

        assert_eq!(
            table.observations(&code("000300.SH")),
            vec![(date("2024-01-02"), 3386.35), (date("2024-01-04"), 3370.0)],
            "source '{}'",
            case.id
        );
    }
}

#[tokio::test]
async fn dataset_rows_are_addressable_by_column_for_all_sources() {
    let request = DatasetRequest::new("indexconstituent")
        .expect("valid request")
        .with_option("date=20240628;windcode=000300.SH");

    for case in healthy_cases() {
        let dataset = case
            .source
            .dataset(request.clone())
            .await
            .unwrap_or_else(|error| panic!("source '{}' dataset failed: {error}", case.id));

        assert_eq!(dataset.len(), 2, "source '{}'", case.id);
        assert_eq!(dataset.cell(0, "I_WEIGHT").and_then(cell_number), Some(5.1), "source '{}'", case.id);
    }
}

#[tokio::test]
async fn batch_failure_is_a_status_not_an_error_for_all_sources() {
    let client = StaticHttpClient::new()
        .with_route("wss", HttpResponse::ok_json(r#"{"ErrorCode":-40522017}"#));
    let cases = vec![
        SourceCase {
            id: SourceId::Gateway,
            source: Arc::new(GatewayAdapter::with_http_client("http://gateway.test", Arc::new(client))),
        },
        SourceCase {
            id: SourceId::Fixture,
            source: Arc::new(FixtureSource::new().with_status(-40522017)),
        },
    ];
    let request = SnapshotRequest::new(vec![code("000300.SH")], ["sec_type"]).expect("valid request");

    for case in cases {
        let table = case
            .source
            .snapshot(request.clone())
            .await
            .unwrap_or_else(|error| panic!("source '{}' transport failed: {error}", case.id));
        assert_eq!(table.status, -40522017, "source '{}'", case.id);

        let error = table.into_checked().expect_err("checked table must fail");
        assert_eq!(error.kind(), SourceErrorKind::BatchFailed, "source '{}'", case.id);
    }
}

#[tokio::test]
async fn unreachable_terminal_is_retryable_for_all_sources() {
    let cases = vec![
        SourceCase {
            id: SourceId::Gateway,
            source: Arc::new(GatewayAdapter::with_http_client(
                "http://gateway.test",
                Arc::new(StaticHttpClient::new()),
            )),
        },
        SourceCase {
            id: SourceId::Fixture,
            source: Arc::new(FixtureSource::new().unreachable()),
        },
    ];
    let request = SnapshotRequest::new(vec![code("000300.SH")], ["sec_type"]).expect("valid request");

    for case in cases {
        let error = case
            .source
            .snapshot(request.clone())
            .await
            .expect_err("unreachable terminal must fail");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable, "source '{}'", case.id);
        assert!(error.retryable(), "source '{}'", case.id);
    }
}
