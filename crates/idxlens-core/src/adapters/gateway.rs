use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::data_source::{
    cell_number, Dataset, DatasetRequest, Endpoint, FieldTable, SeriesRequest, SeriesTable,
    SnapshotRequest, SourceError, SourceFuture, TerminalSource,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::throttling::Throttle;
use crate::{join_codes, IsoDate, SourceId};

/// Adapter for the HTTP bridge in front of the market-data terminal.
#[derive(Clone)]
pub struct GatewayAdapter {
    base_url: String,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    timeout_ms: u64,
    throttle: Throttle,
}

impl GatewayAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(base_url: impl Into<String>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http_client,
            auth: HttpAuth::None,
            timeout_ms: 10_000,
            throttle: Throttle::per_minute(120),
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint, query: &[(&str, String)]) -> String {
        let query = query
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{}?{query}", self.base_url, endpoint.function())
    }

    async fn fetch(&self, endpoint: Endpoint, url: String) -> Result<WirePayload, SourceError> {
        self.throttle.acquire().await;

        let request = HttpRequest::get(url)
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms);
        let response = self.http_client.execute(request).await.map_err(|error| {
            SourceError::unavailable(format!("gateway transport error: {}", error.message()))
        })?;

        if response.status == 429 {
            return Err(SourceError::rate_limited(format!(
                "gateway refused {endpoint} request: terminal quota exhausted"
            )));
        }
        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "gateway returned status {} for {endpoint}",
                response.status
            )));
        }

        let payload: WirePayload = serde_json::from_str(&response.body).map_err(|error| {
            SourceError::internal(format!("failed to decode gateway {endpoint} response: {error}"))
        })?;

        if payload.error_code != 0 {
            tracing::warn!(
                endpoint = endpoint.as_str(),
                status = payload.error_code,
                "terminal reported batch failure"
            );
        }
        Ok(payload)
    }
}

impl TerminalSource for GatewayAdapter {
    fn id(&self) -> SourceId {
        SourceId::Gateway
    }

    fn snapshot<'a>(&'a self, req: SnapshotRequest) -> SourceFuture<'a, FieldTable> {
        Box::pin(async move {
            let url = self.url(
                Endpoint::Snapshot,
                &[
                    ("codes", join_codes(&req.codes)),
                    ("fields", req.fields.join(",")),
                    ("options", req.options.join(";")),
                ],
            );
            let payload = self.fetch(Endpoint::Snapshot, url).await?;
            if payload.error_code != 0 {
                return Ok(FieldTable::failed(payload.error_code));
            }
            Ok(normalize_snapshot(payload, &req))
        })
    }

    fn series<'a>(&'a self, req: SeriesRequest) -> SourceFuture<'a, SeriesTable> {
        Box::pin(async move {
            let url = self.url(
                Endpoint::Series,
                &[
                    ("codes", join_codes(&req.codes)),
                    ("fields", req.field.clone()),
                    ("begin", req.range.start().to_string()),
                    ("end", req.range.end().to_string()),
                    ("options", req.options.join(";")),
                ],
            );
            let payload = self.fetch(Endpoint::Series, url).await?;
            if payload.error_code != 0 {
                return Ok(SeriesTable::failed(req.field, payload.error_code));
            }
            normalize_series(payload, &req)
        })
    }

    fn dataset<'a>(&'a self, req: DatasetRequest) -> SourceFuture<'a, Dataset> {
        Box::pin(async move {
            let url = self.url(
                Endpoint::Dataset,
                &[("name", req.name.clone()), ("options", req.options.join(";"))],
            );
            let payload = self.fetch(Endpoint::Dataset, url).await?;
            if payload.error_code != 0 {
                return Ok(Dataset::failed(payload.error_code));
            }
            Ok(normalize_dataset(payload))
        })
    }
}

/// Native terminal response shape as relayed by the gateway.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WirePayload {
    error_code: i64,
    #[serde(default)]
    codes: Vec<String>,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    times: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

fn cell(data: &[Vec<Value>], outer: usize, inner: usize) -> Value {
    data.get(outer)
        .and_then(|row| row.get(inner))
        .cloned()
        .unwrap_or(Value::Null)
}

// wss data is [field][code]; FieldTable stores [code][field].
fn normalize_snapshot(payload: WirePayload, req: &SnapshotRequest) -> FieldTable {
    let codes = if payload.codes.is_empty() {
        req.codes.iter().map(|code| code.as_str().to_owned()).collect()
    } else {
        payload.codes
    };
    let fields = if payload.fields.is_empty() {
        req.fields.clone()
    } else {
        payload.fields
    };

    let cells = (0..codes.len())
        .map(|code_index| {
            (0..fields.len())
                .map(|field_index| cell(&payload.data, field_index, code_index))
                .collect()
        })
        .collect();

    FieldTable {
        status: 0,
        codes,
        fields,
        cells,
    }
}

// wsd data for a single field is [code][time].
fn normalize_series(payload: WirePayload, req: &SeriesRequest) -> Result<SeriesTable, SourceError> {
    let dates = payload
        .times
        .iter()
        .map(|raw| {
            let day = raw.get(..10).unwrap_or(raw);
            IsoDate::parse(day).map_err(|error| {
                SourceError::internal(format!("gateway returned an unreadable date: {error}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let codes = if payload.codes.is_empty() {
        req.codes.iter().map(|code| code.as_str().to_owned()).collect()
    } else {
        payload.codes
    };

    let values = (0..codes.len())
        .map(|code_index| {
            (0..dates.len())
                .map(|time_index| cell_number(&cell(&payload.data, code_index, time_index)))
                .collect()
        })
        .collect();

    Ok(SeriesTable {
        status: 0,
        field: req.field.clone(),
        dates,
        codes,
        values,
    })
}

// wset data is [field][row].
fn normalize_dataset(payload: WirePayload) -> Dataset {
    let row_count = payload.data.iter().map(Vec::len).max().unwrap_or(0);
    let rows = (0..row_count)
        .map(|row_index| {
            (0..payload.fields.len())
                .map(|field_index| cell(&payload.data, field_index, row_index))
                .collect()
        })
        .collect();

    Dataset {
        status: 0,
        columns: payload.fields,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpResponse, StaticHttpClient};
    use crate::{DateRange, InstrumentCode};

    fn code(raw: &str) -> InstrumentCode {
        InstrumentCode::parse(raw).expect("valid code")
    }

    fn adapter(client: StaticHttpClient) -> GatewayAdapter {
        GatewayAdapter::with_http_client("http://gateway.test/api/", Arc::new(client))
    }

    #[tokio::test]
    async fn snapshot_transposes_field_major_data() {
        let client = StaticHttpClient::new().with_route(
            "wss",
            HttpResponse::ok_json(
                r#"{"ErrorCode":0,"Codes":["000300.SH","000905.SH"],"Fields":["SEC_TYPE","WINDTYPE"],
                    "Data":[["股票指数","股票指数"],["A股指数",null]]}"#,
            ),
        );
        let adapter = adapter(client.clone());
        let request = SnapshotRequest::new(
            vec![code("000300.SH"), code("000905.SH")],
            ["sec_type", "windtype"],
        )
        .expect("valid request");

        let table = adapter.snapshot(request).await.expect("snapshot succeeds");

        assert_eq!(table.text(&code("000300.SH"), "windtype"), Some("A股指数"));
        assert_eq!(table.text(&code("000905.SH"), "windtype"), None);
        let seen = client.requests();
        assert_eq!(seen.len(), 1);
        assert!(seen[0]
            .url
            .starts_with("http://gateway.test/api/wss?codes=000300.SH%2C000905.SH"));
    }

    #[tokio::test]
    async fn non_zero_error_code_is_reported_as_status() {
        let client = StaticHttpClient::new()
            .with_route("wss", HttpResponse::ok_json(r#"{"ErrorCode":-40520007}"#));
        let request =
            SnapshotRequest::new(vec![code("000300.SH")], ["sec_type"]).expect("valid request");

        let table = adapter(client).snapshot(request).await.expect("transport ok");

        assert_eq!(table.status, -40520007);
        assert!(!table.is_ok());
    }

    #[tokio::test]
    async fn series_reads_code_major_data() {
        let client = StaticHttpClient::new().with_route(
            "wsd",
            HttpResponse::ok_json(
                r#"{"ErrorCode":0,"Codes":["000300.SH"],"Fields":["CLOSE"],
                    "Times":["2024-01-02","2024-01-03 00:00:00.005"],"Data":[[3400.5,null]]}"#,
            ),
        );
        let range = DateRange::parse("2024-01-01", "2024-01-05").expect("valid range");
        let request =
            SeriesRequest::new(vec![code("000300.SH")], "close", range).expect("valid request");

        let table = adapter(client).series(request).await.expect("series succeeds");

        assert_eq!(table.dates.len(), 2);
        assert_eq!(table.column(&code("000300.SH")), Some(&[Some(3400.5), None][..]));
    }

    #[tokio::test]
    async fn dataset_transposes_columns_into_rows() {
        let client = StaticHttpClient::new().with_route(
            "wset",
            HttpResponse::ok_json(
                r#"{"ErrorCode":0,"Fields":["wind_code","i_weight"],
                    "Data":[["600519.SH","601318.SH"],[5.1,3.2]]}"#,
            ),
        );
        let request = DatasetRequest::new("indexconstituent").expect("valid request");

        let dataset = adapter(client).dataset(request).await.expect("dataset succeeds");

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.cell(1, "i_weight").and_then(cell_number), Some(3.2));
    }

    #[tokio::test]
    async fn http_failure_status_maps_to_unavailable() {
        let client = StaticHttpClient::new().with_route(
            "wset",
            HttpResponse {
                status: 502,
                body: String::new(),
            },
        );
        let request = DatasetRequest::new("indexconstituent").expect("valid request");

        let err = adapter(client).dataset(request).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_rate_limited() {
        let client = StaticHttpClient::new().with_route(
            "wset",
            HttpResponse {
                status: 429,
                body: String::new(),
            },
        );
        let request = DatasetRequest::new("indexconstituent").expect("valid request");

        let err = adapter(client).dataset(request).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::RateLimited);
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn undecodable_body_maps_to_internal() {
        let client = StaticHttpClient::new().with_route("wset", HttpResponse::ok_json("<html>"));
        let request = DatasetRequest::new("indexconstituent").expect("valid request");

        let err = adapter(client).dataset(request).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::Internal);
    }

    #[tokio::test]
    async fn spent_throttle_delays_request_until_budget_returns() {
        let client = StaticHttpClient::new()
            .with_route("wset", HttpResponse::ok_json(r#"{"ErrorCode":0}"#));
        let adapter = adapter(client.clone())
            .with_throttle(Throttle::new(std::time::Duration::from_millis(40), 1));

        let request = DatasetRequest::new("indexconstituent").expect("valid request");
        for _ in 0..3 {
            adapter
                .dataset(request.clone())
                .await
                .expect("waits for budget instead of failing");
        }

        assert_eq!(client.requests().len(), 3);
    }
}
