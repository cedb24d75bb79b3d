use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::data_source::{
    Dataset, DatasetRequest, FieldTable, SeriesRequest, SeriesTable, SnapshotRequest, SourceError,
    SourceFuture, TerminalSource,
};
use crate::{CoreError, InstrumentCode, IsoDate, SourceId};

/// Deterministic in-memory terminal.
///
/// Snapshot values are keyed by code and field. A value stored under
/// `field|option` (for example `beta|index=000300.SH`) is only served when the
/// request carries that exact option, which lets a fixture answer the same
/// field differently per report date or benchmark.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    snapshot: BTreeMap<(String, String), Value>,
    series: BTreeMap<(String, String), BTreeMap<IsoDate, f64>>,
    datasets: BTreeMap<(String, String), FixtureDataset>,
    status: i64,
    unreachable: bool,
    calls: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FixtureDataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(code: &str, field: &str) -> (String, String) {
        (code.trim().to_ascii_uppercase(), field.trim().to_ascii_lowercase())
    }

    pub fn with_value(mut self, code: &str, field: &str, value: impl Into<Value>) -> Self {
        self.snapshot.insert(Self::key(code, field), value.into());
        self
    }

    /// Value served only when the request carries `option`.
    pub fn with_value_for(
        mut self,
        code: &str,
        field: &str,
        option: &str,
        value: impl Into<Value>,
    ) -> Self {
        let qualified = format!("{}|{}", field.trim(), option.trim());
        self.snapshot.insert(Self::key(code, &qualified), value.into());
        self
    }

    pub fn with_series<I>(mut self, code: &str, field: &str, points: I) -> Self
    where
        I: IntoIterator<Item = (IsoDate, f64)>,
    {
        self.series
            .entry(Self::key(code, field))
            .or_default()
            .extend(points);
        self
    }

    /// Registers a dataset answered for requests whose `windcode=` option
    /// equals `windcode` (pass `""` for datasets without one).
    pub fn with_dataset(
        mut self,
        name: &str,
        windcode: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.datasets.insert(
            Self::key(windcode, name),
            FixtureDataset {
                columns: columns.iter().map(|column| (*column).to_owned()).collect(),
                rows,
            },
        );
        self
    }

    /// Every query answers with this batch status instead of data.
    pub fn with_status(mut self, status: i64) -> Self {
        self.status = status;
        self
    }

    /// Every query fails as if the terminal could not be reached.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Number of queries served so far, across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn from_json_str(input: &str) -> Result<Self, CoreError> {
        let file: FixtureFile = serde_json::from_str(input)?;
        file.into_source()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    fn begin_call(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(SourceError::unavailable("fixture terminal is unreachable"));
        }
        Ok(())
    }

    fn snapshot_cell(&self, code: &InstrumentCode, field: &str, options: &[String]) -> Value {
        options
            .iter()
            .find_map(|option| {
                self.snapshot
                    .get(&Self::key(code.as_str(), &format!("{field}|{option}")))
            })
            .or_else(|| self.snapshot.get(&Self::key(code.as_str(), field)))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

fn windcode_option(options: &[String]) -> String {
    options
        .iter()
        .flat_map(|option| option.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("windcode")
                .then(|| value.trim().to_owned())
        })
        .unwrap_or_default()
}

impl TerminalSource for FixtureSource {
    fn id(&self) -> SourceId {
        SourceId::Fixture
    }

    fn snapshot<'a>(&'a self, req: SnapshotRequest) -> SourceFuture<'a, FieldTable> {
        Box::pin(async move {
            self.begin_call()?;
            if self.status != 0 {
                return Ok(FieldTable::failed(self.status));
            }

            let cells = req
                .codes
                .iter()
                .map(|code| {
                    req.fields
                        .iter()
                        .map(|field| self.snapshot_cell(code, field, &req.options))
                        .collect()
                })
                .collect();

            Ok(FieldTable {
                status: 0,
                codes: req.codes.iter().map(|code| code.as_str().to_owned()).collect(),
                fields: req.fields,
                cells,
            })
        })
    }

    fn series<'a>(&'a self, req: SeriesRequest) -> SourceFuture<'a, SeriesTable> {
        Box::pin(async move {
            self.begin_call()?;
            if self.status != 0 {
                return Ok(SeriesTable::failed(req.field, self.status));
            }

            let start = req.range.start();
            let end = req.range.end();
            let columns: Vec<Option<&BTreeMap<IsoDate, f64>>> = req
                .codes
                .iter()
                .map(|code| self.series.get(&Self::key(code.as_str(), &req.field)))
                .collect();

            let dates: Vec<IsoDate> = columns
                .iter()
                .flatten()
                .flat_map(|points| points.range(start..=end).map(|(date, _)| *date))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let values = columns
                .into_iter()
                .map(|points| {
                    dates
                        .iter()
                        .map(|date| points.and_then(|points| points.get(date).copied()))
                        .collect()
                })
                .collect();

            Ok(SeriesTable {
                status: 0,
                field: req.field,
                dates,
                codes: req.codes.iter().map(|code| code.as_str().to_owned()).collect(),
                values,
            })
        })
    }

    fn dataset<'a>(&'a self, req: DatasetRequest) -> SourceFuture<'a, Dataset> {
        Box::pin(async move {
            self.begin_call()?;
            if self.status != 0 {
                return Ok(Dataset::failed(self.status));
            }

            let windcode = windcode_option(&req.options);
            let dataset = self
                .datasets
                .get(&Self::key(&windcode, &req.name))
                .cloned()
                .unwrap_or_default();

            Ok(Dataset {
                status: 0,
                columns: dataset.columns,
                rows: dataset.rows,
            })
        })
    }
}

/// On-disk fixture layout loaded by `--fixture`.
///
/// ```json
/// {
///   "status": 0,
///   "snapshot": { "000300.SH": { "sec_type": "股票指数", "beta|index=000300.SH": 1.0 } },
///   "series": { "000300.SH": { "close": { "2024-01-02": 3386.35 } } },
///   "datasets": [
///     { "name": "indexconstituent", "windcode": "000300.SH",
///       "columns": ["wind_code", "i_weight"], "rows": [["600519.SH", 5.1]] }
///   ]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixtureFile {
    status: i64,
    unreachable: bool,
    snapshot: BTreeMap<String, BTreeMap<String, Value>>,
    series: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
    datasets: Vec<FixtureDatasetEntry>,
}

#[derive(Debug, Deserialize)]
struct FixtureDatasetEntry {
    name: String,
    #[serde(default)]
    windcode: String,
    #[serde(flatten)]
    dataset: FixtureDataset,
}

impl FixtureFile {
    fn into_source(self) -> Result<FixtureSource, CoreError> {
        let mut source = FixtureSource::new().with_status(self.status);
        source.unreachable = self.unreachable;

        for (code, fields) in self.snapshot {
            for (field, value) in fields {
                source.snapshot.insert(FixtureSource::key(&code, &field), value);
            }
        }

        for (code, fields) in self.series {
            for (field, points) in fields {
                let parsed = points
                    .into_iter()
                    .map(|(date, value)| Ok((IsoDate::parse(&date)?, value)))
                    .collect::<Result<Vec<_>, CoreError>>()?;
                source = source.with_series(&code, &field, parsed);
            }
        }

        for entry in self.datasets {
            source
                .datasets
                .insert(FixtureSource::key(&entry.windcode, &entry.name), entry.dataset);
        }

        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::DateRange;
    use serde_json::json;

    fn code(raw: &str) -> InstrumentCode {
        InstrumentCode::parse(raw).expect("valid code")
    }

    fn date(raw: &str) -> IsoDate {
        IsoDate::parse(raw).expect("valid date")
    }

    #[tokio::test]
    async fn qualified_values_win_when_option_matches() {
        let source = FixtureSource::new()
            .with_value("000905.SH", "beta", 0.9)
            .with_value_for("000905.SH", "beta", "index=000300.SH", 1.1);

        let plain = SnapshotRequest::new(vec![code("000905.SH")], ["beta"]).expect("valid");
        let qualified = plain.clone().with_option("index=000300.SH");

        let plain = source.snapshot(plain).await.expect("ok");
        let qualified = source.snapshot(qualified).await.expect("ok");

        assert_eq!(plain.number(&code("000905.SH"), "beta"), Some(0.9));
        assert_eq!(qualified.number(&code("000905.SH"), "beta"), Some(1.1));
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn series_is_clipped_to_the_requested_range() {
        let source = FixtureSource::new().with_series(
            "000300.SH",
            "close",
            [
                (date("2023-12-29"), 3431.0),
                (date("2024-01-02"), 3386.0),
                (date("2024-01-03"), 3370.0),
            ],
        );
        let range = DateRange::parse("2024-01-01", "2024-01-31").expect("valid");
        let request = SeriesRequest::new(vec![code("000300.SH"), code("000905.SH")], "close", range)
            .expect("valid");

        let table = source.series(request).await.expect("ok");

        assert_eq!(table.dates, vec![date("2024-01-02"), date("2024-01-03")]);
        assert_eq!(table.column(&code("000905.SH")), Some(&[None, None][..]));
    }

    #[tokio::test]
    async fn unreachable_fixture_fails_every_call() {
        let source = FixtureSource::new().unreachable();
        let request = DatasetRequest::new("indexconstituent").expect("valid");

        let err = source.dataset(request).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn json_fixture_loads_every_section() {
        let source = FixtureSource::from_json_str(
            &json!({
                "snapshot": { "000300.sh": { "SEC_TYPE": "股票指数" } },
                "series": { "000300.SH": { "close": { "2024-01-02": 3386.35 } } },
                "datasets": [{
                    "name": "indexconstituent",
                    "windcode": "000300.SH",
                    "columns": ["wind_code", "i_weight"],
                    "rows": [["600519.SH", 5.1]]
                }]
            })
            .to_string(),
        )
        .expect("fixture parses");

        let snapshot = source
            .snapshot(SnapshotRequest::new(vec![code("000300.SH")], ["sec_type"]).expect("valid"))
            .await
            .expect("ok");
        assert_eq!(snapshot.text(&code("000300.SH"), "sec_type"), Some("股票指数"));

        let dataset = source
            .dataset(
                DatasetRequest::new("indexconstituent")
                    .expect("valid")
                    .with_option("date=20240131;windcode=000300.SH"),
            )
            .await
            .expect("ok");
        assert_eq!(dataset.len(), 1);
    }
}
