mod composition;
mod correlation;
mod earnings;
mod funds;
mod profile;
mod radar;
mod returns;
mod risk;
mod validate;
mod valuation;
mod verify;

use std::sync::Arc;
use std::time::Instant;

use idxlens_core::cache::CacheMode;
use idxlens_core::{
    AppConfig, AppState, DateRange, Envelope, EnvelopeMeta, FixtureSource, FormSubmission,
    InstrumentCode, IsoDate, SessionState, SourceId,
};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let started = Instant::now();

    // Offline validation never touches the terminal.
    if let Command::Validate(args) = &cli.command {
        let source = if cli.fixture.is_some() {
            SourceId::Fixture
        } else {
            SourceId::Gateway
        };
        return Ok(envelope(validate::run(args)?, source, started, 0));
    }

    let app = app_state(cli)?;
    let range = date_range(cli)?;
    tracing::debug!(
        command = cli.command.name(),
        source = %app.source_id(),
        start = %range.start(),
        end = %range.end(),
        "dispatching command"
    );
    let result = dispatch(&cli.command, &app, range).await?;
    tracing::info!(
        command = cli.command.name(),
        warnings = result.warnings.len(),
        cache_hits = app.cache_hits(),
        "command finished"
    );

    Ok(envelope(result, app.source_id(), started, app.cache_hits()))
}

async fn dispatch(
    command: &Command,
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    match command {
        Command::Validate(args) => validate::run(args),
        Command::Verify(args) => verify::run(args, app, range).await,
        Command::Profile(args) => {
            let codes = submit(&args.text(), app, range).await?;
            profile::run(&codes, app).await
        }
        Command::Returns(args) => {
            let codes = submit(&args.text(), app, range).await?;
            returns::run(&codes, app, range).await
        }
        Command::Risk(args) => {
            let codes = submit(&args.text(), app, range).await?;
            risk::run(&codes, app, range).await
        }
        Command::Valuation(args) => {
            let codes = submit(&args.text(), app, range).await?;
            valuation::run(&codes, app, range).await
        }
        Command::Earnings(args) => {
            let codes = submit(&args.text(), app, range).await?;
            earnings::run(&codes, app, range).await
        }
        Command::Composition(args) => {
            let codes = submit(&args.codes.text(), app, range).await?;
            composition::run(&codes, args, app, range).await
        }
        Command::Radar(args) => {
            let codes = submit(&args.codes.text(), app, range).await?;
            let benchmark = args
                .benchmark
                .as_deref()
                .map(InstrumentCode::parse)
                .transpose()?;
            radar::run(&codes, benchmark.as_ref(), app, range).await
        }
        Command::Correlation(args) => {
            let codes = submit(&args.text(), app, range).await?;
            correlation::run(&codes, app, range).await
        }
        Command::Funds(args) => {
            let indices = if args.index.is_empty() {
                Vec::new()
            } else {
                submit(&args.index.join(" "), app, range).await?
            };
            funds::run(args, &indices, app, range).await
        }
    }
}

fn envelope(
    result: CommandResult,
    source: SourceId,
    started: Instant,
    cache_hits: usize,
) -> Envelope<Value> {
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let meta = EnvelopeMeta::generate(source, latency_ms, cache_hits).with_warnings(result.warnings);
    Envelope::success(meta, result.data)
}

/// Config from the environment with CLI flags applied on top.
fn app_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let mut config = AppConfig::load()?;
    if let Some(gateway) = &cli.gateway {
        config.gateway_url = Some(gateway.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

fn app_state(cli: &Cli) -> Result<AppState, CliError> {
    let config = app_config(cli)?;
    let app = match &cli.fixture {
        Some(path) => AppState::new(config, Arc::new(FixtureSource::from_path(path)?)),
        None => AppState::from_config(config)?,
    };
    Ok(if cli.no_cache {
        app.with_cache_mode(CacheMode::Bypass)
    } else {
        app
    })
}

fn date_range(cli: &Cli) -> Result<DateRange, CliError> {
    let end = match &cli.end {
        Some(raw) => IsoDate::parse(raw)?,
        None => IsoDate::today(),
    };
    Ok(match &cli.start {
        Some(raw) => DateRange::new(IsoDate::parse(raw)?, end)?,
        None => DateRange::five_years_to(end),
    })
}

/// Runs the text through a form submission; analysis only proceeds on
/// verified codes.
async fn submit(
    text: &str,
    app: &AppState,
    range: DateRange,
) -> Result<Vec<InstrumentCode>, CliError> {
    let mut session = SessionState::new();
    session.submit(FormSubmission::text(text, range), app).await?;
    Ok(session.codes)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use serde_json::json;

    use super::*;

    fn fixture_file() -> tempfile::NamedTempFile {
        let shares = json!({
            "2024-01-02": 100.0, "2024-01-03": 101.0, "2024-01-04": 100.5, "2024-01-05": 102.0
        });
        let fund = |name: &str, tracking_error: f64, excess: f64| {
            json!({
                "fund_info_name": name,
                "risk_trackerror_trackindex": tracking_error,
                "risk_navoverbenchannualreturn": excess,
                "netasset_total_cc": 5e9
            })
        };
        let fixture = json!({
            "snapshot": {
                "000300.SH": { "sec_type": "股票指数", "windtype": "A股指数" },
                "000905.SH": { "sec_type": "股票指数", "windtype": "A股指数" },
                "H11001.CSI": { "sec_type": "债券指数", "windtype": "债券" },
                "510300.SH": fund("华泰柏瑞沪深300ETF", 0.8, 0.4),
                "000051.OF": fund("华夏沪深300ETF联接A", 1.1, 0.2),
                "510500.SH": fund("南方中证500ETF", 1.5, 1.0)
            },
            "series": {
                "510300.SH": { "unit_fundshare_total": shares },
                "000051.OF": { "unit_fundshare_total": shares },
                "510500.SH": { "unit_fundshare_total": shares }
            },
            "datasets": [
                { "name": "indexrelevancefund", "windcode": "000300.SH",
                  "columns": ["fundcode", "fundname"],
                  "rows": [["510300.SH", "华泰柏瑞沪深300ETF"], ["000051.OF", "华夏沪深300ETF联接A"]] },
                { "name": "indexrelevancefund", "windcode": "000905.SH",
                  "columns": ["fundcode", "fundname"],
                  "rows": [["510500.SH", "南方中证500ETF"], ["000051.OF", "华夏沪深300ETF联接A"]] }
            ]
        });

        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        file.write_all(fixture.to_string().as_bytes())
            .expect("write fixture");
        file
    }

    fn cli(fixture: &tempfile::NamedTempFile, args: &[&str]) -> Cli {
        let path = fixture.path().to_string_lossy().into_owned();
        let mut argv = vec![
            "idxlens",
            "--fixture",
            path.as_str(),
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("valid arguments")
    }

    #[tokio::test]
    async fn verify_runs_against_a_fixture_file() {
        let fixture = fixture_file();

        let envelope = run(&cli(&fixture, &["verify", "000300"]))
            .await
            .expect("verification succeeds");

        assert_eq!(envelope.meta.source, SourceId::Fixture);
        assert_eq!(envelope.data["codes"], json!(["000300.SH"]));
    }

    #[tokio::test]
    async fn funds_lists_tracking_funds_for_every_verified_index() {
        let fixture = fixture_file();

        let envelope = run(&cli(&fixture, &["funds", "--index", "000300", "000905"]))
            .await
            .expect("fund analysis succeeds");

        let listings = envelope.data["tracking_funds"].as_array().expect("listings");
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0]["index"], json!("000300.SH"));
        assert_eq!(listings[1]["funds"].as_array().map(Vec::len), Some(2));
        // 000051.OF tracks both indices and is analysed once.
        let rows = envelope.data["metrics"]["rows"].as_array().expect("metric rows");
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn funds_rejects_an_index_that_is_not_an_equity_index() {
        let fixture = fixture_file();

        let error = run(&cli(&fixture, &["funds", "--index", "H11001.CSI"]))
            .await
            .expect_err("bond index is rejected");

        assert_eq!(error.exit_code(), 3);
    }
}
