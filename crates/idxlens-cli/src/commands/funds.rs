use std::collections::BTreeSet;

use idxlens_core::funds::TrackingFund;
use idxlens_core::{
    fund_metrics, read_code_file, scatter_analysis, tracking_funds, AnalysisError, AppState,
    DateRange, FundVariable, InstrumentCode, MetricTable, ScatterAnalysis,
};
use serde::Serialize;

use crate::cli::FundsArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct IndexFunds {
    index: InstrumentCode,
    funds: Vec<TrackingFund>,
}

#[derive(Debug, Serialize)]
struct FundsResponseData {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tracking_funds: Vec<IndexFunds>,
    metrics: MetricTable,
    scatter: ScatterAnalysis,
}

/// Analyses the funds tracking `indices` (already verified), or the funds
/// listed in `--file` when no index was given.
pub async fn run(
    args: &FundsArgs,
    indices: &[InstrumentCode],
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let x: FundVariable = args.x.parse()?;
    let y: FundVariable = args.y.parse()?;
    let threshold = args.threshold.unwrap_or(app.config().outlier_threshold);

    let mut listings = Vec::with_capacity(indices.len());
    let mut codes = Vec::new();
    match &args.file {
        Some(path) if indices.is_empty() => codes = read_code_file(path)?.codes,
        _ => {
            let mut seen = BTreeSet::new();
            for index in indices {
                let funds = tracking_funds(app.source(), index, range.end()).await?;
                codes.extend(
                    funds
                        .iter()
                        .filter(|fund| seen.insert(fund.code.clone()))
                        .map(|fund| fund.code.clone()),
                );
                listings.push(IndexFunds {
                    index: index.clone(),
                    funds,
                });
            }
        }
    }
    if codes.is_empty() {
        return Err(AnalysisError::data_unavailable("no fund codes to analyse").into());
    }

    let metrics = fund_metrics(app.source(), &codes, range).await?;
    let scatter = scatter_analysis(&metrics.table, x, y, threshold)?;

    let mut warnings = metrics.warnings.clone();
    warnings.extend(scatter.warnings.iter().cloned());
    let data = FundsResponseData {
        tracking_funds: listings,
        metrics: metrics.table,
        scatter,
    };

    Ok(CommandResult::ok(serde_json::to_value(data)?).with_warnings(warnings))
}
