//! CLI argument definitions for idxlens.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `validate` | Offline code validation |
//! | `verify` | Validation plus terminal verification (form submission) |
//! | `profile` | Name, base and launch dates, publisher, exchange |
//! | `returns` | Yearly returns, valuation percentiles, cumulative curves |
//! | `risk` | Risk/return statistics and the pairwise beta matrix |
//! | `valuation` | P/E and P/B percentiles and daily history |
//! | `earnings` | Reported revenue and net profit plus consensus forecasts |
//! | `composition` | Constituents and sector weights (Shenwan or CITIC) |
//! | `radar` | Radar scores on a common 0-100 scale |
//! | `correlation` | Correlation matrix with the asset-class basket |
//! | `funds` | Tracking-fund metrics and scatter regression |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--start` / `--end` | five years to today | Analysis window |
//! | `--fixture` | none | Offline fixture source |
//! | `--gateway` | `IDXLENS_GATEWAY_URL` | Terminal gateway URL |
//! | `--timeout-ms` | config | Gateway request timeout |
//! | `--no-cache` | `false` | Bypass the response cache |
//!
//! # Examples
//!
//! ```bash
//! idxlens validate "000300, H30184;CN1098"
//! idxlens radar 000300 000905 --benchmark 000300.SH --pretty
//! idxlens composition 000300 000905 --scheme citic --level 2
//! idxlens funds --index 000300 000905 --x tracking-error --y excess-return
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Equity index comparison against a market-data terminal.
#[derive(Debug, Parser)]
#[command(name = "idxlens", author, version, about = "Equity index comparison CLI")]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Analysis start date (YYYY-MM-DD). Defaults to five years before `--end`.
    #[arg(long, global = true)]
    pub start: Option<String>,

    /// Analysis end date (YYYY-MM-DD). Defaults to today.
    #[arg(long, global = true)]
    pub end: Option<String>,

    /// Serve terminal data from a JSON fixture instead of the gateway.
    #[arg(long, global = true, conflicts_with = "gateway")]
    pub fixture: Option<PathBuf>,

    /// Terminal gateway base URL.
    #[arg(long, global = true)]
    pub gateway: Option<String>,

    /// Gateway request timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Skip the response cache for this run.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Header lines followed by indented data.
    Table,
    /// Single JSON object output.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate index codes offline.
    ///
    ///   idxlens validate "000300 h30184 CN1098"
    Validate(CodesArgs),

    /// Validate and verify codes against the terminal.
    ///
    ///   idxlens verify 000300 000905
    ///   idxlens verify --file codes.csv
    Verify(VerifyArgs),

    /// Descriptive profile of each index.
    Profile(CodesArgs),

    /// Yearly returns, valuation percentiles and cumulative return curves.
    Returns(CodesArgs),

    /// Risk/return statistics over the window and pairwise betas.
    Risk(CodesArgs),

    /// Valuation percentiles and daily P/E (TTM) and P/B (LF) history.
    Valuation(CodesArgs),

    /// Five reported years of revenue and net profit, then three forecast years.
    Earnings(CodesArgs),

    /// Constituents, fundamentals and sector weights.
    ///
    ///   idxlens composition 000300 --scheme sw --level 1
    Composition(CompositionArgs),

    /// Radar scores for two or more indices.
    Radar(RadarArgs),

    /// Correlation of index closes with the asset-class basket.
    Correlation(CodesArgs),

    /// Tracking-fund metrics and scatter regression.
    ///
    ///   idxlens funds --index 000300 000905
    ///   idxlens funds --file funds.xlsx --x scale --y excess-return
    Funds(FundsArgs),
}

impl Command {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Validate(_) => "validate",
            Self::Verify(_) => "verify",
            Self::Profile(_) => "profile",
            Self::Returns(_) => "returns",
            Self::Risk(_) => "risk",
            Self::Valuation(_) => "valuation",
            Self::Earnings(_) => "earnings",
            Self::Composition(_) => "composition",
            Self::Radar(_) => "radar",
            Self::Correlation(_) => "correlation",
            Self::Funds(_) => "funds",
        }
    }
}

#[derive(Debug, Args)]
pub struct CodesArgs {
    /// Index codes, separated by spaces, commas, semicolons or newlines.
    #[arg(required = true, num_args = 1..)]
    pub input: Vec<String>,
}

impl CodesArgs {
    pub fn text(&self) -> String {
        self.input.join(" ")
    }
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Index codes, separated by spaces, commas, semicolons or newlines.
    #[arg(num_args = 0.., required_unless_present = "file")]
    pub input: Vec<String>,

    /// Code file (.csv, .tsv, .txt or a spreadsheet) with a code column.
    #[arg(long, conflicts_with = "input")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RadarArgs {
    #[command(flatten)]
    pub codes: CodesArgs,

    /// Benchmark for the beta metric. Defaults to the first code.
    #[arg(long)]
    pub benchmark: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompositionArgs {
    #[command(flatten)]
    pub codes: CodesArgs,

    /// Industry classification for sector weights (sw, citic).
    #[arg(long, default_value = "sw")]
    pub scheme: String,

    /// Classification level, 1 to 3.
    #[arg(long, default_value_t = 1)]
    pub level: u8,
}

#[derive(Debug, Args)]
#[command(group = clap::ArgGroup::new("funds_input").required(true).args(["index", "file"]))]
pub struct FundsArgs {
    /// Analyse the funds tracking these indices (validated and verified first).
    #[arg(long, num_args = 1..)]
    pub index: Vec<String>,

    /// Analyse the fund codes listed in this file (.csv, .tsv, .txt or a spreadsheet).
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Scatter x variable.
    #[arg(long, default_value = "tracking_error")]
    pub x: String,

    /// Scatter y variable.
    #[arg(long, default_value = "excess_return")]
    pub y: String,

    /// MAD outlier threshold. Defaults to the configured value.
    #[arg(long)]
    pub threshold: Option<f64>,
}
