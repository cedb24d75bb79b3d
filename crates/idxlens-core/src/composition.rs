//! Index constituents with weights, fundamentals and industry classification.
//!
//! Sector breakdowns sum constituent weights per Shenwan (2021) or CITIC
//! industry at level 1, 2 or 3.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data_source::{cell_number, cell_text, DatasetRequest, FieldTable, SnapshotRequest, TerminalSource};
use crate::radar::top_weight_sum;
use crate::{AnalysisError, InstrumentCode, IsoDate, ValidationError};

pub const CONSTITUENT_DATASET: &str = "indexconstituent";
/// Label for constituents without a classification.
pub const UNCLASSIFIED: &str = "unclassified";

const YUAN_PER_UNIT: f64 = 1e8;
const FUNDAMENTAL_FIELDS: [&str; 4] = ["ev", "mkt_freeshares", "netprofit_ttm2", "val_dividendyield3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndustryScheme {
    Sw,
    Citic,
}

impl IndustryScheme {
    pub const ALL: [Self; 2] = [Self::Sw, Self::Citic];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sw => "sw",
            Self::Citic => "citic",
        }
    }

    pub const fn field(self) -> &'static str {
        match self {
            Self::Sw => "industry_sw_2021",
            Self::Citic => "industry_citic",
        }
    }
}

impl Display for IndustryScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndustryScheme {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == wanted)
            .ok_or_else(|| ValidationError::InvalidIndustryScheme {
                value: value.to_owned(),
            })
    }
}

/// Classification depth, 1 (broadest) to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct IndustryLevel(u8);

impl IndustryLevel {
    pub const ALL: [Self; 3] = [Self(1), Self(2), Self(3)];

    pub fn new(level: u8) -> Result<Self, ValidationError> {
        (1..=3)
            .contains(&level)
            .then_some(Self(level))
            .ok_or(ValidationError::InvalidIndustryLevel { value: level })
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    const fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u8> for IndustryLevel {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IndustryLevel> for u8 {
    fn from(value: IndustryLevel) -> Self {
        value.0
    }
}

/// Industry names from level 1 down to level 3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustryPath(pub [Option<String>; 3]);

impl IndustryPath {
    pub fn at(&self, level: IndustryLevel) -> Option<&str> {
        self.0[level.index()].as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub code: InstrumentCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Index weight in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Enterprise value, 1e8 CNY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_value: Option<f64>,
    /// Free-float market value, 1e8 CNY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_float_value: Option<f64>,
    /// Net profit attributable to shareholders, trailing twelve months, 1e8 CNY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_profit_ttm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<f64>,
    pub sw: IndustryPath,
    pub citic: IndustryPath,
}

impl Constituent {
    fn listed(code: InstrumentCode) -> Self {
        Self {
            code,
            name: None,
            weight: None,
            industry: None,
            market_value: None,
            free_float_value: None,
            net_profit_ttm: None,
            dividend_yield: None,
            sw: IndustryPath::default(),
            citic: IndustryPath::default(),
        }
    }

    pub fn industry_at(&self, scheme: IndustryScheme, level: IndustryLevel) -> Option<&str> {
        match scheme {
            IndustryScheme::Sw => self.sw.at(level),
            IndustryScheme::Citic => self.citic.at(level),
        }
    }
}

/// Constituent codes, names, weights and the dataset's own industry label,
/// in dataset order. Rows without a parseable code are skipped.
pub async fn constituent_weights(
    source: &dyn TerminalSource,
    index: &InstrumentCode,
    date: IsoDate,
) -> Result<Vec<Constituent>, AnalysisError> {
    let request = DatasetRequest::new(CONSTITUENT_DATASET)?.with_option(format!(
        "date={};windcode={index}",
        date.format_compact()
    ));
    let dataset = source.dataset(request).await?.into_checked()?;

    Ok((0..dataset.len())
        .filter_map(|row| {
            let code = dataset
                .cell(row, "wind_code")
                .and_then(cell_text)
                .and_then(|raw| InstrumentCode::parse(raw).ok())?;
            let mut constituent = Constituent::listed(code);
            constituent.name = dataset.cell(row, "sec_name").and_then(cell_text).map(str::to_owned);
            constituent.weight = dataset.cell(row, "i_weight").and_then(cell_number);
            constituent.industry = dataset.cell(row, "industry").and_then(cell_text).map(str::to_owned);
            Some(constituent)
        })
        .collect())
}

async fn snapshot<const N: usize>(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    fields: [&str; N],
    options: String,
) -> Result<FieldTable, AnalysisError> {
    let request = SnapshotRequest::new(codes.to_vec(), fields)?.with_option(options);
    Ok(source.snapshot(request).await?.into_checked()?)
}

/// Constituents of `index` enriched with fundamentals and both industry
/// classifications at every level.
pub async fn constituents(
    source: &dyn TerminalSource,
    index: &InstrumentCode,
    date: IsoDate,
) -> Result<Vec<Constituent>, AnalysisError> {
    let mut constituents = constituent_weights(source, index, date).await?;
    if constituents.is_empty() {
        return Ok(constituents);
    }
    let codes: Vec<InstrumentCode> = constituents.iter().map(|c| c.code.clone()).collect();
    let trade_date = date.format_compact();

    let fundamentals = snapshot(
        source,
        &codes,
        FUNDAMENTAL_FIELDS,
        format!("unit=1;tradeDate={trade_date};rptDate={}1231", date.year() - 1),
    )
    .await?;
    for constituent in &mut constituents {
        let code = constituent.code.clone();
        let number = |field: &str| fundamentals.number(&code, field);
        constituent.market_value = number("ev").map(|v| v / YUAN_PER_UNIT);
        constituent.free_float_value = number("mkt_freeshares").map(|v| v / YUAN_PER_UNIT);
        constituent.net_profit_ttm = number("netprofit_ttm2").map(|v| v / YUAN_PER_UNIT);
        constituent.dividend_yield = number("val_dividendyield3");
    }

    for level in IndustryLevel::ALL {
        let table = snapshot(
            source,
            &codes,
            IndustryScheme::ALL.map(IndustryScheme::field),
            format!("tradeDate={trade_date};industryType={}", level.get()),
        )
        .await?;
        for constituent in &mut constituents {
            let code = constituent.code.clone();
            let text = |scheme: IndustryScheme| {
                table
                    .text(&code, scheme.field())
                    .map(|name| name.trim().to_owned())
            };
            constituent.sw.0[level.index()] = text(IndustryScheme::Sw);
            constituent.citic.0[level.index()] = text(IndustryScheme::Citic);
        }
    }

    tracing::debug!(index = %index, constituents = constituents.len(), "loaded index composition");
    Ok(constituents)
}

/// Summed weight of the constituents in one industry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorWeight {
    pub sector: String,
    /// Percent of the index.
    pub weight: f64,
    pub constituents: usize,
}

/// Weight per industry, heaviest first; ties keep name order. Constituents
/// without a classification are grouped as [`UNCLASSIFIED`], and a missing
/// weight counts as zero.
pub fn sector_weights(
    constituents: &[Constituent],
    scheme: IndustryScheme,
    level: IndustryLevel,
) -> Vec<SectorWeight> {
    let mut sectors: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for constituent in constituents {
        let sector = constituent.industry_at(scheme, level).unwrap_or(UNCLASSIFIED);
        let entry = sectors.entry(sector).or_default();
        entry.0 += constituent.weight.unwrap_or(0.0);
        entry.1 += 1;
    }

    let mut weights: Vec<SectorWeight> = sectors
        .into_iter()
        .map(|(sector, (weight, constituents))| SectorWeight {
            sector: sector.to_owned(),
            weight,
            constituents,
        })
        .collect();
    weights.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    weights
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexComposition {
    pub index: InstrumentCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top20_concentration: Option<f64>,
    pub sectors: Vec<SectorWeight>,
    pub constituents: Vec<Constituent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionReport {
    pub scheme: IndustryScheme,
    pub level: IndustryLevel,
    pub indices: Vec<IndexComposition>,
    pub warnings: Vec<String>,
}

/// Composition of every index as of `date`, with sector weights under
/// `scheme` at `level`. Fails only when no index has any constituent.
pub async fn composition(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    date: IsoDate,
    scheme: IndustryScheme,
    level: IndustryLevel,
) -> Result<CompositionReport, AnalysisError> {
    let mut indices = Vec::with_capacity(codes.len());
    let mut warnings = Vec::new();
    for index in codes {
        let constituents = constituents(source, index, date).await?;
        if constituents.is_empty() {
            tracing::warn!(index = %index, "index has no constituents");
            warnings.push(format!("{index}: no constituents"));
        }
        let weights: Vec<f64> = constituents.iter().filter_map(|c| c.weight).collect();
        indices.push(IndexComposition {
            index: index.clone(),
            top20_concentration: top_weight_sum(&weights),
            sectors: sector_weights(&constituents, scheme, level),
            constituents,
        });
    }

    if indices.iter().all(|index| index.constituents.is_empty()) {
        return Err(AnalysisError::data_unavailable("no index has constituent data"));
    }
    Ok(CompositionReport {
        scheme,
        level,
        indices,
        warnings,
    })
}
