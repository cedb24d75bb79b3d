//! Reading fund code lists from uploaded CSV, TSV or spreadsheet files.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Reader};
use serde::{Deserialize, Serialize};

use crate::{InstrumentCode, UploadError};

/// Header names accepted for the code column, compared case-insensitively.
pub const CODE_COLUMNS: [&str; 3] = ["证券代码", "security_code", "code"];

/// Extensions opened as workbooks; only the first sheet is read.
pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Codes read from an uploaded file, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub codes: Vec<InstrumentCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadFormat {
    Delimited(u8),
    Spreadsheet,
}

fn format_for(path: &Path) -> Result<UploadFormat, UploadError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(UploadFormat::Delimited(b',')),
        "tsv" | "txt" => Ok(UploadFormat::Delimited(b'\t')),
        ext if SPREADSHEET_EXTENSIONS.contains(&ext) => Ok(UploadFormat::Spreadsheet),
        _ => Err(UploadError::UnsupportedFormat { extension }),
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').to_lowercase()
}

fn code_column<'a, I>(headers: I) -> Result<usize, UploadError>
where
    I: IntoIterator<Item = &'a str>,
{
    headers
        .into_iter()
        .map(normalize_header)
        .position(|header| CODE_COLUMNS.iter().any(|name| header == *name))
        .ok_or_else(|| UploadError::MissingColumn {
            expected: CODE_COLUMNS.join(" / "),
        })
}

fn push_code(codes: &mut Vec<InstrumentCode>, cell: &str, line: u64) -> Result<(), UploadError> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(());
    }
    let code = InstrumentCode::parse(cell).map_err(|e| UploadError::MalformedRecord {
        line,
        message: e.to_string(),
    })?;
    codes.push(code);
    Ok(())
}

/// Parses delimited text with a header row and returns the code column.
pub fn parse_codes(text: &str, delimiter: u8) -> Result<Vec<InstrumentCode>, UploadError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|e| UploadError::MalformedRecord {
        line: 1,
        message: e.to_string(),
    })?;
    let code_index = code_column(headers.iter())?;

    let mut codes = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| UploadError::MalformedRecord {
            line: e.position().map(|p| p.line()).unwrap_or_default(),
            message: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        push_code(&mut codes, record.get(code_index).unwrap_or_default(), line)?;
    }

    tracing::debug!(codes = codes.len(), "parsed uploaded code list");
    Ok(codes)
}

/// Reads the code column from the first sheet of a workbook.
///
/// The first non-blank row is the header; `line` in errors is the sheet row
/// number.
pub fn read_spreadsheet_codes(path: &Path) -> Result<Vec<InstrumentCode>, UploadError> {
    let spreadsheet = |message: String| UploadError::Spreadsheet { message };
    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| spreadsheet(String::from("workbook has no sheets")))?
        .map_err(|e| spreadsheet(e.to_string()))?;

    let first_row = range.start().map_or(0, |(row, _)| u64::from(row));
    let mut rows = range
        .rows()
        .enumerate()
        .map(|(offset, cells)| {
            let line = first_row + offset as u64 + 1;
            (line, cells.iter().map(ToString::to_string).collect::<Vec<_>>())
        })
        .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()));

    let Some((_, headers)) = rows.next() else {
        return Err(UploadError::MissingColumn {
            expected: CODE_COLUMNS.join(" / "),
        });
    };
    let code_index = code_column(headers.iter().map(String::as_str))?;

    let mut codes = Vec::new();
    for (line, cells) in rows {
        push_code(
            &mut codes,
            cells.get(code_index).map_or("", String::as_str),
            line,
        )?;
    }

    tracing::debug!(codes = codes.len(), "parsed uploaded workbook");
    Ok(codes)
}

/// Reads `path`; the extension selects the reader.
pub fn read_code_file(path: impl AsRef<Path>) -> Result<UploadedFile, UploadError> {
    let path = path.as_ref();
    let codes = match format_for(path)? {
        UploadFormat::Delimited(delimiter) => {
            let text = std::fs::read_to_string(path)?;
            parse_codes(&text, delimiter)?
        }
        UploadFormat::Spreadsheet => read_spreadsheet_codes(path)?,
    };
    Ok(UploadedFile {
        path: path.to_path_buf(),
        codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_prefixed_header_is_accepted() {
        let codes = parse_codes("\u{feff}证券代码,证券简称\n510300.OF,沪深300ETF\n", b',')
            .expect("parses");
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].as_str(), "510300.OF");
    }

    #[test]
    fn header_match_is_case_insensitive_and_blank_cells_are_skipped() {
        let codes =
            parse_codes("name\tCode\nA\t110020.of\nB\t\nC\t000051.OF\n", b'\t').expect("parses");
        let codes: Vec<&str> = codes.iter().map(InstrumentCode::as_str).collect();
        assert_eq!(codes, vec!["110020.OF", "000051.OF"]);
    }

    #[test]
    fn missing_code_column_fails() {
        let err = parse_codes("name,weight\nA,1\n", b',').expect_err("must fail");
        assert!(matches!(err, UploadError::MissingColumn { .. }));
    }

    #[test]
    fn spreadsheet_extensions_select_the_workbook_reader() {
        for name in ["funds.xlsx", "funds.XLS", "funds.ods"] {
            assert_eq!(format_for(Path::new(name)).ok(), Some(UploadFormat::Spreadsheet));
        }
        let err = format_for(Path::new("funds.docx")).expect_err("must fail");
        assert!(matches!(
            err,
            UploadError::UnsupportedFormat { ref extension } if extension == "docx"
        ));
    }

    #[test]
    fn first_sheet_of_a_workbook_is_read() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../tests/fixtures/tracking_funds.xlsx");

        let file = read_code_file(&path).expect("workbook parses");

        let codes: Vec<&str> = file.codes.iter().map(InstrumentCode::as_str).collect();
        assert_eq!(codes, vec!["510300.OF", "000051.OF", "159919.SZ"]);
    }

    #[test]
    fn unreadable_code_reports_its_line() {
        let err = parse_codes("code\n510300.OF\nnot a code\n", b',').expect_err("must fail");
        assert!(matches!(err, UploadError::MalformedRecord { line: 3, .. }));
    }
}
