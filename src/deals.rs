// src/deals.rs

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::LoaderError;

// M/D/Y spreadsheet dates, two- or four-digit years
static SLASH_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2})/(\d{1,2})/(\d{2,4})\s*$").expect("Failed to compile SLASH_DATE_RE"));

/// One row of the deal list. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct DealRecord {
    /// 1-based data row number, for diagnostics.
    pub row: usize,
    pub acquirer: Option<String>,
    pub target: Option<String>,
    pub acquirer_ticker: Option<String>,
    pub target_ticker: Option<String>,
    pub acquirer_cik: Option<String>,
    pub target_cik: Option<String>,
    pub announce_date: NaiveDate,
}

/// Loads the deal list from a CSV export of the deals spreadsheet.
/// Missing required columns are fatal; rows with unparseable announce
/// dates are skipped with a warning.
pub fn load_deals(path: &Path) -> Result<Vec<DealRecord>, LoaderError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader.headers()?.clone();

    let col = |names: &[&str]| -> Option<usize> {
        headers
            .iter()
            .position(|h| names.iter().any(|n| header_key(h) == header_key(n)))
    };

    let c_announce = col(&["Announce Date", "Announcement Date"]);
    let c_acq_tkr = col(&["Acquirer Ticker"]);
    let c_tar_tkr = col(&["Target Ticker"]);
    let c_acq_cik = col(&["Acquirer CIK"]);
    let c_tar_cik = col(&["Target CIK"]);
    let c_acq_name = col(&["Acquirer Name"]);
    let c_tar_name = col(&["Target Name"]);

    let Some(c_announce) = c_announce else {
        return Err(LoaderError::InputFormat(
            "deal list must contain an Announce Date column".to_string(),
        ));
    };
    if [c_acq_tkr, c_tar_tkr, c_acq_cik, c_tar_cik]
        .iter()
        .all(Option::is_none)
    {
        return Err(LoaderError::InputFormat(
            "deal list must contain a ticker or CIK column (Acquirer or Target)".to_string(),
        ));
    }

    let mut deals = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row = idx + 1;
        let Some(announce_date) = cell(&record, Some(c_announce))
            .as_deref()
            .and_then(parse_announce_date)
        else {
            tracing::warn!("Row {}: unparseable Announce Date, skipping", row);
            continue;
        };
        deals.push(DealRecord {
            row,
            acquirer: cell(&record, c_acq_name),
            target: cell(&record, c_tar_name),
            acquirer_ticker: cell(&record, c_acq_tkr).as_deref().and_then(normalize_ticker),
            target_ticker: cell(&record, c_tar_tkr).as_deref().and_then(normalize_ticker),
            acquirer_cik: cell(&record, c_acq_cik).as_deref().and_then(normalize_cik),
            target_cik: cell(&record, c_tar_cik).as_deref().and_then(normalize_cik),
            announce_date,
        });
    }
    Ok(deals)
}

fn header_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts `YYYY-MM-DD` and `M/D/YYYY` / `M/D/YY` shapes. Two-digit years
/// pivot at 70: 69 -> 2069, 70 -> 1970.
pub fn parse_announce_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        return Some(date);
    }
    let caps = SLASH_DATE_RE.captures(s)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let mut year: i32 = caps[3].parse().ok()?;
    if year < 100 {
        year += if year < 70 { 2000 } else { 1900 };
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Cleans a ticker cell: uppercase, first token only ("BMY US" -> "BMY"),
/// stripped to `[A-Z0-9.-]`, `.US` suffix removed. Blank or placeholder
/// cells (nan/none/null) resolve to None.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if matches!(trimmed.to_lowercase().as_str(), "nan" | "none" | "null") {
        return None;
    }
    let first = trimmed.to_uppercase();
    let first = first.split_whitespace().next()?;
    let cleaned: String = first
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let cleaned = cleaned.replace(".US", "");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// An explicit CIK cell bypasses ticker resolution; anything non-numeric
/// is treated as absent.
pub fn normalize_cik(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>10}", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn announce_dates_parse_in_all_shapes() {
        assert_eq!(
            parse_announce_date("2021-03-09"),
            NaiveDate::from_ymd_opt(2021, 3, 9)
        );
        assert_eq!(
            parse_announce_date("3/9/2021"),
            NaiveDate::from_ymd_opt(2021, 3, 9)
        );
        assert_eq!(
            parse_announce_date("3/9/21"),
            NaiveDate::from_ymd_opt(2021, 3, 9)
        );
        assert_eq!(
            parse_announce_date("12/31/99"),
            NaiveDate::from_ymd_opt(1999, 12, 31)
        );
        assert_eq!(parse_announce_date("not a date"), None);
        assert_eq!(parse_announce_date("13/45/2021"), None);
    }

    #[test]
    fn tickers_are_normalized() {
        assert_eq!(normalize_ticker("BMY US"), Some("BMY".to_string()));
        assert_eq!(normalize_ticker("brk.b"), Some("BRK.B".to_string()));
        assert_eq!(normalize_ticker("ADI.US"), Some("ADI".to_string()));
        assert_eq!(normalize_ticker("  "), None);
        assert_eq!(normalize_ticker("nan"), None);
        assert_eq!(normalize_ticker("$$"), None);
    }

    #[test]
    fn ciks_must_be_numeric() {
        assert_eq!(normalize_cik("320193"), Some("0000320193".to_string()));
        assert_eq!(normalize_cik("0000320193"), Some("0000320193".to_string()));
        assert_eq!(normalize_cik("32O193"), None);
        assert_eq!(normalize_cik(""), None);
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loader_reads_rows_and_skips_bad_dates() {
        let file = write_csv(
            "Acquirer Name,Target Name,Acquirer Ticker,Target Ticker,Announce Date\n\
             Analog Devices,Maxim Integrated,ADI,MXIM,7/13/2020\n\
             Broken Co,Other Co,AAA,BBB,someday\n\
             Microsoft,Activision Blizzard,MSFT,ATVI,2022-01-18\n",
        );
        let deals = load_deals(file.path()).unwrap();
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].acquirer_ticker.as_deref(), Some("ADI"));
        assert_eq!(deals[0].target_ticker.as_deref(), Some("MXIM"));
        assert_eq!(
            deals[0].announce_date,
            NaiveDate::from_ymd_opt(2020, 7, 13).unwrap()
        );
        assert_eq!(deals[1].row, 3);
        assert_eq!(deals[1].target.as_deref(), Some("Activision Blizzard"));
    }

    #[test]
    fn loader_matches_headers_loosely() {
        let file = write_csv(
            "acquirer_ticker,ANNOUNCEMENT DATE\nADI,7/13/2020\n",
        );
        let deals = load_deals(file.path()).unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].acquirer_ticker.as_deref(), Some("ADI"));
    }

    #[test]
    fn missing_announce_date_column_is_fatal() {
        let file = write_csv("Acquirer Ticker,Target Ticker\nADI,MXIM\n");
        let err = load_deals(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::InputFormat(_)));
    }

    #[test]
    fn missing_identifier_columns_are_fatal() {
        let file = write_csv("Announce Date,Deal Size\n7/13/2020,21B\n");
        let err = load_deals(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::InputFormat(_)));
    }
}
