// src/edgar/models.rs
use chrono::NaiveDate;
use serde::Deserialize;

/// The slice of the EDGAR company submission index we consume.
/// Example: https://data.sec.gov/submissions/CIK0000320193.json
#[derive(Debug, Deserialize)]
pub struct CompanySubmission {
    pub cik: String,
    pub name: String,
    pub filings: Filings,
}

#[derive(Debug, Deserialize)]
pub struct Filings {
    pub recent: FilingBlock,
    #[serde(default)]
    pub files: Vec<HistoricalPage>,
}

/// Column-oriented filing listing: parallel arrays, one entry per filing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingBlock {
    pub accession_number: Vec<String>,
    pub filing_date: Vec<String>,
    pub form: Vec<String>,
}

/// Filings older than the `recent` block are paged out into separate
/// submission files listed under `filings.files`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPage {
    pub name: String,
    pub filing_from: String,
    pub filing_to: String,
}

/// `index.json` of a single accession directory.
#[derive(Debug, Deserialize)]
pub struct FilingIndex {
    pub directory: IndexDirectory,
}

#[derive(Debug, Deserialize)]
pub struct IndexDirectory {
    #[serde(default)]
    pub item: Vec<IndexItem>,
}

#[derive(Debug, Deserialize)]
pub struct IndexItem {
    #[serde(default)]
    pub name: String,
}

/// A filing of the requested form that fell inside the search window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingCandidate {
    pub cik: String,
    pub accession_number: String,
    pub form_type: String,
    pub filing_date: NaiveDate,
}

impl FilingCandidate {
    /// Base URL of the accession's document directory.
    /// The archive path uses the unpadded CIK.
    pub fn archive_base(&self) -> String {
        let acc_nodash = self.accession_number.replace('-', "");
        format!(
            "https://www.sec.gov/Archives/edgar/data/{}/{}",
            self.cik.trim_start_matches('0'),
            acc_nodash
        )
    }

    /// URL of one named document inside the accession directory.
    pub fn document_url(&self, document: &str) -> String {
        format!("{}/{}", self.archive_base(), document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_base_strips_dashes_and_padding() {
        let filing = FilingCandidate {
            cik: "0000320193".to_string(),
            accession_number: "0000320193-23-000077".to_string(),
            form_type: "8-K".to_string(),
            filing_date: NaiveDate::from_ymd_opt(2023, 8, 4).unwrap(),
        };
        assert_eq!(
            filing.archive_base(),
            "https://www.sec.gov/Archives/edgar/data/320193/000032019323000077"
        );
        assert_eq!(
            filing.document_url("dex21.htm"),
            "https://www.sec.gov/Archives/edgar/data/320193/000032019323000077/dex21.htm"
        );
    }
}
