// src/edgar/client.rs
use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, StatusCode};
use scraper::{Html, Selector};
use tokio::sync::OnceCell;

use crate::edgar::models::{CompanySubmission, FilingBlock, FilingCandidate, FilingIndex};
use crate::utils::error::EdgarError;

const SEC_BASE: &str = "https://www.sec.gov";
const DATA_BASE: &str = "https://data.sec.gov";

// SEC requires a descriptive User-Agent with contact details.
// Override via EDGAR_USER_AGENT for real deployments.
const DEFAULT_USER_AGENT: &str = "EX21Fetcher/0.1 research ex21-fetcher@example.com";
// SEC asks for 10 requests/second max. Be conservative. >100ms delay.
const EDGAR_REQUEST_DELAY_MS: u64 = 150;
const MAX_ATTEMPTS: u32 = 3;

// Minimal legacy CIK map (reorgs / name changes).
// Format: ticker, cutoff date, CIK to use for filings before the cutoff.
const LEGACY_CIK: &[(&str, &str, &str)] = &[
    // Disney: use the old CIK for filings before 2019-03-21
    ("DIS", "2019-03-21", "0001001039"),
];

// <FILENAME> tags inside full-submission.txt
static FILENAME_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<FILENAME>\s*([^\r\n<>]+)").expect("Failed to compile FILENAME_TAG_RE"));

// Document-looking hrefs on the accession index page
static DOC_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(?:htm|html|txt|xml|xsd|zip|jpg|png|gif|xlsx)$")
        .expect("Failed to compile DOC_HREF_RE")
});

static HREF_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile HREF_SELECTOR"));

/// One row of EDGAR's ticker-to-CIK directory (company_tickers.json).
#[derive(Debug, Clone)]
pub struct TickerEntry {
    pub ticker: String,
    pub title: String,
    pub cik: String,
}

/// HTTP client for EDGAR with the mandatory User-Agent, a fixed
/// inter-request delay and bounded retries on transient failures.
/// The ticker and name directories are fetched once per run and cached.
pub struct EdgarClient {
    client: reqwest::Client,
    ticker_directory: OnceCell<Vec<TickerEntry>>,
    name_lookup: OnceCell<Vec<(String, String)>>,
}

impl EdgarClient {
    pub fn new() -> Result<Self, EdgarError> {
        let user_agent =
            std::env::var("EDGAR_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
        tracing::debug!("Using User-Agent: {}", user_agent);
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            ticker_directory: OnceCell::new(),
            name_lookup: OnceCell::new(),
        })
    }

    /// GET with rate-limit delay and up to MAX_ATTEMPTS on connect errors
    /// and retryable statuses (429, 5xx).
    async fn get(&self, url: &str) -> Result<reqwest::Response, EdgarError> {
        let mut last_status = None;
        for attempt in 1..=MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(EDGAR_REQUEST_DELAY_MS)).await;
            let result = self
                .client
                .get(url)
                .header(header::ACCEPT, "application/json,application/xml,text/html,text/plain,*/*")
                .send()
                .await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        tracing::warn!(
                            "HTTP {} for {} (attempt {}/{})",
                            status,
                            url,
                            attempt,
                            MAX_ATTEMPTS
                        );
                        last_status = Some(status);
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    if status == StatusCode::FORBIDDEN {
                        tracing::warn!("Received 403 Forbidden - check User-Agent and rate limits.");
                        return Err(EdgarError::RateLimited);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(EdgarError::FilingDocNotFound(url.to_string()));
                    }
                    return Err(EdgarError::Http(status));
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        "Request error for {} (attempt {}/{}): {}",
                        url,
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(EdgarError::Network(e)),
            }
        }
        Err(last_status.map(EdgarError::Http).unwrap_or(EdgarError::RateLimited))
    }

    /// Fetches and caches EDGAR's ticker-to-CIK directory.
    async fn ticker_directory(&self) -> Result<&Vec<TickerEntry>, EdgarError> {
        self.ticker_directory
            .get_or_try_init(|| async {
                let url = format!("{}/files/company_tickers.json", SEC_BASE);
                let json: serde_json::Value = self.get(&url).await?.json().await?;
                let map = json
                    .as_object()
                    .ok_or_else(|| EdgarError::Parse("company_tickers.json: expected an object".to_string()))?;
                let mut entries = Vec::with_capacity(map.len());
                for company in map.values() {
                    let ticker = company
                        .get("ticker")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_uppercase();
                    if ticker.is_empty() {
                        continue;
                    }
                    let Some(cik) = company.get("cik_str").and_then(|c| c.as_u64()) else {
                        continue;
                    };
                    let title = company
                        .get("title")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_string();
                    entries.push(TickerEntry {
                        ticker,
                        title,
                        // Format CIK with leading zeros to 10 digits
                        cik: format!("{:010}", cik),
                    });
                }
                tracing::debug!("Loaded {} ticker directory entries", entries.len());
                Ok(entries)
            })
            .await
    }

    /// Resolves a ticker symbol to its 10-digit CIK. Not-found is a normal
    /// outcome, not an error.
    pub async fn cik_for_ticker(&self, ticker: &str) -> Result<Option<String>, EdgarError> {
        let ticker = ticker.to_uppercase();
        let directory = self.ticker_directory().await?;
        Ok(directory
            .iter()
            .find(|e| e.ticker == ticker)
            .map(|e| e.cik.clone()))
    }

    /// Company-name fallback: exact, then prefix, then substring match on
    /// the directory titles; then the same cascade over the broad
    /// cik-lookup-data.txt archive (covers legacy and foreign issuers).
    pub async fn cik_for_name(&self, name: &str) -> Result<Option<String>, EdgarError> {
        let target = normalize_name(name);
        if target.is_empty() {
            return Ok(None);
        }
        let directory = self.ticker_directory().await?;
        if let Some(e) = directory.iter().find(|e| normalize_name(&e.title) == target) {
            return Ok(Some(e.cik.clone()));
        }
        if let Some(e) = directory
            .iter()
            .find(|e| normalize_name(&e.title).starts_with(&target))
        {
            return Ok(Some(e.cik.clone()));
        }
        if let Some(e) = directory
            .iter()
            .find(|e| normalize_name(&e.title).contains(&target))
        {
            return Ok(Some(e.cik.clone()));
        }

        let rows = self.name_lookup().await?;
        if let Some((_, cik)) = rows.iter().find(|(nm, _)| *nm == target) {
            return Ok(Some(cik.clone()));
        }
        if let Some((_, cik)) = rows
            .iter()
            .find(|(nm, _)| nm.starts_with(&target) || nm.contains(&target))
        {
            return Ok(Some(cik.clone()));
        }
        Ok(None)
    }

    async fn name_lookup(&self) -> Result<&Vec<(String, String)>, EdgarError> {
        self.name_lookup
            .get_or_try_init(|| async {
                let url = format!("{}/Archives/edgar/cik-lookup-data.txt", SEC_BASE);
                let text = self.get(&url).await?.text().await?;
                let rows = parse_cik_lookup(&text);
                tracing::debug!("Loaded {} cik-lookup rows", rows.len());
                Ok(rows)
            })
            .await
    }

    /// Fetches the company submission index for a 10-digit CIK.
    pub async fn submissions(&self, cik: &str) -> Result<CompanySubmission, EdgarError> {
        let url = format!("{}/submissions/CIK{}.json", DATA_BASE, cik);
        let submission: CompanySubmission = self.get(&url).await?.json().await?;
        Ok(submission)
    }

    /// Fetches one paged-out historical submissions file. Historical pages
    /// are bare filing blocks; the nested shape is tolerated too.
    async fn historical_block(&self, name: &str) -> Result<FilingBlock, EdgarError> {
        let url = format!("{}/submissions/{}", DATA_BASE, name);
        let value: serde_json::Value = self.get(&url).await?.json().await?;
        let block = value.pointer("/filings/recent").cloned().unwrap_or(value);
        serde_json::from_value(block)
            .map_err(|e| EdgarError::Parse(format!("historical submissions {}: {}", name, e)))
    }

    /// Finds filings of `form` for `cik` whose filing date falls inside
    /// `[after, before]`, scanning both the recent block and any historical
    /// pages overlapping the window. Sorted by filing date ascending, ties
    /// broken by accession number. An empty result is a normal outcome.
    pub async fn find_filings(
        &self,
        cik: &str,
        after: NaiveDate,
        before: NaiveDate,
        form: &str,
        include_amends: bool,
        limit: Option<usize>,
    ) -> Result<Vec<FilingCandidate>, EdgarError> {
        let subs = self.submissions(cik).await?;
        tracing::debug!("{} (CIK {}): scanning submissions", subs.name, subs.cik);

        let mut candidates =
            collect_candidates(&subs.filings.recent, cik, form, include_amends, after, before);

        for page in &subs.filings.files {
            let from = NaiveDate::parse_from_str(&page.filing_from, "%Y-%m-%d");
            let to = NaiveDate::parse_from_str(&page.filing_to, "%Y-%m-%d");
            let (Ok(from), Ok(to)) = (from, to) else { continue };
            if !ranges_overlap(after, before, from, to) {
                continue;
            }
            match self.historical_block(&page.name).await {
                Ok(block) => candidates.extend(collect_candidates(
                    &block,
                    cik,
                    form,
                    include_amends,
                    after,
                    before,
                )),
                // Best effort: a bad historical page must not sink the deal.
                Err(e) => tracing::warn!("Skipping historical submissions page {}: {}", page.name, e),
            }
        }

        sort_candidates(&mut candidates);
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }
        Ok(candidates)
    }

    /// Returns the filing's document manifest using a three-step fallback:
    /// index.json, then full-submission.txt, then the accession index page.
    /// An empty manifest is a normal outcome.
    pub async fn fetch_manifest(&self, filing: &FilingCandidate) -> Result<Vec<String>, EdgarError> {
        let base = filing.archive_base();

        // 1) index.json
        match self.get(&format!("{}/index.json", base)).await {
            Ok(response) => match response.json::<FilingIndex>().await {
                Ok(index) => {
                    let names: Vec<String> = index
                        .directory
                        .item
                        .into_iter()
                        .map(|it| it.name)
                        .filter(|n| !n.is_empty())
                        .collect();
                    if !names.is_empty() {
                        return Ok(names);
                    }
                }
                Err(e) => tracing::debug!(
                    "index.json unparseable for {}: {}",
                    filing.accession_number,
                    e
                ),
            },
            Err(e) => tracing::debug!("index.json unavailable for {}: {}", filing.accession_number, e),
        }

        // 2) full-submission.txt
        if let Ok(response) = self.get(&format!("{}/full-submission.txt", base)).await {
            if let Ok(text) = response.text().await {
                let names = manifest_from_full_submission(&text);
                if !names.is_empty() {
                    return Ok(names);
                }
            }
        }

        // 3) {accession}-index.html
        if let Ok(response) = self
            .get(&format!("{}/{}-index.html", base, filing.accession_number))
            .await
        {
            if let Ok(html) = response.text().await {
                let names = manifest_from_index_html(&html);
                if !names.is_empty() {
                    return Ok(names);
                }
            }
        }

        tracing::warn!("No document manifest found for accession {}", filing.accession_number);
        Ok(Vec::new())
    }

    /// Downloads a document verbatim.
    pub async fn download_document(&self, url: &str) -> Result<Vec<u8>, EdgarError> {
        tracing::info!("Downloading document from: {}", url);
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;
        tracing::debug!("Successfully downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(EDGAR_REQUEST_DELAY_MS * 2u64.pow(attempt))
}

/// Lowercases, maps every non-alphanumeric to a space and collapses runs,
/// so "Analog Devices, Inc." and "analog devices inc" compare equal.
pub fn normalize_name(s: &str) -> String {
    let lowered = s.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remaps a ticker to its pre-reorganization CIK when the deal anchor
/// predates the cutoff in LEGACY_CIK.
pub fn apply_legacy_cik(ticker: &str, anchor: NaiveDate, cik: String) -> String {
    let t = ticker.to_uppercase();
    for (legacy_ticker, cutoff, legacy_cik) in LEGACY_CIK {
        if t != *legacy_ticker {
            continue;
        }
        if let Ok(cutoff) = NaiveDate::parse_from_str(cutoff, "%Y-%m-%d") {
            if anchor < cutoff {
                return (*legacy_cik).to_string();
            }
        }
    }
    cik
}

/// cik-lookup-data.txt rows: `NAME:CIK:`. Company names may themselves
/// contain colons, so the CIK is taken from the right.
pub(crate) fn parse_cik_lookup(text: &str) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let Some((name, cik)) = line.trim_end().trim_end_matches(':').rsplit_once(':') else {
            continue;
        };
        let cik = cik.trim();
        if cik.is_empty() || !cik.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let name = normalize_name(name);
        if name.is_empty() {
            continue;
        }
        rows.push((name, format!("{:0>10}", cik)));
    }
    rows
}

/// Filters one filing block down to in-window candidates of the wanted form.
pub(crate) fn collect_candidates(
    block: &FilingBlock,
    cik: &str,
    want_form: &str,
    include_amends: bool,
    after: NaiveDate,
    before: NaiveDate,
) -> Vec<FilingCandidate> {
    let want = want_form.to_uppercase();
    let mut out = Vec::new();
    for i in 0..block.accession_number.len() {
        let Some(form) = block.form.get(i) else { continue };
        let base_form = form.split('/').next().unwrap_or_default().trim().to_uppercase();
        if base_form != want {
            continue;
        }
        if !include_amends && form.to_uppercase().ends_with("/A") {
            continue;
        }
        let Some(date_str) = block.filing_date.get(i) else { continue };
        let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };
        if date < after || date > before {
            continue;
        }
        out.push(FilingCandidate {
            cik: cik.to_string(),
            accession_number: block.accession_number[i].clone(),
            form_type: form.clone(),
            filing_date: date,
        });
    }
    out
}

/// Filing date ascending so the detector examines filings nearest the
/// window start first; accession number breaks ties deterministically.
pub(crate) fn sort_candidates(candidates: &mut [FilingCandidate]) {
    candidates.sort_by(|a, b| {
        a.filing_date
            .cmp(&b.filing_date)
            .then_with(|| a.accession_number.cmp(&b.accession_number))
    });
}

pub(crate) fn ranges_overlap(
    a_from: NaiveDate,
    a_to: NaiveDate,
    b_from: NaiveDate,
    b_to: NaiveDate,
) -> bool {
    !(a_to < b_from || a_from > b_to)
}

/// Document names from `<FILENAME>` tags in full-submission.txt,
/// de-duplicated preserving order.
pub(crate) fn manifest_from_full_submission(text: &str) -> Vec<String> {
    let names: Vec<String> = FILENAME_TAG_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    dedup_preserve_order(names)
}

/// Document names scraped from hrefs on the accession index page.
pub(crate) fn manifest_from_index_html(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let names: Vec<String> = document
        .select(&HREF_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| DOC_HREF_RE.is_match(href))
        .filter_map(|href| href.rsplit('/').next())
        .map(|n| n.to_string())
        .filter(|n| !n.is_empty())
        .collect();
    dedup_preserve_order(names)
}

fn dedup_preserve_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(rows: &[(&str, &str, &str)]) -> FilingBlock {
        FilingBlock {
            accession_number: rows.iter().map(|r| r.0.to_string()).collect(),
            filing_date: rows.iter().map(|r| r.1.to_string()).collect(),
            form: rows.iter().map(|r| r.2.to_string()).collect(),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn collect_candidates_filters_form_and_window() {
        let block = block(&[
            ("0000000001-21-000001", "2021-03-01", "8-K"),
            ("0000000001-21-000002", "2021-03-05", "10-K"),
            ("0000000001-21-000003", "2021-06-01", "8-K"),
            ("0000000001-21-000004", "2021-03-09", "8-K/A"),
        ]);
        let found = collect_candidates(
            &block,
            "0000000001",
            "8-K",
            false,
            day("2021-02-15"),
            day("2021-03-15"),
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].accession_number, "0000000001-21-000001");
        assert_eq!(found[0].form_type, "8-K");
    }

    #[test]
    fn collect_candidates_includes_amendments_when_asked() {
        let block = block(&[
            ("0000000001-21-000001", "2021-03-01", "8-K"),
            ("0000000001-21-000004", "2021-03-09", "8-K/A"),
        ]);
        let found = collect_candidates(
            &block,
            "0000000001",
            "8-K",
            true,
            day("2021-02-15"),
            day("2021-03-15"),
        );
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|f| f.form_type == "8-K/A"));
    }

    #[test]
    fn candidates_sort_by_date_then_accession() {
        let block = block(&[
            ("0000000001-21-000009", "2021-03-05", "8-K"),
            ("0000000001-21-000002", "2021-03-05", "8-K"),
            ("0000000001-21-000001", "2021-03-01", "8-K"),
        ]);
        let mut found = collect_candidates(
            &block,
            "0000000001",
            "8-K",
            false,
            day("2021-02-01"),
            day("2021-04-01"),
        );
        sort_candidates(&mut found);
        let order: Vec<&str> = found.iter().map(|f| f.accession_number.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "0000000001-21-000001",
                "0000000001-21-000002",
                "0000000001-21-000009"
            ]
        );
    }

    #[test]
    fn ranges_overlap_boundaries() {
        assert!(ranges_overlap(
            day("2021-01-01"),
            day("2021-02-01"),
            day("2021-02-01"),
            day("2021-03-01")
        ));
        assert!(!ranges_overlap(
            day("2021-01-01"),
            day("2021-02-01"),
            day("2021-02-02"),
            day("2021-03-01")
        ));
    }

    #[test]
    fn full_submission_filenames_are_extracted_and_deduped() {
        let text = "\
<SEC-DOCUMENT>0001.txt
<FILENAME>d8k.htm
<TYPE>EX-2.1
<FILENAME>dex21.htm
<FILENAME>d8k.htm
";
        assert_eq!(manifest_from_full_submission(text), vec!["d8k.htm", "dex21.htm"]);
    }

    #[test]
    fn index_html_hrefs_are_scraped() {
        let html = r#"
            <html><body>
            <a href="/Archives/edgar/data/1/000000000121000001/d8k.htm">doc</a>
            <a href="dex21.htm">exhibit</a>
            <a href="mailto:someone@sec.gov">mail</a>
            <a href="dex21.htm">dup</a>
            </body></html>
        "#;
        assert_eq!(manifest_from_index_html(html), vec!["d8k.htm", "dex21.htm"]);
    }

    #[test]
    fn cik_lookup_rows_parse_with_embedded_colons() {
        let text = "\
AAR CORP:0000001750:
ACME: THE ROADRUNNER CO:0000009999:
BADLINE
NOT A CIK:12AB34:
";
        let rows = parse_cik_lookup(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("aar corp".to_string(), "0000001750".to_string()));
        assert_eq!(
            rows[1],
            ("acme the roadrunner co".to_string(), "0000009999".to_string())
        );
    }

    #[test]
    fn name_normalization_strips_punctuation() {
        assert_eq!(normalize_name("Analog Devices, Inc."), "analog devices inc");
        assert_eq!(normalize_name("  A.T.&T.  "), "a t t");
    }

    #[test]
    fn legacy_cik_applies_before_cutoff_only() {
        let resolved = "0001744489".to_string();
        assert_eq!(
            apply_legacy_cik("DIS", day("2018-06-01"), resolved.clone()),
            "0001001039"
        );
        assert_eq!(
            apply_legacy_cik("DIS", day("2020-01-01"), resolved.clone()),
            "0001744489"
        );
        assert_eq!(
            apply_legacy_cik("MSFT", day("2018-06-01"), resolved.clone()),
            "0001744489"
        );
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn resolves_aapl_cik_against_live_edgar() {
        let client = EdgarClient::new().unwrap();
        let cik = client.cik_for_ticker("AAPL").await.unwrap();
        assert_eq!(cik.as_deref(), Some("0000320193"));
    }
}
