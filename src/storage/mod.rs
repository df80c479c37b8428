// src/storage/mod.rs
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::exhibits::ExhibitLabel;
use crate::metadata::{CompanyMeta, DownloadStatus};
use crate::utils::error::StorageError;

pub const TICKERS_NOT_FOUND_FILE: &str = "tickersnotfound.txt";
pub const MISSING_EXHIBIT_FILE: &str = "missingexhibit2.1.txt";
pub const COMPANY_META_FILE: &str = "company_meta.json";

/// Outcome of one company's fetch-and-convert step.
#[derive(Debug)]
pub struct DownloadResult {
    pub company_dir: PathBuf,
    pub htm_path: PathBuf,
    pub pdf_path: Option<PathBuf>,
    pub status: DownloadStatus,
}

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates the output root and resets the per-run log files, so each
    /// run's records stand alone.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
        }
        fs::File::create(base_path.join(TICKERS_NOT_FOUND_FILE))?;
        fs::File::create(base_path.join(MISSING_EXHIBIT_FILE))?;
        Ok(Self {
            base_dir: base_path,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// One directory per company, named by its ticker label.
    pub fn company_dir(&self, label: &str) -> PathBuf {
        self.base_dir.join(label.to_uppercase())
    }

    /// Artifact paths for one exhibit:
    /// `<LABEL>__<accession>__<document>` with a sibling `.pdf`.
    pub fn exhibit_paths(
        &self,
        company: &str,
        label: ExhibitLabel,
        accession: &str,
        document: &str,
    ) -> (PathBuf, PathBuf) {
        let file_name = format!("{}__{}__{}", label.as_str(), accession, document);
        let htm = self.company_dir(company).join(&file_name);
        let pdf = htm.with_extension("pdf");
        (htm, pdf)
    }

    /// Writes exhibit bytes verbatim, creating the company directory on
    /// first use so unresolved companies never leave an empty directory.
    pub fn write_exhibit(&self, htm_path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = htm_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(htm_path, bytes)?;
        Ok(())
    }

    /// Per-company sidecar consumed by the metadata build.
    pub fn write_company_meta(
        &self,
        company: &str,
        meta: &CompanyMeta,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.company_dir(company);
        fs::create_dir_all(&dir)?;
        let path = dir.join(COMPANY_META_FILE);
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// One unresolved ticker per line.
    pub fn record_ticker_not_found(&self, ticker: &str) -> Result<(), StorageError> {
        self.append_line(TICKERS_NOT_FOUND_FILE, ticker)
    }

    /// One `ticker,cik,window` line per deal with no matching exhibit.
    pub fn record_missing_exhibit(
        &self,
        ticker: &str,
        cik: &str,
        after: NaiveDate,
        before: NaiveDate,
    ) -> Result<(), StorageError> {
        self.append_line(
            MISSING_EXHIBIT_FILE,
            &format!("{},{},{}..{}", ticker, cik, after, before),
        )
    }

    fn append_line(&self, file: &str, line: &str) -> Result<(), StorageError> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.base_dir.join(file))?;
        writeln!(f, "{}", line)?;
        Ok(())
    }
}
