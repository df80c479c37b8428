// src/metadata.rs

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::COMPANY_META_FILE;
use crate::utils::error::StorageError;

pub const METADATA_FILE: &str = "ex21_metadata.jsonl";
/// Excerpt cap in characters, applied to the raw HTML without re-parsing.
pub const EXCERPT_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "CONVERT_FAILED")]
    ConvertFailed,
    #[serde(rename = "DOWNLOAD_FAILED")]
    DownloadFailed,
}

/// Per-company sidecar written at fetch time so the metadata build can
/// recover deal attribution from the output tree alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyMeta {
    pub label: String,
    pub acquirer: Option<String>,
    pub target: Option<String>,
    pub cik: Option<String>,
    pub status: DownloadStatus,
    pub fetched_at: String,
}

/// One line of ex21_metadata.jsonl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub acquirer: Option<String>,
    pub target: Option<String>,
    pub cik: Option<String>,
    pub status: DownloadStatus,
    pub text_excerpt: String,
    pub htm_path: String,
    pub pdf_path: Option<String>,
}

/// First EXCERPT_CHARS characters of the raw HTML, markup and all.
pub fn excerpt(html: &str) -> String {
    html.chars().take(EXCERPT_CHARS).collect()
}

/// Full rebuild: scans every company directory under `root` in sorted
/// order and rewrites `output` from scratch, one JSON object per line.
/// Deterministic for an unchanged tree. Returns the record count.
pub fn build(root: &Path, output: &Path) -> Result<usize, StorageError> {
    let mut company_dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    company_dirs.sort();

    let mut out = fs::File::create(output)?;
    let mut written = 0;
    for dir in company_dirs {
        let Some(record) = company_record(&dir)? else {
            continue;
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        writeln!(out, "{}", line)?;
        written += 1;
    }
    Ok(written)
}

/// One record per company directory holding at least one `.htm` artifact.
/// Directories without one (or without any files) are skipped.
fn company_record(dir: &Path) -> Result<Option<MetadataRecord>, StorageError> {
    let mut htm_files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| {
                        ext.eq_ignore_ascii_case("htm") || ext.eq_ignore_ascii_case("html")
                    })
                    .unwrap_or(false)
        })
        .collect();
    htm_files.sort();
    let Some(htm_path) = htm_files.into_iter().next() else {
        return Ok(None);
    };

    let html = String::from_utf8_lossy(&fs::read(&htm_path)?).into_owned();
    let pdf = htm_path.with_extension("pdf");
    let pdf_path = pdf.exists().then(|| pdf.display().to_string());

    let sidecar: Option<CompanyMeta> = fs::read(dir.join(COMPANY_META_FILE))
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());
    let dir_name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let (acquirer, target, cik, status) = match sidecar {
        Some(meta) => (meta.acquirer, meta.target, meta.cik, meta.status),
        None => (dir_name, None, None, DownloadStatus::Ok),
    };

    Ok(Some(MetadataRecord {
        acquirer,
        target,
        cik,
        status,
        text_excerpt: excerpt(&html),
        htm_path: htm_path.display().to_string(),
        pdf_path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_company(
        root: &Path,
        ticker: &str,
        html: &str,
        with_pdf: bool,
        meta: Option<&CompanyMeta>,
    ) {
        let dir = root.join(ticker);
        fs::create_dir_all(&dir).unwrap();
        let htm = dir.join("EX-2.1__0000000001-21-000001__dex21.htm");
        fs::write(&htm, html).unwrap();
        if with_pdf {
            fs::write(htm.with_extension("pdf"), b"%PDF-1.4").unwrap();
        }
        if let Some(meta) = meta {
            fs::write(
                dir.join(COMPANY_META_FILE),
                serde_json::to_string_pretty(meta).unwrap(),
            )
            .unwrap();
        }
    }

    #[test]
    fn excerpt_truncates_to_5000_chars() {
        let html = "x".repeat(8000);
        let cut = excerpt(&html);
        assert_eq!(cut.len(), 5000);
        assert_eq!(cut, html[..5000]);
    }

    #[test]
    fn short_content_is_kept_whole() {
        assert_eq!(excerpt("<html>short</html>"), "<html>short</html>");
    }

    #[test]
    fn build_emits_one_record_per_company() {
        let tmp = tempfile::tempdir().unwrap();
        let meta = CompanyMeta {
            label: "ADI".to_string(),
            acquirer: Some("Analog Devices".to_string()),
            target: Some("Maxim Integrated".to_string()),
            cik: Some("0000006281".to_string()),
            status: DownloadStatus::Ok,
            fetched_at: "2024-01-01T00:00:00Z".to_string(),
        };
        seed_company(tmp.path(), "ADI", "<html>deal</html>", true, Some(&meta));
        seed_company(tmp.path(), "MXIM", "<html>other</html>", false, None);
        // A directory with no artifacts contributes nothing.
        fs::create_dir_all(tmp.path().join("EMPTY")).unwrap();

        let output = tmp.path().join(METADATA_FILE);
        let written = build(tmp.path(), &output).unwrap();
        assert_eq!(written, 2);

        let content = fs::read_to_string(&output).unwrap();
        let records: Vec<MetadataRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);

        // Sorted scan: ADI first.
        assert_eq!(records[0].acquirer.as_deref(), Some("Analog Devices"));
        assert_eq!(records[0].cik.as_deref(), Some("0000006281"));
        assert!(records[0].pdf_path.is_some());
        assert_eq!(records[0].status, DownloadStatus::Ok);

        // Sidecar-less directory degrades to its name.
        assert_eq!(records[1].acquirer.as_deref(), Some("MXIM"));
        assert!(records[1].cik.is_none());
        assert!(records[1].pdf_path.is_none());
    }

    #[test]
    fn build_records_degraded_statuses() {
        let tmp = tempfile::tempdir().unwrap();
        let meta = CompanyMeta {
            label: "BMY".to_string(),
            acquirer: Some("Bristol-Myers Squibb".to_string()),
            target: Some("Celgene".to_string()),
            cik: Some("0000014272".to_string()),
            status: DownloadStatus::ConvertFailed,
            fetched_at: "2024-01-01T00:00:00Z".to_string(),
        };
        seed_company(tmp.path(), "BMY", "<html>deal</html>", false, Some(&meta));
        let output = tmp.path().join(METADATA_FILE);
        build(tmp.path(), &output).unwrap();
        let record: MetadataRecord =
            serde_json::from_str(fs::read_to_string(&output).unwrap().lines().next().unwrap())
                .unwrap();
        assert_eq!(record.status, DownloadStatus::ConvertFailed);
        let line = fs::read_to_string(&output).unwrap();
        assert!(line.contains("\"CONVERT_FAILED\""));
    }

    #[test]
    fn rebuild_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        seed_company(tmp.path(), "ADI", &"y".repeat(6000), false, None);
        let first = tmp.path().join("first.jsonl");
        let second = tmp.path().join("second.jsonl");
        build(tmp.path(), &first).unwrap();
        build(tmp.path(), &second).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

        let record: MetadataRecord =
            serde_json::from_str(fs::read_to_string(&first).unwrap().lines().next().unwrap())
                .unwrap();
        assert_eq!(record.text_excerpt.len(), EXCERPT_CHARS);
    }
}
