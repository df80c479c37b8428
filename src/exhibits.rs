// src/exhibits.rs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::edgar::models::FilingCandidate;

// Filename fragments EDGAR filers use for Exhibit 2.1 documents,
// including the dNN and dexNN naming families.
const EX21_TOKENS: &[&str] = &[
    "ex2-1", "ex2_1", "ex21.", "dex21", "exhibit2.1", "ex2d1", "dex2-1", "dex2_1",
];
// Exhibit 10.1 (material contract), the fallback when no EX-2.1 exists.
const EX101_TOKENS: &[&str] = &[
    "ex10.1", "ex10_1", "ex101.", "dex101", "exhibit10.1", "ex10d1", "dex10-1", "dex10_1",
];

// Descriptive filenames spell the agreement out instead of numbering it.
static MERGER_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:agreement[ _\-]*and[ _\-]*plan[ _\-]*of[ _\-]*merger|plan[ _\-]*of[ _\-]*merger|merger[ _\-]*agreement|exhibit[ _\-]*2\.1)",
    )
    .expect("Failed to compile MERGER_PHRASE_RE")
});

/// Exhibit classification, baked into artifact filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhibitLabel {
    /// EX-2.1, the merger agreement itself.
    Ex21,
    /// EX-10.1, used only when no EX-2.1 was found in the window.
    Ex101,
}

impl ExhibitLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhibitLabel::Ex21 => "EX-2.1",
            ExhibitLabel::Ex101 => "EX-10.1",
        }
    }
}

impl std::fmt::Display for ExhibitLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document inside a filing that matched the exhibit heuristics.
#[derive(Debug, Clone)]
pub struct ExhibitMatch {
    pub filing: FilingCandidate,
    pub document_filename: String,
    pub document_url: String,
    pub label: ExhibitLabel,
}

/// Result of scanning one filing's manifest. `extra_primaries` counts
/// additional EX-2.1 candidates beyond the first, for ambiguity flagging.
#[derive(Debug, Default)]
pub struct ManifestScan {
    pub primary: Option<String>,
    pub fallback: Option<String>,
    pub extra_primaries: usize,
}

/// Classifies a single manifest entry. Only HTML documents are eligible.
pub fn classify_document(name: &str) -> Option<ExhibitLabel> {
    let lowered = name.to_lowercase();
    if !(lowered.ends_with(".htm") || lowered.ends_with(".html")) {
        return None;
    }
    if EX21_TOKENS.iter().any(|t| lowered.contains(t)) || MERGER_PHRASE_RE.is_match(&lowered) {
        return Some(ExhibitLabel::Ex21);
    }
    if EX101_TOKENS.iter().any(|t| lowered.contains(t)) {
        return Some(ExhibitLabel::Ex101);
    }
    None
}

/// Scans a manifest in order. The first EX-2.1 candidate wins; the first
/// EX-10.1 candidate is remembered separately for the fallback path.
pub fn scan_manifest(names: &[String]) -> ManifestScan {
    let mut scan = ManifestScan::default();
    for name in names {
        match classify_document(name) {
            Some(ExhibitLabel::Ex21) => {
                if scan.primary.is_none() {
                    scan.primary = Some(name.clone());
                } else {
                    scan.extra_primaries += 1;
                }
            }
            Some(ExhibitLabel::Ex101) => {
                if scan.fallback.is_none() {
                    scan.fallback = Some(name.clone());
                }
            }
            None => {}
        }
    }
    scan
}
