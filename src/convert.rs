// src/convert.rs

use std::env;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::utils::error::ConvertError;

const WKHTMLTOPDF_CANDIDATES: &[&str] = &["wkhtmltopdf"];
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "chrome",
    "msedge",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    Wkhtmltopdf,
    HeadlessBrowser,
}

/// An external HTML-to-PDF engine found on PATH. Conversion is a pure
/// transform: saved HTML in, PDF file out.
#[derive(Debug, Clone)]
pub struct PdfEngine {
    kind: EngineKind,
    path: PathBuf,
}

impl PdfEngine {
    /// Probes PATH, preferring wkhtmltopdf over a headless browser.
    pub fn discover() -> Option<Self> {
        if let Some(path) = find_in_path(WKHTMLTOPDF_CANDIDATES) {
            return Some(Self {
                kind: EngineKind::Wkhtmltopdf,
                path,
            });
        }
        if let Some(path) = find_in_path(BROWSER_CANDIDATES) {
            return Some(Self {
                kind: EngineKind::HeadlessBrowser,
                path,
            });
        }
        None
    }

    pub fn describe(&self) -> String {
        self.path.display().to_string()
    }

    /// Converts `html_path` to `pdf_path`. The engine must exit cleanly
    /// AND produce a non-empty file for the conversion to count.
    pub async fn convert(&self, html_path: &Path, pdf_path: &Path) -> Result<(), ConvertError> {
        let output = match self.kind {
            EngineKind::Wkhtmltopdf => {
                Command::new(&self.path)
                    .arg("--quiet")
                    .arg("--enable-local-file-access")
                    .arg("--load-error-handling")
                    .arg("ignore")
                    .arg("--load-media-error-handling")
                    .arg("ignore")
                    .arg("--page-size")
                    .arg("Letter")
                    .arg(html_path)
                    .arg(pdf_path)
                    .output()
                    .await?
            }
            EngineKind::HeadlessBrowser => {
                let file_url = format!("file://{}", html_path.canonicalize()?.display());
                Command::new(&self.path)
                    .arg("--headless")
                    .arg("--disable-gpu")
                    .arg("--no-sandbox")
                    .arg("--disable-dev-shm-usage")
                    .arg("--allow-file-access-from-files")
                    .arg("--virtual-time-budget=15000")
                    .arg(format!("--print-to-pdf={}", pdf_path.display()))
                    .arg(file_url)
                    .output()
                    .await?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ConvertError::EngineFailed(if stderr.is_empty() {
                format!("{} exited with {}", self.path.display(), output.status)
            } else {
                stderr
            }));
        }
        let produced = pdf_path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        if !produced {
            return Err(ConvertError::EngineFailed(format!(
                "{} produced no output",
                pdf_path.display()
            )));
        }
        Ok(())
    }
}

fn find_in_path(candidates: &[&str]) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for candidate in candidates {
        for dir in env::split_paths(&path_var) {
            let full = dir.join(candidate);
            if full.is_file() {
                return Some(full);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_binaries_are_not_found() {
        assert!(find_in_path(&["definitely-not-a-real-pdf-engine"]).is_none());
    }

    #[test]
    fn discover_does_not_panic() {
        // Engine availability depends on the host; only the probe itself is checked.
        let _ = PdfEngine::discover();
    }
}
