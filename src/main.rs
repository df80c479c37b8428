// src/main.rs
mod convert;
mod deals;
mod edgar;
mod exhibits;
mod metadata;
mod storage;
mod utils;

use std::path::PathBuf;

use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use convert::PdfEngine;
use deals::DealRecord;
use edgar::client::apply_legacy_cik;
use edgar::EdgarClient;
use exhibits::{ExhibitLabel, ExhibitMatch};
use metadata::{CompanyMeta, DownloadStatus};
use storage::{DownloadResult, StorageManager};
use utils::error::EdgarError;
use utils::AppError;

/// Command Line Interface for the EDGAR EX-2.1 exhibit fetcher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download Exhibit 2.1 documents for a deal list or a single company
    Fetch(FetchArgs),
    /// Rebuild ex21_metadata.jsonl from the output tree
    BuildMetadata(BuildMetadataArgs),
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Deal list spreadsheet, CSV export (batch mode)
    #[arg(long = "input-xlsx")]
    input_xlsx: Option<PathBuf>,

    /// Root output directory
    #[arg(long = "save-dir")]
    save_dir: PathBuf,

    /// Which party to pull for each deal
    #[arg(long, value_enum, default_value = "both")]
    filer: Filer,

    /// Half-window in days around the announce date
    #[arg(long = "window_days", default_value_t = 60)]
    window_days: i64,

    /// Filing form type
    #[arg(long, default_value = "8-K")]
    filing: String,

    /// Include */A amended forms
    #[arg(long = "include_amends")]
    include_amends: bool,

    /// Max filings to examine per company
    #[arg(long)]
    limit: Option<usize>,

    /// Company ticker (single mode)
    #[arg(long)]
    ticker: Option<String>,

    /// Company legal name (single-mode fallback)
    #[arg(long)]
    name: Option<String>,

    /// CIK override, digits only (single mode)
    #[arg(long)]
    cik: Option<String>,

    /// Window start, YYYY-MM-DD inclusive (single mode)
    #[arg(long)]
    after: Option<NaiveDate>,

    /// Window end, YYYY-MM-DD inclusive (single mode)
    #[arg(long)]
    before: Option<NaiveDate>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Filer {
    Acquirer,
    Target,
    Both,
}

#[derive(Args, Debug)]
struct BuildMetadataArgs {
    /// Output root to scan
    #[arg(long = "save-dir")]
    save_dir: PathBuf,

    /// Metadata file to write (default: <save-dir>/ex21_metadata.jsonl)
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Terminal state of one company within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    TickerNotFound,
    ExhibitNotFound,
    Failed,
}

#[derive(Debug, Default)]
struct OutcomeCounts {
    success: usize,
    ticker_not_found: usize,
    exhibit_not_found: usize,
    failed: usize,
}

impl OutcomeCounts {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::TickerNotFound => self.ticker_not_found += 1,
            Outcome::ExhibitNotFound => self.exhibit_not_found += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// One side of a deal (acquirer or target), with the counterparty's
/// identifiers available as resolution fallbacks.
struct SideSpec<'a> {
    role: &'static str,
    cik: Option<&'a str>,
    ticker: Option<&'a str>,
    alt_ticker: Option<&'a str>,
    name: Option<&'a str>,
    alt_name: Option<&'a str>,
    acquirer: Option<&'a str>,
    target: Option<&'a str>,
}

impl SideSpec<'_> {
    fn best_identifier(&self) -> &str {
        self.ticker
            .or(self.alt_ticker)
            .or(self.name)
            .or(self.alt_name)
            .or(self.cik)
            .unwrap_or("unknown")
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    utils::logging::setup_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Fetch(args) => run_fetch(args).await,
        Command::BuildMetadata(args) => run_build_metadata(args),
    }
}

fn run_build_metadata(args: BuildMetadataArgs) -> Result<(), AppError> {
    if !args.save_dir.is_dir() {
        return Err(AppError::Config(format!(
            "save dir {} does not exist",
            args.save_dir.display()
        )));
    }
    let output = args
        .output
        .unwrap_or_else(|| args.save_dir.join(metadata::METADATA_FILE));
    let written = metadata::build(&args.save_dir, &output)?;
    tracing::info!("Wrote {} metadata records to {}", written, output.display());
    Ok(())
}

async fn run_fetch(args: FetchArgs) -> Result<(), AppError> {
    let storage = StorageManager::new(&args.save_dir)?;
    tracing::info!("Output root: {}", storage.base_dir().display());

    let client = EdgarClient::new()?;
    let engine = PdfEngine::discover();
    match &engine {
        Some(engine) => tracing::info!("PDF engine: {}", engine.describe()),
        None => tracing::warn!("No PDF engine on PATH; exhibits will be kept as HTML only"),
    }

    match args.input_xlsx.clone() {
        Some(path) => run_batch(&args, &path, &client, &storage, engine.as_ref()).await,
        None => run_single(&args, &client, &storage, engine.as_ref()).await,
    }
}

async fn run_batch(
    args: &FetchArgs,
    path: &std::path::Path,
    client: &EdgarClient,
    storage: &StorageManager,
    engine: Option<&PdfEngine>,
) -> Result<(), AppError> {
    let deals = deals::load_deals(path)?;
    tracing::info!("Loaded {} deals from {}", deals.len(), path.display());

    let mut counts = OutcomeCounts::default();
    for deal in &deals {
        let after = deal.announce_date - Duration::days(args.window_days);
        let before = deal.announce_date + Duration::days(args.window_days);
        for side in deal_sides(deal, args.filer) {
            tracing::info!(
                "Row {} [{}] {} | window {}..{}",
                deal.row,
                side.role,
                side.best_identifier(),
                after,
                before
            );
            let outcome =
                process_side(args, client, storage, engine, &side, deal.announce_date, after, before)
                    .await;
            counts.tally(outcome);
        }
    }

    tracing::info!(
        "Batch complete. Success: {}, tickers not found: {}, exhibits not found: {}, failed: {}",
        counts.success,
        counts.ticker_not_found,
        counts.exhibit_not_found,
        counts.failed
    );
    Ok(())
}

async fn run_single(
    args: &FetchArgs,
    client: &EdgarClient,
    storage: &StorageManager,
    engine: Option<&PdfEngine>,
) -> Result<(), AppError> {
    if args.ticker.is_none() && args.name.is_none() && args.cik.is_none() {
        return Err(AppError::Config(
            "provide --input-xlsx (batch) or --ticker/--name/--cik (single)".to_string(),
        ));
    }
    let (Some(after), Some(before)) = (args.after, args.before) else {
        return Err(AppError::Config(
            "single mode requires --after and --before".to_string(),
        ));
    };

    let resolved = if let Some(cik) = &args.cik {
        let Some(cik) = deals::normalize_cik(cik) else {
            return Err(AppError::Config("--cik must be digits only".to_string()));
        };
        let label = args
            .ticker
            .as_deref()
            .map(str::to_uppercase)
            .unwrap_or_else(|| cik.clone());
        tracing::info!("Using provided CIK: {}", cik);
        Some((cik, label))
    } else {
        let mut found = None;
        if let Some(ticker) = &args.ticker {
            let ticker = ticker.to_uppercase();
            if let Some(cik) = client.cik_for_ticker(&ticker).await? {
                found = Some((apply_legacy_cik(&ticker, after, cik), ticker));
            }
        }
        if found.is_none() {
            if let Some(name) = &args.name {
                if let Some(cik) = client.cik_for_name(name).await? {
                    found = Some((cik, name.clone()));
                }
            }
        }
        found
    };

    let Some((cik, label)) = resolved else {
        let entry = args
            .ticker
            .as_deref()
            .or(args.name.as_deref())
            .unwrap_or("unknown");
        storage.record_ticker_not_found(entry)?;
        tracing::warn!("No CIK found for {}", entry);
        return Ok(());
    };

    let outcome =
        fetch_company(args, client, storage, engine, &cik, &label, None, None, after, before).await;
    tracing::info!("Done: {:?}", outcome);
    Ok(())
}

fn deal_sides(deal: &DealRecord, filer: Filer) -> Vec<SideSpec<'_>> {
    let mut sides = Vec::new();
    if matches!(filer, Filer::Acquirer | Filer::Both) {
        sides.push(SideSpec {
            role: "acquirer",
            cik: deal.acquirer_cik.as_deref(),
            ticker: deal.acquirer_ticker.as_deref(),
            alt_ticker: deal.target_ticker.as_deref(),
            name: deal.acquirer.as_deref(),
            alt_name: deal.target.as_deref(),
            acquirer: deal.acquirer.as_deref(),
            target: deal.target.as_deref(),
        });
    }
    if matches!(filer, Filer::Target | Filer::Both) {
        sides.push(SideSpec {
            role: "target",
            cik: deal.target_cik.as_deref(),
            ticker: deal.target_ticker.as_deref(),
            alt_ticker: deal.acquirer_ticker.as_deref(),
            name: deal.target.as_deref(),
            alt_name: deal.acquirer.as_deref(),
            acquirer: deal.acquirer.as_deref(),
            target: deal.target.as_deref(),
        });
    }
    sides
}

/// Resolution cascade for one side: explicit CIK column, own ticker,
/// counterparty ticker, own name, counterparty name.
async fn resolve_side(
    client: &EdgarClient,
    side: &SideSpec<'_>,
    announce: NaiveDate,
) -> Result<Option<(String, String)>, EdgarError> {
    if let Some(cik) = side.cik {
        let label = side
            .ticker
            .or(side.alt_ticker)
            .or(side.name)
            .or(side.alt_name)
            .unwrap_or(cik)
            .to_string();
        return Ok(Some((cik.to_string(), label)));
    }
    for ticker in [side.ticker, side.alt_ticker].into_iter().flatten() {
        if let Some(cik) = client.cik_for_ticker(ticker).await? {
            let cik = apply_legacy_cik(ticker, announce, cik);
            return Ok(Some((cik, ticker.to_string())));
        }
        tracing::debug!("Ticker {} not in SEC mapping", ticker);
    }
    for name in [side.name, side.alt_name].into_iter().flatten() {
        if let Some(cik) = client.cik_for_name(name).await? {
            let label = side.ticker.or(side.alt_ticker).unwrap_or(name).to_string();
            return Ok(Some((cik, label)));
        }
        tracing::debug!("No company-search match for {:?}", name);
    }
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn process_side(
    args: &FetchArgs,
    client: &EdgarClient,
    storage: &StorageManager,
    engine: Option<&PdfEngine>,
    side: &SideSpec<'_>,
    announce: NaiveDate,
    after: NaiveDate,
    before: NaiveDate,
) -> Outcome {
    let resolved = match resolve_side(client, side, announce).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("[{}] resolution failed: {}", side.role, e);
            return Outcome::Failed;
        }
    };
    let Some((cik, label)) = resolved else {
        let entry = side.best_identifier();
        if let Err(e) = storage.record_ticker_not_found(entry) {
            tracing::error!("Failed to record unresolved ticker {}: {}", entry, e);
        }
        tracing::warn!("[{}] no CIK for {}", side.role, entry);
        return Outcome::TickerNotFound;
    };
    fetch_company(
        args,
        client,
        storage,
        engine,
        &cik,
        &label,
        side.acquirer,
        side.target,
        after,
        before,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn fetch_company(
    args: &FetchArgs,
    client: &EdgarClient,
    storage: &StorageManager,
    engine: Option<&PdfEngine>,
    cik: &str,
    label: &str,
    acquirer: Option<&str>,
    target: Option<&str>,
    after: NaiveDate,
    before: NaiveDate,
) -> Outcome {
    let filings = match client
        .find_filings(cik, after, before, &args.filing, args.include_amends, args.limit)
        .await
    {
        Ok(filings) => filings,
        Err(e) => {
            tracing::error!("{}: filing search failed: {}", label, e);
            return Outcome::Failed;
        }
    };
    tracing::info!("{}: {} {} filing(s) in window", label, filings.len(), args.filing);

    // First filing with an EX-2.1 wins and scanning stops; the first
    // EX-10.1 seen anywhere is kept as a fallback.
    let mut matched: Option<ExhibitMatch> = None;
    let mut fallback: Option<ExhibitMatch> = None;
    for filing in &filings {
        let names = match client.fetch_manifest(filing).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(
                    "{}: manifest fetch failed for {}: {}",
                    label,
                    filing.accession_number,
                    e
                );
                continue;
            }
        };
        let scan = exhibits::scan_manifest(&names);
        if scan.extra_primaries > 0 {
            tracing::warn!(
                "{}: {} additional Exhibit 2.1 candidate(s) in {}, taking the first",
                label,
                scan.extra_primaries,
                filing.accession_number
            );
        }
        if let Some(doc) = scan.primary {
            matched = Some(ExhibitMatch {
                document_url: filing.document_url(&doc),
                document_filename: doc,
                filing: filing.clone(),
                label: ExhibitLabel::Ex21,
            });
            break;
        }
        if fallback.is_none() {
            if let Some(doc) = scan.fallback {
                fallback = Some(ExhibitMatch {
                    document_url: filing.document_url(&doc),
                    document_filename: doc,
                    filing: filing.clone(),
                    label: ExhibitLabel::Ex101,
                });
            }
        }
    }

    let Some(exhibit) = matched.or(fallback) else {
        if let Err(e) = storage.record_missing_exhibit(label, cik, after, before) {
            tracing::error!("Failed to record missing exhibit for {}: {}", label, e);
        }
        tracing::warn!("{}: no Exhibit 2.1 in window {}..{}", label, after, before);
        return Outcome::ExhibitNotFound;
    };
    if exhibit.label == ExhibitLabel::Ex101 {
        tracing::warn!(
            "{}: no EX-2.1 found, using EX-10.1 fallback {}",
            label,
            exhibit.document_filename
        );
    }

    let result = fetch_and_convert(client, storage, engine, label, &exhibit).await;
    if result.status == DownloadStatus::DownloadFailed {
        return Outcome::Failed;
    }

    let meta = CompanyMeta {
        label: label.to_string(),
        acquirer: acquirer.map(str::to_string),
        target: target.map(str::to_string),
        cik: Some(cik.to_string()),
        status: result.status,
        fetched_at: Utc::now().to_rfc3339(),
    };
    if let Err(e) = storage.write_company_meta(label, &meta) {
        tracing::error!("Failed to write company metadata for {}: {}", label, e);
    }

    match &result.pdf_path {
        Some(pdf) => tracing::info!(
            "{}: done, {} + {}",
            label,
            result.htm_path.display(),
            pdf.display()
        ),
        None => tracing::info!(
            "{}: done (HTML only) in {}",
            label,
            result.company_dir.display()
        ),
    }
    Outcome::Success
}

/// Downloads the exhibit and converts it to PDF. Both steps are skipped
/// for artifacts that already exist, so re-runs are idempotent.
async fn fetch_and_convert(
    client: &EdgarClient,
    storage: &StorageManager,
    engine: Option<&PdfEngine>,
    label: &str,
    exhibit: &ExhibitMatch,
) -> DownloadResult {
    let (htm_path, pdf_path) = storage.exhibit_paths(
        label,
        exhibit.label,
        &exhibit.filing.accession_number,
        &exhibit.document_filename,
    );
    let company_dir = storage.company_dir(label);

    if htm_path.exists() {
        tracing::info!("{}: {} already present", label, htm_path.display());
    } else {
        let bytes = match client.download_document(&exhibit.document_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("{}: download failed for {}: {}", label, exhibit.document_url, e);
                return DownloadResult {
                    company_dir,
                    htm_path,
                    pdf_path: None,
                    status: DownloadStatus::DownloadFailed,
                };
            }
        };
        if let Err(e) = storage.write_exhibit(&htm_path, &bytes) {
            tracing::error!("{}: failed to write {}: {}", label, htm_path.display(), e);
            return DownloadResult {
                company_dir,
                htm_path,
                pdf_path: None,
                status: DownloadStatus::DownloadFailed,
            };
        }
        tracing::info!(
            "{}: saved {} ({:.1} KB)",
            label,
            htm_path.display(),
            bytes.len() as f64 / 1024.0
        );
    }

    if pdf_path.exists() {
        return DownloadResult {
            company_dir,
            htm_path,
            pdf_path: Some(pdf_path),
            status: DownloadStatus::Ok,
        };
    }
    match engine {
        Some(engine) => match engine.convert(&htm_path, &pdf_path).await {
            Ok(()) => {
                tracing::info!("{}: wrote {}", label, pdf_path.display());
                DownloadResult {
                    company_dir,
                    htm_path,
                    pdf_path: Some(pdf_path),
                    status: DownloadStatus::Ok,
                }
            }
            Err(e) => {
                // Degraded, not fatal: the HTML artifact is kept.
                tracing::warn!("{}: PDF conversion failed, keeping HTML: {}", label, e);
                DownloadResult {
                    company_dir,
                    htm_path,
                    pdf_path: None,
                    status: DownloadStatus::ConvertFailed,
                }
            }
        },
        None => {
            tracing::warn!("{}: {}", label, utils::error::ConvertError::NoEngine);
            DownloadResult {
                company_dir,
                htm_path,
                pdf_path: None,
                status: DownloadStatus::ConvertFailed,
            }
        }
    }
}
