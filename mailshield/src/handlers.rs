use anyhow::{Context, Result};
use colored::Colorize;
use mailshield_core::config::PipelineConfig;
use mailshield_core::dom::{self, MemoryDocument};
use mailshield_core::pipeline::{PassSummary, ScanPipeline};
use mailshield_core::toast::ToastedUrlSet;
use mailshield_scanner::{HttpRiskClient, RiskLevel, RiskScorer, ScanResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

// Helper functions for the scan and check handlers

/// Resolve the configuration: file (explicit or default location), then CLI overrides.
pub fn effective_config(
    config_path: Option<&PathBuf>,
    backend: Option<&str>,
) -> Result<PipelineConfig, String> {
    let mut config =
        PipelineConfig::load(config_path.map(PathBuf::as_path)).map_err(|e| e.to_string())?;

    if let Some(backend) = backend {
        config.backend_url = backend.trim().to_string();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Load a saved page into an in-memory document.
pub fn load_page(path: &Path, page_url: Option<&Url>) -> Result<MemoryDocument, String> {
    let html = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read page {}: {}", path.display(), e))?;

    if html.trim().is_empty() {
        return Err(format!("Page {} is empty", path.display()));
    }

    Ok(MemoryDocument::parse(&html, page_url.cloned()))
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let candidate = if line.contains("://") {
        line.to_string()
    } else {
        format!("https://{}", line)
    };

    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some_and(|h| h.contains('.')) => Some(url.to_string()),
        _ => None,
    }
}

/// Run one pass over a loaded page. Returns the summary and the annotated HTML.
pub async fn scan_document<S>(
    document: MemoryDocument,
    scorer: Arc<S>,
    config: &PipelineConfig,
) -> Result<(PassSummary, String)>
where
    S: RiskScorer + 'static,
{
    let shared = dom::share(document);
    let pipeline = ScanPipeline::new(shared.clone(), scorer, config, ToastedUrlSet::new())
        .context("Invalid selector in configuration")?;

    let summary = pipeline.scan_pass().await;
    let html = dom::lock(&shared).to_html();
    Ok((summary, html))
}

pub fn build_client(config: &PipelineConfig) -> Result<HttpRiskClient> {
    HttpRiskClient::with_timeout(&config.backend_url, config.request_timeout_secs)
        .context("Failed to create threat API client")
}

pub fn format_check_result(result: &ScanResult) -> String {
    let level = result.risk_level().as_str().to_uppercase();
    let level = match result.risk_level() {
        RiskLevel::High => level.red().bold(),
        RiskLevel::Medium => level.yellow().bold(),
        RiskLevel::Low => level.yellow(),
        RiskLevel::Safe => level.green().bold(),
    };

    let mut out = format!(
        "{} {}\n  Score: {}\n",
        level,
        result.url().bright_white(),
        result.risk_score()
    );
    if result.reasons().is_empty() {
        out.push_str("  No risk indicators reported\n");
    } else {
        out.push_str("  Reasons:\n");
        for reason in result.reasons() {
            out.push_str(&format!("    - {}\n", reason));
        }
    }
    out
}

pub fn print_banner() {
    println!(
        "{}",
        r#"
  __  __       _ _  _____ _     _      _     _
 |  \/  | __ _(_) |/ ____| |__ (_) ___| | __| |
 | |\/| |/ _` | | |\___ \| '_ \| |/ _ \ |/ _` |
 | |  | | (_| | | | ___) | | | | |  __/ | (_| |
 |_|  |_|\__,_|_|_||____/|_| |_|_|\___|_|\__,_|
"#
        .bright_blue()
        .bold()
    );
    println!(
        "  {} v{}\n",
        "phishing link guard".bright_white(),
        env!("CARGO_PKG_VERSION")
    );
}

pub fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}
