// Human and machine readable pass reports.

use crate::pipeline::PassSummary;
use colored::Colorize;
use mailshield_scanner::RiskLevel;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

pub fn render_report(summary: &PassSummary, format: ReportFormat) -> Result<String, String> {
    match format {
        ReportFormat::Text => Ok(generate_scan_report(summary)),
        ReportFormat::Json => serde_json::to_string_pretty(summary)
            .map_err(|e| format!("Failed to serialize report: {}", e)),
    }
}

fn level_label(level: RiskLevel) -> String {
    let label = level.as_str().to_uppercase();
    match level {
        RiskLevel::High => label.red().bold().to_string(),
        RiskLevel::Medium => label.yellow().bold().to_string(),
        RiskLevel::Low => label.yellow().to_string(),
        RiskLevel::Safe => label.green().to_string(),
    }
}

pub fn generate_scan_report(summary: &PassSummary) -> String {
    let divider = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
    let mut report = String::new();
    report.push_str(divider);
    report.push_str("\n\n# Summary:\n");
    report.push_str(&format!("  Links scanned: {}\n", summary.candidates));
    report.push_str(&format!("  Links flagged: {}\n", summary.annotated));
    report.push_str(&format!("  Links clean: {}\n", summary.silent));
    report.push_str(&format!("  Scan failures: {}\n", summary.failed));
    if summary.detached > 0 {
        report.push_str(&format!("  Removed before result: {}\n", summary.detached));
    }
    report.push_str(&format!("  High-risk alerts: {}\n", summary.toasts));
    report.push('\n');
    report.push_str(divider);
    report.push_str("\n\n");

    if summary.findings.is_empty() {
        report.push_str("No risky links found.\n");
    } else {
        report.push_str("## Flagged links\n");
        let mut findings: Vec<_> = summary.findings.iter().collect();
        findings.sort_by(|a, b| b.risk_score.cmp(&a.risk_score).then(a.url.cmp(&b.url)));

        for finding in findings {
            report.push_str(&format!(
                "  {:>3} {} {}\n",
                finding.risk_score,
                level_label(finding.risk_level),
                finding.url
            ));
            for reason in &finding.reasons {
                report.push_str(&format!("        - {}\n", reason));
            }
        }
    }

    if !summary.failures.is_empty() {
        report.push_str("\n## Not scanned (request failed)\n");
        for url in &summary.failures {
            report.push_str(&format!("  {}\n", url.bright_black()));
        }
    }

    report
}
