use crate::model::{ScanResult, Severity};
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Summary")]
    summary: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn print_cli_table(result: &ScanResult) -> Result<()> {
    print!("{}", render_table(result, true));
    Ok(())
}

/// Renders the human-readable report. `color` wraps severities in ANSI codes.
pub fn render_table(result: &ScanResult, color: bool) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "Scanned {} at {}\n",
        result.repository,
        result.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "{} manifest files, {} packages\n\n",
        result.files_scanned.len(),
        result.summary.total_packages
    ));

    if result.vulnerabilities.is_empty() {
        out.push_str("No known vulnerabilities found.\n");
    } else {
        out.push_str(&format!(
            "Found {} vulnerabilities:\n\n",
            result.vulnerabilities.len()
        ));

        let rows: Vec<VulnRow> = result
            .vulnerabilities
            .iter()
            .map(|v| VulnRow {
                severity: format_severity(v.severity, color),
                score: v
                    .cvss_score
                    .map(|s| format!("{s:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
                package: format!(
                    "{} ({})",
                    truncate(&v.affected_package.to_string(), 40),
                    v.affected_package.ecosystem.display_name()
                ),
                id: v.id.clone(),
                summary: truncate(&v.summary, 50),
                fixed_in: v.fixed_version.clone().unwrap_or_else(|| "-".to_string()),
            })
            .collect();

        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    if !result.malformed_manifests.is_empty() {
        out.push_str("\nPartially parsed manifests:\n");
        for issue in &result.malformed_manifests {
            out.push_str(&format!(
                "  {}: {} ({} skipped)\n",
                issue.path, issue.reason, issue.skipped
            ));
        }
    }

    if !result.failed_packages.is_empty() {
        out.push_str(&format!(
            "\nCould not query {} packages:\n\n",
            result.failed_packages.len()
        ));
        let rows: Vec<FailureRow> = result
            .failed_packages
            .iter()
            .map(|f| FailureRow {
                package: f.package.to_string(),
                reason: truncate(&f.reason, 60),
            })
            .collect();
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&render_summary(result));
    out
}

fn render_summary(result: &ScanResult) -> String {
    let summary = &result.summary;
    let mut out = String::from("Summary:\n");

    out.push_str(&format!("  Total packages: {}\n", summary.total_packages));
    if result.ecosystems.len() > 1 {
        let breakdown: Vec<String> = result
            .ecosystems
            .iter()
            .map(|(eco, count)| format!("{} {}", count, eco.display_name()))
            .collect();
        out.push_str(&format!("  By ecosystem: {}\n", breakdown.join(", ")));
    }

    if summary.total_vulnerabilities > 0 {
        out.push_str(&format!(
            "  Vulnerabilities: {} critical, {} high, {} medium, {} low, {} unknown\n",
            summary.critical, summary.high, summary.medium, summary.low, summary.unknown
        ));
        out.push_str(&format!(
            "  Vulnerable packages: {}\n",
            summary.vulnerable_packages
        ));
    }

    if result.is_complete() {
        out.push_str("  Scan complete.\n");
    } else {
        out.push_str(&format!(
            "  Scan incomplete: {} queries failed, {} manifests partially parsed. Results may be missing.\n",
            summary.failed_queries,
            result.malformed_manifests.len()
        ));
    }
    out
}

fn format_severity(severity: Severity, color: bool) -> String {
    if !color {
        return severity.as_str().to_string();
    }
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
