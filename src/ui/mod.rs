use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::{FixBundle, Health, ScanRecord, ScanSummary, Stage};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdin_is_tty: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "next:");
    let _ = writeln!(
        stderr,
        "  - re-run with `--verbose` for raw tool output where available"
    );
    let _ = writeln!(
        stderr,
        "  - check that the backend is reachable (`sentra health`) or see `sentra --help`"
    );
}

pub fn print_result_card(
    record: &ScanRecord,
    fixes: Option<&FixBundle>,
    cfg: &UiConfig,
) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let scan_id = record.scan_id.as_deref().unwrap_or("unknown");
    let _ = writeln!(out, "Scan report: {} ({scan_id})", record.target);
    let _ = writeln!(out, "- status: {}", record.status);
    if let Some(created) = &record.created_at {
        let _ = writeln!(out, "- started: {}", format_timestamp(created));
    }
    if let Some(completed) = &record.completed_at {
        let _ = writeln!(out, "- completed: {}", format_timestamp(completed));
    }
    if let Some(score) = record.risk_score {
        let label = record.risk_label.as_deref().unwrap_or("");
        let _ = writeln!(
            out,
            "- risk score: {}/10 {}",
            format_score(score, cfg.color),
            label
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Analysis:");
    match record.analysis.as_deref() {
        Some(analysis) if !analysis.trim().is_empty() => {
            for line in analysis.trim_end().lines() {
                let _ = writeln!(out, "  {line}");
            }
        }
        _ => {
            let _ = writeln!(out, "  (no analysis available)");
        }
    }

    let _ = writeln!(out);
    match fixes {
        Some(bundle) => print_fix_bundle(&mut out, bundle, cfg),
        None => {
            let _ = writeln!(out, "Remediation: (not available)");
        }
    }

    if cfg.verbose {
        if let Some(nmap) = record.nmap.as_deref() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Raw nmap output:");
            for line in nmap.trim_end().lines() {
                let _ = writeln!(out, "  {line}");
            }
        }
        if let Some(nikto) = record.nikto.as_deref() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Raw nikto output:");
            for line in nikto.trim_end().lines() {
                let _ = writeln!(out, "  {line}");
            }
        }
    }
}

pub fn print_fixes(bundle: &FixBundle, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    print_fix_bundle(&mut out, bundle, cfg);
}

fn print_fix_bundle(out: &mut dyn Write, bundle: &FixBundle, cfg: &UiConfig) {
    let _ = writeln!(
        out,
        "Remediation ({} findings, detected OS: {}):",
        bundle.findings.len(),
        if bundle.os_detected.is_empty() {
            "unknown"
        } else {
            &bundle.os_detected
        }
    );
    if bundle.findings.is_empty() {
        let _ = writeln!(out, "  no templated fixes for this scan");
    }
    for finding in &bundle.findings {
        let severity = format_severity(&finding.severity, cfg.color);
        let _ = writeln!(
            out,
            "- {} [{severity}]: {}",
            finding.subject(),
            finding.description
        );
        for cmd in &finding.commands {
            let _ = writeln!(out, "    $ {cmd}");
        }
    }
    let ai = bundle.ai_recommendations.trim();
    if !ai.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "AI recommendations:");
        for line in ai.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }
}

pub fn print_scans_table(scans: &[ScanSummary], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    if scans.is_empty() {
        let _ = writeln!(out, "No scans recorded.");
        return;
    }

    let rows = scans.len().min(cfg.max_table_rows.max(1));
    if scans.len() > rows {
        let _ = writeln!(out, "Scans ({rows} shown / {} total):", scans.len());
    } else {
        let _ = writeln!(out, "Scans ({rows} shown):");
    }

    let label_id = "SCAN ID";
    let label_status = "STATUS";
    let label_risk = "RISK";
    let label_target = "TARGET";

    let id_w = scans
        .iter()
        .take(rows)
        .map(|s| visible_width_ansi(&s.scan_id))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_id));
    let status_w = scans
        .iter()
        .take(rows)
        .map(|s| visible_width_ansi(&s.status))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_status));
    let risk_w = visible_width_ansi(label_risk).max(4);

    let _ = writeln!(
        out,
        "{}  {}  {}  {}",
        pad_end_display(label_id, id_w),
        pad_end_display(label_status, status_w),
        pad_start_display(label_risk, risk_w),
        label_target
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}",
        "-".repeat(id_w),
        "-".repeat(status_w),
        "-".repeat(risk_w),
        "-".repeat(visible_width_ansi(label_target).max(6))
    );

    for scan in scans.iter().take(rows) {
        let risk = match scan.risk_score {
            Some(score) => format_score(score, cfg.color),
            None => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{}  {}  {}  {}",
            pad_end_display(&scan.scan_id, id_w),
            pad_end_display(&scan.status, status_w),
            pad_start_display(&risk, risk_w),
            scan.target
        );
    }
}

pub fn print_health(health: &Health, base_url: &str, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "Backend: {base_url}");
    let _ = writeln!(out, "- status: {}", health.status);
    let _ = writeln!(out, "- nmap available: {}", yes_no(health.nmap_available));
    let _ = writeln!(out, "- nikto available: {}", yes_no(health.nikto_available));
    let _ = writeln!(out, "- active scans: {}", health.active_scans);
}

fn yes_no(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}

/// One-line progress indicator used by the one-shot `scan` follow.
pub fn format_stage_line(stage: Stage) -> String {
    let total = Stage::ALL.len();
    format!("[{}/{}] {}", stage.index() + 1, total, stage.label())
}

/// Backend timestamps are RFC 3339 when they carry an offset; anything
/// else is shown as received.
pub fn format_timestamp(raw: &str) -> String {
    use time::format_description::well_known::Rfc3339;

    let display = time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
    );
    match time::OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(ts) => ts
            .to_offset(time::UtcOffset::UTC)
            .format(&display)
            .unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

pub fn format_severity(severity: &str, color: bool) -> String {
    let s = severity.trim().to_ascii_uppercase();
    let s = if s.is_empty() { "INFO".to_string() } else { s };
    if !color {
        return s;
    }
    let code = match s.as_str() {
        "CRITICAL" | "HIGH" => "31",
        "MEDIUM" => "33",
        "LOW" => "32",
        _ => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn format_score(score: f64, color: bool) -> String {
    let s = format!("{score:.1}");
    if !color {
        return s;
    }
    let code = if score >= 7.0 {
        "31"
    } else if score >= 4.0 {
        "33"
    } else {
        "32"
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_start_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat(width - w), s)
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
