//! Text-mode display logic for the handle-check CLI.
//!
//! Colored result lines, grouped `--pretty` output, the spinner, headers and
//! summaries. Uses only the `console` crate; colors switch off on their own
//! when stdout is not a terminal.

use console::{pad_str, style, Alignment, Term};
use handle_check_lib::{BatchSummary, ProbeOutcome, QueryStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner with the given message. Returns `None` when stderr is
    /// not a terminal.
    pub fn start(message: String) -> Option<Self> {
        let term = Term::stderr();
        if !term.is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(username: &str, site_count: usize, concurrency: usize, keywords: &[String]) {
    println!(
        "{} {} {}",
        style("handle-check").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "· Searching '{}' across {} site{}",
            username,
            site_count,
            if site_count == 1 { "" } else { "s" }
        ))
        .dim(),
    );

    let mut meta_parts = vec![format!("Concurrency: {}", concurrency)];
    if !keywords.is_empty() {
        meta_parts.push(format!("Keywords: {}", keywords.join(", ")));
    }
    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Single result line ───────────────────────────────────────────────────────

/// Plain text for one outcome, e.g. `[+] GitHub: https://github.com/alice`.
///
/// With keywords in use, claimed profiles whose body matched are tagged.
pub fn outcome_line(outcome: &ProbeOutcome, keywords_in_use: bool) -> String {
    match outcome.status {
        QueryStatus::Claimed => {
            if keywords_in_use && !outcome.matched_keywords.is_empty() {
                format!(
                    "[+] [keyword] {}: {} ({})",
                    outcome.site,
                    outcome.url,
                    outcome.matched_keywords.join(", ")
                )
            } else {
                format!("[+] {}: {}", outcome.site, outcome.url)
            }
        }
        QueryStatus::Available => format!("[-] {}: Not Found", outcome.site),
        QueryStatus::Unknown => format!("[?] {}: Unknown {}", outcome.site, brief_error(outcome)),
        QueryStatus::Illegal => format!("[!] {}: Illegal username format", outcome.site),
    }
}

/// Print one outcome with color.
///
/// If `counter` is Some((current, total)), a progress prefix like `[3/8]` is shown.
pub fn print_outcome(
    outcome: &ProbeOutcome,
    keywords_in_use: bool,
    debug: bool,
    counter: Option<(usize, usize)>,
) {
    let prefix = match counter {
        Some((cur, total)) => format!("{} ", style(format!("[{}/{}]", cur, total)).dim()),
        None => String::new(),
    };

    let line = outcome_line(outcome, keywords_in_use);
    let styled = match outcome.status {
        QueryStatus::Claimed => style(line).green(),
        QueryStatus::Available => style(line).dim(),
        QueryStatus::Unknown => style(line).yellow(),
        QueryStatus::Illegal => style(line).magenta(),
    };
    println!("{}{}", prefix, styled);

    if debug {
        print_debug_detail(outcome, "    ");
    }
}

fn print_debug_detail(outcome: &ProbeOutcome, indent: &str) {
    if let Some(elapsed) = outcome.elapsed {
        let http = outcome
            .http_status
            .map(|s| format!("HTTP {}", s))
            .unwrap_or_else(|| "no response".to_string());
        println!(
            "{}{} {} in {}ms",
            indent,
            style("└─").dim(),
            http,
            elapsed.as_millis(),
        );
    }
    if let Some(message) = &outcome.error_message {
        println!("{}{} {}", indent, style("└─").dim(), style(message).dim());
    }
}

// ── Grouped batch output ─────────────────────────────────────────────────────

/// Whether an outcome gets a line of its own.
///
/// Without `print_all` only claimed sites are listed, and when keywords are
/// in use only those whose profile mentions one of them.
pub fn should_list(outcome: &ProbeOutcome, keywords_in_use: bool, print_all: bool) -> bool {
    if print_all {
        return true;
    }
    outcome.status == QueryStatus::Claimed
        && (!keywords_in_use || !outcome.matched_keywords.is_empty())
}

/// Print outcomes grouped by status. Empty sections are omitted, and only
/// the outcomes `should_list` accepts are shown.
pub fn print_grouped_results(
    outcomes: &[&ProbeOutcome],
    keywords_in_use: bool,
    print_all: bool,
    debug: bool,
) {
    let sections = [
        (QueryStatus::Claimed, "Found"),
        (QueryStatus::Available, "Not Found"),
        (QueryStatus::Unknown, "Unknown"),
        (QueryStatus::Illegal, "Illegal"),
    ];

    for (status, title) in sections {
        if status != QueryStatus::Claimed && !print_all {
            continue;
        }

        let group: Vec<&ProbeOutcome> = outcomes
            .iter()
            .copied()
            .filter(|o| o.status == status && should_list(o, keywords_in_use, print_all))
            .collect();
        if group.is_empty() {
            continue;
        }

        let heading = format!("── {} ({}) ", title, group.len());
        let rule = "─".repeat(48usize.saturating_sub(heading.chars().count()));
        let heading = match status {
            QueryStatus::Claimed => style(heading).green().bold(),
            QueryStatus::Available => style(heading).dim().bold(),
            QueryStatus::Unknown => style(heading).yellow().bold(),
            QueryStatus::Illegal => style(heading).magenta().bold(),
        };
        println!("  {} {}", heading, style(rule).dim());

        for outcome in group {
            print_grouped_line(outcome, keywords_in_use, debug);
        }
        println!();
    }
}

/// Print a single line inside a grouped section.
fn print_grouped_line(outcome: &ProbeOutcome, keywords_in_use: bool, debug: bool) {
    let padded = pad_str(&outcome.site, 24, Alignment::Left, Some(".."));

    match outcome.status {
        QueryStatus::Claimed => {
            let tag = if keywords_in_use && !outcome.matched_keywords.is_empty() {
                format!("  {}", style(outcome.matched_keywords.join(", ")).cyan())
            } else {
                String::new()
            };
            println!("    {}  {}{}", style(&padded).white(), outcome.url, tag);
        }
        QueryStatus::Unknown => {
            println!(
                "    {}  {}",
                style(&padded).white(),
                style(brief_error(outcome)).dim()
            );
        }
        QueryStatus::Available | QueryStatus::Illegal => {
            println!("    {}", style(&padded).white());
        }
    }

    if debug {
        print_debug_detail(outcome, "      ");
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Plain summary line with the found count and elapsed seconds.
pub fn summary_line(username: &str, summary: &BatchSummary) -> String {
    format!(
        "[*] Found {} account{} for '{}' across {} site{} in {:.2}s",
        summary.claimed,
        if summary.claimed == 1 { "" } else { "s" },
        username,
        summary.total,
        if summary.total == 1 { "" } else { "s" },
        summary.elapsed.as_secs_f64(),
    )
}

/// Print the final summary with colored counts.
pub fn print_summary(username: &str, summary: &BatchSummary, keywords_in_use: bool, pretty: bool) {
    if pretty {
        println!(
            "  {}",
            style("────────────────────────────────────────────────────").dim()
        );
        println!(
            "  {} site{} in {:.1}s  {}  {}  {}  {}  {}  {}",
            style(summary.total).bold(),
            if summary.total == 1 { "" } else { "s" },
            summary.elapsed.as_secs_f64(),
            style("|").dim(),
            style(format!("{} found", summary.claimed)).green(),
            style("|").dim(),
            style(format!("{} not found", summary.available)).dim(),
            style("|").dim(),
            style(format!("{} unknown", summary.unknown)).yellow(),
        );
    } else {
        println!("{}", style(summary_line(username, summary)).bold());
    }

    if keywords_in_use {
        println!(
            "{}",
            style(format!(
                "[*] With keyword matches: {}",
                summary.keyword_matched
            ))
            .cyan()
        );
    }
}

// ── Unknown summary ──────────────────────────────────────────────────────────

/// Sites that could not be checked, truncated after `max_show` names.
pub fn format_unknown_sites(summary: &BatchSummary, max_show: usize) -> String {
    let sites = &summary.unknown_sites;
    if sites.len() <= max_show {
        sites.join(", ")
    } else {
        let remaining = sites.len() - max_show;
        format!("{}, ... and {} more", sites[..max_show].join(", "), remaining)
    }
}

/// Print which sites came back unknown.
pub fn print_unknown_summary(summary: &BatchSummary, debug: bool) {
    if !summary.has_unknown() {
        return;
    }

    let max_show = if debug { usize::MAX } else { 5 };
    println!(
        "  {} {} site{} could not be checked: {}",
        style("•").dim(),
        summary.unknown,
        if summary.unknown == 1 { "" } else { "s" },
        format_unknown_sites(summary, max_show),
    );
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Extract a brief reason from an outcome with unknown status.
fn brief_error(outcome: &ProbeOutcome) -> &'static str {
    match &outcome.error_message {
        Some(msg) => {
            let m = msg.to_lowercase();
            if m.contains("timeout") || m.contains("timed out") {
                "(timeout)"
            } else if m.contains("network") || m.contains("dns") || m.contains("connect") {
                "(network error)"
            } else if m.contains("parse") || m.contains("body") {
                "(unreadable response)"
            } else if m.contains("regexcheck") || m.contains("catalog") {
                "(bad site entry)"
            } else if m.contains("classified") {
                "(unclassifiable response)"
            } else {
                "(error)"
            }
        }
        None => "(unknown status)",
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
