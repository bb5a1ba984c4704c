//! Terminal output for the modelgen CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use modelgen_core::{display_path, FileStatus, FormattingReport, HealthStatus, Reporter};

pub mod colors {
    use console::Color;

    pub const CYAN: Color = Color::Color256(51);
    pub const MAGENTA: Color = Color::Color256(201);
    pub const YELLOW: Color = Color::Color256(220);
    pub const NEON_GREEN: Color = Color::Color256(82);
    pub const DIM: Color = Color::Color256(240);
}

pub mod symbols {
    pub const DIAMOND: &str = "\u{25C6}"; // ◆
    pub const DIAMOND_OUTLINE: &str = "\u{25C7}"; // ◇
    pub const TARGET_FILLED: &str = "\u{25C9}"; // ◉
    pub const TRIANGLE: &str = "\u{25B8}"; // ▸
    pub const DOT: &str = "\u{00B7}"; // ·
}

const PANEL_WIDTH: usize = 55;

fn mark(symbol: &str, color: console::Color, msg: &str) {
    println!("  {} {}", style(symbol).fg(color), msg);
}

pub fn success(msg: &str) {
    mark(symbols::TARGET_FILLED, colors::NEON_GREEN, msg);
}

pub fn error(msg: &str) {
    mark(symbols::DIAMOND, colors::MAGENTA, &style(msg).fg(colors::MAGENTA).to_string());
}

pub fn info(msg: &str) {
    mark(symbols::DIAMOND_OUTLINE, colors::CYAN, msg);
}

pub fn dim(msg: &str) {
    println!("  {}", style(msg).fg(colors::DIM));
}

/// A steady-ticking spinner that reports pipeline notes as its message.
pub fn spinner(msg: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("  {spinner:.magenta} {msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["\u{25D0}", "\u{25D3}", "\u{25D1}", "\u{25D2}", "\u{25CF}"]); // ◐◓◑◒●
    let spinner = ProgressBar::new_spinner().with_style(style).with_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// A rounded box with a title on its top border.
pub struct Panel {
    title: String,
    lines: Vec<String>,
}

impl Panel {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, content: impl Into<String>) -> Self {
        self.lines.push(content.into());
        self
    }

    pub fn print(&self) {
        let inner = PANEL_WIDTH - 2;
        let border = |s: &str| style(s.to_string()).fg(colors::CYAN);

        let title = format!(" {} ", self.title);
        let rule = inner.saturating_sub(console::measure_text_width(&title) + 1);
        println!(
            "  {}{}{}{}",
            border("\u{256D}\u{2500}"),
            style(&title).fg(colors::CYAN).bold(),
            border("\u{2500}".repeat(rule).as_str()),
            border("\u{256E}")
        );

        for content in &self.lines {
            let pad = (inner - 1).saturating_sub(console::measure_text_width(content));
            println!("  {} {}{}{}", border("\u{2502}"), content, " ".repeat(pad), border("\u{2502}"));
        }

        println!("  {}{}{}", border("\u{2570}"), border("\u{2500}".repeat(inner).as_str()), border("\u{256F}"));
    }
}

/// One right-aligned status column followed by the path.
pub fn status_line(status: FileStatus, path: &Path) -> String {
    let label = format!("{:>12}", status.label());
    let label = match status {
        FileStatus::Create | FileStatus::Format => style(label).fg(colors::NEON_GREEN).bold(),
        FileStatus::Identical => style(label).fg(colors::CYAN),
        FileStatus::Error => style(label).fg(colors::MAGENTA).bold(),
        FileStatus::WouldCreate | FileStatus::WouldFormat => style(label).fg(colors::YELLOW),
        FileStatus::Skip => style(label).fg(colors::DIM),
    };
    format!("  {}  {}", label, path.display())
}

pub fn health_label(status: HealthStatus) -> String {
    let text = status.to_string();
    match status {
        HealthStatus::Healthy => style(text).fg(colors::NEON_GREEN).bold().to_string(),
        HealthStatus::Degraded => style(text).fg(colors::YELLOW).bold().to_string(),
        HealthStatus::Unhealthy => style(text).fg(colors::MAGENTA).bold().to_string(),
    }
}

pub fn formatting_line(report: &FormattingReport) -> String {
    if !report.would_format.is_empty() {
        return format!("{} files would be formatted", report.would_format.len());
    }
    if report.skipped {
        return "formatting skipped".to_string();
    }
    format!(
        "{} formatted {} {} batch {} {} individual {} {} fallbacks {} {} errors",
        report.processed,
        symbols::DOT,
        report.batch_operations,
        symbols::DOT,
        report.individual_operations,
        symbols::DOT,
        report.individual_fallbacks,
        symbols::DOT,
        report.errors
    )
}

pub fn timing(label: &str, elapsed: Duration) {
    info(&format!("{} in {}ms", label, elapsed.as_millis()));
}

pub fn error_header() {
    println!();
    mark(
        symbols::DIAMOND,
        colors::MAGENTA,
        &style("Generation failed.").fg(colors::MAGENTA).bold().to_string(),
    );
    println!();
}

pub fn looking_good() {
    mark(symbols::TARGET_FILLED, colors::NEON_GREEN, &style("Schema looks good.").bold().to_string());
}

/// Prints per-file statuses above a running spinner.
pub struct ConsoleReporter {
    spinner: ProgressBar,
    base: PathBuf,
}

impl ConsoleReporter {
    pub fn new(spinner: ProgressBar) -> Self {
        Self {
            spinner,
            base: std::env::current_dir().unwrap_or_default(),
        }
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Reporter for ConsoleReporter {
    fn file_status(&self, status: FileStatus, path: &Path) {
        let line = status_line(status, &display_path(path, &self.base));
        self.spinner.suspend(|| println!("{}", line));
    }

    fn note(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }
}
