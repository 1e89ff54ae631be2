//! `courier check`: config validation and channel readiness report.
//!
//! Prints one section per concern with `[ok]`, `[warn]`, `[fail]` or
//! `[info]` per item, and fails when any item fails.

use std::path::Path;

use {
    anyhow::Result,
    courier_config::{CourierConfig, Severity},
    secrecy::ExposeSecret,
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }

    fn count(&self, status: Status) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

fn print_report(sections: &[Section]) {
    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
        }
        eprintln!();
    }
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn handle_check(config: &CourierConfig, path: Option<&Path>) -> Result<()> {
    eprintln!("{BOLD}courier check{RESET}");
    eprintln!("{BOLD}============={RESET}\n");

    let sections = vec![
        check_config(config, path),
        check_channel(config),
        check_reply(config),
    ];
    print_report(&sections);

    let errors: usize = sections.iter().map(|s| s.count(Status::Fail)).sum();
    let warnings: usize = sections.iter().map(|s| s.count(Status::Warn)).sum();
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        anyhow::bail!("configuration check failed with {errors} error(s)");
    }
    Ok(())
}

fn check_config(config: &CourierConfig, path: Option<&Path>) -> Section {
    let label = path.map_or_else(|| "discovered or default".into(), |p| p.display().to_string());
    let mut section = Section::new(format!("Config ({label})"));

    let result = courier_config::validate(config);
    for d in &result.diagnostics {
        let status = match d.severity {
            Severity::Error => Status::Fail,
            Severity::Warning => Status::Warn,
        };
        section.push(status, format!("{}: {}", d.path, d.message));
    }
    if result.diagnostics.is_empty() {
        section.push(Status::Ok, "no problems found");
    }

    let delivery = &config.delivery;
    section.push(
        Status::Info,
        format!(
            "quiet period {:?}, {} chars per part, {} attempts",
            config.aggregation.quiet_period(),
            delivery.char_limit,
            delivery.max_attempts
        ),
    );
    section
}

/// Credentials only; URL and sender problems are reported by validation.
fn check_channel(config: &CourierConfig) -> Section {
    let channel = &config.channel;
    let mut section = Section::new("Channel");

    if !channel.base_url.trim().is_empty() {
        section.push(Status::Info, format!("Send API at {}", channel.base_url));
    }
    if channel.access_token.expose_secret().trim().is_empty() {
        section.push(
            Status::Warn,
            "access_token is empty (set COURIER_CHANNEL_TOKEN)",
        );
    } else {
        section.push(Status::Ok, "access token configured");
    }
    section
}

fn check_reply(config: &CourierConfig) -> Section {
    let mut section = Section::new("Reply generation");
    match config.reply.endpoint.as_deref() {
        Some(endpoint) if is_http_url(endpoint) => {
            section.push(Status::Ok, format!("endpoint {endpoint}"));
        },
        Some(endpoint) => {
            section.push(
                Status::Fail,
                format!("endpoint is not an http(s) URL: {endpoint}"),
            );
        },
        None => section.push(Status::Info, "no endpoint configured, turns are echoed"),
    }
    section
}

fn is_http_url(raw: &str) -> bool {
    let raw = raw.trim();
    raw.starts_with("http://") || raw.starts_with("https://")
}
