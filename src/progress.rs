//! Pipeline progress reporting.
//!
//! Reports observable progress while harvesting, fetching, processing and
//! indexing so users see what is being worked on and how much is left.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A listing page is being requested.
    Harvesting {
        source: String,
        category: String,
        page: u32,
    },
    /// Per-record step of a document-level command (`fetch`, `categorize`, ...).
    Step {
        step: &'static str,
        identifier: String,
        n: u64,
        total: u64,
        skipped: bool,
    },
    /// Index build: n chunks embedded out of total.
    Indexing { n: u64, total: u64 },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "categorize  12 / 340  32025R0001".
pub struct StderrProgress;

fn human_line(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Harvesting {
            source,
            category,
            page,
        } => format!("harvest {}:{}  page {}\n", source, category, page),
        ProgressEvent::Step {
            step,
            identifier,
            n,
            total,
            skipped,
        } => format!(
            "{}  {} / {}  {}{}\n",
            step,
            format_number(*n),
            format_number(*total),
            identifier,
            if *skipped { "  (skipped)" } else { "" }
        ),
        ProgressEvent::Indexing { n, total } => format!(
            "index  {} / {} chunks\n",
            format_number(*n),
            format_number(*total)
        ),
    }
}

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = human_line(&event);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Harvesting {
                source,
                category,
                page,
            } => serde_json::json!({
                "event": "progress",
                "phase": "harvest",
                "source": source,
                "category": category,
                "page": page
            }),
            ProgressEvent::Step {
                step,
                identifier,
                n,
                total,
                skipped,
            } => serde_json::json!({
                "event": "progress",
                "phase": step,
                "identifier": identifier,
                "n": n,
                "total": total,
                "skipped": skipped
            }),
            ProgressEvent::Indexing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "index",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value; `auto` defers to [`default_for_tty`](Self::default_for_tty).
    pub fn from_flag(flag: &str) -> anyhow::Result<Self> {
        match flag {
            "auto" => Ok(Self::default_for_tty()),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "off" => Ok(ProgressMode::Off),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Use auto, human, json, or off.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
