//! Human-readable log of every curation decision.
//!
//! Each decision is also emitted as a `tracing` event; the file written by
//! [`CurationLog::to_path`] is the audit artifact that accompanies the rewritten table.
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::CurationResult;

/// Pipeline stage that took a decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Validate,
    Dedup,
    SignalPeptide,
    Propeptide,
    Completeness,
    Review,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validate => "validate",
            Stage::Dedup => "dedup",
            Stage::SignalPeptide => "signal-peptide",
            Stage::Propeptide => "propeptide",
            Stage::Completeness => "completeness",
            Stage::Review => "review",
        })
    }
}

/// What happened to a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// Marked duplicate-removed.
    Removed,
    /// Sent to gap-flagged or pending-review.
    Flagged,
    /// Sequence or boundary changed.
    Updated,
    /// Missing sequence filled from another source.
    Filled,
    /// Checked, nothing to change.
    Unchanged,
    /// Input problem reported; record left for manual work.
    Malformed,
    /// Returned to clean by a manual decision.
    Resolved,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Removed => "REMOVED",
            Action::Flagged => "FLAGGED",
            Action::Updated => "UPDATED",
            Action::Filled => "FILLED",
            Action::Unchanged => "UNCHANGED",
            Action::Malformed => "MALFORMED",
            Action::Resolved => "RESOLVED",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub stage: Stage,
    pub id: String,
    pub action: Action,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {} - {}", self.stage, self.id, self.action, self.message)
    }
}

/// Ordered list of decisions taken during a run.
#[derive(Clone, Debug, Default)]
pub struct CurationLog {
    entries: Vec<LogEntry>,
}

impl CurationLog {
    pub fn new() -> Self { Self::default() }

    pub fn record(&mut self, stage: Stage, id: &str, action: Action, message: impl Into<String>) {
        let message = message.into();
        match action {
            Action::Unchanged => debug!(%stage, id, "{}", message),
            Action::Malformed => warn!(%stage, id, "{}", message),
            _ => info!(%stage, id, %action, "{}", message),
        }
        self.entries.push(LogEntry { stage, id: id.to_string(), action, message });
    }

    pub fn entries(&self) -> &[LogEntry] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn for_record<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |e| e.id == id)
    }

    pub fn count(&self, stage: Stage, action: Action) -> usize {
        self.entries.iter().filter(|e| e.stage == stage && e.action == action).count()
    }

    pub fn to_path<P: AsRef<Path>>(&self, path: P) -> CurationResult<()> {
        let mut w = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut w)?;
        w.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> CurationResult<()> {
        writeln!(w, "Curation decision log")?;
        writeln!(w, "Generated: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(w, "{}", "=".repeat(50))?;
        for e in &self.entries {
            writeln!(w, "{}", e)?;
        }
        writeln!(w)?;
        writeln!(w, "Summary:")?;
        let mut tally: BTreeMap<(Stage, Action), usize> = BTreeMap::new();
        for e in &self.entries {
            *tally.entry((e.stage, e.action)).or_default() += 1;
        }
        for ((stage, action), n) in tally {
            writeln!(w, "  {:<15} {:<10} {}", stage.to_string(), action.to_string(), n)?;
        }
        Ok(())
    }
}
