//! Manual review decisions.
//!
//! An annotation file holds one decision per line:
//!
//! ```text
//! + 17                      keep record 17
//! - Line 42: 40;Apis mellifera;pending-review
//! ? 118                     uncertain, resolved by --uncertain
//! ```
//!
//! A target is an identifier or `Line N:`, the 1-based data row used by the duplicate
//! report, so that report can be annotated in place. Other lines are ignored.
use std::str::FromStr;

use tracing::warn;

use crate::decision_log::{Action, CurationLog, Stage};
use crate::error::CurationResult;
use crate::record::{CurationStatus, ProteinRecord};
use crate::table::Dataset;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Keep,
    Remove,
    Uncertain,
}

/// How `?` lines are applied.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UncertainPolicy {
    #[default]
    Keep,
    Remove,
}

impl FromStr for UncertainPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "remove" => Ok(Self::Remove),
            other => Err(format!("Unknown uncertain policy: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    Id(String),
    Line(usize),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Annotation {
    pub verdict: Verdict,
    pub target: Target,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReviewOutcome {
    pub resolved: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Targets that match no record.
    pub unknown: Vec<String>,
}

/// Parse an annotation file.
pub fn parse_annotations(text: &str) -> Vec<Annotation> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Annotation> {
    let line = line.trim();
    let mut chars = line.chars();
    let verdict = match chars.next()? {
        '+' => Verdict::Keep,
        '-' => Verdict::Remove,
        '?' => Verdict::Uncertain,
        _ => return None,
    };
    let rest = chars.as_str().trim();
    let target = match rest.strip_prefix("Line ") {
        Some(l) => Target::Line(l.split(':').next()?.trim().parse().ok()?),
        None => {
            let id = rest.split(|c: char| c == ';' || c.is_whitespace()).next()?;
            if id.is_empty() { return None; }
            Target::Id(id.to_string())
        }
    };
    Some(Annotation { verdict, target })
}

/// Apply review decisions to the table. Later lines win over earlier ones for the same record.
pub fn apply_review(
    ds: &mut Dataset,
    annotations: &[Annotation],
    uncertain: UncertainPolicy,
    log: &mut CurationLog,
) -> CurationResult<ReviewOutcome> {
    let mut out = ReviewOutcome::default();
    for a in annotations {
        let index = match &a.target {
            Target::Id(id) => ds.position(id),
            Target::Line(n) => ds.position_of_line(*n),
        };
        let Some(index) = index else {
            let name = match &a.target {
                Target::Id(id) => id.clone(),
                Target::Line(n) => format!("Line {}", n),
            };
            warn!(entry = %name, "review target not found in table");
            out.unknown.push(name);
            continue;
        };
        let keep = match a.verdict {
            Verdict::Keep => true,
            Verdict::Remove => false,
            Verdict::Uncertain => uncertain == UncertainPolicy::Keep,
        };
        let r = &mut ds.records[index];
        match apply_one(r, keep, a.verdict == Verdict::Uncertain, log)? {
            Action::Resolved => out.resolved += 1,
            Action::Removed => out.removed += 1,
            _ => out.unchanged += 1,
        }
    }
    Ok(out)
}

fn apply_one(r: &mut ProteinRecord, keep: bool, uncertain: bool, log: &mut CurationLog) -> CurationResult<Action> {
    let how = if uncertain { "uncertain, " } else { "" };
    let action = match (keep, r.status()) {
        (_, CurationStatus::DuplicateRemoved) => {
            log.record(Stage::Review, &r.id, Action::Unchanged, "already duplicate-removed");
            Action::Unchanged
        }
        (true, CurationStatus::Clean) => Action::Unchanged,
        (true, from) => {
            r.resolve_manually()?;
            r.add_note("accepted on review");
            log.record(Stage::Review, &r.id, Action::Resolved, format!("{}kept on review (was {})", how, from));
            Action::Resolved
        }
        (false, from) => {
            r.set_status(CurationStatus::DuplicateRemoved)?;
            r.add_note("removed on review");
            log.record(Stage::Review, &r.id, Action::Removed, format!("{}removed on review (was {})", how, from));
            Action::Removed
        }
    };
    Ok(action)
}
