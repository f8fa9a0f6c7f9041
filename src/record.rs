//! Core types for **protein records**, **curation status** and **cleavage boundaries**.
//!
//! A [`ProteinRecord`] is one row of the curated dataset. Records are created by the
//! loader, mutated in place by each pipeline stage and never deleted: a record that is
//! removed as a duplicate stays in the table with [`CurationStatus::DuplicateRemoved`].
//!
//! # Coordinates
//! [`Boundary`] values are 0-based, half-open offsets into the record's **precursor**
//! (the full sequence if known, otherwise the recorded mature sequence). In the table they
//! are written 1-based inclusive (`1-20`), the convention used by SignalP's `CS pos`.
use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use crate::error::{CurationError, CurationResult};

/// Curation state of a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum CurationStatus {
    /// Passed every automatic check so far.
    Clean,
    /// Redundant with a retained record. Terminal.
    DuplicateRemoved,
    /// Mature sequence contains a gap marker; needs manual repair.
    GapFlagged,
    /// Automatic processing could not decide; needs manual review.
    PendingReview,
}

impl CurationStatus {
    pub const ALL: [CurationStatus; 4] = [Self::Clean, Self::DuplicateRemoved, Self::GapFlagged, Self::PendingReview];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::DuplicateRemoved => "duplicate-removed",
            Self::GapFlagged => "gap-flagged",
            Self::PendingReview => "pending-review",
        }
    }
}

impl fmt::Display for CurationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for CurationStatus {
    type Err = CurationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "clean" => Ok(Self::Clean),
            "duplicate-removed" => Ok(Self::DuplicateRemoved),
            "gap-flagged" => Ok(Self::GapFlagged),
            "pending-review" => Ok(Self::PendingReview),
            other => Err(CurationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Half-open `start..end` segment of a precursor sequence (0-based).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Boundary {
    pub start: usize,
    pub end: usize,
}

impl Boundary {
    pub fn new(start: usize, end: usize) -> Self { Boundary { start, end } }

    pub fn len(&self) -> usize { self.end.saturating_sub(self.start) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Shift both ends by `offset` (translate from a sub-sequence into precursor coordinates).
    pub fn shifted(self, offset: usize) -> Self { Boundary { start: self.start + offset, end: self.end + offset } }
}

impl fmt::Display for Boundary {
    /// Writes the 1-based inclusive form, e.g. `1-20` for `0..20`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}-{}", self.start + 1, self.end) }
}

impl FromStr for Boundary {
    type Err = CurationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CurationError::InvalidBoundary(s.to_string());
        let (a, b) = s.trim().split_once('-').ok_or_else(bad)?;
        let start: usize = a.trim().parse().map_err(|_| bad())?;
        let end: usize = b.trim().parse().map_err(|_| bad())?;
        if start == 0 || start > end { return Err(bad()); }
        Ok(Boundary { start: start - 1, end })
    }
}

/// One row of the dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct ProteinRecord {
    /// Unique key within the dataset (`Unique_ID`).
    pub id: String,
    /// Species name.
    pub organism: String,
    /// Full (precursor) sequence, when known.
    pub full: Option<String>,
    /// Mature sequence. Empty means missing.
    pub mature: String,
    /// Signal peptide segment in precursor coordinates.
    pub signal_peptide: Option<Boundary>,
    /// Propeptide segment in precursor coordinates.
    pub propeptide: Option<Boundary>,
    /// Free-text notes: where a sequence came from, which tool changed it.
    pub provenance: Vec<String>,
    /// Values of the table's pass-through columns, aligned with the table header.
    pub extra: Vec<String>,
    /// 1-based data row in the source table.
    pub line: usize,
    status: CurationStatus,
}

impl ProteinRecord {
    pub fn new(id: impl Into<String>, organism: impl Into<String>, mature: impl Into<String>) -> Self {
        ProteinRecord {
            id: id.into(),
            organism: organism.into(),
            full: None,
            mature: normalize_sequence(&mature.into()),
            signal_peptide: None,
            propeptide: None,
            provenance: Vec::new(),
            extra: Vec::new(),
            line: 0,
            status: CurationStatus::Clean,
        }
    }

    /// Builder-style setter for the full sequence.
    pub fn with_full(mut self, full: impl Into<String>) -> Self {
        let full = normalize_sequence(&full.into());
        self.full = if full.is_empty() { None } else { Some(full) };
        self
    }

    pub fn status(&self) -> CurationStatus { self.status }

    /// Status as loaded from a previously curated table; no transition check.
    pub(crate) fn restore_status(&mut self, status: CurationStatus) { self.status = status; }

    /// Move to `to` as an automatic pipeline decision.
    ///
    /// `DuplicateRemoved` is terminal, and automatic stages never return a record to
    /// `Clean`; that only happens through [`ProteinRecord::resolve_manually`].
    pub fn set_status(&mut self, to: CurationStatus) -> CurationResult<()> {
        if self.status == to { return Ok(()); }
        if self.status == CurationStatus::DuplicateRemoved || to == CurationStatus::Clean {
            return Err(CurationError::Transition { id: self.id.clone(), from: self.status, to });
        }
        self.status = to;
        Ok(())
    }

    /// Return a gap-flagged or pending-review record to `Clean` after a manual decision.
    pub fn resolve_manually(&mut self) -> CurationResult<()> {
        match self.status {
            CurationStatus::Clean => Ok(()),
            CurationStatus::GapFlagged | CurationStatus::PendingReview => {
                self.status = CurationStatus::Clean;
                Ok(())
            }
            CurationStatus::DuplicateRemoved => Err(CurationError::Transition {
                id: self.id.clone(),
                from: self.status,
                to: CurationStatus::Clean,
            }),
        }
    }

    pub fn is_clean(&self) -> bool { self.status == CurationStatus::Clean }

    pub fn is_retained(&self) -> bool { self.status != CurationStatus::DuplicateRemoved }

    pub fn has_mature(&self) -> bool { !self.mature.is_empty() }

    /// The sequence cleavage coordinates refer to: full if known, else mature.
    pub fn precursor(&self) -> &str { self.full.as_deref().unwrap_or(&self.mature) }

    /// Offset of the mature sequence inside the precursor, `None` if it is not a substring.
    ///
    /// A stored boundary that ends where the mature sequence starts wins over the first
    /// match, so repeats of the mature sequence earlier in the precursor are not picked up.
    pub fn mature_offset(&self) -> Option<usize> {
        let Some(full) = &self.full else { return Some(0) };
        [self.propeptide, self.signal_peptide]
            .into_iter()
            .flatten()
            .map(|b| b.end)
            .find(|&end| full.get(end..).is_some_and(|rest| rest.starts_with(self.mature.as_str())))
            .or_else(|| full.find(self.mature.as_str()))
    }

    /// The record invariant: mature is a contiguous substring of full when both are present.
    pub fn is_consistent(&self) -> bool {
        !self.has_mature() || self.mature_offset().is_some()
    }

    pub fn add_note(&mut self, note: impl Into<String>) { self.provenance.push(note.into()); }
}

/// Upper-case a sequence and drop whitespace (line wraps, stray blanks from spreadsheets).
pub fn normalize_sequence(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).map(|c| c.to_ascii_uppercase()).collect()
}

/// Identifier order used to pick the retained record of a duplicate group.
///
/// Numeric identifiers compare as numbers (`9 < 10`), everything else lexicographically;
/// numeric ids sort before non-numeric ones.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
