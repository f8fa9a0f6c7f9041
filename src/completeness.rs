//! Gap detection and backfilling of missing sequences.
//!
//! For every clean record:
//! - a gap symbol in the mature sequence → gap-flagged, no automatic repair;
//! - mature missing, full present → mature taken from the auxiliary source when it is a
//!   substring of the full sequence, otherwise pending-review;
//! - full missing → full taken from the auxiliary source (by identifier, then by
//!   organism), after which the signal peptide is reconciled again; otherwise
//!   pending-review.
//!
//! No auxiliary data at all is a normal situation: those records simply end up pending-review.
use crate::annotator::Annotator;
use crate::aux_source::{AuxEntry, AuxSource};
use crate::config::CurationConfig;
use crate::decision_log::{Action, CurationLog, Stage};
use crate::error::CurationResult;
use crate::record::{CurationStatus, ProteinRecord};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResolveOutcome {
    pub gap_flagged: usize,
    pub filled_mature: usize,
    pub filled_full: usize,
    pub pending: usize,
}

pub struct CompletenessResolver<'a> {
    config: &'a CurationConfig,
    aux: Option<&'a AuxSource>,
    signal: Option<&'a Annotator<'a>>,
    key_columns: Vec<usize>,
}

impl<'a> CompletenessResolver<'a> {
    pub fn new(config: &'a CurationConfig) -> Self {
        CompletenessResolver { config, aux: None, signal: None, key_columns: Vec::new() }
    }

    pub fn aux(mut self, aux: Option<&'a AuxSource>) -> Self {
        self.aux = aux;
        self
    }

    /// Annotator used to recompute the signal peptide once a full sequence is found.
    pub fn signal_annotator(mut self, annotator: Option<&'a Annotator<'a>>) -> Self {
        self.signal = annotator;
        self
    }

    /// Positions in [`ProteinRecord::extra`] whose values are also auxiliary lookup keys.
    pub fn key_columns(mut self, columns: Vec<usize>) -> Self {
        self.key_columns = columns;
        self
    }

    pub fn run(&self, records: &mut [ProteinRecord], log: &mut CurationLog) -> CurationResult<ResolveOutcome> {
        let mut out = ResolveOutcome::default();
        for r in records.iter_mut().filter(|r| r.is_clean()) {
            if let Some((pos, c)) = r.mature.chars().enumerate().find(|(_, c)| self.config.is_gap_symbol(*c)) {
                r.set_status(CurationStatus::GapFlagged)?;
                log.record(Stage::Completeness, &r.id, Action::Flagged, format!("gap symbol '{}' at mature position {}", c, pos + 1));
                out.gap_flagged += 1;
                continue;
            }

            match (r.has_mature(), r.full.is_some()) {
                (true, true) => {}
                (false, false) => {
                    r.set_status(CurationStatus::PendingReview)?;
                    log.record(Stage::Completeness, &r.id, Action::Malformed, "no mature and no full sequence");
                    out.pending += 1;
                }
                (false, true) => {
                    if self.fill_mature(r, log) {
                        out.filled_mature += 1;
                    } else {
                        r.set_status(CurationStatus::PendingReview)?;
                        log.record(Stage::Completeness, &r.id, Action::Flagged, "mature sequence missing; no auxiliary match");
                        out.pending += 1;
                    }
                }
                (true, false) => {
                    if self.fill_full(r, log)? {
                        out.filled_full += 1;
                        if let Some(annotator) = self.signal {
                            if annotator.reconcile_filled(r, log)? == Action::Flagged { out.pending += 1; }
                        }
                    } else {
                        // An ambiguous match has already been flagged.
                        if r.is_clean() {
                            r.set_status(CurationStatus::PendingReview)?;
                            log.record(Stage::Completeness, &r.id, Action::Flagged, "full sequence missing; no auxiliary match");
                        }
                        out.pending += 1;
                    }
                }
            }
        }
        Ok(out)
    }

    fn keys(&self, r: &ProteinRecord) -> Vec<String> {
        let mut keys = vec![r.id.clone()];
        for &j in &self.key_columns {
            if let Some(v) = r.extra.get(j).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                keys.push(v.to_string());
            }
        }
        keys
    }

    fn by_keys(&self, r: &ProteinRecord) -> Vec<&'a AuxEntry> {
        let Some(aux) = self.aux else { return Vec::new() };
        let mut found: Vec<&AuxEntry> = Vec::new();
        for k in self.keys(r) {
            for e in aux.lookup(&k) {
                if e.organism_agrees(&r.organism) && !found.iter().any(|f| std::ptr::eq(*f, e)) { found.push(e); }
            }
        }
        found
    }

    fn fill_mature(&self, r: &mut ProteinRecord, log: &mut CurationLog) -> bool {
        let Some(full) = r.full.clone() else { return false };
        let hit = self
            .by_keys(r)
            .into_iter()
            .find_map(|e| e.mature.as_deref().filter(|m| full.contains(*m)).map(|m| (e.id.clone(), m.to_string())));
        let Some((key, mature)) = hit else { return false };
        let source = self.aux.map(|a| a.label()).unwrap_or_default();
        r.mature = mature;
        r.add_note(format!("mature sequence from {} ({})", source, key));
        log.record(Stage::Completeness, &r.id, Action::Filled, format!("mature sequence filled from {} entry {}", source, key));
        true
    }

    fn fill_full(&self, r: &mut ProteinRecord, log: &mut CurationLog) -> CurationResult<bool> {
        let Some(aux) = self.aux else { return Ok(false) };
        let contains = |e: &&AuxEntry| e.full.as_deref().is_some_and(|f| f.contains(r.mature.as_str()));

        let mut hit = self.by_keys(r).into_iter().find(contains).map(|e| (e, "identifier"));
        if hit.is_none() {
            let candidates: Vec<&AuxEntry> = aux.for_organism(&r.organism).filter(contains).collect();
            let first = candidates.first().and_then(|e| e.full.as_deref());
            if candidates.iter().any(|e| e.full.as_deref() != first) {
                let ids: Vec<&str> = candidates.iter().map(|e| e.id.as_str()).collect();
                r.set_status(CurationStatus::PendingReview)?;
                log.record(
                    Stage::Completeness,
                    &r.id,
                    Action::Flagged,
                    format!("full sequence ambiguous: {} {} entries match ({})", aux.label(), r.organism, ids.join(", ")),
                );
                return Ok(false);
            }
            hit = candidates.first().map(|e| (*e, "organism"));
        }

        let Some((entry, how)) = hit else { return Ok(false) };
        let full = entry.full.clone().unwrap_or_default();
        let offset = full.find(r.mature.as_str()).unwrap_or(0);
        // Boundaries stored against the old precursor (the mature sequence) move with it.
        r.signal_peptide = r.signal_peptide.map(|b| b.shifted(offset));
        r.propeptide = r.propeptide.map(|b| b.shifted(offset));
        r.full = Some(full);
        r.add_note(format!("full sequence from {} ({})", aux.label(), entry.id));
        log.record(
            Stage::Completeness,
            &r.id,
            Action::Filled,
            format!("full sequence filled from {} entry {} (matched by {})", aux.label(), entry.id, how),
        );
        Ok(true)
    }
}
