//! Reconciliation of predicted cleavage sites with recorded mature sequences.
//!
//! One [`Annotator`] is built per predictor: signal peptide first, propeptide second.
//! Both follow the same contract and differ only in the boundary field they write.
//!
//! ### Contract
//! Coordinates are taken in the record's precursor (full sequence if known, else mature).
//! The mature sequence currently starts at `recorded`; the predictor's cleaved segment
//! ends at `predicted`.
//! - `|predicted - recorded| <= tolerance`: agreement, only the boundary field is stored.
//! - otherwise the mature sequence becomes `precursor[predicted..mature_end]`, the boundary
//!   is stored and a provenance note names the tool. A record without a full sequence gets
//!   its old mature sequence promoted to full sequence first.
//! - no call, low confidence, predictor error or an impossible boundary: unchanged, pending-review.
//!   A segment starting inside the mature sequence is impossible here: cutting it out would
//!   leave a mature sequence that is no longer a substring of the precursor.
//!
//! A record whose stored boundary already ends within tolerance of its mature start is not
//! resubmitted, so running a stage twice changes nothing.
//!
//! ### Parallelism
//! Predictor calls run on a local Rayon pool (`threads = None` uses all logical cores);
//! results are applied in table order.
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, warn};

use crate::config::{AnnotatorConfig, SubmitTarget};
use crate::decision_log::{Action, CurationLog, Stage};
use crate::error::CurationResult;
use crate::predictor::{Prediction, Predictor};
use crate::record::{Boundary, CurationStatus, ProteinRecord};

/// Which boundary field an annotator owns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundaryField {
    SignalPeptide,
    Propeptide,
}

impl BoundaryField {
    pub fn stage(self) -> Stage {
        match self {
            BoundaryField::SignalPeptide => Stage::SignalPeptide,
            BoundaryField::Propeptide => Stage::Propeptide,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BoundaryField::SignalPeptide => "signal peptide",
            BoundaryField::Propeptide => "propeptide",
        }
    }

    pub fn get(self, r: &ProteinRecord) -> Option<Boundary> {
        match self {
            BoundaryField::SignalPeptide => r.signal_peptide,
            BoundaryField::Propeptide => r.propeptide,
        }
    }

    fn set(self, r: &mut ProteinRecord, b: Boundary) {
        match self {
            BoundaryField::SignalPeptide => r.signal_peptide = Some(b),
            BoundaryField::Propeptide => r.propeptide = Some(b),
        }
    }
}

/// Counts of what one annotator pass did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AnnotateOutcome {
    pub submitted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pending: usize,
    pub reconciled: usize,
}

struct Job {
    index: usize,
    id: String,
    sequence: String,
    /// Offset of the submitted sequence inside the precursor.
    base: usize,
}

pub struct Annotator<'a> {
    field: BoundaryField,
    predictor: &'a dyn Predictor,
    config: &'a AnnotatorConfig,
    threads: Option<usize>,
}

impl<'a> Annotator<'a> {
    pub fn new(field: BoundaryField, predictor: &'a dyn Predictor, config: &'a AnnotatorConfig) -> Self {
        Annotator { field, predictor, config, threads: None }
    }

    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Run over every clean record with a mature sequence.
    pub fn run(&self, records: &mut [ProteinRecord], log: &mut CurationLog) -> CurationResult<AnnotateOutcome> {
        let mut out = AnnotateOutcome::default();
        let mut jobs = Vec::new();
        for (index, r) in records.iter_mut().enumerate() {
            if !r.is_clean() || !r.has_mature() { continue; }
            match self.prepare(index, r, log)? {
                Some(job) => jobs.push(job),
                None => {
                    if r.is_clean() { out.reconciled += 1; } else { out.pending += 1; }
                }
            }
        }
        out.submitted = jobs.len();

        let results = self.predict_all(&jobs);
        for (job, result) in jobs.iter().zip(results) {
            match self.apply(&mut records[job.index], job.base, result, log)? {
                Action::Updated => out.updated += 1,
                Action::Unchanged => out.unchanged += 1,
                _ => out.pending += 1,
            }
        }
        debug!(stage = %self.field.stage(), ?out, "annotator pass finished");
        Ok(out)
    }

    /// Reconcile a single record with a blocking predictor call.
    pub fn reconcile(&self, r: &mut ProteinRecord, log: &mut CurationLog) -> CurationResult<Action> {
        self.reconcile_from(r, log, false)
    }

    /// Reconcile a record whose full sequence was just filled in.
    ///
    /// Before the fill the precursor was the mature sequence, so a predictor that is not
    /// [sequence bound](Predictor::sequence_bound) still answers in those coordinates;
    /// its calls are read from the mature start.
    pub fn reconcile_filled(&self, r: &mut ProteinRecord, log: &mut CurationLog) -> CurationResult<Action> {
        self.reconcile_from(r, log, !self.predictor.sequence_bound())
    }

    fn reconcile_from(&self, r: &mut ProteinRecord, log: &mut CurationLog, from_mature: bool) -> CurationResult<Action> {
        if !r.is_clean() || !r.has_mature() { return Ok(Action::Unchanged); }
        match self.prepare(0, r, log)? {
            Some(mut job) => {
                if from_mature {
                    job.base = r.mature_offset().unwrap_or(job.base);
                }
                let result = self.predictor.predict(&job.id, &job.sequence);
                self.apply(r, job.base, result, log)
            }
            None => Ok(if r.is_clean() { Action::Unchanged } else { Action::Flagged }),
        }
    }

    fn prepare(&self, index: usize, r: &mut ProteinRecord, log: &mut CurationLog) -> CurationResult<Option<Job>> {
        let stage = self.field.stage();
        let Some(offset) = r.mature_offset() else {
            r.set_status(CurationStatus::PendingReview)?;
            log.record(stage, &r.id, Action::Malformed, "mature sequence is not part of the full sequence");
            return Ok(None);
        };
        if let Some(b) = self.field.get(r) {
            if b.end.abs_diff(offset) <= self.config.tolerance {
                log.record(stage, &r.id, Action::Unchanged, format!("already reconciled, {} {}", self.field.label(), b));
                return Ok(None);
            }
        }
        let (sequence, base) = match self.config.submit {
            SubmitTarget::Precursor => (r.precursor().to_string(), 0),
            SubmitTarget::Mature => (r.mature.clone(), offset),
        };
        Ok(Some(Job { index, id: r.id.clone(), sequence, base }))
    }

    fn predict_all(&self, jobs: &[Job]) -> Vec<CurationResult<Option<Prediction>>> {
        let call = |j: &Job| self.predictor.predict(&j.id, &j.sequence);
        if jobs.len() < 2 || self.threads == Some(1) {
            return jobs.iter().map(call).collect();
        }
        let n = self.threads.unwrap_or_else(num_cpus::get).max(1);
        match ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(|| jobs.par_iter().map(call).collect()),
            Err(e) => {
                warn!("cannot build thread pool ({}); calling {} sequentially", e, self.predictor.tool());
                jobs.iter().map(call).collect()
            }
        }
    }

    fn apply(
        &self,
        r: &mut ProteinRecord,
        base: usize,
        result: CurationResult<Option<Prediction>>,
        log: &mut CurationLog,
    ) -> CurationResult<Action> {
        let stage = self.field.stage();
        let tool = self.predictor.tool();
        let prediction = match result {
            Ok(Some(p)) if p.confidence >= self.config.min_confidence => p,
            Ok(Some(p)) => {
                let why = format!("{} confidence {:.3} below {:.3}", tool, p.confidence, self.config.min_confidence);
                return self.flag(r, why, log);
            }
            Ok(None) => return self.flag(r, format!("no call from {}", tool), log),
            Err(e) => return self.flag(r, format!("{}", e), log),
        };
        let Some(cleaved) = prediction.cleaved else {
            log.record(stage, &r.id, Action::Unchanged, format!("no {} predicted by {} ({:.3})", self.field.label(), tool, prediction.confidence));
            return Ok(Action::Unchanged);
        };

        let precursor_len = r.precursor().len();
        let boundary = cleaved.shifted(base);
        let Some(recorded) = r.mature_offset() else {
            return self.flag(r, "mature sequence is not part of the full sequence".to_string(), log);
        };
        let mature_end = recorded + r.mature.len();
        let predicted = boundary.end;
        if boundary.end > precursor_len {
            return self.flag(r, format!("{} boundary {} outside sequence of length {}", tool, boundary, precursor_len), log);
        }
        if boundary.start > recorded {
            return self.flag(
                r,
                format!("{} {} starts inside the mature sequence (mature starts at {})", self.field.label(), boundary, recorded + 1),
                log,
            );
        }

        if predicted.abs_diff(recorded) <= self.config.tolerance {
            self.field.set(r, boundary);
            log.record(
                stage,
                &r.id,
                Action::Unchanged,
                format!("{} {} agrees with recorded mature start {}", self.field.label(), boundary, recorded + 1),
            );
            return Ok(Action::Unchanged);
        }
        if predicted >= mature_end {
            return self.flag(r, format!("{} {} leaves no mature sequence (mature ends at {})", self.field.label(), boundary, mature_end), log);
        }

        let Some(mature) = r.precursor().get(predicted..mature_end).map(str::to_string) else {
            return self.flag(r, format!("{} {} does not fall between residues", self.field.label(), boundary), log);
        };
        let old_mature = std::mem::replace(&mut r.mature, mature);
        if r.full.is_none() {
            r.full = Some(old_mature.clone());
            r.add_note(format!("full sequence promoted from mature sequence before {} cleavage", self.field.label()));
        }
        self.field.set(r, boundary);
        r.add_note(format!("{} {} predicted by {}", self.field.label(), boundary, tool));
        log.record(
            stage,
            &r.id,
            Action::Updated,
            format!("mature start {} -> {}; {} -> {}", recorded + 1, predicted + 1, old_mature, r.mature),
        );
        Ok(Action::Updated)
    }

    fn flag(&self, r: &mut ProteinRecord, why: String, log: &mut CurationLog) -> CurationResult<Action> {
        r.set_status(CurationStatus::PendingReview)?;
        log.record(self.field.stage(), &r.id, Action::Flagged, why);
        Ok(Action::Flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CurationError;
    use crate::predictor::{StaticPredictor, ToolInfo};

    fn signalp() -> StaticPredictor { StaticPredictor::new(ToolInfo::new("SignalP", "6.0")) }

    struct Failing(ToolInfo);

    impl Predictor for Failing {
        fn tool(&self) -> &ToolInfo { &self.0 }
        fn predict(&self, _id: &str, _sequence: &str) -> CurationResult<Option<Prediction>> {
            Err(CurationError::Predictor { tool: self.0.to_string(), message: "timed out".into() })
        }
    }

    #[test]
    fn disagreement_moves_mature_start_and_notes_the_tool() {
        let p = signalp().with("1", Prediction::cleaved(Boundary::new(0, 2), 0.95));
        let cfg = AnnotatorConfig::signal_peptide();
        let mut records = vec![ProteinRecord::new("1", "Apis mellifera", "ACDEFGH")];
        let mut log = CurationLog::new();
        let out = Annotator::new(BoundaryField::SignalPeptide, &p, &cfg).run(&mut records, &mut log).unwrap();

        let r = &records[0];
        assert_eq!(out.updated, 1);
        assert_eq!(r.mature, "DEFGH");
        assert_eq!(r.full.as_deref(), Some("ACDEFGH"));
        assert_eq!(r.signal_peptide, Some(Boundary::new(0, 2)));
        assert!(r.provenance.iter().any(|n| n.contains("SignalP 6.0")));
        assert!(r.is_clean() && r.is_consistent());
        assert_eq!(log.count(Stage::SignalPeptide, Action::Updated), 1);
    }

    #[test]
    fn agreement_within_tolerance_keeps_mature() {
        let p = signalp().with("1", Prediction::cleaved(Boundary::new(0, 21), 0.9));
        let cfg = AnnotatorConfig { tolerance: 1, ..AnnotatorConfig::signal_peptide() };
        let full = "MKFLVNVALVFMVVYISYIYAAPEPEPAPEPEAEADAEADPEAGIGAVLKVLTTGLPALISWIKRKRQQG";
        let mut records = vec![ProteinRecord::new("1", "Apis mellifera", &full[22..]).with_full(full)];
        let out = Annotator::new(BoundaryField::SignalPeptide, &p, &cfg).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(out.unchanged, 1);
        assert_eq!(records[0].mature, &full[22..]);
        assert_eq!(records[0].signal_peptide, Some(Boundary::new(0, 21)));
    }

    #[test]
    fn running_twice_changes_nothing() {
        let p = signalp()
            .with("1", Prediction::cleaved(Boundary::new(0, 2), 0.95))
            .with("2", Prediction::cleaved(Boundary::new(0, 3), 0.95))
            .with("3", Prediction::uncleaved(0.99));
        let cfg = AnnotatorConfig::signal_peptide();
        let mut records = vec![
            ProteinRecord::new("1", "Apis mellifera", "ACDEFGH"),
            ProteinRecord::new("2", "Apis mellifera", "KLMNPQRST").with_full("MMKLMNPQRST"),
            ProteinRecord::new("3", "Apis mellifera", "WWYYWW"),
        ];
        let ann = Annotator::new(BoundaryField::SignalPeptide, &p, &cfg).threads(Some(2));
        ann.run(&mut records, &mut CurationLog::new()).unwrap();
        let first = records.clone();
        let out = ann.run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(records, first);
        assert_eq!(out.updated, 0);
        assert_eq!(out.reconciled, 2);
    }

    #[test]
    fn mature_target_offsets_are_translated() {
        let p = StaticPredictor::new(ToolInfo::new("DeepPeptide", "1.0")).with("1", Prediction::cleaved(Boundary::new(0, 3), 0.8));
        let cfg = AnnotatorConfig::propeptide();
        let mut records = vec![ProteinRecord::new("1", "Vespa crabro", "EAEKLMNP").with_full("MKAAEAEKLMNP")];
        Annotator::new(BoundaryField::Propeptide, &p, &cfg).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(records[0].mature, "KLMNP");
        assert_eq!(records[0].propeptide, Some(Boundary::new(4, 7)));
        assert!(records[0].is_consistent());
    }

    #[test]
    fn no_call_low_confidence_and_errors_go_to_review() {
        let p = signalp().with("2", Prediction::cleaved(Boundary::new(0, 2), 0.1));
        let cfg = AnnotatorConfig::signal_peptide();
        let mut records = vec![ProteinRecord::new("1", "A", "ACDEFGH"), ProteinRecord::new("2", "A", "KLMNPQ")];
        let out = Annotator::new(BoundaryField::SignalPeptide, &p, &cfg).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(out.pending, 2);
        assert!(records.iter().all(|r| r.status() == CurationStatus::PendingReview));
        assert_eq!(records[0].mature, "ACDEFGH");
        assert_eq!(records[1].mature, "KLMNPQ");

        let failing = Failing(ToolInfo::new("SignalP", "6.0"));
        let mut r = ProteinRecord::new("3", "A", "ACDEFGH");
        let mut log = CurationLog::new();
        let action = Annotator::new(BoundaryField::SignalPeptide, &failing, &cfg).reconcile(&mut r, &mut log).unwrap();
        assert_eq!(action, Action::Flagged);
        assert_eq!(r.status(), CurationStatus::PendingReview);
        assert!(log.entries()[0].message.contains("timed out"));
    }

    #[test]
    fn boundary_past_mature_end_is_rejected() {
        let p = signalp().with("1", Prediction::cleaved(Boundary::new(0, 7), 0.99));
        let cfg = AnnotatorConfig::signal_peptide();
        let mut records = vec![ProteinRecord::new("1", "A", "ACDEFGH")];
        Annotator::new(BoundaryField::SignalPeptide, &p, &cfg).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(records[0].status(), CurationStatus::PendingReview);
        assert_eq!(records[0].mature, "ACDEFGH");
    }

    #[test]
    fn repeated_mature_motif_is_stable_across_runs() {
        let p = signalp().with("1", Prediction::cleaved(Boundary::new(0, 6), 0.95));
        let cfg = AnnotatorConfig::signal_peptide();
        let mut records = vec![ProteinRecord::new("1", "Vespula vulgaris", "RPPGFSRPPGFS")];
        let ann = Annotator::new(BoundaryField::SignalPeptide, &p, &cfg);
        ann.run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(records[0].mature, "RPPGFS");
        assert_eq!(records[0].full.as_deref(), Some("RPPGFSRPPGFS"));

        let first = records.clone();
        let out = ann.run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(records, first);
        assert_eq!(out.reconciled, 1);
        assert_eq!(out.pending, 0);
        assert!(records[0].is_clean());
    }

    #[test]
    fn stored_boundary_within_tolerance_is_not_resubmitted() {
        // Called on the old precursor: residue 1 is cut, within tolerance of the mature start.
        let p = signalp().with("1", Prediction::cleaved(Boundary::new(0, 1), 0.95));
        let cfg = AnnotatorConfig { tolerance: 1, ..AnnotatorConfig::signal_peptide() };
        let mut r = ProteinRecord::new("1", "Apis mellifera", "GIGAVLKVL").with_full("MKFLGIGAVLKVL");
        r.signal_peptide = Some(Boundary::new(4, 5));
        let mut records = vec![r];
        let out = Annotator::new(BoundaryField::SignalPeptide, &p, &cfg).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(out.submitted, 0);
        assert_eq!(records[0].mature, "GIGAVLKVL");
    }

    #[test]
    fn internal_propeptide_goes_to_review() {
        let p = StaticPredictor::new(ToolInfo::new("DeepPeptide", "1.0")).with("1", Prediction::cleaved(Boundary::new(4, 8), 0.9));
        let cfg = AnnotatorConfig::propeptide();
        let mut records = vec![ProteinRecord::new("1", "Vespa crabro", "ACDEKRKRGIGAVLKVL")];
        let mut log = CurationLog::new();
        let out = Annotator::new(BoundaryField::Propeptide, &p, &cfg).run(&mut records, &mut log).unwrap();
        assert_eq!(out.pending, 1);
        assert_eq!(records[0].status(), CurationStatus::PendingReview);
        assert_eq!(records[0].mature, "ACDEKRKRGIGAVLKVL");
        assert!(records[0].propeptide.is_none());
        assert!(log.entries()[0].message.contains("starts inside the mature sequence"));
    }

    #[test]
    fn cut_inside_a_multibyte_character_is_flagged() {
        let p = signalp().with("1", Prediction::cleaved(Boundary::new(0, 3), 0.95));
        let cfg = AnnotatorConfig::signal_peptide();
        let mut records = vec![ProteinRecord::new("1", "Apis mellifera", "AC\u{2013}DEFGH")];
        Annotator::new(BoundaryField::SignalPeptide, &p, &cfg).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(records[0].status(), CurationStatus::PendingReview);
        assert_eq!(records[0].mature, "AC\u{2013}DEFGH");
        assert!(records[0].full.is_none());
    }

    #[test]
    fn id_keyed_calls_after_fill_are_read_from_the_mature_start() {
        let json = r#"{"SEQUENCES": {"1": {"Prediction": "Signal Peptide (Sec/SPI)", "CS_pos": "Cleavage site between pos. 1 and 2. Probability 0.9"}}}"#;
        let p = crate::signalp::SignalPJson::from_json(json).unwrap();
        let cfg = AnnotatorConfig::signal_peptide();
        let full = "MKFLVNVALVFMVVYISYIYAGIGAVLKVLTTGLPALISWIKRKRQQG";
        let mut r = ProteinRecord::new("1", "Apis mellifera", &full[21..]).with_full(full);
        let ann = Annotator::new(BoundaryField::SignalPeptide, &p, &cfg);
        assert_eq!(ann.reconcile_filled(&mut r, &mut CurationLog::new()).unwrap(), Action::Updated);
        assert_eq!(r.mature, &full[22..]);
        assert_eq!(r.signal_peptide, Some(Boundary::new(21, 22)));
        assert!(r.is_consistent());
    }
}
