//! The curation run: validation, deduplication, signal peptide, propeptide, completeness.
//!
//! A [`Pipeline`] owns the table and the decision log; each stage borrows the records
//! mutably in turn. Stages without their input (no predictor, no auxiliary source) still
//! run where that is meaningful, so every record ends the run with a definite status.
use std::path::Path;

use tracing::info;

use crate::annotator::{AnnotateOutcome, Annotator, BoundaryField};
use crate::aux_source::AuxSource;
use crate::completeness::{CompletenessResolver, ResolveOutcome};
use crate::config::CurationConfig;
use crate::decision_log::{Action, CurationLog, Stage};
use crate::dedup::{DedupOutcome, Deduplicator};
use crate::error::CurationResult;
use crate::predictor::Predictor;
use crate::record::{CurationStatus, ProteinRecord};
use crate::table::Dataset;

/// What each stage of a run did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub malformed: usize,
    pub dedup: DedupOutcome,
    pub signal_peptide: Option<AnnotateOutcome>,
    pub propeptide: Option<AnnotateOutcome>,
    pub completeness: ResolveOutcome,
}

pub struct Pipeline {
    dataset: Dataset,
    config: CurationConfig,
    signal: Option<Box<dyn Predictor>>,
    propeptide: Option<Box<dyn Predictor>>,
    aux: Option<AuxSource>,
    log: CurationLog,
}

impl Pipeline {
    pub fn new(dataset: Dataset, config: CurationConfig) -> CurationResult<Self> {
        config.validate()?;
        Ok(Pipeline { dataset, config, signal: None, propeptide: None, aux: None, log: CurationLog::new() })
    }

    pub fn signal_predictor(mut self, predictor: Box<dyn Predictor>) -> Self {
        self.signal = Some(predictor);
        self
    }

    pub fn propeptide_predictor(mut self, predictor: Box<dyn Predictor>) -> Self {
        self.propeptide = Some(predictor);
        self
    }

    pub fn aux_source(mut self, aux: AuxSource) -> Self {
        self.aux = Some(aux);
        self
    }

    pub fn dataset(&self) -> &Dataset { &self.dataset }

    pub fn log(&self) -> &CurationLog { &self.log }

    pub fn into_parts(self) -> (Dataset, CurationLog) { (self.dataset, self.log) }

    /// Run every stage once, in order.
    pub fn run(&mut self) -> CurationResult<RunSummary> {
        let mut summary = RunSummary { malformed: validate_records(&mut self.dataset.records, &self.config, &mut self.log)?, ..Default::default() };

        summary.dedup = Deduplicator::new(self.config.cross_organism).run(&mut self.dataset.records, &mut self.log)?;
        info!(removed = summary.dedup.removed, flagged = summary.dedup.flagged, "deduplication done");

        let signal = self.signal.as_deref().map(|p| {
            Annotator::new(BoundaryField::SignalPeptide, p, &self.config.signal_peptide).threads(self.config.threads)
        });
        if let Some(annotator) = &signal {
            let out = annotator.run(&mut self.dataset.records, &mut self.log)?;
            info!(updated = out.updated, pending = out.pending, "signal peptide pass done");
            summary.signal_peptide = Some(out);
        }

        if let Some(p) = self.propeptide.as_deref() {
            let annotator = Annotator::new(BoundaryField::Propeptide, p, &self.config.propeptide).threads(self.config.threads);
            let out = annotator.run(&mut self.dataset.records, &mut self.log)?;
            info!(updated = out.updated, pending = out.pending, "propeptide pass done");
            summary.propeptide = Some(out);
        }

        let key_columns: Vec<usize> = self.config.aux_key_columns.iter().filter_map(|c| self.dataset.extra_index(c)).collect();
        summary.completeness = CompletenessResolver::new(&self.config)
            .aux(self.aux.as_ref())
            .signal_annotator(signal.as_ref())
            .key_columns(key_columns)
            .run(&mut self.dataset.records, &mut self.log)?;
        info!(
            gaps = summary.completeness.gap_flagged,
            filled_full = summary.completeness.filled_full,
            filled_mature = summary.completeness.filled_mature,
            pending = summary.completeness.pending,
            "completeness pass done"
        );

        Ok(summary)
    }

    /// Write the curated table and the decision log.
    pub fn write<P: AsRef<Path>, Q: AsRef<Path>>(&self, table: P, log: Q) -> CurationResult<()> {
        self.dataset.to_path(table)?;
        self.log.to_path(log)?;
        Ok(())
    }
}

/// Send records that have no identifier, carry characters outside the residue alphabet
/// or break the mature-in-full invariant to review.
///
/// Accepted characters are ASCII letters and the configured gap symbols.
pub fn validate_records(records: &mut [ProteinRecord], config: &CurationConfig, log: &mut CurationLog) -> CurationResult<usize> {
    let foreign = |seq: &str| seq.chars().find(|c| !c.is_ascii_alphabetic() && !config.is_gap_symbol(*c));
    let mut n = 0;
    for r in records.iter_mut().filter(|r| r.is_clean()) {
        let problem = if r.id.is_empty() {
            Some(format!("row {} has no identifier", r.line))
        } else if let Some(c) = foreign(r.mature.as_str()) {
            Some(format!("unexpected character {:?} in mature sequence", c))
        } else if let Some(c) = r.full.as_deref().and_then(foreign) {
            Some(format!("unexpected character {:?} in full sequence", c))
        } else if !r.is_consistent() {
            Some("mature sequence is not a substring of the full sequence".to_string())
        } else {
            None
        };
        if let Some(message) = problem {
            r.set_status(CurationStatus::PendingReview)?;
            let id = if r.id.is_empty() { format!("line {}", r.line) } else { r.id.clone() };
            log.record(Stage::Validate, &id, Action::Malformed, message);
            n += 1;
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{Prediction, StaticPredictor, ToolInfo};
    use crate::record::Boundary;

    #[test]
    fn inconsistent_records_are_sent_to_review_first() {
        let mut records = vec![
            ProteinRecord::new("1", "Apis mellifera", "WWW").with_full("MKACDEFGH"),
            ProteinRecord::new("", "Apis mellifera", "ACD"),
            ProteinRecord::new("3", "Apis mellifera", "DEFGH").with_full("MKACDEFGH"),
        ];
        records[1].line = 2;
        let mut log = CurationLog::new();
        assert_eq!(validate_records(&mut records, &CurationConfig::default(), &mut log).unwrap(), 2);
        assert_eq!(records[0].status(), CurationStatus::PendingReview);
        assert!(records[2].is_clean());
        assert_eq!(log.for_record("line 2").count(), 1);
    }

    #[test]
    fn characters_outside_the_residue_alphabet_are_malformed() {
        let mut records = vec![
            ProteinRecord::new("1", "Apis mellifera", "GIGA\u{2013}VLKVL"),
            ProteinRecord::new("2", "Apis mellifera", "DEFGH").with_full("MK\u{00c4}CDEFGH"),
            ProteinRecord::new("3", "Vespa crabro", "KLM-PQ"),
        ];
        let mut log = CurationLog::new();
        assert_eq!(validate_records(&mut records, &CurationConfig::default(), &mut log).unwrap(), 2);
        assert_eq!(records[0].status(), CurationStatus::PendingReview);
        assert_eq!(records[1].status(), CurationStatus::PendingReview);
        assert!(log.for_record("1").any(|e| e.message.contains("mature sequence")));
        // Gap symbols are left for the completeness stage.
        assert!(records[2].is_clean());
    }

    #[test]
    fn non_ascii_sequence_runs_through_without_panicking() {
        let ds = Dataset::new(vec![ProteinRecord::new("1", "Apis mellifera", "AC\u{2013}DEFGH")]);
        let sp = StaticPredictor::new(ToolInfo::new("SignalP", "6.0")).with("1", Prediction::cleaved(Boundary::new(0, 3), 0.9));
        let mut p = Pipeline::new(ds, CurationConfig::default()).unwrap().signal_predictor(Box::new(sp));
        let summary = p.run().unwrap();
        assert_eq!(summary.malformed, 1);
        let (ds, _) = p.into_parts();
        assert_eq!(ds.records[0].mature, "AC\u{2013}DEFGH");
        assert_eq!(ds.records[0].status(), CurationStatus::PendingReview);
    }

    #[test]
    fn stages_run_in_order() {
        let ds = Dataset::new(vec![
            ProteinRecord::new("1", "Apis mellifera", "ACDEFGH"),
            ProteinRecord::new("2", "Apis mellifera", "ACDEFGH"),
            ProteinRecord::new("3", "Vespa crabro", "KLM?PQ"),
        ]);
        let sp = StaticPredictor::new(ToolInfo::new("SignalP", "6.0")).with("1", Prediction::cleaved(Boundary::new(0, 2), 0.9));
        let mut p = Pipeline::new(ds, CurationConfig::default()).unwrap().signal_predictor(Box::new(sp));
        let summary = p.run().unwrap();

        assert_eq!(summary.dedup.removed, 1);
        assert_eq!(summary.signal_peptide.map(|o| o.updated), Some(1));
        assert!(summary.propeptide.is_none());
        let (ds, log) = p.into_parts();
        let one = &ds.records[0];
        assert_eq!(one.mature, "DEFGH");
        // The promoted full sequence came from the predictor update; nothing to backfill.
        assert!(one.is_clean());
        assert_eq!(ds.records[1].status(), CurationStatus::DuplicateRemoved);
        // Record 3 is a no-call for SignalP, so it is pending before the gap check runs.
        assert_eq!(ds.records[2].status(), CurationStatus::PendingReview);
        assert!(log.len() >= 3);
    }
}
