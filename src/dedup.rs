//! Removal of redundant records.
//!
//! Two passes over the clean records:
//! 1. **Exact duplicates**: same mature sequence *and* same organism. The lowest
//!    identifier (see [`compare_ids`]) is retained, the others become duplicate-removed.
//! 2. **Cross-organism matches**: same mature sequence, different organisms. Handled by
//!    the configured [`CrossOrganismPolicy`].
//!
//! [`DuplicateReport`] is the read-only counterpart: it lists every duplicated mature and
//! full sequence in the table without touching any record.
use std::collections::{HashMap, HashSet};
use std::io::Write;

use crate::config::CrossOrganismPolicy;
use crate::decision_log::{Action, CurationLog, Stage};
use crate::error::CurationResult;
use crate::record::{compare_ids, CurationStatus, ProteinRecord};

/// Counts of what a deduplication pass did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DedupOutcome {
    pub removed: usize,
    pub flagged: usize,
    pub malformed: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct Deduplicator {
    policy: CrossOrganismPolicy,
}

impl Deduplicator {
    pub fn new(policy: CrossOrganismPolicy) -> Self { Deduplicator { policy } }

    pub fn run(&self, records: &mut [ProteinRecord], log: &mut CurationLog) -> CurationResult<DedupOutcome> {
        let mut out = DedupOutcome::default();

        for r in records.iter().filter(|r| r.is_clean() && !r.has_mature()) {
            log.record(Stage::Dedup, &r.id, Action::Malformed, "empty mature sequence; not compared");
            out.malformed += 1;
        }

        // Exact duplicates within one organism.
        let groups = group_indices(records, |r| (r.mature.clone(), r.organism.clone()));
        for group in groups {
            let keeper = lowest_id(records, &group);
            let keeper_id = records[keeper].id.clone();
            for &i in group.iter().filter(|&&i| i != keeper) {
                let r = &mut records[i];
                r.set_status(CurationStatus::DuplicateRemoved)?;
                log.record(
                    Stage::Dedup,
                    &r.id,
                    Action::Removed,
                    format!("identical mature sequence and organism to {} ({})", keeper_id, r.organism),
                );
                out.removed += 1;
            }
        }

        // Identical mature sequences across organisms.
        let groups = group_indices(records, |r| (r.mature.clone(), String::new()));
        for group in groups {
            let keeper = lowest_id(records, &group);
            let (keeper_id, keeper_org) = (records[keeper].id.clone(), records[keeper].organism.clone());
            for &i in group.iter().filter(|&&i| i != keeper) {
                let r = &mut records[i];
                let why = format!("identical mature sequence to {} ({}) from {}", keeper_id, keeper_org, r.organism);
                match self.policy {
                    CrossOrganismPolicy::Remove => {
                        r.set_status(CurationStatus::DuplicateRemoved)?;
                        log.record(Stage::Dedup, &r.id, Action::Removed, why);
                        out.removed += 1;
                    }
                    CrossOrganismPolicy::Flag => {
                        r.set_status(CurationStatus::PendingReview)?;
                        log.record(Stage::Dedup, &r.id, Action::Flagged, why);
                        out.flagged += 1;
                    }
                    CrossOrganismPolicy::Keep => {
                        log.record(Stage::Dedup, &r.id, Action::Unchanged, format!("{}; kept by policy", why));
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Indices of clean, non-empty records sharing a key; only groups of two or more,
/// ordered by their first member so log output follows the table.
fn group_indices<F>(records: &[ProteinRecord], key: F) -> Vec<Vec<usize>>
where
    F: Fn(&ProteinRecord) -> (String, String),
{
    let mut by_key: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        if r.is_clean() && r.has_mature() {
            by_key.entry(key(r)).or_default().push(i);
        }
    }
    let mut groups: Vec<Vec<usize>> = by_key.into_values().filter(|g| g.len() > 1).collect();
    groups.sort_by_key(|g| g[0]);
    groups
}

fn lowest_id(records: &[ProteinRecord], group: &[usize]) -> usize {
    let mut best = group[0];
    for &i in &group[1..] {
        if compare_ids(&records[i].id, &records[best].id).is_lt() { best = i; }
    }
    best
}

/// A set of records sharing a sequence.
#[derive(Clone, Debug)]
pub struct DuplicateGroup {
    pub mature: String,
    pub full: Option<String>,
    /// Indices into the analysed slice, in table order.
    pub members: Vec<usize>,
}

/// Read-only listing of duplicated sequences in a table.
#[derive(Clone, Debug, Default)]
pub struct DuplicateReport {
    pub total: usize,
    /// Both mature and full sequence duplicated.
    pub both: Vec<DuplicateGroup>,
    /// Mature duplicated, not covered by `both`.
    pub mature_only: Vec<DuplicateGroup>,
    /// Full duplicated, not covered by `both`.
    pub full_only: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    pub fn analyse(records: &[ProteinRecord]) -> Self {
        let mut mature: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut full: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, r) in records.iter().enumerate() {
            if r.has_mature() { mature.entry(r.mature.as_str()).or_default().push(i); }
            if let Some(f) = r.full.as_deref() { full.entry(f).or_default().push(i); }
        }
        let dup_full: HashSet<&str> = full.iter().filter(|(_, v)| v.len() > 1).map(|(k, _)| *k).collect();

        let mut both: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        for (seq, idx) in mature.iter().filter(|(_, v)| v.len() > 1) {
            for &i in idx {
                if let Some(f) = records[i].full.as_deref().filter(|f| dup_full.contains(f)) {
                    both.entry((*seq, f)).or_default().push(i);
                }
            }
        }
        let both_mature: HashSet<&str> = both.keys().map(|(m, _)| *m).collect();
        let both_full: HashSet<&str> = both.keys().map(|(_, f)| *f).collect();

        let mut report = DuplicateReport { total: records.len(), ..Default::default() };
        report.both = both
            .into_iter()
            .map(|((m, f), members)| DuplicateGroup { mature: m.to_string(), full: Some(f.to_string()), members })
            .collect();
        report.mature_only = mature
            .into_iter()
            .filter(|(seq, v)| v.len() > 1 && !both_mature.contains(seq))
            .map(|(seq, members)| DuplicateGroup { mature: seq.to_string(), full: None, members })
            .collect();
        report.full_only = full
            .into_iter()
            .filter(|(seq, v)| v.len() > 1 && !both_full.contains(seq))
            .map(|(seq, members)| DuplicateGroup { mature: String::new(), full: Some(seq.to_string()), members })
            .collect();
        for groups in [&mut report.both, &mut report.mature_only, &mut report.full_only] {
            groups.sort_by_key(|g| g.members[0]);
        }
        report
    }

    pub fn write_to<W: Write>(&self, w: &mut W, records: &[ProteinRecord]) -> CurationResult<()> {
        writeln!(w, "Duplicate Sequences Report")?;
        writeln!(w, "Generated: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(w, "{}\n", "=".repeat(50))?;
        writeln!(w, "Summary Statistics:")?;
        writeln!(w, "Total sequences processed: {}", self.total)?;
        writeln!(w, "Duplicate mature sequences found: {}", self.mature_only.len() + distinct_mature(&self.both))?;
        writeln!(w, "Duplicate full sequences found: {}", self.full_only.len() + distinct_full(&self.both))?;
        writeln!(w, "Entries with both sequences duplicated: {}\n", self.both.len())?;

        writeln!(w, "Entries with Both Sequences Duplicated:\n{}\n", "=".repeat(40))?;
        for g in &self.both {
            writeln!(w, "Mature Sequence ({} aa): {}", g.mature.len(), g.mature)?;
            let full = g.full.as_deref().unwrap_or_default();
            writeln!(w, "Full Sequence ({} aa): {}", full.len(), full)?;
            write_members(w, g, records)?;
        }
        writeln!(w, "\nDuplicates in Mature Sequences Only:\n{}\n", "=".repeat(35))?;
        for g in &self.mature_only {
            writeln!(w, "Sequence ({} aa): {}", g.mature.len(), g.mature)?;
            write_members(w, g, records)?;
        }
        writeln!(w, "\nDuplicates in Full Sequences Only:\n{}\n", "=".repeat(35))?;
        for g in &self.full_only {
            let full = g.full.as_deref().unwrap_or_default();
            writeln!(w, "Sequence ({} aa): {}", full.len(), full)?;
            write_members(w, g, records)?;
        }
        Ok(())
    }
}

fn distinct_mature(groups: &[DuplicateGroup]) -> usize {
    groups.iter().map(|g| g.mature.as_str()).collect::<HashSet<_>>().len()
}

fn distinct_full(groups: &[DuplicateGroup]) -> usize {
    groups.iter().filter_map(|g| g.full.as_deref()).collect::<HashSet<_>>().len()
}

fn write_members<W: Write>(w: &mut W, g: &DuplicateGroup, records: &[ProteinRecord]) -> CurationResult<()> {
    writeln!(w, "Found in {} entries:", g.members.len())?;
    for &i in &g.members {
        let r = &records[i];
        writeln!(w, "Line {}: {};{};{}", r.line, r.id, r.organism, r.status())?;
    }
    writeln!(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, org: &str, mature: &str) -> ProteinRecord {
        ProteinRecord::new(id, org, mature)
    }

    fn retained_pairs_unique(records: &[ProteinRecord]) -> bool {
        let mut seen = HashSet::new();
        records.iter().filter(|r| r.is_retained() && r.has_mature()).all(|r| seen.insert((r.organism.clone(), r.mature.clone())))
    }

    #[test]
    fn same_organism_duplicate_keeps_lowest_id() {
        let mut records = vec![rec("12", "Apis mellifera", "ACDEFGH"), rec("3", "Apis mellifera", "ACDEFGH")];
        let mut log = CurationLog::new();
        let out = Deduplicator::new(CrossOrganismPolicy::Remove).run(&mut records, &mut log).unwrap();
        assert_eq!(out.removed, 1);
        assert_eq!(records[0].status(), CurationStatus::DuplicateRemoved);
        assert!(records[1].is_clean());
        assert!(log.entries()[0].message.contains("to 3"));
        assert!(retained_pairs_unique(&records));
    }

    #[test]
    fn every_removed_record_has_a_retained_twin() {
        let mut records = vec![
            rec("1", "Vespa crabro", "KKLLAA"),
            rec("2", "Vespa crabro", "KKLLAA"),
            rec("3", "Vespa crabro", "KKLLAA"),
            rec("4", "Vespa velutina", "MMNNPP"),
            rec("5", "Vespa velutina", "MMNNPP"),
            rec("6", "Vespa velutina", "QQRRSS"),
        ];
        let mut log = CurationLog::new();
        Deduplicator::new(CrossOrganismPolicy::Remove).run(&mut records, &mut log).unwrap();
        assert!(retained_pairs_unique(&records));
        for r in records.iter().filter(|r| !r.is_retained()) {
            assert!(records.iter().any(|k| k.is_retained() && k.mature == r.mature && k.organism == r.organism));
        }
        assert_eq!(log.count(Stage::Dedup, Action::Removed), 3);
    }

    #[test]
    fn cross_organism_policy_is_configurable() {
        let fresh = || vec![rec("1", "Apis mellifera", "ACDEFGH"), rec("2", "Bombus terrestris", "ACDEFGH")];

        let mut records = fresh();
        Deduplicator::new(CrossOrganismPolicy::Remove).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(records[1].status(), CurationStatus::DuplicateRemoved);

        let mut records = fresh();
        let out = Deduplicator::new(CrossOrganismPolicy::Flag).run(&mut records, &mut CurationLog::new()).unwrap();
        assert_eq!(out.flagged, 1);
        assert_eq!(records[1].status(), CurationStatus::PendingReview);

        let mut records = fresh();
        let mut log = CurationLog::new();
        Deduplicator::new(CrossOrganismPolicy::Keep).run(&mut records, &mut log).unwrap();
        assert!(records.iter().all(|r| r.is_clean()));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn empty_mature_is_reported_not_grouped() {
        let mut records = vec![rec("1", "Apis mellifera", ""), rec("2", "Apis mellifera", "")];
        let mut log = CurationLog::new();
        let out = Deduplicator::new(CrossOrganismPolicy::Remove).run(&mut records, &mut log).unwrap();
        assert_eq!(out, DedupOutcome { removed: 0, flagged: 0, malformed: 2 });
        assert!(records.iter().all(|r| r.is_clean()));
    }

    #[test]
    fn report_separates_mature_full_and_both() {
        let mut records = vec![
            rec("1", "A", "AAAA").with_full("MMAAAA"),
            rec("2", "A", "AAAA").with_full("MMAAAA"),
            rec("3", "B", "CCCC"),
            rec("4", "C", "CCCC"),
            rec("5", "D", "GGGG").with_full("MMKKGGGG"),
            rec("6", "E", "KKGGGG").with_full("MMKKGGGG"),
        ];
        for (i, r) in records.iter_mut().enumerate() { r.line = i + 1; }
        let report = DuplicateReport::analyse(&records);
        assert_eq!(report.both.len(), 1);
        assert_eq!(report.both[0].members, vec![0, 1]);
        assert_eq!(report.mature_only.len(), 1);
        assert_eq!(report.mature_only[0].mature, "CCCC");
        assert_eq!(report.full_only.len(), 1);
        assert_eq!(report.full_only[0].members, vec![4, 5]);

        let mut out = Vec::new();
        report.write_to(&mut out, &records).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Entries with both sequences duplicated: 1"));
        assert!(text.contains("Line 3: 3;B;clean"));
    }
}
