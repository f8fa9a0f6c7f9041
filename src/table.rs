//! Loading and writing the semicolon-delimited dataset table.
//!
//! The table is read once into a [`Dataset`] and written back once at the end of a run.
//! Columns the tool does not interpret are carried through unchanged, in their original
//! position; curation columns missing from the input are appended on write.
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::config::ColumnConfig;
use crate::error::{CurationError, CurationResult};
use crate::record::{normalize_sequence, Boundary, CurationStatus, ProteinRecord};

const DELIMITER: u8 = b';';
const NOTE_SEPARATOR: &str = " | ";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Slot {
    Id,
    Organism,
    Mature,
    Full,
    SignalPeptide,
    Propeptide,
    Status,
    Provenance,
    Extra(usize),
}

/// The in-memory table: records in source order plus the header layout.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub records: Vec<ProteinRecord>,
    columns: ColumnConfig,
    layout: Vec<Slot>,
    extra_names: Vec<String>,
}

impl Dataset {
    /// Build a table from records with the default column layout.
    pub fn new(records: Vec<ProteinRecord>) -> Self { Self::with_columns(records, ColumnConfig::default()) }

    pub fn with_columns(records: Vec<ProteinRecord>, columns: ColumnConfig) -> Self {
        let layout = vec![Slot::Id, Slot::Organism, Slot::Mature, Slot::Full];
        let mut ds = Dataset { records, columns, layout, extra_names: Vec::new() };
        for (i, r) in ds.records.iter_mut().enumerate() {
            if r.line == 0 { r.line = i + 1; }
        }
        ds
    }

    pub fn from_path<P: AsRef<Path>>(path: P, columns: &ColumnConfig) -> CurationResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, columns)
    }

    /// Parse a table. The identifier, organism and mature columns are required.
    pub fn from_reader<R: Read>(reader: R, columns: &ColumnConfig) -> CurationResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let header: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| if i == 0 { h.trim_start_matches('\u{feff}').trim().to_string() } else { h.trim().to_string() })
            .collect();

        let mut layout = Vec::with_capacity(header.len());
        let mut extra_names = Vec::new();
        for h in &header {
            let slot = match h.as_str() {
                n if n == columns.id => Slot::Id,
                n if n == columns.organism => Slot::Organism,
                n if n == columns.mature => Slot::Mature,
                n if n == columns.full => Slot::Full,
                n if n == columns.signal_peptide => Slot::SignalPeptide,
                n if n == columns.propeptide => Slot::Propeptide,
                n if n == columns.status => Slot::Status,
                n if n == columns.provenance => Slot::Provenance,
                _ => {
                    extra_names.push(h.clone());
                    Slot::Extra(extra_names.len() - 1)
                }
            };
            layout.push(slot);
        }
        for (slot, name) in [(Slot::Id, &columns.id), (Slot::Organism, &columns.organism), (Slot::Mature, &columns.mature)] {
            if !layout.contains(&slot) { return Err(CurationError::MissingColumn(name.clone())); }
        }

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        for (i, row) in rdr.records().enumerate() {
            let row = row?;
            let mut rec = ProteinRecord::new("", "", "");
            rec.line = i + 1;
            rec.extra = vec![String::new(); extra_names.len()];
            for (slot, value) in layout.iter().zip(row.iter()) {
                let value = value.trim();
                match *slot {
                    Slot::Id => rec.id = value.to_string(),
                    Slot::Organism => rec.organism = value.to_string(),
                    Slot::Mature => rec.mature = normalize_sequence(value),
                    Slot::Full => {
                        let full = normalize_sequence(value);
                        rec.full = if full.is_empty() { None } else { Some(full) };
                    }
                    Slot::SignalPeptide => rec.signal_peptide = parse_boundary(value)?,
                    Slot::Propeptide => rec.propeptide = parse_boundary(value)?,
                    Slot::Status => rec.restore_status(value.parse::<CurationStatus>()?),
                    Slot::Provenance => {
                        rec.provenance = value.split(NOTE_SEPARATOR).map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
                    }
                    Slot::Extra(j) => rec.extra[j] = value.to_string(),
                }
            }
            if rec.id.is_empty() {
                warn!(line = rec.line, "row without identifier");
            } else if !seen.insert(rec.id.clone()) {
                warn!(id = %rec.id, line = rec.line, "identifier appears more than once");
            }
            records.push(rec);
        }
        debug!(records = records.len(), extra_columns = extra_names.len(), "table loaded");

        Ok(Dataset { records, columns: columns.clone(), layout, extra_names })
    }

    /// Column names in output order.
    pub fn header(&self) -> Vec<String> {
        self.output_layout().iter().map(|s| self.slot_name(*s).to_string()).collect()
    }

    pub fn to_path<P: AsRef<Path>>(&self, path: P) -> CurationResult<()> {
        let file = File::create(path.as_ref())?;
        self.write_to(file)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> CurationResult<()> {
        let layout = self.output_layout();
        let mut w = csv::WriterBuilder::new().delimiter(DELIMITER).from_writer(writer);
        w.write_record(layout.iter().map(|s| self.slot_name(*s)))?;
        for r in &self.records {
            let row: Vec<String> = layout.iter().map(|s| slot_value(r, *s)).collect();
            w.write_record(&row)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn columns(&self) -> &ColumnConfig { &self.columns }

    pub fn get(&self, id: &str) -> Option<&ProteinRecord> { self.records.iter().find(|r| r.id == id) }

    pub fn position(&self, id: &str) -> Option<usize> { self.records.iter().position(|r| r.id == id) }

    /// Index of the record loaded from 1-based data row `line`.
    pub fn position_of_line(&self, line: usize) -> Option<usize> { self.records.iter().position(|r| r.line == line) }

    pub fn count(&self, status: CurationStatus) -> usize { self.records.iter().filter(|r| r.status() == status).count() }

    /// Position in [`ProteinRecord::extra`] of the pass-through column `name`.
    pub fn extra_index(&self, name: &str) -> Option<usize> { self.extra_names.iter().position(|n| n == name) }

    /// Distinct organisms of retained records, sorted.
    pub fn species(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.records.iter().filter(|r| r.is_retained() && !r.organism.is_empty()).map(|r| r.organism.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn output_layout(&self) -> Vec<Slot> {
        let mut layout = self.layout.clone();
        for slot in [Slot::Full, Slot::SignalPeptide, Slot::Propeptide, Slot::Status, Slot::Provenance] {
            if !layout.contains(&slot) { layout.push(slot); }
        }
        layout
    }

    fn slot_name(&self, slot: Slot) -> &str {
        match slot {
            Slot::Id => &self.columns.id,
            Slot::Organism => &self.columns.organism,
            Slot::Mature => &self.columns.mature,
            Slot::Full => &self.columns.full,
            Slot::SignalPeptide => &self.columns.signal_peptide,
            Slot::Propeptide => &self.columns.propeptide,
            Slot::Status => &self.columns.status,
            Slot::Provenance => &self.columns.provenance,
            Slot::Extra(j) => &self.extra_names[j],
        }
    }
}

fn parse_boundary(value: &str) -> CurationResult<Option<Boundary>> {
    if value.is_empty() { Ok(None) } else { value.parse().map(Some) }
}

fn slot_value(r: &ProteinRecord, slot: Slot) -> String {
    match slot {
        Slot::Id => r.id.clone(),
        Slot::Organism => r.organism.clone(),
        Slot::Mature => r.mature.clone(),
        Slot::Full => r.full.clone().unwrap_or_default(),
        Slot::SignalPeptide => r.signal_peptide.map(|b| b.to_string()).unwrap_or_default(),
        Slot::Propeptide => r.propeptide.map(|b| b.to_string()).unwrap_or_default(),
        Slot::Status => r.status().to_string(),
        Slot::Provenance => r.provenance.join(NOTE_SEPARATOR),
        Slot::Extra(j) => r.extra.get(j).cloned().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\u{feff}Unique_ID;Study;Species;UniProt_ID;mature_seq;full_seq\n\
                         1;Smith 2020;Apis mellifera;P01501;giGAVLkvLTTGLPALISWIKRKRQQ;MKFLVNVALVFMVVYISYIYAGIGAVLKVLTTGLPALISWIKRKRQQ\n\
                         2;Smith 2020;Apis mellifera;;ACDEFGH;\n";

    #[test]
    fn loads_bom_header_and_extra_columns() {
        let ds = Dataset::from_reader(TABLE.as_bytes(), &ColumnConfig::default()).unwrap();
        assert_eq!(ds.len(), 2);
        let r = &ds.records[0];
        assert_eq!(r.id, "1");
        assert_eq!(r.organism, "Apis mellifera");
        assert_eq!(r.mature, "GIGAVLKVLTTGLPALISWIKRKRQQ");
        assert_eq!(r.extra, vec!["Smith 2020".to_string(), "P01501".to_string()]);
        assert!(ds.records[1].full.is_none());
        assert_eq!(ds.records[1].line, 2);
    }

    #[test]
    fn writes_original_columns_then_curation_columns() {
        let mut ds = Dataset::from_reader(TABLE.as_bytes(), &ColumnConfig::default()).unwrap();
        ds.records[1].signal_peptide = Some(Boundary::new(0, 2));
        ds.records[1].set_status(CurationStatus::PendingReview).unwrap();
        ds.records[1].add_note("SignalP 6.0");
        ds.records[1].add_note("manual");

        let mut out = Vec::new();
        ds.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Unique_ID;Study;Species;UniProt_ID;mature_seq;full_seq;signal_peptide;propeptide;curation_status;provenance"
        );
        assert!(text.contains("2;Smith 2020;Apis mellifera;;ACDEFGH;;1-2;;pending-review;SignalP 6.0 | manual"));

        let again = Dataset::from_reader(text.as_bytes(), &ColumnConfig::default()).unwrap();
        assert_eq!(again.records, ds.records);
        assert_eq!(again.header(), ds.header());
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let err = Dataset::from_reader("Unique_ID;Species\n1;x\n".as_bytes(), &ColumnConfig::default()).unwrap_err();
        assert!(matches!(err, CurationError::MissingColumn(c) if c == "mature_seq"));
    }
}
