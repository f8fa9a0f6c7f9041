//! Auxiliary sequence source used to backfill missing sequences.
//!
//! Either a table in the dataset format (any column layout understood by
//! [`Dataset`]) or a FASTA file. FASTA headers in UniProt style
//! (`>sp|P01501|MEL_APIME Melittin OS=Apis mellifera OX=7460 ...`) are indexed by the
//! full id, the accession and the entry name, and carry the organism from `OS=`.
use std::collections::HashMap;
use std::path::Path;

use needletail::parse_fastx_file;
use tracing::debug;

use crate::config::ColumnConfig;
use crate::error::{CurationError, CurationResult};
use crate::record::normalize_sequence;
use crate::table::Dataset;

#[derive(Clone, Debug, PartialEq)]
pub struct AuxEntry {
    pub id: String,
    pub organism: Option<String>,
    pub full: Option<String>,
    pub mature: Option<String>,
}

impl AuxEntry {
    /// `true` unless the entry names a different organism.
    pub fn organism_agrees(&self, organism: &str) -> bool {
        self.organism.as_deref().map_or(true, |o| o.trim().eq_ignore_ascii_case(organism.trim()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct AuxSource {
    label: String,
    entries: Vec<AuxEntry>,
    by_key: HashMap<String, Vec<usize>>,
    by_organism: HashMap<String, Vec<usize>>,
}

impl AuxSource {
    /// Load by extension: `.fasta`, `.fa`, `.faa`, `.fas`, `.fna` (optionally `.gz`) are FASTA,
    /// anything else is read as a semicolon-delimited table.
    pub fn from_path<P: AsRef<Path>>(path: P, columns: &ColumnConfig) -> CurationResult<Self> {
        let p = path.as_ref();
        let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        let name = name.trim_end_matches(".gz");
        let is_fasta = [".fasta", ".fa", ".faa", ".fas", ".fna"].iter().any(|ext| name.ends_with(ext));
        let label = p.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        if is_fasta {
            Self::from_fasta_path(p, label)
        } else {
            Ok(Self::from_dataset(&Dataset::from_path(p, columns)?, label))
        }
    }

    pub fn from_dataset(ds: &Dataset, label: impl Into<String>) -> Self {
        let mut src = AuxSource { label: label.into(), ..Default::default() };
        for r in &ds.records {
            src.push(vec![r.id.clone()], AuxEntry {
                id: r.id.clone(),
                organism: Some(r.organism.clone()).filter(|o| !o.is_empty()),
                full: r.full.clone(),
                mature: Some(r.mature.clone()).filter(|m| !m.is_empty()),
            });
        }
        src
    }

    pub fn from_fasta_path<P: AsRef<Path>>(path: P, label: impl Into<String>) -> CurationResult<Self> {
        let mut src = AuxSource { label: label.into(), ..Default::default() };
        let mut reader = parse_fastx_file(path.as_ref()).map_err(|e| CurationError::Fasta(e.to_string()))?;
        while let Some(record) = reader.next() {
            let rec = record.map_err(|e| CurationError::Fasta(e.to_string()))?;
            let header = String::from_utf8_lossy(rec.id()).to_string();
            let seq = normalize_sequence(&String::from_utf8_lossy(&rec.seq()));
            src.push_fasta(&header, seq);
        }
        debug!(source = %src.label, entries = src.entries.len(), "auxiliary FASTA loaded");
        Ok(src)
    }

    /// Add one FASTA record (header without the leading `>`).
    pub fn push_fasta(&mut self, header: &str, sequence: String) {
        let (keys, organism) = parse_header(header);
        let id = keys.first().cloned().unwrap_or_default();
        self.push(keys, AuxEntry { id, organism, full: Some(sequence).filter(|s| !s.is_empty()), mature: None });
    }

    fn push(&mut self, keys: Vec<String>, entry: AuxEntry) {
        let i = self.entries.len();
        for k in keys {
            let list = self.by_key.entry(k).or_default();
            if !list.contains(&i) { list.push(i); }
        }
        if let Some(o) = &entry.organism {
            self.by_organism.entry(o.trim().to_ascii_lowercase()).or_default().push(i);
        }
        self.entries.push(entry);
    }

    pub fn label(&self) -> &str { &self.label }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Entries indexed under `key`, in load order.
    pub fn lookup<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a AuxEntry> + 'a {
        self.by_key.get(key.trim()).into_iter().flatten().map(move |&i| &self.entries[i])
    }

    /// Entries recorded for `organism` (case-insensitive), in load order.
    pub fn for_organism<'a>(&'a self, organism: &str) -> impl Iterator<Item = &'a AuxEntry> + 'a {
        self.by_organism.get(&organism.trim().to_ascii_lowercase()).into_iter().flatten().map(move |&i| &self.entries[i])
    }
}

/// Keys and organism from a FASTA header.
fn parse_header(header: &str) -> (Vec<String>, Option<String>) {
    let header = header.trim().trim_start_matches('>');
    let first = header.split_whitespace().next().unwrap_or_default().to_string();
    let mut keys = vec![first.clone()];
    let parts: Vec<&str> = first.split('|').collect();
    if parts.len() == 3 && (parts[0] == "sp" || parts[0] == "tr") {
        keys.push(parts[1].to_string());
        keys.push(parts[2].to_string());
    }
    let organism = header.split_once("OS=").map(|(_, rest)| {
        let mut end = rest.len();
        for tag in [" OX=", " GN=", " PE=", " SV="] {
            if let Some(pos) = rest.find(tag) { end = end.min(pos); }
        }
        rest[..end].trim().to_string()
    });
    (keys, organism.filter(|o| !o.is_empty()))
}
