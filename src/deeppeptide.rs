//! DeepPeptide back end.
//!
//! DeepPeptide writes one JSON document per run:
//! `PREDICTIONS` → `>id` → `peptides[]`, each peptide with 1-based inclusive `start`/`end`
//! and a `type` of `Peptide` or `Propeptide`. The earliest propeptide of an entry is
//! reported as the cleaved segment; an entry with peptides but no propeptide is an
//! uncleaved call.
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::CurationResult;
use crate::predictor::{record_key, Prediction, Predictor, ToolInfo};
use crate::record::Boundary;

pub const PROPEPTIDE: &str = "Propeptide";

#[derive(Deserialize)]
struct DeepPeptideFile {
    #[serde(rename = "PREDICTIONS", default)]
    predictions: HashMap<String, DeepPeptideEntry>,
}

#[derive(Deserialize)]
struct DeepPeptideEntry {
    #[serde(default)]
    peptides: Vec<Peptide>,
}

#[derive(Deserialize)]
struct Peptide {
    start: usize,
    end: usize,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, alias = "prob", alias = "probability", alias = "score")]
    confidence: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct DeepPeptideJson {
    tool: ToolInfo,
    calls: HashMap<String, Prediction>,
}

impl DeepPeptideJson {
    pub fn from_path<P: AsRef<Path>>(path: P) -> CurationResult<Self> {
        let file = File::open(path.as_ref())?;
        let parsed: DeepPeptideFile = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self::from_entries(parsed))
    }

    pub fn from_json(text: &str) -> CurationResult<Self> {
        let parsed: DeepPeptideFile = serde_json::from_str(text)?;
        Ok(Self::from_entries(parsed))
    }

    fn from_entries(parsed: DeepPeptideFile) -> Self {
        let mut calls = HashMap::new();
        for (key, entry) in parsed.predictions {
            let id = record_key(&key);
            let propeptides: Vec<&Peptide> = entry.peptides.iter().filter(|p| p.kind == PROPEPTIDE).collect();
            let call = match propeptides.iter().min_by_key(|p| p.start) {
                Some(p) if p.start >= 1 && p.start <= p.end => {
                    if propeptides.len() > 1 {
                        warn!(id = %id, n = propeptides.len(), "several propeptides predicted; using the N-terminal one");
                    }
                    Prediction::cleaved(Boundary::new(p.start - 1, p.end), p.confidence.unwrap_or(1.0))
                }
                Some(_) => continue,
                None => {
                    let conf = entry.peptides.iter().filter_map(|p| p.confidence).reduce(f64::max);
                    Prediction::uncleaved(conf.unwrap_or(1.0))
                }
            };
            calls.insert(id, call);
        }
        debug!(entries = calls.len(), "DeepPeptide JSON loaded");
        DeepPeptideJson { tool: ToolInfo::new("DeepPeptide", "1.0"), calls }
    }

    pub fn len(&self) -> usize { self.calls.len() }

    pub fn is_empty(&self) -> bool { self.calls.is_empty() }
}

impl Predictor for DeepPeptideJson {
    fn tool(&self) -> &ToolInfo { &self.tool }

    fn predict(&self, id: &str, _sequence: &str) -> CurationResult<Option<Prediction>> { Ok(self.calls.get(id).copied()) }

    fn sequence_bound(&self) -> bool { false }
}
