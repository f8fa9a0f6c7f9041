//! Run configuration.
//!
//! A [`CurationConfig`] can be read from a JSON file; every field has a default, so a
//! partial file such as `{"cross_organism": "flag"}` is valid. Command line flags are
//! applied on top of the loaded value by the binary.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CurationError, CurationResult};

/// What to do with identical mature sequences recorded for different organisms.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrossOrganismPolicy {
    /// Keep the lowest identifier across organisms, mark the rest duplicate-removed.
    #[default]
    Remove,
    /// Keep all records, send the non-lowest ones to manual review.
    Flag,
    /// Keep all records, only log the match.
    Keep,
}

impl FromStr for CrossOrganismPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remove" => Ok(Self::Remove),
            "flag" => Ok(Self::Flag),
            "keep" => Ok(Self::Keep),
            other => Err(format!("Unknown cross-organism policy: {}", other)),
        }
    }
}

/// Which sequence of a record is sent to a predictor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitTarget {
    /// Full sequence when known, else the mature sequence.
    Precursor,
    /// The currently recorded mature sequence.
    Mature,
}

impl FromStr for SubmitTarget {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "precursor" | "full" => Ok(Self::Precursor),
            "mature" => Ok(Self::Mature),
            other => Err(format!("Unknown sequence source: {}", other)),
        }
    }
}

/// Table column names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnConfig {
    pub id: String,
    pub organism: String,
    pub mature: String,
    pub full: String,
    pub signal_peptide: String,
    pub propeptide: String,
    pub status: String,
    pub provenance: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id: "Unique_ID".into(),
            organism: "Species".into(),
            mature: "mature_seq".into(),
            full: "full_seq".into(),
            signal_peptide: "signal_peptide".into(),
            propeptide: "propeptide".into(),
            status: "curation_status".into(),
            provenance: "provenance".into(),
        }
    }
}

impl ColumnConfig {
    fn names(&self) -> [(&'static str, &str); 8] {
        [
            ("id", &self.id),
            ("organism", &self.organism),
            ("mature", &self.mature),
            ("full", &self.full),
            ("signal_peptide", &self.signal_peptide),
            ("propeptide", &self.propeptide),
            ("status", &self.status),
            ("provenance", &self.provenance),
        ]
    }
}

/// Reconciliation settings for one predictor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotatorConfig {
    /// Residues of disagreement accepted without changing the mature sequence.
    #[serde(default)]
    pub tolerance: usize,
    /// Calls below this confidence are treated as no-calls.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    pub submit: SubmitTarget,
}

fn default_min_confidence() -> f64 { 0.5 }

impl AnnotatorConfig {
    pub fn signal_peptide() -> Self {
        Self { tolerance: 0, min_confidence: default_min_confidence(), submit: SubmitTarget::Precursor }
    }

    pub fn propeptide() -> Self {
        Self { tolerance: 0, min_confidence: default_min_confidence(), submit: SubmitTarget::Mature }
    }
}

/// Configuration for a curation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CurationConfig {
    pub columns: ColumnConfig,
    pub cross_organism: CrossOrganismPolicy,
    /// Characters that mark a gap in a mature sequence.
    pub gap_symbols: String,
    /// Threads for predictor calls (`None` = all logical cores).
    pub threads: Option<usize>,
    /// Pass-through columns whose values are also tried as auxiliary lookup keys.
    pub aux_key_columns: Vec<String>,
    pub signal_peptide: AnnotatorConfig,
    pub propeptide: AnnotatorConfig,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            columns: ColumnConfig::default(),
            cross_organism: CrossOrganismPolicy::default(),
            gap_symbols: "-.?X".into(),
            threads: None,
            aux_key_columns: vec!["UniProt_ID".into()],
            signal_peptide: AnnotatorConfig::signal_peptide(),
            propeptide: AnnotatorConfig::propeptide(),
        }
    }
}

impl CurationConfig {
    /// Read a JSON configuration file and validate it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CurationResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: CurationConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> CurationResult<()> {
        let names = self.columns.names();
        for (i, (field, name)) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(config_error(&format!("columns.{}", field), "column name is empty"));
            }
            if names[..i].iter().any(|(_, other)| other == name) {
                return Err(config_error(&format!("columns.{}", field), &format!("column '{}' is used twice", name)));
            }
        }
        for (field, annot) in [("signal_peptide", &self.signal_peptide), ("propeptide", &self.propeptide)] {
            if !(0.0..=1.0).contains(&annot.min_confidence) {
                return Err(config_error(
                    &format!("{}.min_confidence", field),
                    &format!("{} is outside 0.0-1.0", annot.min_confidence),
                ));
            }
        }
        if self.threads == Some(0) {
            return Err(config_error("threads", "must be at least 1 (omit for all cores)"));
        }
        Ok(())
    }

    pub fn is_gap_symbol(&self, c: char) -> bool {
        self.gap_symbols.chars().any(|g| g.eq_ignore_ascii_case(&c))
    }
}

fn config_error(field: &str, message: &str) -> CurationError {
    CurationError::Config { field: field.to_string(), message: message.to_string() }
}
