//! SignalP 6.0 back ends.
//!
//! - [`SignalPJson`] reads the JSON summary SignalP writes for a batch run
//!   (`SEQUENCES` → id → `Prediction`, `CS_pos`, `Likelihood`).
//! - [`SignalPCommand`] runs `signalp6` on one sequence at a time and parses its
//!   tab-separated `prediction_results.txt`.
//!
//! Both report the signal peptide as the segment `0..N`, where `N` is the last signal
//! peptide residue given in the cleavage site text ("between pos. 20 and 21", "CS pos: 20-21").
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;

use bio::io::fasta;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CurationError, CurationResult};
use crate::predictor::{record_key, Prediction, Predictor, ToolInfo};
use crate::record::Boundary;

/// The only prediction class treated as a cleaved signal peptide.
pub const SEC_SPI: &str = "Signal Peptide (Sec/SPI)";

#[derive(Deserialize)]
struct SignalPFile {
    #[serde(rename = "SEQUENCES", default)]
    sequences: HashMap<String, SignalPEntry>,
}

#[derive(Deserialize)]
struct SignalPEntry {
    #[serde(rename = "Prediction", default)]
    prediction: String,
    #[serde(rename = "CS_pos", default)]
    cs_pos: Option<String>,
    #[serde(rename = "Likelihood", default)]
    likelihood: Option<Vec<f64>>,
}

/// Results of a batch SignalP run, loaded from its JSON output.
#[derive(Clone, Debug)]
pub struct SignalPJson {
    tool: ToolInfo,
    calls: HashMap<String, Prediction>,
}

impl SignalPJson {
    pub fn from_path<P: AsRef<Path>>(path: P) -> CurationResult<Self> {
        let file = File::open(path.as_ref())?;
        let parsed: SignalPFile = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self::from_entries(parsed))
    }

    pub fn from_json(text: &str) -> CurationResult<Self> {
        let parsed: SignalPFile = serde_json::from_str(text)?;
        Ok(Self::from_entries(parsed))
    }

    fn from_entries(parsed: SignalPFile) -> Self {
        let mut calls = HashMap::new();
        for (key, entry) in parsed.sequences {
            let likelihood = entry.likelihood.as_deref().and_then(|l| l.iter().copied().reduce(f64::max));
            let call = if entry.prediction == SEC_SPI {
                // An SP call without a readable cleavage site is a no-call.
                match entry.cs_pos.as_deref().and_then(parse_cs_between) {
                    Some((end, prob)) => Prediction::cleaved(Boundary::new(0, end), prob.or(likelihood).unwrap_or(1.0)),
                    None => continue,
                }
            } else {
                Prediction::uncleaved(likelihood.unwrap_or(1.0))
            };
            calls.insert(record_key(&key), call);
        }
        debug!(entries = calls.len(), "SignalP JSON loaded");
        SignalPJson { tool: ToolInfo::new("SignalP", "6.0"), calls }
    }

    pub fn len(&self) -> usize { self.calls.len() }

    pub fn is_empty(&self) -> bool { self.calls.is_empty() }
}

impl Predictor for SignalPJson {
    fn tool(&self) -> &ToolInfo { &self.tool }

    fn predict(&self, id: &str, _sequence: &str) -> CurationResult<Option<Prediction>> { Ok(self.calls.get(id).copied()) }

    fn sequence_bound(&self) -> bool { false }
}

/// Parse "Cleavage site between pos. 20 and 21. Probability 0.97" → `(20, Some(0.97))`.
pub fn parse_cs_between(cs: &str) -> Option<(usize, Option<f64>)> {
    let rest = cs.split("between pos. ").nth(1)?;
    let end: usize = rest.split(" and").next()?.split('.').next()?.trim().parse().ok()?;
    let prob = cs
        .split("Probability")
        .nth(1)
        .and_then(|p| p.trim().trim_end_matches('.').split_whitespace().next())
        .and_then(|p| p.parse::<f64>().ok());
    if end == 0 { None } else { Some((end, prob)) }
}

/// Parse a `prediction_results.txt` written by `signalp6 --format txt`.
///
/// Uses the first non-comment row: `id  prediction  OTHER  SP(Sec/SPI)  ...  CS pos: 20-21. Pr: 0.9736`.
pub fn parse_prediction_results(text: &str) -> Option<Prediction> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty() && !l.starts_with('#'))?;
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    let kind = *fields.get(1)?;
    let other: Option<f64> = fields.get(2).and_then(|f| f.parse().ok());
    let sp: Option<f64> = fields.get(3).and_then(|f| f.parse().ok());
    if kind != "SP" {
        return Some(Prediction::uncleaved(other.unwrap_or(1.0)));
    }
    let cs = fields.iter().find(|f| f.starts_with("CS pos:"))?;
    let end: usize = cs.trim_start_matches("CS pos:").trim().split('-').next()?.trim().parse().ok()?;
    let pr = cs.split("Pr:").nth(1).and_then(|p| p.trim().parse::<f64>().ok());
    if end == 0 { return None; }
    Some(Prediction::cleaved(Boundary::new(0, end), pr.or(sp).unwrap_or(1.0)))
}

/// Runs the `signalp6` executable once per sequence.
#[derive(Clone, Debug)]
pub struct SignalPCommand {
    tool: ToolInfo,
    program: PathBuf,
    organism: String,
    mode: String,
}

impl SignalPCommand {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        SignalPCommand {
            tool: ToolInfo::new("SignalP", "6.0"),
            program: program.into(),
            organism: "eukarya".into(),
            mode: "slow".into(),
        }
    }

    pub fn organism(mut self, organism: impl Into<String>) -> Self {
        self.organism = organism.into();
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    fn failure(&self, message: String) -> CurationError {
        CurationError::Predictor { tool: self.tool.to_string(), message }
    }
}

impl Predictor for SignalPCommand {
    fn tool(&self) -> &ToolInfo { &self.tool }

    fn predict(&self, id: &str, sequence: &str) -> CurationResult<Option<Prediction>> {
        // Every call gets its own directory so parallel calls never share files.
        let dir = tempfile::tempdir()?;
        let fasta_path = dir.path().join("query.fasta");
        let out_dir = dir.path().join("out");
        {
            let mut w = fasta::Writer::to_file(&fasta_path)?;
            w.write(id, None, sequence.as_bytes())?;
            w.flush()?;
        }

        let output = Command::new(&self.program)
            .arg("--fastafile").arg(&fasta_path)
            .arg("--organism").arg(&self.organism)
            .arg("--output_dir").arg(&out_dir)
            .arg("--format").arg("txt")
            .arg("--mode").arg(&self.mode)
            .output()
            .map_err(|e| self.failure(format!("cannot run {}: {}", self.program.display(), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("exit status {}: {}", output.status, stderr.trim())));
        }

        let results = fs::read_to_string(out_dir.join("prediction_results.txt"))?;
        Ok(parse_prediction_results(&results))
    }
}
