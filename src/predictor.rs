//! The external predictor seam.
//!
//! SignalP and DeepPeptide are opaque tools: given a sequence they either call a
//! cleaved segment (with a confidence), call the sequence uncleaved, or make no call.
//! [`Predictor`] abstracts that contract so the annotator can be driven by parsed result
//! files, by a live `signalp6` run, or by a [`StaticPredictor`] in tests.
use std::collections::HashMap;
use std::fmt;

use crate::error::CurationResult;
use crate::record::Boundary;

/// Name and version of a prediction tool, used in provenance notes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        ToolInfo { name: name.into(), version: version.into() }
    }
}

impl fmt::Display for ToolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.name, self.version) }
}

/// A predictor call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    /// Cleaved segment in coordinates of the submitted sequence; `None` = no segment.
    pub cleaved: Option<Boundary>,
    /// Confidence in 0.0-1.0.
    pub confidence: f64,
}

impl Prediction {
    pub fn cleaved(boundary: Boundary, confidence: f64) -> Self { Prediction { cleaved: Some(boundary), confidence } }

    pub fn uncleaved(confidence: f64) -> Self { Prediction { cleaved: None, confidence } }
}

/// An external cleavage predictor.
///
/// `predict` returns `Ok(None)` for a no-call. Errors are reported per record by the
/// annotator and never abort a run.
pub trait Predictor: Send + Sync {
    fn tool(&self) -> &ToolInfo;

    fn predict(&self, id: &str, sequence: &str) -> CurationResult<Option<Prediction>>;

    /// Whether calls are computed from the submitted sequence. Result files keyed by
    /// identifier answer for whatever sequence was submitted when they were produced.
    fn sequence_bound(&self) -> bool { true }
}

/// Predictions held in memory, keyed by record identifier.
#[derive(Clone, Debug)]
pub struct StaticPredictor {
    tool: ToolInfo,
    calls: HashMap<String, Prediction>,
}

impl StaticPredictor {
    pub fn new(tool: ToolInfo) -> Self { StaticPredictor { tool, calls: HashMap::new() } }

    pub fn with(mut self, id: impl Into<String>, prediction: Prediction) -> Self {
        self.calls.insert(id.into(), prediction);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, prediction: Prediction) { self.calls.insert(id.into(), prediction); }

    pub fn len(&self) -> usize { self.calls.len() }

    pub fn is_empty(&self) -> bool { self.calls.is_empty() }
}

impl Predictor for StaticPredictor {
    fn tool(&self) -> &ToolInfo { &self.tool }

    fn predict(&self, id: &str, _sequence: &str) -> CurationResult<Option<Prediction>> { Ok(self.calls.get(id).copied()) }
}

/// Normalise a FASTA-style key (`>123 some description`) to the record identifier.
pub(crate) fn record_key(raw: &str) -> String {
    raw.trim().trim_start_matches('>').split_whitespace().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_predictor_answers_by_id() {
        let p = StaticPredictor::new(ToolInfo::new("SignalP", "6.0"))
            .with("1", Prediction::cleaved(Boundary::new(0, 2), 0.9))
            .with("2", Prediction::uncleaved(0.99));
        assert_eq!(p.tool().to_string(), "SignalP 6.0");
        assert_eq!(p.predict("1", "ACDEFGH").unwrap().unwrap().cleaved, Some(Boundary::new(0, 2)));
        assert_eq!(p.predict("2", "ACDEFGH").unwrap().unwrap().cleaved, None);
        assert!(p.predict("3", "ACDEFGH").unwrap().is_none());
    }

    #[test]
    fn record_keys_drop_marker_and_description() {
        assert_eq!(record_key(">123 Apis mellifera melittin"), "123");
        assert_eq!(record_key("  45 "), "45");
    }
}
