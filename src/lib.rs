#![forbid(unsafe_code)]
//! # venomcur
//!
//! Curation of **venom protein** tables: a semicolon-delimited dataset of toxin records
//! (identifier, species, mature sequence, full precursor sequence) is read once, passed
//! through a fixed sequence of stages and written back with curation columns and a
//! decision log.
//!
//! ## Stages
//! 1. validation of identifiers, the residue alphabet and the mature-in-full invariant
//!    ([`pipeline::validate_records`]);
//! 2. deduplication ([`dedup::Deduplicator`]);
//! 3. signal peptide reconciliation against SignalP ([`annotator::Annotator`]);
//! 4. propeptide reconciliation against DeepPeptide (same contract);
//! 5. gap detection and backfilling from an auxiliary source
//!    ([`completeness::CompletenessResolver`]).
//!
//! Records are never deleted. Each one ends a run as `clean`, `duplicate-removed`,
//! `gap-flagged` or `pending-review`; the last two are returned to `clean` only by a manual
//! decision ([`review`]).
//!
//! ## Predictors
//! Prediction tools are black boxes behind the one-method [`Predictor`] trait. Back ends
//! read SignalP 6.0 and DeepPeptide JSON output, or run `signalp6` directly.
//!
//! ## Example
//! ```rust
//! use venomcur::{CurationConfig, Dataset, Pipeline, Prediction, ProteinRecord, StaticPredictor, ToolInfo, Boundary};
//!
//! let ds = Dataset::new(vec![
//!     ProteinRecord::new("1", "Apis mellifera", "ACDEFGH"),
//!     ProteinRecord::new("2", "Apis mellifera", "ACDEFGH"),
//! ]);
//! let signalp = StaticPredictor::new(ToolInfo::new("SignalP", "6.0"))
//!     .with("1", Prediction::cleaved(Boundary::new(0, 2), 0.97));
//! let mut pipeline = Pipeline::new(ds, CurationConfig::default())?.signal_predictor(Box::new(signalp));
//! let summary = pipeline.run()?;
//! assert_eq!(summary.dedup.removed, 1);
//! assert_eq!(pipeline.dataset().records[0].mature, "DEFGH");
//! # Ok::<(), venomcur::CurationError>(())
//! ```

pub mod annotator;
pub mod aux_source;
pub mod completeness;
pub mod config;
pub mod decision_log;
pub mod dedup;
pub mod deeppeptide;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod predictor;
pub mod record;
pub mod review;
pub mod signalp;
pub mod table;

pub use config::{AnnotatorConfig, ColumnConfig, CrossOrganismPolicy, CurationConfig, SubmitTarget};
pub use decision_log::{Action, CurationLog, LogEntry, Stage};
pub use error::{CurationError, CurationResult};
pub use pipeline::{Pipeline, RunSummary};
pub use predictor::{Prediction, Predictor, StaticPredictor, ToolInfo};
pub use record::{Boundary, CurationStatus, ProteinRecord};
pub use table::Dataset;

/// Crate version string (from `CARGO_PKG_VERSION`).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
