use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use venomcur::aux_source::AuxSource;
use venomcur::deeppeptide::DeepPeptideJson;
use venomcur::dedup::DuplicateReport;
use venomcur::export::{configure_polars_display, summary_frame, write_fasta};
use venomcur::review::{apply_review, parse_annotations, UncertainPolicy};
use venomcur::signalp::{SignalPCommand, SignalPJson};
use venomcur::{CrossOrganismPolicy, CurationConfig, CurationLog, CurationStatus, Dataset, Pipeline, SubmitTarget};

/// Venom protein table curation
#[derive(Parser)]
#[command(name = "venomcur")]
#[command(version)]
#[command(about = "Deduplicate, reconcile cleavage sites and backfill venom protein tables", long_about = None)]
struct Cli {
    /// JSON configuration (column names, policies, predictor settings)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full curation pipeline and write the curated table and decision log
    Curate {
        /// Input table (semicolon-delimited)
        input: PathBuf,
        /// Curated table to write
        #[arg(long, short)]
        output: PathBuf,
        /// Decision log to write
        #[arg(long, default_value = "curation_log.txt")]
        log: PathBuf,
        /// SignalP 6.0 JSON output for the table
        #[arg(long, conflicts_with = "signalp_exec")]
        signalp: Option<PathBuf>,
        /// Path to the signalp6 executable (runs one sequence at a time)
        #[arg(long)]
        signalp_exec: Option<PathBuf>,
        /// SignalP organism group when running the executable
        #[arg(long, default_value = "eukarya")]
        signalp_organism: String,
        /// DeepPeptide JSON output for the table
        #[arg(long)]
        deeppeptide: Option<PathBuf>,
        /// Auxiliary sequences for backfilling (table or FASTA)
        #[arg(long)]
        aux: Option<PathBuf>,
        /// Identical mature sequences across organisms: remove, flag or keep
        #[arg(long)]
        cross_organism: Option<CrossOrganismPolicy>,
        /// Residues of disagreement accepted by both annotators
        #[arg(long)]
        tolerance: Option<usize>,
        /// Minimum predictor confidence for both annotators (0.0-1.0)
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Threads for predictor calls (default: all)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Write a report of duplicated mature and full sequences (no changes to the table)
    Duplicates {
        input: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Apply manual review decisions (+ keep, - remove, ? uncertain)
    Review {
        input: PathBuf,
        /// Annotation file, one decision per line
        annotations: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
        /// How to treat lines marked '?': keep or remove
        #[arg(long, default_value = "keep")]
        uncertain: UncertainPolicy,
        /// Decision log to write
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Export retained records as FASTA
    Fasta {
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Sequence to export: precursor (what SignalP is run on) or mature
        #[arg(long, default_value = "precursor")]
        source: SubmitTarget,
    },

    /// List the species of retained records
    Species { input: PathBuf },

    /// Print status counts per species
    Summary { input: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("venomcur=info"))?)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CurationConfig::from_path(path).with_context(|| format!("reading config {}", path.display()))?,
        None => CurationConfig::default(),
    };

    match cli.command {
        Commands::Curate {
            input,
            output,
            log,
            signalp,
            signalp_exec,
            signalp_organism,
            deeppeptide,
            aux,
            cross_organism,
            tolerance,
            min_confidence,
            threads,
        } => {
            let mut config = config;
            if let Some(policy) = cross_organism { config.cross_organism = policy; }
            if let Some(t) = tolerance {
                config.signal_peptide.tolerance = t;
                config.propeptide.tolerance = t;
            }
            if let Some(c) = min_confidence {
                config.signal_peptide.min_confidence = c;
                config.propeptide.min_confidence = c;
            }
            if threads.is_some() { config.threads = threads; }

            let ds = load(&input, &config)?;
            let mut pipeline = Pipeline::new(ds, config.clone())?;
            if let Some(path) = signalp {
                let p = SignalPJson::from_path(&path).with_context(|| format!("reading SignalP output {}", path.display()))?;
                info!(entries = p.len(), "SignalP results loaded");
                pipeline = pipeline.signal_predictor(Box::new(p));
            } else if let Some(exec) = signalp_exec {
                pipeline = pipeline.signal_predictor(Box::new(SignalPCommand::new(exec).organism(signalp_organism)));
            } else {
                warn!("no SignalP input; signal peptide pass skipped");
            }
            if let Some(path) = deeppeptide {
                let p = DeepPeptideJson::from_path(&path).with_context(|| format!("reading DeepPeptide output {}", path.display()))?;
                info!(entries = p.len(), "DeepPeptide results loaded");
                pipeline = pipeline.propeptide_predictor(Box::new(p));
            } else {
                warn!("no DeepPeptide input; propeptide pass skipped");
            }
            if let Some(path) = aux {
                let src = AuxSource::from_path(&path, &config.columns)
                    .with_context(|| format!("reading auxiliary sequences {}", path.display()))?;
                info!(entries = src.len(), source = src.label(), "auxiliary sequences loaded");
                pipeline = pipeline.aux_source(src);
            }

            let summary = pipeline.run()?;
            pipeline.write(&output, &log).with_context(|| format!("writing {}", output.display()))?;
            let ds = pipeline.dataset();
            info!(
                records = ds.len(),
                clean = ds.count(CurationStatus::Clean),
                removed = ds.count(CurationStatus::DuplicateRemoved),
                gap_flagged = ds.count(CurationStatus::GapFlagged),
                pending = ds.count(CurationStatus::PendingReview),
                malformed = summary.malformed,
                "curation finished"
            );
        }

        Commands::Duplicates { input, output } => {
            let ds = load(&input, &config)?;
            let report = DuplicateReport::analyse(&ds.records);
            let mut w = BufWriter::new(File::create(&output).with_context(|| format!("creating {}", output.display()))?);
            report.write_to(&mut w, &ds.records)?;
            w.flush()?;
            info!(
                mature_only = report.mature_only.len(),
                full_only = report.full_only.len(),
                both = report.both.len(),
                "duplicate report written to {}",
                output.display()
            );
        }

        Commands::Review { input, annotations, output, uncertain, log } => {
            let mut ds = load(&input, &config)?;
            let text = fs::read_to_string(&annotations).with_context(|| format!("reading {}", annotations.display()))?;
            let parsed = parse_annotations(&text);
            if parsed.is_empty() {
                bail!("no review decisions found in {}", annotations.display());
            }
            let mut decisions = CurationLog::new();
            let out = apply_review(&mut ds, &parsed, uncertain, &mut decisions)?;
            ds.to_path(&output).with_context(|| format!("writing {}", output.display()))?;
            if let Some(path) = log {
                decisions.to_path(&path).with_context(|| format!("writing {}", path.display()))?;
            }
            for id in &out.unknown {
                warn!("not in table: {}", id);
            }
            info!(resolved = out.resolved, removed = out.removed, unchanged = out.unchanged, "review applied");
        }

        Commands::Fasta { input, output, source } => {
            let ds = load(&input, &config)?;
            let n = match output {
                Some(path) => {
                    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
                    write_fasta(&ds.records, source, file)?
                }
                None => write_fasta(&ds.records, source, io::stdout().lock())?,
            };
            info!(records = n, "FASTA written");
        }

        Commands::Species { input } => {
            let ds = load(&input, &config)?;
            let mut out = io::stdout().lock();
            for s in ds.species() {
                writeln!(out, "{}", s)?;
            }
        }

        Commands::Summary { input } => {
            let ds = load(&input, &config)?;
            let df = summary_frame(&ds.records)?;
            configure_polars_display();
            println!("{}", df);
        }
    }

    Ok(())
}

fn load(path: &Path, config: &CurationConfig) -> Result<Dataset> {
    let ds = Dataset::from_path(path, &config.columns).with_context(|| format!("reading table {}", path.display()))?;
    info!(records = ds.len(), "loaded {}", path.display());
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fasta_exports_precursors_by_default() {
        let cli = Cli::try_parse_from(["venomcur", "fasta", "curated.csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Fasta { source: SubmitTarget::Precursor, .. }));
        let cli = Cli::try_parse_from(["venomcur", "fasta", "curated.csv", "--source", "mature"]).unwrap();
        assert!(matches!(cli.command, Commands::Fasta { source: SubmitTarget::Mature, .. }));
    }
}
