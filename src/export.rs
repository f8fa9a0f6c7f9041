//! Views of a curated table: FASTA for external predictors and a per-organism summary.
use std::collections::BTreeMap;
use std::io::Write;

use bio::io::fasta;
use polars::prelude::*;

use crate::config::SubmitTarget;
use crate::error::CurationResult;
use crate::record::{CurationStatus, ProteinRecord};

/// Write retained records as FASTA, one sequence line per record.
///
/// `Mature` writes the recorded mature sequences; `Precursor` prefers the full sequence.
/// Records with nothing to write are skipped. Returns the number of records written.
pub fn write_fasta<W: Write>(records: &[ProteinRecord], source: SubmitTarget, writer: W) -> CurationResult<usize> {
    let mut w = fasta::Writer::new(writer);
    let mut n = 0;
    for r in records.iter().filter(|r| r.is_retained()) {
        let seq = match source {
            SubmitTarget::Mature => r.mature.as_str(),
            SubmitTarget::Precursor => r.precursor(),
        };
        if seq.is_empty() || r.id.is_empty() { continue; }
        let desc = Some(r.organism.as_str()).filter(|o| !o.is_empty());
        w.write(&r.id, desc, seq.as_bytes())?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

/// Status counts per organism, one row per organism plus a `total` row.
pub fn summary_frame(records: &[ProteinRecord]) -> PolarsResult<DataFrame> {
    let mut counts: BTreeMap<&str, [u64; 4]> = BTreeMap::new();
    for r in records {
        let slot = CurationStatus::ALL.iter().position(|s| *s == r.status()).unwrap_or(0);
        counts.entry(r.organism.as_str()).or_default()[slot] += 1;
    }
    let mut total = [0u64; 4];
    for c in counts.values() {
        for (t, n) in total.iter_mut().zip(c) { *t += n; }
    }

    let mut organism: Vec<String> = counts.keys().map(|o| o.to_string()).collect();
    organism.push("total".to_string());
    let rows: Vec<[u64; 4]> = counts.values().copied().chain(std::iter::once(total)).collect();
    let column = |k: usize| rows.iter().map(|c| c[k]).collect::<Vec<u64>>();

    df!(
        "organism"          => organism,
        "clean"             => column(0),
        "duplicate-removed" => column(1),
        "gap-flagged"       => column(2),
        "pending-review"    => column(3),
        "records"           => rows.iter().map(|c| c.iter().sum::<u64>()).collect::<Vec<u64>>(),
    )
}

/// Show every row and column when a frame is printed.
pub fn configure_polars_display() {
    std::env::set_var("POLARS_FMT_TABLE_FORMATTING", "UTF8_FULL");
    std::env::set_var("POLARS_FMT_MAX_COLS", "100");
    std::env::set_var("POLARS_FMT_MAX_ROWS", "1000000");
    std::env::set_var("POLARS_FMT_STR_LEN", "200");
}
