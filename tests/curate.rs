use std::fs;

use venomcur::aux_source::AuxSource;
use venomcur::deeppeptide::DeepPeptideJson;
use venomcur::signalp::SignalPJson;
use venomcur::{CurationConfig, CurationStatus, Dataset, Pipeline};

const TABLE: &str = "Unique_ID;Species;UniProt_ID;mature_seq;full_seq\n\
1;Apis mellifera;P01501;GIGAVLKVLTTGLPALISWIKRKRQQG;MKFLVNVALVFMVVYISYIYAAPEPEPAPEPEAEADAEADPEAGIGAVLKVLTTGLPALISWIKRKRQQG\n\
2;Apis mellifera;;GIGAVLKVLTTGLPALISWIKRKRQQG;\n\
3;Vespa crabro;;INLKALAALAKKIL;\n\
4;Vespa crabro;;KLMX-NPQ;\n\
5;Bombus terrestris;;ACDEFGHIK;\n";

const SIGNALP: &str = r#"{"SEQUENCES": {
    "1": {"Prediction": "Signal Peptide (Sec/SPI)", "CS_pos": "Cleavage site between pos. 21 and 22. Probability 0.91", "Likelihood": [0.02, 0.98]},
    "3": {"Prediction": "Other", "CS_pos": "", "Likelihood": [0.99, 0.01]},
    "4": {"Prediction": "Other", "CS_pos": "", "Likelihood": [0.95, 0.05]},
    "5": {"Prediction": "Signal Peptide (Sec/SPI)", "CS_pos": "Cleavage site between pos. 2 and 3. Probability 0.88", "Likelihood": [0.1, 0.9]}
}}"#;

const DEEPPEPTIDE: &str = r#"{"PREDICTIONS": {
    ">1": {"peptides": [{"start": 1, "end": 22, "type": "Propeptide"}, {"start": 23, "end": 48, "type": "Peptide"}]},
    ">3": {"peptides": [{"start": 1, "end": 14, "type": "Peptide"}]},
    ">4": {"peptides": [{"start": 1, "end": 8, "type": "Peptide"}]},
    ">5": {"peptides": [{"start": 1, "end": 7, "type": "Peptide"}]}
}}"#;

const AUX: &str = ">sp|P01503|MCDP_VESCR Mastoparan OS=Vespa crabro OX=7445\nMKKIMLLLAVILINLKALAALAKKIL\n";

#[test]
fn curate_table_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("toxins.csv");
    let output = dir.path().join("curated.csv");
    let log = dir.path().join("curation_log.txt");
    let aux_path = dir.path().join("uniprot.fasta");
    fs::write(&input, TABLE).unwrap();
    fs::write(&aux_path, AUX).unwrap();

    let config = CurationConfig::default();
    let ds = Dataset::from_path(&input, &config.columns).unwrap();
    let aux = AuxSource::from_path(&aux_path, &config.columns).unwrap();
    let mut pipeline = Pipeline::new(ds, config.clone())
        .unwrap()
        .signal_predictor(Box::new(SignalPJson::from_json(SIGNALP).unwrap()))
        .propeptide_predictor(Box::new(DeepPeptideJson::from_json(DEEPPEPTIDE).unwrap()))
        .aux_source(aux);
    let summary = pipeline.run().unwrap();
    pipeline.write(&output, &log).unwrap();

    assert_eq!(summary.dedup.removed, 1);

    let curated = Dataset::from_path(&output, &config.columns).unwrap();
    let by_id = |id: &str| curated.get(id).unwrap();

    // SignalP moves the mature start to residue 22; DeepPeptide then cuts 22-43 back off.
    let one = by_id("1");
    assert_eq!(one.status(), CurationStatus::Clean);
    assert_eq!(one.signal_peptide.map(|b| b.to_string()).as_deref(), Some("1-21"));
    assert_eq!(one.propeptide.map(|b| b.to_string()).as_deref(), Some("22-43"));
    assert_eq!(one.mature, "GIGAVLKVLTTGLPALISWIKRKRQQG");

    assert_eq!(by_id("2").status(), CurationStatus::DuplicateRemoved);

    // Full sequence found in the auxiliary FASTA by organism.
    let three = by_id("3");
    assert_eq!(three.full.as_deref(), Some("MKKIMLLLAVILINLKALAALAKKIL"));
    assert!(three.provenance.iter().any(|n| n.contains("uniprot.fasta")));

    assert_eq!(by_id("4").status(), CurationStatus::GapFlagged);

    // Predicted cleavage after residue 2: mature shortened, old sequence kept as full.
    let five = by_id("5");
    assert_eq!(five.mature, "DEFGHIK");
    assert_eq!(five.full.as_deref(), Some("ACDEFGHIK"));

    assert!(curated.records.iter().all(|r| r.is_consistent()));
    let text = fs::read_to_string(&log).unwrap();
    assert!(text.starts_with("Curation decision log"));
    assert!(text.contains("[dedup] 2: REMOVED"));
}

#[test]
fn rerunning_a_curated_table_changes_nothing() {
    let config = CurationConfig::default();
    let run = |ds: Dataset| {
        let mut p = Pipeline::new(ds, config.clone())
            .unwrap()
            .signal_predictor(Box::new(SignalPJson::from_json(SIGNALP).unwrap()));
        p.run().unwrap();
        p.into_parts().0
    };
    let first = run(Dataset::from_reader(TABLE.as_bytes(), &config.columns).unwrap());
    let mut buf = Vec::new();
    first.write_to(&mut buf).unwrap();
    let second = run(Dataset::from_reader(buf.as_slice(), &config.columns).unwrap());
    assert_eq!(first.records, second.records);
}
