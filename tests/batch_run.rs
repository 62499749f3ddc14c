use std::fs;
use std::path::Path;
use std::sync::Arc;

use irma_batch::config::defs::{LabelPolicy, PipelineError, RunConfig, Segment};
use irma_batch::config::settings::BatchConfig;
use irma_batch::pipelines::batch::{self, RunSummary};
use irma_batch::utils::fastx::read_segment_records;
use irma_batch::PipelineStage;

const BATCH: &str = "B1";

/// Passes reads through, except for barcode05 which fails.
const FILTLONG_STUB: &str = r#"for a; do last=$a; done
case "$last" in *barcode05*) echo "filtlong: simulated failure" >&2; exit 1;; esac
cat "$last""#;

/// Writes every amended consensus segment except MP (7).
const IRMA_STUB: &str = r#"out=$3; id=$(basename "$out")
mkdir -p "$out/amended_consensus"
for n in 1 2 3 4 5 6 8; do
  printf '>%s_%s\nACGTACGT\nAC\n' "$id" "$n" > "$out/amended_consensus/${id}_$n.fa"
done"#;

/// Records which reference it was given and how many pooled records it saw.
const NEXTCLADE_STUB: &str = r#"ref=""; out=""; base=""; pool=""
while [ $# -gt 0 ]; do
  case "$1" in
    --input-ref) ref=$2; shift 2;;
    --output-all) out=$2; shift 2;;
    --output-basename) base=$2; shift 2;;
    *) pool=$1; shift;;
  esac
done
test -s "$ref" || exit 2
mkdir -p "$out"
head -n 1 "$ref" > "$out/$base.ref"
grep -c '>' "$pool" > "$out/$base.count""#;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string(), "stub".to_string()]
}

/// One FASTQ chunk per barcode, except barcode12 which has no raw directory at all.
fn write_raw_reads(raw_dir: &Path) {
    for n in 1..=24 {
        if n == 12 {
            continue;
        }
        let dir = raw_dir.join(format!("barcode{:02}", n));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("chunk_0.fastq"), "@r1\nACGTACGTAC\n+\nIIIIIIIIII\n").unwrap();
        fs::write(dir.join("chunk_1.fastq"), "@r2\nGGGGCCCC\n+\nIIIIIIII\n").unwrap();
    }
}

fn write_references(path: &Path) {
    let mut body = String::new();
    for segment in Segment::ALL {
        body.push_str(&format!(">ref_{}\nACGTACGTACGT\n", segment));
    }
    fs::write(path, body).unwrap();
}

fn batch_config(root: &Path) -> BatchConfig {
    let raw_dir = root.join("fastq_pass");
    write_raw_reads(&raw_dir);
    let collection = root.join("references.fasta");
    write_references(&collection);

    let mut batch = BatchConfig {
        batch_id: BATCH.to_string(),
        raw_dir,
        reference_collection: Some(collection),
        concurrency: 4,
        ..Default::default()
    };
    for segment in Segment::ALL {
        batch.references.insert(segment.name().to_string(), format!("ref_{}", segment));
    }
    batch.samples.insert("barcode01".to_string(), "Clinic-A".to_string());
    batch.samples.insert("barcode02".to_string(), "Clinic-B".to_string());
    batch.tools.filtlong = sh(FILTLONG_STUB);
    batch.tools.irma = sh(IRMA_STUB);
    batch.tools.nextclade = sh(NEXTCLADE_STUB);
    batch
}

fn run_config(root: &Path, batch: BatchConfig, from_stage: PipelineStage, skip_clade: bool) -> Arc<RunConfig> {
    Arc::new(RunConfig {
        out_dir: root.join("out"),
        batch,
        from_stage,
        skip_clade,
    })
}

fn scratch_dirs(out: &Path) -> Vec<String> {
    fs::read_dir(out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("references_"))
        .collect()
}

fn pool_records(summary: &RunSummary, segment: Segment, policy: LabelPolicy) -> usize {
    summary
        .pools
        .iter()
        .find(|p| p.segment == segment && p.policy == policy)
        .map(|p| p.records)
        .unwrap()
}


#[tokio::test]
async fn test_full_batch_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let config = run_config(dir.path(), batch_config(dir.path()), PipelineStage::Ingest, false);
    let out = config.out_dir.clone();

    let summary = batch::run(config).await.unwrap();

    let ingest = summary.stage("ingest").unwrap();
    assert_eq!((ingest.succeeded(), ingest.skipped(), ingest.failed()), (23, 1, 0));
    assert_eq!(ingest.results.len(), 24);
    assert_eq!(
        fs::read_to_string(out.join("ingest/barcode03.fastq")).unwrap(),
        "@r1\nACGTACGTAC\n+\nIIIIIIIIII\n@r2\nGGGGCCCC\n+\nIIIIIIII\n"
    );

    let filter = summary.stage("filter").unwrap();
    assert_eq!((filter.succeeded(), filter.skipped(), filter.failed()), (22, 1, 1));
    assert!(!filter.get("barcode05").unwrap().is_success());
    assert!(!out.join("filtered/barcode05.fastq").exists());
    assert!(out.join("logs/barcode05_filtlong.log").exists());

    let assemble = summary.stage("assemble").unwrap();
    assert_eq!((assemble.succeeded(), assemble.skipped(), assemble.failed()), (22, 2, 0));
    assert!(out.join("irma_output/barcode06/amended_consensus/barcode06_4.fa").exists());

    for policy in [LabelPolicy::Full, LabelPolicy::SampleOnly] {
        assert_eq!(pool_records(&summary, Segment::HA, policy), 22);
        assert_eq!(pool_records(&summary, Segment::MP, policy), 0);
    }
    assert!(!out.join("irma_consensus/MP_consensus_B1.fasta").exists());
    assert!(!out.join("irma_consensus/MP_B1.fasta").exists());

    let full = read_segment_records(&out.join("irma_consensus/NA_consensus_B1.fasta")).unwrap();
    assert_eq!(full.len(), 22);
    assert_eq!(full[0].header, "B1_barcode01|Clinic-A|barcode01_6");
    assert_eq!(full[2].header, "B1_barcode03|barcode03|barcode03_6");
    assert!(full.iter().all(|r| !r.header.contains("barcode05") && !r.header.contains("barcode12")));

    let sample_only = read_segment_records(&out.join("irma_consensus/NA_B1.fasta")).unwrap();
    let labels: Vec<&str> = sample_only.iter().take(3).map(|r| r.header.as_str()).collect();
    assert_eq!(labels, vec!["Clinic-A", "Clinic-B", "barcode03"]);

    let clade = summary.clade.as_ref().unwrap();
    assert!(summary.clade_error.is_none());
    assert_eq!((clade.succeeded(), clade.skipped(), clade.failed()), (7, 1, 0));
    assert_eq!(
        fs::read_to_string(out.join("nextclade_results/even_segments/HA_B1.ref")).unwrap(),
        ">ref_HA\n"
    );
    assert_eq!(
        fs::read_to_string(out.join("nextclade_results/even_segments/HA_B1.count")).unwrap().trim(),
        "22"
    );
    assert!(out.join("nextclade_results/odd_segments/PB2_B1.count").exists());
    assert!(!out.join("nextclade_results/odd_segments/MP_B1.count").exists());
    assert!(out.join("logs/HA_nextclade.log").exists());
    assert!(scratch_dirs(&out).is_empty());
}

#[tokio::test]
async fn test_resume_from_aggregate_needs_no_upstream_tools() {
    let dir = tempfile::tempdir().unwrap();
    let batch = batch_config(dir.path());
    batch::run(run_config(dir.path(), batch.clone(), PipelineStage::Ingest, true)).await.unwrap();
    let out = dir.path().join("out");
    let first = fs::read_to_string(out.join("irma_consensus/HA_consensus_B1.fasta")).unwrap();

    let mut resumed = batch;
    resumed.tools.filtlong = vec!["no-such-filtlong".to_string()];
    resumed.tools.irma = vec!["no-such-irma".to_string()];
    let summary = batch::run(run_config(dir.path(), resumed, PipelineStage::Aggregate, true)).await.unwrap();

    assert!(summary.stages.is_empty());
    assert!(summary.clade.is_none());
    assert_eq!(pool_records(&summary, Segment::PA, LabelPolicy::Full), 22);
    assert_eq!(fs::read_to_string(out.join("irma_consensus/HA_consensus_B1.fasta")).unwrap(), first);
    assert!(!out.join("nextclade_results/even_segments/HA_B1.count").exists());
}

#[tokio::test]
async fn test_unknown_reference_aborts_only_clade() {
    let dir = tempfile::tempdir().unwrap();
    let mut batch = batch_config(dir.path());
    batch.references.insert("NA".to_string(), "ref_NA_2009".to_string());
    let config = run_config(dir.path(), batch, PipelineStage::Ingest, false);
    let out = config.out_dir.clone();

    let summary = batch::run(config).await.unwrap();

    assert!(summary.clade.is_none());
    assert!(summary.clade_error.as_ref().unwrap().contains("ref_NA_2009"));
    assert_eq!(pool_records(&summary, Segment::NA, LabelPolicy::Full), 22);
    assert!(!out.join("nextclade_results/even_segments/HA_B1.count").exists());
    assert!(!out.join("nextclade_results/odd_segments/PB2_B1.count").exists());
    assert!(scratch_dirs(&out).is_empty());
}

#[tokio::test]
async fn test_missing_tool_stops_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let mut batch = batch_config(dir.path());
    batch.tools.irma = vec!["no-such-irma-binary".to_string()];
    let config = run_config(dir.path(), batch, PipelineStage::Ingest, false);
    let out = config.out_dir.clone();

    let err = batch::run(config).await.unwrap_err();

    assert!(matches!(err, PipelineError::MissingTool(ref tool) if tool == "no-such-irma-binary"));
    assert!(err.is_fatal());
    assert!(!out.join("ingest").exists());
}

#[tokio::test]
async fn test_missing_reference_collection_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut batch = batch_config(dir.path());
    batch.reference_collection = Some(dir.path().join("nowhere.fasta"));
    let config = run_config(dir.path(), batch, PipelineStage::Ingest, false);

    let err = batch::run(config).await.unwrap_err();
    assert!(matches!(err, PipelineError::MissingReference(_)));
}

#[tokio::test]
async fn test_collection_removed_mid_run_aborts_only_clade() {
    let dir = tempfile::tempdir().unwrap();
    let mut batch = batch_config(dir.path());
    let collection = batch.reference_collection.clone().unwrap();
    // Passes preflight, then disappears while filtering runs.
    batch.tools.filtlong = sh(&format!("rm -f '{}'\n{}", collection.display(), FILTLONG_STUB));
    let config = run_config(dir.path(), batch, PipelineStage::Ingest, false);
    let out = config.out_dir.clone();

    let summary = batch::run(config).await.unwrap();

    assert!(!collection.exists());
    assert!(summary.clade.is_none());
    assert!(summary.clade_error.as_ref().unwrap().contains("references.fasta"));
    assert_eq!(pool_records(&summary, Segment::HA, LabelPolicy::Full), 22);
    assert!(out.join("irma_consensus/HA_B1.fasta").exists());
    assert!(!out.join("nextclade_results/even_segments/HA_B1.count").exists());
    assert!(scratch_dirs(&out).is_empty());
}
