#[path = "common/mod.rs"]
mod common;

use std::collections::HashSet;

use blake3::hash;
use cnvsketch::genomics::MemorySource;
use cnvsketch::output::render_cnv_table;
use cnvsketch::{BaselineTable, CnvPipeline, GenomicInterval, PipelineConfig};

/// Large enough that the sketch compacts several times.
fn noisy_cohort() -> Vec<GenomicInterval> {
    let mut intervals = Vec::new();
    for bin in 0..5_000u64 {
        let depth = 5 + (bin * 7919 % 13);
        for _ in 0..depth {
            intervals.push(GenomicInterval::primary("chr1", bin * 100, bin * 100 + 20));
        }
    }
    intervals
}

#[test]
fn baseline_and_calls_are_deterministic() {
    let cohort = noisy_cohort();
    let (_, sample) = common::cohort_and_sample();

    let mut fingerprints = HashSet::new();
    for _ in 0..5 {
        let pipeline = CnvPipeline::new(PipelineConfig::new(100).with_sketch_k(32))
            .expect("pipeline initialises");
        let baseline = pipeline
            .build_baseline(MemorySource::new(cohort.clone()))
            .expect("baseline pass succeeds")
            .output
            .with_build_time(0.0);
        let calls = pipeline
            .detect(MemorySource::new(sample.clone()), &baseline)
            .expect("detection pass succeeds")
            .output;

        let mut table = BaselineTable::new();
        table.push(baseline);
        let mut rendered = Vec::new();
        table.write(&mut rendered).expect("baseline rendering succeeds");
        rendered.extend(render_cnv_table(&calls).expect("rendering succeeds").into_bytes());
        fingerprints.insert(hash(&rendered));
    }

    assert_eq!(fingerprints.len(), 1, "outputs diverged across runs");
}
