#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use cnvsketch::{BaselineComputer, BaselineStats, GenomicInterval, KllSketch, QuantileEstimator};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("CNVSKETCH_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set CNVSKETCH_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// `depth` reads of 50bp inside each bin `0..bins` of a 100bp grid.
pub fn uniform_reads(chrom: &str, bins: u64, depth: u32) -> Vec<GenomicInterval> {
    reads_with_depths(chrom, &vec![depth; bins as usize])
}

/// Reads placed so that bin `i` of a 100bp grid has coverage `depths[i]`.
pub fn reads_with_depths(chrom: &str, depths: &[u32]) -> Vec<GenomicInterval> {
    let mut intervals = Vec::new();
    for (bin, &depth) in depths.iter().enumerate() {
        let start = bin as u64 * 100 + 10;
        for _ in 0..depth {
            intervals.push(GenomicInterval::primary(chrom, start, start + 50));
        }
    }
    intervals
}

/// Baseline whose median, and therefore thresholds, come from a single value.
pub fn baseline_with_median(bin_size: u64, median: f64) -> BaselineStats {
    let mut sketch = KllSketch::default();
    sketch.update(median);
    BaselineComputer::new(0.5, 1.5)
        .build(bin_size, &sketch)
        .expect("single-value baseline")
}

/// Cohort and sample used by the end-to-end tests: the sample carries a
/// three-bin deletion, a two-bin duplication and two single-bin events.
pub fn cohort_and_sample() -> (Vec<GenomicInterval>, Vec<GenomicInterval>) {
    let mut cohort = uniform_reads("chr1", 20, 10);
    cohort.extend(uniform_reads("chr2", 10, 10));

    let mut chr1 = vec![10u32; 20];
    for bin in 5..=7 {
        chr1[bin] = 2;
    }
    chr1[12] = 30;
    chr1[13] = 30;
    chr1[17] = 3;
    let mut chr2 = vec![10u32; 10];
    chr2[9] = 40;

    let mut sample = reads_with_depths("chr1", &chr1);
    sample.extend(reads_with_depths("chr2", &chr2));
    (cohort, sample)
}
