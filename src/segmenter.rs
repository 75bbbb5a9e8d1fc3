//! Run-length segmentation of binned coverage into CNV calls.
//!
//! One chromosome is processed at a time. Bins are visited in ascending
//! bin order and classified against the baseline thresholds; maximal runs
//! of contiguous bins with the same classification become calls.
//!
//! Bins with zero coverage never exist in the sparse map, so a stretch of
//! uncovered bins always breaks a run, even inside what is biologically a
//! single deletion.

use std::fmt;
use std::sync::Arc;

use crate::baseline::BaselineStats;
use crate::genomics::ChromosomeBins;

/// Direction of a copy-number change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CnvType {
    /// Coverage below the deletion threshold.
    Deletion,
    /// Coverage above the duplication threshold.
    Duplication,
}

impl CnvType {
    /// Short label used in output tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            CnvType::Deletion => "DEL",
            CnvType::Duplication => "DUP",
        }
    }
}

impl fmt::Display for CnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-bin classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinClass {
    /// Within the thresholds.
    Normal,
    /// Anomalous in the given direction.
    Anomalous(CnvType),
}

/// Candidate copy-number variant spanning `num_bins` contiguous bins.
#[derive(Debug, Clone, PartialEq)]
pub struct CnvCall {
    /// Chromosome name.
    pub chrom: Arc<str>,
    /// Start coordinate (0-based, inclusive), a multiple of the bin size.
    pub start: u64,
    /// End coordinate (exclusive), a multiple of the bin size.
    pub end: u64,
    /// Deletion or duplication.
    pub cnv_type: CnvType,
    /// Mean coverage over the run's bins.
    pub mean_coverage: f64,
    /// Number of bins in the run.
    pub num_bins: u64,
}

impl CnvCall {
    /// Length in bases.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Always false; calls span at least one bin.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Open run of anomalous bins.
#[derive(Debug, Clone, Copy)]
struct Run {
    cnv_type: CnvType,
    start_bin: u64,
    last_bin: u64,
    len: u64,
    sum: u64,
}

#[derive(Debug, Clone, Copy)]
enum RunState {
    Idle,
    InRun(Run),
}

/// Threshold-based segmenter for one bin width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CnvSegmenter {
    bin_size: u64,
    deletion_threshold: f64,
    duplication_threshold: f64,
}

impl CnvSegmenter {
    /// Segmenter with explicit thresholds.
    pub fn new(bin_size: u64, deletion_threshold: f64, duplication_threshold: f64) -> Self {
        Self {
            bin_size,
            deletion_threshold,
            duplication_threshold,
        }
    }

    /// Segmenter using a baseline's bin width and thresholds.
    pub fn from_baseline(baseline: &BaselineStats) -> Self {
        Self::new(
            baseline.bin_size,
            baseline.deletion_threshold,
            baseline.duplication_threshold,
        )
    }

    /// Bin width in bases.
    pub fn bin_size(&self) -> u64 {
        self.bin_size
    }

    /// Classify a single bin's coverage.
    pub fn classify(&self, coverage: u32) -> BinClass {
        let c = f64::from(coverage);
        if c < self.deletion_threshold {
            BinClass::Anomalous(CnvType::Deletion)
        } else if c > self.duplication_threshold {
            BinClass::Anomalous(CnvType::Duplication)
        } else {
            BinClass::Normal
        }
    }

    /// Segment one chromosome's bins.
    pub fn segment(&self, bins: &ChromosomeBins) -> Vec<CnvCall> {
        self.segment_sorted(bins.chrom(), &bins.sorted())
    }

    /// Segment `(bin_index, coverage)` pairs already sorted by bin index.
    pub fn segment_sorted(&self, chrom: &Arc<str>, sorted_bins: &[(u64, u32)]) -> Vec<CnvCall> {
        debug_assert!(sorted_bins.windows(2).all(|w| w[0].0 < w[1].0));

        let mut calls = Vec::new();
        let mut state = RunState::Idle;

        for &(bin, coverage) in sorted_bins {
            let cnv_type = match self.classify(coverage) {
                BinClass::Normal => {
                    self.flush(chrom, &mut state, &mut calls);
                    continue;
                }
                BinClass::Anomalous(cnv_type) => cnv_type,
            };

            if let RunState::InRun(run) = &mut state {
                if run.cnv_type == cnv_type && bin == run.last_bin + 1 {
                    run.last_bin = bin;
                    run.len += 1;
                    run.sum += u64::from(coverage);
                    continue;
                }
            }

            self.flush(chrom, &mut state, &mut calls);
            state = RunState::InRun(Run {
                cnv_type,
                start_bin: bin,
                last_bin: bin,
                len: 1,
                sum: u64::from(coverage),
            });
        }

        self.flush(chrom, &mut state, &mut calls);
        calls
    }

    /// Close the active run at its last bin, if any.
    fn flush(&self, chrom: &Arc<str>, state: &mut RunState, calls: &mut Vec<CnvCall>) {
        let run = match std::mem::replace(state, RunState::Idle) {
            RunState::InRun(run) if run.len > 0 => run,
            _ => return,
        };

        calls.push(CnvCall {
            chrom: Arc::clone(chrom),
            start: run.start_bin * self.bin_size,
            end: (run.last_bin + 1) * self.bin_size,
            cnv_type: run.cnv_type,
            mean_coverage: run.sum as f64 / run.len as f64,
            num_bins: run.len,
        });
    }
}

/// Drop calls shorter than `min_bins`; calls of exactly `min_bins` are kept.
pub fn filter_min_bins(calls: Vec<CnvCall>, min_bins: u64) -> Vec<CnvCall> {
    calls
        .into_iter()
        .filter(|call| call.num_bins >= min_bins)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn bins(chrom: &str, bin_size: u64, entries: &[(u64, u32)]) -> ChromosomeBins {
        let map: HashMap<u64, u32> = entries.iter().copied().collect();
        ChromosomeBins::new(chrom, bin_size, map)
    }

    #[test_case(0, BinClass::Anomalous(CnvType::Deletion); "zero is a deletion")]
    #[test_case(4, BinClass::Anomalous(CnvType::Deletion); "below deletion threshold")]
    #[test_case(5, BinClass::Normal; "deletion threshold is exclusive")]
    #[test_case(10, BinClass::Normal; "median")]
    #[test_case(15, BinClass::Normal; "duplication threshold is exclusive")]
    #[test_case(16, BinClass::Anomalous(CnvType::Duplication); "above duplication threshold")]
    fn classification_uses_strict_thresholds(coverage: u32, expected: BinClass) {
        let segmenter = CnvSegmenter::new(1000, 5.0, 15.0);
        assert_eq!(segmenter.classify(coverage), expected);
    }

    #[test]
    fn missing_bin_breaks_contiguity() {
        let segmenter = CnvSegmenter::new(100, 3.0, 100.0);
        let calls = segmenter.segment(&bins("chr1", 100, &[(0, 2), (1, 2), (2, 2), (4, 2)]));

        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].start, calls[0].end), (0, 300));
        assert_eq!(calls[0].num_bins, 3);
        assert_eq!(calls[0].cnv_type, CnvType::Deletion);
        assert_eq!(calls[0].mean_coverage, 2.0);
        assert_eq!((calls[1].start, calls[1].end), (400, 500));
        assert_eq!(calls[1].num_bins, 1);
        assert_eq!(calls[1].mean_coverage, 2.0);
    }

    #[test]
    fn normal_bin_closes_run_at_previous_bin() {
        let segmenter = CnvSegmenter::new(10, 5.0, 15.0);
        let calls = segmenter.segment(&bins("chr1", 10, &[(3, 20), (4, 30), (5, 10), (6, 1)]));

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].cnv_type, CnvType::Duplication);
        assert_eq!((calls[0].start, calls[0].end), (30, 50));
        assert_eq!(calls[0].mean_coverage, 25.0);
        assert_eq!(calls[1].cnv_type, CnvType::Deletion);
        assert_eq!((calls[1].start, calls[1].end), (60, 70));
    }

    #[test]
    fn type_change_splits_adjacent_bins() {
        let segmenter = CnvSegmenter::new(100, 5.0, 15.0);
        let calls = segmenter.segment(&bins("chr1", 100, &[(0, 1), (1, 2), (2, 40), (3, 50)]));

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].cnv_type, CnvType::Deletion);
        assert_eq!((calls[0].start, calls[0].end, calls[0].num_bins), (0, 200, 2));
        assert_eq!(calls[1].cnv_type, CnvType::Duplication);
        assert_eq!((calls[1].start, calls[1].end, calls[1].num_bins), (200, 400, 2));
        assert_eq!(calls[1].mean_coverage, 45.0);
    }

    #[test]
    fn contiguous_deletion_run_from_baseline() {
        let baseline = BaselineStats {
            bin_size: 1000,
            total_bins: 0,
            p1: 0.0,
            p5: 0.0,
            p25: 5.0,
            p50: 10.0,
            p75: 15.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
            iqr: 10.0,
            deletion_threshold: 5.0,
            duplication_threshold: 15.0,
            retained_items: 0,
            k: 200,
            build_time_seconds: 0.0,
        };
        let segmenter = CnvSegmenter::from_baseline(&baseline);
        let calls = segmenter.segment(&bins("chr2", 1000, &[(7, 1), (8, 2), (9, 1)]));

        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.chrom.as_ref(), "chr2");
        assert_eq!(call.start, 7 * 1000);
        assert_eq!(call.end, 10 * 1000);
        assert_eq!(call.cnv_type, CnvType::Deletion);
        assert_eq!(call.num_bins, 3);
        assert!((call.mean_coverage - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn unordered_map_is_sorted_before_segmenting() {
        let segmenter = CnvSegmenter::new(10, 5.0, 15.0);
        // Many keys so that hash iteration order differs from key order.
        let entries: Vec<(u64, u32)> = (0..64).rev().map(|b| (b, 1)).collect();
        let calls = segmenter.segment(&bins("chr1", 10, &entries));

        assert_eq!(calls.len(), 1);
        assert_eq!((calls[0].start, calls[0].end, calls[0].num_bins), (0, 640, 64));
    }

    #[test]
    fn empty_and_all_normal_chromosomes_emit_nothing() {
        let segmenter = CnvSegmenter::new(10, 5.0, 15.0);
        assert!(segmenter.segment(&bins("chr1", 10, &[])).is_empty());
        assert!(segmenter
            .segment(&bins("chr1", 10, &[(0, 10), (1, 12), (2, 8)]))
            .is_empty());
    }

    #[test]
    fn calls_satisfy_length_invariant() {
        let segmenter = CnvSegmenter::new(250, 5.0, 15.0);
        let calls = segmenter.segment(&bins(
            "chr1",
            250,
            &[(0, 1), (1, 1), (3, 20), (4, 20), (5, 20), (9, 3)],
        ));
        assert_eq!(calls.len(), 3);
        for call in &calls {
            assert!(call.start < call.end);
            assert!(call.num_bins >= 1);
            assert_eq!(call.len(), call.num_bins * 250);
        }
    }

    #[test]
    fn min_bins_boundary_is_inclusive() {
        let segmenter = CnvSegmenter::new(100, 3.0, 100.0);
        let calls = segmenter.segment(&bins("chr1", 100, &[(0, 1), (2, 1), (3, 1)]));
        assert_eq!(calls.iter().map(|c| c.num_bins).collect::<Vec<_>>(), vec![1, 2]);

        let kept = filter_min_bins(calls, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].num_bins, 2);
        assert_eq!(kept[0].start, 200);
    }

    #[test]
    fn cnv_type_labels() {
        assert_eq!(CnvType::Deletion.to_string(), "DEL");
        assert_eq!(CnvType::Duplication.as_str(), "DUP");
    }
}
