#[path = "common/mod.rs"]
mod common;

use cnvsketch::genomics::{AlignmentSource, MemorySource, SourceError};
use cnvsketch::{CnvPipeline, CnvType, GenomicInterval, PipelineConfig, PipelineError};
use common::{baseline_with_median, cohort_and_sample, reads_with_depths};

#[test]
fn two_pass_pipeline_calls_deletions_and_duplications() {
    let (cohort, sample) = cohort_and_sample();
    let pipeline = CnvPipeline::new(PipelineConfig::new(100).with_min_bins(2)).unwrap();

    let baseline = pipeline
        .build_baseline(MemorySource::new(cohort))
        .expect("baseline pass succeeds")
        .output;
    assert_eq!(baseline.p50, 10.0);
    assert_eq!(baseline.total_bins, 30);

    let report = pipeline
        .detect(MemorySource::new(sample), &baseline)
        .expect("detection pass succeeds");
    let calls = report.output;

    assert_eq!(report.stats.chromosomes, 2);
    assert_eq!(calls.len(), 2, "single-bin events fall below min_bins");
    assert_eq!(calls[0].cnv_type, CnvType::Deletion);
    assert_eq!((calls[0].start, calls[0].end, calls[0].num_bins), (500, 800, 3));
    assert_eq!(calls[0].mean_coverage, 2.0);
    assert_eq!(calls[1].cnv_type, CnvType::Duplication);
    assert_eq!((calls[1].start, calls[1].end, calls[1].num_bins), (1200, 1400, 2));
}

#[test]
fn runs_never_cross_chromosome_boundaries() {
    // Last bin of chr1 and first bin of chr2 are both deletions.
    let mut intervals = reads_with_depths("chr1", &[10, 10, 1]);
    intervals.extend(reads_with_depths("chr2", &[1, 1, 10]));

    let pipeline = CnvPipeline::new(PipelineConfig::new(100)).unwrap();
    let calls = pipeline
        .detect(MemorySource::new(intervals), &baseline_with_median(100, 10.0))
        .unwrap()
        .output;

    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].chrom.as_ref(), "chr1");
    assert_eq!((calls[0].start, calls[0].end), (200, 300));
    assert_eq!(calls[1].chrom.as_ref(), "chr2");
    assert_eq!((calls[1].start, calls[1].end, calls[1].num_bins), (0, 200, 2));
}

#[test]
fn uncovered_bin_splits_a_deletion() {
    // Bin 3 receives no reads at all and so never enters the sparse map.
    let intervals = reads_with_depths("chr1", &[10, 2, 2, 0, 2, 10]);

    let pipeline = CnvPipeline::new(PipelineConfig::new(100)).unwrap();
    let calls = pipeline
        .detect(MemorySource::new(intervals), &baseline_with_median(100, 10.0))
        .unwrap()
        .output;

    assert_eq!(calls.len(), 2);
    assert_eq!((calls[0].start, calls[0].end, calls[0].num_bins), (100, 300, 2));
    assert_eq!((calls[1].start, calls[1].end, calls[1].num_bins), (400, 500, 1));
}

#[test]
fn read_spanning_bins_counts_once_per_bin() {
    // One read covering four bins plus two short reads in bin 1.
    let intervals = vec![
        GenomicInterval::primary("chr1", 0, 400),
        GenomicInterval::primary("chr1", 120, 130),
        GenomicInterval::primary("chr1", 150, 160),
    ];

    let pipeline = CnvPipeline::new(PipelineConfig::new(100)).unwrap();
    let calls = pipeline
        .detect(MemorySource::new(intervals), &baseline_with_median(100, 2.0))
        .unwrap()
        .output;

    // Thresholds 1.0 / 3.0 leave every bin normal: bin 1 has coverage 3, the others 1.
    assert!(calls.is_empty());
}

#[test]
fn min_bins_filter_is_inclusive() {
    let (cohort, sample) = cohort_and_sample();
    let run = |min_bins: u64| {
        let pipeline = CnvPipeline::new(PipelineConfig::new(100).with_min_bins(min_bins)).unwrap();
        let baseline = pipeline
            .build_baseline(MemorySource::new(cohort.clone()))
            .unwrap()
            .output;
        pipeline
            .detect(MemorySource::new(sample.clone()), &baseline)
            .unwrap()
            .output
    };

    assert_eq!(run(1).len(), 4);
    let two = run(2);
    assert_eq!(two.len(), 2);
    assert!(two.iter().any(|call| call.num_bins == 2));
    assert_eq!(run(3).len(), 1);
    assert!(run(4).is_empty());
}

#[test]
fn chromosome_interleaving_is_fatal() {
    let intervals = vec![
        GenomicInterval::primary("chr1", 0, 50),
        GenomicInterval::primary("chr2", 0, 50),
        GenomicInterval::primary("chr1", 100, 150),
    ];
    let pipeline = CnvPipeline::new(PipelineConfig::new(100)).unwrap();
    let err = pipeline
        .detect(MemorySource::new(intervals), &baseline_with_median(100, 10.0))
        .unwrap_err();
    assert!(err.to_string().contains("chr1"));
}

/// Replays `intervals` and then fails instead of ending the stream.
struct TruncatedSource {
    inner: MemorySource,
}

impl AlignmentSource for TruncatedSource {
    fn next_interval(&mut self) -> Result<Option<GenomicInterval>, SourceError> {
        match self.inner.next_interval()? {
            Some(interval) => Ok(Some(interval)),
            None => Err(SourceError::UnknownTarget(7)),
        }
    }
}

#[test]
fn read_failure_mid_stream_aborts_both_passes() {
    let (cohort, sample) = cohort_and_sample();
    let pipeline = CnvPipeline::new(PipelineConfig::new(100)).unwrap();

    let err = pipeline
        .build_baseline(TruncatedSource {
            inner: MemorySource::new(cohort[..50].to_vec()),
        })
        .unwrap_err();
    assert!(matches!(err, PipelineError::Source(SourceError::UnknownTarget(7))));

    // Enough of the sample to hold a complete chr1 deletion before the failure.
    let result = pipeline.detect(
        TruncatedSource {
            inner: MemorySource::new(sample[..sample.len() - 1].to_vec()),
        },
        &baseline_with_median(100, 10.0),
    );
    assert!(matches!(
        result,
        Err(PipelineError::Source(SourceError::UnknownTarget(7)))
    ));
}
