//! # Bounded-memory CNV calling from binned coverage
//!
//! Turns a position-sorted stream of alignments into candidate
//! copy-number-variant calls in two passes over the same input:
//!
//! 1. **Baseline pass**: filtered alignments are counted into fixed-width
//!    bins one chromosome at a time; every finished chromosome's bin
//!    coverages are fed into a KLL sketch. The sketch's percentiles give the
//!    deletion/duplication thresholds, persisted per bin width.
//! 2. **Detection pass**: the same binning is repeated and each finished
//!    chromosome is segmented into contiguous runs of bins below the
//!    deletion threshold or above the duplication threshold.
//!
//! Memory is bounded by the covered bins of one chromosome plus the O(k)
//! sketch, independent of genome size.
//!
//! ## Usage Example
//!
//! ```no_run
//! use cnvsketch::genomics::BamSource;
//! use cnvsketch::{CnvPipeline, PipelineConfig};
//!
//! let pipeline = CnvPipeline::new(PipelineConfig::new(1000).with_min_bins(3))?;
//! let baseline = pipeline.build_baseline(BamSource::from_path("cohort.bam")?)?.output;
//! let calls = pipeline
//!     .detect(BamSource::from_path("sample.bam")?, &baseline)?
//!     .output;
//! println!("{} candidate CNVs", calls.len());
//! # Ok::<(), cnvsketch::PipelineError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod baseline; // Percentiles, thresholds, persisted table
pub mod config; // Pipeline tunables
pub mod genomics; // Intervals, alignment sources, binning
pub mod output; // CNV table writer
pub mod qc; // Alignment quality summary
pub mod segmenter; // Run-length CNV segmentation
pub mod sketch; // Quantile estimators

// Re-exports for convenience
pub use baseline::{AnomalousBins, BaselineComputer, BaselineError, BaselineStats, BaselineTable};
pub use config::{ConfigError, PipelineConfig};
pub use genomics::{AlignmentSource, ChromosomeBins, CoverageBinner, GenomicInterval};
pub use segmenter::{filter_min_bins, CnvCall, CnvSegmenter, CnvType};
pub use sketch::{KllSketch, QuantileEstimator};

use std::time::{Duration, Instant};

use genomics::{BinningError, SourceError};
use thiserror::Error;
use tracing::{debug, info};

/// Records between progress messages.
const PROGRESS_INTERVAL: u64 = 10_000_000;

/// Errors that terminate a pass.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Alignment source failed to open or read.
    #[error("alignment source error: {0}")]
    Source(#[from] SourceError),

    /// Input was not grouped by chromosome.
    #[error("binning error: {0}")]
    Binning(#[from] BinningError),

    /// Baseline could not be built, stored or found.
    #[error("baseline error: {0}")]
    Baseline(#[from] BaselineError),

    /// Baseline built for a different bin width than the pass uses.
    #[error("baseline bin size {found} does not match configured bin size {expected}")]
    BinSizeMismatch {
        /// Configured bin width.
        expected: u64,
        /// Bin width of the supplied baseline.
        found: u64,
    },
}

/// Counters collected over one pass of the alignment stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Records pulled from the source.
    pub records: u64,
    /// Records dropped by the flag filter.
    pub filtered: u64,
    /// Records counted into bins.
    pub intervals_binned: u64,
    /// Chromosomes flushed.
    pub chromosomes: u64,
    /// Covered bins handed to the consumer, summed over chromosomes.
    pub bins: u64,
    /// Bins outside the thresholds. Estimated from the sketch on the
    /// baseline pass, counted exactly on the detection pass.
    pub anomalous: AnomalousBins,
}

/// Output of a pass together with its counters.
#[derive(Debug, Clone)]
pub struct PassReport<T> {
    /// Pass result.
    pub output: T,
    /// Stream counters.
    pub stats: PassStats,
}

/// Two-pass CNV calling orchestrator.
#[derive(Debug, Clone)]
pub struct CnvPipeline {
    config: PipelineConfig,
}

impl CnvPipeline {
    /// Validate `config` and build the pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Baseline pass using a KLL sketch with the configured `k`.
    pub fn build_baseline<S: AlignmentSource>(
        &self,
        source: S,
    ) -> Result<PassReport<BaselineStats>, PipelineError> {
        self.build_baseline_with(source, KllSketch::new(self.config.sketch_k))
    }

    /// Baseline pass feeding an arbitrary estimator.
    pub fn build_baseline_with<S, E>(
        &self,
        source: S,
        mut estimator: E,
    ) -> Result<PassReport<BaselineStats>, PipelineError>
    where
        S: AlignmentSource,
        E: QuantileEstimator,
    {
        info!(bin_size = self.config.bin_size, "starting baseline pass");
        let mut feed_time = Duration::ZERO;

        let mut stats = self.stream_chromosomes(source, |bins| {
            let started = Instant::now();
            for coverage in bins.coverages() {
                estimator.update(f64::from(coverage));
            }
            feed_time += started.elapsed();
            Ok(())
        })?;

        let baseline = self
            .config
            .baseline_computer()
            .build(self.config.bin_size, &estimator)?
            .with_build_time(feed_time.as_secs_f64());
        stats.anomalous = BaselineComputer::anomalous_bins(&baseline, &estimator)?;

        let (low_fence, high_fence) = baseline.iqr_fences();
        info!(
            records = stats.records,
            filtered = stats.filtered,
            bins = baseline.total_bins,
            retained = baseline.retained_items,
            compression = baseline.compression_ratio(),
            sketch_bytes = estimator.serialized_size(),
            p50 = baseline.p50,
            low_fence,
            high_fence,
            deletion_threshold = baseline.deletion_threshold,
            duplication_threshold = baseline.duplication_threshold,
            low_bins = stats.anomalous.below_deletion,
            high_bins = stats.anomalous.above_duplication,
            "baseline pass complete"
        );
        Ok(PassReport {
            output: baseline,
            stats,
        })
    }

    /// Detection pass: genome-wide calls, filtered by `min_bins`, in input
    /// chromosome order and ascending position within a chromosome.
    pub fn detect<S: AlignmentSource>(
        &self,
        source: S,
        baseline: &BaselineStats,
    ) -> Result<PassReport<Vec<CnvCall>>, PipelineError> {
        if baseline.bin_size != self.config.bin_size {
            return Err(PipelineError::BinSizeMismatch {
                expected: self.config.bin_size,
                found: baseline.bin_size,
            });
        }
        info!(
            bin_size = self.config.bin_size,
            deletion_threshold = baseline.deletion_threshold,
            duplication_threshold = baseline.duplication_threshold,
            "starting detection pass"
        );

        let segmenter = CnvSegmenter::from_baseline(baseline);
        let mut calls = Vec::new();
        let mut anomalous = AnomalousBins::default();
        let mut stats = self.stream_chromosomes(source, |bins| {
            for coverage in bins.coverages() {
                anomalous.record(segmenter.classify(coverage));
            }
            let chrom_calls = segmenter.segment(&bins);
            debug!(chrom = %bins.chrom(), calls = chrom_calls.len(), "segmented chromosome");
            calls.extend(chrom_calls);
            Ok(())
        })?;
        stats.anomalous = anomalous;

        let raw = calls.len();
        let calls = filter_min_bins(calls, self.config.min_bins);
        info!(
            records = stats.records,
            raw_calls = raw,
            kept_calls = calls.len(),
            low_bins = stats.anomalous.below_deletion,
            high_bins = stats.anomalous.above_duplication,
            min_bins = self.config.min_bins,
            "detection pass complete"
        );
        Ok(PassReport {
            output: calls,
            stats,
        })
    }

    /// Detection pass using the row of `table` matching the configured bin
    /// width.
    pub fn detect_with_table<S: AlignmentSource>(
        &self,
        source: S,
        table: &BaselineTable,
    ) -> Result<PassReport<Vec<CnvCall>>, PipelineError> {
        let baseline = BaselineComputer::load(table, self.config.bin_size)?;
        self.detect(source, &baseline)
    }

    /// Drive the source through the filter and binner, handing each finished
    /// chromosome to `on_flush`.
    fn stream_chromosomes<S, F>(&self, mut source: S, mut on_flush: F) -> Result<PassStats, PipelineError>
    where
        S: AlignmentSource,
        F: FnMut(ChromosomeBins) -> Result<(), PipelineError>,
    {
        let mut binner = CoverageBinner::new(self.config.bin_size);
        let mut stats = PassStats::default();

        while let Some(interval) = source.next_interval()? {
            stats.records += 1;
            if stats.records % PROGRESS_INTERVAL == 0 {
                debug!(records = stats.records, "pass progress");
            }
            if !self.config.flag_filter.passes(interval.flags) {
                stats.filtered += 1;
                continue;
            }

            stats.intervals_binned += 1;
            if let Some(finished) = binner.add_interval(&interval.chrom, interval.start, interval.end)? {
                stats.chromosomes += 1;
                stats.bins += finished.len() as u64;
                on_flush(finished)?;
            }
        }

        if let Some(finished) = binner.finish() {
            stats.chromosomes += 1;
            stats.bins += finished.len() as u64;
            on_flush(finished)?;
        }
        Ok(stats)
    }
}
