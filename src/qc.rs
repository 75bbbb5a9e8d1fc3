//! Alignment quality summary computed in one streaming pass.
//!
//! Mapping quality, read length and insert size are each summarised by a
//! [`KllSketch`], so memory does not grow with the number of records.

use std::path::Path;

use rust_htslib::bam::{self, Read};
use thiserror::Error;
use tracing::{debug, info};

use crate::genomics::{FLAG_PAIRED, FLAG_PROPER_PAIR, FLAG_UNMAPPED};
use crate::sketch::{KllSketch, QuantileEstimator, SketchError};

/// Records between progress messages.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Errors raised while scanning alignments for QC.
#[derive(Debug, Error)]
pub enum QcError {
    /// Failure opening or reading the alignment file.
    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    /// Summary query failed.
    #[error("quantile estimator error: {0}")]
    Sketch(#[from] SketchError),
}

/// Fields of one alignment record that the QC pass looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentMetrics {
    /// SAM flag bits.
    pub flags: u16,
    /// Mapping quality.
    pub mapq: u8,
    /// Number of bases in the stored sequence.
    pub read_length: u32,
    /// Observed template length (TLEN).
    pub insert_size: i64,
}

impl AlignmentMetrics {
    /// Extract the QC fields of an htslib record.
    pub fn from_record(record: &bam::Record) -> Self {
        Self {
            flags: record.flags(),
            mapq: record.mapq(),
            read_length: record.seq_len() as u32,
            insert_size: record.insert_size(),
        }
    }

    fn is_mapped(&self) -> bool {
        self.flags & FLAG_UNMAPPED == 0
    }

    fn is_proper_pair(&self) -> bool {
        self.flags & FLAG_PAIRED != 0 && self.flags & FLAG_PROPER_PAIR != 0 && self.insert_size > 0
    }
}

/// Percentile summary of one sketched quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSummary {
    /// Values observed.
    pub count: u64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// First quartile.
    pub p25: f64,
    /// Median.
    pub p50: f64,
    /// Third quartile.
    pub p75: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Observed values per retained item.
    pub compression: f64,
}

impl DistributionSummary {
    /// Summarise `estimator`; `None` when it saw nothing.
    pub fn from_estimator<E: QuantileEstimator + ?Sized>(
        estimator: &E,
    ) -> Result<Option<Self>, SketchError> {
        let (min, max) = match (estimator.min(), estimator.max()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Ok(None),
        };
        let retained = estimator.retained_count().max(1) as f64;
        Ok(Some(Self {
            count: estimator.count(),
            min,
            max,
            p25: estimator.quantile(0.25)?,
            p50: estimator.quantile(0.50)?,
            p75: estimator.quantile(0.75)?,
            p90: estimator.quantile(0.90)?,
            p99: estimator.quantile(0.99)?,
            compression: estimator.count() as f64 / retained,
        }))
    }
}

/// Finished QC report.
#[derive(Debug, Clone, PartialEq)]
pub struct QcReport {
    /// Records read, whatever their flags.
    pub total_reads: u64,
    /// Records without the unmapped flag.
    pub mapped_reads: u64,
    /// Properly paired records with a positive insert size.
    pub proper_pairs: u64,
    /// Mapping quality over every record.
    pub mapq: Option<DistributionSummary>,
    /// Read length over every record.
    pub read_length: Option<DistributionSummary>,
    /// Insert size over properly paired records.
    pub insert_size: Option<DistributionSummary>,
}

impl QcReport {
    /// Percentage of records that are mapped.
    pub fn mapped_percent(&self) -> f64 {
        if self.total_reads == 0 {
            0.0
        } else {
            100.0 * self.mapped_reads as f64 / self.total_reads as f64
        }
    }
}

/// Streaming accumulator behind [`QcReport`].
#[derive(Debug, Clone)]
pub struct AlignmentQc {
    total_reads: u64,
    mapped_reads: u64,
    proper_pairs: u64,
    mapq: KllSketch,
    read_length: KllSketch,
    insert_size: KllSketch,
}

impl AlignmentQc {
    /// Empty accumulator whose sketches use accuracy parameter `k`.
    pub fn new(k: u32) -> Self {
        Self {
            total_reads: 0,
            mapped_reads: 0,
            proper_pairs: 0,
            mapq: KllSketch::new(k),
            read_length: KllSketch::new(k),
            insert_size: KllSketch::new(k),
        }
    }

    /// Account for one record.
    pub fn observe(&mut self, metrics: &AlignmentMetrics) {
        self.total_reads += 1;
        self.mapq.update(f64::from(metrics.mapq));
        self.read_length.update(f64::from(metrics.read_length));
        if metrics.is_mapped() {
            self.mapped_reads += 1;
        }
        if metrics.is_proper_pair() {
            self.proper_pairs += 1;
            self.insert_size.update(metrics.insert_size as f64);
        }
    }

    /// Records observed so far.
    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    /// Summarise everything observed.
    pub fn report(&self) -> Result<QcReport, SketchError> {
        Ok(QcReport {
            total_reads: self.total_reads,
            mapped_reads: self.mapped_reads,
            proper_pairs: self.proper_pairs,
            mapq: DistributionSummary::from_estimator(&self.mapq)?,
            read_length: DistributionSummary::from_estimator(&self.read_length)?,
            insert_size: DistributionSummary::from_estimator(&self.insert_size)?,
        })
    }
}

/// Scan every record of the alignment file at `path`.
pub fn scan_bam<P: AsRef<Path>>(path: P, k: u32) -> Result<QcReport, QcError> {
    let mut reader = bam::Reader::from_path(path.as_ref())?;
    let mut record = bam::Record::new();
    let mut qc = AlignmentQc::new(k);

    while let Some(result) = reader.read(&mut record) {
        result?;
        qc.observe(&AlignmentMetrics::from_record(&record));
        if qc.total_reads() % PROGRESS_INTERVAL == 0 {
            debug!(records = qc.total_reads(), "qc progress");
        }
    }

    let report = qc.report()?;
    info!(
        path = %path.as_ref().display(),
        records = report.total_reads,
        mapped = report.mapped_reads,
        proper_pairs = report.proper_pairs,
        "qc pass complete"
    );
    Ok(report)
}
