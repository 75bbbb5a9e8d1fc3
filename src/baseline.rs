//! Cohort baseline: coverage percentiles and the CNV thresholds derived
//! from them, persisted as one CSV row per bin width.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::segmenter::{BinClass, CnvType};
use crate::sketch::{QuantileEstimator, SketchError};

/// Ranks extracted from the estimator, in column order.
pub const PERCENTILE_RANKS: [f64; 7] = [0.01, 0.05, 0.25, 0.50, 0.75, 0.95, 0.99];

/// Errors produced while building, storing or loading baselines.
#[derive(Debug, Error)]
pub enum BaselineError {
    /// No persisted row matches the requested bin width.
    #[error("no baseline for bin size {bin_size}")]
    NotFound {
        /// Requested bin width.
        bin_size: u64,
    },

    /// Estimator has not seen any bin.
    #[error("cannot build a baseline from an empty estimator")]
    EmptyEstimator,

    /// Estimator query failed.
    #[error("quantile estimator error: {0}")]
    Sketch(#[from] SketchError),

    /// Malformed or unwritable baseline table.
    #[error("baseline table error: {0}")]
    Csv(#[from] csv::Error),

    /// Underlying file I/O failed.
    #[error("baseline I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coverage distribution summary for one bin width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    /// Bin width in bases.
    pub bin_size: u64,
    /// Number of bin values summarised.
    pub total_bins: u64,
    /// 1st percentile.
    pub p1: f64,
    /// 5th percentile.
    pub p5: f64,
    /// First quartile.
    pub p25: f64,
    /// Median coverage.
    pub p50: f64,
    /// Third quartile.
    pub p75: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Smallest bin coverage.
    pub min: f64,
    /// Largest bin coverage.
    pub max: f64,
    /// Interquartile range `p75 - p25`.
    pub iqr: f64,
    /// Bins strictly below this coverage are deletion candidates.
    pub deletion_threshold: f64,
    /// Bins strictly above this coverage are duplication candidates.
    pub duplication_threshold: f64,
    /// Items retained by the estimator.
    pub retained_items: u64,
    /// Estimator accuracy parameter.
    #[serde(rename = "K")]
    pub k: u32,
    /// Seconds spent feeding the estimator.
    pub build_time_seconds: f64,
}

/// Bins classified as deletion or duplication candidates, out of `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalousBins {
    /// Bins considered.
    pub total: u64,
    /// Bins strictly below the deletion threshold.
    pub below_deletion: u64,
    /// Bins strictly above the duplication threshold.
    pub above_duplication: u64,
}

impl AnomalousBins {
    /// Count one bin into the matching tally.
    pub fn record(&mut self, class: BinClass) {
        self.total += 1;
        match class {
            BinClass::Anomalous(CnvType::Deletion) => self.below_deletion += 1,
            BinClass::Anomalous(CnvType::Duplication) => self.above_duplication += 1,
            BinClass::Normal => {}
        }
    }

    /// Percentage of bins below the deletion threshold.
    pub fn deletion_percent(&self) -> f64 {
        percent(self.below_deletion, self.total)
    }

    /// Percentage of bins above the duplication threshold.
    pub fn duplication_percent(&self) -> f64 {
        percent(self.above_duplication, self.total)
    }
}

impl std::ops::AddAssign for AnomalousBins {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.below_deletion += other.below_deletion;
        self.above_duplication += other.above_duplication;
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

/// Derives [`BaselineStats`] from a populated estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineComputer {
    deletion_ratio: f64,
    duplication_ratio: f64,
}

impl BaselineComputer {
    /// Thresholds are `p50 * deletion_ratio` and `p50 * duplication_ratio`.
    pub fn new(deletion_ratio: f64, duplication_ratio: f64) -> Self {
        Self {
            deletion_ratio,
            duplication_ratio,
        }
    }

    /// Summarise `estimator` for bins of width `bin_size`.
    ///
    /// `build_time_seconds` is left at zero; callers that time the pass fill
    /// it in with [`BaselineStats::with_build_time`].
    pub fn build<E: QuantileEstimator + ?Sized>(
        &self,
        bin_size: u64,
        estimator: &E,
    ) -> Result<BaselineStats, BaselineError> {
        let (min, max) = match (estimator.min(), estimator.max()) {
            (Some(min), Some(max)) if !estimator.is_empty() => (min, max),
            _ => return Err(BaselineError::EmptyEstimator),
        };

        let mut p = [0.0f64; PERCENTILE_RANKS.len()];
        for (slot, &rank) in p.iter_mut().zip(PERCENTILE_RANKS.iter()) {
            *slot = estimator.quantile(rank)?;
        }
        let [p1, p5, p25, p50, p75, p95, p99] = p;

        Ok(BaselineStats {
            bin_size,
            total_bins: estimator.count(),
            p1,
            p5,
            p25,
            p50,
            p75,
            p95,
            p99,
            min,
            max,
            iqr: p75 - p25,
            deletion_threshold: p50 * self.deletion_ratio,
            duplication_threshold: p50 * self.duplication_ratio,
            retained_items: estimator.retained_count() as u64,
            k: estimator.accuracy_parameter(),
            build_time_seconds: 0.0,
        })
    }

    /// Estimate how many of the summarised bins fall outside the thresholds
    /// of `stats`, from the estimator's rank function.
    pub fn anomalous_bins<E: QuantileEstimator + ?Sized>(
        stats: &BaselineStats,
        estimator: &E,
    ) -> Result<AnomalousBins, BaselineError> {
        if estimator.is_empty() {
            return Err(BaselineError::EmptyEstimator);
        }
        let total = estimator.count();
        let scale = |fraction: f64| (fraction * total as f64).round() as u64;

        let below_deletion = scale(estimator.rank(stats.deletion_threshold, false)?);
        let at_or_below_duplication = scale(estimator.rank(stats.duplication_threshold, true)?);
        Ok(AnomalousBins {
            total,
            below_deletion,
            above_duplication: total.saturating_sub(at_or_below_duplication),
        })
    }

    /// Baseline row for exactly `bin_size`; never falls back to another width.
    pub fn load(table: &BaselineTable, bin_size: u64) -> Result<BaselineStats, BaselineError> {
        table
            .lookup(bin_size)
            .cloned()
            .ok_or(BaselineError::NotFound { bin_size })
    }
}

impl BaselineStats {
    /// Record the time spent building the estimator.
    pub fn with_build_time(mut self, seconds: f64) -> Self {
        self.build_time_seconds = seconds;
        self
    }

    /// Tukey fences `(p25 - 1.5 * iqr, p75 + 1.5 * iqr)`.
    pub fn iqr_fences(&self) -> (f64, f64) {
        (self.p25 - 1.5 * self.iqr, self.p75 + 1.5 * self.iqr)
    }

    /// Summarised bins per retained item.
    pub fn compression_ratio(&self) -> f64 {
        if self.retained_items == 0 {
            return 1.0;
        }
        self.total_bins as f64 / self.retained_items as f64
    }
}

/// Persisted baseline rows, one per build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineTable {
    rows: Vec<BaselineStats>,
}

impl BaselineTable {
    /// Empty in-memory table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every row of a baseline CSV.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BaselineError> {
        let file = std::fs::File::open(path.as_ref())?;
        let table = Self::from_reader(file)?;
        debug!(
            path = %path.as_ref().display(),
            rows = table.len(),
            "loaded baseline table"
        );
        Ok(table)
    }

    /// Parse rows from any CSV reader; the first line must be the header.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, BaselineError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let rows = csv_reader
            .deserialize()
            .collect::<Result<Vec<BaselineStats>, csv::Error>>()?;
        Ok(Self { rows })
    }

    /// Append a row to the CSV at `path`, writing the header only when the
    /// file is new or empty.
    pub fn append<P: AsRef<Path>>(path: P, stats: &BaselineStats) -> Result<(), BaselineError> {
        let path = path.as_ref();
        let needs_header = match std::fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => return Err(err.into()),
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(stats)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the whole table, header included.
    pub fn write<W: Write>(&self, writer: W) -> Result<(), BaselineError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Add a row in memory.
    pub fn push(&mut self, stats: BaselineStats) {
        self.rows.push(stats);
    }

    /// First row whose bin width matches exactly.
    pub fn lookup(&self, bin_size: u64) -> Option<&BaselineStats> {
        self.rows.iter().find(|row| row.bin_size == bin_size)
    }

    /// All rows in file order.
    pub fn rows(&self) -> &[BaselineStats] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
