use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

/// Errors raised while binning a chromosome-grouped stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BinningError {
    /// A chromosome reappeared after its bins were already flushed.
    #[error("chromosome {0} reappeared after being flushed; input must be grouped by chromosome")]
    ChromosomeRevisited(String),
}

/// Sparse bin → coverage map for one finished chromosome.
///
/// Bins never touched by an interval are absent. Iteration order of the
/// underlying map is unspecified; use [`ChromosomeBins::sorted`] whenever
/// order matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeBins {
    chrom: Arc<str>,
    bin_size: u64,
    bins: HashMap<u64, u32>,
}

impl ChromosomeBins {
    /// Wrap an existing bin map.
    pub fn new(chrom: impl Into<Arc<str>>, bin_size: u64, bins: HashMap<u64, u32>) -> Self {
        Self {
            chrom: chrom.into(),
            bin_size,
            bins,
        }
    }

    /// Chromosome the bins belong to.
    pub fn chrom(&self) -> &Arc<str> {
        &self.chrom
    }

    /// Bin width in bases.
    pub fn bin_size(&self) -> u64 {
        self.bin_size
    }

    /// Number of covered bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether no bin was covered.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Coverage of a bin (0 when absent).
    pub fn coverage(&self, bin: u64) -> u32 {
        self.bins.get(&bin).copied().unwrap_or(0)
    }

    /// Coverage values in ascending bin order.
    ///
    /// Order-sensitive consumers such as a compacting sketch see the same
    /// sequence on every run regardless of the map's hasher.
    pub fn coverages(&self) -> impl Iterator<Item = u32> {
        self.sorted().into_iter().map(|(_, coverage)| coverage)
    }

    /// `(bin_index, coverage)` pairs in ascending bin order.
    pub fn sorted(&self) -> Vec<(u64, u32)> {
        let mut entries: Vec<(u64, u32)> = self.bins.iter().map(|(&b, &c)| (b, c)).collect();
        entries.sort_unstable_by_key(|&(bin, _)| bin);
        entries
    }

    /// Underlying sparse map.
    pub fn as_map(&self) -> &HashMap<u64, u32> {
        &self.bins
    }
}

/// Streaming per-chromosome coverage accumulator.
///
/// Each interval increments every bin it touches by one, independent of
/// how much of the bin it overlaps. Only the active chromosome is held in
/// memory: a change of chromosome hands the finished map back to the caller.
#[derive(Debug)]
pub struct CoverageBinner {
    bin_size: u64,
    chrom: Option<Arc<str>>,
    bins: HashMap<u64, u32>,
    flushed: HashSet<Arc<str>>,
}

impl CoverageBinner {
    /// Create a binner for the given bin width.
    ///
    /// # Panics
    /// Panics if `bin_size` is zero; configuration validation rejects that
    /// earlier in the pipeline.
    pub fn new(bin_size: u64) -> Self {
        assert!(bin_size > 0, "bin size must be > 0");
        Self {
            bin_size,
            chrom: None,
            bins: HashMap::new(),
            flushed: HashSet::new(),
        }
    }

    /// Bin width in bases.
    pub fn bin_size(&self) -> u64 {
        self.bin_size
    }

    /// Chromosome currently being accumulated.
    pub fn active_chrom(&self) -> Option<&Arc<str>> {
        self.chrom.as_ref()
    }

    /// Inclusive range of bin indices touched by `[start, end)`, if any.
    pub fn bin_range(&self, start: u64, end: u64) -> Option<(u64, u64)> {
        if end <= start {
            return None;
        }
        Some((start / self.bin_size, (end - 1) / self.bin_size))
    }

    /// Add a filtered interval.
    ///
    /// Returns the previous chromosome's bins when `chrom` differs from the
    /// active chromosome; the caller must forward them to its consumer.
    pub fn add_interval(
        &mut self,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> Result<Option<ChromosomeBins>, BinningError> {
        let flushed = if self.chrom.as_deref() == Some(chrom) {
            None
        } else {
            self.switch_to(chrom)?
        };

        if let Some((first, last)) = self.bin_range(start, end) {
            for bin in first..=last {
                let coverage = self.bins.entry(bin).or_insert(0);
                *coverage = coverage.saturating_add(1);
            }
        }

        Ok(flushed)
    }

    /// Flush the active chromosome at end of stream.
    pub fn finish(&mut self) -> Option<ChromosomeBins> {
        self.take_active()
    }

    fn switch_to(&mut self, chrom: &str) -> Result<Option<ChromosomeBins>, BinningError> {
        if self.flushed.contains(chrom) {
            return Err(BinningError::ChromosomeRevisited(chrom.to_string()));
        }
        let previous = self.take_active();
        self.chrom = Some(Arc::from(chrom));
        Ok(previous)
    }

    fn take_active(&mut self) -> Option<ChromosomeBins> {
        let chrom = self.chrom.take()?;
        let bins = std::mem::take(&mut self.bins);
        debug!(chrom = %chrom, bins = bins.len(), "flushing chromosome bins");
        self.flushed.insert(Arc::clone(&chrom));
        Some(ChromosomeBins {
            chrom,
            bin_size: self.bin_size,
            bins,
        })
    }
}
