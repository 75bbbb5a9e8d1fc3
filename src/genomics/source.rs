use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use rust_htslib::bam::{self, Read};
use thiserror::Error;
use tracing::{debug, warn};

use crate::genomics::GenomicInterval;

/// Errors raised while pulling intervals from an alignment source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failure opening, parsing or reading the alignment file.
    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    /// Record refers to a reference id missing from the header.
    #[error("record references unknown target id {0}")]
    UnknownTarget(i32),
}

/// Pull-style sequential stream of aligned intervals.
///
/// Implementations deliver records grouped by chromosome and in
/// non-decreasing start order within each chromosome. `Ok(None)` marks the
/// end of the stream; any `Err` terminates the current pass.
pub trait AlignmentSource {
    /// Fetch the next interval.
    fn next_interval(&mut self) -> Result<Option<GenomicInterval>, SourceError>;
}

impl<S: AlignmentSource + ?Sized> AlignmentSource for &mut S {
    fn next_interval(&mut self) -> Result<Option<GenomicInterval>, SourceError> {
        (**self).next_interval()
    }
}

/// Position-sorted BAM file read through htslib.
pub struct BamSource {
    reader: bam::Reader,
    record: bam::Record,
    targets: Vec<Arc<str>>,
    records_read: u64,
}

impl std::fmt::Debug for BamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamSource")
            .field("targets", &self.targets.len())
            .field("records_read", &self.records_read)
            .finish()
    }
}

impl BamSource {
    /// Open a BAM/SAM/CRAM file and read its header.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let reader = bam::Reader::from_path(path.as_ref())?;
        let targets = reader
            .header()
            .target_names()
            .into_iter()
            .map(|name| Arc::<str>::from(String::from_utf8_lossy(name)))
            .collect::<Vec<Arc<str>>>();
        debug!(
            path = %path.as_ref().display(),
            targets = targets.len(),
            "opened alignment file"
        );

        Ok(Self {
            reader,
            record: bam::Record::new(),
            targets,
            records_read: 0,
        })
    }

    /// Reference names declared in the header, in header order.
    pub fn targets(&self) -> &[Arc<str>] {
        &self.targets
    }

    /// Number of records read so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }
}

impl AlignmentSource for BamSource {
    fn next_interval(&mut self) -> Result<Option<GenomicInterval>, SourceError> {
        loop {
            match self.reader.read(&mut self.record) {
                None => return Ok(None),
                Some(Err(err)) => return Err(SourceError::Htslib(err)),
                Some(Ok(())) => {}
            }
            self.records_read += 1;

            let tid = self.record.tid();
            if tid < 0 {
                // Unplaced reads carry no chromosome; they cannot be binned.
                if self.record.flags() & crate::genomics::FLAG_UNMAPPED == 0 {
                    warn!(record = self.records_read, "mapped record without reference id");
                }
                continue;
            }
            let chrom = self
                .targets
                .get(tid as usize)
                .cloned()
                .ok_or(SourceError::UnknownTarget(tid))?;

            let start = self.record.pos().max(0) as u64;
            let mut end = self.record.cigar().end_pos().max(0) as u64;
            if self.record.flags() & crate::genomics::FLAG_UNMAPPED == 0 {
                // A mapped record without reference-consuming CIGAR ops still
                // occupies its start base.
                end = end.max(start + 1);
            }
            return Ok(Some(GenomicInterval {
                chrom,
                start,
                end,
                flags: self.record.flags(),
            }));
        }
    }
}

/// In-memory source, used for tests and for replaying already-parsed input.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    intervals: VecDeque<GenomicInterval>,
}

impl MemorySource {
    /// Build a source replaying `intervals` in order.
    pub fn new(intervals: impl IntoIterator<Item = GenomicInterval>) -> Self {
        Self {
            intervals: intervals.into_iter().collect(),
        }
    }

    /// Remaining intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether the source is exhausted.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl AlignmentSource for MemorySource {
    fn next_interval(&mut self) -> Result<Option<GenomicInterval>, SourceError> {
        Ok(self.intervals.pop_front())
    }
}
