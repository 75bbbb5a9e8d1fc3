use std::sync::Arc;

/// SAM flag: template has multiple segments.
pub const FLAG_PAIRED: u16 = 0x1;
/// SAM flag: each segment properly aligned.
pub const FLAG_PROPER_PAIR: u16 = 0x2;
/// SAM flag: read is unmapped.
pub const FLAG_UNMAPPED: u16 = 0x4;
/// SAM flag: secondary alignment.
pub const FLAG_SECONDARY: u16 = 0x100;
/// SAM flag: PCR or optical duplicate.
pub const FLAG_DUPLICATE: u16 = 0x400;
/// SAM flag: supplementary alignment.
pub const FLAG_SUPPLEMENTARY: u16 = 0x800;

/// Aligned interval on the reference, produced once per alignment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomicInterval {
    /// Reference contig/chromosome name.
    pub chrom: Arc<str>,
    /// 0-based leftmost reference coordinate.
    pub start: u64,
    /// Half-open end coordinate on the reference.
    pub end: u64,
    /// Raw SAM flag bits of the originating record.
    pub flags: u16,
}

impl GenomicInterval {
    /// Construct a new interval.
    pub fn new(chrom: impl Into<Arc<str>>, start: u64, end: u64, flags: u16) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            flags,
        }
    }

    /// Primary, mapped, non-duplicate interval.
    pub fn primary(chrom: impl Into<Arc<str>>, start: u64, end: u64) -> Self {
        Self::new(chrom, start, end, 0)
    }

    /// Number of reference bases spanned.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the interval spans no reference bases.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Capability-set exclusion applied before binning.
///
/// An interval is dropped when any of its flag bits intersects the
/// exclusion mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagFilter {
    exclude: u16,
}

impl FlagFilter {
    /// Filter dropping intervals carrying any bit of `exclude`.
    pub fn new(exclude: u16) -> Self {
        Self { exclude }
    }

    /// Filter that keeps everything.
    pub fn permissive() -> Self {
        Self { exclude: 0 }
    }

    /// Exclusion mask.
    pub fn exclude_mask(&self) -> u16 {
        self.exclude
    }

    /// Whether an interval with the given flags should be binned.
    pub fn passes(&self, flags: u16) -> bool {
        flags & self.exclude == 0
    }
}

impl Default for FlagFilter {
    /// Unmapped, secondary, supplementary and duplicate alignments.
    fn default() -> Self {
        Self::new(FLAG_UNMAPPED | FLAG_SECONDARY | FLAG_SUPPLEMENTARY | FLAG_DUPLICATE)
    }
}
