//! Genomics-side primitives: aligned intervals, alignment sources and
//! streaming coverage binning.
//!
//! Everything here operates one chromosome at a time so that memory stays
//! bounded by the number of covered bins on the largest chromosome.

mod binner;
mod io;
mod source;
mod types;

pub use binner::{BinningError, ChromosomeBins, CoverageBinner};
pub use io::{create_bam_writer, write_intervals_bam};
pub use source::{AlignmentSource, BamSource, MemorySource, SourceError};
pub use types::{
    FlagFilter, GenomicInterval, FLAG_DUPLICATE, FLAG_PAIRED, FLAG_PROPER_PAIR, FLAG_SECONDARY,
    FLAG_SUPPLEMENTARY, FLAG_UNMAPPED,
};
