use anyhow::{anyhow, Result};
use rust_htslib::bam::{
    self,
    header::{Header, HeaderRecord},
    record::{Cigar, CigarString},
    Writer,
};
use std::path::Path;

use super::GenomicInterval;

/// Create a BAM writer whose header declares `references` as `(name, length)`.
///
/// The header is marked coordinate-sorted; the caller is responsible for
/// writing records in that order.
pub fn create_bam_writer<P: AsRef<Path>>(
    output_path: P,
    references: &[(&str, u64)],
) -> Result<Writer> {
    let mut header = Header::new();

    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", &"1.6");
    hd.push_tag(b"SO", &"coordinate");
    header.push_record(&hd);

    for (name, length) in references {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", name);
        sq.push_tag(b"LN", &(*length as i64));
        header.push_record(&sq);
    }

    let writer = bam::Writer::from_path(output_path, &header, bam::Format::Bam)?;
    Ok(writer)
}

/// Write `intervals` as ungapped alignments into a new BAM file.
///
/// Each interval becomes one record with an `M` CIGAR spanning
/// `[start, end)` and carrying the interval's flags. Chromosome names must
/// appear in `references`.
pub fn write_intervals_bam<P: AsRef<Path>>(
    output_path: P,
    references: &[(&str, u64)],
    intervals: &[GenomicInterval],
) -> Result<()> {
    let mut writer = create_bam_writer(output_path, references)?;

    for (idx, interval) in intervals.iter().enumerate() {
        let tid = references
            .iter()
            .position(|(name, _)| *name == &*interval.chrom)
            .ok_or_else(|| anyhow!("chromosome {} missing from header", interval.chrom))?;
        let len = interval.len().max(1) as usize;

        let mut record = bam::Record::new();
        let qname = format!("read{}", idx + 1);
        let cigar = CigarString(vec![Cigar::Match(len as u32)]);
        record.set(qname.as_bytes(), Some(&cigar), &vec![b'A'; len], &vec![30u8; len]);
        record.set_tid(tid as i32);
        record.set_pos(interval.start as i64);
        record.set_mtid(-1);
        record.set_mpos(-1);
        record.set_mapq(60);
        record.set_flags(interval.flags);

        writer.write(&record)?;
    }

    Ok(())
}
