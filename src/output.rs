use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::segmenter::CnvCall;

const HEADER: [&str; 6] = [
    "chromosome",
    "start",
    "end",
    "type",
    "mean_coverage",
    "num_bins",
];

/// Write CNV calls as a CSV table.
pub fn write_cnv_table<W: Write>(writer: W, calls: &[CnvCall]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(HEADER)?;

    for call in calls {
        let start = call.start.to_string();
        let end = call.end.to_string();
        let mean = format!("{:.2}", call.mean_coverage);
        let num_bins = call.num_bins.to_string();
        csv_writer.write_record([
            &*call.chrom,
            start.as_str(),
            end.as_str(),
            call.cnv_type.as_str(),
            mean.as_str(),
            num_bins.as_str(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write CNV calls to a new file at `path`.
pub fn write_cnv_file<P: AsRef<Path>>(path: P, calls: &[CnvCall]) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_cnv_table(file, calls)
}

/// Render CNV calls into a CSV string (useful for tests and snapshots).
pub fn render_cnv_table(calls: &[CnvCall]) -> Result<String> {
    let mut buffer = Vec::new();
    write_cnv_table(&mut buffer, calls)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered CNV table is not valid UTF-8"))
}
