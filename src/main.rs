use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use cnvsketch::genomics::BamSource;
use cnvsketch::output::write_cnv_file;
use cnvsketch::qc::{scan_bam, DistributionSummary};
use cnvsketch::{BaselineTable, CnvPipeline, CnvType, PipelineConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cnvsketch",
    about = "Copy-number variant calling from binned BAM coverage against a sketched baseline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the coverage baseline for one bin size and append it to a CSV table.
    Baseline {
        /// Coordinate-sorted BAM file.
        bam: PathBuf,
        /// Bin width in bases.
        bin_size: u64,
        /// Baseline table (created if missing, appended otherwise).
        baseline: PathBuf,
        /// KLL sketch accuracy parameter.
        #[arg(long, default_value_t = 200)]
        k: u32,
        /// Deletion threshold as a fraction of the median bin coverage.
        #[arg(long, default_value_t = 0.5)]
        deletion_ratio: f64,
        /// Duplication threshold as a multiple of the median bin coverage.
        #[arg(long, default_value_t = 1.5)]
        duplication_ratio: f64,
    },
    /// Call CNVs against a previously built baseline.
    Call {
        /// Coordinate-sorted BAM file.
        bam: PathBuf,
        /// Bin width in bases; must have a row in the baseline table.
        bin_size: u64,
        /// Baseline table produced by `baseline`.
        baseline: PathBuf,
        /// Output CSV of CNV calls.
        output: PathBuf,
        /// Minimum number of bins for a call to be reported.
        min_bins: u64,
    },
    /// Summarise mapping quality, read length and insert size of a BAM.
    Qc {
        /// BAM/SAM/CRAM file.
        bam: PathBuf,
        /// KLL sketch accuracy parameter.
        #[arg(long, default_value_t = 200)]
        k: u32,
    },
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            // Printing only fails when stderr is gone.
            let _ = err.print();
            process::exit(code);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Baseline {
            bam,
            bin_size,
            baseline,
            k,
            deletion_ratio,
            duplication_ratio,
        } => run_baseline(
            bam,
            baseline,
            PipelineConfig::new(bin_size)
                .with_sketch_k(k)
                .with_ratios(deletion_ratio, duplication_ratio),
        )?,
        Commands::Call {
            bam,
            bin_size,
            baseline,
            output,
            min_bins,
        } => run_call(
            bam,
            baseline,
            output,
            PipelineConfig::new(bin_size).with_min_bins(min_bins),
        )?,
        Commands::Qc { bam, k } => run_qc(bam, k)?,
    }

    Ok(())
}

fn run_baseline(bam_path: PathBuf, baseline_path: PathBuf, config: PipelineConfig) -> Result<()> {
    let pipeline = CnvPipeline::new(config).context("invalid configuration")?;
    let source = BamSource::from_path(&bam_path)
        .with_context(|| format!("failed to open BAM {}", bam_path.display()))?;

    let report = pipeline
        .build_baseline(source)
        .with_context(|| format!("baseline pass over {} failed", bam_path.display()))?;
    let stats = &report.output;
    let anomalous = &report.stats.anomalous;

    BaselineTable::append(&baseline_path, stats).with_context(|| {
        format!("failed to append baseline to {}", baseline_path.display())
    })?;

    println!(
        "bin_size={}\tbins={}\tp25={:.2}\tp50={:.2}\tp75={:.2}\tdel<{:.2}\tdup>{:.2}\tretained={}\tk={}",
        stats.bin_size,
        stats.total_bins,
        stats.p25,
        stats.p50,
        stats.p75,
        stats.deletion_threshold,
        stats.duplication_threshold,
        stats.retained_items,
        stats.k
    );
    let (low_fence, high_fence) = stats.iqr_fences();
    println!(
        "iqr_fences={:.2}..{:.2}\tlow_bins={} ({:.2}%)\thigh_bins={} ({:.2}%)\tcompression={:.2}x",
        low_fence,
        high_fence,
        anomalous.below_deletion,
        anomalous.deletion_percent(),
        anomalous.above_duplication,
        anomalous.duplication_percent(),
        stats.compression_ratio()
    );
    Ok(())
}

fn run_call(
    bam_path: PathBuf,
    baseline_path: PathBuf,
    output_path: PathBuf,
    config: PipelineConfig,
) -> Result<()> {
    let pipeline = CnvPipeline::new(config).context("invalid configuration")?;
    let table = BaselineTable::from_path(&baseline_path).with_context(|| {
        format!("failed to read baseline table {}", baseline_path.display())
    })?;
    let source = BamSource::from_path(&bam_path)
        .with_context(|| format!("failed to open BAM {}", bam_path.display()))?;

    let report = pipeline
        .detect_with_table(source, &table)
        .with_context(|| format!("detection pass over {} failed", bam_path.display()))?;
    let anomalous = report.stats.anomalous;
    let calls = report.output;

    write_cnv_file(&output_path, &calls)
        .with_context(|| format!("failed to write CNV calls to {}", output_path.display()))?;

    let deletions = calls
        .iter()
        .filter(|call| call.cnv_type == CnvType::Deletion)
        .count();
    println!(
        "{} CNVs written to {} ({} deletions, {} duplications)",
        calls.len(),
        output_path.display(),
        deletions,
        calls.len() - deletions
    );
    println!(
        "{} of {} bins below the deletion threshold, {} above the duplication threshold",
        anomalous.below_deletion, anomalous.total, anomalous.above_duplication
    );
    Ok(())
}

fn run_qc(bam_path: PathBuf, k: u32) -> Result<()> {
    let report = scan_bam(&bam_path, k)
        .with_context(|| format!("qc pass over {} failed", bam_path.display()))?;

    println!(
        "reads={}\tmapped={} ({:.2}%)\tproper_pairs={}",
        report.total_reads,
        report.mapped_reads,
        report.mapped_percent(),
        report.proper_pairs
    );
    for (name, summary) in [
        ("mapq", &report.mapq),
        ("read_length", &report.read_length),
        ("insert_size", &report.insert_size),
    ] {
        if let Some(summary) = summary {
            print_distribution(name, summary);
        }
    }
    Ok(())
}

fn print_distribution(name: &str, summary: &DistributionSummary) {
    println!(
        "{name}\tmin={:.2}\tp25={:.2}\tp50={:.2}\tp75={:.2}\tp90={:.2}\tp99={:.2}\tmax={:.2}\tcompression={:.2}x",
        summary.min,
        summary.p25,
        summary.p50,
        summary.p75,
        summary.p90,
        summary.p99,
        summary.max,
        summary.compression
    );
}
