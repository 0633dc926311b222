use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use cov_writer::bedgraph::CompressionPool;
use cov_writer::engine::{CovWriter, CoverageOptions};
use cov_writer::header::{BamHeader, BamRecordAdapter};
use cov_writer::logging;
use cov_writer::region_writer::DEFAULT_DIST_CUTOFF;
use indicatif::{ProgressBar, ProgressStyle};
use rust_htslib::bam::{self, Read};

fn ticker() -> ProgressBar {
    let ticker = ProgressBar::new_spinner();
    ticker.set_style(ProgressStyle::with_template("> {pos} records processed").unwrap());
    ticker
}

/// Computes per-base and per-interval alignment coverage over a coordinate-sorted BAM,
/// writing bedgraph tracks, summary tables, and coverage distributions per output stratum.
#[derive(Parser, Debug)]
#[command(name = "bamcoverage", arg_required_else_help = true)]
struct CoverageArgs {
    /// Input coordinate-sorted BAM.
    #[clap(help_heading = "Input Options")]
    in_bam: PathBuf,

    /// Directory to write output into; must not already exist.
    #[clap(help_heading = "Output Options")]
    #[arg(short, long, default_value = "bamstats-coverage")]
    output: PathBuf,

    /// Emit per-base bedgraph tracks in addition to the summary/distribution tables.
    #[clap(help_heading = "Output Options")]
    #[arg(short = 'p', long, default_value_t = false)]
    per_base: bool,

    /// Split bedgraph tracks (and their stats) by strand in addition to the combined total.
    #[clap(help_heading = "Output Options")]
    #[arg(short = 's', long, default_value_t = false)]
    by_strand: bool,

    /// Walk the CIGAR (M/=/X add coverage, D/N advance without adding, I/S/H/P are ignored)
    /// instead of treating each alignment as one contiguous block.
    #[clap(help_heading = "Filtering Options")]
    #[arg(short = 'c', long, default_value_t = false)]
    use_cigar: bool,

    /// BED file of intervals to additionally report coverage over; may be repeated.
    #[clap(help_heading = "Input Options")]
    #[arg(short = 'b', long = "bed")]
    bed_files: Vec<PathBuf>,

    /// Subdirectory name for each `--bed`, in the same order; length must match `--bed`.
    #[clap(help_heading = "Input Options")]
    #[arg(long = "bed-name")]
    bed_names: Vec<String>,

    /// Fixed tile length(s) to additionally report coverage over; may be repeated.
    #[clap(help_heading = "Output Options")]
    #[arg(long = "segment")]
    segment_lengths: Vec<u32>,

    /// Sparse coverage thresholds for the summary table's `{T}x` columns. Defaults to
    /// {1, 5, 10, 20, 30, 40} when empty.
    #[clap(help_heading = "Output Options")]
    #[arg(long = "threshold")]
    thresholds: Vec<u32>,

    /// Dense-distribution cutoff: `dist.txt` rows with a right-tail fraction below this are
    /// omitted.
    #[clap(help_heading = "Output Options")]
    #[arg(long, default_value_t = DEFAULT_DIST_CUTOFF)]
    dist_cutoff: f64,

    /// SAM flag bits that exclude a record; defaults to the mosdepth-compatible 1796
    /// (UNMAP|SECONDARY|QCFAIL|DUP) when unset.
    #[clap(help_heading = "Filtering Options")]
    #[arg(long)]
    exclude_flags: Option<u16>,

    /// SAM flag bits that a record must have at least one of; unset disables this filter.
    #[clap(help_heading = "Filtering Options")]
    #[arg(long)]
    include_flags: Option<u16>,

    /// Number of BGZF/htslib compression and decompression threads. Fatal if zero.
    #[clap(help_heading = "Compute Options")]
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Output log to this file.
    #[clap(help_heading = "Logging Options")]
    #[arg(long, alias = "log")]
    log_filepath: Option<PathBuf>,
}

impl CoverageArgs {
    fn into_options(self) -> CoverageOptions {
        CoverageOptions {
            output_dir: self.output,
            per_base: self.per_base,
            use_cigar: self.use_cigar,
            by_strand: self.by_strand,
            exclude_flags: self.exclude_flags,
            include_flags: self.include_flags,
            bed_files: self.bed_files,
            bed_names: self.bed_names,
            thresholds: self.thresholds,
            segment_lengths: self.segment_lengths,
            threads: self.threads,
            dist_cutoff: self.dist_cutoff,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = CoverageArgs::parse();
    logging::init_logging(args.log_filepath.as_deref());

    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }

    let in_bam = args.in_bam.clone();
    let threads = args.threads;
    let options = args.into_options();

    let mut reader = bam::Reader::from_path(&in_bam)
        .with_context(|| format!("failed to open {}", in_bam.display()))?;
    reader.set_threads(threads).context("failed to configure htslib decompression threads")?;

    let header_view = reader.header().clone();
    let header = BamHeader::new(&header_view);

    let pool = CompressionPool::new(threads).context("failed to initialize htslib compression thread pool")?;
    let mut engine = CovWriter::new(&header, &options, &pool).context("failed to construct coverage engine")?;

    let progress = ticker();
    let mut record = bam::Record::new();
    let mut n_processed = 0u64;
    loop {
        match reader.read(&mut record) {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e).context("failed reading alignment record"),
            None => break,
        }
        let adapter = BamRecordAdapter::new(&record);
        engine.process(&adapter).context("failed processing alignment record")?;
        n_processed += 1;
        progress.inc(1);
    }
    progress.finish_with_message("done");

    engine.destroy().context("failed to finalize coverage output")?;
    log::info!("processed {n_processed} records total");
    Ok(())
}
