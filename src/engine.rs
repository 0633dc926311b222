//! The coverage engine. Owns per-contig forward/reverse difference arrays, dispatches each
//! alignment record into them, and on a `tid` change flushes the completed contig into every
//! [`RegionWriter`] before resetting for the next one.

use std::path::PathBuf;

use crate::bedgraph::CompressionPool;
use crate::errors::{CovError, CovResult};
use crate::header::{ref_consumed_len, AlignedRecord, ReferenceHeader};
use crate::region_writer::{RegionWriter, DEFAULT_DIST_CUTOFF};
use crate::segment;
use rust_htslib::bam::record::Cigar;

/// Alignments with any of these flag bits set are silently dropped. Numerically 1796
/// (UNMAP|SECONDARY|QCFAIL|DUP) — the mosdepth-compatible default, which notably does not
/// include SUPPLEMENTARY despite earlier prose describing the mask informally; see
/// `DESIGN.md` for that call.
pub const DEFAULT_EXCLUDE_FLAGS: u16 = 1796;
const UNMAP: u16 = 4;

/// Options driving engine construction, mirrored 1:1 from the CLI surface via
/// `CoverageArgs::into_options`.
#[derive(Debug, Clone)]
pub struct CoverageOptions {
    pub output_dir: PathBuf,
    pub per_base: bool,
    pub use_cigar: bool,
    pub by_strand: bool,
    pub exclude_flags: Option<u16>,
    pub include_flags: Option<u16>,
    pub bed_files: Vec<PathBuf>,
    pub bed_names: Vec<String>,
    pub thresholds: Vec<u32>,
    pub segment_lengths: Vec<u32>,
    pub threads: usize,
    pub dist_cutoff: f64,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("bamcoverage_out"),
            per_base: false,
            use_cigar: false,
            by_strand: false,
            exclude_flags: None,
            include_flags: None,
            bed_files: Vec::new(),
            bed_names: Vec::new(),
            thresholds: Vec::new(),
            segment_lengths: Vec::new(),
            threads: 1,
            dist_cutoff: DEFAULT_DIST_CUTOFF,
        }
    }
}

pub struct CovWriter<'h> {
    header: &'h dyn ReferenceHeader,
    use_cigar: bool,
    exclude_mask: u16,
    include_mask: u16,
    diff_fwd: Vec<i32>,
    diff_rev: Vec<i32>,
    buf_size: usize,
    tid: i32,
    contig_len: i64,
    chrom: String,
    writers: Vec<RegionWriter>,
}

impl<'h> CovWriter<'h> {
    /// `pool` must outlive the returned engine; the caller (the CLI binary) constructs it
    /// from `--threads` and shares it with the BAM reader's own decompression threads.
    pub fn new(header: &'h dyn ReferenceHeader, options: &CoverageOptions, pool: &CompressionPool) -> CovResult<Self> {
        if !matches!(header.sort_order(), Some("coordinate")) {
            return Err(CovError::UnsortedInput);
        }
        if options.bed_files.len() != options.bed_names.len() {
            return Err(CovError::ConfigMismatch(format!(
                "{} BED file(s) but {} BED name(s)",
                options.bed_files.len(),
                options.bed_names.len()
            )));
        }
        if options.output_dir.exists() {
            return Err(CovError::OutputExists(options.output_dir.clone()));
        }

        let mut writers = Vec::with_capacity(2 + options.segment_lengths.len() + options.bed_names.len());
        // The "global" writer's own `create_dir_all` is what creates the top-level output
        // directory; it is given `output_dir` itself rather than a `global/` subdirectory.
        writers.push(RegionWriter::new(
            &options.output_dir,
            "global",
            options.per_base,
            options.by_strand,
            None,
            options.thresholds.clone(),
            0,
            header,
            pool,
            options.dist_cutoff,
        )?);

        for segment_length in &options.segment_lengths {
            let name = format!("segments_{segment_length}");
            writers.push(RegionWriter::new(
                &options.output_dir.join(&name),
                &name,
                options.per_base,
                options.by_strand,
                None,
                options.thresholds.clone(),
                *segment_length,
                header,
                pool,
                options.dist_cutoff,
            )?);
        }

        for (bed_path, bed_name) in options.bed_files.iter().zip(options.bed_names.iter()) {
            writers.push(RegionWriter::new(
                &options.output_dir.join(bed_name),
                bed_name,
                options.per_base,
                options.by_strand,
                Some(bed_path.as_path()),
                options.thresholds.clone(),
                0,
                header,
                pool,
                options.dist_cutoff,
            )?);
        }

        Ok(Self {
            header,
            use_cigar: options.use_cigar,
            exclude_mask: options.exclude_flags.unwrap_or(DEFAULT_EXCLUDE_FLAGS),
            include_mask: options.include_flags.unwrap_or(0),
            diff_fwd: Vec::new(),
            diff_rev: Vec::new(),
            buf_size: 0,
            tid: -1,
            contig_len: 0,
            chrom: String::new(),
            writers,
        })
    }

    /// Dispatches one record into the current contig's difference arrays. Does not allocate
    /// on the steady-state path; buffers are only resized from `reset_contig`.
    pub fn process(&mut self, record: &dyn AlignedRecord) -> CovResult<()> {
        let flags = record.flags();
        if record.tid() < 0 || flags & UNMAP != 0 {
            return Ok(());
        }
        if flags & self.exclude_mask != 0 {
            return Ok(());
        }
        if self.include_mask != 0 && flags & self.include_mask == 0 {
            return Ok(());
        }

        if record.tid() != self.tid {
            self.flush_contig()?;
            self.reset_contig(record.tid());
        }

        let start = record.pos();
        let diff = if record.is_reverse() { &mut self.diff_rev } else { &mut self.diff_fwd };

        if self.use_cigar {
            let mut cur = start;
            for op in record.cigar() {
                match op {
                    Cigar::Match(n) | Cigar::Equal(n) | Cigar::Diff(n) => {
                        let n = *n as i64;
                        diff[cur as usize] += 1;
                        diff[(cur + n) as usize] -= 1;
                        cur += n;
                    }
                    Cigar::Del(n) | Cigar::RefSkip(n) => {
                        cur += *n as i64;
                    }
                    Cigar::Ins(_) | Cigar::SoftClip(_) | Cigar::HardClip(_) | Cigar::Pad(_) => {}
                }
            }
        } else {
            let end = start + ref_consumed_len(record.cigar());
            diff[start as usize] += 1;
            diff[end as usize] -= 1;
        }
        Ok(())
    }

    fn reset_contig(&mut self, new_tid: i32) {
        self.tid = new_tid;
        self.chrom = self.header.target_name(new_tid as usize).to_string();
        self.contig_len = self.header.target_len(new_tid as usize) as i64;

        let needed = self.contig_len as usize + 1;
        if needed > self.buf_size {
            let mut new_size = self.buf_size.max(1);
            while new_size < needed {
                new_size *= 2;
            }
            self.diff_fwd.resize(new_size, 0);
            self.diff_rev.resize(new_size, 0);
            self.buf_size = new_size;
        }
        self.diff_fwd[..needed].fill(0);
        self.diff_rev[..needed].fill(0);
    }

    fn flush_contig(&mut self) -> CovResult<()> {
        if self.tid < 0 {
            return Ok(());
        }
        let _span = tracing::info_span!("flush_contig", tid = self.tid, chrom = %self.chrom).entered();

        for writer in &mut self.writers {
            writer.fill_skipped(self.tid)?;
        }

        let len = self.contig_len as usize;
        segment::prefix_sum(&mut self.diff_fwd[..len]);
        segment::prefix_sum(&mut self.diff_rev[..len]);

        for writer in &mut self.writers {
            writer.flush_tid(self.tid, &self.chrom, self.contig_len, &self.diff_fwd, &self.diff_rev)?;
        }
        Ok(())
    }

    /// Flushes the trailing contig (if any), then marks every remaining BED region as
    /// skipped and tears down each region writer.
    pub fn destroy(mut self) -> CovResult<()> {
        if self.tid >= 0 {
            self.flush_contig()?;
        }
        self.tid = self.header.target_count() as i32;
        for writer in self.writers.drain(..) {
            writer.teardown(self.header)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHeader {
        names: Vec<&'static str>,
        lens: Vec<u64>,
    }

    impl ReferenceHeader for FakeHeader {
        fn target_count(&self) -> usize {
            self.names.len()
        }
        fn target_name(&self, tid: usize) -> &str {
            self.names[tid]
        }
        fn target_len(&self, tid: usize) -> u64 {
            self.lens[tid]
        }
        fn sort_order(&self) -> Option<&str> {
            Some("coordinate")
        }
    }

    struct FakeRecord {
        tid: i32,
        pos: i64,
        flags: u16,
        reverse: bool,
        cigar: Vec<Cigar>,
    }

    impl AlignedRecord for FakeRecord {
        fn tid(&self) -> i32 {
            self.tid
        }
        fn pos(&self) -> i64 {
            self.pos
        }
        fn flags(&self) -> u16 {
            self.flags
        }
        fn is_reverse(&self) -> bool {
            self.reverse
        }
        fn cigar(&self) -> &[Cigar] {
            &self.cigar
        }
    }

    fn fwd_read(tid: i32, pos: i64, len: u32) -> FakeRecord {
        FakeRecord { tid, pos, flags: 0, reverse: false, cigar: vec![Cigar::Match(len)] }
    }

    #[test]
    fn unsorted_header_is_rejected() {
        struct Unsorted;
        impl ReferenceHeader for Unsorted {
            fn target_count(&self) -> usize {
                0
            }
            fn target_name(&self, _: usize) -> &str {
                ""
            }
            fn target_len(&self, _: usize) -> u64 {
                0
            }
            fn sort_order(&self) -> Option<&str> {
                None
            }
        }
        let header = Unsorted;
        let options = CoverageOptions { output_dir: std::env::temp_dir().join("should-not-be-created"), ..Default::default() };
        let pool = CompressionPool::new(1).unwrap();
        let result = CovWriter::new(&header, &options, &pool);
        assert!(matches!(result, Err(CovError::UnsortedInput)));
    }

    #[test]
    fn mismatched_bed_files_and_names_is_config_mismatch() {
        let header = FakeHeader { names: vec!["chr1"], lens: vec![10] };
        let tmp = tempfile::tempdir().unwrap();
        let options = CoverageOptions {
            output_dir: tmp.path().join("out"),
            bed_files: vec![PathBuf::from("a.bed"), PathBuf::from("b.bed")],
            bed_names: vec!["only_one".to_string()],
            ..Default::default()
        };
        let pool = CompressionPool::new(1).unwrap();
        let result = CovWriter::new(&header, &options, &pool);
        assert!(matches!(result, Err(CovError::ConfigMismatch(_))));
    }

    #[test]
    fn unmapped_records_are_dropped() {
        let header = FakeHeader { names: vec!["chr1"], lens: vec![10] };
        let tmp = tempfile::tempdir().unwrap();
        let options = CoverageOptions { output_dir: tmp.path().join("out"), ..Default::default() };
        let pool = CompressionPool::new(1).unwrap();
        let mut engine = CovWriter::new(&header, &options, &pool).unwrap();
        let unmapped = FakeRecord { tid: 0, pos: 0, flags: UNMAP, reverse: false, cigar: vec![Cigar::Match(4)] };
        engine.process(&unmapped).unwrap();
        assert_eq!(engine.tid, -1);
        engine.destroy().unwrap();
    }

    #[test]
    fn scenario_a_end_to_end_through_engine() {
        let header = FakeHeader { names: vec!["chr1"], lens: vec![10] };
        let tmp = tempfile::tempdir().unwrap();
        let options =
            CoverageOptions { output_dir: tmp.path().join("out"), thresholds: vec![1, 3], ..Default::default() };
        let pool = CompressionPool::new(1).unwrap();
        let mut engine = CovWriter::new(&header, &options, &pool).unwrap();
        for start in [0, 3, 6] {
            engine.process(&fwd_read(0, start, 4)).unwrap();
        }
        engine.destroy().unwrap();

        let summary = std::fs::read_to_string(tmp.path().join("out/global.summary.txt")).unwrap();
        let mut lines = summary.lines();
        lines.next(); // header
        let row = lines.next().unwrap();
        assert_eq!(row, "chr1\t0\t10\t10\t12\t1.20\t1\t2\t1.000\t0.000");
    }
}
