//! One [`RegionWriter`] per output stratum (the global whole-genome writer, one per
//! `--segment` tile size, one per `--bed` file): owns an interval store, the aggregate
//! stats/histogram accumulated over its whole lifetime, up to three BGZF bedgraph sinks, and
//! the plain-text summary/distribution reports.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;

use crate::bedgraph::{BedgraphSink, CompressionPool};
use crate::errors::{CovError, CovResult};
use crate::header::ReferenceHeader;
use crate::histogram::Histogram;
use crate::region::{BedRegions, Region};
use crate::segment;

const DEFAULT_THRESHOLDS: &[u32] = &[1, 5, 10, 20, 30, 40];
pub const DEFAULT_DIST_CUTOFF: f64 = 1e-3;

/// Running `{min, max, total_bases, positions}` across every region a writer has flushed,
/// including explicit zero rows for skipped contigs. `min` is `None` ("+infinity") until the
/// first position is observed, and serializes to 0 for a writer that never saw any.
#[derive(Debug, Clone, Copy, Default)]
struct AggStats {
    min: Option<i64>,
    max: i64,
    total_bases: i64,
    positions: i64,
}

impl AggStats {
    fn observe(&mut self, min: i64, max: i64, sum: i64, positions: i64) {
        if positions > 0 {
            self.min = Some(self.min.map_or(min, |m| m.min(min)));
            self.max = self.max.max(max);
        }
        self.total_bases += sum;
        self.positions += positions;
    }

    fn serialized_min(&self) -> i64 {
        self.min.unwrap_or(0)
    }
}

pub struct RegionWriter {
    name: String,
    regions: Vec<Region>,
    cursor: usize,
    agg_stats: AggStats,
    histogram: Histogram,
    thresholds: Vec<u32>,
    per_base: bool,
    by_strand: bool,
    total_sink: Option<BedgraphSink>,
    fwd_sink: Option<BedgraphSink>,
    rev_sink: Option<BedgraphSink>,
    summary: BufWriter<File>,
    distribution: BufWriter<File>,
    dist_cutoff: f64,
}

impl RegionWriter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        output_dir: &Path,
        name: &str,
        per_base: bool,
        by_strand: bool,
        bed_path: Option<&Path>,
        mut thresholds: Vec<u32>,
        segment_length: u32,
        header: &dyn ReferenceHeader,
        pool: &CompressionPool,
        dist_cutoff: f64,
    ) -> CovResult<Self> {
        if output_dir.exists() {
            return Err(CovError::OutputExists(output_dir.to_path_buf()));
        }
        std::fs::create_dir_all(output_dir)?;

        let bed = match bed_path {
            Some(path) => BedRegions::load(path, header)?,
            None => BedRegions::synthesize(header, segment_length),
        };

        if thresholds.is_empty() {
            thresholds = DEFAULT_THRESHOLDS.to_vec();
        }
        thresholds.sort_unstable();
        let max_cover = 1 + *thresholds.last().unwrap_or(&0) as usize;
        let histogram = Histogram::with_min_capacity(max_cover);

        let (total_sink, fwd_sink, rev_sink) = if per_base {
            let total = BedgraphSink::create(output_dir.join(format!("{name}.bed.gz")), pool)?;
            if by_strand {
                let fwd = BedgraphSink::create(output_dir.join(format!("{name}.fwd.bed.gz")), pool)?;
                let rev = BedgraphSink::create(output_dir.join(format!("{name}.rev.bed.gz")), pool)?;
                (Some(total), Some(fwd), Some(rev))
            } else {
                (Some(total), None, None)
            }
        } else {
            (None, None, None)
        };

        let mut summary = BufWriter::new(File::create(output_dir.join(format!("{name}.summary.txt")))?);
        let threshold_cols = thresholds.iter().map(|t| format!("{t}x")).join("\t");
        writeln!(summary, "chrom\tstart\tend\tlength\tbases\tmean\tmin\tmax\t{threshold_cols}")?;

        let distribution = BufWriter::new(File::create(output_dir.join(format!("{name}.dist.txt")))?);

        Ok(Self {
            name: name.to_string(),
            regions: bed.regions,
            cursor: 0,
            agg_stats: AggStats::default(),
            histogram,
            thresholds,
            per_base,
            by_strand,
            total_sink,
            fwd_sink,
            rev_sink,
            summary,
            distribution,
            dist_cutoff,
        })
    }

    /// Emits explicit zero rows for every still-unflushed region belonging to a `tid` earlier
    /// than `current_tid` — contigs with no aligned reads at all.
    pub fn fill_skipped(&mut self, current_tid: i32) -> CovResult<()> {
        while self.cursor < self.regions.len() && self.regions[self.cursor].tid < current_tid {
            let reg = self.regions[self.cursor].clone();
            log::debug!("{}: emitting zero row for skipped region {}", self.name, reg.label());
            self.emit_zero_row(&reg)?;
            self.cursor += 1;
        }
        Ok(())
    }

    /// Advances `cursor` through every region on `tid`, computing per-region stats from the
    /// now-cumulative-summed difference arrays and, if `per_base`, emitting bedgraph segments.
    pub fn flush_tid(
        &mut self,
        tid: i32,
        chrom: &str,
        contig_len: i64,
        diff_fwd: &[i32],
        diff_rev: &[i32],
    ) -> CovResult<()> {
        while self.cursor < self.regions.len() && self.regions[self.cursor].tid == tid {
            let reg = self.regions[self.cursor].clone();
            self.cursor += 1;

            let (start, end) = (reg.start, reg.end);
            if end <= 0 || start >= contig_len {
                continue;
            }
            let start = start.max(0);
            let end = end.min(contig_len);

            let mut min = i64::MAX;
            let mut max = 0i64;
            let mut sum = 0i64;
            let mut local_hist = Histogram::with_min_capacity(self.histogram.len());
            let mut threshold_hits = vec![0i64; self.thresholds.len()];
            for p in start..end {
                let cov = diff_fwd[p as usize] as i64 + diff_rev[p as usize] as i64;
                min = min.min(cov);
                max = max.max(cov);
                sum += cov;
                local_hist.increment(cov);
                for (i, t) in self.thresholds.iter().enumerate() {
                    if cov >= *t as i64 {
                        threshold_hits[i] += 1;
                    }
                }
            }
            let positions = end - start;
            let threshold_fracs: Vec<f64> =
                threshold_hits.iter().map(|h| *h as f64 / positions as f64).collect();
            self.write_summary_row(chrom, start, end, positions, sum, min, max, &threshold_fracs)?;

            self.histogram.merge_from(&local_hist);
            self.agg_stats.observe(min, max, sum, positions);

            if self.per_base {
                self.emit_bedgraph(chrom, start, end, diff_fwd, diff_rev)?;
            }
        }
        Ok(())
    }

    fn emit_bedgraph(&mut self, chrom: &str, start: i64, end: i64, diff_fwd: &[i32], diff_rev: &[i32]) -> CovResult<()> {
        if let Some(sink) = self.total_sink.as_mut() {
            segment::emit_track(
                start,
                end,
                |p| diff_fwd[p as usize] as i64 + diff_rev[p as usize] as i64,
                |s, e, cov| sink.write_line(chrom, s, e, cov),
            )?;
        }
        if self.by_strand {
            if let Some(sink) = self.fwd_sink.as_mut() {
                segment::emit_track(start, end, |p| diff_fwd[p as usize] as i64, |s, e, cov| sink.write_line(chrom, s, e, cov))?;
            }
            if let Some(sink) = self.rev_sink.as_mut() {
                segment::emit_track(start, end, |p| diff_rev[p as usize] as i64, |s, e, cov| sink.write_line(chrom, s, e, cov))?;
            }
        }
        Ok(())
    }

    fn emit_zero_row(&mut self, reg: &Region) -> CovResult<()> {
        let positions = reg.end - reg.start;
        if self.per_base {
            if let Some(sink) = self.total_sink.as_mut() {
                sink.write_line(&reg.chrom, reg.start, reg.end, 0)?;
            }
            if self.by_strand {
                if let Some(sink) = self.fwd_sink.as_mut() {
                    sink.write_line(&reg.chrom, reg.start, reg.end, 0)?;
                }
                if let Some(sink) = self.rev_sink.as_mut() {
                    sink.write_line(&reg.chrom, reg.start, reg.end, 0)?;
                }
            }
        }
        let zero_fracs = vec![0.0; self.thresholds.len()];
        self.write_summary_row(&reg.chrom, reg.start, reg.end, positions, 0, 0, 0, &zero_fracs)?;
        self.histogram.add(0, positions);
        self.agg_stats.observe(0, 0, 0, positions);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_summary_row(
        &mut self,
        chrom: &str,
        start: i64,
        end: i64,
        positions: i64,
        bases: i64,
        min: i64,
        max: i64,
        threshold_fracs: &[f64],
    ) -> CovResult<()> {
        let mean = if positions > 0 { bases as f64 / positions as f64 } else { 0.0 };
        let (min, max) = if positions > 0 { (min, max) } else { (0, 0) };
        let thresholds = threshold_fracs.iter().map(|f| format!("{f:.3}")).join("\t");
        writeln!(
            self.summary,
            "{chrom}\t{start}\t{end}\t{positions}\t{bases}\t{mean:.2}\t{min}\t{max}\t{thresholds}"
        )?;
        Ok(())
    }

    /// Drains any never-flushed regions, emits the aggregate "total" summary row and the
    /// dense teardown distribution, and closes every bedgraph sink with its companion index.
    pub fn teardown(mut self, header: &dyn ReferenceHeader) -> CovResult<()> {
        self.fill_skipped(header.target_count() as i32)?;

        let positions = self.agg_stats.positions;
        let bases = self.agg_stats.total_bases;
        let min = self.agg_stats.serialized_min();
        let max = self.agg_stats.max;
        let threshold_fracs: Vec<f64> =
            self.thresholds.iter().map(|t| self.histogram.fraction_at_least(*t)).collect();
        self.write_summary_row(&self.name.clone(), 0, positions, positions, bases, min, max, &threshold_fracs)?;
        self.summary.flush()?;

        self.write_distribution()?;
        self.distribution.flush()?;

        if let Some(sink) = self.total_sink.take() {
            sink.close()?;
        }
        if let Some(sink) = self.fwd_sink.take() {
            sink.close()?;
        }
        if let Some(sink) = self.rev_sink.take() {
            sink.close()?;
        }
        Ok(())
    }

    fn write_distribution(&mut self) -> CovResult<()> {
        let fractions = self.histogram.reverse_cumulative_fractions();
        for coverage in (0..fractions.len()).rev() {
            let fraction = fractions[coverage];
            if fraction < self.dist_cutoff {
                continue;
            }
            writeln!(self.distribution, "{}\t{}\t{:.3}", self.name, coverage, fraction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bedgraph::CompressionPool;

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

    fn scenario_a_diffs() -> (Vec<i32>, Vec<i32>) {
        // forward reads length 4 at 0, 3, 6 on a length-10 contig, no CIGAR walk.
        let mut fwd = vec![0i32; 11];
        for start in [0, 3, 6] {
            fwd[start] += 1;
            fwd[start + 4] -= 1;
        }
        segment::prefix_sum(&mut fwd[..10]);
        (fwd, vec![0i32; 11])
    }

    #[test]
    fn scenario_a_summary_row_matches_spec() {
        let header = FakeHeader { names: vec!["chr1"], lens: vec![10] };
        let tmp = tempfile::tempdir().unwrap();
        let pool = CompressionPool::new(1).unwrap();
        let mut writer = RegionWriter::new(
            &tmp.path().join("global"),
            "global",
            false,
            false,
            None,
            vec![1, 3],
            0,
            &header,
            &pool,
            DEFAULT_DIST_CUTOFF,
        )
        .unwrap();

        let (fwd, rev) = scenario_a_diffs();
        writer.flush_tid(0, "chr1", 10, &fwd, &rev).unwrap();
        assert_eq!(writer.agg_stats.total_bases, 12);
        assert_eq!(writer.agg_stats.positions, 10);
        assert_eq!(writer.agg_stats.min, Some(1));
        assert_eq!(writer.agg_stats.max, 2);
    }

    #[test]
    fn scenario_c_skipped_contig_emits_zero_row() {
        let header = FakeHeader { names: vec!["chr1", "chr2"], lens: vec![10, 10] };
        let tmp = tempfile::tempdir().unwrap();
        let pool = CompressionPool::new(1).unwrap();
        let bed_path = tmp.path().join("regions.bed");
        std::fs::write(&bed_path, "chr1\t0\t5\nchr2\t0\t5\n").unwrap();
        let mut writer = RegionWriter::new(
            &tmp.path().join("bed"),
            "bed",
            false,
            false,
            Some(&bed_path),
            vec![],
            0,
            &header,
            &pool,
            DEFAULT_DIST_CUTOFF,
        )
        .unwrap();

        let (fwd, rev) = (vec![1i32; 11], vec![0i32; 11]);
        writer.flush_tid(0, "chr1", 10, &fwd, &rev).unwrap();
        // chr2 never appears in the stream; engine calls fill_skipped(n_targets) at teardown.
        writer.teardown(&header).unwrap();
    }
}
