//! Interval store: a sorted list of half-open regions keyed to reference ids, either loaded
//! from a BED file or synthesized from a reference header.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nom::bytes::complete::{is_not, tag};
use nom::character::complete::digit1;
use nom::combinator::map_res;
use nom::IResult;
use rustc_hash::FxHashMap;

use crate::errors::CovError;
use crate::header::ReferenceHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub tid: i32,
    pub start: i64,
    pub end: i64,
}

impl Region {
    pub fn label(&self) -> String {
        format!("{}:{}-{}", self.chrom, self.start, self.end)
    }
}

pub struct BedRegions {
    pub regions: Vec<Region>,
    pub is_whole_chrom: bool,
}

impl BedRegions {
    /// Parses a three-column BED file (`chr\tstart\tend`, extra columns ignored). Rows that
    /// are malformed, reference an unknown chromosome, or collapse to empty after clamping
    /// to `[0, length(tid))` are logged and skipped rather than failing the load.
    pub fn load(path: &Path, header: &dyn ReferenceHeader) -> Result<Self, CovError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let tid_by_name = build_tid_index(header);

        let mut regions = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let Ok((_, (chrom, raw_start, raw_end))) = bed3_fields(&line) else {
                let err = CovError::BadRegion(format!(
                    "{}:{}: malformed BED row, skipping: {line:?}",
                    path.display(),
                    lineno + 1
                ));
                log::warn!("{err}");
                continue;
            };
            let Some(&tid) = tid_by_name.get(chrom) else {
                let err = CovError::BadRegion(format!(
                    "{}:{}: unknown reference {chrom:?}, skipping",
                    path.display(),
                    lineno + 1
                ));
                log::warn!("{err}");
                continue;
            };
            if raw_start >= raw_end {
                let err = CovError::BadRegion(format!(
                    "{}:{}: start >= end ({raw_start} >= {raw_end}), skipping",
                    path.display(),
                    lineno + 1
                ));
                log::warn!("{err}");
                continue;
            }
            let length = header.target_len(tid as usize) as i64;
            let (start, end) = (raw_start.max(0), raw_end.min(length));
            if start >= end {
                let err = CovError::BadRegion(format!(
                    "{}:{}: region {chrom}:{raw_start}-{raw_end} clipped to empty against reference length {length}, skipping",
                    path.display(),
                    lineno + 1
                ));
                log::warn!("{err}");
                continue;
            }
            if start != raw_start || end != raw_end {
                log::warn!(
                    "{}:{}: region {chrom}:{raw_start}-{raw_end} clamped to {chrom}:{start}-{end}",
                    path.display(),
                    lineno + 1
                );
            }
            regions.push(Region {
                chrom: chrom.to_string(),
                tid,
                start,
                end,
            });
        }

        regions.sort_by_key(|r| (r.tid, r.start, r.end));
        Ok(Self {
            regions,
            is_whole_chrom: false,
        })
    }

    /// `segment_length == 0` yields one whole-chromosome region per reference; otherwise
    /// consecutive tiles of `segment_length`, with the last tile of each reference clamped.
    pub fn synthesize(header: &dyn ReferenceHeader, segment_length: u32) -> Self {
        let mut regions = Vec::new();
        for tid in 0..header.target_count() {
            let name = header.target_name(tid).to_string();
            let length = header.target_len(tid) as i64;
            if segment_length == 0 {
                regions.push(Region {
                    chrom: name,
                    tid: tid as i32,
                    start: 0,
                    end: length,
                });
                continue;
            }
            let step = segment_length as i64;
            let mut start = 0;
            while start < length {
                let end = (start + step).min(length);
                regions.push(Region {
                    chrom: name.clone(),
                    tid: tid as i32,
                    start,
                    end,
                });
                start = end;
            }
        }
        Self {
            regions,
            is_whole_chrom: segment_length == 0,
        }
    }
}

fn build_tid_index(header: &dyn ReferenceHeader) -> FxHashMap<String, i32> {
    (0..header.target_count())
        .map(|tid| (header.target_name(tid).to_string(), tid as i32))
        .collect()
}

fn bed3_fields(line: &str) -> IResult<&str, (&str, i64, i64)> {
    let (rest, chrom) = is_not("\t")(line)?;
    let (rest, _) = tag("\t")(rest)?;
    let (rest, start) = map_res(digit1, str::parse::<i64>)(rest)?;
    let (rest, _) = tag("\t")(rest)?;
    let (rest, end) = map_res(digit1, str::parse::<i64>)(rest)?;
    Ok((rest, (chrom, start, end)))
}
