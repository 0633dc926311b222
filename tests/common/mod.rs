use std::io::Read as _;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use rust_htslib::bam::{self, Read};

pub fn run_bamcoverage(args: &[&str]) -> Result<Output> {
    let exe = Path::new(env!("CARGO_BIN_EXE_bamcoverage"));
    assert!(exe.exists());
    Ok(Command::new(exe).args(args).output()?)
}

/// Writes `sam_text` to a sibling `.sam` file and transcodes it to BAM at `bam_path` via
/// htslib, so tests build fixtures as plain SAM text rather than poking `bam::Record` fields
/// directly.
pub fn sam_to_bam(sam_text: &str, bam_path: &Path) -> Result<()> {
    let sam_path = bam_path.with_extension("sam");
    std::fs::write(&sam_path, sam_text)?;
    let mut reader = bam::Reader::from_path(&sam_path)?;
    let header = bam::Header::from_template(reader.header());
    let mut writer = bam::Writer::from_path(bam_path, &header, bam::Format::Bam)?;
    let mut record = bam::Record::new();
    while let Some(result) = reader.read(&mut record) {
        result?;
        writer.write(&record)?;
    }
    Ok(())
}

pub fn sam_header(sort_order: &str, contigs: &[(&str, u64)]) -> String {
    let mut lines = vec![format!("@HD\tVN:1.6\tSO:{sort_order}")];
    for (name, len) in contigs {
        lines.push(format!("@SQ\tSN:{name}\tLN:{len}"));
    }
    lines.join("\n") + "\n"
}

pub fn sam_record(qname: &str, flag: u16, rname: &str, pos_1based: i64, cigar: &str, seq_len: usize) -> String {
    let seq = "N".repeat(seq_len);
    let qual = "I".repeat(seq_len);
    format!("{qname}\t{flag}\t{rname}\t{pos_1based}\t60\t{cigar}\t*\t0\t0\t{seq}\t{qual}\n")
}

/// Decompresses a BGZF bedgraph (`.bed.gz`) into its plain-text contents for assertion.
pub fn read_bgzf_to_string(path: &Path) -> Result<String> {
    let mut reader = rust_htslib::bgzf::Reader::from_path(path)?;
    let mut out = String::new();
    reader.read_to_string(&mut out)?;
    Ok(out)
}
