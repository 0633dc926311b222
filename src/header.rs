//! Trait-based decoupling between the coverage engine and any one BAM library. The engine
//! only ever sees a reference header through [`ReferenceHeader`] and an alignment record
//! through [`AlignedRecord`]; the adapters here are the only place `rust_htslib` types
//! appear by name.

use rust_htslib::bam::record::{Cigar, CigarStringView, Record};
use rust_htslib::bam::HeaderView;

/// An ordered sequence of `(tid, name, length)`, borrowed for the lifetime of the engine.
pub trait ReferenceHeader {
    fn target_count(&self) -> usize;
    fn target_name(&self, tid: usize) -> &str;
    fn target_len(&self, tid: usize) -> u64;
    /// The `SO` tag of the `@HD` header line, if present.
    fn sort_order(&self) -> Option<&str>;
}

/// An abstract source record: reference id, position, flags, and CIGAR operations.
pub trait AlignedRecord {
    fn tid(&self) -> i32;
    fn pos(&self) -> i64;
    fn flags(&self) -> u16;
    fn is_reverse(&self) -> bool;
    fn cigar(&self) -> &[Cigar];
}

/// Sum of reference-consuming CIGAR operation lengths (M/D/N/=/X), i.e. `bam_cigar2rlen`.
/// Used by the non-CIGAR-walk coverage path, which still needs the total reference span of
/// an alignment even though it does not distinguish gaps (D/N) within it.
pub fn ref_consumed_len(cigar: &[Cigar]) -> i64 {
    cigar
        .iter()
        .map(|op| match op {
            Cigar::Match(n) | Cigar::Del(n) | Cigar::RefSkip(n) | Cigar::Equal(n) | Cigar::Diff(n) => {
                *n as i64
            }
            Cigar::Ins(_) | Cigar::SoftClip(_) | Cigar::HardClip(_) | Cigar::Pad(_) => 0,
        })
        .sum()
}

pub struct BamHeader<'a> {
    view: &'a HeaderView,
    sort_order: Option<String>,
}

impl<'a> BamHeader<'a> {
    pub fn new(view: &'a HeaderView) -> Self {
        let sort_order = parse_sort_order(view);
        Self { view, sort_order }
    }
}

impl<'a> ReferenceHeader for BamHeader<'a> {
    fn target_count(&self) -> usize {
        self.view.target_count() as usize
    }

    fn target_name(&self, tid: usize) -> &str {
        std::str::from_utf8(self.view.target_names()[tid]).unwrap_or_default()
    }

    fn target_len(&self, tid: usize) -> u64 {
        self.view.target_len(tid as u32).unwrap_or(0)
    }

    fn sort_order(&self) -> Option<&str> {
        self.sort_order.as_deref()
    }
}

fn parse_sort_order(view: &HeaderView) -> Option<String> {
    let text = String::from_utf8_lossy(view.as_bytes());
    for line in text.lines() {
        let Some(rest) = line.strip_prefix("@HD") else { continue };
        for field in rest.split('\t') {
            if let Some(so) = field.strip_prefix("SO:") {
                return Some(so.to_string());
            }
        }
    }
    None
}

/// Adapts a `rust_htslib` BAM record. The CIGAR is materialized once at construction
/// (`Record::cigar()` parses the raw op array into a `CigarStringView`) so `cigar()` itself
/// is a cheap borrow.
pub struct BamRecordAdapter<'a> {
    record: &'a Record,
    cigar: CigarStringView,
}

impl<'a> BamRecordAdapter<'a> {
    pub fn new(record: &'a Record) -> Self {
        let cigar = record.cigar();
        Self { record, cigar }
    }
}

impl<'a> AlignedRecord for BamRecordAdapter<'a> {
    fn tid(&self) -> i32 {
        self.record.tid()
    }

    fn pos(&self) -> i64 {
        self.record.pos()
    }

    fn flags(&self) -> u16 {
        self.record.flags()
    }

    fn is_reverse(&self) -> bool {
        self.record.is_reverse()
    }

    fn cigar(&self) -> &[Cigar] {
        &self.cigar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_consumed_len_counts_only_ref_consuming_ops() {
        let cigar = [
            Cigar::SoftClip(3),
            Cigar::Match(10),
            Cigar::Ins(2),
            Cigar::Del(4),
            Cigar::RefSkip(100),
            Cigar::Equal(5),
            Cigar::Diff(1),
            Cigar::HardClip(6),
        ];
        assert_eq!(ref_consumed_len(&cigar), 10 + 4 + 100 + 5 + 1);
    }
}
