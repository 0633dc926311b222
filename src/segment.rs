//! Small, careful routines shared by the engine's flush path: in-place prefix summation of
//! difference arrays and change-point detection that turns a per-position coverage function
//! into piecewise-constant bedgraph segments.

use crate::errors::CovResult;

/// Converts a difference array into a cumulative-sum coverage array in place, over
/// `buf[0..buf.len())`. The caller is responsible for only summing the used prefix of a
/// larger backing buffer.
pub fn prefix_sum(buf: &mut [i32]) {
    let mut running = 0i32;
    for v in buf.iter_mut() {
        running += *v;
        *v = running;
    }
}

/// Walks `[start, end)`, calling `emit(seg_start, seg_end, coverage)` once per maximal run of
/// constant coverage as reported by `cov_at`. A change point is any position whose coverage
/// differs from the previous position; the final segment always closes at `end`.
pub fn emit_track(
    start: i64,
    end: i64,
    mut cov_at: impl FnMut(i64) -> i64,
    mut emit: impl FnMut(i64, i64, i64) -> CovResult<()>,
) -> CovResult<()> {
    if start >= end {
        return Ok(());
    }
    let mut seg_start = start;
    let mut prev = cov_at(start);
    for p in (start + 1)..end {
        let cov = cov_at(p);
        if cov != prev {
            emit(seg_start, p, prev)?;
            seg_start = p;
            prev = cov;
        }
    }
    emit(seg_start, end, prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sum_recovers_coverage_from_difference_array() {
        // three reads of length 4 at 0, 3, 6 on a length-10 contig
        let mut diff = vec![0i32; 11];
        for start in [0, 3, 6] {
            diff[start] += 1;
            diff[start + 4] -= 1;
        }
        prefix_sum(&mut diff[..10]);
        assert_eq!(&diff[..10], &[1, 1, 1, 2, 1, 1, 2, 1, 1, 1]);
    }

    #[test]
    fn emit_track_reports_maximal_constant_runs() {
        let cov = [1, 1, 1, 2, 1, 1, 2, 1, 1, 1];
        let mut segments = Vec::new();
        emit_track(0, 10, |p| cov[p as usize] as i64, |s, e, c| {
            segments.push((s, e, c));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            segments,
            vec![
                (0, 3, 1),
                (3, 4, 2),
                (4, 6, 1),
                (6, 7, 2),
                (7, 10, 1),
            ]
        );
    }

    #[test]
    fn emit_track_empty_range_emits_nothing() {
        let mut called = false;
        emit_track(5, 5, |_| 0, |_, _, _| {
            called = true;
            Ok(())
        })
        .unwrap();
        assert!(!called);
    }
}
