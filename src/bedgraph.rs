//! BGZF bedgraph sinks, built directly on `rust_htslib`'s raw `htslib` FFI re-exports
//! (`bgzf_open`, `bgzf_write`, `bgzf_index_build_init`, `bgzf_index_dump`, `bgzf_close`):
//! neither a pure-Rust BGZF crate nor `rust_htslib`'s safe wrapper exposes a companion
//! coordinate-index writer, so the sink talks to htslib directly. A
//! shared `hts_tpool` lets block compression for every open sink run off the engine's
//! single processing thread; `bgzf_write` itself blocks when that pool's queue is full,
//! which is the suspension point named in \S5.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use rust_htslib::htslib;

use crate::errors::{CovError, CovResult};

fn io_err(msg: impl Into<String>) -> CovError {
    CovError::Io(std::io::Error::other(msg.into()))
}

fn cstring_path(path: &Path) -> CovResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|e| io_err(e.to_string()))
}

/// Owns the `hts_tpool` every [`BedgraphSink`] opened against it attaches to via
/// `bgzf_thread_pool`. Must outlive every sink it was handed to; the CLI binary constructs
/// one from `--threads` and destroys it only after `CovWriter::destroy()` returns.
pub struct CompressionPool {
    raw: *mut htslib::hts_tpool,
}

// The pool is only ever read (its pointer handed to htslib calls); htslib's own thread pool
// implementation is internally synchronized.
unsafe impl Send for CompressionPool {}
unsafe impl Sync for CompressionPool {}

impl CompressionPool {
    pub fn new(threads: usize) -> CovResult<Self> {
        if threads == 0 {
            return Err(CovError::ConfigMismatch("compression thread pool size must be at least 1".to_string()));
        }
        let raw = unsafe { htslib::hts_tpool_init(threads as i32) };
        if raw.is_null() {
            return Err(io_err("hts_tpool_init failed"));
        }
        Ok(Self { raw })
    }
}

impl Drop for CompressionPool {
    fn drop(&mut self) {
        unsafe { htslib::hts_tpool_destroy(self.raw) }
    }
}

/// One `.bed.gz` (or `.fwd.bed.gz` / `.rev.bed.gz`) output: a BGZF-compressed bedgraph track
/// with a companion `.csi` index built incrementally as lines are written.
pub struct BedgraphSink {
    path: PathBuf,
    fp: *mut htslib::BGZF,
}

impl BedgraphSink {
    pub fn create(path: PathBuf, pool: &CompressionPool) -> CovResult<Self> {
        let c_path = cstring_path(&path)?;
        let mode = CString::new("w").unwrap();
        let fp = unsafe { htslib::bgzf_open(c_path.as_ptr(), mode.as_ptr()) };
        if fp.is_null() {
            return Err(io_err(format!("bgzf_open failed for {}", path.display())));
        }
        if unsafe { htslib::bgzf_thread_pool(fp, pool.raw, 0) } < 0 {
            return Err(io_err(format!("bgzf_thread_pool failed for {}", path.display())));
        }
        if unsafe { htslib::bgzf_index_build_init(fp) } < 0 {
            return Err(io_err(format!("bgzf_index_build_init failed for {}", path.display())));
        }
        Ok(Self { path, fp })
    }

    /// Appends one `chrom\tstart\tend\tcoverage\n` bedgraph line, formatted into a stack
    /// buffer and written atomically as a single `bgzf_write`.
    pub fn write_line(&mut self, chrom: &str, start: i64, end: i64, coverage: i64) -> CovResult<()> {
        use std::fmt::Write as _;
        let mut line = String::with_capacity(chrom.len() + 32);
        write!(line, "{chrom}\t{start}\t{end}\t{coverage}\n").expect("formatting into a String cannot fail");
        let n = unsafe {
            htslib::bgzf_write(self.fp, line.as_ptr() as *const std::ffi::c_void, line.len())
        };
        if n < 0 || n as usize != line.len() {
            return Err(io_err(format!("bgzf_write failed for {}", self.path.display())));
        }
        Ok(())
    }

    /// Dumps the companion `.csi` index and closes the underlying BGZF handle.
    pub fn close(self) -> CovResult<()> {
        let bname = cstring_path(&self.path)?;
        let suffix = CString::new(".csi").unwrap();
        if unsafe { htslib::bgzf_index_dump(self.fp, bname.as_ptr(), suffix.as_ptr()) } < 0 {
            return Err(io_err(format!("bgzf_index_dump failed for {}", self.path.display())));
        }
        if unsafe { htslib::bgzf_close(self.fp) } < 0 {
            return Err(io_err(format!("bgzf_close failed for {}", self.path.display())));
        }
        Ok(())
    }
}
