//! Coverage computation engine: streams a coordinate-sorted alignment source once, maintains
//! per-contig difference arrays for both strands, and on each contig boundary flushes
//! per-base coverage into bedgraph tracks, per-region summary rows, and an aggregated
//! coverage distribution, for the whole genome, fixed-length tiles, and user BED intervals
//! alike. See `bamcoverage` (`src/bin/bamcoverage.rs`) for the CLI that drives this end to
//! end over a real BAM file.

pub mod bedgraph;
pub mod engine;
pub mod errors;
pub mod header;
pub mod histogram;
pub mod logging;
pub mod region;
pub mod region_writer;
pub mod segment;

pub use engine::{CovWriter, CoverageOptions};
pub use errors::{CovError, CovResult};
pub use region::{BedRegions, Region};
