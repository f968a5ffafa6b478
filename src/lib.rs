//! Phase-Space Window Cutter Library
//!
//! This library filters IAEA phase-space particle files by spatial extent:
//! only particles whose straight-line track crosses a fixed plane inside a
//! rectangular window are kept, in the original record format.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (ParticleRecord, PhspHeader)
//! - **filter**: The planar window predicate
//! - **stream**: Record source/sink traits with IAEA file and in-memory backends
//! - **pipeline**: The streaming filter engine, run configuration, and file-to-file cut
//!
//! # Example
//!
//! ```no_run
//! use phsp_cutter::prelude::*;
//!
//! let config = FilterConfig::default();
//! let summary = cut_phase_space("input/beam", "output/beam_cut", &config).unwrap();
//! println!("kept {} records", summary.result.accepted);
//! ```

pub mod data;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod stream;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        ByteOrder, FieldStorage, ParticleCounts, ParticleRecord, ParticleType, PhspHeader,
        RecordContents,
    };
    pub use crate::error::{PhspError, Result};
    pub use crate::filter::{evaluate, project, Decision, GeometryWindow};
    pub use crate::pipeline::{
        cut_phase_space, finalize, CutSummary, FilterConfig, FilterEngine, LogObserver,
        NullObserver, RunObserver, RunResult, SizeCheckPolicy,
    };
    pub use crate::stream::{
        expected_record_bound, IaeaSink, IaeaSource, MemorySink, MemorySource, RecordSink,
        RecordSource, SizeCheck, SizeMismatch,
    };
}
