//! Filter run composition and execution.

pub mod config;
pub mod cut;
pub mod engine;

pub use config::{FilterConfig, SizeCheckPolicy, DEFAULT_ERROR_THRESHOLD};
pub use cut::{cut_phase_space, CutSummary};
pub use engine::{
    finalize, FilterEngine, LogObserver, NullObserver, RunObserver, RunResult,
    DEFAULT_PROGRESS_INTERVAL,
};
