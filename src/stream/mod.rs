//! Record stream abstraction.
//!
//! The filter engine only talks to phase-space storage through the
//! [`RecordSource`] and [`RecordSink`] traits. The IAEA file backend and an
//! in-memory backend implement them.

pub mod iaea;
pub mod memory;

pub use iaea::{IaeaSink, IaeaSource};
pub use memory::{MemorySink, MemorySource};

use crate::data::{ParticleRecord, PhspHeader};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inconsistency between a header and its record file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeMismatch {
    /// Record file length differs from `$CHECKSUM`.
    FileSize { expected: u64, actual: u64 },
    /// `$BYTE_ORDER` is not a recognised value.
    ByteOrder(i32),
    /// `$RECORD_LENGTH` disagrees with `$RECORD_CONTENTS`.
    RecordLength { declared: usize, computed: usize },
}

impl SizeMismatch {
    /// Numeric code reported to users.
    pub fn code(&self) -> i32 {
        match self {
            Self::FileSize { .. } => -2,
            Self::ByteOrder(_) => -3,
            Self::RecordLength { .. } => -4,
        }
    }
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileSize { expected, actual } => write!(
                f,
                "record file is {} bytes, header checksum expects {}",
                actual, expected
            ),
            Self::ByteOrder(code) => write!(f, "unrecognised byte order {}", code),
            Self::RecordLength { declared, computed } => write!(
                f,
                "header declares {}-byte records, layout implies {}",
                declared, computed
            ),
        }
    }
}

/// Result of a size and byte-order consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeCheck {
    Ok,
    Mismatch(SizeMismatch),
}

/// An ordered, finite, non-restartable sequence of particle records.
pub trait RecordSource {
    /// Header metadata of the stream.
    fn header(&self) -> &PhspHeader;

    /// Check that the stored records agree with the header.
    fn check_size_and_byte_order(&self) -> Result<SizeCheck>;

    /// Number of records the header claims to hold.
    fn expected_record_count(&self) -> i64 {
        self.header().particles
    }

    /// Read the next record.
    ///
    /// An `Err` is a per-record read failure; callers decide whether to
    /// keep reading.
    fn read_record(&mut self) -> Result<ParticleRecord>;
}

/// Destination for records, written in submission order.
pub trait RecordSink {
    /// Take over the metadata of an input stream.
    fn copy_header(&mut self, header: &PhspHeader) -> Result<()>;

    /// Number of extension floats and ints stored per output record.
    fn set_extra_field_counts(&mut self, floats: usize, ints: usize);

    fn write_record(&mut self, record: &ParticleRecord) -> Result<()>;

    /// Set the original-history count reported in the header.
    fn set_original_histories(&mut self, value: i64);

    /// Commit counters and pending metadata to the header.
    fn update_header(&mut self) -> Result<()>;
}

/// Number of records a run should attempt for a header count.
///
/// Headers are taken to count one trailing record beyond the readable ones,
/// so a positive count is reduced by one.
pub fn expected_record_bound(count: i64) -> i64 {
    if count > 0 {
        count - 1
    } else {
        count
    }
}
