//! In-memory record streams.
//!
//! Useful for embedding the filter in other tools and for exercising the
//! engine without touching the filesystem. A source can be scripted to fail
//! individual reads; a sink can be told to reject header updates.

use crate::data::{ParticleCounts, ParticleRecord, PhspHeader};
use crate::error::{PhspError, Result};
use crate::stream::{RecordSink, RecordSource, SizeCheck};
use std::collections::VecDeque;

/// Record source backed by a queue of scripted reads.
#[derive(Debug, Clone)]
pub struct MemorySource {
    header: PhspHeader,
    slots: VecDeque<Option<ParticleRecord>>,
    size_check: SizeCheck,
    position: u64,
}

impl MemorySource {
    /// A source whose header counts exactly `records`.
    pub fn from_records(records: Vec<ParticleRecord>) -> Self {
        let mut header = PhspHeader::new("in-memory");
        header.particles = records.len() as i64;
        for rec in &records {
            header.counts.add(rec.particle_type);
        }
        Self::with_header(header, records)
    }

    /// A source with an explicit header.
    pub fn with_header(header: PhspHeader, records: Vec<ParticleRecord>) -> Self {
        Self {
            header,
            slots: records.into_iter().map(Some).collect(),
            size_check: SizeCheck::Ok,
            position: 0,
        }
    }

    /// A source where every read fails.
    pub fn failing(header_count: i64) -> Self {
        let mut header = PhspHeader::new("failing");
        header.particles = header_count;
        Self::with_header(header, Vec::new())
    }

    /// Queue a read failure after the records queued so far.
    pub fn push_failure(&mut self) {
        self.slots.push_back(None);
    }

    /// Queue another record.
    pub fn push_record(&mut self, record: ParticleRecord) {
        self.slots.push_back(Some(record));
    }

    /// Make the consistency check report `check`.
    pub fn set_size_check(&mut self, check: SizeCheck) {
        self.size_check = check;
    }

    /// Reads still queued.
    pub fn remaining(&self) -> usize {
        self.slots.len()
    }
}

impl RecordSource for MemorySource {
    fn header(&self) -> &PhspHeader {
        &self.header
    }

    fn check_size_and_byte_order(&self) -> Result<SizeCheck> {
        Ok(self.size_check.clone())
    }

    fn read_record(&mut self) -> Result<ParticleRecord> {
        let position = self.position;
        self.position += 1;
        match self.slots.pop_front() {
            Some(Some(record)) => Ok(record),
            Some(None) => Err(PhspError::ReadFailure {
                offset: position,
                reason: "scripted read failure".to_string(),
            }),
            None => Err(PhspError::ReadFailure {
                offset: position,
                reason: "no more records".to_string(),
            }),
        }
    }
}

/// Record sink that keeps everything in memory.
#[derive(Debug, Clone)]
pub struct MemorySink {
    header: PhspHeader,
    records: Vec<ParticleRecord>,
    counts: ParticleCounts,
    orig_histories: Option<i64>,
    header_updates: usize,
    reject_updates: bool,
    reject_writes: bool,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            header: PhspHeader::new("in-memory"),
            records: Vec::new(),
            counts: ParticleCounts::default(),
            orig_histories: None,
            header_updates: 0,
            reject_updates: false,
            reject_writes: false,
        }
    }

    /// A sink whose `update_header` always fails.
    pub fn rejecting_updates() -> Self {
        Self {
            reject_updates: true,
            ..Self::new()
        }
    }

    /// A sink whose `write_record` always fails.
    pub fn rejecting_writes() -> Self {
        Self {
            reject_writes: true,
            ..Self::new()
        }
    }

    pub fn header(&self) -> &PhspHeader {
        &self.header
    }

    /// Records written, in order.
    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    /// Number of successful `update_header` calls.
    pub fn header_updates(&self) -> usize {
        self.header_updates
    }
}

impl RecordSink for MemorySink {
    fn copy_header(&mut self, header: &PhspHeader) -> Result<()> {
        if !self.records.is_empty() {
            return Err(PhspError::CopyHeader(
                "records were already written to the output".to_string(),
            ));
        }
        self.header = header.clone();
        self.header.particles = 0;
        self.header.counts = ParticleCounts::default();
        Ok(())
    }

    fn set_extra_field_counts(&mut self, floats: usize, ints: usize) {
        self.header.set_extra_counts(floats, ints);
    }

    fn write_record(&mut self, record: &ParticleRecord) -> Result<()> {
        if self.reject_writes {
            return Err(PhspError::Io(std::io::Error::other("sink rejects writes")));
        }
        // Only the configured extension slots are kept.
        let mut stored = record.clone();
        stored
            .extra_floats
            .truncate(self.header.contents.n_extra_floats());
        stored
            .extra_ints
            .truncate(self.header.contents.n_extra_longs());
        self.counts.add(stored.particle_type);
        self.records.push(stored);
        Ok(())
    }

    fn set_original_histories(&mut self, value: i64) {
        self.orig_histories = Some(value);
    }

    fn update_header(&mut self) -> Result<()> {
        if self.reject_updates {
            return Err(PhspError::Io(std::io::Error::other("sink rejects header updates")));
        }
        self.header.particles = self.records.len() as i64;
        self.header.counts = self.counts.clone();
        self.header.checksum =
            self.header.contents.record_length() as u64 * self.records.len() as u64;
        if let Some(histories) = self.orig_histories {
            self.header.orig_histories = histories;
        }
        self.header_updates += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ParticleType;

    fn photon() -> ParticleRecord {
        ParticleRecord::new(ParticleType::Photon, [0.0; 3], [0.0, 0.0, 1.0])
    }

    #[test]
    fn test_scripted_reads() {
        let mut source = MemorySource::from_records(vec![photon()]);
        source.push_failure();
        source.push_record(photon());

        assert_eq!(source.expected_record_count(), 1);
        assert!(source.read_record().is_ok());
        assert!(matches!(
            source.read_record(),
            Err(PhspError::ReadFailure { offset: 1, .. })
        ));
        assert!(source.read_record().is_ok());
        assert!(source.read_record().is_err());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_sink_truncates_extras() {
        let mut sink = MemorySink::new();
        let mut header = PhspHeader::new("extras");
        header.set_extra_counts(1, 0);
        sink.copy_header(&header).unwrap();

        sink.write_record(&photon().with_extras(vec![1.0, 2.0], vec![7]))
            .unwrap();
        assert_eq!(sink.records()[0].extra_floats, vec![1.0]);
        assert!(sink.records()[0].extra_ints.is_empty());
    }

    #[test]
    fn test_sink_update_header() {
        let mut sink = MemorySink::new();
        sink.write_record(&photon()).unwrap();
        sink.set_original_histories(12);
        sink.update_header().unwrap();

        assert_eq!(sink.header().particles, 1);
        assert_eq!(sink.header().orig_histories, 12);
        assert_eq!(sink.header().counts.photons, 1);
        assert_eq!(sink.header_updates(), 1);
    }

    #[test]
    fn test_rejecting_sink() {
        let mut sink = MemorySink::rejecting_updates();
        assert!(sink.update_header().is_err());
        assert_eq!(sink.header_updates(), 0);

        let mut sink = MemorySink::rejecting_writes();
        assert!(sink.write_record(&photon()).is_err());
        assert!(sink.records().is_empty());
    }
}
