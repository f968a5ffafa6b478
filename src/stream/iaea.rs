//! IAEA phase-space file backend.
//!
//! A phase-space file is a pair `<base>.IAEAheader` (text) and
//! `<base>.IAEAphsp` (fixed-length binary records). Each record holds:
//!
//! - a signed type byte, whose sign is the sign of `w`
//! - the energy as `f32`, negative when the particle starts a new history
//! - the stored subset of x, y, z, u, v and weight as `f32`
//! - the extra floats (`f32`) and extra longs (`i32`)
//!
//! `w` is not stored; it is recovered from `u`, `v` and the type sign.

use crate::data::{
    ByteOrder, FieldStorage, ParticleCounts, ParticleRecord, ParticleType, PhspHeader,
};
use crate::error::{PhspError, Result};
use crate::stream::{RecordSink, RecordSource, SizeCheck, SizeMismatch};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Header file extension.
pub const HEADER_EXTENSION: &str = ".IAEAheader";
/// Record file extension.
pub const DATA_EXTENSION: &str = ".IAEAphsp";

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<base>.IAEAheader`
pub fn header_path<P: AsRef<Path>>(base: P) -> PathBuf {
    with_suffix(base.as_ref(), HEADER_EXTENSION)
}

/// `<base>.IAEAphsp`
pub fn data_path<P: AsRef<Path>>(base: P) -> PathBuf {
    with_suffix(base.as_ref(), DATA_EXTENSION)
}

/// Remove both files of a phase-space pair.
///
/// Removal failures are logged and otherwise ignored; a path that cannot be
/// cleared surfaces later when the pair is created or its header written.
pub fn remove_files<P: AsRef<Path>>(base: P) {
    for path in [header_path(&base), data_path(&base)] {
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed stale {:?}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Cannot remove stale {:?}: {}", path, e),
        }
    }
}

fn read_f32(bytes: &[u8], order: ByteOrder) -> f32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match order {
        ByteOrder::Little => f32::from_le_bytes(raw),
        ByteOrder::Big => f32::from_be_bytes(raw),
    }
}

fn read_i32(bytes: &[u8], order: ByteOrder) -> i32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match order {
        ByteOrder::Little => i32::from_le_bytes(raw),
        ByteOrder::Big => i32::from_be_bytes(raw),
    }
}

fn push_f32(buf: &mut Vec<u8>, value: f32, order: ByteOrder) {
    match order {
        ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
        ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
    }
}

fn push_i32(buf: &mut Vec<u8>, value: i32, order: ByteOrder) {
    match order {
        ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
        ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Read-only phase-space file.
pub struct IaeaSource {
    header: PhspHeader,
    data_path: PathBuf,
    reader: BufReader<File>,
    buf: Vec<u8>,
    offset: u64,
    exhausted: bool,
}

impl IaeaSource {
    /// Open `<base>.IAEAheader` and `<base>.IAEAphsp` for reading.
    pub fn open<P: AsRef<Path>>(base: P) -> Result<Self> {
        let header = PhspHeader::from_file(header_path(&base))?;
        let data_path = data_path(&base);
        let reader = BufReader::new(File::open(&data_path)?);
        let buf = vec![0u8; header.contents.record_length()];

        Ok(Self {
            header,
            data_path,
            reader,
            buf,
            offset: 0,
            exhausted: false,
        })
    }

    /// Path of the binary record file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Close the source.
    pub fn close(self) {}

    fn failure(&self, reason: impl Into<String>) -> PhspError {
        PhspError::ReadFailure {
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn decode(&self, order: ByteOrder) -> Result<ParticleRecord> {
        let contents = &self.header.contents;
        let type_byte = self.buf[0] as i8;
        if type_byte == 0 {
            return Err(self.failure("particle type 0 is not valid"));
        }
        if type_byte == i8::MIN {
            return Err(self.failure("particle type -128 is out of range"));
        }

        let mut pos = 1;
        let mut next_f32 = || {
            let value = read_f32(&self.buf[pos..pos + 4], order);
            pos += 4;
            value
        };

        let raw_energy = next_f32();
        let mut field = |storage: FieldStorage| match storage {
            FieldStorage::Stored => next_f32(),
            FieldStorage::Constant(value) => value,
        };
        let x = field(contents.x);
        let y = field(contents.y);
        let z = field(contents.z);
        let u = field(contents.u);
        let v = field(contents.v);
        let weight = field(contents.weight);

        let w = match contents.w {
            FieldStorage::Stored => {
                let magnitude = (1.0 - u * u - v * v).max(0.0).sqrt();
                if type_byte < 0 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            FieldStorage::Constant(value) => value,
        };

        let extra_floats: Vec<f32> = (0..contents.n_extra_floats())
            .map(|_| next_f32())
            .collect();
        let extra_ints: Vec<i32> = (0..contents.n_extra_longs())
            .map(|_| {
                let value = read_i32(&self.buf[pos..pos + 4], order);
                pos += 4;
                value
            })
            .collect();

        Ok(ParticleRecord {
            status: if raw_energy.is_sign_negative() { 1 } else { 0 },
            particle_type: ParticleType::from_code(type_byte.unsigned_abs() as i32),
            energy: raw_energy.abs(),
            weight,
            x,
            y,
            z,
            u,
            v,
            w,
            extra_floats,
            extra_ints,
        })
    }
}

impl RecordSource for IaeaSource {
    fn header(&self) -> &PhspHeader {
        &self.header
    }

    fn check_size_and_byte_order(&self) -> Result<SizeCheck> {
        if self.header.byte_order().is_none() {
            return Ok(SizeCheck::Mismatch(SizeMismatch::ByteOrder(
                self.header.byte_order,
            )));
        }

        let computed = self.header.contents.record_length();
        if self.header.record_length != computed {
            return Ok(SizeCheck::Mismatch(SizeMismatch::RecordLength {
                declared: self.header.record_length,
                computed,
            }));
        }

        let actual = fs::metadata(&self.data_path)?.len();
        if actual != self.header.checksum {
            return Ok(SizeCheck::Mismatch(SizeMismatch::FileSize {
                expected: self.header.checksum,
                actual,
            }));
        }
        Ok(SizeCheck::Ok)
    }

    fn read_record(&mut self) -> Result<ParticleRecord> {
        if self.exhausted {
            return Err(self.failure("no more records in file"));
        }
        let order = self
            .header
            .byte_order()
            .ok_or_else(|| self.failure("unrecognised byte order"))?;

        match self.reader.read_exact(&mut self.buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.exhausted = true;
                return Err(self.failure("unexpected end of record file"));
            }
            Err(e) => return Err(self.failure(e.to_string())),
        }

        let record = self.decode(order);
        self.offset += self.buf.len() as u64;
        record
    }
}

/// Write-only phase-space file.
///
/// Records go to `<base>.IAEAphsp` as they are written; the header file is
/// (re)written by [`RecordSink::update_header`].
pub struct IaeaSink {
    header: PhspHeader,
    header_path: PathBuf,
    data_path: PathBuf,
    writer: BufWriter<File>,
    buf: Vec<u8>,
    written: i64,
    counts: ParticleCounts,
    orig_histories: Option<i64>,
}

impl IaeaSink {
    /// Create (truncating) `<base>.IAEAphsp` with a fresh default header.
    pub fn create<P: AsRef<Path>>(base: P) -> Result<Self> {
        let data_path = data_path(&base);
        let writer = BufWriter::new(File::create(&data_path)?);

        Ok(Self {
            header: PhspHeader::new(""),
            header_path: header_path(&base),
            data_path,
            writer,
            buf: Vec::new(),
            written: 0,
            counts: ParticleCounts::default(),
            orig_histories: None,
        })
    }

    /// Current header state, including any committed counters.
    pub fn header(&self) -> &PhspHeader {
        &self.header
    }

    /// Path of the binary record file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> i64 {
        self.written
    }

    /// Flush buffered records and close the sink.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn encode(&mut self, record: &ParticleRecord, order: ByteOrder) -> Result<()> {
        let contents = &self.header.contents;
        let code = record.particle_type.code();
        if !(1..=i8::MAX as i32).contains(&code) {
            return Err(PhspError::InvalidParameter(format!(
                "Particle type code {} cannot be stored in an IAEA record",
                code
            )));
        }

        let mut type_byte = code as i8;
        if contents.w.is_stored() && record.w < 0.0 {
            type_byte = -type_byte;
        }

        self.buf.clear();
        self.buf.push(type_byte as u8);
        let energy = if record.is_new_history() {
            -record.energy.abs()
        } else {
            record.energy.abs()
        };
        push_f32(&mut self.buf, energy, order);

        for (storage, value) in [
            (contents.x, record.x),
            (contents.y, record.y),
            (contents.z, record.z),
            (contents.u, record.u),
            (contents.v, record.v),
            (contents.weight, record.weight),
        ] {
            if storage.is_stored() {
                push_f32(&mut self.buf, value, order);
            }
        }

        for i in 0..contents.n_extra_floats() {
            let value = record.extra_floats.get(i).copied().unwrap_or(0.0);
            push_f32(&mut self.buf, value, order);
        }
        for i in 0..contents.n_extra_longs() {
            let value = record.extra_ints.get(i).copied().unwrap_or(0);
            push_i32(&mut self.buf, value, order);
        }
        Ok(())
    }
}

impl RecordSink for IaeaSink {
    fn copy_header(&mut self, header: &PhspHeader) -> Result<()> {
        if self.written > 0 {
            return Err(PhspError::CopyHeader(
                "records were already written to the output".to_string(),
            ));
        }
        if header.byte_order().is_none() {
            return Err(PhspError::CopyHeader(format!(
                "unrecognised byte order {}",
                header.byte_order
            )));
        }

        self.header = header.clone();
        self.header.record_length = self.header.contents.record_length();
        self.header.particles = 0;
        self.header.checksum = 0;
        self.header.counts = ParticleCounts::default();
        Ok(())
    }

    fn set_extra_field_counts(&mut self, floats: usize, ints: usize) {
        self.header.set_extra_counts(floats, ints);
    }

    fn write_record(&mut self, record: &ParticleRecord) -> Result<()> {
        let order = self.header.byte_order().unwrap_or_else(ByteOrder::native);
        self.encode(record, order)?;
        self.writer.write_all(&self.buf)?;
        self.written += 1;
        self.counts.add(record.particle_type);
        Ok(())
    }

    fn set_original_histories(&mut self, value: i64) {
        self.orig_histories = Some(value);
    }

    fn update_header(&mut self) -> Result<()> {
        self.writer.flush()?;

        let record_length = self.header.contents.record_length();
        self.header.record_length = record_length;
        self.header.particles = self.written;
        self.header.checksum = record_length as u64 * self.written as u64;
        self.header.counts = self.counts.clone();
        if let Some(histories) = self.orig_histories {
            self.header.orig_histories = histories;
        }

        self.header.write_file(&self.header_path)
    }
}
