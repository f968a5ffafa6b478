//! IAEA phase-space header (`.IAEAheader`) model.
//!
//! The header is a text file made of `$KEYWORD:` sections followed by value
//! lines. Sections this crate understands are parsed into typed fields; every
//! other section is kept verbatim so that copying a header never loses
//! metadata.

use crate::data::ParticleType;
use crate::error::{PhspError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Byte order of the binary record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Declared as `1234`.
    Little,
    /// Declared as `4321`.
    Big,
}

impl ByteOrder {
    /// Decode a `$BYTE_ORDER` value.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1234 => Some(Self::Little),
            4321 => Some(Self::Big),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Little => 1234,
            Self::Big => 4321,
        }
    }

    /// Byte order of the running machine.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// Whether a record field is stored per record or fixed for the whole file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldStorage {
    Stored,
    Constant(f32),
}

impl FieldStorage {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Layout of one binary record (`$RECORD_CONTENTS` and `$RECORD_CONSTANT`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordContents {
    pub x: FieldStorage,
    pub y: FieldStorage,
    pub z: FieldStorage,
    pub u: FieldStorage,
    pub v: FieldStorage,
    /// `Stored` means w is recovered from u, v and the sign of the type byte.
    pub w: FieldStorage,
    pub weight: FieldStorage,
    pub extra_float_types: Vec<i32>,
    pub extra_long_types: Vec<i32>,
}

const FIELD_LABELS: [&str; 7] = ["X", "Y", "Z", "U", "V", "W", "Weight"];

impl Default for RecordContents {
    fn default() -> Self {
        Self {
            x: FieldStorage::Stored,
            y: FieldStorage::Stored,
            z: FieldStorage::Stored,
            u: FieldStorage::Stored,
            v: FieldStorage::Stored,
            w: FieldStorage::Stored,
            weight: FieldStorage::Stored,
            extra_float_types: Vec::new(),
            extra_long_types: Vec::new(),
        }
    }
}

impl RecordContents {
    fn fields(&self) -> [FieldStorage; 7] {
        [self.x, self.y, self.z, self.u, self.v, self.w, self.weight]
    }

    fn fields_mut(&mut self) -> [&mut FieldStorage; 7] {
        [
            &mut self.x,
            &mut self.y,
            &mut self.z,
            &mut self.u,
            &mut self.v,
            &mut self.w,
            &mut self.weight,
        ]
    }

    pub fn n_extra_floats(&self) -> usize {
        self.extra_float_types.len()
    }

    pub fn n_extra_longs(&self) -> usize {
        self.extra_long_types.len()
    }

    /// Resize the extension payload, new slots get type code 0.
    pub fn set_extra_counts(&mut self, floats: usize, longs: usize) {
        self.extra_float_types.resize(floats, 0);
        self.extra_long_types.resize(longs, 0);
    }

    /// Number of 4-byte floats written per record, excluding energy and extras.
    ///
    /// W never occupies a float slot.
    pub fn stored_float_fields(&self) -> usize {
        [self.x, self.y, self.z, self.u, self.v, self.weight]
            .iter()
            .filter(|f| f.is_stored())
            .count()
    }

    /// Record length in bytes implied by this layout.
    pub fn record_length(&self) -> usize {
        1 + 4 * (1 + self.stored_float_fields() + self.n_extra_floats())
            + 4 * self.n_extra_longs()
    }
}

/// Per-species particle counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticleCounts {
    pub photons: i64,
    pub electrons: i64,
    pub positrons: i64,
    pub neutrons: i64,
    pub protons: i64,
}

impl ParticleCounts {
    /// Count one particle; species outside the standard five are not tallied.
    pub fn add(&mut self, particle_type: ParticleType) {
        match particle_type {
            ParticleType::Photon => self.photons += 1,
            ParticleType::Electron => self.electrons += 1,
            ParticleType::Positron => self.positrons += 1,
            ParticleType::Neutron => self.neutrons += 1,
            ParticleType::Proton => self.protons += 1,
            ParticleType::Other(_) => {}
        }
    }
}

/// A header section this crate does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSection {
    pub keyword: String,
    pub lines: Vec<String>,
}

/// Parsed phase-space header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhspHeader {
    pub iaea_index: String,
    pub title: Vec<String>,
    pub file_type: i32,
    /// Expected size of the record file in bytes.
    pub checksum: u64,
    pub contents: RecordContents,
    /// Record length as declared; compare with `contents.record_length()`.
    pub record_length: usize,
    /// Raw `$BYTE_ORDER` value.
    pub byte_order: i32,
    pub orig_histories: i64,
    pub particles: i64,
    pub counts: ParticleCounts,
    pub other_sections: Vec<HeaderSection>,
}

impl PhspHeader {
    /// A fresh header with every field stored and no extension payload.
    pub fn new(title: &str) -> Self {
        let contents = RecordContents::default();
        Self {
            iaea_index: "0".to_string(),
            title: vec![title.to_string()],
            file_type: 0,
            checksum: 0,
            record_length: contents.record_length(),
            contents,
            byte_order: ByteOrder::native().code(),
            orig_histories: 0,
            particles: 0,
            counts: ParticleCounts::default(),
            other_sections: Vec::new(),
        }
    }

    /// Decoded byte order, `None` if the declared value is not recognised.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        ByteOrder::from_code(self.byte_order)
    }

    /// Change the extension payload and keep the declared record length in step.
    pub fn set_extra_counts(&mut self, floats: usize, longs: usize) {
        self.contents.set_extra_counts(floats, longs);
        self.record_length = self.contents.record_length();
    }

    /// Load a header from a `.IAEAheader` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Write the header to a `.IAEAheader` file.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    /// Parse header text.
    pub fn parse(text: &str) -> Result<Self> {
        let sections = split_sections(text)?;

        let mut header = Self::new("");
        header.title.clear();
        let mut declared_length: Option<usize> = None;
        let mut constants: Vec<f32> = Vec::new();
        let mut saw_contents = false;
        let mut saw_byte_order = false;
        let mut saw_particles = false;

        for section in sections {
            let keyword = section.keyword.clone();
            match keyword.as_str() {
                "IAEA_INDEX" => {
                    header.iaea_index = first_value(&section)
                        .unwrap_or("0")
                        .to_string();
                }
                "TITLE" => header.title = section.lines.clone(),
                "FILE_TYPE" => header.file_type = parse_scalar(&section)?,
                "CHECKSUM" => header.checksum = parse_scalar(&section)?,
                "RECORD_CONTENTS" => {
                    header.contents = parse_contents(&section)?;
                    saw_contents = true;
                }
                "RECORD_CONSTANT" => constants = parse_values(&section)?,
                "RECORD_LENGTH" => declared_length = Some(parse_scalar(&section)?),
                "BYTE_ORDER" => {
                    header.byte_order = parse_scalar(&section)?;
                    saw_byte_order = true;
                }
                "ORIG_HISTORIES" => header.orig_histories = parse_scalar(&section)?,
                "PARTICLES" => {
                    header.particles = parse_scalar(&section)?;
                    saw_particles = true;
                }
                "PHOTONS" => header.counts.photons = parse_scalar(&section)?,
                "ELECTRONS" => header.counts.electrons = parse_scalar(&section)?,
                "POSITRONS" => header.counts.positrons = parse_scalar(&section)?,
                "NEUTRONS" => header.counts.neutrons = parse_scalar(&section)?,
                "PROTONS" => header.counts.protons = parse_scalar(&section)?,
                _ => header.other_sections.push(section),
            }
        }

        for (name, seen) in [
            ("RECORD_CONTENTS", saw_contents),
            ("BYTE_ORDER", saw_byte_order),
            ("PARTICLES", saw_particles),
        ] {
            if !seen {
                return Err(PhspError::HeaderParse(format!(
                    "Missing required section ${}",
                    name
                )));
            }
        }

        // Constants are listed in field order for every non-stored field.
        let mut constants = constants.into_iter();
        for (label, field) in FIELD_LABELS.iter().zip(header.contents.fields_mut()) {
            if let FieldStorage::Constant(value) = field {
                *value = constants.next().ok_or_else(|| {
                    PhspError::HeaderParse(format!("Missing $RECORD_CONSTANT value for {}", label))
                })?;
            }
        }

        header.record_length = declared_length.unwrap_or_else(|| header.contents.record_length());
        Ok(header)
    }

    /// Render the header as `.IAEAheader` text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        push_section(&mut out, "IAEA_INDEX", &[self.iaea_index.clone()]);
        push_section(&mut out, "TITLE", &self.title);
        push_section(&mut out, "FILE_TYPE", &[self.file_type.to_string()]);
        push_section(&mut out, "CHECKSUM", &[self.checksum.to_string()]);

        let mut contents: Vec<String> = FIELD_LABELS
            .iter()
            .zip(self.contents.fields())
            .map(|(label, field)| {
                format!("    {}     // {} is stored ?", field.is_stored() as i32, label)
            })
            .collect();
        contents.push(format!(
            "    {}     // Extra floats stored ?",
            self.contents.n_extra_floats()
        ));
        contents.push(format!(
            "    {}     // Extra longs stored ?",
            self.contents.n_extra_longs()
        ));
        for (i, code) in self.contents.extra_float_types.iter().enumerate() {
            contents.push(format!("    {}     // Extra float ({}) type", code, i + 1));
        }
        for (i, code) in self.contents.extra_long_types.iter().enumerate() {
            contents.push(format!("    {}     // Extra long ({}) type", code, i + 1));
        }
        push_section(&mut out, "RECORD_CONTENTS", &contents);

        let constants: Vec<String> = FIELD_LABELS
            .iter()
            .zip(self.contents.fields())
            .filter_map(|(label, field)| match field {
                FieldStorage::Constant(value) => {
                    Some(format!("    {}     // Constant {}", value, label))
                }
                FieldStorage::Stored => None,
            })
            .collect();
        if !constants.is_empty() {
            push_section(&mut out, "RECORD_CONSTANT", &constants);
        }

        push_section(&mut out, "RECORD_LENGTH", &[self.record_length.to_string()]);
        push_section(&mut out, "BYTE_ORDER", &[self.byte_order.to_string()]);
        push_section(&mut out, "ORIG_HISTORIES", &[self.orig_histories.to_string()]);
        push_section(&mut out, "PARTICLES", &[self.particles.to_string()]);
        push_section(&mut out, "PHOTONS", &[self.counts.photons.to_string()]);
        push_section(&mut out, "ELECTRONS", &[self.counts.electrons.to_string()]);
        push_section(&mut out, "POSITRONS", &[self.counts.positrons.to_string()]);
        push_section(&mut out, "NEUTRONS", &[self.counts.neutrons.to_string()]);
        push_section(&mut out, "PROTONS", &[self.counts.protons.to_string()]);

        for section in &self.other_sections {
            push_section(&mut out, &section.keyword, &section.lines);
        }
        out
    }
}

fn push_section(out: &mut String, keyword: &str, lines: &[String]) {
    out.push('$');
    out.push_str(keyword);
    out.push_str(":\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

/// Split header text into sections, trimming trailing blank lines.
fn split_sections(text: &str) -> Result<Vec<HeaderSection>> {
    let mut sections: Vec<HeaderSection> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if let Some(keyword) = trimmed
            .strip_prefix('$')
            .and_then(|rest| rest.strip_suffix(':'))
        {
            sections.push(HeaderSection {
                keyword: keyword.trim().to_string(),
                lines: Vec::new(),
            });
            continue;
        }
        match sections.last_mut() {
            Some(section) => section.lines.push(line.trim_end().to_string()),
            None if trimmed.is_empty() => {}
            None => {
                return Err(PhspError::HeaderParse(format!(
                    "Line {} appears before any $SECTION: '{}'",
                    line_no + 1,
                    trimmed
                )))
            }
        }
    }

    for section in &mut sections {
        while section.lines.last().is_some_and(|l| l.trim().is_empty()) {
            section.lines.pop();
        }
    }
    Ok(sections)
}

/// Value tokens of a section, with `//` comments removed.
fn value_tokens(section: &HeaderSection) -> impl Iterator<Item = &str> {
    section.lines.iter().flat_map(|line| {
        let value = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line.as_str(),
        };
        value.split_whitespace()
    })
}

fn first_value(section: &HeaderSection) -> Option<&str> {
    value_tokens(section).next()
}

fn parse_scalar<T: std::str::FromStr>(section: &HeaderSection) -> Result<T> {
    let token = first_value(section).ok_or_else(|| {
        PhspError::HeaderParse(format!("Section ${} has no value", section.keyword))
    })?;
    token.parse().map_err(|_| {
        PhspError::HeaderParse(format!(
            "Invalid value '{}' in section ${}",
            token, section.keyword
        ))
    })
}

fn parse_values<T: std::str::FromStr>(section: &HeaderSection) -> Result<Vec<T>> {
    value_tokens(section)
        .map(|token| {
            token.parse().map_err(|_| {
                PhspError::HeaderParse(format!(
                    "Invalid value '{}' in section ${}",
                    token, section.keyword
                ))
            })
        })
        .collect()
}

fn parse_contents(section: &HeaderSection) -> Result<RecordContents> {
    let values: Vec<i64> = parse_values(section)?;
    if values.len() < 9 {
        return Err(PhspError::HeaderParse(format!(
            "$RECORD_CONTENTS needs 9 values, found {}",
            values.len()
        )));
    }
    if values[7] < 0 || values[8] < 0 {
        return Err(PhspError::HeaderParse(
            "Negative extra field count in $RECORD_CONTENTS".to_string(),
        ));
    }

    let storage = |flag: i64| match flag {
        0 => FieldStorage::Constant(0.0),
        _ => FieldStorage::Stored,
    };
    let n_floats = values[7] as usize;
    let n_longs = values[8] as usize;

    // Type codes follow the counts; older headers omit them.
    let mut type_codes = values[9..].iter().map(|&c| c as i32);
    let extra_float_types: Vec<i32> = (0..n_floats)
        .map(|_| type_codes.next().unwrap_or(0))
        .collect();
    let extra_long_types: Vec<i32> = (0..n_longs)
        .map(|_| type_codes.next().unwrap_or(0))
        .collect();

    Ok(RecordContents {
        x: storage(values[0]),
        y: storage(values[1]),
        z: storage(values[2]),
        u: storage(values[3]),
        v: storage(values[4]),
        w: storage(values[5]),
        weight: storage(values[6]),
        extra_float_types,
        extra_long_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
$IAEA_INDEX:
   1001

$TITLE:
Varian Clinac 6 MV, 10x10 field

$FILE_TYPE:
    0

$CHECKSUM:
    319

$RECORD_CONTENTS:
    1     // X is stored ?
    1     // Y is stored ?
    0     // Z is stored ?
    1     // U is stored ?
    1     // V is stored ?
    1     // W is stored ?
    1     // Weight is stored ?
    0     // Extra floats stored ?
    1     // Extra longs stored ?
    2     // Extra long (1) type

$RECORD_CONSTANT:
   26.7     // Constant Z

$RECORD_LENGTH:
    29

$BYTE_ORDER:
    1234

$ORIG_HISTORIES:
    5000

$PARTICLES:
    11

$PHOTONS:
    10

$ELECTRONS:
    1

$MONTE_CARLO_CODE_VERSION:
   BEAMnrc
";

    #[test]
    fn test_parse_sample() {
        let header = PhspHeader::parse(SAMPLE).unwrap();

        assert_eq!(header.iaea_index, "1001");
        assert_eq!(header.title, vec!["Varian Clinac 6 MV, 10x10 field"]);
        assert_eq!(header.checksum, 319);
        assert_eq!(header.contents.z, FieldStorage::Constant(26.7));
        assert!(header.contents.x.is_stored());
        assert_eq!(header.contents.extra_long_types, vec![2]);
        assert_eq!(header.record_length, 29);
        assert_eq!(header.contents.record_length(), 29);
        assert_eq!(header.byte_order(), Some(ByteOrder::Little));
        assert_eq!(header.orig_histories, 5000);
        assert_eq!(header.particles, 11);
        assert_eq!(header.counts.photons, 10);
        assert_eq!(header.counts.electrons, 1);
        assert_eq!(header.other_sections.len(), 1);
        assert_eq!(header.other_sections[0].keyword, "MONTE_CARLO_CODE_VERSION");
    }

    #[test]
    fn test_text_reparses_to_same_header() {
        let header = PhspHeader::parse(SAMPLE).unwrap();
        let reparsed = PhspHeader::parse(&header.to_text()).unwrap();
        assert_eq!(reparsed, header);
    }

    #[test]
    fn test_record_length_default_layout() {
        // type + energy + x y z u v weight
        assert_eq!(RecordContents::default().record_length(), 1 + 4 * 7);
    }

    #[test]
    fn test_set_extra_counts_updates_length() {
        let mut header = PhspHeader::parse(SAMPLE).unwrap();
        header.set_extra_counts(0, 0);
        assert_eq!(header.contents.n_extra_longs(), 0);
        assert_eq!(header.record_length, 25);
    }

    #[test]
    fn test_missing_required_section() {
        let text = "$PARTICLES:\n 3\n$BYTE_ORDER:\n 1234\n";
        let err = PhspHeader::parse(text).unwrap_err();
        assert!(err.to_string().contains("RECORD_CONTENTS"));
    }

    #[test]
    fn test_missing_constant_is_error() {
        let text = SAMPLE.replace("   26.7     // Constant Z", "");
        assert!(PhspHeader::parse(&text).is_err());
    }

    #[test]
    fn test_text_before_first_section_is_error() {
        let text = format!("garbage\n{}", SAMPLE);
        assert!(PhspHeader::parse(&text).is_err());
    }

    #[test]
    fn test_unknown_byte_order() {
        let text = SAMPLE.replace("    1234", "    3412");
        let header = PhspHeader::parse(&text).unwrap();
        assert_eq!(header.byte_order, 3412);
        assert_eq!(header.byte_order(), None);
    }
}
