//! SAM header model: typed records, keyed record sets, and the reference table.

pub mod record;
pub mod reference_info;

pub use self::record::Record;
pub use self::reference_info::ReferenceInfo;

use std::{fmt, str::FromStr};

use indexmap::IndexMap;

use self::record::{Fields, Kind, ParseError};

/// A SAM header: at most one `@HD`, keyed `@SQ`/`@RG`/`@PG` sets, and comments.
#[derive(Clone, Debug, Default)]
pub struct Header {
    header: Option<Fields>,
    reference_sequences: IndexMap<String, Fields>,
    read_groups: IndexMap<String, Fields>,
    programs: IndexMap<String, Fields>,
    comments: Vec<String>,
    reference_info: ReferenceInfo,
}

impl Header {
    /// Creates an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all records and the reference table.
    pub fn reset(&mut self) {
        self.header = None;
        self.reference_sequences.clear();
        self.read_groups.clear();
        self.programs.clear();
        self.comments.clear();
        self.reference_info.clear();
    }

    /// Adds a record, returning `false` when its key is already present (or, for `@HD`, when
    /// one exists).
    pub fn add_record(&mut self, record: Record) -> bool {
        match record {
            Record::Header(fields) => {
                if self.header.is_some() {
                    return false;
                }
                self.header = Some(fields);
                true
            }
            Record::ReferenceSequence(fields) => {
                let name = fields.get("SN").unwrap_or_default().to_string();
                insert_keyed(&mut self.reference_sequences, name, fields)
            }
            Record::ReadGroup(fields) => {
                let id = fields.get("ID").unwrap_or_default().to_string();
                insert_keyed(&mut self.read_groups, id, fields)
            }
            Record::Program(fields) => {
                let id = fields.get("ID").unwrap_or_default().to_string();
                insert_keyed(&mut self.programs, id, fields)
            }
            Record::Comment(comment) => {
                self.comments.push(comment);
                true
            }
        }
    }

    /// Removes the record of the given kind and key, returning whether one was removed.
    ///
    /// The key is ignored for `@HD`. Comments cannot be removed by key.
    pub fn remove_record(&mut self, kind: Kind, key: &str) -> bool {
        match kind {
            Kind::Header => self.header.take().is_some(),
            Kind::ReferenceSequence => self.reference_sequences.shift_remove(key).is_some(),
            Kind::ReadGroup => self.read_groups.shift_remove(key).is_some(),
            Kind::Program => self.programs.shift_remove(key).is_some(),
            Kind::Comment => false,
        }
    }

    /// Returns the `@HD` fields.
    pub fn hd(&self) -> Option<&Fields> {
        self.header.as_ref()
    }

    /// Returns the sort order declared by the `@HD` `SO` tag.
    pub fn sort_order(&self) -> Option<&str> {
        self.header.as_ref().and_then(|fields| fields.get("SO"))
    }

    /// Returns an iterator over `@SQ` fields keyed by `SN`, in insertion order.
    pub fn reference_sequences(&self) -> impl Iterator<Item = (&str, &Fields)> {
        self.reference_sequences
            .iter()
            .map(|(name, fields)| (name.as_str(), fields))
    }

    /// Returns an iterator over `@RG` fields keyed by `ID`, in insertion order.
    pub fn read_groups(&self) -> impl Iterator<Item = (&str, &Fields)> {
        self.read_groups
            .iter()
            .map(|(id, fields)| (id.as_str(), fields))
    }

    /// Returns an iterator over `@PG` fields keyed by `ID`, in insertion order.
    pub fn programs(&self) -> impl Iterator<Item = (&str, &Fields)> {
        self.programs
            .iter()
            .map(|(id, fields)| (id.as_str(), fields))
    }

    /// Returns the comment lines.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Returns an iterator over all records in serialization order.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.header
            .iter()
            .map(|fields| Record::Header(fields.clone()))
            .chain(
                self.reference_sequences
                    .values()
                    .map(|fields| Record::ReferenceSequence(fields.clone())),
            )
            .chain(
                self.read_groups
                    .values()
                    .map(|fields| Record::ReadGroup(fields.clone())),
            )
            .chain(
                self.programs
                    .values()
                    .map(|fields| Record::Program(fields.clone())),
            )
            .chain(self.comments.iter().map(|c| Record::Comment(c.clone())))
    }

    /// Returns the reference id ↔ name table.
    pub fn reference_info(&self) -> &ReferenceInfo {
        &self.reference_info
    }

    /// Returns the reference table mutably.
    pub fn reference_info_mut(&mut self) -> &mut ReferenceInfo {
        &mut self.reference_info
    }

    /// Rebuilds the reference table from the `@SQ` records.
    pub fn generate_reference_info(&mut self) -> Result<(), ParseError> {
        self.reference_info.clear();

        for (name, fields) in &self.reference_sequences {
            let length = fields
                .get("LN")
                .and_then(|v| v.parse().ok())
                .ok_or(ParseError::MissingKeyTag("LN"))?;

            self.reference_info.add(name, length);
        }

        Ok(())
    }

    /// Returns the id of the reference with the given name.
    ///
    /// The reference table takes precedence; `@SQ` insertion order is the fallback for headers
    /// without one.
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        if self.reference_info.is_empty() {
            self.reference_sequences.get_index_of(name)
        } else {
            self.reference_info.id(name)
        }
    }

    /// Returns the sample (`SM`) declared by the read group with the given id.
    pub fn read_group_sample(&self, id: &str) -> Option<&str> {
        self.read_groups.get(id).and_then(|fields| fields.get("SM"))
    }

    /// Parses header lines, e.g. the text block of a BAM header.
    ///
    /// Lines not starting with `@` and empty lines are rejected; an embedded NUL terminates the
    /// text.
    pub fn parse_text(text: &[u8]) -> Result<Self, ParseError> {
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        let text = String::from_utf8_lossy(&text[..end]);

        let mut header = Self::new();

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }

            header.push_line(line)?;
        }

        Ok(header)
    }

    /// Parses and adds one header line.
    pub fn push_line(&mut self, line: &str) -> Result<(), ParseError> {
        let record: Record = line.parse()?;

        if !self.add_record(record) {
            return Err(ParseError::DuplicateTag(line.into()));
        }

        Ok(())
    }
}

fn insert_keyed(map: &mut IndexMap<String, Fields>, key: String, fields: Fields) -> bool {
    if map.contains_key(&key) {
        return false;
    }

    map.insert(key, fields);

    true
}

impl fmt::Display for Header {
    /// Formats the header as SAM text: `@HD`, then `@SQ`, `@RG`, `@PG`, and comments, each
    /// line terminated by a newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.records() {
            writeln!(f, "{}", record.render_line())?;
        }

        Ok(())
    }
}

impl PartialEq for Header {
    /// Headers are equal when their serialized forms are equal.
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Header {}

impl FromStr for Header {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_text(s.as_bytes())
    }
}
