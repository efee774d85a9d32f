use std::{error, fmt, str::FromStr};

/// A SAM header record kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// The file-level record (`@HD`).
    Header,
    /// A reference sequence record (`@SQ`).
    ReferenceSequence,
    /// A read group record (`@RG`).
    ReadGroup,
    /// A program record (`@PG`).
    Program,
    /// A comment (`@CO`).
    Comment,
}

impl Kind {
    /// Returns the two-character record code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Header => "HD",
            Self::ReferenceSequence => "SQ",
            Self::ReadGroup => "RG",
            Self::Program => "PG",
            Self::Comment => "CO",
        }
    }
}

impl FromStr for Kind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HD" => Ok(Self::Header),
            "SQ" => Ok(Self::ReferenceSequence),
            "RG" => Ok(Self::ReadGroup),
            "PG" => Ok(Self::Program),
            "CO" => Ok(Self::Comment),
            _ => Err(ParseError::InvalidKind(s.into())),
        }
    }
}

/// The tag-value fields of a typed header record, in line order.
///
/// Unknown tags are preserved verbatim.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    /// Returns the value of the given tag.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Sets the value of the given tag, appending the field when the tag is new.
    pub fn set(&mut self, tag: &str, value: &str) {
        match self.0.iter_mut().find(|(t, _)| t == tag) {
            Some((_, v)) => *v = value.into(),
            None => self.0.push((tag.into(), value.into())),
        }
    }

    /// Returns an iterator over the fields in line order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }
}

/// A typed SAM header record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Record {
    /// An `@HD` record.
    Header(Fields),
    /// An `@SQ` record.
    ReferenceSequence(Fields),
    /// An `@RG` record.
    ReadGroup(Fields),
    /// A `@PG` record.
    Program(Fields),
    /// A `@CO` line.
    Comment(String),
}

impl Record {
    /// Returns the kind of the record.
    pub fn kind(&self) -> Kind {
        match self {
            Self::Header(_) => Kind::Header,
            Self::ReferenceSequence(_) => Kind::ReferenceSequence,
            Self::ReadGroup(_) => Kind::ReadGroup,
            Self::Program(_) => Kind::Program,
            Self::Comment(_) => Kind::Comment,
        }
    }

    /// Returns the fields of a typed record, or `None` for a comment.
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            Self::Header(fields)
            | Self::ReferenceSequence(fields)
            | Self::ReadGroup(fields)
            | Self::Program(fields) => Some(fields),
            Self::Comment(_) => None,
        }
    }

    /// Returns the value of the given tag.
    pub fn get_tag(&self, tag: &str) -> Option<&str> {
        self.fields().and_then(|fields| fields.get(tag))
    }

    /// Returns the value of the tag that keys this record kind (`SN` for SQ, `ID` for RG/PG).
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ReferenceSequence(fields) => fields.get("SN"),
            Self::ReadGroup(fields) | Self::Program(fields) => fields.get("ID"),
            Self::Header(_) | Self::Comment(_) => None,
        }
    }

    /// Renders the record as a SAM header line without the trailing newline.
    pub fn render_line(&self) -> String {
        let mut line = String::from("@");
        line.push_str(self.kind().code());

        match self {
            Self::Comment(comment) => {
                line.push('\t');
                line.push_str(comment);
            }
            _ => {
                for (tag, value) in self.fields().unwrap().iter() {
                    line.push('\t');
                    line.push_str(tag);
                    line.push(':');
                    line.push_str(value);
                }
            }
        }

        line
    }
}

/// An error returned when a SAM header line fails to parse.
#[derive(Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The line does not start with `@`.
    MissingPrefix,
    /// The record code is unknown.
    InvalidKind(String),
    /// A field is not of the form `TG:value`.
    InvalidField(String),
    /// A tag occurs more than once on the line.
    DuplicateTag(String),
    /// The tag keying the record kind is missing.
    MissingKeyTag(&'static str),
}

impl error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrefix => f.write_str("missing @ prefix"),
            Self::InvalidKind(s) => write!(f, "invalid record kind: {}", s),
            Self::InvalidField(s) => write!(f, "invalid field: {}", s),
            Self::DuplicateTag(s) => write!(f, "duplicate tag: {}", s),
            Self::MissingKeyTag(s) => write!(f, "missing {} tag", s),
        }
    }
}

impl FromStr for Record {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix('@').ok_or(ParseError::MissingPrefix)?;

        let (code, rest) = match s.split_once('\t') {
            Some((code, rest)) => (code, rest),
            None => (s, ""),
        };

        let kind: Kind = code.parse()?;

        if kind == Kind::Comment {
            return Ok(Self::Comment(rest.into()));
        }

        let mut fields = Fields::default();

        for raw in rest.split('\t').filter(|t| !t.is_empty()) {
            let (tag, value) = raw
                .split_once(':')
                .filter(|(tag, _)| tag.len() == 2)
                .ok_or_else(|| ParseError::InvalidField(raw.into()))?;

            if fields.get(tag).is_some() {
                return Err(ParseError::DuplicateTag(tag.into()));
            }

            fields.set(tag, value);
        }

        let record = match kind {
            Kind::Header => Self::Header(fields),
            Kind::ReferenceSequence => Self::ReferenceSequence(fields),
            Kind::ReadGroup => Self::ReadGroup(fields),
            Kind::Program => Self::Program(fields),
            Kind::Comment => unreachable!(),
        };

        match record.kind() {
            Kind::ReferenceSequence if record.key().is_none() => Err(ParseError::MissingKeyTag("SN")),
            Kind::ReadGroup | Kind::Program if record.key().is_none() => {
                Err(ParseError::MissingKeyTag("ID"))
            }
            _ => Ok(record),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sq() -> Result<(), ParseError> {
        let record: Record = "@SQ\tSN:chr1\tLN:249250621\tM5:abc".parse()?;

        assert_eq!(record.kind(), Kind::ReferenceSequence);
        assert_eq!(record.key(), Some("chr1"));
        assert_eq!(record.get_tag("LN"), Some("249250621"));
        assert_eq!(record.get_tag("M5"), Some("abc"));
        assert_eq!(record.get_tag("UR"), None);

        Ok(())
    }

    #[test]
    fn test_parse_comment() -> Result<(), ParseError> {
        let record: Record = "@CO\tfree text\twith tabs".parse()?;
        assert_eq!(record, Record::Comment(String::from("free text\twith tabs")));
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "SQ\tSN:chr1".parse::<Record>(),
            Err(ParseError::MissingPrefix)
        );
        assert_eq!(
            "@ZZ\tSN:chr1".parse::<Record>(),
            Err(ParseError::InvalidKind(String::from("ZZ")))
        );
        assert_eq!(
            "@RG\tID:rg0\tID:rg1".parse::<Record>(),
            Err(ParseError::DuplicateTag(String::from("ID")))
        );
        assert_eq!(
            "@RG\tSM:sample".parse::<Record>(),
            Err(ParseError::MissingKeyTag("ID"))
        );
        assert_eq!(
            "@SQ\tSN".parse::<Record>(),
            Err(ParseError::InvalidField(String::from("SN")))
        );
    }

    #[test]
    fn test_render_line_round_trip() -> Result<(), ParseError> {
        let line = "@RG\tID:rg0\tSM:NA12878\tPL:ILLUMINA";
        let record: Record = line.parse()?;
        assert_eq!(record.render_line(), line);
        Ok(())
    }
}
