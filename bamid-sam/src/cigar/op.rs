pub mod kind;

pub use self::kind::Kind;

use std::{error, fmt};

/// A CIGAR operation: a kind and a count.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Op {
    kind: Kind,
    len: u32,
}

impl Op {
    /// Creates a CIGAR operation.
    pub fn new(kind: Kind, len: u32) -> Self {
        Self { kind, len }
    }

    /// Returns the kind of the operation.
    pub fn kind(self) -> Kind {
        self.kind
    }

    /// Returns the length of the operation.
    pub fn len(self) -> u32 {
        self.len
    }

    /// Returns whether the operation has a length of 0.
    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// An error returned when a packed CIGAR word fails to decode.
#[derive(Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The operation code is invalid.
    InvalidKind(kind::TryFromError),
}

impl error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidKind(e) => Some(e),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKind(_) => f.write_str("invalid operation kind"),
        }
    }
}

impl TryFrom<u32> for Op {
    type Error = DecodeError;

    /// Decodes a packed BAM CIGAR word (`count << 4 | op_code`).
    fn try_from(word: u32) -> Result<Self, Self::Error> {
        let kind = Kind::from_op_code(word & 0x0f).map_err(DecodeError::InvalidKind)?;
        Ok(Self::new(kind, word >> 4))
    }
}

impl From<Op> for u32 {
    fn from(op: Op) -> Self {
        (op.len() << 4) | op.kind().op_code()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len(), self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_round_trip() {
        let op = Op::new(Kind::SoftClip, 13);
        let word = u32::from(op);
        assert_eq!(word, (13 << 4) | 4);
        assert_eq!(Op::try_from(word), Ok(op));
    }

    #[test]
    fn test_try_from_u32_with_invalid_op_code() {
        assert!(Op::try_from((8 << 4) | 9).is_err());
    }

    #[test]
    fn test_fmt() {
        assert_eq!(Op::new(Kind::Match, 36).to_string(), "36M");
        assert_eq!(Op::new(Kind::SequenceMismatch, 2).to_string(), "2X");
    }
}
