use std::{error, fmt};

/// A CIGAR operation kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// An alignment match (`M`).
    Match,
    /// An insertion into the reference (`I`).
    Insertion,
    /// A deletion from the reference (`D`).
    Deletion,
    /// A skipped region from the reference (`N`).
    Skip,
    /// A soft clip (`S`).
    SoftClip,
    /// A hard clip (`H`).
    HardClip,
    /// Padding (`P`).
    Pad,
    /// A sequence match (`=`).
    SequenceMatch,
    /// A sequence mismatch (`X`).
    SequenceMismatch,
}

impl Kind {
    /// Returns whether the operation kind consumes bases of the query sequence.
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Insertion
                | Self::SoftClip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }

    /// Returns whether the operation kind consumes positions of the reference sequence.
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Deletion | Self::Skip | Self::SequenceMatch | Self::SequenceMismatch
        )
    }

    /// Returns whether the operation kind aligns a query base to a reference position.
    pub fn is_alignment_match(self) -> bool {
        matches!(
            self,
            Self::Match | Self::SequenceMatch | Self::SequenceMismatch
        )
    }

    /// Returns whether the operation kind is a soft or hard clip.
    pub fn is_clip(self) -> bool {
        matches!(self, Self::SoftClip | Self::HardClip)
    }
}

/// An error returned when a CIGAR operation kind fails to convert.
#[derive(Debug, Eq, PartialEq)]
pub struct TryFromError(u8);

impl error::Error for TryFromError {}

impl fmt::Display for TryFromError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid CIGAR operation: {:#x}", self.0)
    }
}

impl TryFrom<u8> for Kind {
    type Error = TryFromError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            b'M' => Ok(Self::Match),
            b'I' => Ok(Self::Insertion),
            b'D' => Ok(Self::Deletion),
            b'N' => Ok(Self::Skip),
            b'S' => Ok(Self::SoftClip),
            b'H' => Ok(Self::HardClip),
            b'P' => Ok(Self::Pad),
            b'=' => Ok(Self::SequenceMatch),
            b'X' => Ok(Self::SequenceMismatch),
            _ => Err(TryFromError(b)),
        }
    }
}

impl Kind {
    /// Converts a BAM operation code (the low 4 bits of a packed CIGAR word) to a kind.
    pub fn from_op_code(code: u32) -> Result<Self, TryFromError> {
        match code {
            0 => Ok(Self::Match),
            1 => Ok(Self::Insertion),
            2 => Ok(Self::Deletion),
            3 => Ok(Self::Skip),
            4 => Ok(Self::SoftClip),
            5 => Ok(Self::HardClip),
            6 => Ok(Self::Pad),
            7 => Ok(Self::SequenceMatch),
            8 => Ok(Self::SequenceMismatch),
            _ => Err(TryFromError(code as u8)),
        }
    }

    /// Returns the BAM operation code of the kind.
    pub fn op_code(self) -> u32 {
        match self {
            Self::Match => 0,
            Self::Insertion => 1,
            Self::Deletion => 2,
            Self::Skip => 3,
            Self::SoftClip => 4,
            Self::HardClip => 5,
            Self::Pad => 6,
            Self::SequenceMatch => 7,
            Self::SequenceMismatch => 8,
        }
    }
}

impl From<Kind> for char {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Match => 'M',
            Kind::Insertion => 'I',
            Kind::Deletion => 'D',
            Kind::Skip => 'N',
            Kind::SoftClip => 'S',
            Kind::HardClip => 'H',
            Kind::Pad => 'P',
            Kind::SequenceMatch => '=',
            Kind::SequenceMismatch => 'X',
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(*self))
    }
}
