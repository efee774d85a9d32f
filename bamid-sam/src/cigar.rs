//! CIGAR string model and alignment index maps.

pub mod op;

pub use self::op::{Kind, Op};

use std::{cell::OnceCell, error, fmt, str::FromStr};

/// The value returned by index lookups when no query index or reference offset exists.
pub const INDEX_NA: i32 = -1;

/// A CIGAR: an ordered list of operations describing how a query aligns to a reference.
///
/// Adjacent operations of the same kind are coalesced on append. The query ↔ reference index
/// maps are built lazily on first lookup and cached until the next mutation.
#[derive(Clone, Debug, Default)]
pub struct Cigar {
    ops: Vec<Op>,
    indexes: OnceCell<AlignmentIndexes>,
}

#[derive(Clone, Debug)]
struct AlignmentIndexes {
    query_to_ref: Vec<i32>,
    ref_to_query: Vec<i32>,
}

impl Cigar {
    /// Creates an empty CIGAR.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the operations.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns whether there are any operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Removes all operations.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.indexes = OnceCell::new();
    }

    /// Appends an operation, coalescing it into the previous one when the kinds match.
    pub fn push(&mut self, op: Op) {
        if op.is_empty() {
            return;
        }

        match self.ops.last_mut() {
            Some(last) if last.kind() == op.kind() => {
                *last = Op::new(last.kind(), last.len() + op.len());
            }
            _ => self.ops.push(op),
        }

        self.indexes = OnceCell::new();
    }

    /// Decodes a packed BAM CIGAR (`count << 4 | op_code` per 32-bit word).
    pub fn from_packed(words: &[u32]) -> Result<Self, op::DecodeError> {
        let mut cigar = Self::new();

        for &word in words {
            cigar.push(Op::try_from(word)?);
        }

        Ok(cigar)
    }

    /// Encodes the operations as packed BAM CIGAR words.
    pub fn to_packed(&self) -> Vec<u32> {
        self.ops.iter().copied().map(u32::from).collect()
    }

    /// Returns the number of query bases the operations cover (`M`/`I`/`S`/`=`/`X`).
    pub fn read_len(&self) -> u32 {
        self.ops
            .iter()
            .filter(|op| op.kind().consumes_query())
            .map(|op| op.len())
            .sum()
    }

    /// Returns the number of reference positions the operations span (`M`/`D`/`N`/`=`/`X`).
    pub fn reference_len(&self) -> u32 {
        self.ops
            .iter()
            .filter(|op| op.kind().consumes_reference())
            .map(|op| op.len())
            .sum()
    }

    /// Returns the total clip length (`S` + `H`) at the start of the CIGAR.
    pub fn num_begin_clips(&self) -> u32 {
        self.ops
            .iter()
            .take_while(|op| op.kind().is_clip())
            .map(|op| op.len())
            .sum()
    }

    /// Returns the total clip length (`S` + `H`) at the end of the CIGAR.
    pub fn num_end_clips(&self) -> u32 {
        self.ops
            .iter()
            .rev()
            .take_while(|op| op.kind().is_clip())
            .map(|op| op.len())
            .sum()
    }

    fn indexes(&self) -> &AlignmentIndexes {
        self.indexes.get_or_init(|| {
            let mut query_to_ref = Vec::new();
            let mut ref_to_query = Vec::new();

            for op in &self.ops {
                match op.kind() {
                    Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                        for _ in 0..op.len() {
                            query_to_ref.push(ref_to_query.len() as i32);
                            ref_to_query.push(query_to_ref.len() as i32 - 1);
                        }
                    }
                    Kind::Insertion | Kind::SoftClip => {
                        for _ in 0..op.len() {
                            query_to_ref.push(INDEX_NA);
                        }
                    }
                    Kind::Deletion | Kind::Skip => {
                        for _ in 0..op.len() {
                            ref_to_query.push(INDEX_NA);
                        }
                    }
                    Kind::HardClip | Kind::Pad => {}
                }
            }

            AlignmentIndexes {
                query_to_ref,
                ref_to_query,
            }
        })
    }

    /// Returns the reference offset aligned to the given query index, or [`INDEX_NA`] when the
    /// query index is inserted, clipped, or out of range.
    pub fn ref_offset(&self, query_index: i32) -> i32 {
        let indexes = self.indexes();

        if query_index < 0 || query_index as usize >= indexes.query_to_ref.len() {
            return INDEX_NA;
        }

        indexes.query_to_ref[query_index as usize]
    }

    /// Returns the query index aligned to the given reference offset, or [`INDEX_NA`] when the
    /// offset is deleted, skipped, or out of range.
    pub fn query_index(&self, ref_offset: i32) -> i32 {
        let indexes = self.indexes();

        if ref_offset < 0 || ref_offset as usize >= indexes.ref_to_query.len() {
            return INDEX_NA;
        }

        indexes.ref_to_query[ref_offset as usize]
    }

    /// Returns the query index aligned to the given reference position for a query starting at
    /// `query_start_pos`, or [`INDEX_NA`].
    pub fn query_index_at(&self, ref_position: i32, query_start_pos: i32) -> i32 {
        self.query_index(ref_position - query_start_pos)
    }

    /// Returns the reference position aligned to the given query index for a query starting at
    /// `query_start_pos`, or [`INDEX_NA`].
    pub fn ref_position(&self, query_index: i32, query_start_pos: i32) -> i32 {
        match self.ref_offset(query_index) {
            INDEX_NA => INDEX_NA,
            offset => offset + query_start_pos,
        }
    }

    /// Counts the query bases aligned to a reference position inside `[start, end)` for a query
    /// starting at `query_start_pos`.
    ///
    /// `-1` at either endpoint leaves that side of the region unbounded.
    pub fn num_overlaps(&self, start: i32, end: i32, query_start_pos: i32) -> u32 {
        let indexes = self.indexes();

        let start_ref_offset = if start > query_start_pos {
            start - query_start_pos
        } else {
            0
        };

        let end_ref_offset = if end == -1 {
            indexes.ref_to_query.len() as i32
        } else {
            end - query_start_pos
        };

        if end_ref_offset < 0 {
            return 0;
        }

        let mut num_overlaps = 0;

        for &ref_offset in &indexes.query_to_ref {
            if ref_offset > end_ref_offset {
                break;
            }

            if ref_offset >= start_ref_offset && ref_offset < end_ref_offset {
                num_overlaps += 1;
            }
        }

        num_overlaps
    }

    /// Rewrites the CIGAR so that every base aligned at or after the given reference offset is
    /// soft-clipped.
    ///
    /// Returns the new CIGAR and the query index where the merged soft-clip run begins, or
    /// `None` when the offset lies past the aligned span. Unaligned bases (insertions, existing
    /// soft clips) adjacent to the clip point are absorbed into the clip; hard clips at the ends
    /// are preserved.
    pub fn soft_clip_end_from_ref_offset(&self, ref_offset: i32) -> Option<(Cigar, i32)> {
        let indexes = self.indexes();
        let read_len = indexes.query_to_ref.len() as i32;

        let mut clip_start = (0..read_len)
            .find(|&qi| {
                let ro = indexes.query_to_ref[qi as usize];
                ro != INDEX_NA && ro >= ref_offset
            })?;

        while clip_start > 0 && indexes.query_to_ref[clip_start as usize - 1] == INDEX_NA {
            clip_start -= 1;
        }

        let mut new_cigar = self.take_query_prefix(clip_start);
        new_cigar.push(Op::new(Kind::SoftClip, (read_len - clip_start) as u32));

        let trailing_hard_clips: u32 = self
            .ops
            .iter()
            .rev()
            .take_while(|op| op.kind() == Kind::HardClip)
            .map(|op| op.len())
            .sum();
        new_cigar.push(Op::new(Kind::HardClip, trailing_hard_clips));

        Some((new_cigar, clip_start))
    }

    /// Rewrites the CIGAR so that every base aligned at or before the given reference offset is
    /// soft-clipped.
    ///
    /// Returns the new CIGAR, the query index of the last clipped base, and the reference offset
    /// of the first remaining aligned base ([`INDEX_NA`] when the whole query is clipped), or
    /// `None` when no aligned base lies at or before the offset.
    pub fn soft_clip_begin_through_ref_offset(&self, ref_offset: i32) -> Option<(Cigar, i32, i32)> {
        let indexes = self.indexes();
        let read_len = indexes.query_to_ref.len() as i32;

        let last_clipped = (0..read_len)
            .rev()
            .find(|&qi| {
                let ro = indexes.query_to_ref[qi as usize];
                ro != INDEX_NA && ro <= ref_offset
            })?;

        let mut clip_end = last_clipped + 1;

        while clip_end < read_len && indexes.query_to_ref[clip_end as usize] == INDEX_NA {
            clip_end += 1;
        }

        let next_ref_offset = if clip_end < read_len {
            indexes.query_to_ref[clip_end as usize]
        } else {
            INDEX_NA
        };

        let leading_hard_clips: u32 = self
            .ops
            .iter()
            .take_while(|op| op.kind() == Kind::HardClip)
            .map(|op| op.len())
            .sum();

        let mut new_cigar = Cigar::new();
        new_cigar.push(Op::new(Kind::HardClip, leading_hard_clips));
        new_cigar.push(Op::new(Kind::SoftClip, clip_end as u32));

        for op in self.take_query_suffix(clip_end).ops {
            new_cigar.push(op);
        }

        Some((new_cigar, clip_end - 1, next_ref_offset))
    }

    // Collects the operations covering query indexes before `clip_start`, dropping reference-only
    // operations at the boundary.
    fn take_query_prefix(&self, clip_start: i32) -> Cigar {
        let mut prefix = Cigar::new();
        let mut query_index = 0;

        for op in &self.ops {
            if op.kind() == Kind::HardClip && query_index == 0 {
                prefix.push(*op);
                continue;
            }

            if !op.kind().consumes_query() {
                if query_index < clip_start {
                    prefix.push(*op);
                }
                continue;
            }

            let remaining = clip_start - query_index;

            if remaining <= 0 {
                break;
            }

            let keep = (op.len()).min(remaining as u32);
            prefix.push(Op::new(op.kind(), keep));
            query_index += op.len() as i32;

            if query_index >= clip_start {
                break;
            }
        }

        prefix
    }

    // Collects the operations covering query indexes at or after `clip_end`, dropping
    // reference-only operations that precede the first kept aligned base.
    fn take_query_suffix(&self, clip_end: i32) -> Cigar {
        let mut suffix = Cigar::new();
        let mut query_index = 0;
        let mut seen_kept_base = false;

        for op in &self.ops {
            if op.kind() == Kind::HardClip {
                continue;
            }

            if !op.kind().consumes_query() {
                if seen_kept_base {
                    suffix.push(*op);
                }
                continue;
            }

            let op_end = query_index + op.len() as i32;

            if op_end > clip_end {
                let keep = (op_end - clip_end.max(query_index)) as u32;
                suffix.push(Op::new(op.kind(), keep));
                seen_kept_base = true;
            }

            query_index = op_end;
        }

        suffix
    }
}

impl PartialEq for Cigar {
    fn eq(&self, other: &Self) -> bool {
        self.ops == other.ops
    }
}

impl Eq for Cigar {}

impl fmt::Display for Cigar {
    /// Formats the operations as text; an empty CIGAR formats as `*`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("*");
        }

        for op in &self.ops {
            write!(f, "{}", op)?;
        }

        Ok(())
    }
}

/// An error returned when a raw CIGAR string fails to parse.
#[derive(Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The input is empty.
    Empty,
    /// An operation is missing its length.
    MissingLength,
    /// An operation length is invalid.
    InvalidLength(std::num::ParseIntError),
    /// An operation kind is invalid.
    InvalidKind(op::kind::TryFromError),
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidLength(e) => Some(e),
            Self::InvalidKind(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty input"),
            Self::MissingLength => f.write_str("missing operation length"),
            Self::InvalidLength(_) => f.write_str("invalid operation length"),
            Self::InvalidKind(_) => f.write_str("invalid operation kind"),
        }
    }
}

impl FromStr for Cigar {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        } else if s == "*" {
            return Ok(Self::new());
        }

        let mut cigar = Self::new();
        let mut src = s;

        while !src.is_empty() {
            let digits_end = src
                .find(|c: char| !c.is_ascii_digit())
                .ok_or(ParseError::MissingLength)?;

            if digits_end == 0 {
                return Err(ParseError::MissingLength);
            }

            let len = src[..digits_end].parse().map_err(ParseError::InvalidLength)?;
            let kind =
                Kind::try_from(src.as_bytes()[digits_end]).map_err(ParseError::InvalidKind)?;

            cigar.push(Op::new(kind, len));

            src = &src[digits_end + 1..];
        }

        Ok(cigar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_round_trip() -> Result<(), ParseError> {
        for s in ["4M", "3M2D3M", "36M8S", "1H2S4M2S1H", "20M10I5D10M5N5M2P3M"] {
            let cigar: Cigar = s.parse()?;
            assert_eq!(cigar.to_string(), s);
        }

        let empty: Cigar = "*".parse()?;
        assert!(empty.is_empty());
        assert_eq!(empty.to_string(), "*");

        assert!("".parse::<Cigar>().is_err());
        assert!("4".parse::<Cigar>().is_err());
        assert!("M".parse::<Cigar>().is_err());
        assert!("4Q".parse::<Cigar>().is_err());

        Ok(())
    }

    #[test]
    fn test_push_coalesces_adjacent_ops() {
        let mut cigar = Cigar::new();
        cigar.push(Op::new(Kind::Match, 3));
        cigar.push(Op::new(Kind::Match, 2));
        cigar.push(Op::new(Kind::Deletion, 1));
        assert_eq!(cigar.to_string(), "5M1D");
    }

    #[test]
    fn test_packed_round_trip() -> Result<(), op::DecodeError> {
        let cigar: Cigar = "3S6M1D4M".parse().unwrap();
        let packed = cigar.to_packed();
        assert_eq!(Cigar::from_packed(&packed)?, cigar);
        Ok(())
    }

    #[test]
    fn test_expected_lengths() {
        let cigar: Cigar = "3M2D3M".parse().unwrap();
        assert_eq!(cigar.reference_len(), 8);
        assert_eq!(cigar.read_len(), 6);

        let cigar: Cigar = "3M2I3M".parse().unwrap();
        assert_eq!(cigar.reference_len(), 6);
        assert_eq!(cigar.read_len(), 8);
    }

    #[test]
    fn test_num_clips() {
        let cigar: Cigar = "1H2S4M2S1H".parse().unwrap();
        assert_eq!(cigar.num_begin_clips(), 3);
        assert_eq!(cigar.num_end_clips(), 3);

        let cigar: Cigar = "8M".parse().unwrap();
        assert_eq!(cigar.num_begin_clips(), 0);
        assert_eq!(cigar.num_end_clips(), 0);
    }

    #[test]
    fn test_index_maps() {
        // 3M2I2M1D1M: query indexes 0123456x7, reference offsets 012xx34x5
        let cigar: Cigar = "3M2I2M1D1M".parse().unwrap();

        assert_eq!(cigar.ref_offset(0), 0);
        assert_eq!(cigar.ref_offset(2), 2);
        assert_eq!(cigar.ref_offset(3), INDEX_NA);
        assert_eq!(cigar.ref_offset(5), 3);
        assert_eq!(cigar.ref_offset(6), 4);
        assert_eq!(cigar.ref_offset(7), 6);
        assert_eq!(cigar.ref_offset(8), INDEX_NA);

        assert_eq!(cigar.query_index(0), 0);
        assert_eq!(cigar.query_index(3), 5);
        assert_eq!(cigar.query_index(4), 6);
        assert_eq!(cigar.query_index(5), INDEX_NA);
        assert_eq!(cigar.query_index(6), 7);
        assert_eq!(cigar.query_index(7), INDEX_NA);
    }

    #[test]
    fn test_index_maps_with_begin_soft_clip() {
        let cigar: Cigar = "2S3M".parse().unwrap();
        assert_eq!(cigar.ref_offset(0), INDEX_NA);
        assert_eq!(cigar.ref_offset(1), INDEX_NA);
        assert_eq!(cigar.ref_offset(2), 0);
        assert_eq!(cigar.query_index(0), 2);
    }

    #[test]
    fn test_query_ref_inverse_law() {
        let cigar: Cigar = "2S10M3D5M2I4M1S".parse().unwrap();
        let query_start_pos = 100;

        for ref_position in 100..(100 + cigar.reference_len() as i32) {
            let query_index = cigar.query_index_at(ref_position, query_start_pos);
            if query_index != INDEX_NA {
                assert_eq!(
                    cigar.ref_position(query_index, query_start_pos),
                    ref_position
                );
            }
        }
    }

    #[test]
    fn test_num_overlaps() {
        let cigar: Cigar = "20M10I5D10M5N5M2P3M".parse().unwrap();

        assert_eq!(cigar.num_overlaps(1, 101, 5), 38);
        assert_eq!(cigar.num_overlaps(40, 45, 5), 0);
        assert_eq!(cigar.num_overlaps(25, 30, 5), 0);
        assert_eq!(cigar.num_overlaps(-1, -1, 5), 38);
        assert_eq!(cigar.num_overlaps(500, 600, 5), 0);
    }

    #[test]
    fn test_soft_clip_end_from_ref_offset() {
        let cigar: Cigar = "10M".parse().unwrap();

        let (clipped, clip_start) = cigar.soft_clip_end_from_ref_offset(6).unwrap();
        assert_eq!(clipped.to_string(), "6M4S");
        assert_eq!(clip_start, 6);

        let (clipped, clip_start) = cigar.soft_clip_end_from_ref_offset(0).unwrap();
        assert_eq!(clipped.to_string(), "10S");
        assert_eq!(clip_start, 0);

        assert!(cigar.soft_clip_end_from_ref_offset(10).is_none());
    }

    #[test]
    fn test_soft_clip_end_absorbs_unaligned_bases() {
        let cigar: Cigar = "4M2I4M".parse().unwrap();

        // Clip point right after the insertion: the inserted bases join the clip.
        let (clipped, clip_start) = cigar.soft_clip_end_from_ref_offset(4).unwrap();
        assert_eq!(clipped.to_string(), "4M6S");
        assert_eq!(clip_start, 4);

        let cigar: Cigar = "2S8M1H".parse().unwrap();
        let (clipped, clip_start) = cigar.soft_clip_end_from_ref_offset(0).unwrap();
        assert_eq!(clipped.to_string(), "10S1H");
        assert_eq!(clip_start, 0);
    }

    #[test]
    fn test_soft_clip_begin_through_ref_offset() {
        let cigar: Cigar = "10M".parse().unwrap();

        let (clipped, clip_end, next_ref_offset) =
            cigar.soft_clip_begin_through_ref_offset(3).unwrap();
        assert_eq!(clipped.to_string(), "4S6M");
        assert_eq!(clip_end, 3);
        assert_eq!(next_ref_offset, 4);

        let (clipped, clip_end, next_ref_offset) =
            cigar.soft_clip_begin_through_ref_offset(9).unwrap();
        assert_eq!(clipped.to_string(), "10S");
        assert_eq!(clip_end, 9);
        assert_eq!(next_ref_offset, INDEX_NA);
    }

    #[test]
    fn test_soft_clip_begin_drops_leading_deletion() {
        let cigar: Cigar = "4M2D6M".parse().unwrap();

        // Boundary inside the deletion: the deletion is folded into the clip.
        let (clipped, clip_end, next_ref_offset) =
            cigar.soft_clip_begin_through_ref_offset(4).unwrap();
        assert_eq!(clipped.to_string(), "4S6M");
        assert_eq!(clip_end, 3);
        assert_eq!(next_ref_offset, 6);
    }
}
