//! Pair-overlap handling: policies that rewrite overlapping mate pairs in place.

mod clip_lower_quality;
mod split_clip;

pub use self::clip_lower_quality::ClipLowerQuality;
pub use self::split_clip::SplitClip;

use bamid_sam::cigar::{Cigar, INDEX_NA};
use bamid_sam::record::data::{Tag, Value};
use bamid_sam::record::{Flags, Record};
use bstr::BString;

/// Classification of a record against its mate, using only this record's fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverlapInfo {
    /// The pair cannot or does not overlap.
    NoOverlap,
    /// This record starts first and overlaps its mate.
    Overlap,
    /// Both records start at the same position.
    SameStart,
    /// The mate starts first; only the mate's record can tell.
    UnknownOverlap,
    /// The mate starts first and the orientation is reversed (forward after reverse).
    UnknownOverlapWrongOrientation,
    /// The records passed each other completely (reverse before forward).
    NoOverlapWrongOrientation,
}

/// Classifies the overlap of a record with its mate.
pub fn overlap_info(record: &Record, exclude_flags: Flags) -> OverlapInfo {
    let flags = record.flags();

    if !flags.is_paired()
        || record.mate_reference_sequence_id() != record.reference_sequence_id()
        || flags.is_unmapped()
        || flags.is_mate_unmapped()
        || flags.intersects(exclude_flags)
    {
        return OverlapInfo::NoOverlap;
    }

    let read_start = record.position();
    let mate_start = record.mate_position();

    if read_start == -1 || mate_start == -1 {
        return OverlapInfo::NoOverlap;
    }

    if read_start > mate_start {
        if !flags.is_reverse_complemented() && flags.is_mate_reverse_complemented() {
            return OverlapInfo::UnknownOverlapWrongOrientation;
        }

        return OverlapInfo::UnknownOverlap;
    } else if read_start == mate_start {
        return OverlapInfo::SameStart;
    }

    if record.alignment_end() < mate_start {
        // This read finishes before the mate starts. Reverse before forward means the pair
        // passed each other entirely.
        if flags.is_reverse_complemented() && !flags.is_mate_reverse_complemented() {
            return OverlapInfo::NoOverlapWrongOrientation;
        }

        return OverlapInfo::NoOverlap;
    }

    OverlapInfo::Overlap
}

/// A policy rewriting overlapping mate pairs.
pub trait OverlapHandler {
    /// Rewrites an overlapping pair in place. `first` is the record starting at or before
    /// `second`; by convention `first` is the forward strand.
    fn handle_overlap_pair(&self, first: &mut Record, second: &mut Record);

    /// Handles an overlapping record whose mate is not at hand, using this record's mate
    /// position. Returns whether the policy handled it.
    fn handle_overlap_without_mate(&self, _record: &mut Record) -> bool {
        false
    }
}

// Shared knobs of the concrete policies.
#[derive(Clone, Debug, Default)]
pub(crate) struct HandlerConfig {
    pub(crate) store_original_cigar: Option<Tag>,
    pub(crate) unmap_fully_clipped: bool,
}

impl HandlerConfig {
    pub(crate) fn save_cigar(&self, record: &mut Record) {
        if let Some(tag) = self.store_original_cigar {
            let cigar = record.cigar().to_string();
            record.data_mut().push(tag, Value::String(BString::from(cigar)));
        }
    }

    // Marks the record's mate as unmapped, clearing the proper-pair flag. Only applies when
    // unmapping is enabled.
    pub(crate) fn mark_mate_unmapped(&self, record: &mut Record) {
        if self.unmap_fully_clipped {
            let flags = (record.flags() | Flags::MATE_UNMAPPED) - Flags::PROPER_PAIR;
            record.set_flags(flags);
        }
    }

    // Clips the whole read, or unmaps it when unmapping is enabled.
    pub(crate) fn clip_or_unmap_whole_read(&self, record: &mut Record, mate_unmapped: bool) {
        if self.unmap_fully_clipped {
            self.save_cigar(record);
            record.mark_unmapped();

            if mate_unmapped {
                let flags = (record.flags() | Flags::MATE_UNMAPPED) - Flags::PROPER_PAIR;
                record.set_flags(flags);
            }
        } else if let Some((cigar, _)) = soft_clip_end_by_ref_pos(record, record.position()) {
            self.save_cigar(record);
            record.set_cigar(cigar);
        }
    }
}

// Soft-clips a record from the given reference position to its end. Returns the new CIGAR and
// the query index where the clip begins, or `None` when the position is past the alignment.
pub(crate) fn soft_clip_end_by_ref_pos(record: &Record, ref_pos: i32) -> Option<(Cigar, i32)> {
    record
        .cigar()
        .soft_clip_end_from_ref_offset(ref_pos - record.position())
}

// Soft-clips a record from its start through the given reference position. Returns the new
// CIGAR, the query index of the last clipped base, and the new 0-based start position.
pub(crate) fn soft_clip_begin_by_ref_pos(
    record: &Record,
    ref_pos: i32,
) -> Option<(Cigar, i32, i32)> {
    let (cigar, last_clipped, next_ref_offset) = record
        .cigar()
        .soft_clip_begin_through_ref_offset(ref_pos - record.position())?;

    let new_position = if next_ref_offset == INDEX_NA {
        record.position()
    } else {
        record.position() + next_ref_offset
    };

    Some((cigar, last_clipped, new_position))
}

// The mean raw Phred quality over query indexes [start, end], or 0 when the range is invalid.
pub(crate) fn average_quality(record: &Record, start: i32, end: i32) -> f64 {
    let scores = record.quality_scores().as_slice();

    if start < 0 || end < start || start as usize >= scores.len() {
        return 0.0;
    }

    let end = (end as usize).min(scores.len() - 1);
    let range = &scores[start as usize..=end];

    range.iter().map(|&q| f64::from(q)).sum::<f64>() / range.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired(
        position: i32,
        mate_position: i32,
        cigar: &str,
        reverse: bool,
        mate_reverse: bool,
    ) -> Record {
        let mut record = Record::new();

        let mut flags = Flags::PAIRED;
        if reverse {
            flags |= Flags::REVERSE_COMPLEMENTED;
        }
        if mate_reverse {
            flags |= Flags::MATE_REVERSE_COMPLEMENTED;
        }

        record.set_flags(flags);
        record.set_reference_sequence_id(0);
        record.set_mate_reference_sequence_id(0);
        record.set_position(position);
        record.set_mate_position(mate_position);
        record.set_cigar(cigar.parse().unwrap());
        record
    }

    #[test]
    fn test_overlap_info() {
        assert_eq!(
            overlap_info(&paired(100, 105, "10M", false, true), Flags::empty()),
            OverlapInfo::Overlap
        );
        assert_eq!(
            overlap_info(&paired(100, 120, "10M", false, true), Flags::empty()),
            OverlapInfo::NoOverlap
        );
        assert_eq!(
            overlap_info(&paired(100, 120, "10M", true, false), Flags::empty()),
            OverlapInfo::NoOverlapWrongOrientation
        );
        assert_eq!(
            overlap_info(&paired(100, 100, "10M", false, true), Flags::empty()),
            OverlapInfo::SameStart
        );
        assert_eq!(
            overlap_info(&paired(120, 100, "10M", true, false), Flags::empty()),
            OverlapInfo::UnknownOverlap
        );
        assert_eq!(
            overlap_info(&paired(120, 100, "10M", false, true), Flags::empty()),
            OverlapInfo::UnknownOverlapWrongOrientation
        );
    }

    #[test]
    fn test_overlap_info_respects_exclude_flags() {
        let mut record = paired(100, 105, "10M", false, true);
        record.set_flags(record.flags() | Flags::DUPLICATE);

        assert_eq!(
            overlap_info(&record, Flags::DUPLICATE),
            OverlapInfo::NoOverlap
        );
    }

    #[test]
    fn test_overlap_info_requires_same_reference() {
        let mut record = paired(100, 105, "10M", false, true);
        record.set_mate_reference_sequence_id(2);

        assert_eq!(
            overlap_info(&record, Flags::empty()),
            OverlapInfo::NoOverlap
        );
    }

    #[test]
    fn test_average_quality() {
        let mut record = Record::new();
        record.set_quality_scores(bamid_sam::record::QualityScores::from_scores(vec![
            10, 20, 30, 40,
        ]));

        assert_eq!(average_quality(&record, 0, 3), 25.0);
        assert_eq!(average_quality(&record, 2, 3), 35.0);
        assert_eq!(average_quality(&record, 2, 100), 35.0);
        assert_eq!(average_quality(&record, -1, 3), 0.0);
    }
}
