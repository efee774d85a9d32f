use bamid_sam::record::data::Tag;
use bamid_sam::record::Record;

use super::{
    average_quality, soft_clip_begin_by_ref_pos, soft_clip_end_by_ref_pos, HandlerConfig,
    OverlapHandler,
};

/// Soft-clips the lower-average-quality side of an overlapping pair.
///
/// When the pair is in the wrong orientation (reverse ending before the forward strand's
/// extent), the whole lower-quality read is clipped and the extending end of the other read is
/// trimmed back.
#[derive(Clone, Debug, Default)]
pub struct ClipLowerQuality {
    config: HandlerConfig,
}

impl ClipLowerQuality {
    /// Creates the policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the original CIGAR of rewritten records under the given tag.
    pub fn store_original_cigar(mut self, tag: Tag) -> Self {
        self.config.store_original_cigar = Some(tag);
        self
    }

    /// Marks records unmapped instead of leaving fully soft-clipped reads behind.
    pub fn unmap_fully_clipped(mut self, unmap: bool) -> Self {
        self.config.unmap_fully_clipped = unmap;
        self
    }

    fn handle_wrong_orientation_pair(
        &self,
        clipped: &mut Record,
        kept: &mut Record,
        trim_end: bool,
        overlap_start: i32,
        overlap_end: i32,
    ) {
        // The clipped side loses its whole alignment.
        self.handle_overlap_without_mate(clipped);
        self.config.mark_mate_unmapped(kept);

        if trim_end {
            // Trim the forward strand back to the reverse strand's end.
            if let Some((cigar, _)) = soft_clip_end_by_ref_pos(kept, overlap_end + 1) {
                self.config.save_cigar(kept);
                kept.set_cigar(cigar);
            }
        } else {
            // Trim the reverse strand's start back past the forward strand's start.
            if let Some((cigar, _, new_position)) =
                soft_clip_begin_by_ref_pos(kept, overlap_start - 1)
            {
                self.config.save_cigar(kept);
                kept.set_cigar(cigar);
                kept.set_position(new_position);
                clipped.set_mate_position(new_position);
            }
        }
    }
}

impl OverlapHandler for ClipLowerQuality {
    fn handle_overlap_pair(&self, first: &mut Record, second: &mut Record) {
        // The overlap runs from the start of the second record to the end of the first.
        let overlap_start = second.position();
        let overlap_end = first.alignment_end();

        let first_flags = first.flags();
        let second_flags = second.flags();

        let first_clip = soft_clip_end_by_ref_pos(first, overlap_start);
        let first_read_len = first.sequence().len() as i32;
        let first_qual_avg = match &first_clip {
            Some((_, clip_start)) => average_quality(first, *clip_start, first_read_len - 1),
            None => 0.0,
        };

        let second_clip = soft_clip_begin_by_ref_pos(second, overlap_end);
        let second_qual_avg = match &second_clip {
            Some((_, last_clipped, _)) => average_quality(second, 0, *last_clipped),
            None => 0.0,
        };

        let wrong_orientation =
            first_flags.is_reverse_complemented() && !second_flags.is_reverse_complemented();

        if first_qual_avg <= second_qual_avg {
            if wrong_orientation {
                self.handle_wrong_orientation_pair(first, second, true, overlap_start, overlap_end);
                return;
            }

            let Some((cigar, clip_start)) = first_clip else {
                return;
            };

            self.config.save_cigar(first);

            if self.config.unmap_fully_clipped && clip_start == 0 {
                first.mark_unmapped();
                self.config.mark_mate_unmapped(second);
            } else {
                first.set_cigar(cigar);
            }
        } else {
            if wrong_orientation {
                self.handle_wrong_orientation_pair(
                    second,
                    first,
                    false,
                    overlap_start,
                    overlap_end,
                );
                return;
            }

            let Some((cigar, last_clipped, new_position)) = second_clip else {
                return;
            };

            self.config.save_cigar(second);

            let second_read_len = second.sequence().len() as i32;

            if self.config.unmap_fully_clipped && last_clipped >= second_read_len - 1 {
                second.mark_unmapped();
                self.config.mark_mate_unmapped(first);
            } else {
                second.set_position(new_position);
                first.set_mate_position(new_position);
                second.set_cigar(cigar);
            }
        }
    }

    fn handle_overlap_without_mate(&self, record: &mut Record) -> bool {
        let flags = record.flags();

        if flags.is_reverse_complemented() && !flags.is_mate_reverse_complemented() {
            // The pair passed each other; this read has no usable alignment left.
            self.config.clip_or_unmap_whole_read(record, false);
            return true;
        }

        if let Some((cigar, clip_start)) = soft_clip_end_by_ref_pos(record, record.mate_position())
        {
            self.config.save_cigar(record);

            if self.config.unmap_fully_clipped && clip_start == 0 {
                record.mark_unmapped();
            } else {
                record.set_cigar(cigar);
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bamid_sam::record::{Flags, QualityScores, Sequence};
    use bstr::ByteSlice;

    fn pair() -> (Record, Record) {
        let mut first = Record::new();
        first.set_flags(Flags::PAIRED | Flags::MATE_REVERSE_COMPLEMENTED);
        first.set_reference_sequence_id(0);
        first.set_mate_reference_sequence_id(0);
        first.set_position(100);
        first.set_mate_position(105);
        first.set_cigar("10M".parse().unwrap());
        first.set_sequence(Sequence::from_bases(b"ACGTACGTAC".to_vec()));

        let mut second = Record::new();
        second.set_flags(Flags::PAIRED | Flags::REVERSE_COMPLEMENTED);
        second.set_reference_sequence_id(0);
        second.set_mate_reference_sequence_id(0);
        second.set_position(105);
        second.set_mate_position(100);
        second.set_cigar("10M".parse().unwrap());
        second.set_sequence(Sequence::from_bases(b"CGTACGTACG".to_vec()));

        (first, second)
    }

    #[test]
    fn test_clips_the_lower_quality_side() {
        let (mut first, mut second) = pair();

        // The first record's overlapping tail is low quality; the second's head is high.
        first.set_quality_scores(QualityScores::from_scores(vec![
            30, 30, 30, 30, 30, 5, 5, 5, 5, 5,
        ]));
        second.set_quality_scores(QualityScores::from_scores(vec![
            30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
        ]));

        ClipLowerQuality::new().handle_overlap_pair(&mut first, &mut second);

        assert_eq!(first.cigar().to_string(), "5M5S");
        assert_eq!(second.cigar().to_string(), "10M");
        assert_eq!(second.position(), 105);
    }

    #[test]
    fn test_clips_the_second_record_when_it_is_lower_quality() {
        let (mut first, mut second) = pair();

        first.set_quality_scores(QualityScores::from_scores(vec![30; 10]));
        second.set_quality_scores(QualityScores::from_scores(vec![
            5, 5, 5, 5, 5, 30, 30, 30, 30, 30,
        ]));

        ClipLowerQuality::new().handle_overlap_pair(&mut first, &mut second);

        assert_eq!(first.cigar().to_string(), "10M");
        // The overlap spans positions 105..=109, so the second record keeps its tail.
        assert_eq!(second.cigar().to_string(), "5S5M");
        assert_eq!(second.position(), 110);
        assert_eq!(first.mate_position(), 110);
    }

    #[test]
    fn test_stores_original_cigar() {
        let (mut first, mut second) = pair();

        first.set_quality_scores(QualityScores::from_scores(vec![5; 10]));
        second.set_quality_scores(QualityScores::from_scores(vec![30; 10]));

        ClipLowerQuality::new()
            .store_original_cigar(*b"XC")
            .handle_overlap_pair(&mut first, &mut second);

        let stored = first.data().get(*b"XC").and_then(|v| v.as_str()).unwrap();
        assert_eq!(stored.as_bstr(), "10M");
        assert_eq!(first.cigar().to_string(), "5M5S");
    }

    #[test]
    fn test_unmaps_fully_clipped_record() {
        let (mut first, mut second) = pair();

        // The records fully overlap: clipping the first down to the overlap start removes
        // everything.
        second.set_position(100);
        second.set_mate_position(100);
        first.set_mate_position(100);

        first.set_quality_scores(QualityScores::from_scores(vec![5; 10]));
        second.set_quality_scores(QualityScores::from_scores(vec![30; 10]));

        ClipLowerQuality::new()
            .unmap_fully_clipped(true)
            .handle_overlap_pair(&mut first, &mut second);

        assert!(first.flags().is_unmapped());
        assert_eq!(first.reference_sequence_id(), -1);
        assert!(second.flags().is_mate_unmapped());
    }

    #[test]
    fn test_wrong_orientation_clips_the_whole_lower_quality_read() {
        let (mut first, mut second) = pair();

        // Reverse strand first, forward second.
        first.set_flags(Flags::PAIRED | Flags::REVERSE_COMPLEMENTED);
        second.set_flags(Flags::PAIRED | Flags::MATE_REVERSE_COMPLEMENTED);

        first.set_quality_scores(QualityScores::from_scores(vec![5; 10]));
        second.set_quality_scores(QualityScores::from_scores(vec![30; 10]));

        ClipLowerQuality::new().handle_overlap_pair(&mut first, &mut second);

        // The whole first read is soft-clipped; the second is trimmed past the overlap end.
        assert_eq!(first.cigar().to_string(), "10S");
        assert_eq!(second.cigar().to_string(), "5M5S");
    }
}
