use bamid_sam::record::data::Tag;
use bamid_sam::record::Record;

use super::{soft_clip_begin_by_ref_pos, soft_clip_end_by_ref_pos, HandlerConfig, OverlapHandler};

/// Splits an overlap between the mates: half the overlapping reference span is clipped from
/// the end of the forward read and the rest from the start of the reverse read.
#[derive(Clone, Debug, Default)]
pub struct SplitClip {
    config: HandlerConfig,
}

impl SplitClip {
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
}

impl OverlapHandler for SplitClip {
    fn handle_overlap_pair(&self, first: &mut Record, second: &mut Record) {
        let overlap_start = second.position();
        let overlap_end = first.alignment_end();
        let second_end = second.alignment_end();

        // Only the forward-then-reverse layout with the reverse read ending last is split.
        assert!(!first.flags().is_reverse_complemented());
        assert!(second.flags().is_reverse_complemented());
        assert!(second_end >= overlap_end);

        let overlap_len = overlap_end - overlap_start + 1;
        let half_overlap = overlap_len / 2;
        let remaining_overlap = overlap_len - half_overlap;

        let first_clip = soft_clip_end_by_ref_pos(first, overlap_start + half_overlap);
        let second_clip = soft_clip_begin_by_ref_pos(second, overlap_end - remaining_overlap);

        self.config.save_cigar(first);
        self.config.save_cigar(second);

        if let Some((cigar, clip_start)) = first_clip {
            if self.config.unmap_fully_clipped && clip_start == 0 {
                first.mark_unmapped();
                self.config.mark_mate_unmapped(second);
            } else {
                first.set_cigar(cigar);
            }
        }

        if let Some((cigar, last_clipped, new_position)) = second_clip {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use bamid_sam::record::{Flags, Sequence};

    fn pair(first_pos: i32, second_pos: i32) -> (Record, Record) {
        let mut first = Record::new();
        first.set_flags(Flags::PAIRED | Flags::MATE_REVERSE_COMPLEMENTED);
        first.set_reference_sequence_id(0);
        first.set_mate_reference_sequence_id(0);
        first.set_position(first_pos);
        first.set_mate_position(second_pos);
        first.set_cigar("10M".parse().unwrap());
        first.set_sequence(Sequence::from_bases(b"ACGTACGTAC".to_vec()));

        let mut second = Record::new();
        second.set_flags(Flags::PAIRED | Flags::REVERSE_COMPLEMENTED);
        second.set_reference_sequence_id(0);
        second.set_mate_reference_sequence_id(0);
        second.set_position(second_pos);
        second.set_mate_position(first_pos);
        second.set_cigar("10M".parse().unwrap());
        second.set_sequence(Sequence::from_bases(b"CGTACGTACG".to_vec()));

        (first, second)
    }

    #[test]
    fn test_splits_an_odd_overlap() {
        // Overlap covers positions 105..=109: five positions, so the first read gives up
        // three and the second two.
        let (mut first, mut second) = pair(100, 105);

        SplitClip::new().handle_overlap_pair(&mut first, &mut second);

        assert_eq!(first.cigar().to_string(), "7M3S");
        assert_eq!(second.cigar().to_string(), "2S8M");
        assert_eq!(second.position(), 107);
        assert_eq!(first.mate_position(), 107);
    }

    #[test]
    fn test_splits_an_even_overlap() {
        // Overlap covers positions 104..=109: six positions, three clipped from each side.
        let (mut first, mut second) = pair(100, 104);

        SplitClip::new().handle_overlap_pair(&mut first, &mut second);

        assert_eq!(first.cigar().to_string(), "7M3S");
        assert_eq!(second.cigar().to_string(), "3S7M");
        assert_eq!(second.position(), 107);
    }
}
