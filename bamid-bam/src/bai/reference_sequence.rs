use noodles_bgzf::VirtualPosition;

use super::chunk::Chunk;
use super::{LINEAR_INDEX_SHIFT, METADATA_BIN};

/// A bin of the UCSC binning scheme: the chunks of records assigned to one interval.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bin {
    chunks: Vec<Chunk>,
}

impl Bin {
    pub(crate) fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Returns the chunks of the bin.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// The mapped/unmapped record counts carried by the metadata pseudo-bin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Metadata {
    mapped_record_count: u64,
    unmapped_record_count: u64,
}

impl Metadata {
    pub(crate) fn new(mapped_record_count: u64, unmapped_record_count: u64) -> Self {
        Self {
            mapped_record_count,
            unmapped_record_count,
        }
    }

    /// Returns the number of mapped records on the reference.
    pub fn mapped_record_count(self) -> u64 {
        self.mapped_record_count
    }

    /// Returns the number of unmapped records placed on the reference.
    pub fn unmapped_record_count(self) -> u64 {
        self.unmapped_record_count
    }
}

/// The index data of one reference sequence: its bins, the 16 kb linear index, metadata
/// counts, and the min/max chunk offsets across regular bins.
#[derive(Clone, Debug)]
pub struct ReferenceSequence {
    // Dense bin arena indexed by bin id; ids are dense in the low range, so a vector is
    // simpler than a map. The metadata pseudo-bin is held separately.
    bins: Vec<Option<Bin>>,
    intervals: Vec<VirtualPosition>,
    metadata: Option<Metadata>,
    min_offset: VirtualPosition,
    max_offset: VirtualPosition,
}

impl ReferenceSequence {
    pub(crate) fn new(
        bins: Vec<Option<Bin>>,
        intervals: Vec<VirtualPosition>,
        metadata: Option<Metadata>,
        min_offset: VirtualPosition,
        max_offset: VirtualPosition,
    ) -> Self {
        Self {
            bins,
            intervals,
            metadata,
            min_offset,
            max_offset,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(
            vec![None; METADATA_BIN + 1],
            Vec::new(),
            None,
            VirtualPosition::from(0),
            VirtualPosition::from(0),
        )
    }

    /// Returns the bin with the given id.
    pub fn bin(&self, id: usize) -> Option<&Bin> {
        self.bins.get(id).and_then(|bin| bin.as_ref())
    }

    /// Returns the 16 kb linear index.
    pub fn intervals(&self) -> &[VirtualPosition] {
        &self.intervals
    }

    /// Returns the metadata counts, when present.
    pub fn metadata(&self) -> Option<Metadata> {
        self.metadata
    }

    /// Returns the minimum chunk start offset across regular bins.
    pub fn min_offset(&self) -> VirtualPosition {
        self.min_offset
    }

    /// Returns the maximum chunk end offset across regular bins.
    pub fn max_offset(&self) -> VirtualPosition {
        self.max_offset
    }

    /// Returns the minimum offset of records overlapping the 16 kb window containing `start`.
    ///
    /// A zero entry scans backward to the nearest non-zero entry, compensating for index
    /// writers that left bins 4681-37449 out of the linear index.
    pub fn min_offset_for_position(&self, start: i32) -> VirtualPosition {
        let mut i = (start >> LINEAR_INDEX_SHIFT) as usize;

        if self.intervals.is_empty() || i >= self.intervals.len() {
            return VirtualPosition::from(0);
        }

        let mut min_offset = self.intervals[i];

        while u64::from(min_offset) == 0 && i > 0 {
            i -= 1;
            min_offset = self.intervals[i];
        }

        min_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_offset_for_position_scans_backward_over_zero_entries() {
        let intervals = vec![
            VirtualPosition::from(0x100),
            VirtualPosition::from(0),
            VirtualPosition::from(0),
            VirtualPosition::from(0x400),
        ];

        let reference_sequence = ReferenceSequence::new(
            vec![None; METADATA_BIN + 1],
            intervals,
            None,
            VirtualPosition::from(0x100),
            VirtualPosition::from(0x400),
        );

        assert_eq!(
            reference_sequence.min_offset_for_position(0),
            VirtualPosition::from(0x100)
        );
        assert_eq!(
            reference_sequence.min_offset_for_position(2 << 14),
            VirtualPosition::from(0x100)
        );
        assert_eq!(
            reference_sequence.min_offset_for_position(3 << 14),
            VirtualPosition::from(0x400)
        );
        assert_eq!(
            reference_sequence.min_offset_for_position(100 << 14),
            VirtualPosition::from(0)
        );
    }
}
