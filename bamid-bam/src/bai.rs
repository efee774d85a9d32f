//! BAI: the BAM bin-and-linear-interval index.
//!
//! The index is immutable once loaded; it is only ever created by external tools.

pub mod chunk;
mod reader;
pub mod reference_sequence;

pub use self::chunk::{Chunk, SortedChunkList};
pub use self::reader::Reader;
pub use self::reference_sequence::{Bin, Metadata, ReferenceSequence};

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use noodles_bgzf::VirtualPosition;

/// The pseudo-bin id carrying the mapped/unmapped counts of a reference.
pub const METADATA_BIN: usize = 37450;

/// The largest representable 0-based position.
pub const MAX_POSITION: i32 = (1 << 29) - 1;

pub(crate) const LINEAR_INDEX_SHIFT: i32 = 14;

/// The reference sequence id requesting unmapped records with no coordinate.
pub const UNMAPPED_REFERENCE_ID: i32 = -1;

/// A loaded BAI index.
#[derive(Clone, Debug)]
pub struct Index {
    references: Vec<ReferenceSequence>,
    unplaced_unmapped_record_count: Option<u64>,
    max_offset: VirtualPosition,
}

impl Index {
    pub(crate) fn new(
        references: Vec<ReferenceSequence>,
        unplaced_unmapped_record_count: Option<u64>,
        max_offset: VirtualPosition,
    ) -> Self {
        Self {
            references,
            unplaced_unmapped_record_count,
            max_offset,
        }
    }

    /// Returns the per-reference index data.
    pub fn references(&self) -> &[ReferenceSequence] {
        &self.references
    }

    /// Returns the trailing count of unmapped records without a reference, when present.
    pub fn unplaced_unmapped_record_count(&self) -> Option<u64> {
        self.unplaced_unmapped_record_count
    }

    /// Returns the maximum chunk end offset across all references.
    pub fn max_offset(&self) -> VirtualPosition {
        self.max_offset
    }

    /// Returns the number of mapped records on the given reference, when known.
    pub fn mapped_record_count(&self, reference_sequence_id: usize) -> Option<u64> {
        self.references
            .get(reference_sequence_id)
            .and_then(|r| r.metadata())
            .map(|m| m.mapped_record_count())
    }

    /// Returns the number of unmapped records placed on the given reference, when known.
    pub fn unmapped_record_count(&self, reference_sequence_id: usize) -> Option<u64> {
        self.references
            .get(reference_sequence_id)
            .and_then(|r| r.metadata())
            .map(|m| m.unmapped_record_count())
    }

    /// Returns the merged chunks covering records that may overlap the given region.
    ///
    /// `reference_sequence_id` of [`UNMAPPED_REFERENCE_ID`] selects the unmapped tail of the
    /// file. `start`/`end` of `-1` leave the region unbounded on that side; both `-1` selects
    /// the whole reference. `end` is exclusive.
    pub fn query(
        &self,
        reference_sequence_id: i32,
        start: i32,
        end: i32,
    ) -> io::Result<Vec<Chunk>> {
        if start >= end && end != -1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "region start is not before its end",
            ));
        }

        if reference_sequence_id == UNMAPPED_REFERENCE_ID {
            let chunk = Chunk::new(self.max_offset, VirtualPosition::from(u64::MAX));
            return Ok(vec![chunk]);
        }

        let reference_sequence = usize::try_from(reference_sequence_id)
            .ok()
            .and_then(|id| self.references.get(id))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("reference sequence id out of range: {}", reference_sequence_id),
                )
            })?;

        let (start, end) = match (start, end) {
            (-1, -1) => {
                if u64::from(reference_sequence.max_offset()) == 0 {
                    return Ok(Vec::new());
                }

                let chunk = Chunk::new(
                    reference_sequence.min_offset(),
                    reference_sequence.max_offset(),
                );
                return Ok(vec![chunk]);
            }
            (-1, end) => (0, end),
            (start, -1) => (start, MAX_POSITION + 1),
            (start, end) => (start, end),
        };

        let min_offset = reference_sequence.min_offset_for_position(start);

        let mut chunk_list = SortedChunkList::new();

        for bin_id in region_to_bins(start, end) {
            let Some(bin) = reference_sequence.bin(bin_id) else {
                continue;
            };

            for &chunk in bin.chunks() {
                if chunk.end() >= min_offset {
                    chunk_list.insert(chunk);
                }
            }
        }

        chunk_list.merge_overlapping();

        Ok(chunk_list.into_chunks())
    }
}

/// Convenience: reads a BAI index from a path.
pub fn read<P>(src: P) -> io::Result<Index>
where
    P: AsRef<Path>,
{
    let mut reader = File::open(src).map(BufReader::new).map(Reader::new)?;
    reader.read_index()
}

/// Enumerates the bins whose intervals intersect the 0-based half-open region `[start, end)`.
///
/// Bin 0 is always included. Both endpoints are clamped to the maximum position.
pub fn region_to_bins(start: i32, end: i32) -> Vec<usize> {
    let start = start.clamp(0, MAX_POSITION) as usize;
    let end = (end - 1).clamp(0, MAX_POSITION) as usize;

    let mut bins = vec![0];

    for (base, shift) in [(1, 26), (9, 23), (73, 20), (585, 17), (4681, 14)] {
        for bin in (base + (start >> shift))..=(base + (end >> shift)) {
            bins.push(bin);
        }
    }

    bins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_to_bins() {
        assert_eq!(region_to_bins(0, 1), [0, 1, 9, 73, 585, 4681]);

        // A region crossing a 16 kb boundary picks up both leaf bins.
        assert_eq!(
            region_to_bins(16383, 16385),
            [0, 1, 9, 73, 585, 4681, 4682]
        );

        // The whole coordinate space touches every level.
        let bins = region_to_bins(0, MAX_POSITION + 1);
        assert_eq!(bins.len(), 1 + 8 + 64 + 512 + 4096 + 32768);
    }

    #[test]
    fn test_region_to_bins_intersection_law() {
        // Every returned bin's interval intersects the region, and every leaf bin whose
        // interval intersects is returned.
        let (start, end) = (100_000, 300_000);
        let bins = region_to_bins(start, end);

        for (base, shift) in [(1usize, 26), (9, 23), (73, 20), (585, 17), (4681, 14)] {
            let width = 1usize << shift;
            let level_bins: Vec<_> = bins
                .iter()
                .copied()
                .filter(|&b| b >= base && b < base + (1 << (29 - shift)))
                .collect();

            for bin in &level_bins {
                let interval_start = (bin - base) * width;
                assert!(interval_start < end as usize);
                assert!(interval_start + width > start as usize);
            }

            let expected: Vec<_> = ((start as usize >> shift)..=((end as usize - 1) >> shift))
                .map(|i| base + i)
                .collect();
            assert_eq!(level_bins, expected);
        }
    }

    fn test_index() -> Index {
        let make_ref = |min: u64, max: u64| {
            let mut bins = vec![None; METADATA_BIN + 1];
            bins[4681] = Some(Bin::new(vec![Chunk::new(
                VirtualPosition::from(min),
                VirtualPosition::from(max),
            )]));

            ReferenceSequence::new(
                bins,
                vec![VirtualPosition::from(min)],
                Some(Metadata::new(4, 0)),
                VirtualPosition::from(min),
                VirtualPosition::from(max),
            )
        };

        Index::new(
            vec![
                make_ref(0x360 << 16, 0x4e7 << 16),
                make_ref(0x4e7 << 16, 0x599 << 16),
                make_ref(0x599 << 16, 0x5ea << 16),
            ],
            Some(0),
            VirtualPosition::from(0x5ea << 16),
        )
    }

    #[test]
    fn test_query_whole_reference() -> io::Result<()> {
        let index = test_index();

        let chunks = index.query(1, -1, -1)?;
        assert_eq!(
            chunks,
            [Chunk::new(
                VirtualPosition::from(0x4e7 << 16),
                VirtualPosition::from(0x599 << 16)
            )]
        );

        let chunks = index.query(0, -1, -1)?;
        assert_eq!(
            chunks,
            [Chunk::new(
                VirtualPosition::from(0x360 << 16),
                VirtualPosition::from(0x4e7 << 16)
            )]
        );

        let chunks = index.query(2, -1, -1)?;
        assert_eq!(
            chunks,
            [Chunk::new(
                VirtualPosition::from(0x599 << 16),
                VirtualPosition::from(0x5ea << 16)
            )]
        );

        assert!(index.query(3, -1, -1).is_err());

        Ok(())
    }

    #[test]
    fn test_query_unmapped_tail() -> io::Result<()> {
        let index = test_index();

        let chunks = index.query(UNMAPPED_REFERENCE_ID, -1, -1)?;
        assert_eq!(
            chunks,
            [Chunk::new(
                VirtualPosition::from(0x5ea << 16),
                VirtualPosition::from(u64::MAX)
            )]
        );

        Ok(())
    }

    #[test]
    fn test_query_rejects_inverted_region() {
        let index = test_index();
        assert!(index.query(0, 10, 10).is_err());
        assert!(index.query(0, 10, 5).is_err());
    }

    #[test]
    fn test_query_filters_chunks_before_linear_offset() -> io::Result<()> {
        let mut bins = vec![None; METADATA_BIN + 1];
        // The early chunk lives in bin 0, which every region enumerates.
        bins[0] = Some(Bin::new(vec![Chunk::new(
            VirtualPosition::from(0x100 << 16),
            VirtualPosition::from(0x200 << 16),
        )]));
        bins[4682] = Some(Bin::new(vec![Chunk::new(
            VirtualPosition::from(0x300 << 16),
            VirtualPosition::from(0x400 << 16),
        )]));

        let reference_sequence = ReferenceSequence::new(
            bins,
            vec![
                VirtualPosition::from(0x100 << 16),
                VirtualPosition::from(0x300 << 16),
            ],
            None,
            VirtualPosition::from(0x100 << 16),
            VirtualPosition::from(0x400 << 16),
        );

        let index = Index::new(
            vec![reference_sequence],
            None,
            VirtualPosition::from(0x400 << 16),
        );

        // A query in the second 16 kb window skips the first bin's chunk entirely.
        let chunks = index.query(0, 1 << 14, (1 << 14) + 100)?;
        assert_eq!(
            chunks,
            [Chunk::new(
                VirtualPosition::from(0x300 << 16),
                VirtualPosition::from(0x400 << 16)
            )]
        );

        Ok(())
    }
}
