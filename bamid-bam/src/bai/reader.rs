use std::io::{self, Read};

use noodles_bgzf::VirtualPosition;

use super::chunk::Chunk;
use super::reference_sequence::{Bin, Metadata, ReferenceSequence};
use super::{Index, METADATA_BIN};

const MAGIC: [u8; 4] = [b'B', b'A', b'I', 0x01];

/// A BAI index reader.
pub struct Reader<R> {
    inner: R,
}

impl<R> Reader<R>
where
    R: Read,
{
    /// Creates a BAI reader.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads an entire index.
    pub fn read_index(&mut self) -> io::Result<Index> {
        let mut magic = [0; 4];
        self.inner.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid BAI magic",
            ));
        }

        let n_ref = self.read_i32()?;
        let n_ref = usize::try_from(n_ref)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative reference count"))?;

        let mut references = Vec::with_capacity(n_ref);
        let mut max_offset = VirtualPosition::from(0);

        for _ in 0..n_ref {
            let reference_sequence = self.read_reference_sequence(&mut max_offset)?;
            references.push(reference_sequence);
        }

        let unplaced_unmapped_record_count = self.read_trailing_count()?;

        Ok(Index::new(
            references,
            unplaced_unmapped_record_count,
            max_offset,
        ))
    }

    fn read_reference_sequence(
        &mut self,
        max_overall_offset: &mut VirtualPosition,
    ) -> io::Result<ReferenceSequence> {
        let n_bin = self.read_i32()?;
        let n_bin = usize::try_from(n_bin)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative bin count"))?;

        let mut bins = vec![None; METADATA_BIN + 1];
        let mut metadata = if n_bin == 0 {
            // No bins means no records on the reference.
            Some(Metadata::new(0, 0))
        } else {
            None
        };

        let mut min_offset = VirtualPosition::from(u64::MAX);
        let mut max_offset = VirtualPosition::from(0);

        for _ in 0..n_bin {
            let bin_id = self.read_u32()? as usize;

            let n_chunk = self.read_i32()?;
            let n_chunk = usize::try_from(n_chunk)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative chunk count"))?;

            if bin_id > METADATA_BIN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bin id out of range: {}", bin_id),
                ));
            }

            let mut chunks = Vec::with_capacity(n_chunk);

            for _ in 0..n_chunk {
                let start = self.read_u64().map(VirtualPosition::from)?;
                let end = self.read_u64().map(VirtualPosition::from)?;
                chunks.push(Chunk::new(start, end));
            }

            if bin_id == METADATA_BIN {
                // The last pseudo-chunk packs (mapped, unmapped); it is excluded from the
                // min/max offsets.
                if let Some(counts) = chunks.last() {
                    metadata = Some(Metadata::new(
                        u64::from(counts.start()),
                        u64::from(counts.end()),
                    ));
                }
            } else {
                for chunk in &chunks {
                    min_offset = min_offset.min(chunk.start());
                    max_offset = max_offset.max(chunk.end());
                    *max_overall_offset = (*max_overall_offset).max(chunk.end());
                }

                bins[bin_id] = Some(Bin::new(chunks));
            }
        }

        if u64::from(max_offset) == 0 {
            min_offset = VirtualPosition::from(0);
        }

        let n_intv = self.read_i32()?;
        let n_intv = usize::try_from(n_intv)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative interval count"))?;

        let mut intervals = Vec::with_capacity(n_intv);

        for _ in 0..n_intv {
            intervals.push(self.read_u64().map(VirtualPosition::from)?);
        }

        Ok(ReferenceSequence::new(
            bins,
            intervals,
            metadata,
            min_offset,
            max_offset,
        ))
    }

    fn read_trailing_count(&mut self) -> io::Result<Option<u64>> {
        let mut buf = [0; 8];

        match self.inner.read_exact(&mut buf) {
            Ok(()) => Ok(Some(u64::from_le_bytes(buf))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        let mut buf = [0; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_i32(dst: &mut Vec<u8>, n: i32) {
        dst.extend_from_slice(&n.to_le_bytes());
    }

    fn put_u32(dst: &mut Vec<u8>, n: u32) {
        dst.extend_from_slice(&n.to_le_bytes());
    }

    fn put_u64(dst: &mut Vec<u8>, n: u64) {
        dst.extend_from_slice(&n.to_le_bytes());
    }

    fn sample_index_bytes() -> Vec<u8> {
        let mut src = Vec::new();

        src.extend_from_slice(&MAGIC);
        put_i32(&mut src, 2); // n_ref

        // Reference 0: one regular bin, the metadata bin, and a linear index.
        put_i32(&mut src, 2); // n_bin
        put_u32(&mut src, 4681);
        put_i32(&mut src, 2); // n_chunk
        put_u64(&mut src, 0x360 << 16);
        put_u64(&mut src, 0x400 << 16);
        put_u64(&mut src, 0x410 << 16);
        put_u64(&mut src, 0x4e7 << 16);
        put_u32(&mut src, METADATA_BIN as u32);
        put_i32(&mut src, 2); // n_chunk
        put_u64(&mut src, 0x360 << 16); // placement range (ignored)
        put_u64(&mut src, 0x4e7 << 16);
        put_u64(&mut src, 1481); // n_mapped
        put_u64(&mut src, 3); // n_unmapped
        put_i32(&mut src, 1); // n_intv
        put_u64(&mut src, 0x360 << 16);

        // Reference 1: empty.
        put_i32(&mut src, 0); // n_bin
        put_i32(&mut src, 0); // n_intv

        put_u64(&mut src, 14); // unplaced unmapped count

        src
    }

    #[test]
    fn test_read_index() -> io::Result<()> {
        let src = sample_index_bytes();
        let index = Reader::new(&src[..]).read_index()?;

        assert_eq!(index.references().len(), 2);
        assert_eq!(index.unplaced_unmapped_record_count(), Some(14));
        assert_eq!(index.max_offset(), VirtualPosition::from(0x4e7 << 16));

        let r0 = &index.references()[0];
        assert_eq!(r0.min_offset(), VirtualPosition::from(0x360 << 16));
        assert_eq!(r0.max_offset(), VirtualPosition::from(0x4e7 << 16));
        assert_eq!(r0.metadata(), Some(Metadata::new(1481, 3)));
        assert_eq!(r0.bin(4681).map(|b| b.chunks().len()), Some(2));
        assert!(r0.bin(4682).is_none());
        assert_eq!(r0.intervals().len(), 1);

        let r1 = &index.references()[1];
        assert_eq!(r1.metadata(), Some(Metadata::new(0, 0)));
        assert_eq!(u64::from(r1.max_offset()), 0);
        assert_eq!(u64::from(r1.min_offset()), 0);

        assert_eq!(index.mapped_record_count(0), Some(1481));
        assert_eq!(index.unmapped_record_count(0), Some(3));
        assert_eq!(index.mapped_record_count(1), Some(0));
        assert_eq!(index.mapped_record_count(9), None);

        Ok(())
    }

    #[test]
    fn test_read_index_without_trailing_count() -> io::Result<()> {
        let mut src = sample_index_bytes();
        src.truncate(src.len() - 8);

        let index = Reader::new(&src[..]).read_index()?;
        assert_eq!(index.unplaced_unmapped_record_count(), None);

        Ok(())
    }

    #[test]
    fn test_read_index_with_invalid_magic() {
        let src = b"CSI\x01";
        assert!(Reader::new(&src[..]).read_index().is_err());
    }
}
