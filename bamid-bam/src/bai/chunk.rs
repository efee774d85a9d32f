use std::collections::BTreeMap;

use noodles_bgzf::VirtualPosition;

/// A half-open range `[start, end)` of virtual file offsets covering consecutive records.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk {
    start: VirtualPosition,
    end: VirtualPosition,
}

impl Chunk {
    /// Creates a chunk.
    pub fn new(start: VirtualPosition, end: VirtualPosition) -> Self {
        Self { start, end }
    }

    /// Returns the start offset.
    pub fn start(self) -> VirtualPosition {
        self.start
    }

    /// Returns the end offset.
    pub fn end(self) -> VirtualPosition {
        self.end
    }

    pub(crate) fn set_end(&mut self, end: VirtualPosition) {
        self.end = end;
    }
}

/// A list of chunks kept ordered by start offset.
#[derive(Clone, Debug, Default)]
pub struct SortedChunkList {
    chunks: BTreeMap<VirtualPosition, Chunk>,
}

impl SortedChunkList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a chunk, returning `false` when a chunk with the same start offset is already
    /// present (the existing chunk is kept).
    pub fn insert(&mut self, chunk: Chunk) -> bool {
        use std::collections::btree_map::Entry;

        match self.chunks.entry(chunk.start()) {
            Entry::Vacant(entry) => {
                entry.insert(chunk);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Returns whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns the number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Removes all chunks.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Merges the list in place: a chunk contained in its predecessor is dropped, and two
    /// chunks whose boundary offsets lie in the same compressed block are fused.
    pub fn merge_overlapping(&mut self) {
        let chunks = std::mem::take(&mut self.chunks);
        let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());

        for (_, chunk) in chunks {
            if let Some(last) = merged.last_mut() {
                if chunk.end() <= last.end() {
                    continue;
                }

                if chunk.start().compressed() <= last.end().compressed() {
                    last.set_end(chunk.end());
                    continue;
                }
            }

            merged.push(chunk);
        }

        self.chunks = merged.into_iter().map(|c| (c.start(), c)).collect();
    }

    /// Consumes the list, returning the chunks in start order.
    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks.into_values().collect()
    }
}
