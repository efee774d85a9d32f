//! Reference genome access backed by an indexed FASTA.

use std::io;
use std::path::Path;

use bamid_sam::header::Header;
use bamid_sam::record::ReferenceBaseSource;
use noodles_fasta::{self as fasta, repository::adapters::IndexedReader};

/// An indexed reference genome answering single-base lookups.
pub struct Genome {
    repository: fasta::Repository,
}

impl Genome {
    /// Opens an indexed FASTA (`<src>.fai` must exist).
    pub fn open<P>(src: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let reader = fasta::io::indexed_reader::Builder::default().build_from_path(src)?;
        let repository = fasta::Repository::new(IndexedReader::new(reader));

        Ok(Self { repository })
    }

    /// Creates a genome over an existing repository.
    pub fn new(repository: fasta::Repository) -> Self {
        Self { repository }
    }

    /// Returns the uppercase base at the 0-based position of the named sequence.
    pub fn base(&self, name: &str, position: u32) -> Option<u8> {
        let sequence = self.repository.get(name.as_bytes())?.ok()?;

        sequence
            .as_ref()
            .get(position as usize)
            .copied()
            .map(|b| b.to_ascii_uppercase())
    }
}

/// Adapts a [`Genome`] to record sequence translation by resolving reference ids through a
/// header.
pub struct GenomeBases<'a> {
    genome: &'a Genome,
    header: &'a Header,
}

impl<'a> GenomeBases<'a> {
    /// Creates an adapter for the given genome and header.
    pub fn new(genome: &'a Genome, header: &'a Header) -> Self {
        Self { genome, header }
    }
}

impl ReferenceBaseSource for GenomeBases<'_> {
    fn base(&self, reference_sequence_id: usize, position: u32) -> Option<u8> {
        let name = self.header.reference_info().name(reference_sequence_id)?;
        self.genome.base(name, position)
    }
}
