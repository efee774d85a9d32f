//! Biallelic variant panels: per-site alleles and frequencies, with an optional
//! per-individual genotype matrix.

mod plink;
mod vcf;

use std::io;
use std::path::Path;

/// A panel individual.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Individual {
    /// The family id.
    pub family_id: String,
    /// The within-family individual id, matched against read group `SM` tags.
    pub individual_id: String,
}

/// A diploid genotype at a biallelic site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Genotype {
    /// No call.
    Missing,
    /// Homozygous for the first allele.
    HomRef,
    /// Heterozygous.
    Het,
    /// Homozygous for the second allele.
    HomAlt,
}

impl Genotype {
    /// Returns the index into `[homRef, het, homAlt]` arrays, or `None` when missing.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Missing => None,
            Self::HomRef => Some(0),
            Self::Het => Some(1),
            Self::HomAlt => Some(2),
        }
    }

    /// Returns the count of second alleles carried, or `None` when missing.
    pub fn dosage(self) -> Option<u32> {
        self.index().map(|i| i as u32)
    }

    /// Swaps the roles of the two alleles.
    pub fn flip(self) -> Self {
        match self {
            Self::HomRef => Self::HomAlt,
            Self::HomAlt => Self::HomRef,
            other => other,
        }
    }
}

/// One panel site: a biallelic variant with its alleles, optional allele frequency, and
/// optional genotype column.
#[derive(Clone, Debug)]
pub struct Site {
    /// The chromosome as written in the panel.
    pub chrom: String,
    /// The marker id.
    pub id: String,
    /// The 1-based base position.
    pub position: u32,
    /// The first allele.
    pub a1: u8,
    /// The second allele.
    pub a2: u8,
    /// The frequency of the first allele, when the panel carries one.
    pub allele_frequency: Option<f64>,
    /// The per-individual genotypes, empty for marker-only panels.
    pub genotypes: Vec<Genotype>,
}

impl Site {
    /// Swaps the two alleles, flipping every genotype and the allele frequency with them.
    pub fn flip_alleles(&mut self) {
        std::mem::swap(&mut self.a1, &mut self.a2);

        self.allele_frequency = self.allele_frequency.map(|af| 1.0 - af);

        for genotype in &mut self.genotypes {
            *genotype = genotype.flip();
        }
    }

    /// Returns the chromosome name in NCBI (bare) or UCSC (`chr`-prefixed) convention.
    pub fn chromosome_name(&self, ucsc: bool) -> String {
        let bare = self.chrom.strip_prefix("chr").unwrap_or(&self.chrom);

        if ucsc {
            format!("chr{}", bare)
        } else {
            bare.to_string()
        }
    }
}

/// A streaming variant panel.
pub struct Panel {
    individuals: Vec<Individual>,
    store: Store,
}

enum Store {
    Plink(plink::PlinkStore),
    Vcf(vcf::VcfStore),
}

impl Panel {
    /// Opens a PLINK binary trio: `<prefix>.fam`, a marker file, and `<prefix>.bed`.
    ///
    /// The marker file is `.bim` (6 columns) or `.bimp` (7 columns, allele frequency last).
    pub fn open_plink<P>(fam: P, markers: P, bed: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let individuals = plink::read_fam(fam)?;
        let store = plink::PlinkStore::open(markers, Some((bed, individuals.len())))?;

        Ok(Self {
            individuals,
            store: Store::Plink(store),
        })
    }

    /// Opens a marker-only panel from a `.bim`/`.bimp` file; no genotypes are available.
    pub fn open_markers_only<P>(markers: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let store = plink::PlinkStore::open(markers, None)?;

        Ok(Self {
            individuals: Vec::new(),
            store: Store::Plink(store),
        })
    }

    /// Opens a VCF text panel; genotypes are read from the `GT` field.
    pub fn open_vcf<P>(src: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let store = vcf::VcfStore::open(src)?;
        let individuals = store.individuals().to_vec();

        Ok(Self {
            individuals,
            store: Store::Vcf(store),
        })
    }

    /// Returns the panel individuals.
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    /// Returns the individuals mutably, e.g. to pin a self-matched individual first.
    pub fn individuals_mut(&mut self) -> &mut [Individual] {
        &mut self.individuals
    }

    /// Returns the total marker count, when known up front.
    pub fn marker_count(&self) -> Option<usize> {
        match &self.store {
            Store::Plink(store) => Some(store.marker_count()),
            Store::Vcf(_) => None,
        }
    }

    /// Returns whether the panel carries a genotype matrix.
    pub fn has_genotypes(&self) -> bool {
        match &self.store {
            Store::Plink(store) => store.has_genotypes(),
            Store::Vcf(_) => true,
        }
    }

    /// Returns whether any loaded marker carries a nonzero allele frequency.
    pub fn has_allele_frequencies(&self) -> bool {
        match &self.store {
            Store::Plink(store) => store.has_allele_frequencies(),
            Store::Vcf(_) => true,
        }
    }

    /// Advances to the next site, returning `None` at the end of the panel.
    pub fn next_site(&mut self) -> io::Result<Option<Site>> {
        match &mut self.store {
            Store::Plink(store) => store.next_site(),
            Store::Vcf(store) => store.next_site(),
        }
    }
}
