use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use super::{Genotype, Individual, Site};

// .bed files open with these bytes; the third marks SNP-major orientation.
const BED_MAGIC: [u8; 3] = [0x6c, 0x1b, 0x01];

#[derive(Clone, Debug)]
struct Marker {
    chrom: String,
    id: String,
    position: u32,
    a1: u8,
    a2: u8,
    allele_frequency: Option<f64>,
}

pub(super) struct PlinkStore {
    markers: Vec<Marker>,
    bed: Option<BufReader<File>>,
    individual_count: usize,
    cursor: usize,
}

impl PlinkStore {
    pub(super) fn open<P>(markers: P, bed: Option<(P, usize)>) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let markers = read_markers(markers)?;

        let (bed, individual_count) = match bed {
            Some((path, individual_count)) => {
                let mut reader = BufReader::new(File::open(path)?);

                let mut magic = [0; 3];
                reader.read_exact(&mut magic)?;

                if magic != BED_MAGIC {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "invalid .bed magic or orientation (SNP-major expected)",
                    ));
                }

                (Some(reader), individual_count)
            }
            None => (None, 0),
        };

        Ok(Self {
            markers,
            bed,
            individual_count,
            cursor: 0,
        })
    }

    pub(super) fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub(super) fn has_genotypes(&self) -> bool {
        self.bed.is_some()
    }

    pub(super) fn has_allele_frequencies(&self) -> bool {
        self.markers
            .iter()
            .any(|m| m.allele_frequency.unwrap_or(0.0) != 0.0)
    }

    pub(super) fn next_site(&mut self) -> io::Result<Option<Site>> {
        let Some(marker) = self.markers.get(self.cursor) else {
            return Ok(None);
        };

        self.cursor += 1;

        let genotypes = match &mut self.bed {
            Some(bed) => read_genotype_row(bed, self.individual_count)?,
            None => Vec::new(),
        };

        Ok(Some(Site {
            chrom: marker.chrom.clone(),
            id: marker.id.clone(),
            position: marker.position,
            a1: marker.a1,
            a2: marker.a2,
            allele_frequency: marker.allele_frequency,
            genotypes,
        }))
    }
}

// One marker row: 2 bits per individual, four individuals per byte, low bits first.
fn read_genotype_row<R>(reader: &mut R, individual_count: usize) -> io::Result<Vec<Genotype>>
where
    R: Read,
{
    let mut row = vec![0; individual_count.div_ceil(4)];
    reader.read_exact(&mut row)?;

    let mut genotypes = Vec::with_capacity(individual_count);

    for i in 0..individual_count {
        let code = (row[i / 4] >> ((i % 4) * 2)) & 0x03;

        genotypes.push(match code {
            0b00 => Genotype::HomRef,
            0b01 => Genotype::Missing,
            0b10 => Genotype::Het,
            0b11 => Genotype::HomAlt,
            _ => unreachable!(),
        });
    }

    Ok(genotypes)
}

/// Reads a `.fam` file: one individual per line, at least five whitespace-separated columns.
pub(super) fn read_fam<P>(src: P) -> io::Result<Vec<Individual>>
where
    P: AsRef<Path>,
{
    let reader = BufReader::new(File::open(src)?);
    let mut individuals = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;

        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields.len() < 5 || fields.len() > 6 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    ".fam line {} has {} columns, expected 5 or 6",
                    line_number + 1,
                    fields.len()
                ),
            ));
        }

        individuals.push(Individual {
            family_id: fields[0].to_string(),
            individual_id: fields[1].to_string(),
        });
    }

    Ok(individuals)
}

// .bim rows carry CHROM ID CM BP [A1 A2 [AF]]: 4, 6, or 7 columns.
fn read_markers<P>(src: P) -> io::Result<Vec<Marker>>
where
    P: AsRef<Path>,
{
    let reader = BufReader::new(File::open(src)?);
    let mut markers = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;

        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();

        if !matches!(fields.len(), 4 | 6 | 7) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "marker file line {} has {} columns, expected 4, 6, or 7",
                    line_number + 1,
                    fields.len()
                ),
            ));
        }

        let position = fields[3].parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid base position on line {}", line_number + 1),
            )
        })?;

        let allele = |i: usize| fields.get(i).map_or(b'0', |s| s.as_bytes()[0]);

        let allele_frequency = match fields.get(6) {
            Some(raw) => Some(raw.parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid allele frequency on line {}", line_number + 1),
                )
            })?),
            None => None,
        };

        markers.push(Marker {
            chrom: fields[0].to_string(),
            id: fields[1].to_string(),
            position,
            a1: allele(4),
            a2: allele(5),
            allele_frequency,
        });
    }

    Ok(markers)
}
