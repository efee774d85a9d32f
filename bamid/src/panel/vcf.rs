use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use log::warn;

use super::{Genotype, Individual, Site};

pub(super) struct VcfStore {
    reader: Box<dyn BufRead>,
    individuals: Vec<Individual>,
}

impl VcfStore {
    pub(super) fn open<P>(src: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let reader = BufReader::new(File::open(src)?);
        Self::from_reader(Box::new(reader))
    }

    pub(super) fn from_reader(mut reader: Box<dyn BufRead>) -> io::Result<Self> {
        let mut individuals = Vec::new();

        // Meta lines, then the #CHROM column header naming the samples.
        loop {
            let mut line = String::new();

            if reader.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "missing #CHROM header line",
                ));
            }

            let line = line.trim_end();

            if line.starts_with("##") {
                continue;
            }

            if let Some(rest) = line.strip_prefix("#CHROM") {
                let columns: Vec<&str> = rest.split('\t').filter(|c| !c.is_empty()).collect();

                // POS ID REF ALT QUAL FILTER INFO [FORMAT samples...]
                for sample in columns.iter().skip(8) {
                    individuals.push(Individual {
                        family_id: sample.to_string(),
                        individual_id: sample.to_string(),
                    });
                }

                break;
            }

            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "expected a #CHROM header line",
            ));
        }

        Ok(Self {
            reader,
            individuals,
        })
    }

    pub(super) fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub(super) fn next_site(&mut self) -> io::Result<Option<Site>> {
        loop {
            let mut line = String::new();

            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            let line = line.trim_end();

            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();

            if fields.len() < 8 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "record line has fewer than 8 columns",
                ));
            }

            let (chrom, pos, id, ref_allele, alt_allele) =
                (fields[0], fields[1], fields[2], fields[3], fields[4]);

            if ref_allele.len() != 1 || alt_allele.len() != 1 {
                warn!(
                    "skipping non-biallelic-SNP site {}:{} ({} > {})",
                    chrom, pos, ref_allele, alt_allele
                );
                continue;
            }

            let position = pos.parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid position: {}", pos),
                )
            })?;

            // The INFO AF annotation is the alternate allele frequency.
            let allele_frequency = parse_info_af(fields[7])?.map(|af| 1.0 - af);

            let mut genotypes = Vec::with_capacity(self.individuals.len());

            for sample in fields.iter().skip(9).take(self.individuals.len()) {
                genotypes.push(parse_genotype(sample)?);
            }

            return Ok(Some(Site {
                chrom: chrom.to_string(),
                id: id.to_string(),
                position,
                a1: ref_allele.as_bytes()[0],
                a2: alt_allele.as_bytes()[0],
                allele_frequency,
                genotypes,
            }));
        }
    }
}

fn parse_info_af(info: &str) -> io::Result<Option<f64>> {
    for entry in info.split(';') {
        if let Some(raw) = entry.strip_prefix("AF=") {
            // Only the first value of a multi-allelic annotation applies.
            let raw = raw.split(',').next().unwrap_or(raw);

            let af = raw.parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid INFO AF value: {}", raw),
                )
            })?;

            return Ok(Some(af));
        }
    }

    Ok(None)
}

// GT is the first colon-separated subfield; alleles split on `/` or `|`.
fn parse_genotype(sample: &str) -> io::Result<Genotype> {
    let gt = sample.split(':').next().unwrap_or(sample);

    let mut dosage = 0;

    for allele in gt.split(['/', '|']) {
        match allele {
            "." => return Ok(Genotype::Missing),
            "0" => {}
            "1" => dosage += 1,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrecognized GT token: {}", gt),
                ));
            }
        }
    }

    Ok(match dosage {
        0 => Genotype::HomRef,
        1 => Genotype::Het,
        _ => Genotype::HomAlt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static VCF: &str = "##fileformat=VCFv4.1\n\
##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA1\tNA2\n\
1\t100\trs1\tA\tG\t50\tPASS\tAF=0.25\tGT:DP\t0/0:10\t0|1:12\n\
1\t200\trs2\tAT\tG\t50\tPASS\t.\tGT\t0/0\t1/1\n\
2\t300\trs3\tC\tT\t50\tPASS\t.\tGT\t./.\t1/1\n";

    #[test]
    fn test_reads_sites_and_genotypes() -> io::Result<()> {
        let mut store = VcfStore::from_reader(Box::new(VCF.as_bytes()))?;

        assert_eq!(store.individuals().len(), 2);
        assert_eq!(store.individuals()[0].individual_id, "NA1");

        let site = store.next_site()?.unwrap();
        assert_eq!(site.chrom, "1");
        assert_eq!(site.position, 100);
        assert_eq!((site.a1, site.a2), (b'A', b'G'));
        assert!((site.allele_frequency.unwrap() - 0.75).abs() < 1e-12);
        assert_eq!(site.genotypes, [Genotype::HomRef, Genotype::Het]);

        // The indel site is skipped.
        let site = store.next_site()?.unwrap();
        assert_eq!(site.id, "rs3");
        assert_eq!(site.genotypes, [Genotype::Missing, Genotype::HomAlt]);
        assert_eq!(site.allele_frequency, None);

        assert!(store.next_site()?.is_none());

        Ok(())
    }
}
