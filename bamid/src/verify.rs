//! The identity verifier: walks a variant panel, extracts base observations from an indexed
//! BAM, and scores identity (IBD), contamination, and excess-homozygosity models per read
//! group and per sample.

pub mod likelihood;
mod report;

pub use self::report::write_reports;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bamid_sam::record::{Flags, Record};
use bstr::ByteSlice;
use log::{info, warn};

use crate::error::{Error, Result};
use crate::io::AlignmentReader;
use crate::panel::{Genotype, Panel, Site};
use crate::reference::Genome;
use crate::verify::likelihood::{
    bottleneck_genotype_priors, mixture_base_likelihoods, phred_to_error_table,
    GenotypeLikelihoods, MixtureLikelihoods, MAX_Q,
};

/// Verifier settings.
#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// Minimum base quality; lower bases are ignored.
    pub min_q: u8,
    /// Maximum effective base quality; higher scores are flattened to it.
    pub max_q: u8,
    /// Minimum mapping quality; lower records are ignored.
    pub min_map_q: u8,
    /// Maximum per-site depth; deeper sites are skipped as likely artifacts.
    pub max_depth: usize,
    /// Error rate assumed in the panel genotypes.
    pub genotype_error: f64,
    /// Minimum alternate allele frequency; sites outside `[min_af, 1 - min_af]` are skipped.
    pub min_af: f64,
    /// Flags a record must carry to be used.
    pub include_flags: Flags,
    /// Flags disqualifying a record.
    pub exclude_flags: Flags,
    /// Compare only against the individual annotated in the read groups.
    pub self_only: bool,
    /// Take allele frequencies from the panel instead of its genotype matrix.
    pub use_panel_af: bool,
    /// Use UCSC (`chr`-prefixed) chromosome names.
    pub ucsc: bool,
    /// Carry all per-site products in log space; required for depths beyond ~100.
    pub precise: bool,
    /// The identity-by-descent grid.
    pub ibd_values: Vec<f64>,
    /// The contaminant (mixture) fraction grid.
    pub mix_values: Vec<f64>,
    /// The excess-homozygosity (bottleneck) fraction grid.
    pub hom_values: Vec<f64>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            min_q: 20,
            max_q: 40,
            min_map_q: 10,
            max_depth: 20,
            genotype_error: 5e-3,
            min_af: 5e-3,
            include_flags: Flags::empty(),
            // secondary, QC-fail, duplicate, unmapped
            exclude_flags: Flags::from(0x0704),
            self_only: false,
            use_panel_af: false,
            ucsc: false,
            precise: false,
            ibd_values: grid_values(0.01, 1.0),
            mix_values: grid_values(0.01, 0.5),
            hom_values: grid_values(0.01, 1.0),
        }
    }
}

/// Builds a grid of candidate fractions: multiples of `unit` up to and including `max`.
pub fn grid_values(unit: f64, max: f64) -> Vec<f64> {
    let n = (max / unit).ceil() as usize + 1;

    (0..n).map(|i| (unit * i as f64).min(max)).collect()
}

/// The BAM input of a verification run.
#[derive(Clone, Debug)]
pub enum BamInput {
    /// One indexed BAM covering the whole panel.
    Single {
        /// The BAM path.
        path: PathBuf,
        /// The index path; `<path>.bai` when absent.
        index: Option<PathBuf>,
    },
    /// One indexed BAM per chromosome, named `<prefix><chromosome><suffix>`.
    PerChromosome {
        /// The path part before the chromosome name.
        prefix: String,
        /// The path part after the chromosome name.
        suffix: String,
    },
}

/// The per-group accumulated state of a run.
#[derive(Clone, Debug)]
pub(crate) struct GroupStats {
    pub(crate) ind_geno_bases: Vec<u32>,
    pub(crate) ind_geno_refs: Vec<u32>,
    pub(crate) ind_geno_alts: Vec<u32>,
    pub(crate) sum_ind_llks: Vec<f64>,
    pub(crate) hom_mix_llks: Vec<f64>,
    pub(crate) sum_prior_het: f64,
    pub(crate) sum_posterior_het: f64,
    pub(crate) site_count: u32,
    pub(crate) base_count: u32,
}

impl GroupStats {
    fn new(candidate_count: usize, ibd_count: usize, axis_len: usize) -> Self {
        Self {
            ind_geno_bases: vec![0; candidate_count * 3],
            ind_geno_refs: vec![0; candidate_count * 3],
            ind_geno_alts: vec![0; candidate_count * 3],
            sum_ind_llks: vec![0.0; candidate_count * ibd_count],
            hom_mix_llks: vec![0.0; axis_len],
            sum_prior_het: 0.0,
            sum_posterior_het: 0.0,
            site_count: 0,
            base_count: 0,
        }
    }
}

/// Everything a verification run accumulated, ready for reporting.
pub struct VerifySummary {
    pub(crate) rg_ids: Vec<String>,
    pub(crate) rg_samples: Vec<String>,
    pub(crate) bam_sample: String,
    pub(crate) same_sample: bool,
    pub(crate) candidate_ids: Vec<String>,
    pub(crate) ind_geno_sites: Vec<u32>,
    pub(crate) rg_stats: Vec<GroupStats>,
    pub(crate) sm_stats: GroupStats,
    pub(crate) marker_count: u32,
    pub(crate) ibd_values: Vec<f64>,
    pub(crate) mix_values: Vec<f64>,
    pub(crate) hom_values: Vec<f64>,
}

impl VerifySummary {
    /// Returns whether per-sample (`.bestSM`/`.selfSM`) reports apply: all read groups
    /// declare the same sample.
    pub fn same_sample(&self) -> bool {
        self.same_sample
    }
}

struct RunState {
    reader: AlignmentReader,
    chromosome: Option<String>,
}

struct Accumulators {
    rg_ids: Vec<String>,
    rg_samples: Vec<String>,
    rg_index: HashMap<String, usize>,
    bam_sample: String,
    same_sample: bool,
    candidate_ids: Vec<String>,
    self_index: Option<usize>,
    candidate_count: usize,
    ind_geno_sites: Vec<u32>,
    rg_stats: Vec<GroupStats>,
    sm_stats: GroupStats,
    marker_count: u32,
}

/// The identity verifier.
pub struct Verifier {
    options: VerifyOptions,
    phred_to_error: [f64; MAX_Q + 1],
}

impl Verifier {
    /// Creates a verifier.
    pub fn new(options: VerifyOptions) -> Self {
        let phred_to_error = phred_to_error_table(options.max_q);

        Self {
            options,
            phred_to_error,
        }
    }

    /// Returns the settings.
    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Runs the verification: per panel site, reads the 1-bp section of the BAM, accumulates
    /// the model likelihoods, and returns the per-read-group and per-sample summary.
    pub fn run(
        &self,
        input: &BamInput,
        panel: &mut Panel,
        genome: &Genome,
    ) -> Result<VerifySummary> {
        let mut state: Option<RunState> = None;
        let mut accumulators: Option<Accumulators> = None;
        let mut record = Record::new();

        while let Some(mut site) = panel.next_site().map_err(Error::Io)? {
            let chromosome = site.chromosome_name(false);

            self.ensure_open(input, &chromosome, &mut state, &accumulators)?;
            let state = state.as_mut().unwrap();

            if accumulators.is_none() {
                accumulators = Some(self.initialize(state.reader.header().unwrap(), panel)?);
            }
            let acc = accumulators.as_mut().unwrap();

            acc.marker_count += 1;

            if acc.marker_count % 1000 == 0 {
                info!("processing marker {}", acc.marker_count);
            }

            let lookup_name = site.chromosome_name(self.options.ucsc);

            if site.position == 0 {
                warn!("skipping marker {}: position is not 1-based", site.id);
                continue;
            }

            // Align the site to the reference: a1 must be the reference base.
            let Some(ref_base) = genome.base(&lookup_name, site.position - 1) else {
                warn!(
                    "skipping marker {} at {}:{}: no reference base",
                    site.id, lookup_name, site.position
                );
                continue;
            };

            if ref_base == site.a2.to_ascii_uppercase() {
                site.flip_alleles();
            } else if ref_base != site.a1.to_ascii_uppercase() {
                warn!(
                    "skipping marker {} at {}:{}: alleles {}/{} do not match reference base {}",
                    site.id,
                    lookup_name,
                    site.position,
                    site.a1 as char,
                    site.a2 as char,
                    ref_base as char
                );
                continue;
            }

            let Some(alt_af) = self.alternate_allele_frequency(&site) else {
                continue;
            };

            let header = state.reader.header().unwrap();
            let Some(reference_sequence_id) = header.reference_id(&lookup_name) else {
                continue;
            };

            let observations = self.collect_bases(
                &mut state.reader,
                reference_sequence_id as i32,
                site.position,
                acc,
                &mut record,
            )?;

            self.process_site(acc, &site, alt_af, &observations);
        }

        let acc = accumulators.ok_or_else(|| {
            Error::Parse(String::from("the panel contains no usable markers"))
        })?;

        Ok(VerifySummary {
            rg_ids: acc.rg_ids,
            rg_samples: acc.rg_samples,
            bam_sample: acc.bam_sample,
            same_sample: acc.same_sample,
            candidate_ids: acc.candidate_ids,
            ind_geno_sites: acc.ind_geno_sites,
            rg_stats: acc.rg_stats,
            sm_stats: acc.sm_stats,
            marker_count: acc.marker_count,
            ibd_values: self.options.ibd_values.clone(),
            mix_values: self.options.mix_values.clone(),
            hom_values: self.options.hom_values.clone(),
        })
    }

    fn ensure_open(
        &self,
        input: &BamInput,
        chromosome: &str,
        state: &mut Option<RunState>,
        accumulators: &Option<Accumulators>,
    ) -> Result<()> {
        match input {
            BamInput::Single { path, index } => {
                if state.is_none() {
                    let reader = self.open_bam(path, index.as_deref())?;
                    *state = Some(RunState {
                        reader,
                        chromosome: None,
                    });
                }

                Ok(())
            }
            BamInput::PerChromosome { prefix, suffix } => {
                if let Some(open) = state {
                    if open.chromosome.as_deref() == Some(chromosome) {
                        return Ok(());
                    }
                }

                let path = PathBuf::from(format!("{}{}{}", prefix, chromosome, suffix));
                info!("opening {}", path.display());

                let reader = self.open_bam(&path, None)?;

                if let Some(acc) = accumulators {
                    let (rg_ids, rg_samples) = read_groups_of(reader.header().unwrap());

                    if rg_ids != acc.rg_ids || rg_samples != acc.rg_samples {
                        return Err(Error::Parse(format!(
                            "read groups of {} differ from the first input",
                            path.display()
                        )));
                    }
                }

                *state = Some(RunState {
                    reader,
                    chromosome: Some(chromosome.to_string()),
                });

                Ok(())
            }
        }
    }

    fn open_bam(&self, path: &Path, index: Option<&Path>) -> Result<AlignmentReader> {
        let mut reader = AlignmentReader::open(path)?;
        reader.read_header()?;
        reader.read_bam_index(index)?;

        let header = reader.header().unwrap();
        let chr_in_sq = header
            .reference_sequences()
            .any(|(name, _)| name.starts_with("chr"));

        if chr_in_sq != self.options.ucsc {
            warn!(
                "'chr' sequence names {} observed in {} but UCSC naming is {}; \
toggle the naming option if no data comes back",
                if chr_in_sq { "are" } else { "are not" },
                path.display(),
                if self.options.ucsc { "on" } else { "off" },
            );
        }

        Ok(reader)
    }

    fn initialize(&self, header: &bamid_sam::Header, panel: &Panel) -> Result<Accumulators> {
        let (rg_ids, rg_samples) = read_groups_of(header);

        if rg_ids.is_empty() {
            return Err(Error::Parse(String::from(
                "the input declares no read groups",
            )));
        }

        let mut rg_index = HashMap::new();
        for (i, id) in rg_ids.iter().enumerate() {
            rg_index.insert(id.clone(), i);
        }

        let bam_sample = rg_samples.first().cloned().unwrap_or_default();
        let same_sample = rg_samples.iter().all(|s| *s == bam_sample);

        if bam_sample.is_empty() {
            warn!("the first read group declares no SM tag");
        }

        info!("identified {} read groups", rg_ids.len());

        let (candidate_ids, self_index) = if self.options.self_only {
            if !same_sample {
                return Err(Error::Parse(String::from(
                    "self-only comparison requires a single-sample input",
                )));
            }

            let matches: Vec<usize> = panel
                .individuals()
                .iter()
                .enumerate()
                .filter(|(_, ind)| ind.individual_id == bam_sample)
                .map(|(i, _)| i)
                .collect();

            match matches.as_slice() {
                [] => {
                    warn!(
                        "sample {} not found in the panel; skipping genotype comparison",
                        bam_sample
                    );
                    (Vec::new(), None)
                }
                [i] => (vec![bam_sample.clone()], Some(*i)),
                _ => {
                    return Err(Error::Parse(format!(
                        "multiple panel individuals match sample {}",
                        bam_sample
                    )));
                }
            }
        } else {
            let ids = panel
                .individuals()
                .iter()
                .map(|ind| ind.individual_id.clone())
                .collect();
            (ids, None)
        };

        let candidate_count = candidate_ids.len();
        let ibd_count = self.options.ibd_values.len();
        let axis_len = self.options.hom_values.len() + self.options.mix_values.len() - 1;

        let rg_stats = vec![GroupStats::new(candidate_count, ibd_count, axis_len); rg_ids.len()];

        Ok(Accumulators {
            rg_ids,
            rg_samples,
            rg_index,
            bam_sample,
            same_sample,
            candidate_ids,
            self_index,
            candidate_count,
            ind_geno_sites: vec![0; candidate_count * 3],
            rg_stats,
            sm_stats: GroupStats::new(candidate_count, ibd_count, axis_len),
            marker_count: 0,
        })
    }

    // The alternate (non-reference) allele frequency of an allele-aligned site, or `None`
    // when it falls outside the configured bounds.
    fn alternate_allele_frequency(&self, site: &Site) -> Option<f64> {
        let mut alt_af = if self.options.use_panel_af {
            match site.allele_frequency {
                Some(af) if 1.0 - af > 0.0 => 1.0 - af,
                // A missing frequency defaults to the genotype error rate, never zero.
                _ => self.options.genotype_error,
            }
        } else {
            let mut called = 0u64;
            let mut dosage_sum = 0u64;

            for genotype in &site.genotypes {
                if let Some(dosage) = genotype.dosage() {
                    called += 1;
                    dosage_sum += u64::from(dosage);
                }
            }

            if called == 0 {
                0.0
            } else {
                dosage_sum as f64 / (2.0 * called as f64)
            }
        };

        if alt_af < self.options.min_af || alt_af > 1.0 - self.options.min_af {
            return None;
        }

        alt_af = alt_af.clamp(
            self.options.genotype_error,
            1.0 - self.options.genotype_error,
        );

        Some(alt_af)
    }

    // Reads the 1-bp section at the (1-based) site position, returning the usable
    // `(read group, base, capped quality)` observations.
    fn collect_bases(
        &self,
        reader: &mut AlignmentReader,
        reference_sequence_id: i32,
        position: u32,
        acc: &Accumulators,
        record: &mut Record,
    ) -> Result<Vec<(usize, u8, u8)>> {
        let target = position as i32 - 1;

        reader.set_read_section(reference_sequence_id, target, target + 1)?;

        let mut observations = Vec::new();

        while reader.read_record(record)? {
            if record.mapping_quality() < self.options.min_map_q {
                continue;
            }

            let flags = record.flags();

            if !self.options.include_flags.is_empty()
                && !flags.contains(self.options.include_flags)
            {
                continue;
            }

            if flags.intersects(self.options.exclude_flags) {
                continue;
            }

            let rg = record
                .data()
                .get(*b"RG")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    Error::Invalid(format!(
                        "record {} carries no RG tag",
                        record.read_name()
                    ))
                })?;

            let rg = rg.to_str_lossy();
            let Some(&rg_idx) = acc.rg_index.get(rg.as_ref()) else {
                return Err(Error::Invalid(format!("unknown read group: {}", rg)));
            };

            let query_index = record
                .cigar()
                .query_index_at(target, record.position());

            if query_index < 0 {
                continue;
            }

            let Some(base) = record.sequence().get(query_index as usize) else {
                continue;
            };
            let Some(quality) = record.quality_scores().get(query_index as usize) else {
                continue;
            };

            let base = base.to_ascii_uppercase();

            if quality >= self.options.min_q && base != b'N' {
                observations.push((rg_idx, base, quality));
            }
        }

        Ok(observations)
    }

    fn process_site(
        &self,
        acc: &mut Accumulators,
        site: &Site,
        alt_af: f64,
        observations: &[(usize, u8, u8)],
    ) {
        let opts = &self.options;

        // The candidate genotype column: the self individual's call when pinned, otherwise
        // the whole panel column.
        let self_index = acc.self_index;
        let genotypes = &site.genotypes;
        let candidate_genotype = move |j: usize| -> Genotype {
            match self_index {
                Some(i) => genotypes[i],
                None => genotypes[j],
            }
        };

        for j in 0..acc.candidate_count {
            if let Some(g) = candidate_genotype(j).index() {
                acc.ind_geno_sites[j * 3 + g] += 1;
            }
        }

        if observations.len() > opts.max_depth {
            info!(
                "skipping marker {} at {}:{}: depth {} exceeds the maximum",
                site.id,
                site.chrom,
                site.position,
                observations.len()
            );
            return;
        }

        let n_rgs = acc.rg_stats.len();
        let prior_het = 2.0 * alt_af * (1.0 - alt_af);

        let mut rg_geno_llks = vec![GenotypeLikelihoods::new(opts.precise); n_rgs];
        let mut sm_geno_llks = GenotypeLikelihoods::new(opts.precise);
        let mut rg_site_bases = vec![0u32; n_rgs];

        for &(rg_idx, base, quality) in observations {
            let base_error = self.phred_to_error[usize::from(quality).min(MAX_Q)];
            let matches_a1 = base == site.a1.to_ascii_uppercase();
            let matches_a2 = base == site.a2.to_ascii_uppercase();

            let contributions =
                GenotypeLikelihoods::base_contributions(matches_a1, matches_a2, base_error);

            rg_geno_llks[rg_idx].observe(contributions);
            sm_geno_llks.observe(contributions);

            rg_site_bases[rg_idx] += 1;
            acc.sm_stats.base_count += 1;

            for j in 0..acc.candidate_count {
                let Some(g) = candidate_genotype(j).index() else {
                    continue;
                };

                let slot = j * 3 + g;

                acc.rg_stats[rg_idx].ind_geno_bases[slot] += 1;
                acc.sm_stats.ind_geno_bases[slot] += 1;

                if matches_a1 {
                    acc.rg_stats[rg_idx].ind_geno_refs[slot] += 1;
                    acc.sm_stats.ind_geno_refs[slot] += 1;
                } else if matches_a2 {
                    acc.rg_stats[rg_idx].ind_geno_alts[slot] += 1;
                    acc.sm_stats.ind_geno_alts[slot] += 1;
                }
            }
        }

        for (rg_idx, stats) in acc.rg_stats.iter_mut().enumerate() {
            if rg_site_bases[rg_idx] > 0 {
                stats.site_count += 1;
                stats.base_count += rg_site_bases[rg_idx];
                stats.sum_prior_het += prior_het;
                stats.sum_posterior_het += rg_geno_llks[rg_idx].posterior_het(alt_af);
            }
        }

        acc.sm_stats.site_count += 1;
        acc.sm_stats.sum_prior_het += prior_het;
        acc.sm_stats.sum_posterior_het += sm_geno_llks.posterior_het(alt_af);

        // Identity model: per read group and per sample, one grid row per candidate.
        let ibd_count = opts.ibd_values.len();

        for (rg_idx, stats) in acc.rg_stats.iter_mut().enumerate() {
            for j in 0..acc.candidate_count {
                let sums = &mut stats.sum_ind_llks[j * ibd_count..(j + 1) * ibd_count];
                rg_geno_llks[rg_idx].add_ibd_contributions(
                    candidate_genotype(j).index(),
                    alt_af,
                    opts.genotype_error,
                    &opts.ibd_values,
                    sums,
                );
            }
        }

        for j in 0..acc.candidate_count {
            let sums = &mut acc.sm_stats.sum_ind_llks[j * ibd_count..(j + 1) * ibd_count];
            sm_geno_llks.add_ibd_contributions(
                candidate_genotype(j).index(),
                alt_af,
                opts.genotype_error,
                &opts.ibd_values,
                sums,
            );
        }

        // Mixture/bottleneck model over the folded (%HOM descending, 0, %MIX ascending) axis.
        let hom_count = opts.hom_values.len() as i32;
        let mix_count = opts.mix_values.len() as i32;

        for l in (1 - hom_count)..mix_count {
            let h = if l < 0 { (-l) as usize } else { 0 };
            let j = if l > 0 { l as usize } else { 0 };
            let lu = (l + hom_count - 1) as usize;

            let alpha = opts.mix_values[j];
            let beta = opts.hom_values[h];
            let genotype_priors = bottleneck_genotype_priors(alt_af, beta);

            let mut sm_mix = MixtureLikelihoods::new(opts.precise);
            let mut rg_mix = vec![MixtureLikelihoods::new(opts.precise); n_rgs];

            for &(rg_idx, base, quality) in observations {
                let base_error = self.phred_to_error[usize::from(quality).min(MAX_Q)];
                let matches_a1 = base == site.a1.to_ascii_uppercase();
                let matches_a2 = base == site.a2.to_ascii_uppercase();

                let lks = mixture_base_likelihoods(matches_a1, matches_a2, base_error, alpha);

                sm_mix.observe(lks);
                rg_mix[rg_idx].observe(lks);
            }

            acc.sm_stats.hom_mix_llks[lu] += sm_mix.log_site_likelihood(genotype_priors);

            for (rg_idx, stats) in acc.rg_stats.iter_mut().enumerate() {
                stats.hom_mix_llks[lu] += rg_mix[rg_idx].log_site_likelihood(genotype_priors);
            }
        }
    }
}

fn read_groups_of(header: &bamid_sam::Header) -> (Vec<String>, Vec<String>) {
    let mut ids = Vec::new();
    let mut samples = Vec::new();

    for (id, fields) in header.read_groups() {
        ids.push(id.to_string());
        samples.push(fields.get("SM").unwrap_or_default().to_string());
    }

    (ids, samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_values() {
        let ibd = grid_values(0.01, 1.0);
        assert_eq!(ibd.len(), 101);
        assert_eq!(ibd[0], 0.0);
        assert!((ibd[50] - 0.5).abs() < 1e-12);
        assert_eq!(*ibd.last().unwrap(), 1.0);

        let mix = grid_values(0.01, 0.5);
        assert_eq!(mix.len(), 51);
        assert_eq!(*mix.last().unwrap(), 0.5);

        let coarse = grid_values(0.3, 1.0);
        assert_eq!(coarse.len(), 5);
        assert_eq!(*coarse.last().unwrap(), 1.0);
    }

    #[test]
    fn test_default_exclude_flags() {
        let options = VerifyOptions::default();
        assert_eq!(u16::from(options.exclude_flags), 0x0704);
    }
}
