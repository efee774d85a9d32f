//! Tab-separated report tables: `<out>.{bestRG, selfRG, bestSM, selfSM}`.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use log::info;

use super::{GroupStats, VerifySummary};

const BEST_COLUMNS: &str = "SEQ_SM\tRG\tBEST_SM\tBESTIBD\tBESTIBDLLK\tBESTIBDLLK-\t\
#GENOS\t#BASES\t%GENREF\t%GENHET\t%GENALT\tDPREF\tRDPHET\tRDPALT\t\
REF-A1%\tREF-A2%\tHET-A1%\tHET-A2%\tALT-A1%\tALT-A2%\t\
#DP\t%HETAF\t%HETSEQ\tEXHET\t%MIX\t%HOM\tBESTHOMMIXLLK\tBESTHOMMIXLLK-";

const SELF_COLUMNS: &str = "SEQ_SM\tRG\tSELF_SM\tSELFIBD\tSELFIBDLLK\tSELFIBDLLK-\t\
#GENOS\t#BASES\t%GENREF\t%GENHET\t%GENALT\tDPREF\tRDPHET\tRDPALT\t\
REF-A1%\tREF-A2%\tHET-A1%\tHET-A2%\tALT-A1%\tALT-A2%\t\
#DP\t%HETAF\t%HETSEQ\tEXHET\t%MIX\t%HOM\tBESTHOMMIXLLK\tBESTHOMMIXLLK-";

/// Writes the per-read-group and, when all read groups share one sample, per-sample report
/// tables under the given output prefix.
pub fn write_reports(prefix: &str, summary: &VerifySummary) -> io::Result<()> {
    let has_candidates = !summary.candidate_ids.is_empty();

    log_grid(summary);

    if has_candidates {
        let mut best = table(prefix, "bestRG", BEST_COLUMNS)?;

        for i in 0..summary.rg_ids.len() {
            write_best_row(
                &mut best,
                summary,
                &summary.rg_stats[i],
                &summary.rg_samples[i],
                &summary.rg_ids[i],
            )?;
        }

        best.flush()?;
    }

    let mut self_table = table(prefix, "selfRG", SELF_COLUMNS)?;

    for i in 0..summary.rg_ids.len() {
        write_self_row(
            &mut self_table,
            summary,
            &summary.rg_stats[i],
            &summary.rg_samples[i],
            &summary.rg_ids[i],
        )?;
    }

    self_table.flush()?;

    if summary.same_sample {
        if has_candidates {
            let mut best = table(prefix, "bestSM", BEST_COLUMNS)?;
            write_best_row(
                &mut best,
                summary,
                &summary.sm_stats,
                &summary.bam_sample,
                "N/A",
            )?;
            best.flush()?;
        }

        let mut self_table = table(prefix, "selfSM", SELF_COLUMNS)?;
        write_self_row(
            &mut self_table,
            summary,
            &summary.sm_stats,
            &summary.bam_sample,
            "N/A",
        )?;
        self_table.flush()?;
    }

    info!(
        "finished writing output files {}.{{bestRG,selfRG,bestSM,selfSM}}",
        prefix
    );

    Ok(())
}

fn table(prefix: &str, extension: &str, columns: &str) -> io::Result<BufWriter<File>> {
    let mut writer = File::create(format!("{}.{}", prefix, extension)).map(BufWriter::new)?;
    writeln!(writer, "{}", columns)?;
    Ok(writer)
}

// The folded (%HOM descending, 0, %MIX ascending) axis used by the grid scans.
fn hom_mix_axis(summary: &VerifySummary) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
    let hom_count = summary.hom_values.len() as i32;
    let mix_count = summary.mix_values.len() as i32;

    ((1 - hom_count)..mix_count).map(move |l| {
        let h = if l < 0 { (-l) as usize } else { 0 };
        let j = if l > 0 { l as usize } else { 0 };
        let lu = (l + hom_count - 1) as usize;

        (lu, summary.mix_values[j], summary.hom_values[h])
    })
}

fn log_grid(summary: &VerifySummary) {
    info!("per-group mixture grid (group, %HOM, %MIX, LLK):");

    for (i, id) in summary.rg_ids.iter().enumerate() {
        for (lu, mix, hom) in hom_mix_axis(summary) {
            info!(
                "{}\t{:.3}\t{:.3}\t{:.3e}",
                id, hom, mix, summary.rg_stats[i].hom_mix_llks[lu]
            );
        }
    }

    if summary.same_sample {
        for (lu, mix, hom) in hom_mix_axis(summary) {
            info!(
                "{}\t{:.3}\t{:.3}\t{:.3e}",
                summary.bam_sample, hom, mix, summary.sm_stats.hom_mix_llks[lu]
            );
        }
    }
}

struct IbdBest {
    candidate: usize,
    ibd: f64,
    llk: f64,
}

fn best_over_candidates(summary: &VerifySummary, stats: &GroupStats) -> Option<IbdBest> {
    let ibd_count = summary.ibd_values.len();
    let mut best: Option<IbdBest> = None;

    for j in 0..summary.candidate_ids.len() {
        for (k, &ibd) in summary.ibd_values.iter().enumerate() {
            let llk = stats.sum_ind_llks[j * ibd_count + k];

            if best.as_ref().is_none_or(|b| llk > b.llk) {
                best = Some(IbdBest {
                    candidate: j,
                    ibd,
                    llk,
                });
            }
        }
    }

    best
}

fn best_for_candidate(summary: &VerifySummary, stats: &GroupStats, j: usize) -> (f64, f64) {
    let ibd_count = summary.ibd_values.len();
    let mut best = (f64::NEG_INFINITY, 0.0);

    for (k, &ibd) in summary.ibd_values.iter().enumerate() {
        let llk = stats.sum_ind_llks[j * ibd_count + k];

        if llk > best.0 {
            best = (llk, ibd);
        }
    }

    best
}

// The log likelihood at the full-identity grid point, the baseline the margins are taken
// against.
fn full_ibd_llk(summary: &VerifySummary, stats: &GroupStats, j: usize) -> f64 {
    let ibd_count = summary.ibd_values.len();
    stats.sum_ind_llks[j * ibd_count + ibd_count - 1]
}

fn best_hom_mix(summary: &VerifySummary, stats: &GroupStats) -> (f64, f64, f64, f64) {
    let mut best_llk = f64::NEG_INFINITY;
    let mut best_mix = 0.0;
    let mut best_hom = 0.0;

    for (lu, mix, hom) in hom_mix_axis(summary) {
        let llk = stats.hom_mix_llks[lu];

        if llk > best_llk {
            best_llk = llk;
            best_mix = mix;
            best_hom = hom;
        }
    }

    // The (0, 0) grid point sits at the end of the %HOM arm.
    let pure_llk = stats.hom_mix_llks[summary.hom_values.len() - 1];

    (best_llk, best_mix, best_hom, pure_llk)
}

fn candidate_match(summary: &VerifySummary, sample: &str) -> Option<usize> {
    summary.candidate_ids.iter().position(|id| id == sample)
}

fn write_best_row<W: Write>(
    out: &mut W,
    summary: &VerifySummary,
    stats: &GroupStats,
    sample: &str,
    rg: &str,
) -> io::Result<()> {
    let Some(best) = best_over_candidates(summary, stats) else {
        return Ok(());
    };
    let matched = candidate_match(summary, sample);

    write!(out, "{}\t{}", sample, rg)?;
    write!(
        out,
        "\t{}\t{:.3}\t{:.3e}",
        summary.candidate_ids[best.candidate], best.ibd, best.llk
    )?;

    match matched {
        Some(j) => write!(out, "\t{:.3e}", best.llk - full_ibd_llk(summary, stats, j))?,
        None => write!(out, "\tN/A")?,
    }

    write_genotype_columns(out, summary, stats, best.candidate)?;
    write_common_tail(out, summary, stats)?;

    writeln!(out)
}

fn write_self_row<W: Write>(
    out: &mut W,
    summary: &VerifySummary,
    stats: &GroupStats,
    sample: &str,
    rg: &str,
) -> io::Result<()> {
    let matched = candidate_match(summary, sample);

    write!(out, "{}\t{}", sample, rg)?;

    match matched {
        Some(j) => {
            let (llk, ibd) = best_for_candidate(summary, stats, j);
            write!(out, "\t{}\t{:.3}\t{:.3e}", sample, ibd, llk)?;
            write!(out, "\t{:.3e}", llk - full_ibd_llk(summary, stats, j))?;
            write_genotype_columns(out, summary, stats, j)?;
        }
        None => {
            write!(out, "\tN/A\tN/A\tN/A\tN/A")?;
            write!(out, "\t{}\t{}", stats.site_count, stats.base_count)?;
            for _ in 0..12 {
                write!(out, "\tN/A")?;
            }
        }
    }

    write_common_tail(out, summary, stats)?;

    writeln!(out)
}

// #GENOS #BASES %GEN* DPREF RDPHET RDPALT and the per-genotype allele fractions, all for
// one candidate individual.
fn write_genotype_columns<W: Write>(
    out: &mut W,
    summary: &VerifySummary,
    stats: &GroupStats,
    j: usize,
) -> io::Result<()> {
    let sites = &summary.ind_geno_sites[j * 3..j * 3 + 3];
    let bases = &stats.ind_geno_bases[j * 3..j * 3 + 3];
    let refs = &stats.ind_geno_refs[j * 3..j * 3 + 3];
    let alts = &stats.ind_geno_alts[j * 3..j * 3 + 3];

    let n_genos: u32 = sites.iter().sum();
    let n_bases: u32 = bases.iter().sum();

    write!(out, "\t{}\t{}", n_genos, n_bases)?;

    for g in 0..3 {
        write!(out, "\t{:.5}", f64::from(sites[g]) / f64::from(n_genos))?;
    }

    let depth = |g: usize| f64::from(bases[g]) / f64::from(sites[g]);
    let ref_depth = depth(0);

    write!(
        out,
        "\t{:.4}\t{:.5}\t{:.5}",
        ref_depth,
        depth(1) / ref_depth,
        depth(2) / ref_depth
    )?;

    for g in 0..3 {
        write!(
            out,
            "\t{:.5}\t{:.5}",
            f64::from(refs[g]) / f64::from(bases[g]),
            f64::from(alts[g]) / f64::from(bases[g])
        )?;
    }

    Ok(())
}

// #DP %HETAF %HETSEQ EXHET %MIX %HOM BESTHOMMIXLLK BESTHOMMIXLLK-
fn write_common_tail<W: Write>(
    out: &mut W,
    summary: &VerifySummary,
    stats: &GroupStats,
) -> io::Result<()> {
    let depth = f64::from(stats.base_count) / f64::from(summary.marker_count);
    let het_af = stats.sum_prior_het / f64::from(stats.site_count);
    let het_seq = stats.sum_posterior_het / f64::from(stats.site_count);

    write!(
        out,
        "\t{:.3}\t{:.5}\t{:.5}\t{:.5}",
        depth,
        het_af,
        het_seq,
        het_seq / het_af
    )?;

    let (best_llk, best_mix, best_hom, pure_llk) = best_hom_mix(summary, stats);

    write!(
        out,
        "\t{:.3}\t{:.3}\t{:.3e}\t{:.3e}",
        best_mix,
        best_hom,
        best_llk,
        best_llk - pure_llk
    )
}
