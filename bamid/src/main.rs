use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::{debug, info};

use bamid::panel::Panel;
use bamid::reference::Genome;
use bamid::verify::{self, BamInput, Verifier, VerifyOptions};

/// Verify sample identity and contamination in sequence alignment files.
#[derive(Parser)]
#[command(name = "bamid", version, about)]
struct Cli {
    /// Indexed reference FASTA
    #[arg(short = 'r', long)]
    reference: PathBuf,

    /// Input BAM file; must be sorted and indexed
    #[arg(short = 'i', long = "in", value_name = "BAM")]
    input: Option<PathBuf>,

    /// Prefix of per-chromosome BAM paths
    #[arg(short = 'p', long, conflicts_with = "input", requires = "insuffix")]
    inprefix: Option<String>,

    /// Suffix of per-chromosome BAM paths
    #[arg(short = 's', long, requires = "inprefix")]
    insuffix: Option<String>,

    /// BAM index; defaults to <in>.bai
    #[arg(short = 'I', long, requires = "input")]
    index: Option<PathBuf>,

    /// Prefix of output files
    #[arg(short = 'o', long)]
    out: String,

    /// Binary PLINK genotype file prefix (forward-stranded .fam/.bim/.bed)
    #[arg(short = 'b', long)]
    bfile: Option<String>,

    /// PLINK BIM file with allele frequencies in the last column (no genotypes)
    #[arg(short = 'B', long, conflicts_with = "bfile")]
    bimfile: Option<PathBuf>,

    /// VCF panel with GT genotypes
    #[arg(long, conflicts_with_all = ["bfile", "bimfile"])]
    vcf: Option<PathBuf>,

    /// Minimum Phred base quality; lower bases are ignored
    #[arg(short = 'q', long = "minQ", default_value_t = 20)]
    min_q: u8,

    /// Maximum Phred base quality; higher values are flattened down
    #[arg(short = 'Q', long = "maxQ", default_value_t = 40)]
    max_q: u8,

    /// Minimum mapping quality; lower records are ignored
    #[arg(short = 'm', long = "minMapQ", default_value_t = 10)]
    min_map_q: u8,

    /// Maximum per-site depth; deeper sites are skipped
    #[arg(short = 'd', long = "maxDepth", default_value_t = 20)]
    max_depth: usize,

    /// Error rate assumed in the genotype data
    #[arg(short = 'g', long = "genoError", default_value_t = 5e-3)]
    geno_error: f64,

    /// Minimum allele frequency; rarer markers are ignored
    #[arg(short = 'f', long = "minAF", default_value_t = 5e-3)]
    min_af: f64,

    /// Unit of the % mixture grid
    #[arg(long = "mixUnit", default_value_t = 0.01)]
    mix_unit: f64,

    /// Unit of the % excess homozygosity grid
    #[arg(long = "homUnit", default_value_t = 0.01)]
    hom_unit: f64,

    /// Unit of the IBD grid
    #[arg(long = "ibdUnit", default_value_t = 0.01)]
    ibd_unit: f64,

    /// Comma-separated explicit % mixture values
    #[arg(long = "mixValues")]
    mix_values: Option<String>,

    /// Comma-separated explicit % excess homozygosity values
    #[arg(long = "homValues")]
    hom_values: Option<String>,

    /// Comma-separated explicit IBD values
    #[arg(long = "ibdValues")]
    ibd_values: Option<String>,

    /// Compare genotypes against the annotated sample only
    #[arg(short = 'S', long)]
    selfonly: bool,

    /// Use the allele frequencies loaded from the marker file
    #[arg(short = 'F', long = "bimAF")]
    bim_af: bool,

    /// Use UCSC-style sequence names with a 'chr' prefix
    #[arg(short = 'u', long)]
    ucsc: bool,

    /// Carry per-site products in log space (recommended beyond ~100x depth)
    #[arg(long)]
    precise: bool,

    /// Do not check the BGZF end-of-file marker
    #[arg(short = 'n', long)]
    noeof: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_values(raw: &str) -> anyhow::Result<Vec<f64>> {
    raw.split([',', ' '])
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse()
                .with_context(|| format!("invalid grid value: {}", t))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" },
    ))
    .init();

    if cli.noeof {
        // The BGZF layer tolerates a missing end-of-file marker as it is.
        debug!("end-of-file marker checking is not enforced");
    }

    let input = match (&cli.input, &cli.inprefix, &cli.insuffix) {
        (Some(path), None, _) => BamInput::Single {
            path: path.clone(),
            index: cli.index.clone(),
        },
        (None, Some(prefix), Some(suffix)) => BamInput::PerChromosome {
            prefix: prefix.clone(),
            suffix: suffix.clone(),
        },
        _ => bail!("either --in or --inprefix and --insuffix are required"),
    };

    let (mut panel, bim_af) = if let Some(prefix) = &cli.bfile {
        let markers = if cli.bim_af {
            format!("{}.bimp", prefix)
        } else {
            format!("{}.bim", prefix)
        };

        let panel = Panel::open_plink(
            PathBuf::from(format!("{}.fam", prefix)),
            PathBuf::from(markers),
            PathBuf::from(format!("{}.bed", prefix)),
        )
        .with_context(|| format!("failed to open PLINK panel {}", prefix))?;

        (panel, cli.bim_af)
    } else if let Some(path) = &cli.bimfile {
        let panel = Panel::open_markers_only(path)
            .with_context(|| format!("failed to open marker file {}", path.display()))?;

        // Without genotypes, the marker allele frequencies are all there is.
        (panel, true)
    } else if let Some(path) = &cli.vcf {
        let panel = Panel::open_vcf(path)
            .with_context(|| format!("failed to open VCF panel {}", path.display()))?;

        (panel, cli.bim_af)
    } else {
        bail!("one of --bfile, --bimfile, or --vcf is required");
    };

    if bim_af && !panel.has_allele_frequencies() {
        bail!(
            "allele frequencies are required but none are present; the marker file should \
carry a nonzero frequency column"
        );
    }

    info!(
        "panel: {} individuals, {} markers",
        panel.individuals().len(),
        panel
            .marker_count()
            .map(|n| n.to_string())
            .unwrap_or_else(|| String::from("streaming")),
    );

    let genome = Genome::open(&cli.reference)
        .with_context(|| format!("failed to open reference {}", cli.reference.display()))?;

    let mut options = VerifyOptions {
        min_q: cli.min_q,
        max_q: cli.max_q,
        min_map_q: cli.min_map_q,
        max_depth: cli.max_depth,
        genotype_error: cli.geno_error,
        min_af: cli.min_af,
        self_only: cli.selfonly,
        use_panel_af: bim_af,
        ucsc: cli.ucsc,
        precise: cli.precise,
        ibd_values: verify::grid_values(cli.ibd_unit, 1.0),
        mix_values: verify::grid_values(cli.mix_unit, 0.5),
        hom_values: verify::grid_values(cli.hom_unit, 1.0),
        ..VerifyOptions::default()
    };

    if let Some(raw) = &cli.ibd_values {
        options.ibd_values = parse_values(raw)?;
    }
    if let Some(raw) = &cli.mix_values {
        options.mix_values = parse_values(raw)?;
    }
    if let Some(raw) = &cli.hom_values {
        options.hom_values = parse_values(raw)?;
    }

    info!(
        "grid sizes: {} IBD, {} %MIX, {} %HOM",
        options.ibd_values.len(),
        options.mix_values.len(),
        options.hom_values.len()
    );

    let verifier = Verifier::new(options);
    let summary = verifier
        .run(&input, &mut panel, &genome)
        .context("verification failed")?;

    verify::write_reports(&cli.out, &summary).context("failed to write report tables")?;

    Ok(())
}
