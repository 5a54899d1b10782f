use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;

use taxprofile_rs::accession::{build_accession_index, AccessionScanOptions};
use taxprofile_rs::classify::{MergeOptions, ShardOptions};
use taxprofile_rs::gene_index_builder::GeneIndexBuildOptions;
use taxprofile_rs::mapping::{AccessionIdTable, MappingContext};
use taxprofile_rs::oracles::ReferenceAccessor;
use taxprofile_rs::references::FastaReferences;
use taxprofile_rs::taxdb::ReferenceTaxa;
use taxprofile_rs::{build_gene_index_file, profile_reads, ProfileInputs, ProfileSettings, Result};

/// Taxonomic and functional profiling of read alignments.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Build a binary gene index from reference annotations
    BuildGenes {
        /// Reference FASTA (optionally gzipped)
        #[clap(short = 'r', long, value_parser)]
        references: PathBuf,

        /// Annotation table: accession, location, protein id, product
        #[clap(short = 'a', long, value_parser)]
        annotations: PathBuf,

        /// Output gene index
        #[clap(short = 'o', long, value_parser)]
        output: PathBuf,

        /// Protein accession to KEGG id table
        #[clap(long, value_parser)]
        kegg: Option<PathBuf>,

        /// Protein accession to COG id table
        #[clap(long, value_parser)]
        cog: Option<PathBuf>,

        /// Protein accession to SEED id table
        #[clap(long, value_parser)]
        seed: Option<PathBuf>,

        /// Protein accession to InterPro id table
        #[clap(long, value_parser)]
        interpro: Option<PathBuf>,

        /// Number of worker threads
        #[clap(short = 't', long, value_parser)]
        threads: Option<NonZeroUsize>,
    },
    /// Assign reads to taxa and write the organism report
    Profile {
        /// Reference FASTA (optionally gzipped)
        #[clap(short = 'r', long, value_parser)]
        references: PathBuf,

        /// Taxonomy database
        #[clap(short = 'd', long, value_parser)]
        taxdb: PathBuf,

        /// Reference accession to taxon id table
        #[clap(short = 'x', long, value_parser)]
        reference_taxa: PathBuf,

        /// Gene index written by build-genes
        #[clap(short = 'g', long, value_parser)]
        genes: Option<PathBuf>,

        /// Tab-separated matches, grouped by read
        #[clap(short = 'm', long, value_parser)]
        matches: PathBuf,

        /// Output report
        #[clap(short = 'o', long, value_parser)]
        output: PathBuf,

        /// Optional per-read assignment output
        #[clap(long, value_parser)]
        assignments: Option<PathBuf>,

        /// Ignore matches scoring more than this percentage below a read's best match
        #[clap(long, value_parser, default_value_t = ShardOptions::default().top_percent)]
        top_percent: f64,

        /// Fraction of a read's weight its final taxon must cover
        #[clap(long, value_parser, default_value_t = MergeOptions::default().min_support_proportion)]
        min_support: f64,

        /// Number of shards and worker threads
        #[clap(short = 't', long, value_parser)]
        threads: Option<NonZeroUsize>,
    },
    /// Append taxon ids to reference FASTA headers
    TagRefs {
        /// Reference FASTA (optionally gzipped)
        #[clap(short = 'r', long, value_parser)]
        references: PathBuf,

        /// Reference accession to taxon id table
        #[clap(short = 'x', long, value_parser)]
        reference_taxa: PathBuf,

        /// Output FASTA
        #[clap(short = 'o', long, value_parser)]
        output: PathBuf,
    },
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg.to_string());
    spinner
}

fn mapping_context(
    kegg: Option<PathBuf>,
    cog: Option<PathBuf>,
    seed: Option<PathBuf>,
    interpro: Option<PathBuf>,
) -> Result<MappingContext> {
    let mut mapping = MappingContext::new();
    if let Some(path) = kegg {
        mapping = mapping.with_kegg(AccessionIdTable::load(path)?);
    }
    if let Some(path) = cog {
        mapping = mapping.with_cog(AccessionIdTable::load(path)?);
    }
    if let Some(path) = seed {
        mapping = mapping.with_seed(AccessionIdTable::load(path)?);
    }
    if let Some(path) = interpro {
        mapping = mapping.with_interpro(AccessionIdTable::load(path)?);
    }
    Ok(mapping)
}

fn run(args: Args) -> Result<()> {
    match args {
        Args::BuildGenes {
            references,
            annotations,
            output,
            kegg,
            cog,
            seed,
            interpro,
            threads,
        } => {
            let mapping = mapping_context(kegg, cog, seed, interpro)?;
            let mut scan = AccessionScanOptions::default();
            let mut options = GeneIndexBuildOptions::default();
            if let Some(n) = threads {
                scan.threads = n.get();
                options.threads = n.get();
            }

            let bar = spinner("green", "Building gene index...");
            let summary = build_gene_index_file(references, annotations, output, &mapping, &scan, &options)?;
            bar.finish_with_message(format!(
                "Gene index written: {} lines parsed, {} skipped, {} genes indexed, {} dropped.",
                summary.lines_parsed, summary.lines_skipped, summary.intervals_inserted, summary.intervals_dropped
            ));
        }
        Args::Profile {
            references,
            taxdb,
            reference_taxa,
            genes,
            matches,
            output,
            assignments,
            top_percent,
            min_support,
            threads,
        } => {
            let mut settings = ProfileSettings::default();
            settings.shard.top_percent = top_percent;
            settings.merge.min_support_proportion = min_support;
            if let Some(n) = threads {
                settings.shards = n.get();
                settings.scan.threads = n.get();
                settings.merge.threads = Some(n.get());
            }
            let inputs = ProfileInputs {
                references,
                taxdb,
                reference_taxa,
                gene_index: genes,
                matches,
            };

            let bar = spinner("blue", "Profiling reads...");
            let results = profile_reads(&inputs, &settings)?;
            bar.finish_with_message(format!(
                "Profiled {} reads, {} assigned to {} taxa.",
                results.profile.total_reads,
                results.profile.assigned_reads,
                results.report.rows.len()
            ));

            let bar = spinner("yellow", "Writing report...");
            fs::write(&output, results.get_report())?;
            if let Some(path) = &assignments {
                fs::write(path, results.get_read_assignments())?;
            }
            bar.finish_with_message(format!("Report written to {}.", output.display()));
        }
        Args::TagRefs {
            references,
            reference_taxa,
            output,
        } => {
            let bar = spinner("cyan", "Tagging reference headers...");
            let mut refs = FastaReferences::load(&references)?;
            let accessions = build_accession_index(&refs, &AccessionScanOptions::default())?;
            let taxa = ReferenceTaxa::load(&reference_taxa, refs.num_references(), |a| accessions.get(a))?;
            let tagged = taxa.tag_headers(&mut refs);
            refs.save(&output)?;
            bar.finish_with_message(format!("Tagged {} of {} references.", tagged, refs.num_references()));
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()) {
        log::error!("{e}");
        process::exit(1);
    }
}
