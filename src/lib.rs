// src/lib.rs
pub mod accession;
pub mod classify;
pub mod error;
pub mod gene_index;
pub mod gene_index_builder;
pub mod interval_tree;
pub mod location;
pub mod mapping;
pub mod matches;
pub mod oracles;
pub mod reader;
pub mod references;
pub mod report;
pub mod taxdb;
pub mod types;
pub mod workers;

use std::path::{Path, PathBuf};

pub use crate::error::{ProfileError, Result};

use crate::accession::{build_accession_index, AccessionScanOptions};
use crate::classify::{classify_in_shards, MergeOptions, MergedProfile, ProfileMerger, ShardOptions};
use crate::gene_index::GeneAnnotationIndex;
use crate::gene_index_builder::{build_gene_index, GeneIndexBuildOptions, GeneIndexBuildSummary};
use crate::mapping::MappingContext;
use crate::matches::{read_match_groups, MatchReadSummary};
use crate::oracles::ReferenceAccessor;
use crate::reader::open_reader;
use crate::references::FastaReferences;
use crate::report::ProfileReport;
use crate::taxdb::{ReferenceTaxa, Taxonomy};

/// Input files of one profiling run.
#[derive(Debug, Clone)]
pub struct ProfileInputs {
    pub references: PathBuf,
    pub taxdb: PathBuf,
    /// `accession\ttaxid` lines.
    pub reference_taxa: PathBuf,
    /// Gene index written by `build_gene_index_file`; reads get no genes without it.
    pub gene_index: Option<PathBuf>,
    pub matches: PathBuf,
}

/// Tunables of one profiling run.
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub shards: usize,
    pub scan: AccessionScanOptions,
    pub shard: ShardOptions,
    pub merge: MergeOptions,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        let scan = AccessionScanOptions::default();
        Self {
            shards: scan.threads,
            scan,
            shard: ShardOptions::default(),
            merge: MergeOptions::default(),
        }
    }
}

/// Structured results; text is generated on demand.
pub struct ProfileResults {
    pub profile: MergedProfile,
    pub report: ProfileReport,
    pub match_summary: MatchReadSummary,
}

impl ProfileResults {
    pub fn get_report(&self) -> String {
        self.report.to_tsv()
    }

    pub fn get_read_assignments(&self) -> String {
        self.report.read_assignments_tsv()
    }
}

/// Builds a gene index from a reference FASTA and an annotation table and saves it to `output`.
pub fn build_gene_index_file<P: AsRef<Path>>(
    references: P,
    annotations: P,
    output: P,
    mapping: &MappingContext,
    scan: &AccessionScanOptions,
    options: &GeneIndexBuildOptions,
) -> Result<GeneIndexBuildSummary> {
    let refs = FastaReferences::load(references.as_ref())?;
    let accessions = build_accession_index(&refs, scan)?;
    let source = open_reader(annotations.as_ref())?;

    let (index, summary) = build_gene_index(
        source,
        &accessions,
        refs.num_references(),
        mapping,
        options,
    )?;
    index.save(output.as_ref())?;
    Ok(summary)
}

/// Runs both classification passes over a match file and builds the organism report.
pub fn profile_reads(inputs: &ProfileInputs, settings: &ProfileSettings) -> Result<ProfileResults> {
    // 1. References and their taxa
    let refs = FastaReferences::load(&inputs.references)?;
    let accessions = build_accession_index(&refs, &settings.scan)?;
    let taxa = ReferenceTaxa::load(&inputs.reference_taxa, refs.num_references(), |a| {
        accessions.get(a)
    })?;
    let taxonomy = Taxonomy::load(&inputs.taxdb)?;

    // 2. Optional gene annotations
    let genes = match &inputs.gene_index {
        Some(path) => Some(GeneAnnotationIndex::load(path)?),
        None => None,
    };

    // 3. First pass
    let (reads, match_summary) = read_match_groups(open_reader(&inputs.matches)?, &accessions)?;
    let shards = classify_in_shards(&reads, settings.shards, &taxa, &taxonomy, &settings.shard)?;

    // 4. Second pass
    let merger = ProfileMerger::new(&taxa, &taxonomy, genes.as_ref(), settings.merge.clone())?;
    let profile = merger.merge(&shards)?;
    let report = profile.report(Some(&taxonomy.name_map));

    Ok(ProfileResults {
        profile,
        report,
        match_summary,
    })
}
