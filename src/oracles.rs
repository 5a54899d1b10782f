//src/oracles.rs

//! Interfaces to the collaborators the profiler consults but does not own:
//! taxonomy, accession->id mappings and the reference sequence store.

use ahash::AHashMap;

/// Resolves the taxon a reference sequence belongs to. 0 means unknown.
pub trait TaxonOracle: Sync {
    fn taxon_id_of(&self, reference_index: u32) -> i32;
}

/// Lowest-common-ancestor computations over the taxonomy.
/// A result of 0 or below means "no assignment".
pub trait LcaOracle: Sync {
    /// Most specific common ancestor of all given taxa, without weighting.
    fn naive_lca(&self, taxon_ids: &[i32]) -> i32;

    /// Most specific taxon whose subtree holds at least `coverage_proportion`
    /// of the total weight.
    fn weighted_lca(&self, weights: &AHashMap<i32, u64>, coverage_proportion: f64) -> i32;
}

/// Maps a gene/protein accession to an external classification id
/// (KEGG, COG, SEED, InterPro, ...).
pub trait IdMappingService: Send + Sync {
    fn id_from_accession(&self, accession: &[u8]) -> Option<i32>;
}

/// Read access to the reference sequences, plus header tagging.
pub trait ReferenceAccessor: Sync {
    fn num_references(&self) -> usize;

    fn header_of(&self, index: u32) -> &[u8];

    fn sequence_length_of(&self, index: u32) -> usize;

    /// Appends a `tag|value` annotation to the header of reference `index`.
    fn extend_header(&mut self, index: u32, tag: &str, value: &str);
}
