//src/classify/merge.rs

use ahash::AHashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::thread;

use super::shard::ShardClassifier;
use crate::error::{ProfileError, Result};
use crate::gene_index::GeneAnnotationIndex;
use crate::oracles::{LcaOracle, TaxonOracle};
use crate::report::ProfileReport;
use crate::taxdb::NameMap;
use crate::types::{OrganismAggregate, RetainedRead, WeightTally};
use crate::workers::{join_phase, run_worker, Cancellation};

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Fraction of a read's total weight its final taxon must cover.
    pub min_support_proportion: f64,
    pub max_genes_per_read: usize,
    pub lock_pool_size: usize,
    /// Worker count; `None` runs one worker per shard.
    pub threads: Option<usize>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            min_support_proportion: 0.8,
            max_genes_per_read: 5,
            lock_pool_size: 1024,
            threads: None,
        }
    }
}

impl MergeOptions {
    fn validate(&self) -> Result<()> {
        if !(self.min_support_proportion > 0.0 && self.min_support_proportion <= 1.0) {
            return Err(ProfileError::InvalidOption(format!(
                "min support proportion must be in (0, 1], got {}",
                self.min_support_proportion
            )));
        }
        if self.lock_pool_size == 0 {
            return Err(ProfileError::InvalidOption("lock pool size must be at least 1".into()));
        }
        if self.threads == Some(0) {
            return Err(ProfileError::InvalidOption("threads must be at least 1".into()));
        }
        Ok(())
    }
}

/// Sums shard tallies into `into`.
pub fn merge_tallies(mut into: WeightTally, from: &WeightTally) -> WeightTally {
    into.reserve(from.len());
    for (&reference, &count) in from {
        *into.entry(reference).or_insert(0) += count;
    }
    into
}

/// Result of the merge pass.
#[derive(Debug, Clone, Default)]
pub struct MergedProfile {
    pub organisms: AHashMap<i32, OrganismAggregate>,
    pub weights: WeightTally,
    pub total_reads: u64,
    pub assigned_reads: u64,
}

impl MergedProfile {
    pub fn iter(&self) -> impl Iterator<Item = (i32, &OrganismAggregate)> {
        self.organisms.iter().map(|(&t, agg)| (t, agg))
    }

    pub fn report(&self, names: Option<&NameMap>) -> ProfileReport {
        ProfileReport::from_profile(self, names)
    }
}

/// Organism aggregates split into lock stripes by taxon hash.
struct StripedOrganisms {
    stripes: Vec<Mutex<AHashMap<i32, OrganismAggregate>>>,
}

impl StripedOrganisms {
    fn new(pool_size: usize) -> Self {
        Self {
            stripes: (0..pool_size).map(|_| Mutex::new(AHashMap::new())).collect(),
        }
    }

    fn stripe(&self, taxon: i32) -> &Mutex<AHashMap<i32, OrganismAggregate>> {
        // Fibonacci hashing spreads consecutive taxon ids
        let hash = (taxon as u32 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        &self.stripes[((hash >> 32) as usize) % self.stripes.len()]
    }

    fn into_map(self) -> AHashMap<i32, OrganismAggregate> {
        let mut organisms = AHashMap::new();
        for stripe in self.stripes {
            organisms.extend(stripe.into_inner());
        }
        organisms
    }
}

/// Second pass: re-classifies every retained read with the weighted LCA,
/// using the weights of all shards, and aggregates reads and genes per taxon.
pub struct ProfileMerger<'a> {
    taxa: &'a dyn TaxonOracle,
    lca: &'a dyn LcaOracle,
    genes: Option<&'a GeneAnnotationIndex>,
    options: MergeOptions,
}

impl<'a> ProfileMerger<'a> {
    pub fn new(
        taxa: &'a dyn TaxonOracle,
        lca: &'a dyn LcaOracle,
        genes: Option<&'a GeneAnnotationIndex>,
        options: MergeOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            taxa,
            lca,
            genes,
            options,
        })
    }

    pub fn merge(&self, shards: &[ShardClassifier<'_>]) -> Result<MergedProfile> {
        let weights = shards
            .par_iter()
            .map(|s| s.weights())
            .fold(WeightTally::new, merge_tallies)
            .reduce(WeightTally::new, |a, b| merge_tallies(a, &b));
        let total_reads: u64 = shards.iter().map(|s| s.total_reads()).sum();

        let workers = self.options.threads.unwrap_or(shards.len()).min(shards.len()).max(1);
        let organisms = StripedOrganisms::new(self.options.lock_pool_size);
        let cancellation = Cancellation::new();

        let assigned = thread::scope(|s| {
            let handles = (0..workers)
                .map(|worker| {
                    let (weights, organisms, cancellation) = (&weights, &organisms, &cancellation);
                    s.spawn(move || {
                        run_worker(cancellation, || {
                            let mut assigned = 0u64;
                            for shard in shards.iter().skip(worker).step_by(workers) {
                                assigned += self.merge_shard(
                                    shard.retained_reads(),
                                    weights,
                                    organisms,
                                    cancellation,
                                )?;
                            }
                            Ok(assigned)
                        })
                    })
                })
                .collect();
            join_phase(handles, "profile merge")
        })?;

        let assigned_reads: u64 = assigned.into_iter().sum();
        let organisms = organisms.into_map();
        log::info!(
            "Merged {} shards: {} organisms, {} of {} reads assigned",
            shards.len(),
            organisms.len(),
            assigned_reads,
            total_reads
        );

        Ok(MergedProfile {
            organisms,
            weights,
            total_reads,
            assigned_reads,
        })
    }

    fn merge_shard(
        &self,
        reads: &[RetainedRead],
        weights: &WeightTally,
        organisms: &StripedOrganisms,
        cancellation: &Cancellation,
    ) -> Result<u64> {
        let mut taxon_weights: AHashMap<i32, u64> = AHashMap::with_capacity(16);
        let mut assigned = 0u64;

        for read in reads {
            cancellation.check()?;

            let taxon = self.final_taxon(read, weights, &mut taxon_weights);
            if taxon <= 0 {
                continue;
            }

            let genes = match self.genes {
                Some(index) => index.get_genes(Some(weights), &read.matches, self.options.max_genes_per_read),
                None => Vec::new(),
            };

            let mut stripe = organisms.stripe(taxon).lock();
            let organism = stripe.entry(taxon).or_default();
            for gene in genes {
                organism.add_gene(gene);
            }
            organism.add_read(&read.query_name);
            assigned += 1;
        }
        Ok(assigned)
    }

    /// Weighted LCA over the read's taxa. A taxon hit by several matches
    /// gets the largest of their reference weights.
    fn final_taxon(
        &self,
        read: &RetainedRead,
        weights: &WeightTally,
        taxon_weights: &mut AHashMap<i32, u64>,
    ) -> i32 {
        taxon_weights.clear();
        for m in &read.matches {
            let taxon = self.taxa.taxon_id_of(m.reference_index);
            if taxon <= 0 {
                continue;
            }
            let weight = weights.get(&m.reference_index).copied().unwrap_or(1);
            let entry = taxon_weights.entry(taxon).or_insert(0);
            *entry = (*entry).max(weight);
        }
        if taxon_weights.is_empty() {
            return 0;
        }
        self.lca
            .weighted_lca(taxon_weights, self.options.min_support_proportion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::shard::{classify_in_shards, ShardOptions};
    use crate::interval_tree::IntervalTreeBuilder;
    use crate::matches::ReadMatches;
    use crate::taxdb::{ParentMap, ReferenceTaxa, Taxonomy};
    use crate::types::{GeneRecord, MatchCandidate};
    use ahash::AHashSet;

    /// 1 -> 2 -> {10 -> {100, 101}, 20}; 500 is a separate root
    fn taxonomy() -> Taxonomy {
        let mut parent_map = ParentMap::new();
        for (child, parent) in [(1, 1), (2, 1), (10, 2), (20, 2), (100, 10), (101, 10), (500, 500)] {
            parent_map.insert(child, parent);
        }
        Taxonomy::from_parent_map(parent_map)
    }

    /// references 0..=4 -> 100, 101, 20, 500, unknown
    fn ref_taxa() -> ReferenceTaxa {
        ReferenceTaxa::new(vec![100, 101, 20, 500, 0])
    }

    fn genes() -> GeneAnnotationIndex {
        let mut r0 = IntervalTreeBuilder::new();
        r0.push(1, 300, GeneRecord { gene_name: Some(b"recA".to_vec()), ..Default::default() });
        let mut r1 = IntervalTreeBuilder::new();
        r1.push(1, 300, GeneRecord { gene_name: Some(b"recA".to_vec()), kegg_id: 2, ..Default::default() });
        r1.push(250, 600, GeneRecord { gene_name: Some(b"dnaK".to_vec()), ..Default::default() });
        GeneAnnotationIndex::from_trees(vec![Some(r0.build()), Some(r1.build())])
    }

    fn m(reference_index: u32, bit_score: f32) -> MatchCandidate {
        MatchCandidate::new(reference_index, bit_score, 100, 280)
    }

    fn read(name: &str, matches: Vec<MatchCandidate>) -> ReadMatches {
        ReadMatches {
            query_name: name.as_bytes().to_vec(),
            matches,
        }
    }

    #[test]
    fn tallies_are_summed() {
        let mut a = WeightTally::new();
        a.insert(7, 3);
        let mut b = WeightTally::new();
        b.insert(7, 3);
        b.insert(8, 1);
        let ab = merge_tallies(merge_tallies(WeightTally::new(), &a), &b);
        let ba = merge_tallies(merge_tallies(WeightTally::new(), &b), &a);
        assert_eq!(ab[&7], 6);
        assert_eq!(ab, ba);
    }

    #[test]
    fn shard_weights_are_merged_globally() {
        let (taxa, lca) = (ref_taxa(), taxonomy());
        let reads: Vec<ReadMatches> = (0..6).map(|i| read(&format!("r{i}"), vec![m(0, 50.0)])).collect();
        let shards = classify_in_shards(&reads, 2, &taxa, &lca, &ShardOptions::default()).unwrap();
        assert_eq!(shards[0].weights()[&0], 3);
        assert_eq!(shards[1].weights()[&0], 3);

        let merger = ProfileMerger::new(&taxa, &lca, None, MergeOptions::default()).unwrap();
        let profile = merger.merge(&shards).unwrap();
        assert_eq!(profile.weights[&0], 6);
        assert_eq!(profile.organisms[&100].read_count(), 6);
    }

    #[test]
    fn global_weight_decides_ambiguous_reads() {
        let (taxa, lca) = (ref_taxa(), taxonomy());
        let mut reads = Vec::new();
        // many unique hits to reference 1 (taxon 101)
        for i in 0..8 {
            reads.push(read(&format!("u{i}"), vec![m(1, 60.0)]));
        }
        // ambiguous read between 100 and 101
        reads.push(read("amb", vec![m(0, 60.0), m(1, 60.0)]));

        let shards = classify_in_shards(&reads, 3, &taxa, &lca, &ShardOptions::default()).unwrap();
        let gene_index = genes();
        let merger = ProfileMerger::new(&taxa, &lca, Some(&gene_index), MergeOptions::default()).unwrap();
        let profile = merger.merge(&shards).unwrap();

        // 8 vs 1: the 101 branch covers > 80%
        let org = &profile.organisms[&101];
        assert_eq!(org.read_count(), 9);
        assert!(org.query_names.contains(&b"amb".to_vec()));
        assert!(!profile.organisms.contains_key(&10));

        // recA from both references is deduplicated by name; dnaK overlaps 250..280
        let names: AHashSet<Vec<u8>> = org.genes.iter().filter_map(|g| g.gene_name.clone()).collect();
        assert_eq!(org.genes.len(), 2);
        assert!(names.contains(&b"recA".to_vec()) && names.contains(&b"dnaK".to_vec()));
    }

    #[test]
    fn invalid_final_taxon_only_counts() {
        let (taxa, lca) = (ref_taxa(), taxonomy());
        let reads = vec![read("a", vec![m(4, 50.0)]), read("b", vec![])];
        let shards = classify_in_shards(&reads, 1, &taxa, &lca, &ShardOptions::default()).unwrap();
        assert_eq!(shards[0].retained_reads().len(), 1);

        let merger = ProfileMerger::new(&taxa, &lca, None, MergeOptions::default()).unwrap();
        let profile = merger.merge(&shards).unwrap();
        assert_eq!(profile.total_reads, 2);
        assert_eq!(profile.assigned_reads, 0);
        assert!(profile.organisms.is_empty());
    }

    #[test]
    fn worker_count_does_not_change_membership() {
        let (taxa, lca) = (ref_taxa(), taxonomy());
        let gene_index = genes();
        let reads: Vec<ReadMatches> = (0..400u32)
            .map(|i| {
                let matches = match i % 4 {
                    0 => vec![m(0, 50.0)],
                    1 => vec![m(1, 70.0), m(0, 69.0)],
                    2 => vec![m(2, 40.0), m(0, 40.0)],
                    _ => vec![m(3, 40.0)],
                };
                read(&format!("r{i}"), matches)
            })
            .collect();
        let shards = classify_in_shards(&reads, 8, &taxa, &lca, &ShardOptions::default()).unwrap();

        let membership = |threads: usize| {
            let options = MergeOptions { threads: Some(threads), lock_pool_size: 7, ..Default::default() };
            let merger = ProfileMerger::new(&taxa, &lca, Some(&gene_index), options).unwrap();
            let profile = merger.merge(&shards).unwrap();
            let mut out: Vec<(i32, Vec<Vec<u8>>, Vec<GeneRecord>)> = profile
                .iter()
                .map(|(t, agg)| {
                    let mut names = agg.query_names.clone();
                    names.sort();
                    let mut genes = agg.genes.clone();
                    genes.sort_by(|a, b| a.gene_name.cmp(&b.gene_name));
                    (t, names, genes)
                })
                .collect();
            out.sort_by_key(|(t, _, _)| *t);
            (out, profile.total_reads)
        };

        let single = membership(1);
        let eight = membership(8);
        assert_eq!(single, eight);
        assert_eq!(single.1, 400);
    }

    #[test]
    fn bad_options_are_rejected() {
        let (taxa, lca) = (ref_taxa(), taxonomy());
        let options = MergeOptions { min_support_proportion: 0.0, ..Default::default() };
        assert!(ProfileMerger::new(&taxa, &lca, None, options).is_err());
        let options = MergeOptions { threads: Some(0), ..Default::default() };
        assert!(ProfileMerger::new(&taxa, &lca, None, options).is_err());
    }
}
