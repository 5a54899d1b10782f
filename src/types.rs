//src/types.rs

use ahash::{AHashMap, AHashSet};

/// Reference index -> number of reads credited to that reference.
pub type WeightTally = AHashMap<u32, u64>;

/// One candidate alignment of a read against a reference sequence.
///
/// Candidates for one read are expected in descending `bit_score` order.
/// A reverse-strand alignment has `ref_start > ref_end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    pub reference_index: u32,
    pub bit_score: f32,
    pub ref_start: i32,
    pub ref_end: i32,
}

impl MatchCandidate {
    pub fn new(reference_index: u32, bit_score: f32, ref_start: i32, ref_end: i32) -> Self {
        Self {
            reference_index,
            bit_score,
            ref_start,
            ref_end,
        }
    }
}

/// A read kept by a shard for the second, weighted pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RetainedRead {
    pub query_name: Vec<u8>,
    pub matches: Vec<MatchCandidate>,
}

/// Annotation attached to one gene interval.
///
/// Ids of 0 mean "no mapping".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeneRecord {
    pub product: Option<Vec<u8>>,
    pub gene_name: Option<Vec<u8>>,
    pub protein_id: Option<Vec<u8>>,
    pub kegg_id: i32,
    pub cog_id: i32,
    pub seed_id: i32,
    pub interpro_id: i32,
}

impl GeneRecord {
    /// Key used to deduplicate genes within one organism: the gene name,
    /// falling back to protein id, then product.
    pub fn dedup_key(&self) -> Option<&[u8]> {
        self.gene_name
            .as_deref()
            .or(self.protein_id.as_deref())
            .or(self.product.as_deref())
    }
}

/// Everything the merged profile knows about one final taxon.
#[derive(Debug, Clone, Default)]
pub struct OrganismAggregate {
    pub query_names: Vec<Vec<u8>>,
    pub genes: Vec<GeneRecord>,
    gene_keys: AHashSet<Vec<u8>>,
}

impl OrganismAggregate {
    pub fn add_read(&mut self, query_name: &[u8]) {
        self.query_names.push(query_name.to_vec());
    }

    /// Adds a gene unless one with the same name is already present.
    /// Of two genes sharing a name the smaller record is kept, so the result
    /// does not depend on insertion order. Returns `true` if the name was new.
    pub fn add_gene(&mut self, gene: &GeneRecord) -> bool {
        match gene.dedup_key() {
            Some(key) => {
                if self.gene_keys.contains(key) {
                    if let Some(kept) = self
                        .genes
                        .iter_mut()
                        .find(|g| g.dedup_key() == Some(key))
                    {
                        if *gene < *kept {
                            *kept = gene.clone();
                        }
                    }
                    return false;
                }
                self.gene_keys.insert(key.to_vec());
            }
            None => {
                if self.genes.contains(gene) {
                    return false;
                }
            }
        }
        self.genes.push(gene.clone());
        true
    }

    pub fn read_count(&self) -> usize {
        self.query_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gene(name: Option<&str>, product: Option<&str>) -> GeneRecord {
        GeneRecord {
            gene_name: name.map(|s| s.as_bytes().to_vec()),
            product: product.map(|s| s.as_bytes().to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn genes_are_deduplicated_by_name() {
        let mut agg = OrganismAggregate::default();
        assert!(agg.add_gene(&gene(Some("recA"), Some("recombinase A"))));
        assert!(!agg.add_gene(&gene(Some("recA"), Some("other product"))));
        assert!(agg.add_gene(&gene(Some("dnaK"), None)));
        assert_eq!(agg.genes.len(), 2);
    }

    #[test]
    fn same_name_keeps_the_smaller_record() {
        let low = GeneRecord { kegg_id: 2, ..gene(Some("recA"), Some("recombinase A")) };
        let high = GeneRecord { kegg_id: 9, ..gene(Some("recA"), Some("recombinase A")) };

        let mut forward = OrganismAggregate::default();
        forward.add_gene(&low);
        forward.add_gene(&high);
        let mut backward = OrganismAggregate::default();
        backward.add_gene(&high);
        backward.add_gene(&low);

        assert_eq!(forward.genes, vec![low.clone()]);
        assert_eq!(backward.genes, vec![low]);
    }

    #[test]
    fn unnamed_genes_fall_back_to_full_equality() {
        let mut agg = OrganismAggregate::default();
        let blank = GeneRecord { kegg_id: 7, ..Default::default() };
        assert!(agg.add_gene(&blank));
        assert!(!agg.add_gene(&blank));
        assert!(agg.add_gene(&GeneRecord { kegg_id: 8, ..Default::default() }));
        assert_eq!(agg.genes.len(), 2);
    }

    #[test]
    fn read_names_are_a_multiset() {
        let mut agg = OrganismAggregate::default();
        agg.add_read(b"r1");
        agg.add_read(b"r1");
        assert_eq!(agg.read_count(), 2);
    }
}
