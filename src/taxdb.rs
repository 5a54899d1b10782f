//src/taxdb.rs

use ahash::{AHashMap, AHashSet};
use std::io::BufRead;
use std::path::Path;

use crate::error::Result;
use crate::oracles::{LcaOracle, ReferenceAccessor, TaxonOracle};
use crate::reader::open_reader;

pub type ParentMap = AHashMap<i32, i32>;
pub type NameMap = AHashMap<i32, String>;
pub type RankMap = AHashMap<i32, String>;

/// Guard against cyclic parent maps.
const MAX_DEPTH: usize = 1024;

/// Taxonomy tree backed by a child -> parent map.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    pub parent_map: ParentMap,
    pub name_map: NameMap,
    pub rank_map: RankMap,
}

impl Taxonomy {
    pub fn from_parent_map(parent_map: ParentMap) -> Self {
        Self {
            parent_map,
            ..Default::default()
        }
    }

    /// Parses a taxDB file in the format:
    /// ```text
    /// <taxid>\t<parentid>\t<taxname>\t<rank>
    /// ```
    /// Malformed lines are skipped.
    pub fn load<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        let reader = open_reader(filepath.as_ref())?;
        let mut taxonomy = Taxonomy::default();

        for line_result in reader.lines() {
            let line = line_result?;
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 2 {
                continue;
            }

            let taxid: i32 = parts[0].trim().parse().unwrap_or(0);
            let parentid: i32 = parts[1].trim().parse().unwrap_or(0);
            if taxid <= 0 {
                continue;
            }

            taxonomy.parent_map.insert(taxid, parentid);
            if let Some(name) = parts.get(2) {
                taxonomy.name_map.insert(taxid, name.trim().to_string());
            }
            if let Some(rank) = parts.get(3) {
                taxonomy.rank_map.insert(taxid, rank.trim().to_string());
            }
        }
        log::info!("Loaded taxonomy with {} nodes", taxonomy.parent_map.len());
        Ok(taxonomy)
    }

    /// `taxon` followed by its ancestors, root last.
    pub fn path_to_root(&self, mut taxon: i32) -> Vec<i32> {
        let mut path = Vec::with_capacity(32);
        while taxon > 0 && path.len() < MAX_DEPTH {
            path.push(taxon);
            match self.parent_map.get(&taxon) {
                Some(&p) if p != taxon => taxon = p,
                _ => break,
            }
        }
        path
    }

    /// Lowest common ancestor of `a` and `b`.
    /// If either is unassigned the other is returned; disjoint lineages give 0.
    pub fn lca(&self, a: i32, b: i32) -> i32 {
        if a <= 0 || b <= 0 {
            return a.max(b).max(0);
        }
        if a == b {
            return a;
        }
        let a_anc: AHashSet<i32> = self.path_to_root(a).into_iter().collect();
        self.path_to_root(b)
            .into_iter()
            .find(|t| a_anc.contains(t))
            .unwrap_or(0)
    }
}

impl LcaOracle for Taxonomy {
    fn naive_lca(&self, taxon_ids: &[i32]) -> i32 {
        let mut iter = taxon_ids.iter().copied().filter(|&t| t > 0);
        let Some(first) = iter.next() else {
            return 0;
        };
        let mut candidate = first;
        for t in iter {
            candidate = self.lca(candidate, t);
            if candidate <= 0 {
                return 0;
            }
        }
        candidate
    }

    fn weighted_lca(&self, weights: &AHashMap<i32, u64>, coverage_proportion: f64) -> i32 {
        let total: u64 = weights
            .iter()
            .filter(|(&t, _)| t > 0)
            .map(|(_, &w)| w)
            .sum();
        if total == 0 {
            return 0;
        }
        let min_weight = coverage_proportion * total as f64;

        // Weight held by each node's subtree, and each node's depth.
        let mut subtree: AHashMap<i32, (u64, usize)> = AHashMap::with_capacity(weights.len() * 16);
        for (&taxon, &weight) in weights {
            if taxon <= 0 || weight == 0 {
                continue;
            }
            let path = self.path_to_root(taxon);
            let depth = path.len();
            for (i, node) in path.into_iter().enumerate() {
                let entry = subtree.entry(node).or_insert((0, depth - i));
                entry.0 += weight;
            }
        }

        // Deepest nodes that still cover enough weight.
        let mut best_depth = 0usize;
        let mut best: Vec<i32> = Vec::new();
        for (&node, &(weight, depth)) in &subtree {
            if (weight as f64) < min_weight {
                continue;
            }
            if depth > best_depth {
                best_depth = depth;
                best.clear();
                best.push(node);
            } else if depth == best_depth {
                best.push(node);
            }
        }
        best.sort_unstable();
        self.naive_lca(&best)
    }
}

/// Taxon id per reference index.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTaxa {
    taxa: Vec<i32>,
}

impl ReferenceTaxa {
    pub fn new(taxa: Vec<i32>) -> Self {
        Self { taxa }
    }

    /// Loads `accession\ttaxid` lines, resolving accessions through `lookup`.
    /// Unknown accessions are skipped.
    pub fn load<P, F>(filepath: P, num_references: usize, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&[u8]) -> Option<u32>,
    {
        let reader = open_reader(filepath.as_ref())?;
        let mut taxa = vec![0i32; num_references];
        let mut assigned = 0usize;
        for line in reader.lines() {
            let line = line?;
            let Some((accession, taxid)) = line.trim().split_once('\t') else {
                continue;
            };
            let taxid: i32 = taxid.trim().parse().unwrap_or(0);
            if taxid <= 0 {
                continue;
            }
            if let Some(index) = lookup(accession.as_bytes()) {
                if let Some(slot) = taxa.get_mut(index as usize) {
                    *slot = taxid;
                    assigned += 1;
                }
            }
        }
        log::info!("Assigned taxa to {} of {} references", assigned, num_references);
        Ok(Self { taxa })
    }

    /// Tags every reference with a known taxon as `tax|<id>`.
    /// Returns the number of headers changed.
    pub fn tag_headers<R: ReferenceAccessor + ?Sized>(&self, refs: &mut R) -> usize {
        let mut tagged = 0;
        for index in 0..refs.num_references().min(self.taxa.len()) {
            let taxon = self.taxa[index];
            if taxon > 0 {
                refs.extend_header(index as u32, "tax", &taxon.to_string());
                tagged += 1;
            }
        }
        tagged
    }
}

impl TaxonOracle for ReferenceTaxa {
    fn taxon_id_of(&self, reference_index: u32) -> i32 {
        self.taxa.get(reference_index as usize).copied().unwrap_or(0)
    }
}
