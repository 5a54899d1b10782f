//src/classify/shard.rs

use ahash::AHashSet;
use rayon::prelude::*;
use std::ops::Range;

use crate::error::{ProfileError, Result};
use crate::matches::ReadMatches;
use crate::oracles::{LcaOracle, TaxonOracle};
use crate::types::{MatchCandidate, RetainedRead, WeightTally};

#[derive(Debug, Clone)]
pub struct ShardOptions {
    /// Matches scoring more than this percentage below the best match of a
    /// read are ignored (0-100).
    pub top_percent: f64,
}

impl Default for ShardOptions {
    fn default() -> Self {
        Self { top_percent: 10.0 }
    }
}

impl ShardOptions {
    pub fn percent_factor(&self) -> Result<f64> {
        if !(0.0..=100.0).contains(&self.top_percent) {
            return Err(ProfileError::InvalidOption(format!(
                "top percent must be within 0-100, got {}",
                self.top_percent
            )));
        }
        Ok(1.0 - self.top_percent / 100.0)
    }
}

/// What `classify` did with one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    NoHit,
    /// One reference left; it was credited.
    SingleReference(u32),
    /// Several references left; those assigned exactly to `lca` were credited.
    MultipleReferences { lca: i32 },
}

/// First-pass accumulator owned by one worker.
///
/// Each read is decided once, using only this shard's state: references get
/// weight, and reads with usable matches are retained for the merge pass.
pub struct ShardClassifier<'a> {
    taxa: &'a dyn TaxonOracle,
    lca: &'a dyn LcaOracle,
    percent_factor: f64,

    weights: WeightTally,
    retained: Vec<RetainedRead>,
    total_reads: u64,

    // per-read scratch, reused across reads
    kept: Vec<MatchCandidate>,
    kept_taxa: Vec<i32>,
    seen_refs: AHashSet<u32>,
}

impl<'a> ShardClassifier<'a> {
    pub fn new(
        taxa: &'a dyn TaxonOracle,
        lca: &'a dyn LcaOracle,
        options: &ShardOptions,
    ) -> Result<Self> {
        Ok(Self {
            taxa,
            lca,
            percent_factor: options.percent_factor()?,
            weights: WeightTally::new(),
            retained: Vec::new(),
            total_reads: 0,
            kept: Vec::with_capacity(16),
            kept_taxa: Vec::with_capacity(16),
            seen_refs: AHashSet::with_capacity(16),
        })
    }

    /// Classifies one read given its candidates in descending score order.
    pub fn classify(&mut self, query_name: &[u8], matches: &[MatchCandidate]) -> ReadOutcome {
        self.total_reads += 1;

        match matches {
            [] => ReadOutcome::NoHit,
            [only] => self.keep_single(query_name, *only),
            _ => self.classify_multiple(query_name, matches),
        }
    }

    fn keep_single(&mut self, query_name: &[u8], m: MatchCandidate) -> ReadOutcome {
        *self.weights.entry(m.reference_index).or_insert(0) += 1;
        self.retained.push(RetainedRead {
            query_name: query_name.to_vec(),
            matches: vec![m],
        });
        ReadOutcome::SingleReference(m.reference_index)
    }

    fn classify_multiple(&mut self, query_name: &[u8], matches: &[MatchCandidate]) -> ReadOutcome {
        let top_score = matches
            .iter()
            .map(|m| m.bit_score)
            .filter(|s| s.is_finite())
            .fold(f32::NEG_INFINITY, f32::max);
        let min_score = self.percent_factor * top_score as f64;

        self.kept.clear();
        self.kept_taxa.clear();
        self.seen_refs.clear();
        for m in matches {
            let passes = m.bit_score.is_finite() && (m.bit_score as f64) >= min_score;
            if !passes || !self.seen_refs.insert(m.reference_index) {
                continue;
            }
            let taxon = self.taxa.taxon_id_of(m.reference_index);
            if taxon <= 0 {
                continue;
            }
            self.kept.push(*m);
            self.kept_taxa.push(taxon);
        }

        match self.kept.len() {
            0 => ReadOutcome::NoHit,
            1 => {
                let only = self.kept[0];
                self.keep_single(query_name, only)
            }
            _ => {
                let lca = self.lca.naive_lca(&self.kept_taxa);
                if lca <= 0 {
                    return ReadOutcome::NoHit;
                }
                // ancestors of the LCA are not credited
                for (m, &taxon) in self.kept.iter().zip(&self.kept_taxa) {
                    if taxon == lca {
                        *self.weights.entry(m.reference_index).or_insert(0) += 1;
                    }
                }
                self.retained.push(RetainedRead {
                    query_name: query_name.to_vec(),
                    matches: self.kept.clone(),
                });
                ReadOutcome::MultipleReferences { lca }
            }
        }
    }

    pub fn weights(&self) -> &WeightTally {
        &self.weights
    }

    /// Retained reads in processing order.
    pub fn retained_reads(&self) -> &[RetainedRead] {
        &self.retained
    }

    /// All reads seen, including those without hits.
    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }
}

/// The first `len % count` ranges get one extra item.
fn shard_ranges(len: usize, shards: usize) -> Vec<Range<usize>> {
    let count = shards.min(len);
    if count == 0 {
        return Vec::new();
    }
    let (base, extra) = (len / count, len % count);
    let mut start = 0;
    (0..count)
        .map(|i| {
            let end = start + base + usize::from(i < extra);
            let range = start..end;
            start = end;
            range
        })
        .collect()
}

/// Splits `reads` into `min(shards, reads.len())` contiguous chunks whose
/// sizes differ by at most one and classifies each chunk with its own
/// `ShardClassifier` in parallel.
pub fn classify_in_shards<'a>(
    reads: &[ReadMatches],
    shards: usize,
    taxa: &'a dyn TaxonOracle,
    lca: &'a dyn LcaOracle,
    options: &ShardOptions,
) -> Result<Vec<ShardClassifier<'a>>> {
    if shards == 0 {
        return Err(ProfileError::InvalidOption("shard count must be at least 1".into()));
    }
    options.percent_factor()?;

    let classifiers = shard_ranges(reads.len(), shards)
        .into_par_iter()
        .map(|range| {
            let mut shard = ShardClassifier::new(taxa, lca, options)?;
            for read in &reads[range] {
                shard.classify(&read.query_name, &read.matches);
            }
            Ok(shard)
        })
        .collect::<Result<Vec<_>>>()?;

    log::info!(
        "Classified {} reads in {} shards, {} retained",
        reads.len(),
        classifiers.len(),
        classifiers.iter().map(|s| s.retained_reads().len()).sum::<usize>()
    );
    Ok(classifiers)
}
