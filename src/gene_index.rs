//src/gene_index.rs

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{ProfileError, Result};
use crate::interval_tree::{Interval, IntervalTree, IntervalTreeBuilder};
use crate::types::{GeneRecord, MatchCandidate, WeightTally};

/// File type code of a serialized gene index.
pub const GENE_INDEX_MAGIC: &[u8; 8] = b"GeneIdx1";

/// Shortest gene interval (`end - start + 1`) kept in the index.
pub const MIN_GENE_LENGTH: i64 = 20;

/// Longest gene interval kept in the index.
pub const MAX_GENE_LENGTH: i64 = 500_000;

/// Upper bound on capacity reserved from untrusted counts while loading.
const MAX_PREALLOC: usize = 1 << 16;

/// Gene intervals per reference sequence. Read-only once built.
///
/// Reverse-strand genes are stored with negated coordinates, so every stored
/// interval has `start <= end`.
#[derive(Debug, Clone, Default)]
pub struct GeneAnnotationIndex {
    trees: Vec<Option<IntervalTree<GeneRecord>>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneIndexStats {
    pub references: usize,
    pub references_with_genes: usize,
    pub intervals: usize,
}

/// Whether an interval of this length may be stored.
pub fn gene_length_in_bounds(start: i32, end: i32) -> bool {
    let length = (end as i64 - start as i64).abs() + 1;
    (MIN_GENE_LENGTH..=MAX_GENE_LENGTH).contains(&length)
}

/// Reverse-strand coordinates (`start > end`) are stored negated.
/// `None` when a coordinate has no negation (`i32::MIN`).
pub fn strand_encode(start: i32, end: i32) -> Option<(i32, i32)> {
    if start > end {
        Some((start.checked_neg()?, end.checked_neg()?))
    } else {
        Some((start, end))
    }
}

impl GeneAnnotationIndex {
    pub fn from_trees(trees: Vec<Option<IntervalTree<GeneRecord>>>) -> Self {
        Self { trees }
    }

    pub fn num_references(&self) -> usize {
        self.trees.len()
    }

    pub fn tree(&self, reference_index: u32) -> Option<&IntervalTree<GeneRecord>> {
        self.trees.get(reference_index as usize)?.as_ref()
    }

    pub fn stats(&self) -> GeneIndexStats {
        let mut stats = GeneIndexStats {
            references: self.trees.len(),
            ..Default::default()
        };
        for tree in self.trees.iter().flatten() {
            stats.references_with_genes += 1;
            stats.intervals += tree.len();
        }
        stats
    }

    /// Every stored interval as `(reference_index, interval)`, in file order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Interval<GeneRecord>)> {
        self.trees.iter().enumerate().flat_map(|(i, tree)| {
            tree.iter()
                .flat_map(|t| t.iter())
                .map(move |iv| (i as u32, iv))
        })
    }

    /// Genes overlapping the matches of one read, best-supported matches first.
    ///
    /// Matches are ranked by descending `weight_hint` (matches whose reference
    /// has a weight come before those without), then by descending bit score.
    /// Returns at most `capacity` genes.
    pub fn get_genes(
        &self,
        weight_hint: Option<&WeightTally>,
        matches: &[MatchCandidate],
        capacity: usize,
    ) -> Vec<&GeneRecord> {
        let mut genes = Vec::with_capacity(capacity.min(16));
        if capacity == 0 || matches.is_empty() {
            return genes;
        }

        let weight_of = |m: &MatchCandidate| weight_hint.and_then(|h| h.get(&m.reference_index).copied());
        let mut ranked: Vec<&MatchCandidate> = matches.iter().collect();
        ranked.sort_by(|a, b| {
            let by_weight = match (weight_of(a), weight_of(b)) {
                (Some(wa), Some(wb)) => wb.cmp(&wa),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_weight.then_with(|| b.bit_score.total_cmp(&a.bit_score))
        });

        for m in ranked {
            let Some(tree) = self.tree(m.reference_index) else {
                continue;
            };
            let Some((start, end)) = strand_encode(m.ref_start, m.ref_end) else {
                continue;
            };
            tree.for_each_overlap(start, end, |iv| {
                genes.push(&iv.value);
                genes.len() < capacity
            });
            if genes.len() >= capacity {
                break;
            }
        }
        genes
    }

    // -----------------------------------------------------------------------
    //  Binary form
    // -----------------------------------------------------------------------

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        let stats = self.stats();
        log::info!(
            "Wrote gene index for {} references ({} intervals) to {}",
            stats.references_with_genes,
            stats.intervals,
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let index = Self::read_from(&mut reader)?;
        let stats = index.stats();
        log::info!(
            "Loaded gene index for {} references ({} intervals)",
            stats.references_with_genes,
            stats.intervals
        );
        Ok(index)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(GENE_INDEX_MAGIC)?;
        writer.write_i32::<BigEndian>(to_i32(self.trees.len(), "sequence count")?)?;
        for tree in &self.trees {
            let Some(tree) = tree else {
                writer.write_i32::<BigEndian>(0)?;
                continue;
            };
            writer.write_i32::<BigEndian>(to_i32(tree.len(), "interval count")?)?;
            for iv in tree.iter() {
                writer.write_i32::<BigEndian>(iv.start)?;
                writer.write_i32::<BigEndian>(iv.end)?;
                write_gene(writer, &iv.value)?;
            }
        }
        Ok(())
    }

    /// Reads the binary form. The magic number is checked before anything else.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|e| ProfileError::from_read(e, "magic number"))?;
        if &magic != GENE_INDEX_MAGIC {
            return Err(ProfileError::InvalidMagic);
        }

        let sequence_count = read_count(reader, "sequence count")?;
        let mut trees = Vec::with_capacity(sequence_count.min(MAX_PREALLOC));
        for _ in 0..sequence_count {
            let interval_count = read_count(reader, "interval count")?;
            if interval_count == 0 {
                trees.push(None);
                continue;
            }
            let mut builder = IntervalTreeBuilder::with_capacity(interval_count.min(MAX_PREALLOC));
            for _ in 0..interval_count {
                let start = read_i32(reader, "interval start")?;
                let end = read_i32(reader, "interval end")?;
                if start > end {
                    return Err(ProfileError::Format(format!(
                        "interval [{start}, {end}] has start after end"
                    )));
                }
                let gene = read_gene(reader)?;
                builder.push(start, end, gene);
            }
            trees.push(Some(builder.build()));
        }
        Ok(Self { trees })
    }
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| ProfileError::Format(format!("{what} {value} exceeds i32")))
}

fn read_i32<R: Read>(reader: &mut R, what: &str) -> Result<i32> {
    reader
        .read_i32::<BigEndian>()
        .map_err(|e| ProfileError::from_read(e, what))
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let value = read_i32(reader, what)?;
    usize::try_from(value).map_err(|_| ProfileError::Format(format!("negative {what}: {value}")))
}

fn write_bytes<W: Write>(writer: &mut W, bytes: Option<&[u8]>) -> Result<()> {
    match bytes {
        Some(b) if !b.is_empty() => {
            writer.write_i32::<BigEndian>(to_i32(b.len(), "string length")?)?;
            writer.write_all(b)?;
        }
        _ => writer.write_i32::<BigEndian>(0)?,
    }
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R, what: &str) -> Result<Option<Vec<u8>>> {
    let len = read_count(reader, what)?;
    if len == 0 {
        return Ok(None);
    }
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(ProfileError::Truncated(format!(
            "{what}: expected {len} bytes, found {}",
            buf.len()
        )));
    }
    Ok(Some(buf))
}

fn write_gene<W: Write>(writer: &mut W, gene: &GeneRecord) -> Result<()> {
    write_bytes(writer, gene.product.as_deref())?;
    write_bytes(writer, gene.gene_name.as_deref())?;
    write_bytes(writer, gene.protein_id.as_deref())?;
    writer.write_i32::<BigEndian>(gene.kegg_id)?;
    writer.write_i32::<BigEndian>(gene.cog_id)?;
    writer.write_i32::<BigEndian>(gene.seed_id)?;
    writer.write_i32::<BigEndian>(gene.interpro_id)?;
    Ok(())
}

fn read_gene<R: Read>(reader: &mut R) -> Result<GeneRecord> {
    Ok(GeneRecord {
        product: read_bytes(reader, "product")?,
        gene_name: read_bytes(reader, "gene name")?,
        protein_id: read_bytes(reader, "protein id")?,
        kegg_id: read_i32(reader, "KEGG id")?,
        cog_id: read_i32(reader, "COG id")?,
        seed_id: read_i32(reader, "SEED id")?,
        interpro_id: read_i32(reader, "InterPro id")?,
    })
}
