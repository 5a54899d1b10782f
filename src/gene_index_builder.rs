//src/gene_index_builder.rs

use ahash::AHashMap;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use std::io::BufRead;
use std::thread;

use crate::accession::AccessionIndex;
use crate::error::{ProfileError, Result};
use crate::gene_index::{gene_length_in_bounds, strand_encode, GeneAnnotationIndex};
use crate::interval_tree::IntervalTreeBuilder;
use crate::location::parse_location;
use crate::mapping::MappingContext;
use crate::types::GeneRecord;
use crate::workers::{join_phase, run_worker, Cancellation};

/// Gene accession placeholder meaning "same as the reference accession".
const SAME_AS_REFERENCE: &[u8] = b"*";

#[derive(Debug, Clone)]
pub struct GeneIndexBuildOptions {
    pub threads: usize,
    /// Lines buffered between the reader and the workers.
    pub queue_capacity: usize,
    pub lock_pool_size: usize,
}

impl Default for GeneIndexBuildOptions {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            queue_capacity: 1000,
            lock_pool_size: 1024,
        }
    }
}

impl GeneIndexBuildOptions {
    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(ProfileError::InvalidOption("threads must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ProfileError::InvalidOption("queue capacity must be at least 1".into()));
        }
        if self.lock_pool_size == 0 {
            return Err(ProfileError::InvalidOption("lock pool size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Line and interval counts of one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneIndexBuildSummary {
    pub lines_parsed: usize,
    pub lines_skipped: usize,
    pub intervals_inserted: usize,
    pub intervals_dropped: usize,
}

impl GeneIndexBuildSummary {
    fn add(&mut self, other: &Self) {
        self.lines_parsed += other.lines_parsed;
        self.lines_skipped += other.lines_skipped;
        self.intervals_inserted += other.intervals_inserted;
        self.intervals_dropped += other.intervals_dropped;
    }
}

enum Job {
    Line(u64, Vec<u8>),
    Done,
}

/// An interval waiting for the final sort; `line` keeps the order of
/// identical intervals independent of thread scheduling.
struct PendingGene {
    start: i32,
    end: i32,
    line: u64,
    gene: GeneRecord,
}

/// Interval lists per reference, split into lock stripes by reference index.
struct StripedForest {
    stripes: Vec<Mutex<AHashMap<u32, Vec<PendingGene>>>>,
}

impl StripedForest {
    fn new(pool_size: usize) -> Self {
        Self {
            stripes: (0..pool_size).map(|_| Mutex::new(AHashMap::new())).collect(),
        }
    }

    fn insert(&self, reference_index: u32, pending: PendingGene) {
        let stripe = &self.stripes[reference_index as usize % self.stripes.len()];
        stripe.lock().entry(reference_index).or_default().push(pending);
    }

    fn into_index(self, num_references: usize) -> GeneAnnotationIndex {
        let mut trees = Vec::with_capacity(num_references);
        trees.resize_with(num_references, || None);

        for stripe in self.stripes {
            for (reference_index, mut pending) in stripe.into_inner() {
                pending.sort_by_key(|p| (p.start, p.end, p.line));
                let mut builder = IntervalTreeBuilder::with_capacity(pending.len());
                for p in pending {
                    builder.push(p.start, p.end, p.gene);
                }
                if let Some(slot) = trees.get_mut(reference_index as usize) {
                    *slot = Some(builder.build());
                }
            }
        }
        GeneAnnotationIndex::from_trees(trees)
    }
}

/// Builds the gene index from tab-separated annotation lines:
///
/// ```text
/// <reference accession>\t<location>\t<gene accession or *>\t<product>
/// ```
///
/// One reader thread feeds a bounded queue; `options.threads` workers parse
/// lines and insert intervals. Lines with an unknown reference or an
/// unparseable location are skipped and counted.
pub fn build_gene_index<R>(
    source: R,
    accessions: &AccessionIndex,
    num_references: usize,
    mapping: &MappingContext,
    options: &GeneIndexBuildOptions,
) -> Result<(GeneAnnotationIndex, GeneIndexBuildSummary)>
where
    R: BufRead,
{
    options.validate()?;

    let forest = StripedForest::new(options.lock_pool_size);
    let cancellation = Cancellation::new();
    let (sender, receiver) = bounded::<Job>(options.queue_capacity);

    let (produced, worker_summaries) = thread::scope(|s| {
        let handles: Vec<_> = (0..options.threads)
            .map(|_| {
                let receiver = receiver.clone();
                let forest = &forest;
                let cancellation = &cancellation;
                s.spawn(move || {
                    run_worker(cancellation, || {
                        consume_lines(receiver, accessions, mapping, forest, cancellation)
                    })
                })
            })
            .collect();
        drop(receiver);

        let produced = run_worker(&cancellation, || {
            let mut source = source;
            let mut line_no = 0u64;
            loop {
                cancellation.check()?;
                let mut line = Vec::new();
                if source.read_until(b'\n', &mut line)? == 0 {
                    break;
                }
                line_no += 1;
                if sender.send(Job::Line(line_no, line)).is_err() {
                    // every worker is gone
                    break;
                }
            }
            Ok(line_no)
        });
        for _ in 0..options.threads {
            if sender.send(Job::Done).is_err() {
                break;
            }
        }
        drop(sender);

        (produced, join_phase(handles, "gene index build"))
    });

    // a reader failure shows up in the workers only as `Cancelled`
    let (lines_read, summaries) = match (produced, worker_summaries) {
        (Ok(lines), Ok(summaries)) => (lines, summaries),
        (Err(e), Ok(_)) | (Err(e), Err(ProfileError::Cancelled)) => return Err(e),
        (_, Err(e)) => return Err(e),
    };

    let mut summary = GeneIndexBuildSummary::default();
    for s in &summaries {
        summary.add(s);
    }
    let index = forest.into_index(num_references);

    log::info!(
        "Gene index: read {} lines, parsed {}, skipped {}; {} intervals inserted, {} dropped",
        lines_read,
        summary.lines_parsed,
        summary.lines_skipped,
        summary.intervals_inserted,
        summary.intervals_dropped
    );
    Ok((index, summary))
}

fn consume_lines(
    receiver: Receiver<Job>,
    accessions: &AccessionIndex,
    mapping: &MappingContext,
    forest: &StripedForest,
    cancellation: &Cancellation,
) -> Result<GeneIndexBuildSummary> {
    let mut summary = GeneIndexBuildSummary::default();
    while let Ok(job) = receiver.recv() {
        let Job::Line(line_no, line) = job else {
            break;
        };
        cancellation.check()?;
        process_line(line_no, &line, accessions, mapping, forest, &mut summary);
    }
    Ok(summary)
}

fn process_line(
    line_no: u64,
    line: &[u8],
    accessions: &AccessionIndex,
    mapping: &MappingContext,
    forest: &StripedForest,
    summary: &mut GeneIndexBuildSummary,
) {
    let line = trim_line_end(line);
    if line.is_empty() {
        summary.lines_skipped += 1;
        return;
    }
    let fields: Vec<&[u8]> = line.splitn(4, |&b| b == b'\t').collect();
    if fields.len() < 4 {
        summary.lines_skipped += 1;
        return;
    }
    let (ref_accession, location, gene_accession, product) =
        (fields[0], fields[1], fields[2], fields[3]);

    let Some(reference_index) = accessions.get(ref_accession) else {
        summary.lines_skipped += 1;
        return;
    };
    let spans = match std::str::from_utf8(location) {
        Ok(text) => parse_location(text),
        Err(_) => Vec::new(),
    };
    if spans.is_empty() {
        summary.lines_skipped += 1;
        return;
    }

    let explicit_gene = gene_accession != SAME_AS_REFERENCE && !gene_accession.is_empty();
    let accession = if explicit_gene { gene_accession } else { ref_accession };

    let mut gene = GeneRecord {
        product: non_empty(product),
        gene_name: if explicit_gene { non_empty(gene_accession) } else { None },
        protein_id: non_empty(accession),
        ..Default::default()
    };
    mapping.annotate(accession, &mut gene);
    summary.lines_parsed += 1;

    for (start, end) in spans {
        let Some((start, end)) = strand_encode(start, end) else {
            log::debug!("line {}: dropping unencodable interval [{}, {}]", line_no, start, end);
            summary.intervals_dropped += 1;
            continue;
        };
        if !gene_length_in_bounds(start, end) {
            log::debug!(
                "line {}: dropping interval [{}, {}] of length {}",
                line_no,
                start,
                end,
                end as i64 - start as i64 + 1
            );
            summary.intervals_dropped += 1;
            continue;
        }
        forest.insert(
            reference_index,
            PendingGene {
                start,
                end,
                line: line_no,
                gene: gene.clone(),
            },
        );
        summary.intervals_inserted += 1;
    }
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let Some((b'\n' | b'\r', rest)) = line.split_last() {
        line = rest;
    }
    line
}

fn non_empty(bytes: &[u8]) -> Option<Vec<u8>> {
    let bytes = bytes.trim_ascii();
    (!bytes.is_empty()).then(|| bytes.to_vec())
}
