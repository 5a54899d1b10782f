//src/accession.rs

use ahash::AHashMap;
use parking_lot::Mutex;
use std::thread;

use crate::error::{ProfileError, Result};
use crate::oracles::ReferenceAccessor;
use crate::workers::{join_phase, run_worker, Cancellation};

/// Database tags that precede the accession in pipe-delimited ids.
const DB_TAGS: &[&[u8]] = &[b"ref", b"gb", b"emb", b"dbj", b"sp", b"tr"];

/// Accession -> reference index.
#[derive(Debug, Clone, Default)]
pub struct AccessionIndex {
    map: AHashMap<Vec<u8>, u32>,
}

impl AccessionIndex {
    /// Looks up `accession` as given, then without its version suffix.
    pub fn get(&self, accession: &[u8]) -> Option<u32> {
        self.map
            .get(accession)
            .or_else(|| self.map.get(strip_version(accession)))
            .copied()
    }

    /// Number of keys (versioned and unversioned forms count separately).
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Registers `accession` for `index`; the lowest index wins.
    fn register(map: &mut AHashMap<Vec<u8>, u32>, accession: &[u8], index: u32) {
        for key in [accession, strip_version(accession)] {
            map.entry(key.to_vec())
                .and_modify(|v| *v = (*v).min(index))
                .or_insert(index);
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessionScanOptions {
    pub threads: usize,
}

impl Default for AccessionScanOptions {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}

/// Scans every reference header and builds the accession index.
///
/// Worker `w` of `N` handles references `w, w + N, w + 2N, ...`; all workers
/// write into one map behind a single lock.
pub fn build_accession_index<R>(refs: &R, options: &AccessionScanOptions) -> Result<AccessionIndex>
where
    R: ReferenceAccessor + ?Sized,
{
    if options.threads == 0 {
        return Err(ProfileError::InvalidOption("threads must be at least 1".into()));
    }
    let num_refs = refs.num_references();
    let threads = options.threads.min(num_refs.max(1));
    let shared = Mutex::new(AHashMap::with_capacity(num_refs * 2));
    let cancellation = Cancellation::new();

    let counts = thread::scope(|s| {
        let handles = (0..threads)
            .map(|worker| {
                let shared = &shared;
                let cancellation = &cancellation;
                s.spawn(move || {
                    run_worker(cancellation, || {
                        let mut missing = 0usize;
                        for index in (worker..num_refs).step_by(threads) {
                            cancellation.check()?;
                            let index = index as u32;
                            match accession_from_header(refs.header_of(index)) {
                                Some(acc) => {
                                    AccessionIndex::register(&mut shared.lock(), acc, index)
                                }
                                None => missing += 1,
                            }
                        }
                        Ok(missing)
                    })
                })
            })
            .collect();
        join_phase(handles, "accession scan")
    })?;

    let missing: usize = counts.into_iter().sum();
    if missing > 0 {
        log::warn!("{} reference headers carry no accession", missing);
    }
    let index = AccessionIndex {
        map: shared.into_inner(),
    };
    log::info!("Indexed {} accessions from {} references", index.len(), num_refs);
    Ok(index)
}

/// Extracts the accession from a FASTA header.
///
/// `>NC_000913.3 Escherichia coli` gives `NC_000913.3`;
/// `gi|49175990|ref|NC_000913.2|` gives `NC_000913.2`.
pub fn accession_from_header(header: &[u8]) -> Option<&[u8]> {
    let header = header.strip_prefix(b">").unwrap_or(header);
    let token = header
        .split(|b| b.is_ascii_whitespace())
        .find(|t| !t.is_empty())?;

    if !token.contains(&b'|') {
        return Some(token);
    }
    let fields: Vec<&[u8]> = token.split(|&b| b == b'|').collect();
    for pair in fields.windows(2) {
        if DB_TAGS.contains(&pair[0]) && !pair[1].is_empty() {
            return Some(pair[1]);
        }
    }
    fields.into_iter().find(|f| !f.is_empty())
}

/// `NC_000913.3` -> `NC_000913`; accessions without a numeric version are unchanged.
pub fn strip_version(accession: &[u8]) -> &[u8] {
    match accession.iter().rposition(|&b| b == b'.') {
        Some(dot)
            if dot > 0
                && dot + 1 < accession.len()
                && accession[dot + 1..].iter().all(u8::is_ascii_digit) =>
        {
            &accession[..dot]
        }
        _ => accession,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::FastaRecord;
    use crate::references::FastaReferences;

    fn refs(headers: &[&str]) -> FastaReferences {
        FastaReferences::new(
            headers
                .iter()
                .map(|h| FastaRecord {
                    header: h.as_bytes().to_vec(),
                    seq: b"ACGT".to_vec(),
                })
                .collect(),
        )
    }

    #[test]
    fn header_accessions() {
        assert_eq!(accession_from_header(b">NC_000913.3 E. coli"), Some(&b"NC_000913.3"[..]));
        assert_eq!(accession_from_header(b"gi|49175990|ref|NC_000913.2|"), Some(&b"NC_000913.2"[..]));
        assert_eq!(accession_from_header(b"sp|P0A7G6|RECA_ECOLI"), Some(&b"P0A7G6"[..]));
        assert_eq!(accession_from_header(b"   "), None);
    }

    #[test]
    fn version_stripping() {
        assert_eq!(strip_version(b"NC_000913.3"), b"NC_000913");
        assert_eq!(strip_version(b"NC_000913"), b"NC_000913");
        assert_eq!(strip_version(b"abc.def"), b"abc.def");
    }

    #[test]
    fn parallel_scan_matches_sequential_order() {
        let headers: Vec<String> = (0..50).map(|i| format!("ACC_{i}.1 seq {i}")).collect();
        let mut all: Vec<&str> = headers.iter().map(String::as_str).collect();
        // duplicate accession: lowest index must win regardless of scheduling
        all.push("ACC_3.1 duplicate");
        let refs = refs(&all);

        for threads in [1, 3, 8] {
            let index = build_accession_index(&refs, &AccessionScanOptions { threads }).unwrap();
            assert_eq!(index.get(b"ACC_3.1"), Some(3));
            assert_eq!(index.get(b"ACC_49.1"), Some(49));
            assert_eq!(index.get(b"ACC_49"), Some(49));
            assert_eq!(index.get(b"ACC_49.2"), Some(49));
            assert_eq!(index.get(b"ACC_99.1"), None);
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        let refs = refs(&["A.1"]);
        let err = build_accession_index(&refs, &AccessionScanOptions { threads: 0 }).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidOption(_)));
    }
}
