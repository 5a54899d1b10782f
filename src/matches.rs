//src/matches.rs

use std::io::BufRead;

use crate::accession::AccessionIndex;
use crate::error::Result;
use crate::types::MatchCandidate;

/// All candidate alignments of one read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadMatches {
    pub query_name: Vec<u8>,
    pub matches: Vec<MatchCandidate>,
}

/// Counts from reading a match file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchReadSummary {
    pub lines_parsed: usize,
    pub lines_skipped: usize,
}

/// Reads tab-separated alignments grouped by query:
///
/// ```text
/// <query>\t<reference accession>\t<bit score>\t<ref start>\t<ref end>
/// ```
///
/// Consecutive lines with the same query form one group; candidates are
/// returned in descending bit-score order. A line whose reference is unknown
/// is skipped, but its query still appears (possibly with no matches).
/// Lines with a non-finite bit score or a negative coordinate are skipped too.
pub fn read_match_groups<R: BufRead>(
    reader: R,
    accessions: &AccessionIndex,
) -> Result<(Vec<ReadMatches>, MatchReadSummary)> {
    let mut groups: Vec<ReadMatches> = Vec::new();
    let mut summary = MatchReadSummary::default();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            summary.lines_skipped += 1;
            continue;
        }
        let query = fields[0].as_bytes();
        if groups.last().map(|g| g.query_name.as_slice()) != Some(query) {
            groups.push(ReadMatches {
                query_name: query.to_vec(),
                matches: Vec::new(),
            });
        }

        let parsed = (
            accessions.get(fields[1].as_bytes()),
            fields[2].parse::<f32>(),
            fields[3].parse::<i32>(),
            fields[4].parse::<i32>(),
        );
        match parsed {
            (Some(reference_index), Ok(bit_score), Ok(ref_start), Ok(ref_end))
                if bit_score.is_finite() && ref_start >= 0 && ref_end >= 0 =>
            {
                if let Some(group) = groups.last_mut() {
                    group
                        .matches
                        .push(MatchCandidate::new(reference_index, bit_score, ref_start, ref_end));
                }
                summary.lines_parsed += 1;
            }
            _ => summary.lines_skipped += 1,
        }
    }

    for group in &mut groups {
        group
            .matches
            .sort_by(|a, b| b.bit_score.total_cmp(&a.bit_score));
    }

    log::info!(
        "Read {} queries ({} alignments parsed, {} skipped)",
        groups.len(),
        summary.lines_parsed,
        summary.lines_skipped
    );
    Ok((groups, summary))
}
