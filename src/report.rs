//src/report.rs

use std::fmt::Write as FmtWrite;

use crate::classify::MergedProfile;
use crate::taxdb::NameMap;
use crate::types::GeneRecord;

/// One row of the organism report.
#[derive(Debug, Clone)]
pub struct ProfileReportRow {
    pub tax_id: i32,
    pub tax_name: Option<String>,
    pub read_count: usize,
    /// Share of all reads, including unassigned ones.
    pub percent: f64,
    pub genes: Vec<GeneRecord>,
    /// Sorted read names.
    pub read_names: Vec<Vec<u8>>,
}

/// Report-ready view of a merged profile, rows by descending read count.
#[derive(Debug, Clone, Default)]
pub struct ProfileReport {
    pub rows: Vec<ProfileReportRow>,
    pub total_reads: u64,
}

impl ProfileReport {
    pub fn from_profile(profile: &MergedProfile, names: Option<&NameMap>) -> Self {
        let total = profile.total_reads;
        let mut rows: Vec<ProfileReportRow> = profile
            .iter()
            .map(|(tax_id, organism)| {
                let mut read_names = organism.query_names.clone();
                read_names.sort_unstable();
                ProfileReportRow {
                    tax_id,
                    tax_name: names.and_then(|n| n.get(&tax_id).cloned()),
                    read_count: organism.read_count(),
                    percent: if total == 0 {
                        0.0
                    } else {
                        100.0 * organism.read_count() as f64 / total as f64
                    },
                    genes: organism.genes.clone(),
                    read_names,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.read_count.cmp(&a.read_count).then(a.tax_id.cmp(&b.tax_id)));

        Self {
            rows,
            total_reads: total,
        }
    }

    pub fn assigned_reads(&self) -> usize {
        self.rows.iter().map(|r| r.read_count).sum()
    }

    /// Organism summary, one line per taxon.
    pub fn to_tsv(&self) -> String {
        let mut output = String::new();
        output.push_str("%\treads\ttaxID\ttaxName\tgenes\n");
        for row in &self.rows {
            let genes: Vec<String> = row
                .genes
                .iter()
                .filter_map(|g| g.dedup_key())
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .collect();
            let _ = writeln!(
                output,
                "{:.4}\t{}\t{}\t{}\t{}",
                row.percent,
                row.read_count,
                row.tax_id,
                row.tax_name.as_deref().unwrap_or("-"),
                genes.join(",")
            );
        }
        output
    }

    /// `read\ttaxID` for every assigned read.
    pub fn read_assignments_tsv(&self) -> String {
        let mut output = String::new();
        for row in &self.rows {
            for name in &row.read_names {
                let _ = writeln!(output, "{}\t{}", String::from_utf8_lossy(name), row.tax_id);
            }
        }
        output
    }
}
