//src/references.rs

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::oracles::ReferenceAccessor;
use crate::reader::{open_reader, read_fasta_records, FastaRecord};

/// Reference sequences held in memory, indexed by file order.
#[derive(Debug, Clone, Default)]
pub struct FastaReferences {
    records: Vec<FastaRecord>,
}

impl FastaReferences {
    pub fn new(records: Vec<FastaRecord>) -> Self {
        Self { records }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let records = read_fasta_records(open_reader(path.as_ref())?)?;
        let total: usize = records.iter().map(|r| r.seq.len()).sum();
        log::info!("Loaded {} reference sequences ({} bp)", records.len(), total);
        Ok(Self { records })
    }

    /// Writes all records as FASTA, 80 bases per line.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        for rec in &self.records {
            writer.write_all(b">")?;
            writer.write_all(&rec.header)?;
            writer.write_all(b"\n")?;
            for line in rec.seq.chunks(80) {
                writer.write_all(line)?;
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn sequence_of(&self, index: u32) -> &[u8] {
        self.records
            .get(index as usize)
            .map(|r| r.seq.as_slice())
            .unwrap_or(&[])
    }
}

impl ReferenceAccessor for FastaReferences {
    fn num_references(&self) -> usize {
        self.records.len()
    }

    fn header_of(&self, index: u32) -> &[u8] {
        self.records
            .get(index as usize)
            .map(|r| r.header.as_slice())
            .unwrap_or(&[])
    }

    fn sequence_length_of(&self, index: u32) -> usize {
        self.sequence_of(index).len()
    }

    fn extend_header(&mut self, index: u32, tag: &str, value: &str) {
        if let Some(rec) = self.records.get_mut(index as usize) {
            rec.header.push(b' ');
            rec.header.extend_from_slice(tag.as_bytes());
            rec.header.push(b'|');
            rec.header.extend_from_slice(value.as_bytes());
        }
    }
}
