//src/reader.rs

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Opens a file for buffered line reading, transparently decompressing `.gz`.
pub fn open_reader(path: &Path) -> std::io::Result<Box<dyn BufRead + Send>> {
    let f = File::open(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead + Send> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// A FASTA record: header without the leading `>` and the raw sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct FastaRecord {
    pub header: Vec<u8>,
    pub seq: Vec<u8>,
}

/// Reads all FASTA records from `reader`. Multi-line sequences are joined.
pub fn read_fasta_records<R: BufRead>(mut reader: R) -> std::io::Result<Vec<FastaRecord>> {
    let mut records = Vec::new();
    let mut line = Vec::new();
    let mut current: Option<FastaRecord> = None;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if let Some(header) = line.strip_prefix(b">") {
            if let Some(rec) = current.take() {
                records.push(rec);
            }
            current = Some(FastaRecord {
                header: header.to_vec(),
                seq: Vec::new(),
            });
        } else if let Some(rec) = current.as_mut() {
            rec.seq.extend_from_slice(&line);
        }
        // sequence lines before the first header are ignored
    }
    if let Some(rec) = current {
        records.push(rec);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_multiline_fasta() {
        let data = b">NC_1.1 first\nACGT\nAC\r\n>NC_2.1\nGG\n";
        let recs = read_fasta_records(&data[..]).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].header, b"NC_1.1 first");
        assert_eq!(recs[0].seq, b"ACGTAC");
        assert_eq!(recs[1].seq, b"GG");
    }

    #[test]
    fn gz_input_is_decompressed() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.fa.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b">a\nACGT\n").unwrap();
        enc.finish().unwrap();

        let recs = read_fasta_records(open_reader(&path).unwrap()).unwrap();
        assert_eq!(recs, vec![FastaRecord { header: b"a".to_vec(), seq: b"ACGT".to_vec() }]);
    }
}
