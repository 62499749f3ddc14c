use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use seq_io::fasta::{Reader as FastaReader, Record as FastaRecord};
use seq_io::fastq::{Reader as FastqReader, Record as FastqRecord};

use crate::config::defs::PipelineError;
use crate::utils::file::open_reader;

/// One FASTA entry. The header excludes the `>` sentinel; body lines are kept as written,
/// including blank lines inside the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    pub header: String,
    pub body: Vec<String>,
}

impl SegmentRecord {
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(|line| line.trim().is_empty())
    }

    pub fn write_with_header<W: Write>(&self, writer: &mut W, header: &str) -> io::Result<()> {
        writer.write_all(b">")?;
        writer.write_all(header.as_bytes())?;
        writer.write_all(b"\n")?;
        for line in &self.body {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.write_with_header(writer, &self.header)
    }
}

/// Parses every record of a (optionally gzipped) FASTA file.
///
/// # Arguments
///
/// * `path` - FASTA file.
///
/// # Returns
/// Records in file order. An empty file yields no records; text before the first `>` is an error.
pub fn read_segment_records(path: &Path) -> Result<Vec<SegmentRecord>, PipelineError> {
    let reader = open_reader(path)?;
    let mut fasta = FastaReader::new(reader);
    let mut records = Vec::new();

    while let Some(result) = fasta.next() {
        let record = result.map_err(|e| PipelineError::InvalidFasta {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let header = String::from_utf8_lossy(record.head()).into_owned();
        let mut body: Vec<String> = record
            .seq_lines()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();
        // Blank lines separating records belong to no record.
        while body.last().is_some_and(|line| line.is_empty()) {
            body.pop();
        }
        records.push(SegmentRecord { header, body });
    }
    Ok(records)
}

pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    head: &[u8],
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    // Write header
    writer.write_all(b"@")?;
    writer.write_all(head)?;
    writer.write_all(b"\n")?;

    // Write sequence
    writer.write_all(seq)?;
    writer.write_all(b"\n")?;

    // Write separator
    writer.write_all(b"+")?;
    writer.write_all(b"\n")?;

    // Write quality scores
    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    pub files: usize,
    pub kept: u64,
    pub oversized: u64,
    pub empty: u64,
}

/// Concatenates FASTQ files into one uncompressed FASTQ, dropping empty reads and reads
/// longer than `max_read_len`.
pub fn concatenate_fastq(
    inputs: &[PathBuf],
    output: &Path,
    max_read_len: usize,
) -> Result<ReadStats, PipelineError> {
    let mut writer = BufWriter::new(File::create(output)?);
    let mut stats = ReadStats::default();

    for input in inputs {
        let mut fastq = FastqReader::new(open_reader(input)?);
        while let Some(result) = fastq.next() {
            let record = result.map_err(|e| PipelineError::Other(anyhow::anyhow!(
                "Invalid FASTQ in {}: {}",
                input.display(),
                e
            )))?;
            let seq = record.seq();
            if seq.is_empty() {
                stats.empty += 1;
                continue;
            }
            if seq.len() > max_read_len {
                stats.oversized += 1;
                continue;
            }
            write_fastq_record(&mut writer, record.head(), seq, record.qual())?;
            stats.kept += 1;
        }
        stats.files += 1;
    }

    writer.flush()?;
    Ok(stats)
}
