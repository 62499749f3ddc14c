use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::config::defs::FASTQ_EXTS;

/// Plain or gzip-compressed input, picked from the magic bytes.
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let file = BufReader::new(File::open(path)?);
    if gz {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(file))
    }
}

/// True for `reads.fastq`, `reads.fq.gz` and similar.
pub fn is_fastq_name(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_ascii_lowercase(),
        None => return false,
    };
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    FASTQ_EXTS
        .iter()
        .any(|ext| name.strip_suffix(ext).map_or(false, |stem| stem.ends_with('.')))
}

/// FASTQ files directly inside `dir`, sorted by name for a stable concatenation order.
pub fn list_fastq_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_fastq_name(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Removes a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_fastq_names() {
        assert!(is_fastq_name(Path::new("a/reads.fastq")));
        assert!(is_fastq_name(Path::new("reads_0.fq.gz")));
        assert!(is_fastq_name(Path::new("READS.FASTQ.GZ")));
        assert!(!is_fastq_name(Path::new("reads.fasta")));
        assert!(!is_fastq_name(Path::new("fastq")));
        assert!(!is_fastq_name(Path::new("sequencing_summary.txt")));
    }

    #[test]
    fn test_open_reader_handles_gzip_and_plain() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.fastq");
        fs::write(&plain, b"@r1\nACGT\n+\nIIII\n").unwrap();

        let gz = dir.path().join("b.fastq.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"@r2\nTTTT\n+\nIIII\n").unwrap();
        encoder.finish().unwrap();

        let mut text = String::new();
        open_reader(&gz).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "@r2\nTTTT\n+\nIIII\n");
        assert!(!is_gzipped(&plain).unwrap());

        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let files = list_fastq_files(dir.path()).unwrap();
        assert_eq!(files, vec![plain, gz]);
    }

    #[test]
    fn test_empty_file_is_not_gzipped() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.fastq");
        fs::write(&empty, b"").unwrap();
        assert!(!is_gzipped(&empty).unwrap());
        remove_if_exists(&empty).unwrap();
        remove_if_exists(&empty).unwrap();
        assert!(!empty.exists());
    }
}
