use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;

use crate::config::defs::{PipelineError, Segment};
use crate::utils::fastx::{read_segment_records, SegmentRecord};

/// Per-segment reference files in a scratch directory that is deleted on drop.
#[derive(Debug)]
pub struct ReferenceSet {
    dir: TempDir,
    paths: BTreeMap<Segment, PathBuf>,
}

impl ReferenceSet {
    pub fn path(&self, segment: Segment) -> Option<&Path> {
        self.paths.get(&segment).map(PathBuf::as_path)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Pulls one named record per segment out of a multi-record reference collection.
///
/// Every name is resolved before anything is written, so a failed lookup leaves no files behind.
///
/// # Arguments
///
/// * `collection` - Multi-record FASTA holding the references.
/// * `names` - Segment -> exact header of the wanted record.
/// * `scratch_parent` - Directory in which the scratch directory is created.
///
/// # Returns
/// ReferenceSet, or the first lookup failure.
pub fn extract_references(
    collection: &Path,
    names: &BTreeMap<Segment, String>,
    scratch_parent: &Path,
) -> Result<ReferenceSet, PipelineError> {
    if !collection.is_file() {
        return Err(PipelineError::MissingReference(collection.to_path_buf()));
    }
    let records = read_segment_records(collection)?;

    let mut selected: Vec<(Segment, &SegmentRecord)> = Vec::with_capacity(names.len());
    for (segment, name) in names {
        let matches: Vec<&SegmentRecord> = records.iter().filter(|r| r.header == *name).collect();
        let record = match matches.as_slice() {
            [] => {
                return Err(PipelineError::ReferenceNotFound {
                    segment: *segment,
                    name: name.clone(),
                    collection: collection.to_path_buf(),
                });
            }
            [record] => *record,
            _ => {
                return Err(PipelineError::DuplicateReference {
                    segment: *segment,
                    name: name.clone(),
                    count: matches.len(),
                });
            }
        };
        if record.is_empty() {
            return Err(PipelineError::EmptyReference {
                segment: *segment,
                name: name.clone(),
            });
        }
        selected.push((*segment, record));
    }

    let dir = tempfile::Builder::new()
        .prefix("references_")
        .tempdir_in(scratch_parent)?;
    let mut paths = BTreeMap::new();
    for (segment, record) in selected {
        let path = dir.path().join(format!("{}_reference.fasta", segment));
        let mut writer = BufWriter::new(File::create(&path)?);
        record.write_to(&mut writer)?;
        writer.flush()?;
        debug!("Extracted {} reference '{}' to {}", segment, record.header, path.display());
        paths.insert(segment, path);
    }

    Ok(ReferenceSet { dir, paths })
}
