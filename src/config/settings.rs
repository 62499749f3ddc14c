//! Batch configuration: a TOML file layered under command-line overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::cli::Arguments;
use crate::config::defs::{PipelineError, Segment, BARCODE_COUNT, BARCODE_PREFIX, FILTLONG_TAG, IRMA_TAG, NEXTCLADE_TAG};

/// Label characters that would end a header line, start a record or split a full-label header.
const FORBIDDEN_LABEL_CHARS: &[char] = &['\n', '\r', '>', '|'];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_id")]
    pub batch_id: String,
    #[serde(default)]
    pub sample_prefix: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_min_read_len")]
    pub min_read_len: usize,
    #[serde(default = "default_max_read_len")]
    pub max_read_len: usize,
    #[serde(default = "default_target_bases")]
    pub target_bases: u64,
    #[serde(default = "default_keep_percent")]
    pub keep_percent: f64,
    #[serde(default = "default_irma_profile")]
    pub irma_profile: String,
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default)]
    pub reference_collection: Option<PathBuf>,
    /// Segment name -> exact header of its record in the reference collection.
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    /// Barcode identifier -> sample label.
    #[serde(default)]
    pub samples: BTreeMap<String, String>,
    #[serde(default)]
    pub tools: ToolConfig,
}

/// Command vectors for the external tools. The first element is the program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_filtlong")]
    pub filtlong: Vec<String>,
    #[serde(default = "default_irma")]
    pub irma: Vec<String>,
    #[serde(default = "default_nextclade")]
    pub nextclade: Vec<String>,
}

fn default_batch_id() -> String { "batch".to_string() }
fn default_concurrency() -> usize { 4 }
fn default_min_read_len() -> usize { 200 }
fn default_max_read_len() -> usize { 3000 }
fn default_target_bases() -> u64 { 100_000_000 }
fn default_keep_percent() -> f64 { 90.0 }
fn default_irma_profile() -> String { "FLU-minion".to_string() }
fn default_raw_dir() -> PathBuf { PathBuf::from("fastq_pass") }
fn default_filtlong() -> Vec<String> { vec![FILTLONG_TAG.to_string()] }
fn default_irma() -> Vec<String> { vec![IRMA_TAG.to_string()] }
fn default_nextclade() -> Vec<String> { vec![NEXTCLADE_TAG.to_string()] }

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            filtlong: default_filtlong(),
            irma: default_irma(),
            nextclade: default_nextclade(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_id: default_batch_id(),
            sample_prefix: String::new(),
            concurrency: default_concurrency(),
            min_read_len: default_min_read_len(),
            max_read_len: default_max_read_len(),
            target_bases: default_target_bases(),
            keep_percent: default_keep_percent(),
            irma_profile: default_irma_profile(),
            raw_dir: default_raw_dir(),
            reference_collection: None,
            references: BTreeMap::new(),
            samples: BTreeMap::new(),
            tools: ToolConfig::default(),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BatchConfig, PipelineError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::InvalidConfig(format!("Cannot read {}: {}", path.display(), e))
    })?;
    toml::from_str(&contents)
        .map_err(|e| PipelineError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e)))
}

impl BatchConfig {
    /// Loads the optional TOML file and applies any command-line overrides.
    pub fn from_args(args: &Arguments) -> Result<Self, PipelineError> {
        let mut config = match &args.config {
            Some(path) => load_config(path)?,
            None => BatchConfig::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Arguments) {
        if let Some(batch_id) = &args.batch_id {
            self.batch_id = batch_id.clone();
        }
        if let Some(prefix) = &args.sample_prefix {
            self.sample_prefix = prefix.clone();
        }
        if let Some(raw_dir) = &args.raw_dir {
            self.raw_dir = PathBuf::from(raw_dir);
        }
        if let Some(reference) = &args.reference_collection {
            self.reference_collection = Some(PathBuf::from(reference));
        }
        if let Some(concurrency) = args.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(min) = args.min_read_len {
            self.min_read_len = min;
        }
        if let Some(max) = args.max_read_len {
            self.max_read_len = max;
        }
        if let Some(target) = args.target_bases {
            self.target_bases = target;
        }
        if let Some(keep) = args.keep_percent {
            self.keep_percent = keep;
        }
        if let Some(profile) = &args.irma_profile {
            self.irma_profile = profile.clone();
        }
    }

    /// Anchors relative input paths at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.raw_dir.is_relative() {
            self.raw_dir = base.join(&self.raw_dir);
        }
        if let Some(reference) = &self.reference_collection {
            if reference.is_relative() {
                self.reference_collection = Some(base.join(reference));
            }
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("batch_id must not be empty".to_string()));
        }
        if self.batch_id.contains('/') {
            return Err(PipelineError::InvalidConfig(format!("batch_id '{}' must not contain '/'", self.batch_id)));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidConfig("concurrency must be at least 1".to_string()));
        }
        if self.max_read_len < self.min_read_len {
            return Err(PipelineError::InvalidConfig(format!(
                "max_read_len ({}) is below min_read_len ({})",
                self.max_read_len, self.min_read_len
            )));
        }
        if !(self.keep_percent > 0.0 && self.keep_percent <= 100.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "keep_percent must be in (0, 100], got {}",
                self.keep_percent
            )));
        }
        for (name, command) in [
            (FILTLONG_TAG, &self.tools.filtlong),
            (IRMA_TAG, &self.tools.irma),
            (NEXTCLADE_TAG, &self.tools.nextclade),
        ] {
            if command.is_empty() {
                return Err(PipelineError::InvalidConfig(format!("Empty command for {}", name)));
            }
        }
        for key in self.references.keys() {
            key.parse::<Segment>()?;
        }
        for (identifier, label) in &self.samples {
            if let Some(c) = label.chars().find(|c| FORBIDDEN_LABEL_CHARS.contains(c)) {
                return Err(PipelineError::InvalidConfig(format!(
                    "Sample label {:?} for {} contains {:?}, which would break pooled FASTA headers",
                    label, identifier, c
                )));
            }
            if !is_catalog_identifier(identifier) {
                warn!("Sample label for '{}' ignored: not a barcode01..barcode{:02} identifier", identifier, BARCODE_COUNT);
            }
        }
        Ok(())
    }

    /// Typed segment -> reference name table. Every segment must be named.
    pub fn reference_names(&self) -> Result<BTreeMap<Segment, String>, PipelineError> {
        let mut names = BTreeMap::new();
        for (key, name) in &self.references {
            names.insert(key.parse::<Segment>()?, name.trim().to_string());
        }
        let missing: Vec<&str> = Segment::ALL
            .iter()
            .filter(|seg| names.get(seg).map_or(true, |n| n.is_empty()))
            .map(|seg| seg.name())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "No reference name configured for segment(s): {}",
                missing.join(", ")
            )));
        }
        Ok(names)
    }
}

fn is_catalog_identifier(identifier: &str) -> bool {
    identifier
        .strip_prefix(BARCODE_PREFIX)
        .filter(|digits| digits.len() == 2)
        .and_then(|digits| digits.parse::<usize>().ok())
        .map_or(false, |n| (1..=BARCODE_COUNT).contains(&n))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_TOML: &str = r#"
batch_id = "RUN07"
sample_prefix = "FLU"
concurrency = 8
keep_percent = 85.5

[references]
PB2 = "A/California/07/2009|PB2"
HA = "A/California/07/2009|HA"

[samples]
barcode01 = "Patient-A"
barcode12 = "Patient-L"

[tools]
irma = ["conda", "run", "-n", "irma", "IRMA"]
"#;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.irma_profile, "FLU-minion");
        assert_eq!(config.tools.filtlong, vec!["filtlong".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_TOML.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.batch_id, "RUN07");
        assert_eq!(config.sample_prefix, "FLU");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.keep_percent, 85.5);
        assert_eq!(config.min_read_len, 200);
        assert_eq!(config.samples.get("barcode12").map(String::as_str), Some("Patient-L"));
        assert_eq!(config.tools.irma.len(), 5);
        assert_eq!(config.tools.nextclade, vec!["nextclade".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_TOML.as_bytes()).unwrap();

        let args = Arguments {
            config: Some(file.path().to_string_lossy().into_owned()),
            batch_id: Some("RUN08".to_string()),
            concurrency: Some(2),
            ..Default::default()
        };
        let config = BatchConfig::from_args(&args).unwrap();
        assert_eq!(config.batch_id, "RUN08");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.sample_prefix, "FLU");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BatchConfig::default();
        config.concurrency = 0;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut config = BatchConfig::default();
        config.max_read_len = 10;
        config.min_read_len = 100;
        assert!(config.validate().is_err());

        let mut config = BatchConfig::default();
        config.keep_percent = 0.0;
        assert!(config.validate().is_err());

        let mut config = BatchConfig::default();
        config.references.insert("M2".to_string(), "ref".to_string());
        assert!(config.validate().is_err());

        let mut config = BatchConfig::default();
        config.tools.irma.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_header_breaking_labels() {
        for label in ["Ward\n3", "Ward\r3", ">Ward3", "Ward|3"] {
            let mut config = BatchConfig::default();
            config.samples.insert("barcode03".to_string(), label.to_string());
            assert!(
                matches!(config.validate(), Err(PipelineError::InvalidConfig(_))),
                "label {:?} accepted",
                label
            );
        }

        let mut config = BatchConfig::default();
        config.samples.insert("barcode03".to_string(), "A/Ward 3-17_b".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reference_names_requires_every_segment() {
        let mut config = BatchConfig::default();
        config.references.insert("HA".to_string(), "ref_HA".to_string());
        let err = config.reference_names().unwrap_err();
        assert!(err.to_string().contains("PB2"));
        assert!(!err.to_string().contains("HA,"));

        for seg in Segment::ALL {
            config.references.insert(seg.name().to_string(), format!("ref_{}", seg));
        }
        let names = config.reference_names().unwrap();
        assert_eq!(names.len(), 8);
        assert_eq!(names[&Segment::NS], "ref_NS");
    }

    #[test]
    fn test_catalog_identifier() {
        assert!(is_catalog_identifier("barcode01"));
        assert!(is_catalog_identifier("barcode24"));
        assert!(!is_catalog_identifier("barcode25"));
        assert!(!is_catalog_identifier("barcode1"));
        assert!(!is_catalog_identifier("sample01"));
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = BatchConfig::default();
        config.reference_collection = Some(PathBuf::from("refs/flu.fasta"));
        config.resolve_paths(Path::new("/data/run"));
        assert_eq!(config.raw_dir, PathBuf::from("/data/run/fastq_pass"));
        assert_eq!(config.reference_collection, Some(PathBuf::from("/data/run/refs/flu.fasta")));
    }
}
