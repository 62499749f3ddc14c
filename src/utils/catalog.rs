use std::collections::BTreeMap;
use std::fmt;

use crate::config::defs::{BARCODE_COUNT, BARCODE_PREFIX};

/// One barcoded sample and the label it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    identifier: String,
    sample_label: String,
}

impl WorkItem {
    /// Builds `barcodeNN`. Without a label the identifier doubles as the label.
    pub fn new(number: usize, sample_label: Option<&str>) -> Self {
        let identifier = format!("{}{:02}", BARCODE_PREFIX, number);
        let sample_label = match sample_label.map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => identifier.clone(),
        };
        WorkItem { identifier, sample_label }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn sample_label(&self) -> &str {
        &self.sample_label
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.identifier == self.sample_label {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "{} ({})", self.identifier, self.sample_label)
        }
    }
}

/// The fixed barcode01..barcode24 work set, in ascending identifier order.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<WorkItem>,
}

impl Catalog {
    pub fn new(labels: &BTreeMap<String, String>) -> Self {
        let items = (1..=BARCODE_COUNT)
            .map(|n| {
                let identifier = format!("{}{:02}", BARCODE_PREFIX, n);
                WorkItem::new(n, labels.get(&identifier).map(String::as_str))
            })
            .collect();
        Catalog { items }
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn get(&self, identifier: &str) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.identifier == identifier)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
