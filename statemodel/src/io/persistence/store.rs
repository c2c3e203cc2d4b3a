//! Record stores the persistence listener writes into.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::config::write_atomic;
use crate::io::persistence::schema::EntityRecord;

const STORE_VERSION: u32 = 1;

/// Keyed record storage. Upserts replace the record with the same class and key.
pub trait RecordStore: Send {
    fn upsert(&mut self, record: EntityRecord) -> Result<()>;

    fn remove(&mut self, class: &str, key: &str) -> Result<bool>;

    fn get(&self, class: &str, key: &str) -> Option<&EntityRecord>;

    /// Records of `class` in key order.
    fn records(&self, class: &str) -> Vec<&EntityRecord>;

    /// Record count per class.
    fn counts(&self) -> BTreeMap<String, usize>;

    /// Make every accepted write durable.
    fn flush(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    classes: BTreeMap<String, BTreeMap<String, EntityRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all(&self) -> impl Iterator<Item = &EntityRecord> {
        self.classes.values().flat_map(BTreeMap::values)
    }
}

impl RecordStore for MemoryRecordStore {
    fn upsert(&mut self, record: EntityRecord) -> Result<()> {
        if record.key.is_empty() {
            bail!("record of class {} has no key", record.class);
        }
        self.classes
            .entry(record.class.clone())
            .or_default()
            .insert(record.key.clone(), record);
        Ok(())
    }

    fn remove(&mut self, class: &str, key: &str) -> Result<bool> {
        Ok(self
            .classes
            .get_mut(class)
            .is_some_and(|records| records.remove(key).is_some()))
    }

    fn get(&self, class: &str, key: &str) -> Option<&EntityRecord> {
        self.classes.get(class).and_then(|records| records.get(key))
    }

    fn records(&self, class: &str) -> Vec<&EntityRecord> {
        self.classes
            .get(class)
            .map(|records| records.values().collect())
            .unwrap_or_default()
    }

    fn counts(&self) -> BTreeMap<String, usize> {
        self.classes
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(class, records)| (class.clone(), records.len()))
            .collect()
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    records: Vec<EntityRecord>,
}

/// Store kept in memory and written to one JSON file on flush.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: PathBuf,
    records: MemoryRecordStore,
    dirty: bool,
}

impl JsonRecordStore {
    /// Open `path`, loading existing records. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let mut records = MemoryRecordStore::new();
        if path.exists() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read store {}", path.display()))?;
            let document: StoreDocument = serde_json::from_str(&contents)
                .with_context(|| format!("parse store {}", path.display()))?;
            if document.version != STORE_VERSION {
                bail!(
                    "store {} has version {}, expected {STORE_VERSION}",
                    path.display(),
                    document.version
                );
            }
            for record in document.records {
                records.upsert(record)?;
            }
            debug!(path = %path.display(), records = records.len(), "store loaded");
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonRecordStore {
    fn upsert(&mut self, record: EntityRecord) -> Result<()> {
        self.records.upsert(record)?;
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, class: &str, key: &str) -> Result<bool> {
        let removed = self.records.remove(class, key)?;
        self.dirty |= removed;
        Ok(removed)
    }

    fn get(&self, class: &str, key: &str) -> Option<&EntityRecord> {
        self.records.get(class, key)
    }

    fn records(&self, class: &str) -> Vec<&EntityRecord> {
        self.records.records(class)
    }

    fn counts(&self) -> BTreeMap<String, usize> {
        self.records.counts()
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let document = StoreDocument {
            version: STORE_VERSION,
            records: self.records.all().cloned().collect(),
        };
        let mut buf = serde_json::to_string_pretty(&document).context("serialize store")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)?;
        self.dirty = false;
        debug!(path = %self.path.display(), records = document.records.len(), "store written");
        Ok(())
    }
}
