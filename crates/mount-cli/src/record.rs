//! JSON-file backed record
//!
//! Persists slot columns as a flat JSON object, e.g.
//! `{"images": ["a.png", "b.png"], "avatar": "me.jpg"}`.
//!
//! The file stem is the record's key in storage, so `alice.json` stores
//! under `<store_dir>/<slot>/alice/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use mount_core::{ColumnValue, MountRegistry, MountedRecord};
use mount_uploaders::{sanitize_filename, Storage, StoredUploader, UploaderSettings};

pub struct JsonRecord {
    path: PathBuf,
    key: String,
    columns: BTreeMap<String, ColumnValue>,
    mounts: MountRegistry,
    storage: Arc<dyn Storage>,
    settings: Arc<UploaderSettings>,
}

impl JsonRecord {
    /// Load the record at `path`; a missing file is an empty record
    pub fn load(
        path: impl AsRef<Path>,
        mounts: MountRegistry,
        storage: Arc<dyn Storage>,
        settings: Arc<UploaderSettings>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let key = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(sanitize_filename)
            .context("record file needs a file name")?;
        let columns = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            key,
            columns,
            mounts,
            storage,
            settings,
        })
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.columns)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    /// Persist identifiers into a column; `None` clears it
    pub fn write_uploader(&mut self, column: &str, value: Option<ColumnValue>) {
        match value {
            Some(value) => {
                self.columns.insert(column.to_string(), value);
            }
            None => {
                self.columns.remove(column);
            }
        }
    }

    pub fn columns(&self) -> &BTreeMap<String, ColumnValue> {
        &self.columns
    }
}

impl MountedRecord for JsonRecord {
    type Uploader = StoredUploader;

    fn read_uploader(&self, column: &str) -> Option<ColumnValue> {
        self.columns.get(column).cloned()
    }

    fn mounts(&self) -> &MountRegistry {
        &self.mounts
    }

    fn blank_uploader(&self, mounted_as: &str) -> StoredUploader {
        StoredUploader::new(
            self.key.as_str(),
            mounted_as,
            self.storage.clone(),
            self.settings.clone(),
        )
    }
}
