//! Storage-backed uploader
//!
//! `StoredUploader` is the stock `Uploader`: it validates and processes raw
//! uploads, parks them under the cache prefix, and moves them under the
//! store prefix on `store()`.
//!
//! Keys:
//! - cached: `<cache_dir>/<cache_id>/<filename>`
//! - stored: `<store_dir>/<mounted_as>/<model_key>/<filename>`
//!
//! `model_key` names the owning record, so two records never share a stored key.
//!
//! Versions live next to the main file as `<version>_<filename>`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use mount_core::config::UploaderConfig;
use mount_core::error::{UploadError, UploadResult};
use mount_core::traits::Uploader;
use mount_core::types::{UploadedFile, UrlOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::storage::{guess_content_type, Storage};

static CACHE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}-\d{4}-\d+-\d{4}$").expect("valid cache id pattern"));

static FILENAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.\-+_]+$").expect("valid filename pattern"));

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9.\-+_]").expect("valid sanitize pattern"));

static CACHE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a cache id: `YYYYMMDD-HHMM-PID-NNNN`
pub fn generate_cache_id() -> String {
    let counter = CACHE_COUNTER.fetch_add(1, Ordering::Relaxed) % 10_000;
    format!(
        "{}-{}-{:04}",
        Utc::now().format("%Y%m%d-%H%M"),
        std::process::id(),
        counter
    )
}

/// Replace characters that are unsafe in storage keys
pub fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(base, "_").to_string();

    // Never produce a dot-only name
    if sanitized.chars().all(|c| c == '.') {
        "_".repeat(sanitized.len().max(1))
    } else {
        sanitized
    }
}

/// Allowed file types configuration
#[derive(Debug, Clone)]
pub struct AllowedFileTypes {
    /// Allowed extensions (empty = allow all)
    pub extension_allowlist: Vec<String>,
    /// Blocked extensions
    pub extension_denylist: Vec<String>,
    /// Blocked MIME types
    pub blocked_mime_types: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
}

impl Default for AllowedFileTypes {
    fn default() -> Self {
        Self::from_config(&UploaderConfig::default())
    }
}

impl AllowedFileTypes {
    pub fn from_config(config: &UploaderConfig) -> Self {
        Self {
            extension_allowlist: config.extension_allowlist.clone(),
            extension_denylist: config.extension_denylist.clone(),
            blocked_mime_types: vec![
                "application/x-msdownload".to_string(),
                "application/x-executable".to_string(),
            ],
            max_file_size: config.max_file_size,
        }
    }

    /// Integrity check for a raw upload
    pub fn check(&self, file: &UploadedFile) -> UploadResult<()> {
        if file.size() > self.max_file_size {
            return Err(UploadError::integrity(format!(
                "{} is too large: {} bytes (max: {} bytes)",
                file.filename,
                file.size(),
                self.max_file_size
            )));
        }

        let extension = file.extension().unwrap_or_default();

        if self.extension_denylist.iter().any(|e| *e == extension) {
            return Err(UploadError::integrity(format!(
                "You are not allowed to upload {:?} files",
                extension
            )));
        }

        if !self.extension_allowlist.is_empty()
            && !self.extension_allowlist.iter().any(|e| *e == extension)
        {
            return Err(UploadError::integrity(format!(
                "You are not allowed to upload {:?} files, allowed types: {}",
                extension,
                self.extension_allowlist.join(", ")
            )));
        }

        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&file.filename));
        if self.blocked_mime_types.iter().any(|t| *t == content_type) {
            return Err(UploadError::integrity(format!(
                "Invalid content type: {}",
                content_type
            )));
        }

        Ok(())
    }
}

/// Transformation applied to cached bytes (resize, transcode, ...)
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, file: &UploadedFile) -> Result<Bytes, String>;
}

/// Fetches a remote file for `Uploader::download`
pub trait Downloader: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<UploadedFile, String>;
}

/// Serves `file://` URLs from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDownloader;

impl Downloader for FileDownloader {
    fn fetch(&self, url: &Url) -> Result<UploadedFile, String> {
        if url.scheme() != "file" {
            return Err(format!("unsupported scheme: {}", url.scheme()));
        }

        let path = url
            .to_file_path()
            .map_err(|_| format!("not a local path: {url}"))?;
        let data = std::fs::read(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("download")
            .to_string();

        Ok(UploadedFile::new(filename, data))
    }
}

/// Canned responses keyed by URL, for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryDownloader {
    responses: HashMap<String, Bytes>,
}

impl MemoryDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.responses.insert(url.into(), data.into());
        self
    }
}

impl Downloader for MemoryDownloader {
    fn fetch(&self, url: &Url) -> Result<UploadedFile, String> {
        let data = self
            .responses
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| format!("404 Not Found: {url}"))?;
        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("download")
            .to_string();

        Ok(UploadedFile::new(filename, data))
    }
}

/// Shared definition of an uploader kind: paths, validation, pipeline
pub struct UploaderSettings {
    pub cache_dir: String,
    pub store_dir: String,
    pub allowed_types: AllowedFileTypes,
    processors: Vec<Arc<dyn Processor>>,
    versions: Vec<(String, Arc<dyn Processor>)>,
    downloader: Arc<dyn Downloader>,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self::from_config(&UploaderConfig::default())
    }
}

impl UploaderSettings {
    pub fn from_config(config: &UploaderConfig) -> Self {
        Self {
            cache_dir: config.cache_dir.trim_end_matches('/').to_string(),
            store_dir: config.store_dir.trim_end_matches('/').to_string(),
            allowed_types: AllowedFileTypes::from_config(config),
            processors: Vec::new(),
            versions: Vec::new(),
            downloader: Arc::new(FileDownloader),
        }
    }

    /// Add a processor applied to the main file
    pub fn process(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Add a named version derived from the processed main file
    pub fn version(mut self, name: impl Into<String>, processor: impl Processor + 'static) -> Self {
        self.versions.push((name.into(), Arc::new(processor)));
        self
    }

    pub fn downloader(mut self, downloader: impl Downloader + 'static) -> Self {
        self.downloader = Arc::new(downloader);
        self
    }

    pub fn version_names(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|(name, _)| name.as_str())
    }

    fn has_version(&self, name: &str) -> bool {
        self.versions.iter().any(|(v, _)| v == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileState {
    Blank,
    Cached { cache_id: String, filename: String },
    Stored { filename: String },
    Removed,
}

/// Uploader backed by a `Storage`
pub struct StoredUploader {
    model_key: String,
    mounted_as: String,
    storage: Arc<dyn Storage>,
    settings: Arc<UploaderSettings>,
    state: FileState,
}

impl StoredUploader {
    pub fn new(
        model_key: impl Into<String>,
        mounted_as: impl Into<String>,
        storage: Arc<dyn Storage>,
        settings: Arc<UploaderSettings>,
    ) -> Self {
        Self {
            model_key: model_key.into(),
            mounted_as: mounted_as.into(),
            storage,
            settings,
            state: FileState::Blank,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self.state, FileState::Stored { .. })
    }

    /// Storage key of the main file or of a version
    pub fn path(&self, version: Option<&str>) -> Option<String> {
        let prefix = version.map(|v| format!("{v}_")).unwrap_or_default();
        match &self.state {
            FileState::Cached { cache_id, filename } => Some(format!(
                "{}/{}/{}{}",
                self.settings.cache_dir, cache_id, prefix, filename
            )),
            FileState::Stored { filename } => Some(format!(
                "{}/{}/{}/{}{}",
                self.settings.store_dir, self.mounted_as, self.model_key, prefix, filename
            )),
            FileState::Blank | FileState::Removed => None,
        }
    }

    /// Current bytes of the main file
    pub fn read(&self) -> UploadResult<Option<Bytes>> {
        match self.path(None) {
            Some(key) => Ok(Some(self.storage.get(&key)?)),
            None => Ok(None),
        }
    }

    /// Every key this file occupies: main file first, then versions
    fn all_paths(&self) -> Vec<String> {
        std::iter::once(None)
            .chain(self.settings.version_names().map(Some))
            .filter_map(|v| self.path(v))
            .collect()
    }

    fn run_processors(&self, mut file: UploadedFile) -> UploadResult<UploadedFile> {
        for processor in &self.settings.processors {
            file.data = processor
                .process(&file)
                .map_err(|e| UploadError::processing(format!("{}: {}", processor.name(), e)))?;
        }
        Ok(file)
    }
}

impl Uploader for StoredUploader {
    fn identifier(&self) -> Option<String> {
        match &self.state {
            FileState::Cached { filename, .. } | FileState::Stored { filename } => {
                Some(filename.clone())
            }
            FileState::Blank | FileState::Removed => None,
        }
    }

    fn cache_name(&self) -> Option<String> {
        match &self.state {
            FileState::Cached { cache_id, filename } => Some(format!("{cache_id}/{filename}")),
            _ => None,
        }
    }

    fn url(&self, options: &UrlOptions) -> Option<String> {
        let version = options.version.as_deref();
        if let Some(v) = version {
            if !self.settings.has_version(v) {
                return None;
            }
        }

        let mut url = self.storage.url(&self.path(version)?);
        if !options.params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(options.params.iter())
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        Some(url)
    }

    fn is_blank(&self) -> bool {
        matches!(self.state, FileState::Blank | FileState::Removed)
    }

    fn is_cached(&self) -> bool {
        matches!(self.state, FileState::Cached { .. })
    }

    fn retrieve_from_store(&mut self, identifier: &str) {
        self.state = FileState::Stored {
            filename: identifier.to_string(),
        };
    }

    fn retrieve_from_cache(&mut self, cache_name: &str) -> UploadResult<()> {
        let (cache_id, filename) = cache_name
            .split_once('/')
            .ok_or_else(|| UploadError::invalid_parameter("invalid cache name"))?;

        if !CACHE_ID_PATTERN.is_match(cache_id) {
            return Err(UploadError::invalid_parameter("invalid cache id"));
        }
        if !FILENAME_PATTERN.is_match(filename) {
            return Err(UploadError::invalid_parameter("invalid original filename"));
        }

        self.state = FileState::Cached {
            cache_id: cache_id.to_string(),
            filename: filename.to_string(),
        };
        Ok(())
    }

    #[instrument(skip(self, file), fields(mounted_as = %self.mounted_as, filename = %file.filename))]
    fn cache(&mut self, file: UploadedFile) -> UploadResult<()> {
        self.settings.allowed_types.check(&file)?;

        let file = self.run_processors(file)?;

        let mut derived = Vec::with_capacity(self.settings.versions.len());
        for (name, processor) in &self.settings.versions {
            let data = processor
                .process(&file)
                .map_err(|e| UploadError::processing(format!("{name}: {e}")))?;
            derived.push((name.clone(), data));
        }

        self.state = FileState::Cached {
            cache_id: generate_cache_id(),
            filename: sanitize_filename(&file.filename),
        };

        // The state was just set to Cached, so every path below resolves
        if let Some(key) = self.path(None) {
            self.storage.put(&key, file.data)?;
        }
        for (name, data) in derived {
            if let Some(key) = self.path(Some(&name)) {
                self.storage.put(&key, data)?;
            }
        }

        debug!(cache_name = ?self.cache_name(), storage = self.storage.name(), "File cached");
        Ok(())
    }

    #[instrument(skip(self), fields(mounted_as = %self.mounted_as))]
    fn download(&mut self, url: &str) -> UploadResult<()> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| UploadError::download(format!("could not parse {url:?}: {e}")))?;

        let file = self
            .settings
            .downloader
            .fetch(&parsed)
            .map_err(|e| UploadError::download(format!("could not download {parsed}: {e}")))?;

        self.cache(file)
    }

    #[instrument(skip(self), fields(mounted_as = %self.mounted_as))]
    fn store(&mut self) -> UploadResult<()> {
        let FileState::Cached { filename, .. } = &self.state else {
            return Ok(());
        };

        let from = self.all_paths();
        let stored = FileState::Stored {
            filename: filename.clone(),
        };
        let cached = std::mem::replace(&mut self.state, stored);
        let to = self.all_paths();

        for (moved, (from_key, to_key)) in from.iter().zip(to.iter()).enumerate() {
            if let Err(e) = self.storage.rename(from_key, to_key) {
                // Put already moved keys back so the cached state stays readable
                for (undo_from, undo_to) in from.iter().zip(to.iter()).take(moved).rev() {
                    if let Err(undo) = self.storage.rename(undo_to, undo_from) {
                        warn!(key = %undo_to, error = %undo, "Could not roll back stored file");
                    }
                }
                self.state = cached;
                return Err(e.into());
            }
        }

        info!(identifier = ?self.identifier(), "File stored");
        Ok(())
    }

    #[instrument(skip(self), fields(mounted_as = %self.mounted_as))]
    fn remove(&mut self) -> UploadResult<()> {
        if self.is_blank() {
            return Ok(());
        }

        for key in self.all_paths() {
            self.storage.delete(&key)?;
        }

        info!(identifier = ?self.identifier(), "File removed");
        self.state = FileState::Removed;
        Ok(())
    }
}
