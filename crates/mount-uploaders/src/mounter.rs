//! Slot Mounter
//!
//! Binds the uploaders of one slot on one record. A mounter is built fresh
//! for each record operation (assignment, save, destroy) and dropped when it
//! completes; it never re-reads the record once its uploaders are built.
//!
//! The uploader set comes either from the identifiers persisted on the
//! record or from the latest explicit assignment (`cache`,
//! `set_cache_names`, `set_remote_urls`), never from both.

use std::collections::HashMap;

use mount_core::config::{OptionValue, UploaderOption};
use mount_core::error::{ErrorCategory, UploadError, UploadResult};
use mount_core::traits::{MountedRecord, Uploader};
use mount_core::types::{RemoveFlag, UploadedFile, UrlOptions};
use tracing::{debug, instrument, warn};

/// Categories `cache` records, in precedence order
const CACHE_ERRORS: [ErrorCategory; 2] = [ErrorCategory::Integrity, ErrorCategory::Processing];

/// Categories `set_remote_urls` records, in precedence order
const REMOTE_ERRORS: [ErrorCategory; 3] = [
    ErrorCategory::Download,
    ErrorCategory::Processing,
    ErrorCategory::Integrity,
];

pub struct Mounter<'r, R: MountedRecord> {
    record: &'r R,
    column: String,
    /// Memoized option lookups for this instance only
    options: HashMap<UploaderOption, Option<OptionValue>>,
    /// `None` until first use
    uploaders: Option<Vec<R::Uploader>>,
    remove: RemoveFlag,
    remote_urls: Option<Vec<String>>,
    integrity_error: Option<UploadError>,
    processing_error: Option<UploadError>,
    download_error: Option<UploadError>,
}

impl<'r, R: MountedRecord> Mounter<'r, R> {
    pub fn new(record: &'r R, column: impl Into<String>) -> Self {
        Self {
            record,
            column: column.into(),
            options: HashMap::new(),
            uploaders: None,
            remove: RemoveFlag::Unset,
            remote_urls: None,
            integrity_error: None,
            processing_error: None,
            download_error: None,
        }
    }

    /// Slot name
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn remote_urls(&self) -> Option<&[String]> {
        self.remote_urls.as_deref()
    }

    pub fn integrity_error(&self) -> Option<&UploadError> {
        self.integrity_error.as_ref()
    }

    pub fn processing_error(&self) -> Option<&UploadError> {
        self.processing_error.as_ref()
    }

    pub fn download_error(&self) -> Option<&UploadError> {
        self.download_error.as_ref()
    }

    /// Request (or withdraw) removal; applied by `store`
    pub fn set_remove(&mut self, flag: impl Into<RemoveFlag>) {
        self.remove = flag.into();
    }

    fn blank_uploader(&self) -> R::Uploader {
        self.record.blank_uploader(&self.column)
    }

    /// Identifiers to persist; `None` while removal is pending
    ///
    /// Uploaders without an identifier are left out, so unlike `urls` the
    /// result is not positional.
    pub fn identifiers(&mut self) -> Option<Vec<String>> {
        if self.is_remove() {
            return None;
        }
        Some(
            self.uploaders_mut()
                .iter()
                .filter_map(|u| u.identifier())
                .collect(),
        )
    }

    fn read_identifiers(&mut self) -> Vec<String> {
        let column = self.serialization_column();
        self.record
            .read_uploader(&column)
            .map(|value| value.identifiers())
            .unwrap_or_default()
    }

    /// Current uploaders, built from the record on first use
    pub fn uploaders(&mut self) -> &[R::Uploader] {
        self.uploaders_mut()
    }

    fn uploaders_mut(&mut self) -> &mut Vec<R::Uploader> {
        if self.uploaders.is_none() {
            let identifiers = self.read_identifiers();
            let uploaders = identifiers
                .iter()
                .map(|identifier| {
                    let mut uploader = self.blank_uploader();
                    uploader.retrieve_from_store(identifier);
                    uploader
                })
                .collect();
            debug!(column = %self.column, count = identifiers.len(), "Uploaders loaded from record");
            self.uploaders = Some(uploaders);
        }
        self.uploaders.get_or_insert_with(Vec::new)
    }

    /// Replace the uploaders with freshly cached uploads
    ///
    /// Stops at the first failing file; the uploaders cached before it stay
    /// visible whether or not the failure is propagated.
    #[instrument(skip_all, fields(column = %self.column))]
    pub fn cache<I>(&mut self, new_files: I) -> UploadResult<()>
    where
        I: IntoIterator<Item = UploadedFile>,
    {
        self.integrity_error = None;
        self.processing_error = None;

        let mut uploaders = Vec::new();
        for new_file in new_files {
            let mut uploader = self.blank_uploader();
            if let Err(err) = uploader.cache(new_file) {
                self.uploaders = Some(uploaders);
                return self.apply_policy(err, &CACHE_ERRORS);
            }
            uploaders.push(uploader);
        }

        debug!(count = uploaders.len(), "Files cached");
        self.uploaders = Some(uploaders);
        Ok(())
    }

    /// Cache tokens of the current uploaders, for round-tripping through a form
    pub fn cache_names(&mut self) -> Vec<String> {
        self.uploaders_mut()
            .iter()
            .filter_map(|u| u.cache_name())
            .collect()
    }

    /// Rebuild the uploaders from cache tokens
    ///
    /// Ignored while any current uploader holds an uncommitted cached file.
    /// Blank tokens are skipped, so an empty list clears the uploaders.
    /// A malformed token leaves the uploaders untouched.
    #[instrument(skip_all, fields(column = %self.column))]
    pub fn set_cache_names<I, S>(&mut self, cache_names: I) -> UploadResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.uploaders_mut().iter().any(|u| u.is_cached()) {
            debug!("Cached upload pending, ignoring cache names");
            return Ok(());
        }

        let cache_names: Vec<String> = cache_names
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut uploaders = Vec::with_capacity(cache_names.len());
        for cache_name in &cache_names {
            let mut uploader = self.blank_uploader();
            match uploader.retrieve_from_cache(cache_name) {
                Ok(()) => uploaders.push(uploader),
                Err(UploadError::InvalidParameter(reason)) => {
                    debug!(cache_name = %cache_name, reason = %reason, "Ignoring invalid cache name");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }

        self.uploaders = Some(uploaders);
        Ok(())
    }

    /// Replace the uploaders with downloads of `urls`
    ///
    /// A list with only blank entries changes nothing.
    #[instrument(skip_all, fields(column = %self.column))]
    pub fn set_remote_urls<I, S>(&mut self, urls: I) -> UploadResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        if urls.iter().all(|url| url.trim().is_empty()) {
            return Ok(());
        }

        self.remote_urls = Some(urls.clone());
        self.download_error = None;
        self.integrity_error = None;
        self.processing_error = None;

        let mut uploaders = Vec::new();
        for url in urls.iter().filter(|url| !url.trim().is_empty()) {
            let mut uploader = self.blank_uploader();
            if let Err(err) = uploader.download(url) {
                self.uploaders = Some(uploaders);
                return self.apply_policy(err, &REMOTE_ERRORS);
            }
            uploaders.push(uploader);
        }

        debug!(count = uploaders.len(), "Remote files cached");
        self.uploaders = Some(uploaders);
        Ok(())
    }

    /// Commit: store every uploader, or remove them all if removal is pending
    #[instrument(skip_all, fields(column = %self.column))]
    pub fn store(&mut self) -> UploadResult<()> {
        if self.is_remove() {
            return self.remove();
        }

        for uploader in self.uploaders_mut().iter_mut().filter(|u| !u.is_blank()) {
            uploader.store()?;
        }
        Ok(())
    }

    pub fn urls(&mut self, options: &UrlOptions) -> Vec<Option<String>> {
        self.uploaders_mut()
            .iter()
            .map(|u| u.url(options))
            .collect()
    }

    pub fn is_blank(&mut self) -> bool {
        self.uploaders_mut().is_empty()
    }

    /// Whether `store` will remove instead of storing
    pub fn is_remove(&self) -> bool {
        self.remove.is_remove()
    }

    /// Delete the backing files; the uploader list itself is left as is
    #[instrument(skip_all, fields(column = %self.column))]
    pub fn remove(&mut self) -> UploadResult<()> {
        for uploader in self.uploaders_mut().iter_mut().filter(|u| !u.is_blank()) {
            uploader.remove()?;
        }
        Ok(())
    }

    /// Record column the identifiers live in
    pub fn serialization_column(&mut self) -> String {
        self.option(UploaderOption::MountOn)
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| self.column.clone())
    }

    /// Option value for this slot, memoized per mounter
    pub fn option(&mut self, option: UploaderOption) -> Option<OptionValue> {
        let record = self.record;
        let column = &self.column;
        self.options
            .entry(option)
            .or_insert_with(|| record.uploader_option(column, option))
            .clone()
    }

    fn ignores(&mut self, category: ErrorCategory) -> bool {
        let option = match category {
            ErrorCategory::Integrity => UploaderOption::IgnoreIntegrityErrors,
            ErrorCategory::Processing => UploaderOption::IgnoreProcessingErrors,
            ErrorCategory::Download => UploaderOption::IgnoreDownloadErrors,
            ErrorCategory::InvalidParameter => return false,
        };
        self.option(option)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Record `err` under the first matching category in `handled`, then
    /// swallow or propagate it depending on that category's ignore option.
    /// Errors outside `handled` propagate unrecorded.
    fn apply_policy(&mut self, err: UploadError, handled: &[ErrorCategory]) -> UploadResult<()> {
        let Some(category) = handled
            .iter()
            .copied()
            .find(|c| err.category() == Some(*c))
        else {
            return Err(err);
        };

        let slot = match category {
            ErrorCategory::Integrity => &mut self.integrity_error,
            ErrorCategory::Processing => &mut self.processing_error,
            ErrorCategory::Download => &mut self.download_error,
            ErrorCategory::InvalidParameter => return Err(err),
        };
        *slot = Some(err.clone());

        if self.ignores(category) {
            warn!(column = %self.column, category = %category, error = %err, "Upload error ignored");
            Ok(())
        } else {
            Err(err)
        }
    }
}
