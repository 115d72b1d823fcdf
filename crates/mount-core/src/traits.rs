//! Collaborator interfaces of the mounter
//!
//! The mounter never touches bytes or rows itself: it drives an `Uploader`
//! per attached file and reads/configures through a `MountedRecord`.

use crate::config::{MountRegistry, OptionValue, UploaderOption};
use crate::error::UploadResult;
use crate::types::{ColumnValue, UploadedFile, UrlOptions};

/// One attached file
///
/// Lifecycle: blank → cached → stored → removed. A blank uploader can also
/// be reconstructed straight into stored (`retrieve_from_store`) or cached
/// (`retrieve_from_cache`).
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait Uploader {
    /// Stable identifier persisted on the record; `None` while blank
    fn identifier(&self) -> Option<String>;

    /// Serialized cache token, `None` unless cached
    fn cache_name(&self) -> Option<String>;

    /// Presentable URL
    fn url(&self, options: &UrlOptions) -> Option<String>;

    /// No backing file
    fn is_blank(&self) -> bool;

    /// Backed by a transient cached file that has not been stored yet
    fn is_cached(&self) -> bool;

    /// Point at an already stored file
    fn retrieve_from_store(&mut self, identifier: &str);

    /// Point at a cached file; fails with `InvalidParameter` on a malformed token
    fn retrieve_from_cache(&mut self, cache_name: &str) -> UploadResult<()>;

    /// Validate, cache and process a raw upload
    fn cache(&mut self, file: UploadedFile) -> UploadResult<()>;

    /// Fetch a remote file, then cache it
    fn download(&mut self, url: &str) -> UploadResult<()>;

    /// Persist the cached file durably
    fn store(&mut self) -> UploadResult<()>;

    /// Delete the backing file
    fn remove(&mut self) -> UploadResult<()>;
}

/// Host record owning one or more mounted slots
pub trait MountedRecord {
    type Uploader: Uploader;

    /// Currently persisted identifier(s) in `column`
    fn read_uploader(&self, column: &str) -> Option<ColumnValue>;

    /// Class-level slot table
    fn mounts(&self) -> &MountRegistry;

    /// Fresh blank uploader bound to this record and slot
    fn blank_uploader(&self, mounted_as: &str) -> Self::Uploader;

    /// Class-level option lookup with default fallback
    fn uploader_option(&self, mounted_as: &str, option: UploaderOption) -> Option<OptionValue> {
        self.mounts().uploader_option(mounted_as, option)
    }
}
