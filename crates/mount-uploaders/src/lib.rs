//! # mount-uploaders
//!
//! Attaches files to a named slot on a persistent record.
//!
//! ## Features
//!
//! - `Mounter`: per-(record, slot) state machine over a set of uploaders
//! - Storage abstraction (local filesystem, in-memory)
//! - `StoredUploader`: validating, processing, storage-backed uploader
//!
//! ## Example
//!
//! ```rust,ignore
//! use mount_uploaders::Mounter;
//! use mount_core::UploadedFile;
//!
//! let mut mounter = Mounter::new(&record, "images");
//! mounter.cache(vec![UploadedFile::new("photo.png", bytes)])?;
//!
//! // On save
//! mounter.store()?;
//! let column = mounter.identifiers().and_then(ColumnValue::from_identifiers);
//! ```

pub mod mounter;
pub mod storage;
pub mod uploader;

pub use mounter::Mounter;
pub use storage::{
    calculate_digest, guess_content_type, FileMetadata, LocalStorage, MemoryStorage, Storage,
};
pub use uploader::{
    generate_cache_id, sanitize_filename, AllowedFileTypes, Downloader, FileDownloader,
    MemoryDownloader, Processor, StoredUploader, UploaderSettings,
};
