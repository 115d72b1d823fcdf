//! # mount-core
//!
//! Core types, traits, and configuration for mounted uploaders.
//!
//! This crate provides the building blocks shared by the mounter and its
//! collaborators:
//! - Upload error taxonomy and result aliases
//! - Class-level and per-slot uploader configuration
//! - Collaborator traits (`Uploader`, `MountedRecord`)
//! - Column, remove-flag and upload value types

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    ConfigError, MountOptions, MountRegistry, OptionValue, UploaderConfig, UploaderOption,
};
pub use error::*;
pub use traits::*;
pub use types::*;
