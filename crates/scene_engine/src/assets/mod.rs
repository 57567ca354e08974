//! Resource loading
//!
//! Definitions and other data files reach the scene through the
//! [`ResourceLoader`] service. Anything implementing [`Asset`] can be loaded
//! eagerly, lazily on first use, or in the background with the file read
//! running on a worker thread.

pub mod resource_loader;

pub use resource_loader::{LazyResource, LoadOutcome, LoadTicket, ResourceLoader};

use thiserror::Error;

/// Asset trait for loadable resources
pub trait Asset: Send + Sync + 'static {
    /// Load asset from raw bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> where Self: Sized;
}

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found in any search path
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Background load was cancelled before it completed
    #[error("Load cancelled: {0}")]
    Cancelled(String),

    /// Cached resource has a different type than requested
    #[error("Type mismatch for {path}: requested {requested}")]
    TypeMismatch {
        /// Resolved path of the cached resource
        path: String,
        /// Requested type
        requested: &'static str,
    },

    /// IO error during asset loading
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
