//! Error types for extension discovery, loading and instantiation.

use std::path::PathBuf;

/// Result type for extension operations.
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Errors raised by the module loader and registry.
///
/// Per-candidate failures during a scan (`OpenFailed`, `SymbolNotFound`,
/// `AbiVersionMismatch`, `MalformedRecord`, `NoValidEntries`) are swallowed
/// into skip outcomes and only surface through [`crate::LoaderEvent`]s and
/// [`crate::ScanReport`]. `InUse` and `StillReferenced` are returned to the
/// caller of an explicit unload; the module stays loaded. `CloseFailed` is
/// returned after the module has already left the registry.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// The native loader refused the file.
    #[error("failed to open module {path:?}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// The module does not export the metadata symbol.
    #[error("module {path:?} does not export `{symbol}`")]
    SymbolNotFound { path: PathBuf, symbol: String },

    /// A record was built against a different metadata layout.
    #[error("ABI version mismatch: expected {expected}, found {found}")]
    AbiVersionMismatch { expected: u32, found: u32 },

    /// The metadata table or a record failed validation.
    #[error("malformed extension metadata: {0}")]
    MalformedRecord(String),

    /// The module exports the metadata symbol but no usable entry.
    #[error("module {0:?} contains no valid extension entries")]
    NoValidEntries(PathBuf),

    /// The factory returned null or panicked.
    #[error("failed to create extension '{name}': {reason}")]
    CreationFailed { name: String, reason: String },

    /// The native loader refused to unload the module.
    #[error("failed to close module {path:?}: {reason}")]
    CloseFailed { path: PathBuf, reason: String },

    /// Instances created from the module are still alive.
    #[error("module {path:?} is in use by {live} live instance(s)")]
    InUse { path: PathBuf, live: usize },

    /// Descriptors or handles outside the registry still reference the module.
    #[error("module {path:?} is still referenced ({references} outstanding reference(s))")]
    StillReferenced { path: PathBuf, references: usize },

    /// Dedup-by-path is enabled and the path is already registered.
    #[error("module {0:?} is already loaded")]
    AlreadyLoaded(PathBuf),

    /// No module or extension matched the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid loader configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExtensionError {
    /// Whether this error means "not an extension module" rather than a fault.
    pub fn is_expected_skip(&self) -> bool {
        matches!(
            self,
            ExtensionError::SymbolNotFound { .. } | ExtensionError::AlreadyLoaded(_)
        )
    }
}
