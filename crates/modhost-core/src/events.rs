//! Diagnostics emitted while loading and unloading modules.

use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted by the loader and registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    /// A module was opened and contributed at least one extension.
    Loaded {
        path: PathBuf,
        module_id: u64,
        extensions: usize,
    },

    /// A candidate contributed nothing and was closed.
    Skipped {
        path: PathBuf,
        reason: String,
        /// `true` when the file is simply not an extension module.
        expected: bool,
    },

    /// One entry of an otherwise readable table was refused.
    EntryRejected {
        path: PathBuf,
        index: usize,
        reason: String,
    },

    /// A module was removed from the registry.
    Unloaded { path: PathBuf, module_id: u64 },
}

impl LoaderEvent {
    pub fn path(&self) -> &PathBuf {
        match self {
            LoaderEvent::Loaded { path, .. }
            | LoaderEvent::Skipped { path, .. }
            | LoaderEvent::EntryRejected { path, .. }
            | LoaderEvent::Unloaded { path, .. } => path,
        }
    }
}

/// Shared event sink.
pub type EventCallback = Arc<dyn Fn(&LoaderEvent) + Send + Sync>;

pub(crate) fn emit(callback: Option<&EventCallback>, event: LoaderEvent) {
    if let Some(cb) = callback {
        cb(&event);
    }
}
