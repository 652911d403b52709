//! Module handles and native loader adapters.
//!
//! [`ModuleHandle`] owns exactly one loaded module and is shared as
//! `Arc<ModuleHandle>` between the descriptors and instances it produced. The
//! platform's native loader sits behind [`ModuleBackend`] / [`NativeLibrary`]:
//!
//! - [`NativeBackend`]: `dlopen` on Unix, `LoadLibraryExW` on Windows.
//! - [`MemoryBackend`]: tables linked into the host binary.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ExtensionError, Result};

pub mod memory;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use memory::MemoryBackend;

/// Failure description reported by a backend.
pub type BackendResult<T> = std::result::Result<T, String>;

/// Opens modules. Implementations must be callable from any thread.
pub trait ModuleBackend: Send + Sync {
    /// Load the module at `path` into the process.
    fn open(&self, path: &Path) -> BackendResult<Box<dyn NativeLibrary>>;
}

/// One loaded module as seen by a backend.
pub trait NativeLibrary: Send + Sync {
    /// Address of the exported symbol `name`.
    fn symbol(&self, name: &str) -> BackendResult<*const c_void>;

    /// Unload the module.
    fn close(self: Box<Self>) -> BackendResult<()>;
}

/// File extension of loadable modules on the current platform.
pub fn platform_module_suffix() -> &'static str {
    if cfg!(target_os = "macos") || cfg!(target_os = "ios") {
        "dylib"
    } else if cfg!(windows) {
        "dll"
    } else {
        "so"
    }
}

/// The platform's native dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl ModuleBackend for NativeBackend {
    fn open(&self, path: &Path) -> BackendResult<Box<dyn NativeLibrary>> {
        #[cfg(unix)]
        {
            unix::open(path)
        }

        #[cfg(windows)]
        {
            windows::open(path)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = path;
            Err("native modules are not supported on this platform".to_string())
        }
    }
}

/// The identity under which a module file is tracked.
///
/// Resolves `..` components and symlinks. Paths that do not name an existing
/// file, such as in-memory module keys, are returned unchanged.
pub fn canonical_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// A loaded module.
///
/// The native library is closed when the last `Arc<ModuleHandle>` is dropped
/// or by [`ModuleHandle::close`].
pub struct ModuleHandle {
    id: u64,
    path: PathBuf,
    loaded_at: DateTime<Utc>,
    library: Option<Box<dyn NativeLibrary>>,
    live_instances: AtomicUsize,
}

impl ModuleHandle {
    /// Open `path` through `backend`.
    ///
    /// The handle's [`path`](Self::path) is the [`canonical_path`] of `path`.
    pub fn open(backend: &dyn ModuleBackend, path: &Path) -> Result<Arc<Self>> {
        let library = backend
            .open(path)
            .map_err(|reason| ExtensionError::OpenFailed {
                path: path.to_path_buf(),
                reason,
            })?;

        let handle = Self {
            id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
            path: canonical_path(path),
            loaded_at: Utc::now(),
            library: Some(library),
            live_instances: AtomicUsize::new(0),
        };
        tracing::debug!(path = %path.display(), id = handle.id, "Opened module");

        Ok(Arc::new(handle))
    }

    /// Process-unique identifier; two opens of one file get different ids.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Number of live [`crate::InstanceHandle`]s created from this module.
    pub fn live_instances(&self) -> usize {
        self.live_instances.load(Ordering::Acquire)
    }

    /// Address of an exported symbol.
    pub fn lookup(&self, symbol: &str) -> Result<*const c_void> {
        let not_found = |_| ExtensionError::SymbolNotFound {
            path: self.path.clone(),
            symbol: symbol.to_string(),
        };

        let library = self
            .library
            .as_ref()
            .ok_or_else(|| not_found(String::new()))?;
        let address = library.symbol(symbol).map_err(not_found)?;
        if address.is_null() {
            return Err(not_found(String::new()));
        }
        Ok(address)
    }

    /// Unload the module.
    ///
    /// Fails with `StillReferenced` while any descriptor or instance still
    /// holds the handle; the module then stays loaded.
    pub fn close(self: Arc<Self>) -> Result<()> {
        let mut handle = Arc::try_unwrap(self).map_err(|shared| ExtensionError::StillReferenced {
            path: shared.path.clone(),
            references: Arc::strong_count(&shared) - 1,
        })?;

        handle.close_library()
    }

    pub(crate) fn acquire_instance(&self) {
        self.live_instances.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_instance(&self) {
        self.live_instances.fetch_sub(1, Ordering::AcqRel);
    }

    fn close_library(&mut self) -> Result<()> {
        match self.library.take() {
            Some(library) => {
                tracing::debug!(path = %self.path.display(), id = self.id, "Closing module");
                library.close().map_err(|reason| ExtensionError::CloseFailed {
                    path: self.path.clone(),
                    reason,
                })
            }
            None => Ok(()),
        }
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close_library() {
            tracing::warn!("{}", e);
        }
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("loaded_at", &self.loaded_at)
            .field("live_instances", &self.live_instances())
            .finish()
    }
}
