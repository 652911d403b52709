//! In-process module backend.
//!
//! Serves metadata tables that are linked into the host binary instead of
//! loaded from disk: built-in extensions compiled with the application, and
//! tests. Paths are plain keys; nothing is read from the filesystem.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use modhost_extension_sdk::abi::{RawModuleTable, METADATA_SYMBOL};
use parking_lot::RwLock;

use super::{BackendResult, ModuleBackend, NativeLibrary};

#[derive(Clone)]
enum Entry {
    /// Symbol name to address, stored as an integer so the map is `Send`.
    Symbols(HashMap<String, usize>),
    Unloadable(String),
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Module backend backed by `'static` data in the current process.
#[derive(Default)]
pub struct MemoryBackend {
    modules: RwLock<HashMap<PathBuf, Entry>>,
    counters: Arc<Counters>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module exporting `table` under the metadata symbol.
    pub fn with_table(self, path: impl Into<PathBuf>, table: &'static RawModuleTable) -> Self {
        self.insert_table(path, table);
        self
    }

    /// Register a module that opens fine but exports nothing.
    pub fn with_library(self, path: impl Into<PathBuf>) -> Self {
        self.modules
            .write()
            .insert(path.into(), Entry::Symbols(HashMap::new()));
        self
    }

    /// Register a module exporting `symbol` at an arbitrary address.
    pub fn with_raw_symbol(
        self,
        path: impl Into<PathBuf>,
        symbol: &str,
        address: *const c_void,
    ) -> Self {
        let mut modules = self.modules.write();
        let entry = modules
            .entry(path.into())
            .or_insert_with(|| Entry::Symbols(HashMap::new()));
        if let Entry::Symbols(symbols) = entry {
            symbols.insert(symbol.to_string(), address as usize);
        }
        drop(modules);
        self
    }

    /// Register a path whose open fails with `reason`.
    pub fn with_open_failure(self, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        self.modules
            .write()
            .insert(path.into(), Entry::Unloadable(reason.into()));
        self
    }

    /// Register or replace a table after construction.
    pub fn insert_table(&self, path: impl Into<PathBuf>, table: &'static RawModuleTable) {
        let address = table as *const RawModuleTable as usize;
        let symbols = HashMap::from([(METADATA_SYMBOL.to_string(), address)]);
        self.modules.write().insert(path.into(), Entry::Symbols(symbols));
    }

    /// Whether `path` has been registered with this backend.
    pub fn contains(&self, path: &Path) -> bool {
        self.modules.read().contains_key(path)
    }

    /// Modules opened and not yet closed.
    pub fn open_modules(&self) -> usize {
        // Every close follows its open, so reading `closed` first keeps the
        // difference non-negative under concurrent use.
        let closed = self.counters.closed.load(Ordering::SeqCst);
        self.counters
            .opened
            .load(Ordering::SeqCst)
            .saturating_sub(closed)
    }

    /// Total successful opens.
    pub fn open_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }
}

impl ModuleBackend for MemoryBackend {
    fn open(&self, path: &Path) -> BackendResult<Box<dyn NativeLibrary>> {
        let entry = self
            .modules
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| format!("{}: no such module", path.display()))?;

        match entry {
            Entry::Unloadable(reason) => Err(reason),
            Entry::Symbols(symbols) => {
                self.counters.opened.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MemoryLibrary {
                    symbols,
                    counters: self.counters.clone(),
                }))
            }
        }
    }
}

struct MemoryLibrary {
    symbols: HashMap<String, usize>,
    counters: Arc<Counters>,
}

impl NativeLibrary for MemoryLibrary {
    fn symbol(&self, name: &str) -> BackendResult<*const c_void> {
        self.symbols
            .get(name)
            .map(|&address| address as *const c_void)
            .ok_or_else(|| format!("undefined symbol: {}", name))
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
