//! Extension registry.
//!
//! The registry owns every descriptor that survived loading, grouped by
//! interface identifier. Within an interface, descriptors keep the order in
//! which their modules were loaded.
//!
//! Opening modules and running factories happen outside the registry lock.
//! Only insertion and removal take the write lock, so lookups never wait on
//! module initialisation code.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::LoaderConfig;
use crate::descriptor::{ExtensionDescriptor, ExtensionInterface};
use crate::error::{ExtensionError, Result};
use crate::events::{emit, LoaderEvent};
use crate::instance::InstanceHandle;
use crate::loader::Loader;
use crate::module::{canonical_path, ModuleHandle};
use crate::scanner::Scanner;

/// Registry behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Skip a path that is already registered instead of loading it again.
    pub dedup_by_path: bool,
}

/// A candidate that contributed nothing.
#[derive(Debug)]
pub struct SkippedModule {
    pub path: PathBuf,
    pub error: ExtensionError,
}

/// Outcome of one scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Modules registered, in discovery order.
    pub loaded: Vec<PathBuf>,
    pub skipped: Vec<SkippedModule>,
    /// Descriptors registered.
    pub extensions: usize,
}

impl ScanReport {
    /// Skips that were not just "not an extension module".
    pub fn failures(&self) -> impl Iterator<Item = &SkippedModule> {
        self.skipped.iter().filter(|s| !s.error.is_expected_skip())
    }
}

#[derive(Default)]
struct RegistryState {
    buckets: HashMap<String, Vec<ExtensionDescriptor>>,
    /// Interfaces in first-seen order.
    interfaces: Vec<String>,
    /// Loaded modules in load order.
    modules: Vec<Arc<ModuleHandle>>,
}

impl RegistryState {
    fn insert(&mut self, descriptors: Vec<ExtensionDescriptor>) -> usize {
        let count = descriptors.len();
        for descriptor in descriptors {
            if !self
                .modules
                .iter()
                .any(|m| Arc::ptr_eq(m, descriptor.module()))
            {
                self.modules.push(descriptor.module().clone());
            }

            match self.buckets.get_mut(descriptor.interface()) {
                Some(bucket) => bucket.push(descriptor),
                None => {
                    let interface = descriptor.interface().to_string();
                    self.interfaces.push(interface.clone());
                    self.buckets.insert(interface, vec![descriptor]);
                }
            }
        }
        count
    }

    fn descriptors_of(&self, module: &Arc<ModuleHandle>) -> usize {
        self.buckets
            .values()
            .flatten()
            .filter(|d| Arc::ptr_eq(d.module(), module))
            .count()
    }

    /// `path` must already be canonical.
    fn contains_path(&self, path: &Path) -> bool {
        self.modules.iter().any(|m| m.path() == path)
    }
}

/// Queryable set of loaded extensions.
pub struct Registry {
    loader: Loader,
    options: RegistryOptions,
    state: RwLock<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Empty registry using the native loader.
    pub fn new() -> Self {
        Self::with_loader(Loader::new())
    }

    pub fn with_loader(loader: Loader) -> Self {
        Self {
            loader,
            options: RegistryOptions::default(),
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Native loader with options taken from `config`.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new().with_options(RegistryOptions {
            dedup_by_path: config.dedup_by_path,
        })
    }

    pub fn with_options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    /// Receive [`LoaderEvent`]s for every load, skip and unload.
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LoaderEvent) + Send + Sync + 'static,
    {
        self.loader.set_event_callback(Some(Arc::new(callback)));
        self
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Scan `roots` (non-recursively, platform suffix) and load what is found.
    pub fn scan_and_load<I, P>(&self, roots: I) -> ScanReport
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.scan(&Scanner::new(roots))
    }

    /// Load every candidate `scanner` yields.
    pub fn scan(&self, scanner: &Scanner) -> ScanReport {
        self.load_paths(scanner.candidates())
    }

    /// Load `paths` one after another, in order.
    ///
    /// Stops as soon as the iterator ends, so a bounded or short-circuiting
    /// iterator cancels the remainder of a scan. Everything registered up to
    /// that point stays registered.
    pub fn load_paths<I>(&self, paths: I) -> ScanReport
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut report = ScanReport::default();

        for path in paths {
            match self.add_module(&path) {
                Ok(count) => {
                    report.extensions += count;
                    report.loaded.push(path);
                }
                Err(error) => report.skipped.push(SkippedModule { path, error }),
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            extensions = report.extensions,
            "Extension scan finished"
        );
        report
    }

    /// Load a single module and register its extensions.
    ///
    /// Returns the number of extensions added.
    pub fn add_module(&self, path: &Path) -> Result<usize> {
        let result = self.try_add_module(path);
        if let Err(e) = &result {
            self.loader.report_skip(path, e);
        }
        result
    }

    fn try_add_module(&self, path: &Path) -> Result<usize> {
        let identity = canonical_path(path);
        if self.options.dedup_by_path && self.state.read().contains_path(&identity) {
            return Err(ExtensionError::AlreadyLoaded(path.to_path_buf()));
        }

        let descriptors = self.loader.try_load(path)?;
        let Some(module_id) = descriptors.first().map(|d| d.module().id()) else {
            return Err(ExtensionError::NoValidEntries(path.to_path_buf()));
        };

        let count = {
            let mut state = self.state.write();
            if self.options.dedup_by_path && state.contains_path(&identity) {
                // Lost a race with another loader of the same file.
                return Err(ExtensionError::AlreadyLoaded(path.to_path_buf()));
            }
            state.insert(descriptors)
        };

        self.loader.report_loaded(path, module_id, count);
        Ok(count)
    }

    /// Register descriptors produced elsewhere.
    pub fn add_all(&self, descriptors: Vec<ExtensionDescriptor>) {
        self.state.write().insert(descriptors);
    }

    /// Remove every descriptor loaded from `path` and close the module.
    ///
    /// `path` names the module file however it is spelled: `..` components
    /// and symlinks resolve to the same module.
    ///
    /// Fails with `NotFound` when nothing was loaded from `path`, with `InUse`
    /// while instances created from the module are alive and with
    /// `StillReferenced` while descriptors handed out earlier are still held.
    /// The registry is left unchanged by these failures.
    ///
    /// Once the checks pass the module always leaves the registry and an
    /// [`LoaderEvent::Unloaded`] is emitted for it. If the native loader then
    /// refuses to unload, the first such failure is returned as `CloseFailed`.
    pub fn remove_module(&self, path: &Path) -> Result<()> {
        let identity = canonical_path(path);
        let removed = {
            let mut state = self.state.write();

            let targets: Vec<usize> = state
                .modules
                .iter()
                .enumerate()
                .filter(|(_, m)| m.path() == identity)
                .map(|(i, _)| i)
                .collect();
            if targets.is_empty() {
                return Err(ExtensionError::NotFound(format!(
                    "module {}",
                    path.display()
                )));
            }

            for &i in &targets {
                let live = state.modules[i].live_instances();
                if live > 0 {
                    return Err(ExtensionError::InUse {
                        path: path.to_path_buf(),
                        live,
                    });
                }
            }

            for &i in &targets {
                let module = &state.modules[i];
                let held = state.descriptors_of(module) + 1;
                let outside = Arc::strong_count(module).saturating_sub(held);
                if outside > 0 {
                    return Err(ExtensionError::StillReferenced {
                        path: path.to_path_buf(),
                        references: outside,
                    });
                }
            }

            for bucket in state.buckets.values_mut() {
                bucket.retain(|d| d.module_path() != identity);
            }
            state.buckets.retain(|_, bucket| !bucket.is_empty());
            let RegistryState {
                buckets,
                interfaces,
                modules,
            } = &mut *state;
            interfaces.retain(|i| buckets.contains_key(i));

            let (removed, kept): (Vec<_>, Vec<_>) =
                std::mem::take(modules).into_iter().partition(|m| m.path() == identity);
            *modules = kept;
            removed
        };

        let mut first_error = None;
        for module in removed {
            let module_id = module.id();
            match module.close() {
                Ok(()) => {
                    tracing::info!(path = %path.display(), module_id, "Unloaded extension module");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), module_id, "Unload failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
            emit(
                self.loader.events(),
                LoaderEvent::Unloaded {
                    path: path.to_path_buf(),
                    module_id,
                },
            );
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Descriptors implementing `interface`, in discovery order.
    pub fn extensions(&self, interface: &str) -> Vec<ExtensionDescriptor> {
        self.state
            .read()
            .buckets
            .get(interface)
            .cloned()
            .unwrap_or_default()
    }

    /// Descriptors implementing `interface` tagged with exactly `key = value`.
    pub fn extensions_with_tag(
        &self,
        interface: &str,
        key: &str,
        value: &str,
    ) -> Vec<ExtensionDescriptor> {
        self.extensions_matching(interface, &[(key, value)])
    }

    /// Descriptors implementing `interface` carrying every listed tag.
    pub fn extensions_matching(
        &self,
        interface: &str,
        tags: &[(&str, &str)],
    ) -> Vec<ExtensionDescriptor> {
        self.state
            .read()
            .buckets
            .get(interface)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|d| tags.iter().all(|(k, v)| d.has_tag(k, v)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Descriptors implementing `I::INTERFACE_ID`.
    pub fn extensions_of<I: ExtensionInterface>(&self) -> Vec<ExtensionDescriptor> {
        self.extensions(I::INTERFACE_ID)
    }

    /// Highest-version extension called `name`; the earliest loaded wins a tie.
    pub fn find(&self, interface: &str, name: &str) -> Option<ExtensionDescriptor> {
        let state = self.state.read();
        let bucket = state.buckets.get(interface)?;

        let mut best: Option<&ExtensionDescriptor> = None;
        for descriptor in bucket.iter().filter(|d| d.name() == name) {
            if best.map_or(true, |b| descriptor.version() > b.version()) {
                best = Some(descriptor);
            }
        }
        best.cloned()
    }

    /// First loaded extension with this exact name and version.
    pub fn find_version(
        &self,
        interface: &str,
        name: &str,
        version: u32,
    ) -> Option<ExtensionDescriptor> {
        self.state
            .read()
            .buckets
            .get(interface)?
            .iter()
            .find(|d| d.name() == name && d.version() == version)
            .cloned()
    }

    /// Every registered descriptor, grouped by interface in first-seen order.
    pub fn all_extensions(&self) -> Vec<ExtensionDescriptor> {
        let state = self.state.read();
        state
            .interfaces
            .iter()
            .filter_map(|i| state.buckets.get(i))
            .flatten()
            .cloned()
            .collect()
    }

    /// Known interface identifiers in first-seen order.
    pub fn interfaces(&self) -> Vec<String> {
        self.state.read().interfaces.clone()
    }

    /// Paths of loaded modules in load order. A path loaded twice appears twice.
    pub fn module_paths(&self) -> Vec<PathBuf> {
        self.state
            .read()
            .modules
            .iter()
            .map(|m| m.path().to_path_buf())
            .collect()
    }

    pub fn module_count(&self) -> usize {
        self.state.read().modules.len()
    }

    /// Whether a module loaded from the file at `path` is registered.
    pub fn is_loaded(&self, path: &Path) -> bool {
        let identity = canonical_path(path);
        self.state.read().contains_path(&identity)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.state.read().buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Instantiation
    // ========================================================================

    /// Run the descriptor's factory.
    pub fn create(&self, descriptor: &ExtensionDescriptor) -> Result<InstanceHandle> {
        descriptor.instantiate().inspect_err(|e| {
            tracing::warn!(
                name = descriptor.name(),
                interface = descriptor.interface(),
                "Extension creation failed: {}",
                e
            );
        })
    }

    /// [`Self::find`] followed by [`Self::create`].
    pub fn create_by_name(&self, interface: &str, name: &str) -> Result<InstanceHandle> {
        let descriptor = self.find(interface, name).ok_or_else(|| {
            ExtensionError::NotFound(format!("extension '{}' for interface '{}'", name, interface))
        })?;
        self.create(&descriptor)
    }
}

/// Scan `roots` with the native loader and return the populated registry.
pub fn scan_and_load<I, P>(roots: I) -> Registry
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let registry = Registry::new();
    registry.scan_and_load(roots);
    registry
}
