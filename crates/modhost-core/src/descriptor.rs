//! Host-side extension descriptors.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use modhost_extension_sdk::abi::{CreateFn, DestroyFn};
use serde::Serialize;

use crate::error::Result;
use crate::instance::InstanceHandle;
use crate::module::ModuleHandle;

/// Owned copy of one metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionMetadata {
    pub name: String,
    /// Identifier of the interface the extension implements.
    pub interface: String,
    pub version: u32,
    pub description: String,
    pub tags: BTreeMap<String, String>,
}

impl ExtensionMetadata {
    /// Whether the tag mapping contains exactly `key = value`.
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags.get(key).is_some_and(|v| v == value)
    }
}

/// One extension offered by a loaded module.
///
/// Cloning is cheap. Every clone holds the owning module open, so a module
/// cannot be removed from a registry while descriptors to it are kept
/// elsewhere.
#[derive(Clone)]
pub struct ExtensionDescriptor {
    metadata: Arc<ExtensionMetadata>,
    module: Arc<ModuleHandle>,
    create: CreateFn,
    destroy: DestroyFn,
}

impl ExtensionDescriptor {
    pub(crate) fn new(
        metadata: ExtensionMetadata,
        module: Arc<ModuleHandle>,
        create: CreateFn,
        destroy: DestroyFn,
    ) -> Self {
        Self {
            metadata: Arc::new(metadata),
            module,
            create,
            destroy,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn interface(&self) -> &str {
        &self.metadata.interface
    }

    pub fn version(&self) -> u32 {
        self.metadata.version
    }

    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.metadata.tags
    }

    /// Value of tag `key`, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.tags.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.metadata.has_tag(key, value)
    }

    pub fn metadata(&self) -> &ExtensionMetadata {
        &self.metadata
    }

    /// The module this extension lives in.
    pub fn module(&self) -> &Arc<ModuleHandle> {
        &self.module
    }

    pub fn module_path(&self) -> &Path {
        self.module.path()
    }

    /// Whether both descriptors come from the same loaded module.
    pub fn same_module(&self, other: &ExtensionDescriptor) -> bool {
        Arc::ptr_eq(&self.module, &other.module)
    }

    /// Invoke the factory and wrap the result.
    pub fn instantiate(&self) -> Result<InstanceHandle> {
        InstanceHandle::create(self.clone())
    }

    /// Serialisable summary.
    pub fn info(&self) -> ExtensionInfo {
        ExtensionInfo {
            name: self.metadata.name.clone(),
            interface: self.metadata.interface.clone(),
            version: self.metadata.version,
            description: self.metadata.description.clone(),
            tags: self.metadata.tags.clone(),
            module_path: self.module.path().to_path_buf(),
            module_id: self.module.id(),
            loaded_at: self.module.loaded_at(),
        }
    }

    /// # Safety
    /// The module must still be loaded, which holding `self` guarantees.
    pub(crate) unsafe fn call_create(&self) -> *mut c_void {
        (self.create)()
    }

    /// # Safety
    /// `instance` must come from [`Self::call_create`] on this descriptor and
    /// must not be used afterwards.
    pub(crate) unsafe fn call_destroy(&self, instance: *mut c_void) {
        (self.destroy)(instance)
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.metadata.name)
            .field("interface", &self.metadata.interface)
            .field("version", &self.metadata.version)
            .field("module", &self.module.path())
            .finish()
    }
}

/// Extension summary for listings and JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub interface: String,
    pub version: u32,
    pub description: String,
    pub tags: BTreeMap<String, String>,
    pub module_path: PathBuf,
    pub module_id: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Binds a Rust type to the interface identifier its extensions declare.
///
/// ```
/// use modhost_core::ExtensionInterface;
///
/// struct Greeter;
///
/// impl ExtensionInterface for Greeter {
///     const INTERFACE_ID: &'static str = "demo.Greeter";
/// }
/// ```
pub trait ExtensionInterface {
    const INTERFACE_ID: &'static str;
}
