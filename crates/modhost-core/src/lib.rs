//! Discovery, loading and registry of native extension modules.
//!
//! A host finds shared libraries on disk, opens each one, reads the metadata
//! table it exports under [`METADATA_SYMBOL`] and registers the extensions it
//! describes. Extensions are instantiated through the [`Registry`]; the
//! returned [`InstanceHandle`] keeps its module loaded until it is dropped.
//!
//! ```no_run
//! use modhost_core::{scan_and_load, ExtensionInterface};
//!
//! struct Greeter;
//!
//! impl ExtensionInterface for Greeter {
//!     const INTERFACE_ID: &'static str = "demo.Greeter";
//! }
//!
//! let registry = scan_and_load(["/usr/lib/myapp/extensions"]);
//! for descriptor in registry.extensions_of::<Greeter>() {
//!     let instance = registry.create(&descriptor)?;
//!     println!("{} -> {:p}", descriptor.name(), instance.as_ptr());
//! }
//! # Ok::<(), modhost_core::ExtensionError>(())
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod instance;
pub mod loader;
pub mod module;
pub mod registry;
pub mod scanner;

pub use config::LoaderConfig;
pub use descriptor::{ExtensionDescriptor, ExtensionInfo, ExtensionInterface, ExtensionMetadata};
pub use error::{ExtensionError, Result};
pub use events::{EventCallback, LoaderEvent};
pub use instance::InstanceHandle;
pub use loader::{Loader, ModuleReport, RejectedEntry};
pub use module::{
    canonical_path, platform_module_suffix, MemoryBackend, ModuleBackend, ModuleHandle, NativeBackend,
    NativeLibrary,
};
pub use registry::{scan_and_load, Registry, RegistryOptions, ScanReport, SkippedModule};
pub use scanner::{for_each_file, Candidates, ScanOptions, Scanner};

pub use modhost_extension_sdk::abi::{EXTENSION_ABI_VERSION, METADATA_SYMBOL};
