//! Shared fixtures: metadata tables linked into the test binary.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use modhost_core::module::BackendResult;
use modhost_core::{Loader, MemoryBackend, ModuleBackend, NativeBackend, NativeLibrary, Registry};
use modhost_extension_sdk::prelude::*;

pub const GREETER: &str = "demo.Greeter";
pub const COUNTER: &str = "demo.Counter";

/// Object layout shared by every `demo.Greeter` fixture.
#[repr(C)]
pub struct Greeter {
    pub greeting: &'static str,
}

pub struct Counter {
    pub ticks: u32,
}

extension_factory!(english_create, english_destroy, Greeter, Greeter { greeting: "Hello" });
extension_factory!(german_create, german_destroy, Greeter, Greeter { greeting: "Hallo" });
extension_factory!(counter_create, counter_destroy, Counter, Counter { ticks: 0 });

/// Module A: two greeters and a counter.
pub static MODULE_A: RawModuleTable = module_table! {
    {
        interface: GREETER,
        name: "English",
        version: 100,
        description: "Says hello",
        tags: ["author" => "Alice Bobbens", "vendor" => "42 inc."],
        create: english_create,
        destroy: english_destroy,
    },
    {
        interface: COUNTER,
        name: "Ticker",
        version: 1,
        description: "Counts",
        create: counter_create,
        destroy: counter_destroy,
    },
    {
        interface: GREETER,
        name: "Plain",
        version: 1,
        description: "",
        create: english_create,
        destroy: english_destroy,
    },
};

/// Module B: a newer English greeter from the same vendor and a German one.
pub static MODULE_B: RawModuleTable = module_table! {
    {
        interface: GREETER,
        name: "German",
        version: 100,
        description: "Sagt hallo",
        tags: ["vendor" => "other"],
        create: german_create,
        destroy: german_destroy,
    },
    {
        interface: GREETER,
        name: "English",
        version: 200,
        description: "Says hello, louder",
        tags: ["vendor" => "42 inc."],
        create: english_create,
        destroy: english_destroy,
    },
};

const OUTDATED_RECORDS: &[RawExtensionRecord] = &[
    RawExtensionRecord {
        abi_version: EXTENSION_ABI_VERSION + 1,
        ..RawExtensionRecord::new(GREETER, "Future", 100, "", &[], english_create, english_destroy)
    },
    RawExtensionRecord {
        abi_version: 0,
        ..RawExtensionRecord::new(GREETER, "Ancient", 1, "", &[], english_create, english_destroy)
    },
];

/// Module whose every entry was built against another metadata layout.
pub static MODULE_OUTDATED: RawModuleTable = RawModuleTable::new(OUTDATED_RECORDS);

const PARTIAL_RECORDS: &[RawExtensionRecord] = &[
    RawExtensionRecord {
        abi_version: EXTENSION_ABI_VERSION + 1,
        ..RawExtensionRecord::new(GREETER, "Future", 100, "", &[], english_create, english_destroy)
    },
    RawExtensionRecord::new(GREETER, "Current", 100, "", &[], english_create, english_destroy),
];

/// Module mixing one entry of a newer layout with one current entry.
pub static MODULE_PARTIAL: RawModuleTable = RawModuleTable::new(PARTIAL_RECORDS);

/// Backend with `a.so`, `b.so`, `outdated.so`, `partial.so` and the plain
/// shared library `libz.so`.
pub fn backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_table("a.so", &MODULE_A)
        .with_table("b.so", &MODULE_B)
        .with_table("outdated.so", &MODULE_OUTDATED)
        .with_table("partial.so", &MODULE_PARTIAL)
        .with_library("libz.so")
}

pub fn registry(backend: &Arc<MemoryBackend>) -> Registry {
    Registry::with_loader(Loader::with_backend(backend.clone()))
}

/// Serves registered paths from memory and everything else from disk.
pub struct OverlayBackend {
    pub memory: MemoryBackend,
}

impl ModuleBackend for OverlayBackend {
    fn open(&self, path: &Path) -> BackendResult<Box<dyn NativeLibrary>> {
        if self.memory.contains(path) {
            self.memory.open(path)
        } else {
            NativeBackend.open(path)
        }
    }
}

/// Factory pair that counts live objects; used by a single test only.
pub static TRACKED_LIVE: AtomicUsize = AtomicUsize::new(0);

pub struct Tracked;

impl Tracked {
    fn new() -> Self {
        TRACKED_LIVE.fetch_add(1, Ordering::SeqCst);
        Tracked
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        TRACKED_LIVE.fetch_sub(1, Ordering::SeqCst);
    }
}

extension_factory!(tracked_create, tracked_destroy, Tracked, Tracked::new());

pub static MODULE_TRACKED: RawModuleTable = module_table! {
    {
        interface: "demo.Tracked",
        name: "Tracked",
        version: 1,
        description: "",
        create: tracked_create,
        destroy: tracked_destroy,
    },
};
